//! Remover: reverse the effect of an install using the manifest.
//!
//! Per-file failures are warnings — a partial remove is better than a
//! stuck system. Directories are pruned deepest-first and only when empty,
//! so content owned by other packages is never touched.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::hooks;
use crate::registry::Registry;

/// Remove an installed package: delete its manifest files, prune emptied
/// directories, drop the registry records, fire post-remove hooks.
pub fn remove(name: &str, config: &Config) -> Result<()> {
    let registry = Registry::open(&config.registry);
    let manifest = registry.get_manifest(name)?;

    println!("Removing {} ({} files)...", name, manifest.len());

    let mut deleted = Vec::new();
    for entry in &manifest {
        let path = config.root.join(entry.trim_start_matches('/'));
        match path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {
                eprintln!("  [WARN] Manifest entry is a directory, skipping: {}", entry);
            }
            Ok(_) => match fs::remove_file(&path) {
                Ok(()) => deleted.push(path),
                Err(e) => eprintln!("  [WARN] Failed to delete {}: {}", path.display(), e),
            },
            Err(_) => {
                eprintln!("  [WARN] Already missing: {}", entry);
            }
        }
    }

    prune_empty_dirs(&deleted, &config.root);

    registry.drop(name)?;
    hooks::fire_removed(name, config);

    println!("  Removed {} of {} files", deleted.len(), manifest.len());
    Ok(())
}

/// Remove every directory that held a deleted file and is now empty.
///
/// All ancestors up to (excluding) the root are candidates, visited in
/// reverse depth order so nested empty directories collapse bottom-up.
fn prune_empty_dirs(deleted: &[PathBuf], root: &Path) {
    let mut dirs = BTreeSet::new();
    for path in deleted {
        for dir in ancestors_below(path, root) {
            dirs.insert(dir);
        }
    }
    for dir in prune_order(dirs) {
        // remove_dir refuses non-empty directories, which is the point
        let _ = fs::remove_dir(&dir);
    }
}

/// Proper ancestors of `path` that lie strictly below `root`.
fn ancestors_below(path: &Path, root: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .skip(1)
        .take_while(|a| a.starts_with(root) && *a != root)
        .map(Path::to_path_buf)
        .collect()
}

/// Order directories deepest-first (reverse depth, then reverse path for
/// determinism among siblings).
fn prune_order(dirs: BTreeSet<PathBuf>) -> Vec<PathBuf> {
    let mut ordered: Vec<PathBuf> = dirs.into_iter().collect();
    ordered.sort_by(|a, b| {
        let depth = |p: &PathBuf| p.components().count();
        depth(b).cmp(&depth(a)).then_with(|| b.cmp(a))
    });
    ordered
}
