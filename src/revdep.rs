//! Reverse-dependency engine: find ELF artifacts whose shared library
//! references no longer resolve, map them back to owning packages, and
//! optionally rebuild those packages.
//!
//! Uses `readelf -d` to extract dependencies (it reads ELF headers
//! directly, so it never executes the scanned binary the way `ldd` does).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::build;
use crate::config::Config;
use crate::error::Result;
use crate::process::Cmd;
use crate::registry::Registry;

/// Directory names under the root that hold virtual or transient
/// filesystems; never scanned.
const SKIP_DIRS: &[&str] = &["proc", "sys", "dev", "run", "tmp"];

/// Library directories searched when resolving a soname, relative to the
/// installation root.
const LIB_DIRS: &[&str] = &["usr/lib64", "lib64", "usr/lib", "lib"];

/// Outcome of a revdep scan: missing soname -> files that reported it.
#[derive(Debug, Default)]
pub struct MissingReport {
    pub missing: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl MissingReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// Deduplicated missing sonames, sorted.
    pub fn sonames(&self) -> Vec<&str> {
        self.missing.keys().map(String::as_str).collect()
    }
}

/// Walk ELF executables and shared objects across the root filesystem and
/// report every dynamic reference that fails to resolve. The report is
/// also persisted to `{TMPROOT}/revdep-missing.txt` for inspection.
pub fn check(config: &Config) -> Result<MissingReport> {
    println!("Scanning {} for broken library links...", config.root.display());

    let mut report = MissingReport::default();
    let mut resolved_cache: BTreeMap<String, bool> = BTreeMap::new();

    let walker = WalkDir::new(&config.root)
        .same_file_system(true)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && SKIP_DIRS
                    .iter()
                    .any(|skip| entry.file_name().to_string_lossy() == *skip))
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let mode = match entry.metadata() {
            Ok(m) => m.permissions().mode(),
            Err(_) => continue,
        };
        let name = entry.file_name().to_string_lossy();
        if !build::elf_candidate(&name, mode) || !build::is_elf(path) {
            continue;
        }

        for lib in needed_libs(path)? {
            let found = *resolved_cache
                .entry(lib.clone())
                .or_insert_with(|| resolves(&config.root, &lib));
            if !found {
                report
                    .missing
                    .entry(lib)
                    .or_default()
                    .insert(path.to_path_buf());
            }
        }
    }

    persist_report(&report, config);

    if report.is_empty() {
        println!("No missing libraries found.");
    } else {
        println!("Missing libraries:");
        for (soname, files) in &report.missing {
            println!("  {} (wanted by {} file(s))", soname, files.len());
        }
    }
    Ok(report)
}

/// For each missing soname, find the package whose manifest once shipped
/// it and re-drive the build pipeline for that package's recipe.
/// Per-candidate failures are warnings; the loop continues.
pub fn fix(report: &MissingReport, config: &Config) -> Result<()> {
    if report.is_empty() {
        return Ok(());
    }

    let registry = Registry::open(&config.registry);
    let manifests = registry.iter_manifests()?;
    let mut rebuilt: BTreeSet<String> = BTreeSet::new();

    for soname in report.sonames() {
        let Some(owner) = owner_for_soname(&manifests, soname) else {
            eprintln!("  [WARN] No package owns {}, skipping", soname);
            continue;
        };
        let owner = owner.to_string();
        if rebuilt.contains(&owner) {
            continue;
        }

        let Some(recipe) = find_recipe(&config.repo, &owner) else {
            eprintln!("  [WARN] No recipe found for {} in {}", owner, config.repo.display());
            continue;
        };

        println!("Rebuilding {} to restore {}...", owner, soname);
        match build::build_recipe(&recipe, config, true) {
            Ok(_) => {
                rebuilt.insert(owner);
            }
            Err(e) => eprintln!("  [WARN] Rebuild of {} failed: {}", owner, e),
        }
    }
    Ok(())
}

/// Extract NEEDED entries from an ELF binary using readelf.
pub fn needed_libs(binary: &Path) -> Result<Vec<String>> {
    let result = Cmd::new("readelf")
        .args(["-d"])
        .arg_path(binary)
        .lenient()
        .capture()?;

    if !result.success() {
        // not a dynamic ELF, or readelf couldn't parse it
        return Ok(Vec::new());
    }
    Ok(parse_needed(&result.stdout))
}

/// Parse `readelf -d` output for NEEDED shared library names.
///
/// Example line:
/// ` 0x0000000000000001 (NEEDED)  Shared library: [libc.so.6]`
pub fn parse_needed(output: &str) -> Vec<String> {
    let mut libs = Vec::new();
    for line in output.lines() {
        if line.contains("(NEEDED)") && line.contains("Shared library:") {
            if let (Some(start), Some(end)) = (line.find('['), line.rfind(']')) {
                if start + 1 < end {
                    libs.push(line[start + 1..end].to_string());
                }
            }
        }
    }
    libs
}

/// Whether a soname resolves in the standard library directories under
/// the installation root.
fn resolves(root: &Path, soname: &str) -> bool {
    LIB_DIRS
        .iter()
        .map(|dir| root.join(dir).join(soname))
        .any(|p| p.exists() || p.is_symlink())
}

/// First package (by sorted registry key) whose manifest contains a file
/// with the soname as its basename.
pub fn owner_for_soname<'a>(
    manifests: &'a [(String, Vec<String>)],
    soname: &str,
) -> Option<&'a str> {
    for (name, paths) in manifests {
        let owns = paths.iter().any(|p| {
            Path::new(p)
                .file_name()
                .map(|f| f.to_string_lossy() == soname)
                .unwrap_or(false)
        });
        if owns {
            return Some(name);
        }
    }
    None
}

/// Locate a recipe in the recipe tree whose filename stem matches the
/// package name (`liba.pbuild` or `liba-1.2.pbuild`).
pub fn find_recipe(repo: &Path, name: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(repo)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension().map(|e| e == "pbuild").unwrap_or(false)
                && path
                    .file_stem()
                    .map(|s| stem_matches(&s.to_string_lossy(), name))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// `hello` matches both `hello.pbuild` and `hello-1.0.pbuild`, but not
/// `hello-world.pbuild`.
fn stem_matches(stem: &str, name: &str) -> bool {
    if stem == name {
        return true;
    }
    stem.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|version| version.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Write the missing set to a scratch file, one `soname<TAB>file` pair
/// per line.
fn persist_report(report: &MissingReport, config: &Config) {
    let path = config.tmproot.join("revdep-missing.txt");
    let mut content = String::new();
    for (soname, files) in &report.missing {
        for file in files {
            content.push_str(&format!("{}\t{}\n", soname, file.display()));
        }
    }
    if let Err(e) = fs::create_dir_all(&config.tmproot)
        .and_then(|_| fs::write(&path, content))
    {
        eprintln!("  [WARN] Failed to write {}: {}", path.display(), e);
    }
}
