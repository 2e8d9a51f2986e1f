//! Installer: extract a package archive onto the root and register it.
//!
//! The file manifest is derived from the archive's table of contents, not
//! from live-filesystem inspection: the archive is the ground truth of
//! what the package contributes, and a filesystem diff would conflate
//! concurrent work.

use chrono::Utc;
use std::path::Path;

use crate::archive;
use crate::config::Config;
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::registry::{MetaRecord, Registry};

/// Install the archive produced by a build, carrying the build context's
/// metadata into the registry.
pub fn install_built(ctx: &BuildContext, package: &Path, config: &Config) -> Result<()> {
    let record = MetaRecord {
        name: ctx.recipe.name.clone(),
        version: ctx.recipe.version.clone(),
        recipe: ctx.recipe.path.to_string_lossy().into_owned(),
        date: ctx.staged_at.unwrap_or_else(Utc::now).to_rfc3339(),
        strip: config.strip,
        jobs: ctx.jobs,
    };
    install_archive(package, record, config)
}

/// Install a standalone package archive; name and version come from the
/// archive filename.
pub fn install_file(package: &Path, config: &Config) -> Result<()> {
    let (name, version) = split_package_name(package).ok_or_else(|| {
        Error::Usage(format!(
            "not a package archive name: {}",
            package.display()
        ))
    })?;
    let record = MetaRecord {
        name,
        version,
        recipe: String::new(),
        date: Utc::now().to_rfc3339(),
        strip: config.strip,
        jobs: config.jobs.effective(),
    };
    install_archive(package, record, config)
}

/// Extract onto the root, then write manifest and metadata — in that
/// order, and only after extraction succeeded.
fn install_archive(package: &Path, record: MetaRecord, config: &Config) -> Result<()> {
    if !package.is_file() {
        return Err(Error::Usage(format!(
            "package archive not found: {}",
            package.display()
        )));
    }

    println!(
        "Installing {}-{} to {}...",
        record.name,
        record.version,
        config.root.display()
    );

    let toc = archive::list(package)?;
    let manifest = manifest_from_toc(&toc);

    archive::unpack(package, &config.root, archive::codec_of(package)).map_err(|e| {
        Error::InstallFailed {
            name: record.name.clone(),
            reason: e.to_string(),
        }
    })?;

    let registry = Registry::open(&config.registry);
    registry.put_manifest(&record.name, &manifest)?;
    registry.put_metadata(&record)?;

    println!("  Registered {} files", manifest.len());
    Ok(())
}

/// Normalize a tar table of contents into a manifest: regular entries
/// only, as absolute paths with a single leading slash, sorted.
pub fn manifest_from_toc(toc: &[String]) -> Vec<String> {
    let mut manifest: Vec<String> = toc
        .iter()
        .filter(|entry| !entry.ends_with('/'))
        .filter_map(|entry| normalize_entry(entry))
        .collect();
    manifest.sort_unstable();
    manifest.dedup();
    manifest
}

/// `./usr/bin/x`, `usr/bin/x`, and `/usr/bin/x` all become `/usr/bin/x`.
fn normalize_entry(entry: &str) -> Option<String> {
    let trimmed = entry
        .trim_start_matches("./")
        .trim_start_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    Some(format!("/{}", trimmed))
}

/// Split `{name}-{version}.tar.{codec}` into name and version.
pub fn split_package_name(package: &Path) -> Option<(String, String)> {
    let file_name = package.file_name()?.to_string_lossy();
    let stem = file_name
        .strip_suffix(".tar.xz")
        .or_else(|| file_name.strip_suffix(".tar.gz"))
        .or_else(|| file_name.strip_suffix(".tar.bz2"))?;
    let (name, version) = stem.rsplit_once('-')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_manifest_from_toc_normalizes() {
        let toc = vec![
            "./".to_string(),
            "./usr/".to_string(),
            "./usr/bin/".to_string(),
            "./usr/bin/hello".to_string(),
            "usr/share/doc/hello".to_string(),
            "/usr/bin/hello".to_string(),
        ];
        assert_eq!(
            manifest_from_toc(&toc),
            vec!["/usr/bin/hello", "/usr/share/doc/hello"]
        );
    }

    #[test]
    fn test_manifest_sorted() {
        let toc = vec!["./b".to_string(), "./a".to_string()];
        assert_eq!(manifest_from_toc(&toc), vec!["/a", "/b"]);
    }

    #[test]
    fn test_split_package_name() {
        let split = |s: &str| split_package_name(&PathBuf::from(s));
        assert_eq!(
            split("hello-1.0.tar.xz"),
            Some(("hello".to_string(), "1.0".to_string()))
        );
        assert_eq!(
            split("/out/gnu-hello-2.12.1.tar.gz"),
            Some(("gnu-hello".to_string(), "2.12.1".to_string()))
        );
        assert_eq!(split("noversion.tar.xz"), None);
        assert_eq!(split("plainfile.txt"), None);
    }
}
