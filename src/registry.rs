//! On-disk registry of installed packages.
//!
//! Two files per package under the registry directory:
//! `{name}.META` holds key=value metadata lines, `{name}.files` holds the
//! sorted file manifest, one absolute path per line. No other component
//! writes these files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Per-package metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub name: String,
    pub version: String,
    /// Recipe path this package was built from; empty for archives
    /// installed directly.
    pub recipe: String,
    /// UTC build timestamp, RFC 3339.
    pub date: String,
    pub strip: bool,
    pub jobs: usize,
}

impl MetaRecord {
    fn to_lines(&self) -> String {
        format!(
            "name={}\nversion={}\nrecipe={}\ndate={}\nstrip={}\njobs={}\n",
            self.name,
            self.version,
            self.recipe,
            self.date,
            if self.strip { "yes" } else { "no" },
            self.jobs
        )
    }

    fn from_lines(name: &str, content: &str) -> Result<Self> {
        let corrupt =
            |what: &str| Error::RegistryCorrupt(format!("{}.META: {}", name, what));

        let mut record = MetaRecord {
            name: String::new(),
            version: String::new(),
            recipe: String::new(),
            date: String::new(),
            strip: false,
            jobs: 0,
        };
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                return Err(corrupt(&format!("malformed line: {}", line)));
            };
            match key {
                "name" => record.name = value.to_string(),
                "version" => record.version = value.to_string(),
                "recipe" => record.recipe = value.to_string(),
                "date" => record.date = value.to_string(),
                "strip" => record.strip = value == "yes",
                "jobs" => {
                    record.jobs = value
                        .parse()
                        .map_err(|_| corrupt(&format!("bad jobs value: {}", value)))?
                }
                _ => {}
            }
        }
        if record.name.is_empty() || record.version.is_empty() {
            return Err(corrupt("missing name or version"));
        }
        Ok(record)
    }
}

/// Handle to the registry directory.
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    pub fn open(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.META", name))
    }

    fn files_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.files", name))
    }

    /// True when both records for the package exist.
    pub fn has(&self, name: &str) -> bool {
        self.files_path(name).is_file()
    }

    pub fn put_metadata(&self, record: &MetaRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.meta_path(&record.name), record.to_lines())?;
        Ok(())
    }

    pub fn get_metadata(&self, name: &str) -> Result<MetaRecord> {
        let path = self.meta_path(name);
        if !path.is_file() {
            return Err(Error::UnknownPackage(name.to_string()));
        }
        MetaRecord::from_lines(name, &fs::read_to_string(path)?)
    }

    /// Write the file manifest: sorted, deduplicated, one absolute path
    /// per line.
    pub fn put_manifest(&self, name: &str, paths: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut sorted: Vec<&str> = paths.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut content = sorted.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(self.files_path(name), content)?;
        Ok(())
    }

    pub fn get_manifest(&self, name: &str) -> Result<Vec<String>> {
        let path = self.files_path(name);
        if !path.is_file() {
            return Err(Error::UnknownPackage(name.to_string()));
        }
        Ok(fs::read_to_string(path)?
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Remove both records for a package. Missing files are not an error;
    /// the drop is best-effort.
    pub fn drop(&self, name: &str) -> Result<()> {
        if !self.has(name) {
            return Err(Error::UnknownPackage(name.to_string()));
        }
        for path in [self.files_path(name), self.meta_path(name)] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    eprintln!("  [WARN] Failed to remove {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }

    /// All package names with a manifest, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(".files") {
                names.push(stem.to_string());
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// Iterate manifests in sorted name order. Used by the revdep engine,
    /// which relies on the deterministic order for tie-breaks.
    pub fn iter_manifests(&self) -> Result<Vec<(String, Vec<String>)>> {
        let mut result = Vec::new();
        for name in self.names()? {
            let manifest = self.get_manifest(&name)?;
            result.push((name, manifest));
        }
        Ok(result)
    }
}
