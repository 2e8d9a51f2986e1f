//! Recipe files: one `key=[value]` line per field.
//!
//! Blank lines and `#` comments are ignored, unknown keys are skipped for
//! forward compatibility, and values are carried verbatim — no shell
//! expansion happens here. Command strings are executed by the build
//! driver, never parsed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// How the source is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vcs {
    Http,
    Git,
}

/// A parsed recipe. Immutable after parse.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub source_url: String,
    /// SHA-256 hex digest over the fetched archive.
    pub checksum: Option<String>,
    pub build_cmd: Option<String>,
    pub check_cmd: Option<String>,
    pub install_cmd: String,
    /// Top directory produced by extraction. Deduced from the archive
    /// basename when absent; required for git recipes.
    pub source_dir: Option<String>,
    /// Patch filenames, applied in order with -p1 against the source top.
    pub patches: Vec<String>,
    pub vcs: Vcs,
    pub vcs_branch: Option<String>,
    /// Appended to MAKEFLAGS instead of the default -j.
    pub extra_make_flags: Option<String>,
    /// Subdirectory under the source top where the build runs.
    pub build_subdir: Option<String>,
    /// Organizational flag, carried into metadata.
    pub toolchain: bool,
    /// Where this recipe was read from.
    pub path: PathBuf,
}

impl Recipe {
    /// Parse a recipe file.
    pub fn parse(path: &Path) -> Result<Recipe> {
        if !path.is_file() {
            return Err(Error::RecipeNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| Error::InvalidRecipe {
            path: path.to_path_buf(),
            reason: format!("unreadable: {}", e),
        })?;
        Self::parse_str(&content, path)
    }

    /// Parse recipe content. `path` is only recorded for diagnostics.
    pub fn parse_str(content: &str, path: &Path) -> Result<Recipe> {
        let invalid = |reason: String| Error::InvalidRecipe {
            path: path.to_path_buf(),
            reason,
        };

        let mut name = None;
        let mut version = None;
        let mut source_url = None;
        let mut checksum = None;
        let mut build_cmd = None;
        let mut check_cmd = None;
        let mut install_cmd = None;
        let mut source_dir = None;
        let mut patches = Vec::new();
        let mut vcs = None;
        let mut vcs_branch = None;
        let mut extra_make_flags = None;
        let mut build_subdir = None;
        let mut toolchain = false;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = split_field(line)
                .ok_or_else(|| invalid(format!("malformed line {}: {}", lineno + 1, raw)))?;

            match key {
                "name" => name = Some(value.to_string()),
                "version" => version = Some(value.to_string()),
                "source_url" => source_url = Some(value.to_string()),
                "checksum" => checksum = Some(value.to_string()),
                "build_cmd" => build_cmd = Some(value.to_string()),
                "check_cmd" => check_cmd = Some(value.to_string()),
                "install_cmd" => install_cmd = Some(value.to_string()),
                "source_dir" => source_dir = Some(value.to_string()),
                "patches" => {
                    patches = value.split_whitespace().map(str::to_string).collect();
                }
                "vcs" => {
                    vcs = Some(match value {
                        "http" => Vcs::Http,
                        "git" => Vcs::Git,
                        other => return Err(invalid(format!("illegal vcs value: {}", other))),
                    });
                }
                "vcs_branch" => vcs_branch = Some(value.to_string()),
                "extra_make_flags" => extra_make_flags = Some(value.to_string()),
                "build_subdir" => build_subdir = Some(value.to_string()),
                "toolchain" => toolchain = matches!(value, "yes" | "true" | "1"),
                // Unknown keys are ignored for forward compatibility.
                _ => {}
            }
        }

        let required = |field: Option<String>, key: &str| {
            field
                .filter(|v| !v.is_empty())
                .ok_or_else(|| invalid(format!("missing required field: {}", key)))
        };

        let name = required(name, "name")?;
        let version = required(version, "version")?;
        let source_url = required(source_url, "source_url")?;
        let install_cmd = required(install_cmd, "install_cmd")?;

        if !is_valid_name(&name) {
            return Err(invalid(format!("illegal package name: {}", name)));
        }

        let vcs = vcs.unwrap_or_else(|| infer_vcs(&source_url));
        if vcs == Vcs::Git && source_dir.as_deref().map_or(true, str::is_empty) {
            return Err(invalid("source_dir is required when vcs=git".to_string()));
        }

        Ok(Recipe {
            name,
            version,
            source_url,
            checksum,
            build_cmd,
            check_cmd,
            install_cmd,
            source_dir,
            patches,
            vcs,
            vcs_branch,
            extra_make_flags,
            build_subdir,
            toolchain,
            path: path.to_path_buf(),
        })
    }
}

/// Split a `key=[value]` line. The value runs to the `]` that ends the line,
/// so brackets inside the value are preserved.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let eq = line.find("=[")?;
    let rest = &line[eq + 2..];
    let value = rest.strip_suffix(']')?;
    Some((&line[..eq], value))
}

/// Package names: `[A-Za-z0-9._+-]+`.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
}

/// Infer the vcs tag from the URL when the recipe doesn't state it.
fn infer_vcs(url: &str) -> Vcs {
    if url.starts_with("git://") || url.starts_with("git+") || url.ends_with(".git") {
        Vcs::Git
    } else {
        Vcs::Http
    }
}
