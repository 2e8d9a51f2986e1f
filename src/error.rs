//! Error types for the package manager.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for package manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Package manager errors.
///
/// Build, test, and install failures carry the per-build log path so the
/// child output can be inspected after the fact.
#[derive(Error, Debug)]
pub enum Error {
    #[error("usage: {0}")]
    Usage(String),

    #[error("recipe not found: {0}")]
    RecipeNotFound(PathBuf),

    #[error("invalid recipe {path}: {reason}")]
    InvalidRecipe { path: PathBuf, reason: String },

    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),

    #[error("patch failed to apply: {patch}")]
    PatchFailed { patch: String },

    #[error("build failed for {name} (log: {log})")]
    BuildFailed { name: String, log: PathBuf },

    #[error("tests failed for {name} (log: {log})")]
    TestFailed { name: String, log: PathBuf },

    #[error("install failed for {name}: {reason}")]
    InstallFailed { name: String, reason: String },

    #[error("packaging failed: {0}")]
    PackagingFailed(String),

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("registry corrupt: {0}")]
    RegistryCorrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Map an error to the process exit code.
    ///
    /// `UnknownPackage` maps to the remove code here; `info` remaps it to 8
    /// at the CLI boundary.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Usage(_) => 1,
            Error::RecipeNotFound(_) | Error::InvalidRecipe { .. } => 2,
            Error::ChecksumMismatch { .. } => 3,
            Error::UnsupportedArchive(_) => 4,
            Error::PatchFailed { .. } => 5,
            Error::InstallFailed { .. } => 6,
            Error::UnknownPackage(_) => 7,
            _ => 1,
        }
    }
}
