//! Shared test utilities for pbuild integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use pbuild::config::{Codec, Color, Config, Jobs};

/// Test environment: a scratch installation root plus recipe tree,
/// sources cache, registry, and package output under one temp dir.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    /// Create a new test environment with temporary directories.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let config = Config {
            tmproot: base.join("tmp"),
            repo: base.join("repo"),
            sources: base.join("sources"),
            registry: base.join("registry"),
            pkgout: base.join("pkgout"),
            hooks: base.join("hooks"),
            root: base.join("root"),
            makeflags: None,
            jobs: Jobs::Count(3),
            strip: false,
            // gzip is available everywhere the suite runs; xz may not be
            codec: Codec::Gz,
            color: Color::Never,
        };

        for dir in [
            &config.tmproot,
            &config.repo,
            &config.sources,
            &config.registry,
            &config.pkgout,
            &config.root,
        ] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Write a recipe into the repo tree and return its path.
    pub fn write_recipe(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.config.repo.join(filename);
        fs::write(&path, content).expect("Failed to write recipe");
        path
    }

    /// Create a gzip source tarball `{name}.tar.gz` in the sources cache,
    /// containing a top directory `{name}` with the given files.
    pub fn make_source_tarball(&self, name: &str, files: &[(&str, &str)]) {
        let scratch = self._temp_dir.path().join("mktar");
        let top = scratch.join(name);
        fs::create_dir_all(&top).expect("Failed to create tarball scratch");

        for (rel, content) in files {
            let path = top.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create tarball subdir");
            }
            fs::write(&path, content).expect("Failed to write tarball file");
        }

        let out = self.config.sources.join(format!("{}.tar.gz", name));
        let status = Command::new("tar")
            .args(["-czf"])
            .arg(&out)
            .args(["-C"])
            .arg(&scratch)
            .arg(name)
            .status()
            .expect("Failed to run tar");
        assert!(status.success(), "tar failed creating {}", out.display());

        fs::remove_dir_all(&scratch).expect("Failed to clean tarball scratch");
    }

    /// Path inside the scratch installation root.
    pub fn rooted(&self, path: &str) -> PathBuf {
        self.config.root.join(path.trim_start_matches('/'))
    }

    /// Content of a registry file, if present.
    pub fn registry_file(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.config.registry.join(name)).ok()
    }
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a path is absent.
pub fn assert_absent(path: &Path) {
    assert!(!path.exists(), "Expected path to be absent: {}", path.display());
}

/// True when a helper binary is available on PATH.
pub fn tool_available(tool: &str) -> bool {
    pbuild::process::have(tool)
}
