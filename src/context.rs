//! Per-invocation build context.
//!
//! Owns the parsed recipe for the duration of one build and carries every
//! path the pipeline needs: work tree, source area, stage root, log file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{Codec, Config};
use crate::recipe::Recipe;
use crate::source;

/// Short-lived state for one build invocation.
pub struct BuildContext {
    pub recipe: Recipe,
    /// Per-build working directory: `{TMPROOT}/{name}-{version}`.
    pub work: PathBuf,
    /// Source area under the work tree; extraction lands here.
    pub src: PathBuf,
    /// Stage root that collects the install step's files (virtual `/`).
    pub stage: PathBuf,
    /// Per-invocation log file; all child output is appended here.
    pub log: PathBuf,
    /// Top directory name produced by extraction.
    pub source_dir: String,
    /// Effective compile parallelism.
    pub jobs: usize,
    /// Effective archive compression codec.
    pub codec: Codec,
    /// Force re-extraction and a fresh build even when artifacts exist.
    pub rebuild: bool,
    /// Pre-install timestamp anchor, recorded when staging starts and
    /// persisted as the metadata build date.
    pub staged_at: Option<DateTime<Utc>>,
}

impl BuildContext {
    pub fn new(recipe: Recipe, config: &Config, rebuild: bool) -> Self {
        let work = config
            .tmproot
            .join(format!("{}-{}", recipe.name, recipe.version));
        let source_dir = recipe
            .source_dir
            .clone()
            .unwrap_or_else(|| source::deduce_source_dir(&recipe.source_url));

        Self {
            work: work.clone(),
            src: work.join("src"),
            stage: work.join("pkg"),
            log: work.join("build.log"),
            source_dir,
            jobs: config.jobs.effective(),
            codec: config.codec,
            rebuild,
            staged_at: None,
            recipe,
        }
    }

    /// Top of the extracted source tree.
    pub fn source_top(&self) -> PathBuf {
        self.src.join(&self.source_dir)
    }

    /// Directory where configure/build/install run.
    pub fn build_dir(&self) -> PathBuf {
        match &self.recipe.build_subdir {
            Some(sub) => self.source_top().join(sub),
            None => self.source_top(),
        }
    }

    /// Canonical path of the package archive this build produces.
    pub fn archive_path(&self, pkgout: &Path) -> PathBuf {
        pkgout.join(format!(
            "{}-{}.tar.{}",
            self.recipe.name,
            self.recipe.version,
            self.codec.ext()
        ))
    }
}
