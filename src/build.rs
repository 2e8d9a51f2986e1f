//! Build driver: configure/build/test/install-to-stage.
//!
//! Each phase hands the recipe's command string to `sh -c` verbatim with
//! the working directory and environment set up as the recipe expects.
//! The driver runs phases strictly sequentially; parallelism comes from
//! the child make processes via MAKEFLAGS.

use anyhow::Context;
use chrono::Utc;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::archive;
use crate::config::Config;
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::install;
use crate::process::{self, Cmd};
use crate::recipe::Recipe;
use crate::source;

/// Drive the full pipeline for one recipe file: parse, provision, build,
/// package, install, register. This is the entry point used by both the
/// CLI and the revdep repair loop.
pub fn build_recipe(recipe_path: &Path, config: &Config, rebuild: bool) -> Result<PathBuf> {
    let recipe = Recipe::parse(recipe_path)?;
    let mut ctx = BuildContext::new(recipe, config, rebuild);

    println!(
        "=== Building {}-{} ===",
        ctx.recipe.name, ctx.recipe.version
    );
    let started = Instant::now();

    source::provision(&ctx, config)?;
    stage(&mut ctx, config)?;
    let package = archive::package(&ctx, config)?;
    install::install_built(&ctx, &package, config)?;

    phase_done("pipeline", started);
    println!("  Package: {}", package.display());
    Ok(package)
}

/// Run the build/test/install phases, leaving the package's files below
/// the stage root. Optionally strips ELF artifacts afterwards.
pub fn stage(ctx: &mut BuildContext, config: &Config) -> Result<()> {
    // A stale stage would leak into the archive and thus the manifest.
    if ctx.stage.exists() {
        fs::remove_dir_all(&ctx.stage)?;
    }
    fs::create_dir_all(&ctx.stage)?;
    File::create(&ctx.log)
        .with_context(|| format!("Failed to create log file {}", ctx.log.display()))?;

    let build_dir = ctx.build_dir();
    let makeflags = compute_makeflags(
        config.makeflags.as_deref(),
        ctx.recipe.extra_make_flags.as_deref(),
        ctx.jobs,
    );

    if let Some(cmd) = &ctx.recipe.build_cmd {
        println!("Building...");
        let started = Instant::now();
        let status = Cmd::new("sh")
            .args(["-c", cmd.as_str()])
            .workdir(&build_dir)
            .env("MAKEFLAGS", makeflags.as_str())
            .lenient()
            .log_to(&ctx.log)?;
        if !status.success() {
            return Err(Error::BuildFailed {
                name: ctx.recipe.name.clone(),
                log: ctx.log.clone(),
            });
        }
        phase_done("build", started);
    }

    if let Some(cmd) = &ctx.recipe.check_cmd {
        println!("Testing...");
        let started = Instant::now();
        let status = Cmd::new("sh")
            .args(["-c", cmd.as_str()])
            .workdir(&build_dir)
            .env("MAKEFLAGS", makeflags.as_str())
            .lenient()
            .log_to(&ctx.log)?;
        if !status.success() {
            return Err(Error::TestFailed {
                name: ctx.recipe.name.clone(),
                log: ctx.log.clone(),
            });
        }
        phase_done("check", started);
    }

    ctx.staged_at = Some(Utc::now());

    println!("Installing to stage...");
    let started = Instant::now();
    let cmd = ctx.recipe.install_cmd.as_str();
    // fakeroot fakes UID/GID so the tarball carries root-owned files
    let shim = if process::have("fakeroot") {
        Cmd::new("fakeroot").args(["sh", "-c", cmd])
    } else {
        eprintln!("  [WARN] fakeroot not found, staging without ownership faking");
        Cmd::new("sh").args(["-c", cmd])
    };
    let status = shim
        .workdir(&build_dir)
        .env("DESTDIR", ctx.stage.to_string_lossy())
        .lenient()
        .log_to(&ctx.log)?;
    if !status.success() {
        return Err(Error::InstallFailed {
            name: ctx.recipe.name.clone(),
            reason: format!("install command failed (log: {})", ctx.log.display()),
        });
    }
    phase_done("stage", started);

    if config.strip {
        strip_stage(&ctx.stage);
    }
    Ok(())
}

/// Print how long a phase took, in minutes once it gets long.
fn phase_done(phase: &str, started: Instant) {
    let secs = started.elapsed().as_secs_f64();
    if secs >= 60.0 {
        println!("  {} took {:.1}m", phase, secs / 60.0);
    } else {
        println!("  {} took {:.1}s", phase, secs);
    }
}

/// Compute the MAKEFLAGS for the build and check phases: the inherited
/// value, plus the recipe's extra flags, or a default -j when nothing else
/// names a job count.
pub fn compute_makeflags(inherited: Option<&str>, extra: Option<&str>, jobs: usize) -> String {
    let mut flags = inherited.unwrap_or("").trim().to_string();
    match extra {
        Some(extra) => {
            if !flags.is_empty() {
                flags.push(' ');
            }
            flags.push_str(extra.trim());
        }
        None => {
            if !flags.contains("-j") {
                if !flags.is_empty() {
                    flags.push(' ');
                }
                flags.push_str(&format!("-j{}", jobs));
            }
        }
    }
    flags
}

/// Whether a file is worth probing as an ELF artifact: executable, or
/// named like a shared object. Shared by the strip pass and the revdep
/// scan so the two can't drift apart.
pub fn elf_candidate(name: &str, mode: u32) -> bool {
    mode & 0o111 != 0 || name.contains(".so")
}

/// Check the 4-byte ELF magic.
pub fn is_elf(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => magic == [0x7f, b'E', b'L', b'F'],
        Err(_) => false,
    }
}

/// Strip unneeded symbols from ELF artifacts below the stage root.
/// Per-file failures are warnings; a broken strip never fails the build.
fn strip_stage(stage: &Path) {
    println!("Stripping ELF artifacts...");
    let mut stripped = 0usize;

    for entry in WalkDir::new(stage) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                eprintln!("  [WARN] Skipping unreadable entry during strip: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let mode = match entry.metadata() {
            Ok(m) => m.permissions().mode(),
            Err(e) => {
                eprintln!("  [WARN] Failed to stat {}: {}", path.display(), e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy();
        if !elf_candidate(&name, mode) || !is_elf(path) {
            continue;
        }

        match Cmd::new("strip")
            .arg("--strip-unneeded")
            .arg_path(path)
            .lenient()
            .capture()
        {
            Ok(out) if out.success() => stripped += 1,
            Ok(out) => eprintln!(
                "  [WARN] strip failed on {}: {}",
                path.display(),
                out.stderr_trimmed()
            ),
            Err(e) => eprintln!("  [WARN] strip failed on {}: {}", path.display(), e),
        }
    }
    println!("  Stripped {} files", stripped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_makeflags_default_jobs() {
        assert_eq!(compute_makeflags(None, None, 4), "-j4");
    }

    #[test]
    fn test_makeflags_inherited_without_jobs() {
        assert_eq!(compute_makeflags(Some("-k"), None, 2), "-k -j2");
    }

    #[test]
    fn test_makeflags_inherited_jobs_kept() {
        assert_eq!(compute_makeflags(Some("-j8"), None, 2), "-j8");
    }

    #[test]
    fn test_makeflags_extra_replaces_default() {
        assert_eq!(compute_makeflags(None, Some("-j1 -l4"), 16), "-j1 -l4");
        assert_eq!(compute_makeflags(Some("-k"), Some("-j1"), 16), "-k -j1");
    }

    #[test]
    fn test_elf_candidate() {
        assert!(elf_candidate("prog", 0o755));
        assert!(elf_candidate("libfoo.so.1", 0o644));
        assert!(elf_candidate("libfoo.so", 0o644));
        assert!(!elf_candidate("README", 0o644));
    }

    #[test]
    fn test_is_elf() {
        let dir = tempfile::tempdir().unwrap();
        let elf = dir.path().join("elf");
        fs::write(&elf, [0x7f, b'E', b'L', b'F', 0, 0]).unwrap();
        assert!(is_elf(&elf));

        let script = dir.path().join("script");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(!is_elf(&script));

        let short = dir.path().join("short");
        fs::write(&short, [0x7f]).unwrap();
        assert!(!is_elf(&short));
    }
}
