//! Package archives: create them from a stage root, list their contents.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Codec, Config};
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::process::Cmd;

/// Archive the stage root into `{pkgout}/{name}-{version}.tar.{codec}`.
///
/// Entry names are relative to the stage root; the installer tolerates
/// both `./path` and `/path` forms.
pub fn package(ctx: &BuildContext, config: &Config) -> Result<PathBuf> {
    fs::create_dir_all(&config.pkgout)?;
    let out = ctx.archive_path(&config.pkgout);

    println!("Packaging {}...", out.display());
    let result = Cmd::new("tar")
        .arg(format!("-c{}f", ctx.codec.tar_letter()))
        .arg_path(&out)
        .args(["-C"])
        .arg_path(&ctx.stage)
        .arg(".")
        .lenient()
        .capture()
        .map_err(|e| Error::PackagingFailed(e.to_string()))?;

    if !result.success() {
        let _ = fs::remove_file(&out);
        return Err(Error::PackagingFailed(result.stderr_trimmed().to_string()));
    }

    let metadata = fs::metadata(&out)?;
    let size_mb = metadata.len() as f64 / 1024.0 / 1024.0;
    println!("  Archive size: {:.2} MB", size_mb);

    Ok(out)
}

/// List an archive's table of contents, one entry per line as tar prints
/// them (directories keep their trailing slash).
pub fn list(archive: &Path) -> Result<Vec<String>> {
    let result = Cmd::new("tar")
        .arg("-tf")
        .arg_path(archive)
        .on_fail(format!("Failed to list {}", archive.display()))
        .capture()?;

    Ok(result
        .stdout
        .lines()
        .map(str::to_string)
        .filter(|l| !l.is_empty())
        .collect())
}

/// Extract a package archive onto the given root, preserving permissions.
pub fn unpack(archive: &Path, root: &Path, codec: Option<Codec>) -> Result<()> {
    fs::create_dir_all(root)?;
    let flags = match codec {
        Some(c) => format!("-xp{}f", c.tar_letter()),
        None => "-xpf".to_string(),
    };
    Cmd::new("tar")
        .arg(flags)
        .arg_path(archive)
        .args(["-C"])
        .arg_path(root)
        .on_fail(format!("Failed to extract {}", archive.display()))
        .capture()?;
    Ok(())
}

/// Infer the codec from a package archive's filename.
pub fn codec_of(archive: &Path) -> Option<Codec> {
    let name = archive.file_name()?.to_string_lossy();
    let ext = name.rsplit('.').next()?;
    Codec::parse(ext)
}
