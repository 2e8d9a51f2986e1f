//! Source provisioning: fetch, verify, extract, patch.
//!
//! Both acquisition modes are normalized to "there is a local archive in
//! the sources cache": HTTP downloads land there directly, git clones are
//! flattened to a tar stream of HEAD. Extraction and patching then work the
//! same way regardless of origin.

use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::process::Cmd;
use crate::recipe::Vcs;

/// Supported archive formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarXz,
    TarGz,
    TarBz2,
    Tar,
    Zip,
    RawXz,
    RawGz,
    RawBz2,
}

/// Classify an archive by its filename extension.
pub fn classify(name: &str) -> Option<ArchiveKind> {
    if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some(ArchiveKind::TarXz)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        Some(ArchiveKind::TarBz2)
    } else if name.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else if name.ends_with(".zip") {
        Some(ArchiveKind::Zip)
    } else if name.ends_with(".xz") {
        Some(ArchiveKind::RawXz)
    } else if name.ends_with(".gz") {
        Some(ArchiveKind::RawGz)
    } else if name.ends_with(".bz2") {
        Some(ArchiveKind::RawBz2)
    } else {
        None
    }
}

/// Last path component of a URL.
pub fn url_basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Deduce the extraction top directory from the archive basename:
/// the basename with its archive extensions stripped.
pub fn deduce_source_dir(url: &str) -> String {
    let base = url_basename(url);
    for suffix in [
        ".tar.xz", ".tar.gz", ".tar.bz2", ".txz", ".tgz", ".tbz2", ".tar", ".zip", ".xz",
        ".gz", ".bz2",
    ] {
        if let Some(stripped) = base.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    base.to_string()
}

/// Ensure the source tree is present at `{work}/src/{source_dir}` with all
/// patches applied.
pub fn provision(ctx: &BuildContext, config: &Config) -> Result<()> {
    fs::create_dir_all(&config.sources)?;
    fs::create_dir_all(&ctx.work)?;

    let archive = config.sources.join(url_basename(&ctx.recipe.source_url));

    if archive.exists() {
        println!("Archive already cached: {}", archive.display());
    } else {
        match ctx.recipe.vcs {
            Vcs::Http => fetch_http(&ctx.recipe.source_url, &archive)?,
            Vcs::Git => fetch_git(ctx, &archive)?,
        }
    }

    if let Some(expected) = &ctx.recipe.checksum {
        verify_checksum(&archive, expected)?;
    }

    let source_top = ctx.source_top();
    if source_top.exists() && !ctx.rebuild {
        println!("Source tree already extracted: {}", source_top.display());
        return Ok(());
    }
    if ctx.src.exists() && ctx.rebuild {
        fs::remove_dir_all(&ctx.src)?;
    }
    fs::create_dir_all(&ctx.src)?;

    extract(ctx, &archive)?;

    if !source_top.exists() {
        return Err(Error::Other(anyhow::anyhow!(
            "extraction of {} did not produce {}",
            archive.display(),
            source_top.display()
        )));
    }

    apply_patches(ctx, config, &source_top)?;
    Ok(())
}

/// Download an archive over HTTP, following redirects. Fails on non-2xx.
fn fetch_http(url: &str, archive: &Path) -> Result<()> {
    println!("Downloading {}...", url);
    let part = archive.with_extension("part");

    let status = Cmd::new("curl")
        .args(["-f", "-L", "--progress-bar", "-o"])
        .arg_path(&part)
        .arg(url)
        .lenient()
        .stream()
        .map_err(|e| Error::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !status.success() {
        let _ = fs::remove_file(&part);
        return Err(Error::FetchFailed {
            url: url.to_string(),
            reason: format!("curl exited with status {}", status),
        });
    }

    fs::rename(&part, archive)?;
    println!("Downloaded to {}", archive.display());
    Ok(())
}

/// Shallow-clone a git repository and flatten HEAD into a tar archive.
///
/// The archive is prefixed with the recipe's source_dir so extraction
/// behaves exactly like the tarball path.
fn fetch_git(ctx: &BuildContext, archive: &Path) -> Result<()> {
    let url = &ctx.recipe.source_url;
    let scratch = ctx.work.join("git-clone");
    if scratch.exists() {
        fs::remove_dir_all(&scratch)?;
    }

    println!("Cloning {}...", url);
    let mut clone = Cmd::new("git").args(["clone", "--depth", "1"]);
    if let Some(branch) = &ctx.recipe.vcs_branch {
        clone = clone.args(["--branch", branch.as_str()]);
    }
    let status = clone
        .arg(url)
        .arg_path(&scratch)
        .lenient()
        .stream()
        .map_err(|e| Error::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    if !status.success() {
        return Err(Error::FetchFailed {
            url: url.to_string(),
            reason: format!("git clone exited with status {}", status),
        });
    }

    let result = Cmd::new("git")
        .args(["-C"])
        .arg_path(&scratch)
        .args(["archive", "--format=tar"])
        .arg(format!("--prefix={}/", ctx.source_dir))
        .args(["-o"])
        .arg_path(archive)
        .arg("HEAD")
        .lenient()
        .capture()
        .map_err(|e| Error::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    let _ = fs::remove_dir_all(&scratch);

    if !result.success() {
        return Err(Error::FetchFailed {
            url: url.to_string(),
            reason: format!("git archive failed: {}", result.stderr_trimmed()),
        });
    }
    Ok(())
}

/// Verify the archive's SHA-256 digest against the recipe checksum.
fn verify_checksum(archive: &Path, expected: &str) -> Result<()> {
    let actual = sha256_hex(archive)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(Error::ChecksumMismatch {
            path: archive.to_path_buf(),
            expected: expected.trim().to_string(),
            actual,
        });
    }
    println!("Checksum OK: {}", archive.display());
    Ok(())
}

/// SHA-256 hex digest of a file.
pub fn sha256_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extract the archive into the source area, dispatching on extension.
fn extract(ctx: &BuildContext, archive: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // git-origin archives are plain tar streams regardless of URL suffix
    let kind = if ctx.recipe.vcs == Vcs::Git {
        ArchiveKind::Tar
    } else {
        classify(&name).ok_or_else(|| Error::UnsupportedArchive(name.clone()))?
    };

    println!("Extracting {}...", name);
    match kind {
        ArchiveKind::TarXz => untar(archive, &ctx.src, "-xJf")?,
        ArchiveKind::TarGz => untar(archive, &ctx.src, "-xzf")?,
        ArchiveKind::TarBz2 => untar(archive, &ctx.src, "-xjf")?,
        ArchiveKind::Tar => untar(archive, &ctx.src, "-xf")?,
        ArchiveKind::Zip => {
            Cmd::new("unzip")
                .args(["-q", "-o"])
                .arg_path(archive)
                .args(["-d"])
                .arg_path(&ctx.src)
                .on_fail("unzip failed")
                .capture()?;
        }
        ArchiveKind::RawXz => decompress_then_place(archive, &ctx.src, "xz")?,
        ArchiveKind::RawGz => decompress_then_place(archive, &ctx.src, "gzip")?,
        ArchiveKind::RawBz2 => decompress_then_place(archive, &ctx.src, "bzip2")?,
    }
    Ok(())
}

fn untar(archive: &Path, dest: &Path, flags: &str) -> Result<()> {
    Cmd::new("tar")
        .arg(flags)
        .arg_path(archive)
        .args(["-C"])
        .arg_path(dest)
        .on_fail("tar extraction failed")
        .capture()?;
    Ok(())
}

/// Handle a bare .xz/.gz/.bz2: decompress, then untar the result if it is
/// itself a tar stream, otherwise leave the decompressed file in place.
fn decompress_then_place(archive: &Path, dest: &Path, tool: &str) -> Result<()> {
    let name = archive
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "decompressed".to_string());
    let out_path = dest.join(&name);
    let out_file = File::create(&out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;

    let status = Command::new(tool)
        .arg("-dc")
        .arg(archive)
        .stdout(Stdio::from(out_file))
        .status()
        .with_context(|| format!("Failed to execute '{}'. Is it installed?", tool))?;
    if !status.success() {
        return Err(Error::Other(anyhow::anyhow!(
            "{} -dc failed on {}",
            tool,
            archive.display()
        )));
    }

    let listable = Cmd::new("tar")
        .arg("-tf")
        .arg_path(&out_path)
        .lenient()
        .capture()?;
    if listable.success() {
        untar(&out_path, dest, "-xf")?;
        fs::remove_file(&out_path)?;
    }
    Ok(())
}

/// Apply the recipe's patches in order, -p1 against the source top.
fn apply_patches(ctx: &BuildContext, config: &Config, source_top: &Path) -> Result<()> {
    for patch in &ctx.recipe.patches {
        let patch_path = config.sources.join(patch);
        if !patch_path.is_file() {
            eprintln!("  [WARN] Patch not found in sources cache: {}", patch);
            return Err(Error::PatchFailed {
                patch: patch.clone(),
            });
        }

        println!("Applying patch {}...", patch);
        let result = Cmd::new("patch")
            .args(["-p1", "-i"])
            .arg_path(&patch_path)
            .workdir(source_top)
            .lenient()
            .capture()
            .map_err(Error::Other)?;

        if !result.success() {
            eprintln!("{}", result.stderr_trimmed());
            return Err(Error::PatchFailed {
                patch: patch.clone(),
            });
        }
    }
    Ok(())
}
