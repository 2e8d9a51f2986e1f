//! Configuration management for pbuild.
//!
//! All environment variables are read exactly once, at startup, into an
//! immutable `Config` that is threaded into every component. No component
//! reads the environment after this point.

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Compression codec for package archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Xz,
    Gz,
    Bz2,
}

impl Codec {
    /// Parse a `PKGCOMP` value. Returns None for unrecognized values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "xz" => Some(Codec::Xz),
            "gz" => Some(Codec::Gz),
            "bz2" => Some(Codec::Bz2),
            _ => None,
        }
    }

    /// File extension for archives using this codec.
    pub fn ext(&self) -> &'static str {
        match self {
            Codec::Xz => "xz",
            Codec::Gz => "gz",
            Codec::Bz2 => "bz2",
        }
    }

    /// The tar compression flag letter for this codec (as in `-cJf`).
    pub fn tar_letter(&self) -> char {
        match self {
            Codec::Xz => 'J',
            Codec::Gz => 'z',
            Codec::Bz2 => 'j',
        }
    }
}

/// Job count for child build tools: a fixed count, or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jobs {
    Count(usize),
    Auto,
}

impl Jobs {
    /// Parse a `JOBS` value. Returns None for unrecognized values.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "auto" {
            return Some(Jobs::Auto);
        }
        s.parse::<usize>().ok().filter(|n| *n > 0).map(Jobs::Count)
    }

    /// Resolve to a concrete count, using the online CPU count for `auto`.
    pub fn effective(&self) -> usize {
        match self {
            Jobs::Count(n) => *n,
            Jobs::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Color output preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Auto,
    Always,
    Never,
}

/// pbuild configuration, gathered once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for per-build working directories (`TMPROOT`).
    pub tmproot: PathBuf,
    /// Recipe tree root (`REPO`).
    pub repo: PathBuf,
    /// Cache of fetched source archives and patches (`SOURCES`).
    pub sources: PathBuf,
    /// Registry directory for metadata and manifests (`REGISTRO`).
    pub registry: PathBuf,
    /// Output directory for built package archives (`PKGOUT`).
    pub pkgout: PathBuf,
    /// Directory of post-remove hook executables (`HOOKS`).
    pub hooks: PathBuf,
    /// Installation root (`ROOT`, default `/`).
    pub root: PathBuf,
    /// Inherited `MAKEFLAGS`, if any.
    pub makeflags: Option<String>,
    /// Compile parallelism (`JOBS`).
    pub jobs: Jobs,
    /// Whether to strip ELF artifacts in the stage root (`STRIP`).
    pub strip: bool,
    /// Package archive compression codec (`PKGCOMP`).
    pub codec: Codec,
    /// Color preference (`COLOR`), consumed at the CLI surface.
    pub color: Color,
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn load() -> Self {
        // A missing .env file is fine; read errors are worth a warning.
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("  [WARN] Failed to load .env file: {}", e);
            }
        }

        let dir = |key: &str, default: &str| -> PathBuf {
            env::var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };

        let jobs = match env::var("JOBS") {
            Ok(v) => Jobs::parse(&v).unwrap_or_else(|| {
                eprintln!("  [WARN] JOBS={} is not a count or 'auto', using auto", v);
                Jobs::Auto
            }),
            Err(_) => Jobs::Auto,
        };

        let strip = match env::var("STRIP").as_deref() {
            Ok("no") => false,
            Ok("yes") | Err(_) => true,
            Ok(v) => {
                eprintln!("  [WARN] STRIP={} is not yes/no, stripping enabled", v);
                true
            }
        };

        let codec = match env::var("PKGCOMP") {
            Ok(v) => Codec::parse(&v).unwrap_or_else(|| {
                eprintln!("  [WARN] PKGCOMP={} is not xz/gz/bz2, using xz", v);
                Codec::Xz
            }),
            Err(_) => Codec::Xz,
        };

        let color = match env::var("COLOR").as_deref() {
            Ok("always") => Color::Always,
            Ok("never") => Color::Never,
            _ => Color::Auto,
        };

        Self {
            tmproot: dir("TMPROOT", "/tmp/pbuild"),
            repo: dir("REPO", "/var/lib/pbuild/repo"),
            sources: dir("SOURCES", "/var/cache/pbuild/sources"),
            registry: dir("REGISTRO", "/var/lib/pbuild/registry"),
            pkgout: dir("PKGOUT", "/var/cache/pbuild/packages"),
            hooks: dir("HOOKS", "/etc/pbuild/hooks"),
            root: dir("ROOT", "/"),
            makeflags: env::var("MAKEFLAGS").ok().filter(|s| !s.is_empty()),
            jobs,
            strip,
            codec,
            color,
        }
    }

    /// Whether output to stderr should use color.
    pub fn color_enabled(&self) -> bool {
        match self.color {
            Color::Always => true,
            Color::Never => false,
            Color::Auto => std::io::stderr().is_terminal(),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  TMPROOT:  {}", self.tmproot.display());
        println!("  REPO:     {}", self.repo.display());
        println!("  SOURCES:  {}", self.sources.display());
        println!("  REGISTRO: {}", self.registry.display());
        println!("  PKGOUT:   {}", self.pkgout.display());
        println!("  HOOKS:    {}", self.hooks.display());
        println!("  ROOT:     {}", self.root.display());
        println!("  JOBS:     {}", self.jobs.effective());
        println!("  STRIP:    {}", if self.strip { "yes" } else { "no" });
        println!("  PKGCOMP:  {}", self.codec.ext());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_parse() {
        assert_eq!(Jobs::parse("auto"), Some(Jobs::Auto));
        assert_eq!(Jobs::parse("8"), Some(Jobs::Count(8)));
        assert_eq!(Jobs::parse("0"), None);
        assert_eq!(Jobs::parse("fast"), None);
    }

    #[test]
    fn test_jobs_effective_count() {
        assert_eq!(Jobs::Count(3).effective(), 3);
        assert!(Jobs::Auto.effective() >= 1);
    }

    #[test]
    fn test_codec_parse() {
        assert_eq!(Codec::parse("xz"), Some(Codec::Xz));
        assert_eq!(Codec::parse("gz"), Some(Codec::Gz));
        assert_eq!(Codec::parse("bz2"), Some(Codec::Bz2));
        assert_eq!(Codec::parse("zstd"), None);
    }

    #[test]
    fn test_codec_flags() {
        assert_eq!(Codec::Xz.tar_letter(), 'J');
        assert_eq!(Codec::Gz.ext(), "gz");
    }
}
