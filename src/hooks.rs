//! Post-remove hook sink.
//!
//! Every executable in the hooks directory runs after a package removal,
//! sorted by name, with the package name as argv[1]. Hook failures are
//! warnings; they never fail the removal itself.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::config::Config;
use crate::process::Cmd;

/// Fire the removed-package event at every hook executable.
pub fn fire_removed(name: &str, config: &Config) {
    for hook in hook_executables(config) {
        let display = hook.display().to_string();
        match Cmd::new(&display)
            .arg(name)
            .env("PB_PKG_NAME", name)
            .lenient()
            .capture()
        {
            Ok(result) if result.success() => {}
            Ok(result) => eprintln!(
                "  [WARN] Hook {} exited with code {}",
                display,
                result.code()
            ),
            Err(e) => eprintln!("  [WARN] Hook {} failed to run: {}", display, e),
        }
    }
}

/// Executable files in the hooks directory, sorted by name.
fn hook_executables(config: &Config) -> Vec<PathBuf> {
    let entries = match fs::read_dir(&config.hooks) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut hooks: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .metadata()
                    .map(|m| m.permissions().mode() & 0o111 != 0)
                    .unwrap_or(false)
        })
        .collect();
    hooks.sort();
    hooks
}
