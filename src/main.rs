use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use pbuild::build;
use pbuild::config::Config;
use pbuild::error::Error;
use pbuild::install;
use pbuild::remove;
use pbuild::revdep;
use pbuild::search;

#[derive(Parser)]
#[command(name = "pbuild", about = "Source-based package manager", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a recipe: fetch, compile, package, install, register
    Build {
        /// Path to the recipe file
        recipe: PathBuf,
        /// Re-extract sources and rebuild even when artifacts exist
        #[arg(long)]
        rebuild: bool,
    },
    /// Install a previously built package archive
    Install {
        /// Path to a {name}-{version}.tar.{xz|gz|bz2} archive
        archive: PathBuf,
    },
    /// Remove an installed package using its file manifest
    Remove {
        /// Installed package name
        name: String,
    },
    /// Show an installed package's metadata
    Info {
        /// Installed package name
        name: String,
    },
    /// Search the recipe tree
    Search {
        /// Term matched against recipe names and contents
        term: String,
    },
    /// Scan for binaries with missing shared libraries
    Revdep {
        /// Rebuild the packages that own the missing libraries
        #[arg(long)]
        fix: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load();

    let result = match &cli.command {
        Commands::Build { recipe, rebuild } => {
            build::build_recipe(recipe, &config, *rebuild).map(|_| ())
        }
        Commands::Install { archive } => install::install_file(archive, &config),
        Commands::Remove { name } => remove::remove(name, &config),
        Commands::Info { name } => search::info(name, &config),
        Commands::Search { term } => search::search(term, &config).map(|_| ()),
        Commands::Revdep { fix } => revdep::check(&config).and_then(|report| {
            if *fix {
                revdep::fix(&report, &config)?;
            }
            Ok(())
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if config.color_enabled() {
                eprintln!("\x1b[1;31merror:\x1b[0m {}", e);
            } else {
                eprintln!("error: {}", e);
            }
            // info reports a missing package with its own exit code
            let code = match (&cli.command, &e) {
                (Commands::Info { .. }, Error::UnknownPackage(_)) => 8,
                _ => e.exit_code(),
            };
            ExitCode::from(code)
        }
    }
}
