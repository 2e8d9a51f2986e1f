//! Recipe-tree search and installed-package reporting.

use std::fs;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::registry::Registry;

/// Search the recipe tree for a term: recipe filename stems match as
/// packages, file contents match as `path:line` hits. Returns the number
/// of matches printed.
pub fn search(term: &str, config: &Config) -> Result<usize> {
    let mut matches = 0usize;

    for entry in WalkDir::new(&config.repo)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().map(|e| e != "pbuild").unwrap_or(true) {
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.contains(term) {
            println!("{}", path.display());
            matches += 1;
            continue;
        }

        let Ok(content) = fs::read_to_string(path) else {
            continue;
        };
        for (lineno, line) in content.lines().enumerate() {
            if line.contains(term) {
                println!("{}:{}: {}", path.display(), lineno + 1, line.trim());
                matches += 1;
            }
        }
    }

    if matches == 0 {
        println!("No recipes match '{}' under {}", term, config.repo.display());
    }
    Ok(matches)
}

/// Pretty-print an installed package's metadata record and manifest size.
pub fn info(name: &str, config: &Config) -> Result<()> {
    let registry = Registry::open(&config.registry);
    let meta = registry.get_metadata(name)?;
    let manifest = registry.get_manifest(name)?;

    println!("Package:  {}", meta.name);
    println!("Version:  {}", meta.version);
    if !meta.recipe.is_empty() {
        println!("Recipe:   {}", meta.recipe);
    }
    println!("Built:    {}", meta.date);
    println!("Stripped: {}", if meta.strip { "yes" } else { "no" });
    println!("Jobs:     {}", meta.jobs);
    println!("Files:    {}", manifest.len());
    Ok(())
}
