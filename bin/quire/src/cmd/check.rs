//! Check command - resolve and render everything, write nothing

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use quire_generator::Builder;

/// Run the check command.
///
/// Performs the whole build in memory so every error a real build would
/// hit is reported, but leaves the output directory alone.
pub fn run(root: &Path, config_path: &Path) -> Result<()> {
    tracing::info!(?root, ?config_path, "Checking site");

    println!("Checking configuration...");
    let site = super::load_site(root, config_path, |_| {})?;
    println!("  ✓ Configuration valid");

    println!("\nResolving and rendering...");
    let result = Builder::new(site).build().wrap_err("Check failed")?;
    println!("  ✓ {} pages", result.stats.pages);
    println!("  ✓ {} collections", result.stats.collections);
    println!("  ✓ {} redirects", result.stats.redirects);
    if let Some(feed) = &result.artifacts.feed {
        println!("  ✓ feed at {}", feed.file);
    }
    if let Some(sitemap) = &result.artifacts.sitemap {
        println!("  ✓ sitemap at {}", sitemap.file);
    }
    if let Some(sheet) = &result.artifacts.stylesheet {
        println!("  ✓ stylesheet at {}", sheet.file);
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}
