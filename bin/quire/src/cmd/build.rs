//! Build command - composes and publishes the site

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use color_eyre::eyre::{Result, WrapErr};
use quire_generator::{Builder, publish};

/// Options of the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Output directory; `build.output_dir` below the root when unset.
    pub output: Option<PathBuf>,

    /// Include draft units.
    pub drafts: bool,

    /// Override `site.base_url`.
    pub base_url: Option<String>,
}

/// Run the build command.
///
/// Builds every page, then replaces the output directory in one step.
pub fn run(root: &Path, config_path: &Path, options: &BuildOptions) -> Result<()> {
    let start = Instant::now();
    tracing::info!(?root, ?config_path, ?options, "Starting build");

    let site = super::load_site(root, config_path, |config| {
        if options.drafts {
            config.build.drafts = true;
        }
        if let Some(base_url) = &options.base_url {
            tracing::info!(base_url = %base_url, "Overriding site base_url from CLI");
            config.site.base_url = base_url.clone();
        }
    })?;

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| root.join(&site.config.build.output_dir));

    let builder = Builder::new(site);
    let result = builder.build().wrap_err("Build failed")?;
    publish(&result, &output)
        .wrap_err_with(|| format!("Failed to publish to {}", output.display()))?;

    let stats = &result.stats;
    let duration = start.elapsed();

    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Pages:       {}", stats.pages);
    println!("  Collections: {}", stats.collections);
    println!("  Redirects:   {}", stats.redirects);
    println!("  Assets:      {}", stats.assets);
    println!();
    println!("  Duration:    {:.2}s", duration.as_secs_f64());
    println!("  Output:      {}", output.display());
    println!();

    tracing::info!(?stats, ?duration, "Build completed successfully");

    Ok(())
}
