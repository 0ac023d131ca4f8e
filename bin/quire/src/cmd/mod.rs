//! Command implementations.

pub mod build;
pub mod check;

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use quire_core::{Config, Site};
use quire_generator::build::CONFIG_FILE;

/// Configuration file path: `config` if given (relative to `root`), else
/// `quire.toml` in the site root.
pub fn config_path(root: &Path, config: Option<&Path>) -> PathBuf {
    root.join(config.unwrap_or_else(|| Path::new(CONFIG_FILE)))
}

/// Load the configuration with environment overrides, then the site.
pub fn load_site(root: &Path, config: &Path, adjust: impl FnOnce(&mut Config)) -> Result<Site> {
    let mut config = Config::load_with_env(config)
        .wrap_err_with(|| format!("Failed to load configuration from {}", config.display()))?;
    adjust(&mut config);
    tracing::debug!(?config, "Loaded configuration");

    Site::load(root, config).wrap_err("Failed to load data tables")
}
