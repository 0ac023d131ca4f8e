//! Read-only site snapshot shared by every render.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    config::Config,
    data::{DataTables, load_data_tables},
    error::Result,
    value::Value,
};

/// Configuration plus data tables, loaded once per build.
///
/// Nothing mutates a `Site` after [`Site::load`], so renders share it by
/// reference across threads.
#[derive(Debug, Clone)]
pub struct Site {
    /// Source root the relative directories in `config.build` resolve against.
    pub root: PathBuf,

    /// Parsed configuration.
    pub config: Config,

    /// Data tables keyed by name.
    pub data: DataTables,

    site_value: Value,
    data_value: Value,
}

impl Site {
    /// Build a snapshot from already loaded parts.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: Config, data: DataTables) -> Self {
        let site_value = config.site_value();
        let data_value = Value::Map(data.clone());
        Self {
            root: root.into(),
            config,
            data,
            site_value,
            data_value,
        }
    }

    /// Load the data tables named by `config` below `root`.
    pub fn load(root: &Path, config: Config) -> Result<Self> {
        let data = load_data_tables(&root.join(&config.build.data_dir))?;
        info!(tables = data.len(), "data tables loaded");
        Ok(Self::new(root, config, data))
    }

    /// The `site` template namespace.
    #[must_use]
    pub fn site_value(&self) -> &Value {
        &self.site_value
    }

    /// The `data` template namespace.
    #[must_use]
    pub fn data_value(&self) -> &Value {
        &self.data_value
    }

    /// Look up a data table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    #[must_use]
    pub fn content_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.content_dir)
    }

    #[must_use]
    pub fn layouts_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.layouts_dir)
    }

    #[must_use]
    pub fn includes_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.includes_dir)
    }

    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.static_dir)
    }

    #[must_use]
    pub fn styles_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.styles_dir)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_load_reads_data_dir_from_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tables")).unwrap();
        fs::write(dir.path().join("tables/team.yml"), "- name: Ada\n").unwrap();

        let mut config = Config::new(SiteConfig::new("Test", "https://example.com"));
        config.build.data_dir = "tables".into();

        let site = Site::load(dir.path(), config).unwrap();
        assert!(site.table("team").is_some());
        assert!(site.data_value().get("team").is_some());
        assert_eq!(
            site.site_value().get("title"),
            Some(&Value::from("Test"))
        );
        assert_eq!(site.content_dir(), dir.path().join("content"));
    }

    #[test]
    fn test_site_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Site>();
    }
}
