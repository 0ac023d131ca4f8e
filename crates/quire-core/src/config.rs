//! Site configuration management.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    value::{Map, Value},
};

/// Main configuration structure for Quire.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Site-wide settings.
    pub site: SiteConfig,

    /// Default permalink pattern for units outside any collection.
    #[serde(default = "default_permalink")]
    pub permalink: String,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Named collections keyed by collection name.
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,

    /// Navigation settings.
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Feed settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Sitemap settings.
    #[serde(default)]
    pub sitemap: SitemapConfig,

    /// Stylesheet pipeline settings.
    #[serde(default)]
    pub styles: StylesConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    pub title: String,

    /// Base URL for the site (e.g., "https://example.com").
    pub base_url: String,

    /// Language code.
    #[serde(default = "default_language")]
    pub language: String,

    /// Site description for meta tags and the feed.
    #[serde(default)]
    pub description: Option<String>,

    /// Site author name.
    #[serde(default)]
    pub author: Option<String>,

    /// Arbitrary site settings available to templates as `site.<key>`.
    #[serde(default, flatten)]
    pub extra: Map,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Content units directory, relative to the source root.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Layout templates directory.
    #[serde(default = "default_layouts_dir")]
    pub layouts_dir: String,

    /// Fragment (include) templates directory.
    #[serde(default = "default_includes_dir")]
    pub includes_dir: String,

    /// Data tables directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Files copied verbatim into the output.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Stylesheet sources for the asset pipeline.
    #[serde(default = "default_styles_dir")]
    pub styles_dir: String,

    /// Output directory for the generated site.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Whether to render drafts.
    #[serde(default)]
    pub drafts: bool,

    /// Layout used when neither the unit nor its collection names one.
    #[serde(default = "default_layout")]
    pub default_layout: String,

    /// Syntax highlighting theme name.
    #[serde(default = "default_highlight_theme")]
    pub highlight_theme: String,
}

/// A named group of content units sharing a source root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Directory under the content dir; defaults to the collection name.
    #[serde(default)]
    pub source: Option<String>,

    /// Permalink pattern for members.
    #[serde(default)]
    pub permalink: Option<String>,

    /// Default layout for members.
    #[serde(default)]
    pub layout: Option<String>,

    /// Metadata key members are ordered by.
    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    /// Whether the order is reversed (newest first for dates).
    #[serde(default = "default_true")]
    pub reverse: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            source: None,
            permalink: None,
            layout: None,
            sort_by: default_sort_by(),
            reverse: true,
        }
    }
}

impl CollectionConfig {
    /// Source directory, falling back to the collection name.
    #[must_use]
    pub fn source_dir<'a>(&'a self, name: &'a str) -> &'a str {
        self.source
            .as_deref()
            .map(|s| s.trim_matches('/'))
            .unwrap_or(name)
    }
}

/// Navigation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Data table holding the navigation tree.
    #[serde(default = "default_navigation_table")]
    pub table: String,
}

/// Feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Whether the feed is generated.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Collection the feed is built from.
    #[serde(default = "default_feed_collection")]
    pub collection: String,

    /// Maximum number of items in the feed.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,

    /// Output file for the feed.
    #[serde(default = "default_feed_path")]
    pub path: String,
}

/// Sitemap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapConfig {
    /// Whether the sitemap is generated.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output file for the sitemap.
    #[serde(default = "default_sitemap_path")]
    pub path: String,
}

/// Stylesheet pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Source files relative to the styles dir, in order. Empty means every
    /// `.css` file in the directory, sorted by path.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Output file for the compiled stylesheet.
    #[serde(default = "default_styles_output")]
    pub output: String,

    /// Whether to minify the compiled stylesheet.
    #[serde(default)]
    pub minify: bool,

    /// Whether to add a content hash to the output file name.
    #[serde(default)]
    pub fingerprint: bool,
}

// Default value functions
fn default_permalink() -> String {
    "pretty".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_content_dir() -> String {
    "content".to_string()
}

fn default_layouts_dir() -> String {
    "layouts".to_string()
}

fn default_includes_dir() -> String {
    "includes".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_styles_dir() -> String {
    "styles".to_string()
}

fn default_output_dir() -> String {
    "public".to_string()
}

fn default_layout() -> String {
    "default".to_string()
}

fn default_highlight_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_sort_by() -> String {
    "date".to_string()
}

fn default_true() -> bool {
    true
}

fn default_navigation_table() -> String {
    "navigation".to_string()
}

fn default_feed_collection() -> String {
    "posts".to_string()
}

fn default_feed_limit() -> usize {
    20
}

fn default_feed_path() -> String {
    "feed.xml".to_string()
}

fn default_sitemap_path() -> String {
    "sitemap.xml".to_string()
}

fn default_styles_output() -> String {
    "assets/site.css".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            layouts_dir: default_layouts_dir(),
            includes_dir: default_includes_dir(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            styles_dir: default_styles_dir(),
            output_dir: default_output_dir(),
            drafts: false,
            default_layout: default_layout(),
            highlight_theme: default_highlight_theme(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            table: default_navigation_table(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection: default_feed_collection(),
            limit: default_feed_limit(),
            path: default_feed_path(),
        }
    }
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_sitemap_path(),
        }
    }
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            output: default_styles_output(),
            minify: false,
            fingerprint: false,
        }
    }
}

impl SiteConfig {
    /// Build a minimal site configuration.
    #[must_use]
    pub fn new(title: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            base_url: base_url.into(),
            language: default_language(),
            description: None,
            author: None,
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Configuration with defaults for everything but the site identity.
    #[must_use]
    pub fn new(site: SiteConfig) -> Self {
        Self {
            site,
            permalink: default_permalink(),
            build: BuildConfig::default(),
            collections: BTreeMap::new(),
            navigation: NavigationConfig::default(),
            feed: FeedConfig::default(),
            sitemap: SitemapConfig::default(),
            styles: StylesConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CoreError::config_with_source("Failed to parse config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `QUIRE__SECTION__KEY` environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("QUIRE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.site.title.is_empty() {
            return Err(CoreError::config("site.title cannot be empty"));
        }

        if self.site.base_url.is_empty() {
            return Err(CoreError::config("site.base_url cannot be empty"));
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!("site.base_url should not have a trailing slash");
        }

        for (name, collection) in &self.collections {
            if collection.source_dir(name).is_empty() {
                return Err(CoreError::config(format!(
                    "collections.{name}.source cannot be empty"
                )));
            }
        }

        if self.feed.enabled && self.feed.limit == 0 {
            return Err(CoreError::config("feed.limit must be at least 1"));
        }

        Ok(())
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.site.base_url.trim_end_matches('/')
    }

    /// Get the full URL for a path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url();
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// The `site` namespace exposed to templates.
    #[must_use]
    pub fn site_value(&self) -> Value {
        let mut map = self.site.extra.clone();
        map.insert("title".into(), self.site.title.clone().into());
        map.insert("base_url".into(), self.base_url().into());
        map.insert("url".into(), self.base_url().into());
        map.insert("language".into(), self.site.language.clone().into());
        map.insert("description".into(), self.site.description.clone().into());
        map.insert("author".into(), self.site.author.clone().into());
        Value::Map(map)
    }
}
