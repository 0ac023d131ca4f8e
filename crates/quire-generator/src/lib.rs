//! Quire Generator Library
//!
//! Template composition and site assembly for Quire.
//!
//! # Modules
//!
//! - [`collector`] - Content discovery
//! - [`collection`] - Collection membership and output path claims
//! - [`permalink`] - Permalink patterns
//! - [`page`] - Resolved page metadata
//! - [`template`] - Template language and fragment registry
//! - [`layout`] - Layout registry and inheritance chains
//! - [`compose`] - Per-unit composition
//! - [`navigation`] - Navigation tree and per-page state
//! - [`sitemap`] - XML sitemap generation
//! - [`rss`] - RSS feed generation
//! - [`redirect`] - Alias redirect pages
//! - [`assets`] - Static files and the site stylesheet
//! - [`build`] - Build orchestration and publishing

pub mod assets;
pub mod build;
pub mod collection;
pub mod collector;
pub mod compose;
pub mod layout;
pub mod navigation;
pub mod page;
pub mod permalink;
pub mod redirect;
pub mod rss;
pub mod sitemap;
pub mod template;

pub use assets::{AssetManifest, AssetProcessor, CssBundler, StylesheetCompiler};
pub use build::{BuildError, BuildResult, BuildStats, Builder, build, publish};
pub use collection::{Collection, CollectionError, CollectionResolver};
pub use collector::ContentCollector;
pub use compose::Composer;
pub use layout::{Layout, LayoutError, LayoutRegistry};
pub use navigation::{NavState, Navigation};
pub use page::Page;
pub use rss::RssGenerator;
pub use sitemap::SitemapGenerator;
pub use template::{Context, FragmentRegistry, Template, TemplateError};
