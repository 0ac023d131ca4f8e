//! Quire Core Library
//!
//! Core types, configuration, data tables, front matter and error handling
//! for the Quire static site compositor.

pub mod config;
pub mod content;
pub mod data;
pub mod error;
pub mod frontmatter;
pub mod site;
pub mod value;

pub use config::{CollectionConfig, Config, SiteConfig};
pub use content::{ContentType, ContentUnit, SourceName, slugify};
pub use data::{DataTables, load_data_tables};
pub use error::{CoreError, Result};
pub use frontmatter::{Frontmatter, LayoutChoice, parse_frontmatter};
pub use site::Site;
pub use value::{Map, Value};
