//! Layouts and layout chain resolution.
//!
//! A layout is a template with a `{{ content }}` insertion point and an
//! optional parent. Rendering a unit walks the chain from the innermost
//! layout out to the root.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use quire_core::{ContentUnit, CoreError, Frontmatter, LayoutChoice, Value, parse_frontmatter};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::template::{FragmentRegistry, Template, TemplateError};

/// Layout resolution errors.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The parent graph loops.
    #[error("layout cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A layout name that no file defines.
    #[error("unknown layout `{name}` referenced by {referenced_by}")]
    Unknown { name: String, referenced_by: String },

    /// Two files map to the same layout name.
    #[error("layout `{name}` is defined more than once")]
    Duplicate { name: String },

    /// Layout front matter is malformed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Layout body failed to parse.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Layout directory could not be walked.
    #[error("failed to read layouts from {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// A named layout.
#[derive(Debug, Clone)]
pub struct Layout {
    pub name: String,

    /// Parent layout name.
    pub parent: Option<String>,

    /// Front matter, exposed to templates as `layout.*`.
    pub metadata: Frontmatter,

    pub template: Template,
}

impl Layout {
    /// Parse a layout from source with optional front matter.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let template_name = format!("layouts/{name}");
        let (metadata, body) = parse_frontmatter(source, Path::new(&template_name))?;
        let template = Template::parse(template_name, &body)?;

        Ok(Self {
            parent: metadata.parent_layout().map(str::to_string),
            name,
            metadata,
            template,
        })
    }

    /// The `layout` template namespace.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.metadata.values().clone();
        map.insert("name".into(), self.name.clone().into());
        Value::Map(map)
    }
}

/// Name-keyed layouts.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: BTreeMap<String, Layout>,
}

impl LayoutRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file below `dir`; the name is the relative path without
    /// the extension.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        if !dir.exists() {
            return Ok(registry);
        }

        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry.map_err(|source| LayoutError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let name = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
            registry.insert(Layout::parse(name, &source)?)?;
        }

        debug!(count = registry.len(), "loaded layouts");
        Ok(registry)
    }

    /// Parse and register a layout.
    pub fn register(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        self.insert(Layout::parse(name, source)?)
    }

    pub fn insert(&mut self, layout: Layout) -> Result<()> {
        if self.layouts.contains_key(&layout.name) {
            return Err(LayoutError::Duplicate { name: layout.name });
        }
        self.layouts.insert(layout.name.clone(), layout);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.layouts.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// The chain for `name`, innermost first.
    pub fn resolve_chain(&self, name: &str, referenced_by: &str) -> Result<Vec<&Layout>> {
        let mut chain: Vec<&Layout> = Vec::new();
        let mut current = name;
        let mut referrer = referenced_by.to_string();

        loop {
            if let Some(pos) = chain.iter().position(|l| l.name == current) {
                let mut names: Vec<String> = chain[pos..].iter().map(|l| l.name.clone()).collect();
                names.push(current.to_string());
                return Err(LayoutError::Cycle { chain: names });
            }

            let layout = self.get(current).ok_or_else(|| LayoutError::Unknown {
                name: current.to_string(),
                referenced_by: referrer.clone(),
            })?;
            chain.push(layout);

            match layout.parent.as_deref() {
                Some(parent) => {
                    referrer = format!("layout `{}`", layout.name);
                    current = parent;
                }
                None => break,
            }
        }

        Ok(chain)
    }

    /// Resolve every layout, so cycles among unused layouts still fail.
    pub fn validate(&self) -> Result<()> {
        for name in self.layouts.keys() {
            self.resolve_chain(name, "layouts directory")?;
        }
        Ok(())
    }

    /// Every layout's includes name known fragments.
    pub fn check_fragments(&self, fragments: &FragmentRegistry) -> Result<()> {
        for layout in self.layouts.values() {
            fragments.check(&layout.template)?;
        }
        Ok(())
    }

    /// Pick the layout for `unit`: its own `layout` key, then the
    /// collection layout, then `default_layout` when it exists.
    #[must_use]
    pub fn select(
        &self,
        unit: &ContentUnit,
        collection_layout: Option<&str>,
        default_layout: &str,
    ) -> Option<String> {
        match unit.frontmatter.layout() {
            LayoutChoice::Named(name) => Some(name.to_string()),
            LayoutChoice::Disabled => None,
            LayoutChoice::Inherit => collection_layout
                .map(str::to_string)
                .or_else(|| self.contains(default_layout).then(|| default_layout.to_string())),
        }
    }
}
