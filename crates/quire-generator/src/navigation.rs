//! Navigation tree and per-page "current" state.
//!
//! The tree comes from a data table (`data/navigation.yml` by default):
//!
//! ```yaml
//! - label: Home
//!   url: /
//! - label: Blog
//!   url: /blog/
//!   children:
//!     - { title: Archive, url: /blog/archive/ }
//! ```

use quire_core::{Map, Site, Value};
use tracing::warn;

/// One configured navigation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: String,

    /// Target URL; empty for pure group headings.
    pub url: String,

    pub children: Vec<NavItem>,
}

impl NavItem {
    /// Read an entry from a `{label|title, url|target, children}` map.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let label = value
            .get("label")
            .or_else(|| value.get("title"))
            .and_then(Value::as_str)?;
        let url = value
            .get("url")
            .or_else(|| value.get("target"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let children = value.get("children").map(parse_items).unwrap_or_default();

        Some(Self {
            label: label.to_string(),
            url: url.to_string(),
            children,
        })
    }
}

fn parse_items(value: &Value) -> Vec<NavItem> {
    let Some(items) = value.as_list() else {
        warn!("navigation table is not a list, ignoring it");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let parsed = NavItem::from_value(item);
            if parsed.is_none() {
                warn!(entry = %item, "navigation entry without a label, skipping");
            }
            parsed
        })
        .collect()
}

/// Navigation entry as seen by one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavState {
    pub label: String,
    pub url: String,

    /// The entry points at the page being rendered.
    pub current: bool,

    /// The entry or one of its descendants is current.
    pub active: bool,

    pub children: Vec<NavState>,
}

impl NavState {
    /// Template view: `{label, url, current, active, children}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("label".into(), self.label.clone().into());
        map.insert("title".into(), self.label.clone().into());
        map.insert("url".into(), self.url.clone().into());
        map.insert("current".into(), self.current.into());
        map.insert("active".into(), self.active.into());
        map.insert(
            "children".into(),
            Value::List(self.children.iter().map(Self::to_value).collect()),
        );
        Value::Map(map)
    }
}

/// The site navigation tree.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    items: Vec<NavItem>,
}

impl Navigation {
    #[must_use]
    pub fn new(items: Vec<NavItem>) -> Self {
        Self { items }
    }

    /// Read the configured navigation table. A missing table is an empty
    /// tree.
    #[must_use]
    pub fn from_site(site: &Site) -> Self {
        let table = &site.config.navigation.table;
        site.table(table)
            .map(|value| Self::new(parse_items(value)))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn items(&self) -> &[NavItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// States for the page at `url`.
    #[must_use]
    pub fn state_for(&self, url: &str) -> Vec<NavState> {
        let page = normalize_url(url);
        self.items
            .iter()
            .map(|item| state(item, page.as_deref()))
            .collect()
    }
}

fn state(item: &NavItem, page: Option<&str>) -> NavState {
    let children: Vec<NavState> = item.children.iter().map(|c| state(c, page)).collect();
    let current = page.is_some() && normalize_url(&item.url).as_deref() == page;
    let active = current || children.iter().any(|c| c.active);

    NavState {
        label: item.label.clone(),
        url: item.url.clone(),
        current,
        active,
        children,
    }
}

/// Canonical form used for comparisons; `None` for external or empty URLs.
///
/// Query strings and fragments are dropped, `index.html` collapses into its
/// directory and extensionless paths gain a trailing `/`.
fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || url.contains("://") || url.starts_with("//") || url.starts_with("mailto:") {
        return None;
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        return None;
    }
    let path = path.strip_suffix("index.html").unwrap_or(path);

    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);

    let has_extension = normalized
        .rsplit('/')
        .next()
        .is_some_and(|last| last.contains('.'));
    if !normalized.ends_with('/') && !has_extension {
        normalized.push('/');
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str, url: &str, children: Vec<NavItem>) -> NavItem {
        NavItem {
            label: label.into(),
            url: url.into(),
            children,
        }
    }

    fn nav() -> Navigation {
        Navigation::new(vec![
            item("Home", "/", vec![]),
            item(
                "Blog",
                "/blog/",
                vec![item("Archive", "/blog/archive", vec![])],
            ),
            item("GitHub", "https://github.com/", vec![]),
        ])
    }

    #[test]
    fn test_only_exact_match_is_current() {
        let states = nav().state_for("/blog/");
        assert!(!states[0].current);
        assert!(states[1].current);
        assert!(states[1].active);
        assert!(!states[1].children[0].current);

        let states = nav().state_for("/blog/hello/");
        assert!(states.iter().all(|s| !s.current));
    }

    #[test]
    fn test_descendant_marks_parent_active() {
        let states = nav().state_for("/blog/archive/");
        assert!(!states[1].current);
        assert!(states[1].active);
        assert!(states[1].children[0].current);
    }

    #[test]
    fn test_external_links_never_current() {
        let states = nav().state_for("https://github.com/");
        assert!(states.iter().all(|s| !s.current && !s.active));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("/blog").as_deref(), Some("/blog/"));
        assert_eq!(normalize_url("blog/index.html").as_deref(), Some("/blog/"));
        assert_eq!(normalize_url("/a.html#top").as_deref(), Some("/a.html"));
        assert_eq!(normalize_url("/index.html").as_deref(), Some("/"));
        assert_eq!(normalize_url("mailto:me@example.com"), None);
    }

    #[test]
    fn test_parse_from_value() {
        let value: Value = serde_yaml::from_str(
            "- label: Home\n  url: /\n- title: Docs\n  target: /docs/\n  children:\n    - { label: Setup, url: /docs/setup/ }\n- url: /no-label/\n",
        )
        .unwrap();

        let items = parse_items(&value);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].label, "Docs");
        assert_eq!(items[1].children[0].url, "/docs/setup/");
    }
}
