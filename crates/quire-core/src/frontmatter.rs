//! Front matter parsing for content units, layouts and fragments.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{
    error::{CoreError, Result},
    value::{Map, Value},
};

/// Delimiter types for front matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML front matter delimited by `---`.
    Yaml,
    /// TOML front matter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Which layout a unit asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutChoice<'a> {
    /// No `layout` key: fall back to collection and site defaults.
    Inherit,
    /// `layout: none` or `layout: null`: emit the body unwrapped.
    Disabled,
    /// A named layout.
    Named(&'a str),
}

/// Metadata parsed from a front matter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    values: Map,
}

impl Frontmatter {
    /// Wrap an already parsed mapping.
    #[must_use]
    pub fn new(values: Map) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw access to any key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of a key, ignoring non-string values.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// All metadata, in key order.
    #[must_use]
    pub fn values(&self) -> &Map {
        &self.values
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get_str("title").filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.get_str("description").filter(|d| !d.is_empty())
    }

    #[must_use]
    pub fn permalink(&self) -> Option<&str> {
        self.get_str("permalink").filter(|p| !p.is_empty())
    }

    #[must_use]
    pub fn slug(&self) -> Option<&str> {
        self.get_str("slug").filter(|s| !s.is_empty())
    }

    /// Layout requested by this unit or layout.
    #[must_use]
    pub fn layout(&self) -> LayoutChoice<'_> {
        self.layout_key("layout")
    }

    /// Parent of a layout: `parent`, falling back to `layout`.
    #[must_use]
    pub fn parent_layout(&self) -> Option<&str> {
        let choice = match self.layout_key("parent") {
            LayoutChoice::Inherit => self.layout(),
            other => other,
        };
        match choice {
            LayoutChoice::Named(name) => Some(name),
            _ => None,
        }
    }

    fn layout_key(&self, key: &str) -> LayoutChoice<'_> {
        match self.get(key) {
            None => LayoutChoice::Inherit,
            Some(Value::Null) => LayoutChoice::Disabled,
            Some(Value::Bool(false)) => LayoutChoice::Disabled,
            Some(Value::String(s)) if s.is_empty() || s == "none" => LayoutChoice::Disabled,
            Some(Value::String(s)) => LayoutChoice::Named(s),
            Some(_) => LayoutChoice::Inherit,
        }
    }

    #[must_use]
    pub fn draft(&self) -> bool {
        self.get("draft").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether the unit may appear in the sitemap.
    #[must_use]
    pub fn indexable(&self) -> bool {
        let sitemap = self.get("sitemap").and_then(Value::as_bool).unwrap_or(true);
        let noindex = self.get("noindex").and_then(Value::as_bool).unwrap_or(false);
        sitemap && !noindex
    }

    /// Whether the body is expanded as a template before rendering. Off
    /// unless `render_with_liquid: true`.
    #[must_use]
    pub fn render_with_liquid(&self) -> bool {
        self.get("render_with_liquid")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// URL aliases from `aliases` or `redirect_from` (string or list).
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        ["aliases", "redirect_from"]
            .iter()
            .filter_map(|key| self.get(key))
            .flat_map(|value| match value {
                Value::String(s) => vec![s.clone()],
                Value::List(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Publication date from the `date` key.
    pub fn date(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        self.date_key("date", path)
    }

    /// Last-updated date from `updated` or `last_modified_at`.
    pub fn updated(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        match self.date_key("updated", path)? {
            Some(date) => Ok(Some(date)),
            None => self.date_key("last_modified_at", path),
        }
    }

    fn date_key(&self, key: &str, path: &Path) -> Result<Option<DateTime<Utc>>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => parse_date(raw).map(Some).ok_or_else(|| {
                CoreError::metadata(path, format!("`{key}` is not a recognised date: {raw}"))
            }),
            Some(other) => Err(CoreError::metadata(
                path,
                format!("`{key}` must be a date string, found {other:?}"),
            )),
        }
    }
}

/// Parse the date formats accepted in front matter and file names.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and
/// `YYYY-MM-DD`. Dates without an offset are taken as UTC.
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Split content into front matter and body.
///
/// Returns `Ok(None)` when the text does not open with a delimiter line.
/// A block that is opened but never closed is an error.
pub fn split_frontmatter<'a>(
    content: &'a str,
    path: &Path,
) -> Result<Option<(FrontmatterFormat, &'a str, &'a str)>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));

    let format = match first.trim_end() {
        "---" => FrontmatterFormat::Yaml,
        "+++" => FrontmatterFormat::Toml,
        _ => return Ok(None),
    };
    let delimiter = format.delimiter();

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == delimiter {
            let frontmatter = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return Ok(Some((format, frontmatter, body)));
        }
        offset += line.len();
    }

    Err(CoreError::metadata(
        path,
        format!("metadata block opened with `{delimiter}` is never closed"),
    ))
}

/// Parse front matter from a string.
///
/// Without a metadata block the whole text is returned unchanged as the body.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Frontmatter, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content, path)? else {
        return Ok((Frontmatter::default(), content.to_string()));
    };

    if fm_str.trim().is_empty() {
        return Ok((Frontmatter::default(), body.to_string()));
    }

    let value: Value = match format {
        FrontmatterFormat::Yaml => {
            serde_yaml::from_str(fm_str).map_err(|e| CoreError::metadata(path, e.to_string()))?
        }
        FrontmatterFormat::Toml => {
            toml::from_str(fm_str).map_err(|e| CoreError::metadata(path, e.to_string()))?
        }
    };

    let values = match value {
        Value::Map(map) => map,
        Value::Null => Map::new(),
        _ => {
            return Err(CoreError::metadata(
                path,
                "metadata block must be a mapping of keys to values",
            ));
        }
    };

    Ok((Frontmatter::new(values), body.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_split_yaml_frontmatter() {
        let content = "---\ntitle: \"Hello World\"\ndate: 2024-01-14\n---\n\nThis is the body content.";

        let (format, fm, body) = split_frontmatter(content, Path::new("a.md"))
            .expect("split")
            .expect("block");
        assert_eq!(format, FrontmatterFormat::Yaml);
        assert!(fm.contains("title:"));
        assert!(body.starts_with("This is the body"));
    }

    #[test]
    fn test_split_toml_frontmatter() {
        let content = "+++\ntitle = \"Hello World\"\n+++\n\nThis is the body content.";

        let (format, fm, body) = split_frontmatter(content, Path::new("a.md"))
            .expect("split")
            .expect("block");
        assert_eq!(format, FrontmatterFormat::Toml);
        assert!(fm.contains("title ="));
        assert!(body.starts_with("This is the body"));
    }

    #[test]
    fn test_no_frontmatter_returns_text_unchanged() {
        let content = "  Just some content without frontmatter.\n---\n";
        let (fm, body) = parse_frontmatter(content, Path::new("a.md")).expect("parse");
        assert!(fm.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn test_horizontal_rule_is_not_a_block() {
        let content = "----\ntext\n----\n";
        assert!(
            split_frontmatter(content, Path::new("a.md"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_unclosed_block_is_malformed() {
        let content = "---\ntitle: Oops\n\nNo closing delimiter here.";
        let err = parse_frontmatter(content, Path::new("content/oops.md")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedMetadata { .. }));
        assert!(err.to_string().contains("content/oops.md"));
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn test_duplicate_key_is_malformed() {
        let content = "---\ntitle: One\ntitle: Two\n---\nBody";
        let err = parse_frontmatter(content, Path::new("dup.md")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedMetadata { .. }));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_duplicate_toml_key_is_malformed() {
        let content = "+++\ntitle = \"One\"\ntitle = \"Two\"\n+++\nBody";
        let err = parse_frontmatter(content, Path::new("dup.md")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_non_mapping_block_is_malformed() {
        let content = "---\n- a\n- b\n---\nBody";
        let err = parse_frontmatter(content, Path::new("list.md")).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn test_empty_block_is_empty_mapping() {
        let (fm, body) = parse_frontmatter("---\n---\nBody", Path::new("a.md")).unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_parse_yaml_frontmatter() {
        let content = r#"---
title: "Test Post"
date: 2024-01-14T10:00:00Z
draft: false
layout: post
custom_field: "custom value"
tags:
  - rust
  - test
---

Content here."#;

        let (fm, body) = parse_frontmatter(content, Path::new("test.md")).expect("parse");

        assert_eq!(fm.title(), Some("Test Post"));
        assert_eq!(fm.layout(), LayoutChoice::Named("post"));
        assert!(!fm.draft());
        assert_eq!(fm.get_str("custom_field"), Some("custom value"));
        let date = fm.date(Path::new("test.md")).unwrap().unwrap();
        assert_eq!((date.year(), date.month(), date.day(), date.hour()), (2024, 1, 14, 10));
        assert_eq!(body, "Content here.");
    }

    #[test]
    fn test_parse_toml_frontmatter() {
        let content = "+++\ntitle = \"Test Post\"\ndraft = true\ndate = 2024-01-14\n+++\n\nContent here.";

        let (fm, body) = parse_frontmatter(content, Path::new("test.md")).expect("parse");

        assert_eq!(fm.title(), Some("Test Post"));
        assert!(fm.draft());
        assert!(fm.date(Path::new("test.md")).unwrap().is_some());
        assert_eq!(body, "Content here.");
    }

    #[test]
    fn test_layout_choices() {
        let (fm, _) = parse_frontmatter("---\nlayout: none\n---\n", Path::new("a.md")).unwrap();
        assert_eq!(fm.layout(), LayoutChoice::Disabled);
        let (fm, _) = parse_frontmatter("---\nlayout: ~\n---\n", Path::new("a.md")).unwrap();
        assert_eq!(fm.layout(), LayoutChoice::Disabled);
        let (fm, _) = parse_frontmatter("---\ntitle: x\n---\n", Path::new("a.md")).unwrap();
        assert_eq!(fm.layout(), LayoutChoice::Inherit);
    }

    #[test]
    fn test_parent_layout_accepts_both_keys() {
        let (fm, _) = parse_frontmatter("---\nparent: default\n---\n", Path::new("l")).unwrap();
        assert_eq!(fm.parent_layout(), Some("default"));
        let (fm, _) = parse_frontmatter("---\nlayout: base\n---\n", Path::new("l")).unwrap();
        assert_eq!(fm.parent_layout(), Some("base"));
        let (fm, _) = parse_frontmatter("<p>x</p>", Path::new("l")).unwrap();
        assert_eq!(fm.parent_layout(), None);
    }

    #[test]
    fn test_aliases_string_or_list() {
        let (fm, _) = parse_frontmatter(
            "---\naliases: /old/\nredirect_from: [/a/, /b/]\n---\n",
            Path::new("a.md"),
        )
        .unwrap();
        assert_eq!(fm.aliases(), vec!["/old/", "/a/", "/b/"]);
    }

    #[test]
    fn test_indexable() {
        let (fm, _) = parse_frontmatter("---\nsitemap: false\n---\n", Path::new("a")).unwrap();
        assert!(!fm.indexable());
        let (fm, _) = parse_frontmatter("---\nnoindex: true\n---\n", Path::new("a")).unwrap();
        assert!(!fm.indexable());
        assert!(Frontmatter::default().indexable());
    }

    #[test]
    fn test_render_with_liquid_is_opt_in() {
        assert!(!Frontmatter::default().render_with_liquid());
        let (fm, _) =
            parse_frontmatter("---
render_with_liquid: true
---
", Path::new("a")).unwrap();
        assert!(fm.render_with_liquid());
        let (fm, _) =
            parse_frontmatter("---
render_with_liquid: yes please
---
", Path::new("a")).unwrap();
        assert!(!fm.render_with_liquid());
    }

    #[test]
    fn test_invalid_date_is_malformed() {
        let (fm, _) = parse_frontmatter("---\ndate: someday\n---\n", Path::new("a.md")).unwrap();
        let err = fm.date(Path::new("a.md")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-01-14").is_some());
        assert!(parse_date("2024-01-14 08:30:00").is_some());
        assert!(parse_date("2024-01-14T08:30:00").is_some());
        assert!(parse_date("2024-01-14T08:30:00+02:00").is_some());
        assert!(parse_date("14/01/2024").is_none());
    }
}
