//! A content unit after collection and output path resolution.

use chrono::{DateTime, SecondsFormat, Utc};
use quire_core::{ContentType, ContentUnit, Map, Value};

use crate::collection::Assignment;

/// Resolved page metadata shared by templates, the sitemap and the feed.
#[derive(Debug, Clone)]
pub struct Page {
    /// Source path relative to the content directory.
    pub source: String,

    /// Public URL path.
    pub url: String,

    /// File below the output root.
    pub output_file: String,

    /// Owning collection.
    pub collection: Option<String>,

    pub content_type: ContentType,

    /// Title from metadata, or derived from the file name.
    pub title: String,

    pub description: Option<String>,

    pub date: Option<DateTime<Utc>>,

    pub updated: Option<DateTime<Utc>>,

    /// Listed in the sitemap.
    pub indexable: bool,

    /// Redirect sources pointing at this page.
    pub aliases: Vec<String>,

    /// Tags from metadata, used as feed categories.
    pub tags: Vec<String>,

    /// Raw front matter.
    pub metadata: Map,
}

impl Page {
    /// Combine a parsed unit with its assignment.
    #[must_use]
    pub fn new(unit: &ContentUnit, assignment: &Assignment) -> Self {
        let fm = &unit.frontmatter;
        let tags = match fm.get("tags") {
            Some(Value::List(items)) => items.iter().map(ToString::to_string).collect(),
            Some(Value::String(tag)) => vec![tag.clone()],
            _ => Vec::new(),
        };

        Self {
            source: unit.source.clone(),
            url: assignment.url.clone(),
            output_file: assignment.output_file.clone(),
            collection: assignment.collection.clone(),
            content_type: unit.content_type,
            title: unit.title(),
            description: fm.description().map(str::to_string),
            date: unit.date,
            updated: unit.updated,
            indexable: fm.indexable(),
            aliases: fm.aliases(),
            tags,
            metadata: fm.values().clone(),
        }
    }

    /// Value used to order collection members by `key`.
    #[must_use]
    pub fn sort_key(&self, key: &str) -> Value {
        match key {
            "date" => self.date.map(format_date).into(),
            "updated" => self.updated.map(format_date).into(),
            "title" => self.title.clone().into(),
            "url" => self.url.clone().into(),
            "source" => self.source.clone().into(),
            other => self.metadata.get(other).cloned().unwrap_or_default(),
        }
    }

    /// The `page` template namespace (without `content`).
    ///
    /// Metadata keys come first; resolved fields override them.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.metadata.clone();
        map.insert("title".into(), self.title.clone().into());
        map.insert("url".into(), self.url.clone().into());
        map.insert("source".into(), self.source.clone().into());
        map.insert("collection".into(), self.collection.clone().into());
        map.insert("date".into(), self.date.map(format_date).into());
        map.insert("updated".into(), self.updated.map(format_date).into());
        if let Some(description) = &self.description {
            map.insert("description".into(), description.clone().into());
        }
        Value::Map(map)
    }
}

/// RFC 3339 in UTC, second precision.
#[must_use]
pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(source: &str, text: &str, url: &str) -> Page {
        let unit = ContentUnit::parse(source, text).unwrap();
        let assignment = Assignment {
            collection: Some("posts".into()),
            url: url.into(),
            output_file: format!("{}index.html", url.trim_start_matches('/')),
        };
        Page::new(&unit, &assignment)
    }

    #[test]
    fn test_page_value_exposes_resolved_fields() {
        let page = page(
            "blog/2024-02-03-launch-day.md",
            "---\nauthor: ada\ntags: [rust, release]\n---\nBody",
            "/blog/launch-day/",
        );
        let value = page.to_value();

        assert_eq!(value.get("title"), Some(&Value::from("Launch Day")));
        assert_eq!(value.get("url"), Some(&Value::from("/blog/launch-day/")));
        assert_eq!(value.get("collection"), Some(&Value::from("posts")));
        assert_eq!(value.get("date"), Some(&Value::from("2024-02-03T00:00:00Z")));
        assert_eq!(value.get("author"), Some(&Value::from("ada")));
        assert_eq!(page.tags, vec!["rust", "release"]);
        assert!(page.indexable);
    }

    #[test]
    fn test_sort_key_falls_back_to_metadata() {
        let page = page("a.md", "---\nweight: 3\n---\n", "/a/");
        assert_eq!(page.sort_key("weight"), Value::Integer(3));
        assert!(page.sort_key("date").is_null());
        assert!(page.sort_key("missing").is_null());
    }
}
