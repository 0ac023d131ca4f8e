//! Content types and structures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    frontmatter::{Frontmatter, parse_frontmatter},
};

/// Type of content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Markdown content (.md files).
    Markdown,
    /// HTML content migrated as-is (.html files).
    Html,
}

impl ContentType {
    /// Determine content type from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }
}

/// Date and slug carried by a file name such as `2024-03-01-hello.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    /// File stem as written.
    pub stem: String,
    /// Date prefix, if the stem starts with `YYYY-MM-DD-`.
    pub date: Option<NaiveDate>,
    /// Stem with any date prefix removed.
    pub slug: String,
}

impl SourceName {
    /// Split a file stem into its optional date prefix and slug.
    pub fn parse(stem: &str) -> Self {
        let dated = stem
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .filter(|_| stem.as_bytes().get(10) == Some(&b'-') && stem.len() > 11);

        match dated {
            Some(date) => Self {
                stem: stem.to_string(),
                date: Some(date),
                slug: stem[11..].to_string(),
            },
            None => Self {
                stem: stem.to_string(),
                date: None,
                slug: stem.to_string(),
            },
        }
    }
}

/// One parsed content source.
///
/// Identity is the source path relative to the content directory, always
/// `/`-separated so that ordering and error messages are platform neutral.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// Relative source path, e.g. `blog/2024-03-01-hello.md`.
    pub source: String,

    /// Content type based on extension.
    pub content_type: ContentType,

    /// Parsed front matter.
    pub frontmatter: Frontmatter,

    /// Body text with the front matter removed.
    pub body: String,

    /// Publication date from metadata, or from the file name.
    pub date: Option<DateTime<Utc>>,

    /// Last updated date.
    pub updated: Option<DateTime<Utc>>,

    /// Parsed file name.
    pub name: SourceName,
}

impl ContentUnit {
    /// Parse raw source text.
    ///
    /// `source` is the content-relative path used as the unit identity.
    pub fn parse(source: &str, text: &str) -> Result<Self> {
        let path = Path::new(source);
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContentType::from_extension)
            .ok_or_else(|| CoreError::content(path, "unsupported content extension"))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CoreError::content(path, "missing file name"))?;

        let (frontmatter, body) = parse_frontmatter(text, path)?;
        let name = SourceName::parse(stem);

        let date = match frontmatter.date(path)? {
            Some(date) => Some(date),
            None => name
                .date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
        };
        let updated = frontmatter.updated(path)?;

        Ok(Self {
            source: source.to_string(),
            content_type,
            frontmatter,
            body,
            date,
            updated,
            name,
        })
    }

    /// Read and parse a file below `content_dir`.
    pub fn load(content_dir: &Path, path: &Path) -> Result<Self> {
        let relative = path.strip_prefix(content_dir).unwrap_or(path);
        let source = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::parse(&source, &text)
    }

    /// Source path as a `Path`.
    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.source)
    }

    /// Directory of the source, `/`-separated, empty at the content root.
    pub fn dir(&self) -> &str {
        self.source.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    /// Source path without its extension, with `index` collapsed into its
    /// directory (`blog/index.md` becomes `blog`).
    pub fn path_stem(&self) -> String {
        if self.name.stem == "index" {
            return self.dir().to_string();
        }
        match self.dir() {
            "" => self.name.stem.clone(),
            dir => format!("{dir}/{}", self.name.stem),
        }
    }

    /// URL slug: metadata `slug`, else the file name without date prefix.
    pub fn slug(&self) -> String {
        self.frontmatter
            .slug()
            .map(slugify)
            .unwrap_or_else(|| slugify(&self.name.slug))
    }

    /// Title from metadata, else one derived from the file name.
    pub fn title(&self) -> String {
        if let Some(title) = self.frontmatter.title() {
            return title.to_string();
        }
        let base = if self.name.stem == "index" {
            self.dir().rsplit('/').next().unwrap_or_default()
        } else {
            self.name.slug.as_str()
        };
        title_from_slug(base)
    }

    /// Whether the unit is marked as a draft.
    pub fn is_draft(&self) -> bool {
        self.frontmatter.draft()
    }
}

/// Lowercase, Unicode-alphanumeric words joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// `hello-world` becomes `Hello World`.
pub fn title_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip HTML tags from content.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
}

/// Truncate text at word boundary, respecting UTF-8 character boundaries.
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }

    let truncate_byte_idx = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    let truncated = &text[..truncate_byte_idx];

    if let Some(last_space_byte) = truncated.rfind(' ') {
        format!("{}...", &truncated[..last_space_byte])
    } else {
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;

    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(
            ContentType::from_extension("md"),
            Some(ContentType::Markdown)
        );
        assert_eq!(
            ContentType::from_extension("MD"),
            Some(ContentType::Markdown)
        );
        assert_eq!(ContentType::from_extension("htm"), Some(ContentType::Html));
        assert_eq!(ContentType::from_extension("txt"), None);
    }

    #[test]
    fn test_source_name_with_date_prefix() {
        let name = SourceName::parse("2024-03-01-hello-world");
        assert_eq!(name.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(name.slug, "hello-world");
    }

    #[test]
    fn test_source_name_without_date_prefix() {
        let name = SourceName::parse("about");
        assert_eq!(name.date, None);
        assert_eq!(name.slug, "about");

        // Not a real date, so it stays part of the slug.
        let name = SourceName::parse("2024-13-40-oops");
        assert_eq!(name.date, None);
        assert_eq!(name.slug, "2024-13-40-oops");
    }

    #[test]
    fn test_parse_unit_takes_date_from_file_name() {
        let unit = ContentUnit::parse(
            "blog/2024-03-01-first-post.md",
            "---\ntitle: First Post\n---\nHello",
        )
        .unwrap();

        assert_eq!(unit.content_type, ContentType::Markdown);
        assert_eq!(unit.body, "Hello");
        assert_eq!(unit.dir(), "blog");
        assert_eq!(unit.slug(), "first-post");
        assert_eq!(unit.path_stem(), "blog/2024-03-01-first-post");
        let date = unit.date.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 1));
    }

    #[test]
    fn test_metadata_date_wins_over_file_name() {
        let unit = ContentUnit::parse(
            "blog/2024-03-01-post.md",
            "---\ndate: 2023-12-31\n---\nBody",
        )
        .unwrap();
        assert_eq!(unit.date.unwrap().year(), 2023);
    }

    #[test]
    fn test_index_collapses_into_directory() {
        let unit = ContentUnit::parse("docs/getting-started/index.html", "<p>Hi</p>").unwrap();
        assert_eq!(unit.content_type, ContentType::Html);
        assert_eq!(unit.path_stem(), "docs/getting-started");
        assert_eq!(unit.title(), "Getting Started");

        let root = ContentUnit::parse("index.md", "Home").unwrap();
        assert_eq!(root.path_stem(), "");
    }

    #[test]
    fn test_malformed_metadata_propagates() {
        let err = ContentUnit::parse("about.md", "---\ntitle: x\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(ContentUnit::parse("notes.txt", "hi").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust & WebAssembly  "), "rust-webassembly");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("Café Über"), "café-über");
    }

    #[test]
    fn test_strip_html() {
        let html = "<p>Hello <strong>world</strong>!</p>";
        assert_eq!(strip_html(html), "Hello world!");
    }

    #[test]
    fn test_truncate_at_word_boundary_ascii() {
        let text = "Hello world this is a test";
        assert_eq!(truncate_at_word_boundary(text, 100), text);
        assert_eq!(truncate_at_word_boundary(text, 15), "Hello world...");
    }

    #[test]
    fn test_truncate_at_word_boundary_utf8() {
        let text = "你好世界这是一个测试";
        let result = truncate_at_word_boundary(text, 5);
        assert_eq!(result, "你好世界这...");
    }
}
