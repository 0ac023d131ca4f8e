//! Sitemap generation.
//!
//! Generates XML sitemaps for search engine optimization.

use chrono::{DateTime, Utc};
use quire_core::Config;
use tracing::debug;

use crate::page::Page;

/// Change frequency for sitemap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Monthly,
    Yearly,
}

impl ChangeFreq {
    fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// A sitemap URL entry.
#[derive(Debug, Clone)]
pub struct SitemapUrl {
    /// Absolute URL.
    pub loc: String,

    /// Last modification date.
    pub lastmod: Option<DateTime<Utc>>,

    pub changefreq: ChangeFreq,

    /// Priority (0.0 to 1.0).
    pub priority: f32,
}

/// Sitemap generator.
#[derive(Debug)]
pub struct SitemapGenerator<'a> {
    config: &'a Config,
}

impl<'a> SitemapGenerator<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Generate sitemap XML.
    ///
    /// Pages that opt out (`sitemap: false`, `noindex: true`) are skipped;
    /// the rest are listed sorted by URL.
    #[must_use]
    pub fn generate(&self, pages: &[Page]) -> String {
        let mut entries: Vec<SitemapUrl> = pages
            .iter()
            .filter(|page| page.indexable)
            .map(|page| self.page_to_url(page))
            .collect();
        entries.sort_by(|a, b| a.loc.cmp(&b.loc));
        debug!(count = entries.len(), "generating sitemap");

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        xml.push('\n');
        for entry in &entries {
            xml.push_str(&url_to_xml(entry));
        }
        xml.push_str("</urlset>\n");
        xml
    }

    /// Convert a page to a sitemap URL entry.
    fn page_to_url(&self, page: &Page) -> SitemapUrl {
        let (changefreq, priority) = if page.url == "/" {
            (ChangeFreq::Daily, 1.0)
        } else if page.date.is_some() {
            (ChangeFreq::Monthly, 0.8)
        } else {
            (ChangeFreq::Yearly, 0.5)
        };

        SitemapUrl {
            loc: self.config.url_for(&page.url),
            lastmod: page.updated.or(page.date),
            changefreq,
            priority,
        }
    }
}

fn url_to_xml(url: &SitemapUrl) -> String {
    let mut xml = String::from("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));
    if let Some(lastmod) = &url.lastmod {
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            lastmod.format("%Y-%m-%d")
        ));
    }
    xml.push_str(&format!(
        "    <changefreq>{}</changefreq>\n",
        url.changefreq.as_str()
    ));
    xml.push_str(&format!("    <priority>{:.1}</priority>\n", url.priority));
    xml.push_str("  </url>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use quire_core::{ContentUnit, SiteConfig};

    use super::*;
    use crate::collection::Assignment;

    fn page(source: &str, text: &str, url: &str) -> Page {
        let unit = ContentUnit::parse(source, text).unwrap();
        Page::new(
            &unit,
            &Assignment {
                collection: None,
                url: url.into(),
                output_file: String::new(),
            },
        )
    }

    #[test]
    fn test_generate_sitemap_sorted_and_filtered() {
        let config = Config::new(SiteConfig::new("Test", "https://example.com"));
        let pages = vec![
            page("z.md", "Z", "/z/"),
            page("2024-05-01-post.md", "Post", "/blog/post/"),
            page("hidden.md", "---\nsitemap: false\n---\n", "/hidden/"),
            page("index.md", "Home", "/"),
        ];

        let xml = SitemapGenerator::new(&config).generate(&pages);

        assert!(xml.starts_with(r#"<?xml version="1.0""#));
        assert!(!xml.contains("/hidden/"));
        let home = xml.find("<loc>https://example.com/</loc>").unwrap();
        let post = xml.find("<loc>https://example.com/blog/post/</loc>").unwrap();
        let z = xml.find("<loc>https://example.com/z/</loc>").unwrap();
        assert!(home < post && post < z);
        assert!(xml.contains("<lastmod>2024-05-01</lastmod>"));
        assert!(xml.contains("<priority>1.0</priority>"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & b"), "a &amp; b");
        assert_eq!(escape_xml("<tag>"), "&lt;tag&gt;");
        assert_eq!(escape_xml("\"quoted\""), "&quot;quoted&quot;");
    }
}
