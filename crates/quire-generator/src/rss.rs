//! RSS feed generation.
//!
//! Generates an RSS 2.0 feed for the designated collection.

use quire_core::Config;
use rss::{ChannelBuilder, GuidBuilder, Item, ItemBuilder};
use tracing::debug;

use crate::page::Page;

/// RSS feed generator.
#[derive(Debug)]
pub struct RssGenerator<'a> {
    config: &'a Config,
}

impl<'a> RssGenerator<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Generate feed XML from the collection members in `members`.
    ///
    /// Undated pages are left out. Items are newest first (ties by source
    /// path) and capped at `feed.limit`. The channel's build date is the
    /// newest item's date, so unchanged input gives an identical feed.
    #[must_use]
    pub fn generate(&self, pages: &[Page], members: &[usize]) -> String {
        let mut dated: Vec<&Page> = members
            .iter()
            .filter_map(|idx| pages.get(*idx))
            .filter(|page| page.date.is_some())
            .collect();
        dated.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.source.cmp(&b.source)));
        dated.truncate(self.config.feed.limit);

        debug!(count = dated.len(), limit = self.config.feed.limit, "generating RSS feed");

        let last_build_date = dated
            .first()
            .and_then(|page| page.date)
            .map(|date| date.to_rfc2822());
        let items: Vec<Item> = dated.iter().map(|page| self.page_to_item(page)).collect();

        let site = &self.config.site;
        let channel = ChannelBuilder::default()
            .title(site.title.clone())
            .link(self.config.url_for("/"))
            .description(site.description.clone().unwrap_or_else(|| site.title.clone()))
            .language(Some(site.language.clone()))
            .last_build_date(last_build_date)
            .items(items)
            .build();

        channel.to_string()
    }

    /// Convert a page to an RSS item.
    fn page_to_item(&self, page: &Page) -> Item {
        let url = self.config.url_for(&page.url);
        let guid = GuidBuilder::default().value(url.clone()).permalink(true).build();

        let mut builder = ItemBuilder::default();
        builder.title(Some(page.title.clone()));
        builder.link(Some(url));
        builder.guid(Some(guid));

        if let Some(date) = page.date {
            builder.pub_date(Some(date.to_rfc2822()));
        }
        if let Some(desc) = &page.description {
            builder.description(Some(desc.clone()));
        }
        if let Some(author) = &self.config.site.author {
            builder.author(Some(author.clone()));
        }

        let categories: Vec<_> = page
            .tags
            .iter()
            .map(|tag| rss::Category {
                name: tag.clone(),
                domain: None,
            })
            .collect();
        if !categories.is_empty() {
            builder.categories(categories);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use quire_core::{ContentUnit, SiteConfig};

    use super::*;
    use crate::collection::Assignment;

    fn test_config(limit: usize) -> Config {
        let mut site = SiteConfig::new("Test Blog", "https://example.com");
        site.description = Some("A test blog".into());
        site.author = Some("Test Author".into());
        let mut config = Config::new(site);
        config.feed.limit = limit;
        config
    }

    fn pages() -> Vec<Page> {
        [
            ("blog/2024-01-01-first-post.md", "---\ntags: [rust, web]\n---\nOne"),
            ("blog/2024-03-01-second-post.md", "Two"),
            ("blog/draft-idea.md", "Undated"),
        ]
        .iter()
        .map(|(source, text)| {
            let unit = ContentUnit::parse(source, text).unwrap();
            let url = format!("/blog/{}/", unit.slug());
            Page::new(
                &unit,
                &Assignment {
                    collection: Some("posts".into()),
                    url,
                    output_file: String::new(),
                },
            )
        })
        .collect()
    }

    #[test]
    fn test_generate_rss() {
        let config = test_config(20);
        let xml = RssGenerator::new(&config).generate(&pages(), &[0, 1, 2]);

        assert!(xml.contains("<title>Test Blog</title>"));
        assert!(xml.contains("<link>https://example.com/</link>"));
        assert!(xml.contains("<category>rust</category>"));
        assert!(!xml.contains("Draft Idea"));

        let second = xml.find("Second Post").unwrap();
        let first = xml.find("First Post").unwrap();
        assert!(second < first, "newest item comes first");
        assert!(xml.contains("<lastBuildDate>Fri, 1 Mar 2024 00:00:00 +0000</lastBuildDate>"));
    }

    #[test]
    fn test_rss_limit() {
        let config = test_config(1);
        let xml = RssGenerator::new(&config).generate(&pages(), &[0, 1, 2]);

        assert!(xml.contains("Second Post"));
        assert!(!xml.contains("First Post"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let config = test_config(20);
        let generator = RssGenerator::new(&config);
        assert_eq!(
            generator.generate(&pages(), &[0, 1]),
            generator.generate(&pages(), &[1, 0])
        );
    }
}
