//! Redirect pages for `aliases` / `redirect_from`.

use quire_core::Config;
use tracing::debug;

use crate::{
    collection::{self, OutputClaims},
    page::Page,
    permalink::{self, OutputPath},
    template::{self, Context, FragmentRegistry, Template},
};

/// Redirect page template for URL aliases.
pub const REDIRECT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="0; url={{ redirect_url | escape }}">
    <link rel="canonical" href="{{ redirect_url | escape }}">
    <title>Redirecting...</title>
</head>
<body>
    <p>Redirecting to <a href="{{ redirect_url | escape }}">{{ redirect_url | escape }}</a></p>
</body>
</html>
"#;

/// One alias of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Where the redirect page is written.
    pub from: OutputPath,

    /// Absolute URL of the target page.
    pub to: String,

    /// Source of the target page.
    pub source: String,
}

/// Claim every alias of `pages` after the pages themselves, in source order.
///
/// An alias that collides with a page, or another alias, fails with
/// `DuplicateOutputPath`.
pub fn collect_redirects(
    pages: &[Page],
    config: &Config,
    claims: &mut OutputClaims,
) -> collection::Result<Vec<Redirect>> {
    let mut ordered: Vec<&Page> = pages.iter().filter(|p| !p.aliases.is_empty()).collect();
    ordered.sort_by(|a, b| a.source.cmp(&b.source));

    let mut redirects = Vec::new();
    for page in ordered {
        for alias in &page.aliases {
            let from = permalink::normalize(alias, &page.source)?;
            claims.claim(&from, &format!("{} (alias {alias})", page.source))?;
            debug!(alias = %from.url, target = %page.url, "redirect");
            redirects.push(Redirect {
                from,
                to: config.url_for(&page.url),
                source: page.source.clone(),
            });
        }
    }

    Ok(redirects)
}

/// Renders redirect pages.
#[derive(Debug, Clone)]
pub struct RedirectRenderer {
    template: Template,
}

impl RedirectRenderer {
    pub fn new() -> template::Result<Self> {
        Ok(Self {
            template: Template::parse("redirect", REDIRECT_TEMPLATE)?,
        })
    }

    /// HTML for a redirect to `target`.
    pub fn render(&self, target: &str) -> template::Result<String> {
        let mut ctx = Context::new();
        ctx.insert("redirect_url", target);
        self.template.render(&ctx, &FragmentRegistry::new())
    }
}

#[cfg(test)]
mod tests {
    use quire_core::{ContentUnit, SiteConfig};

    use super::*;
    use crate::collection::{Assignment, CollectionError};

    fn page(source: &str, text: &str, url: &str) -> Page {
        let unit = ContentUnit::parse(source, text).unwrap();
        Page::new(
            &unit,
            &Assignment {
                collection: None,
                url: url.into(),
                output_file: format!("{}index.html", url.trim_start_matches('/')),
            },
        )
    }

    fn config() -> Config {
        Config::new(SiteConfig::new("Test", "https://example.com"))
    }

    #[test]
    fn test_collect_redirects() {
        let pages = vec![page(
            "about.md",
            "---\naliases: [/about-us/, /team.html]\n---\n",
            "/about/",
        )];
        let redirects = collect_redirects(&pages, &config(), &mut OutputClaims::default()).unwrap();

        assert_eq!(redirects.len(), 2);
        assert_eq!(redirects[0].from.file, "about-us/index.html");
        assert_eq!(redirects[1].from.file, "team.html");
        assert_eq!(redirects[0].to, "https://example.com/about/");
    }

    #[test]
    fn test_alias_cannot_shadow_a_page() {
        let pages = vec![
            page("about.md", "About", "/about/"),
            page("team.md", "---\nredirect_from: /about/\n---\n", "/team/"),
        ];
        let mut claims = OutputClaims::default();
        for p in &pages {
            claims
                .claim(
                    &OutputPath {
                        url: p.url.clone(),
                        file: p.output_file.clone(),
                    },
                    &p.source,
                )
                .unwrap();
        }

        let err = collect_redirects(&pages, &config(), &mut claims).unwrap_err();
        match err {
            CollectionError::DuplicateOutputPath { first, second, .. } => {
                assert_eq!(first, "about.md");
                assert_eq!(second, "team.md (alias /about/)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_redirect() {
        let html = RedirectRenderer::new()
            .unwrap()
            .render("https://example.com/a?b=1&c=2")
            .unwrap();
        assert!(html.contains("Redirecting"));
        assert!(html.contains(r#"url=https://example.com/a?b=1&amp;c=2""#));
    }
}
