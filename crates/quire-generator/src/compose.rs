//! Per-unit composition: body expansion, content rendering and layout
//! nesting.

use quire_core::{ContentUnit, Map, Site, Value};
use quire_parser::{RendererRegistry, TocEntry};

use crate::{
    layout::Layout,
    navigation::NavState,
    page::Page,
    template::{Context, FragmentRegistry, Result, Template},
};

/// Shared, read-only inputs of every render.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'a> {
    site: &'a Site,
    fragments: &'a FragmentRegistry,
    renderers: &'a RendererRegistry,
    collections: &'a Value,
    assets: &'a Value,
}

impl<'a> Composer<'a> {
    /// `collections` and `assets` are the template namespaces of the same
    /// name, computed once per build.
    #[must_use]
    pub fn new(
        site: &'a Site,
        fragments: &'a FragmentRegistry,
        renderers: &'a RendererRegistry,
        collections: &'a Value,
        assets: &'a Value,
    ) -> Self {
        Self {
            site,
            fragments,
            renderers,
            collections,
            assets,
        }
    }

    /// Render `unit` through `chain` (innermost layout first).
    ///
    /// The body goes straight to the content renderer, unless the unit opts
    /// in with `render_with_liquid: true`, in which case it is expanded as a
    /// template first. Each layout then renders with `content` bound to the
    /// previous result.
    pub fn render(
        &self,
        unit: &ContentUnit,
        page: &Page,
        chain: &[&Layout],
        nav: &[NavState],
    ) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert_ref("site", self.site.site_value());
        ctx.insert_ref("data", self.site.data_value());
        ctx.insert_ref("collections", self.collections);
        ctx.insert_ref("assets", self.assets);
        ctx.insert("nav", Value::List(nav.iter().map(NavState::to_value).collect()));
        ctx.insert("page", page.to_value());

        let rendered = if unit.frontmatter.render_with_liquid() {
            let body = Template::parse(format!("content/{}", unit.source), &unit.body)?;
            let expanded = body.render(&ctx, self.fragments)?;
            self.renderers.render(unit.content_type, &expanded)
        } else {
            self.renderers.render(unit.content_type, &unit.body)
        };

        if let Value::Map(mut page_map) = page.to_value() {
            page_map.insert("content".into(), rendered.html.clone().into());
            page_map.insert("toc".into(), toc_value(&rendered.toc));
            ctx.insert("page", page_map);
        }

        let mut content = rendered.html;
        for layout in chain {
            ctx.insert("content", content);
            ctx.insert("layout", layout.to_value());
            content = layout.template.render(&ctx, self.fragments)?;
        }

        Ok(content)
    }
}

fn toc_value(toc: &[TocEntry]) -> Value {
    toc.iter()
        .map(|entry| {
            let mut map = Map::new();
            map.insert("level".into(), i64::from(entry.level).into());
            map.insert("text".into(), entry.text.clone().into());
            map.insert("id".into(), entry.id.clone().into());
            Value::Map(map)
        })
        .collect::<Vec<_>>()
        .into()
}

#[cfg(test)]
mod tests {
    use quire_core::{Config, SiteConfig};

    use super::*;
    use crate::{collection::Assignment, layout::LayoutRegistry};

    fn site() -> Site {
        let mut data = Map::new();
        data.insert("motto".into(), "ship it".into());
        Site::new("/site", Config::new(SiteConfig::new("Demo", "https://example.com")), data)
    }

    fn page_for(unit: &ContentUnit, url: &str) -> Page {
        Page::new(
            unit,
            &Assignment {
                collection: None,
                url: url.into(),
                output_file: "x/index.html".into(),
            },
        )
    }

    #[test]
    fn test_post_wrapped_by_post_then_default() {
        let site = site();
        let mut layouts = LayoutRegistry::new();
        layouts
            .register("default", "<html><title>{{ page.title }}</title>{{ content }}</html>")
            .unwrap();
        layouts
            .register("post", "---\nlayout: default\n---\n<article>{{ content }}</article>")
            .unwrap();
        let fragments = FragmentRegistry::new();
        let renderers = RendererRegistry::default();
        let empty = Value::Map(Map::new());
        let composer = Composer::new(&site, &fragments, &renderers, &empty, &empty);

        let unit = ContentUnit::parse("hello.md", "---\ntitle: Hello\nlayout: post\n---\nHi *there*").unwrap();
        let chain = layouts.resolve_chain("post", &unit.source).unwrap();
        let html = composer
            .render(&unit, &page_for(&unit, "/hello/"), &chain, &[])
            .unwrap();

        assert_eq!(
            html,
            "<html><title>Hello</title><article><p>Hi <em>there</em></p>\n</article></html>"
        );
    }

    #[test]
    fn test_opted_in_body_is_expanded_before_rendering() {
        let site = site();
        let mut fragments = FragmentRegistry::new();
        fragments.register("motto", "**{{ motto }}**").unwrap();
        let renderers = RendererRegistry::default();
        let empty = Value::Map(Map::new());
        let composer = Composer::new(&site, &fragments, &renderers, &empty, &empty);

        let unit = ContentUnit::parse(
            "a.md",
            "---\nrender_with_liquid: true\n---\n{% include motto %} on {{ site.title }}",
        )
        .unwrap();
        let html = composer.render(&unit, &page_for(&unit, "/a/"), &[], &[]).unwrap();

        assert_eq!(html, "<p><strong>ship it</strong> on Demo</p>\n");
    }

    #[test]
    fn test_template_syntax_in_bodies_is_literal() {
        let site = site();
        let fragments = FragmentRegistry::new();
        let renderers = RendererRegistry::default();
        let empty = Value::Map(Map::new());
        let composer = Composer::new(&site, &fragments, &renderers, &empty, &empty);

        let app = ContentUnit::parse("app.html", r#"<div id="app">{{ user.name }}</div>"#).unwrap();
        let html = composer.render(&app, &page_for(&app, "/app/"), &[], &[]).unwrap();
        assert_eq!(html, r#"<div id="app">{{ user.name }}</div>"#);

        let post = ContentUnit::parse("post.md", "Jinja:\n\n```\n{{ x }}\n```\n").unwrap();
        let html = composer.render(&post, &page_for(&post, "/post/"), &[], &[]).unwrap();
        assert!(html.contains("{{ x }}"), "{html}");

        let doc = ContentUnit::parse("doc.md", "Use `{% block body %}` here.").unwrap();
        let html = composer.render(&doc, &page_for(&doc, "/doc/"), &[], &[]).unwrap();
        assert!(html.contains("<code>{% block body %}</code>"), "{html}");
    }

    #[test]
    fn test_layouts_still_see_template_syntax() {
        let site = site();
        let mut layouts = LayoutRegistry::new();
        layouts
            .register("default", "<main data-url=\"{{ page.url }}\">{{ content }}</main>")
            .unwrap();
        let fragments = FragmentRegistry::new();
        let renderers = RendererRegistry::default();
        let empty = Value::Map(Map::new());
        let composer = Composer::new(&site, &fragments, &renderers, &empty, &empty);

        let unit = ContentUnit::parse("legacy.html", "<div>{{ page.url }}</div>").unwrap();
        let chain = layouts.resolve_chain("default", &unit.source).unwrap();
        let html = composer
            .render(&unit, &page_for(&unit, "/legacy/"), &chain, &[])
            .unwrap();
        assert_eq!(html, r#"<main data-url="/legacy/"><div>{{ page.url }}</div></main>"#);
    }

    #[test]
    fn test_site_value_reached_past_unset_page_field() {
        let mut config = SiteConfig::new("Demo", "https://example.com");
        config.extra.insert("updated".into(), "2024-06-01".into());
        let site = Site::new("/site", Config::new(config), Map::new());
        let fragments = FragmentRegistry::new();
        let renderers = RendererRegistry::default();
        let empty = Value::Map(Map::new());
        let composer = Composer::new(&site, &fragments, &renderers, &empty, &empty);

        let unit = ContentUnit::parse(
            "about.html",
            "---\nrender_with_liquid: true\n---\n<p>[{{ updated }}] [{{ title }}]</p>",
        )
        .unwrap();
        let html = composer
            .render(&unit, &page_for(&unit, "/about/"), &[], &[])
            .unwrap();
        assert_eq!(html, "<p>[2024-06-01] [About]</p>");
    }
}
