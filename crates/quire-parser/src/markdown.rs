//! Markdown renderer using pulldown-cmark.

use std::collections::HashMap;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};
use quire_core::slugify;

use crate::syntax::SyntaxHighlighter;

/// Table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Heading level (1-6).
    pub level: u8,

    /// Heading text.
    pub text: String,

    /// Anchor ID for linking.
    pub id: String,
}

/// Markdown renderer with syntax highlighting and heading anchors.
#[derive(Debug)]
pub struct MarkdownRenderer {
    highlighter: SyntaxHighlighter,
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(SyntaxHighlighter::default())
    }
}

impl MarkdownRenderer {
    /// Create a renderer around an existing highlighter.
    pub fn new(highlighter: SyntaxHighlighter) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            highlighter,
            options,
        }
    }

    /// Render a Markdown body to HTML, collecting the table of contents.
    ///
    /// Headings without an explicit `{#id}` get a slug anchor; repeated
    /// slugs are suffixed `-1`, `-2`, ... in document order.
    pub fn render(&self, body: &str) -> (String, Vec<TocEntry>) {
        let mut events: Vec<Event<'_>> = Vec::new();
        let mut toc = Vec::new();
        let mut seen_ids: HashMap<String, usize> = HashMap::new();

        let mut heading: Option<(u8, Option<CowStr<'_>>, Vec<String>, Vec<Event<'_>>)> = None;
        let mut code: Option<(Option<String>, String)> = None;

        for event in Parser::new_ext(body, self.options) {
            if code.is_some() {
                match event {
                    Event::Text(text) => {
                        if let Some((_, buffer)) = code.as_mut() {
                            buffer.push_str(&text);
                        }
                    }
                    Event::End(TagEnd::CodeBlock) => {
                        if let Some((lang, buffer)) = code.take() {
                            let highlighted = self.highlighter.highlight(&buffer, lang.as_deref());
                            events.push(Event::Html(highlighted.into()));
                        }
                    }
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .filter(|l| !l.is_empty())
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((lang, String::new()));
                }

                Event::Start(Tag::Heading {
                    level, id, classes, ..
                }) => {
                    let classes = classes.iter().map(|c| c.to_string()).collect();
                    heading = Some((level as u8, id, classes, Vec::new()));
                }

                Event::End(TagEnd::Heading(_)) => {
                    let Some((level, explicit_id, classes, inner)) = heading.take() else {
                        continue;
                    };
                    let text = heading_text(&inner);
                    let id = match explicit_id {
                        Some(id) => id.to_string(),
                        None => unique_id(&mut seen_ids, &text),
                    };

                    let class_attr = if classes.is_empty() {
                        String::new()
                    } else {
                        format!(" class=\"{}\"", classes.join(" "))
                    };
                    events.push(Event::Html(
                        format!("<h{level} id=\"{id}\"{class_attr}>").into(),
                    ));
                    events.extend(inner);
                    events.push(Event::Html(format!("</h{level}>\n").into()));

                    toc.push(TocEntry { level, text, id });
                }

                other => match heading.as_mut() {
                    Some((_, _, _, inner)) => inner.push(other),
                    None => events.push(other),
                },
            }
        }

        let mut out = String::with_capacity(body.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        (out, toc)
    }
}

fn heading_text(events: &[Event<'_>]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Text(text) | Event::Code(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect()
}

fn unique_id(seen: &mut HashMap<String, usize>, text: &str) -> String {
    let base = match slugify(text) {
        slug if slug.is_empty() => "section".to_string(),
        slug => slug,
    };
    let count = seen.entry(base.clone()).or_insert(0);
    let id = if *count == 0 {
        base
    } else {
        format!("{base}-{count}")
    };
    *count += 1;
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_markdown() {
        let renderer = MarkdownRenderer::default();
        let (html, _) = renderer.render("# Hello World\n\nThis is a test.");

        assert!(html.contains("<h1 id=\"hello-world\">Hello World</h1>"));
        assert!(html.contains("<p>This is a test.</p>"));
    }

    #[test]
    fn test_render_code_block() {
        let renderer = MarkdownRenderer::default();
        let (html, _) = renderer.render("```rust\nfn main() {}\n```\n");

        assert!(html.contains("<pre"));
        assert!(html.contains("main"));
        assert!(!html.contains("```"));
    }

    #[test]
    fn test_toc_extraction() {
        let renderer = MarkdownRenderer::default();
        let (_, toc) = renderer.render("# Heading 1\n## Heading `2`\n### Heading 3");

        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].level, 1);
        assert_eq!(toc[0].text, "Heading 1");
        assert_eq!(toc[1].text, "Heading 2");
        assert_eq!(toc[1].id, "heading-2");
        assert_eq!(toc[2].level, 3);
    }

    #[test]
    fn test_duplicate_heading_ids_are_suffixed() {
        let renderer = MarkdownRenderer::default();
        let (html, toc) = renderer.render("## Notes\n\n## Notes\n");

        assert_eq!(toc[0].id, "notes");
        assert_eq!(toc[1].id, "notes-1");
        assert!(html.contains("id=\"notes-1\""));
    }

    #[test]
    fn test_explicit_heading_id() {
        let renderer = MarkdownRenderer::default();
        let (html, toc) = renderer.render("## Setup {#install}\n");

        assert_eq!(toc[0].id, "install");
        assert!(html.contains("<h2 id=\"install\">Setup</h2>"));
    }

    #[test]
    fn test_table_rendering() {
        let renderer = MarkdownRenderer::default();
        let (html, _) = renderer.render(
            "| Header 1 | Header 2 |\n|----------|----------|\n| Cell 1   | Cell 2   |",
        );

        assert!(html.contains("<table>"));
        assert!(html.contains("<thead>"));
        assert!(html.contains("<td>Cell 1</td>"));
    }

    #[test]
    fn test_task_list() {
        let renderer = MarkdownRenderer::default();
        let (html, _) = renderer.render("- [x] Done\n- [ ] Not done");

        assert!(html.contains("checkbox"));
        assert!(html.contains("checked"));
    }

    #[test]
    fn test_inline_html_passes_through() {
        let renderer = MarkdownRenderer::default();
        let (html, _) = renderer.render("<div class=\"hero\">Hi</div>\n");

        assert!(html.contains("<div class=\"hero\">Hi</div>"));
    }
}
