//! Quire Parser Library
//!
//! Content renderers turning a unit body into HTML: Markdown (with syntax
//! highlighting) and HTML passthrough for migrated pages.

pub mod markdown;
pub mod syntax;

pub use markdown::{MarkdownRenderer, TocEntry};
use quire_core::ContentType;
pub use syntax::SyntaxHighlighter;
use thiserror::Error;

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    /// Highlighter could not be set up.
    #[error("syntax highlighting error: {0}")]
    Syntax(#[from] syntax::SyntaxError),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;

/// Output of a content renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Rendered HTML.
    pub html: String,

    /// Headings found while rendering.
    pub toc: Vec<TocEntry>,
}

/// Turns an already template-expanded body into HTML.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, body: &str) -> Rendered;
}

impl ContentRenderer for MarkdownRenderer {
    fn render(&self, body: &str) -> Rendered {
        let (html, toc) = MarkdownRenderer::render(self, body);
        Rendered { html, toc }
    }
}

/// HTML bodies are emitted unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlPassthrough;

impl ContentRenderer for HtmlPassthrough {
    fn render(&self, body: &str) -> Rendered {
        Rendered {
            html: body.to_string(),
            toc: Vec::new(),
        }
    }
}

/// Picks the renderer for a unit by its content type.
#[derive(Debug, Default)]
pub struct RendererRegistry {
    markdown: MarkdownRenderer,
    html: HtmlPassthrough,
}

impl RendererRegistry {
    /// Create a registry whose Markdown renderer uses the named theme.
    pub fn with_theme(theme: &str) -> Result<Self> {
        Ok(Self {
            markdown: MarkdownRenderer::new(SyntaxHighlighter::new(theme)?),
            html: HtmlPassthrough,
        })
    }

    /// The renderer for `content_type`.
    pub fn renderer(&self, content_type: ContentType) -> &dyn ContentRenderer {
        match content_type {
            ContentType::Markdown => &self.markdown,
            ContentType::Html => &self.html,
        }
    }

    /// Render a body of the given type.
    pub fn render(&self, content_type: ContentType, body: &str) -> Rendered {
        self.renderer(content_type).render(body)
    }
}

/// Escape HTML special characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_markdown() {
        let registry = RendererRegistry::default();
        let rendered = registry.render(ContentType::Markdown, "# Hello");

        assert!(rendered.html.contains("<h1 id=\"hello\">Hello</h1>"));
        assert_eq!(rendered.toc.len(), 1);
    }

    #[test]
    fn test_registry_html_passthrough() {
        let registry = RendererRegistry::default();
        let body = "<section>\n  # not a heading\n</section>";
        let rendered = registry.render(ContentType::Html, body);

        assert_eq!(rendered.html, body);
        assert!(rendered.toc.is_empty());
    }

    #[test]
    fn test_registry_rejects_unknown_theme() {
        let result = RendererRegistry::with_theme("missing");
        assert!(matches!(result, Err(ParserError::Syntax(_))));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html("\"it's\""), "&quot;it&#39;s&quot;");
    }
}
