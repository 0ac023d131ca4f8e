//! Syntax highlighting for fenced code blocks.

use syntect::{
    highlighting::{Theme, ThemeSet},
    html::highlighted_html_for_string,
    parsing::SyntaxSet,
};
use thiserror::Error;

use crate::escape_html;

/// Theme used when the configuration does not name one.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Syntax highlighting errors.
#[derive(Debug, Error)]
pub enum SyntaxError {
    /// The configured theme is not bundled with syntect.
    #[error("unknown highlight theme `{name}` (available: {available})")]
    UnknownTheme { name: String, available: String },
}

/// Syntax highlighter using syntect.
#[derive(Debug)]
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
    theme_name: String,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = themes.remove(DEFAULT_THEME).unwrap_or_default();
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
            theme_name: DEFAULT_THEME.to_string(),
        }
    }
}

impl SyntaxHighlighter {
    /// Create a highlighter for one of syntect's bundled themes.
    pub fn new(theme: &str) -> Result<Self, SyntaxError> {
        let mut themes = ThemeSet::load_defaults().themes;
        let Some(selected) = themes.remove(theme) else {
            let available = themes.keys().cloned().collect::<Vec<_>>().join(", ");
            return Err(SyntaxError::UnknownTheme {
                name: theme.to_string(),
                available,
            });
        };

        Ok(Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme: selected,
            theme_name: theme.to_string(),
        })
    }

    /// Name of the active theme.
    pub fn theme_name(&self) -> &str {
        &self.theme_name
    }

    /// Highlight code with the given language.
    ///
    /// Unknown or missing languages produce a plain escaped
    /// `<pre><code>` block so the output never depends on guessing.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let Some(syntax) = lang.and_then(|l| self.syntax_set.find_syntax_by_token(l)) else {
            return plain_block(code, lang);
        };

        match highlighted_html_for_string(code, &self.syntax_set, syntax, &self.theme) {
            Ok(html) => html,
            Err(_) => plain_block(code, lang),
        }
    }
}

fn plain_block(code: &str, lang: Option<&str>) -> String {
    let lang_class = lang
        .map(|l| format!(" class=\"language-{}\"", escape_html(l)))
        .unwrap_or_default();
    format!("<pre><code{lang_class}>{}</code></pre>\n", escape_html(code))
}
