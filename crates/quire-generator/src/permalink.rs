//! Permalink pattern expansion and output path normalisation.
//!
//! A pattern such as `/blog/:year/:slug/` is expanded against one unit's
//! metadata, then normalised into the public URL and the file written below
//! the output root.

use chrono::Datelike;
use quire_core::{ContentUnit, Value, slugify};

use crate::collection::{CollectionError, Result};

/// Resolved location of one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    /// Public URL path, always starting with `/`.
    pub url: String,

    /// File below the output root, `/`-separated and without a leading `/`.
    pub file: String,
}

/// Expand a named style into its pattern.
#[must_use]
pub fn style_pattern(pattern: &str) -> &str {
    match pattern {
        "pretty" => "/:path/",
        "date" => "/:year/:month/:day/:title/",
        "ordinal" => "/:year/:y_day/:title/",
        "none" => "/:path.html",
        other => other,
    }
}

/// Expand `pattern` for `unit`, which belongs to `collection` (if any).
pub fn expand(pattern: &str, unit: &ContentUnit, collection: Option<&str>) -> Result<String> {
    let pattern = style_pattern(pattern);
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;

    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map_or(after.len(), |(i, _)| i);

        if len == 0 || !after.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            out.push(':');
            rest = after;
            continue;
        }

        let token = &after[..len];
        out.push_str(&token_value(token, unit, collection, pattern)?);
        rest = &after[len..];
    }
    out.push_str(rest);

    Ok(out)
}

fn token_value(
    token: &str,
    unit: &ContentUnit,
    collection: Option<&str>,
    pattern: &str,
) -> Result<String> {
    let invalid = |message: String| CollectionError::InvalidPermalink {
        path: unit.source.clone(),
        pattern: pattern.to_string(),
        message,
    };

    let date = || {
        unit.date
            .ok_or_else(|| invalid(format!("`:{token}` needs a date but the unit has none")))
    };

    let value = match token {
        "collection" => collection.unwrap_or_default().to_string(),
        "path" => unit.path_stem(),
        "dir" => unit.dir().to_string(),
        "name" => unit.name.stem.clone(),
        "title" => unit
            .frontmatter
            .slug()
            .map_or_else(|| unit.name.slug.clone(), slugify),
        "slug" => unit.slug(),
        "year" => format!("{:04}", date()?.year()),
        "short_year" => format!("{:02}", date()?.year() % 100),
        "month" => format!("{:02}", date()?.month()),
        "i_month" => date()?.month().to_string(),
        "day" => format!("{:02}", date()?.day()),
        "i_day" => date()?.day().to_string(),
        "y_day" => format!("{:03}", date()?.ordinal()),
        key => match unit.frontmatter.get(key) {
            Some(value @ (Value::String(_) | Value::Integer(_) | Value::Float(_) | Value::Bool(_))) => {
                slugify(&value.to_string())
            }
            _ => return Err(invalid(format!("unknown token `:{key}`"))),
        },
    };

    Ok(value)
}

/// Normalise an expanded permalink into a URL and output file.
///
/// Duplicate slashes collapse; a trailing `/` writes `index.html`; a final
/// segment with an extension is written as-is; anything else gains a
/// trailing `/`. `.` and `..` segments are rejected.
pub fn normalize(raw: &str, source: &str) -> Result<OutputPath> {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(bad) = segments.iter().find(|s| **s == ".." || **s == ".") {
        return Err(CollectionError::InvalidPermalink {
            path: source.to_string(),
            pattern: raw.to_string(),
            message: format!("`{bad}` segments are not allowed"),
        });
    }

    let joined = segments.join("/");
    if joined.is_empty() {
        return Ok(OutputPath {
            url: "/".to_string(),
            file: "index.html".to_string(),
        });
    }

    let has_extension = !raw.ends_with('/')
        && segments
            .last()
            .and_then(|last| last.rsplit_once('.'))
            .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty());

    if has_extension {
        Ok(OutputPath {
            url: format!("/{joined}"),
            file: joined,
        })
    } else {
        Ok(OutputPath {
            url: format!("/{joined}/"),
            file: format!("{joined}/index.html"),
        })
    }
}

/// Expand and normalise in one step.
pub fn resolve(pattern: &str, unit: &ContentUnit, collection: Option<&str>) -> Result<OutputPath> {
    let expanded = expand(pattern, unit, collection)?;
    normalize(&expanded, &unit.source)
}
