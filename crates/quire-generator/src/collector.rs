//! Content discovery.
//!
//! Walks the content directory and parses every unit it finds.

use std::path::{Path, PathBuf};

use quire_core::{ContentType, ContentUnit, CoreError};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Content collection errors.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Directory traversal failed.
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A unit could not be read or parsed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Content collector that walks directories and parses files.
#[derive(Debug)]
pub struct ContentCollector {
    content_dir: PathBuf,
    drafts: bool,
}

impl ContentCollector {
    /// Create a new content collector.
    #[must_use]
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            drafts: false,
        }
    }

    /// Keep units marked `draft: true`.
    #[must_use]
    pub fn with_drafts(mut self, drafts: bool) -> Self {
        self.drafts = drafts;
        self
    }

    /// Parse every unit, sorted by source path.
    ///
    /// The first unit that fails to parse aborts the collection.
    pub fn collect(&self) -> Result<Vec<ContentUnit>> {
        info!(dir = %self.content_dir.display(), "collecting content");

        let files = self.find_content_files()?;
        info!(count = files.len(), "found content files");

        let parsed: Vec<ContentUnit> = files
            .par_iter()
            .map(|path| ContentUnit::load(&self.content_dir, path))
            .collect::<std::result::Result<_, _>>()?;

        let mut units: Vec<ContentUnit> = parsed
            .into_iter()
            .filter(|unit| {
                let keep = self.drafts || !unit.is_draft();
                if !keep {
                    debug!(source = %unit.source, "skipping draft");
                }
                keep
            })
            .collect();
        units.sort_by(|a, b| a.source.cmp(&b.source));

        Ok(units)
    }

    /// Find all content files recursively, skipping hidden entries.
    fn find_content_files(&self) -> Result<Vec<PathBuf>> {
        if !self.content_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.content_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

        for entry in walker {
            let entry = entry.map_err(|source| CollectorError::Walk {
                path: self.content_dir.clone(),
                source,
            })?;
            if entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(ContentType::from_extension)
                    .is_some()
            {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with(['.', '_']))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_collect_sorted_by_source() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.md", "B");
        write(dir.path(), "a-b.md", "AB");
        write(dir.path(), "a/z.html", "<p>Z</p>");
        write(dir.path(), "notes.txt", "ignored");
        write(dir.path(), ".hidden/x.md", "ignored");

        let units = ContentCollector::new(dir.path()).collect().unwrap();
        let sources: Vec<&str> = units.iter().map(|u| u.source.as_str()).collect();

        assert_eq!(sources, vec!["a-b.md", "a/z.html", "b.md"]);
    }

    #[test]
    fn test_drafts_are_skipped_unless_enabled() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "wip.md", "---\ndraft: true\n---\nWIP");
        write(dir.path(), "done.md", "Done");

        let units = ContentCollector::new(dir.path()).collect().unwrap();
        assert_eq!(units.len(), 1);

        let units = ContentCollector::new(dir.path())
            .with_drafts(true)
            .collect()
            .unwrap();
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_malformed_unit_fails_collection() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.md", "---\ntitle: a\ntitle: b\n---\n");

        let err = ContentCollector::new(dir.path()).collect().unwrap_err();
        assert!(matches!(
            err,
            CollectorError::Core(CoreError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn test_missing_content_dir_is_empty() {
        let units = ContentCollector::new("/nonexistent/content")
            .collect()
            .unwrap();
        assert!(units.is_empty());
    }
}
