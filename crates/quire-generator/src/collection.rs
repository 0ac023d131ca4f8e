//! Collection membership, output path assignment and collection indices.

use std::{cmp::Ordering, collections::BTreeMap};

use quire_core::{CollectionConfig, ContentUnit};
use thiserror::Error;
use tracing::debug;

use crate::{
    page::Page,
    permalink::{self, OutputPath},
};

/// Collection resolution errors.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// A unit lies under the source roots of several collections.
    #[error("{path} matches more than one collection: {}", collections.join(", "))]
    Ambiguous {
        path: String,
        collections: Vec<String>,
    },

    /// Two sources resolve to the same output.
    #[error("duplicate output path {url}: claimed by {first} and {second}")]
    DuplicateOutputPath {
        url: String,
        first: String,
        second: String,
    },

    /// A permalink pattern could not be expanded.
    #[error("invalid permalink `{pattern}` for {path}: {message}")]
    InvalidPermalink {
        path: String,
        pattern: String,
        message: String,
    },
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Where one unit goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Owning collection, `None` for standalone pages.
    pub collection: Option<String>,

    /// Public URL path.
    pub url: String,

    /// File below the output root.
    pub output_file: String,
}

/// Assigns units to collections and computes their output paths.
#[derive(Debug)]
pub struct CollectionResolver<'a> {
    defs: &'a BTreeMap<String, CollectionConfig>,
    default_permalink: &'a str,
}

impl<'a> CollectionResolver<'a> {
    #[must_use]
    pub fn new(defs: &'a BTreeMap<String, CollectionConfig>, default_permalink: &'a str) -> Self {
        Self {
            defs,
            default_permalink,
        }
    }

    /// The collection whose source root contains `unit`, if any.
    pub fn collection_for(&self, unit: &ContentUnit) -> Result<Option<&'a str>> {
        let dir: Vec<&str> = unit.dir().split('/').filter(|s| !s.is_empty()).collect();

        let matches: Vec<&'a str> = self
            .defs
            .iter()
            .filter(|(name, def)| {
                let root: Vec<&str> = def
                    .source_dir(name)
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .collect();
                dir.starts_with(&root)
            })
            .map(|(name, _)| name.as_str())
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(CollectionError::Ambiguous {
                path: unit.source.clone(),
                collections: many.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    /// Assign every unit, index-aligned with `units`.
    ///
    /// Output paths are claimed in lexicographic source order, so the first
    /// source keeps a contested path and the next one fails.
    pub fn assign(&self, units: &[ContentUnit]) -> Result<Vec<Assignment>> {
        self.assign_with_claims(units, &mut OutputClaims::default())
    }

    /// [`assign`](Self::assign), recording claims in a shared ledger so
    /// later outputs (aliases, static files) are checked against them.
    pub fn assign_with_claims(
        &self,
        units: &[ContentUnit],
        claims: &mut OutputClaims,
    ) -> Result<Vec<Assignment>> {
        let mut assignments = Vec::with_capacity(units.len());

        for unit in units {
            let collection = self.collection_for(unit)?;
            let pattern = unit
                .frontmatter
                .permalink()
                .or_else(|| {
                    collection
                        .and_then(|name| self.defs.get(name))
                        .and_then(|def| def.permalink.as_deref())
                })
                .unwrap_or(self.default_permalink);

            let output = permalink::resolve(pattern, unit, collection)?;
            debug!(source = %unit.source, url = %output.url, "assigned output path");

            assignments.push(Assignment {
                collection: collection.map(str::to_string),
                url: output.url,
                output_file: output.file,
            });
        }

        let mut order: Vec<usize> = (0..units.len()).collect();
        order.sort_by(|a, b| units[*a].source.cmp(&units[*b].source));

        for idx in order {
            let assignment = &assignments[idx];
            claims.claim(
                &OutputPath {
                    url: assignment.url.clone(),
                    file: assignment.output_file.clone(),
                },
                &units[idx].source,
            )?;
        }

        Ok(assignments)
    }
}

/// Ledger of claimed output files.
#[derive(Debug, Default)]
pub struct OutputClaims {
    by_file: BTreeMap<String, String>,
}

impl OutputClaims {
    /// Claim `output` for `owner`, failing if someone already holds it.
    pub fn claim(&mut self, output: &OutputPath, owner: &str) -> Result<()> {
        if let Some(first) = self.by_file.get(&output.file) {
            return Err(CollectionError::DuplicateOutputPath {
                url: output.url.clone(),
                first: first.clone(),
                second: owner.to_string(),
            });
        }
        self.by_file.insert(output.file.clone(), owner.to_string());
        Ok(())
    }

    /// Whether `file` has been claimed.
    #[must_use]
    pub fn contains(&self, file: &str) -> bool {
        self.by_file.contains_key(file)
    }
}

/// A collection and the pages it indexes.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,

    /// Source directory under the content dir.
    pub source: String,

    pub layout: Option<String>,

    /// Indices into the assembler's page list, in display order.
    pub members: Vec<usize>,
}

/// Build every configured collection's index.
///
/// Members are ordered by the collection's `sort_by` key (descending when
/// `reverse` is set), then by source path. Pages missing the key sort last.
pub fn build_collections(
    defs: &BTreeMap<String, CollectionConfig>,
    pages: &[Page],
) -> BTreeMap<String, Collection> {
    defs.iter()
        .map(|(name, def)| {
            let mut members: Vec<usize> = pages
                .iter()
                .enumerate()
                .filter(|(_, page)| page.collection.as_deref() == Some(name.as_str()))
                .map(|(idx, _)| idx)
                .collect();

            members.sort_by(|a, b| {
                let (a, b) = (&pages[*a], &pages[*b]);
                let key_a = a.sort_key(&def.sort_by);
                let key_b = b.sort_key(&def.sort_by);
                let by_key = match (key_a.is_null(), key_b.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        let ord = key_a.loose_cmp(&key_b).unwrap_or(Ordering::Equal);
                        if def.reverse { ord.reverse() } else { ord }
                    }
                };
                by_key.then_with(|| a.source.cmp(&b.source))
            });

            let collection = Collection {
                name: name.clone(),
                source: def.source_dir(name).to_string(),
                layout: def.layout.clone(),
                members,
            };
            (name.clone(), collection)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(entries: &[(&str, Option<&str>, Option<&str>)]) -> BTreeMap<String, CollectionConfig> {
        entries
            .iter()
            .map(|(name, source, permalink)| {
                let def = CollectionConfig {
                    source: source.map(str::to_string),
                    permalink: permalink.map(str::to_string),
                    ..CollectionConfig::default()
                };
                (name.to_string(), def)
            })
            .collect()
    }

    fn unit(source: &str, text: &str) -> ContentUnit {
        ContentUnit::parse(source, text).unwrap()
    }

    #[test]
    fn test_membership_by_source_root() {
        let defs = defs(&[("posts", Some("blog"), Some("/blog/:title/"))]);
        let resolver = CollectionResolver::new(&defs, "pretty");
        let units = vec![
            unit("blog/2024-01-01-hello.md", "Hi"),
            unit("blogroll.md", "Links"),
            unit("about.md", "About"),
        ];

        let assigned = resolver.assign(&units).unwrap();

        assert_eq!(assigned[0].collection.as_deref(), Some("posts"));
        assert_eq!(assigned[0].url, "/blog/hello/");
        // `blogroll.md` shares a prefix but not a path component.
        assert_eq!(assigned[1].collection, None);
        assert_eq!(assigned[1].url, "/blogroll/");
        assert_eq!(assigned[2].output_file, "about/index.html");
    }

    #[test]
    fn test_explicit_permalink_overrides_collection() {
        let defs = defs(&[("posts", Some("blog"), Some("/blog/:title/"))]);
        let resolver = CollectionResolver::new(&defs, "pretty");
        let units = vec![unit("blog/launch.md", "---\npermalink: /launch/\n---\n")];

        let assigned = resolver.assign(&units).unwrap();
        assert_eq!(assigned[0].url, "/launch/");
    }

    #[test]
    fn test_nested_roots_are_ambiguous() {
        let defs = defs(&[("docs", Some("docs"), None), ("api", Some("docs/api"), None)]);
        let resolver = CollectionResolver::new(&defs, "pretty");
        let units = vec![unit("docs/api/intro.md", "Intro")];

        let err = resolver.assign(&units).unwrap_err();
        match err {
            CollectionError::Ambiguous { path, collections } => {
                assert_eq!(path, "docs/api/intro.md");
                assert_eq!(collections, vec!["api", "docs"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_output_path_names_both_sources() {
        let defs = defs(&[("pages", Some("pages"), Some("/:title/"))]);
        let resolver = CollectionResolver::new(&defs, "pretty");
        // Listed out of order; the lexicographically first source wins.
        let units = vec![unit("pages/about.md", "Item"), unit("about.md", "Page")];

        let err = resolver.assign(&units).unwrap_err();
        match err {
            CollectionError::DuplicateOutputPath { url, first, second } => {
                assert_eq!(url, "/about/");
                assert_eq!(first, "about.md");
                assert_eq!(second, "pages/about.md");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_output_claims() {
        let mut claims = OutputClaims::default();
        let out = OutputPath {
            url: "/a/".into(),
            file: "a/index.html".into(),
        };
        claims.claim(&out, "a.md").unwrap();
        assert!(claims.contains("a/index.html"));
        assert!(claims.claim(&out, "b.md").is_err());
    }

    #[test]
    fn test_collection_index_sorted_newest_first() {
        let defs = defs(&[("posts", Some("blog"), Some("/blog/:title/"))]);
        let resolver = CollectionResolver::new(&defs, "pretty");
        let units = vec![
            unit("blog/2024-01-01-old.md", "Old"),
            unit("blog/2024-06-01-new.md", "New"),
            unit("blog/undated.md", "Undated"),
            unit("about.md", "About"),
        ];
        let assigned = resolver.assign(&units).unwrap();
        let pages: Vec<Page> = units
            .iter()
            .zip(&assigned)
            .map(|(u, a)| Page::new(u, a))
            .collect();

        let collections = build_collections(&defs, &pages);
        let posts = &collections["posts"];

        // Newest first, undated last.
        let urls: Vec<&str> = posts.members.iter().map(|i| pages[*i].url.as_str()).collect();
        assert_eq!(urls, vec!["/blog/new/", "/blog/old/", "/blog/undated/"]);
    }
}
