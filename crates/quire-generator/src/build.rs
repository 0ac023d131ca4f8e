//! Build orchestration.
//!
//! Coordinates the full site build: load, resolve, render in parallel,
//! reduce into cross-page artifacts, then publish atomically.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use quire_core::{Config, ContentUnit, CoreError, Map, Site, Value};
use quire_parser::{ParserError, RendererRegistry};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    assets::{
        AssetError, AssetProcessor, CssBundler, StaticFile, Stylesheet, assets_value,
        compile_stylesheet,
    },
    collection::{Collection, CollectionError, CollectionResolver, OutputClaims, build_collections},
    collector::{CollectorError, ContentCollector},
    compose::Composer,
    layout::{LayoutError, LayoutRegistry},
    navigation::{NavState, Navigation},
    page::Page,
    permalink::{self, OutputPath},
    redirect::{Redirect, RedirectRenderer, collect_redirects},
    rss::RssGenerator,
    sitemap::SitemapGenerator,
    template::{FragmentRegistry, TemplateError},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration, metadata or data table error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Collector error.
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Collection membership or output path error.
    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// Layout error.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Template error outside a unit render.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A unit failed to render.
    #[error("failed to render {unit}: {source}")]
    Render {
        unit: String,
        #[source]
        source: TemplateError,
    },

    /// Content renderer setup error.
    #[error("renderer error: {0}")]
    Parser(#[from] ParserError),

    /// Asset error.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// Writing the output tree failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Publishing failed and the previous output could not be moved back.
    #[error("failed to publish to {path}: {source}; previous output left at {backup}")]
    PublishRestore {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No unit at the requested index.
    #[error("no content unit at index {0}")]
    UnknownUnit(usize),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Build statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Number of pages generated.
    pub pages: usize,

    /// Number of collections indexed.
    pub collections: usize,

    /// Number of redirect pages generated.
    pub redirects: usize,

    /// Number of static files copied.
    pub assets: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// A generated non-page file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub file: String,
    pub content: String,
}

/// Cross-page outputs computed after every page is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    /// Navigation state per unit source.
    pub navigation: BTreeMap<String, Vec<NavState>>,

    pub sitemap: Option<GeneratedFile>,

    pub feed: Option<GeneratedFile>,

    /// Redirect pages keyed by output file.
    pub redirects: BTreeMap<String, String>,

    pub stylesheet: Option<Stylesheet>,
}

/// Everything a build produces, before it is written anywhere.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Rendered pages keyed by output file.
    pub outputs: BTreeMap<String, String>,

    pub artifacts: Artifacts,

    /// Static files to copy verbatim.
    pub static_files: Vec<StaticFile>,

    pub stats: BuildStats,
}

impl BuildResult {
    /// Every generated file (pages, redirects, sitemap, feed, stylesheet)
    /// in output path order.
    #[must_use]
    pub fn files(&self) -> BTreeMap<&str, &str> {
        let mut files: BTreeMap<&str, &str> = self
            .outputs
            .iter()
            .map(|(file, html)| (file.as_str(), html.as_str()))
            .collect();
        for (file, html) in &self.artifacts.redirects {
            files.insert(file, html);
        }
        for generated in [&self.artifacts.sitemap, &self.artifacts.feed].into_iter().flatten() {
            files.insert(&generated.file, &generated.content);
        }
        if let Some(sheet) = &self.artifacts.stylesheet {
            files.insert(&sheet.file, &sheet.css);
        }
        files
    }
}

/// Resolved inputs of a build: steps one to four, before any rendering.
#[derive(Debug)]
pub struct SitePlan {
    pub units: Vec<ContentUnit>,

    /// Index-aligned with `units`.
    pub pages: Vec<Page>,

    /// Selected layout per unit, index-aligned with `units`.
    pub layouts_for: Vec<Option<String>>,

    pub layouts: LayoutRegistry,
    pub fragments: FragmentRegistry,
    pub collections: BTreeMap<String, Collection>,
    pub navigation: Navigation,
    pub redirects: Vec<Redirect>,
    pub stylesheet: Option<Stylesheet>,
    pub static_files: Vec<StaticFile>,
    renderers: RendererRegistry,
    collections_value: Value,
    assets_value: Value,
    feed: Option<OutputPath>,
    sitemap: Option<OutputPath>,
}

impl SitePlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Site builder that orchestrates the build process.
#[derive(Debug)]
pub struct Builder {
    site: Site,
}

impl Builder {
    #[must_use]
    pub fn new(site: Site) -> Self {
        Self { site }
    }

    #[must_use]
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Execute the full build without writing anything.
    pub fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();
        info!(root = %self.site.root.display(), "starting build");

        let plan = self.plan()?;

        info!(count = plan.len(), "rendering pages");
        let rendered: Vec<Result<(String, Vec<NavState>)>> = (0..plan.len())
            .into_par_iter()
            .map(|idx| {
                let nav = plan.navigation.state_for(&plan.pages[idx].url);
                let html = self.compose(&plan, idx, &nav)?;
                Ok((html, nav))
            })
            .collect();

        let mut outputs = BTreeMap::new();
        let mut navigation = BTreeMap::new();
        for (page, result) in plan.pages.iter().zip(rendered) {
            let (html, nav) = result?;
            debug!(source = %page.source, file = %page.output_file, "rendered page");
            outputs.insert(page.output_file.clone(), html);
            navigation.insert(page.source.clone(), nav);
        }

        let artifacts = self.artifacts(&plan, navigation)?;

        let stats = BuildStats {
            pages: outputs.len(),
            collections: plan.collections.len(),
            redirects: artifacts.redirects.len(),
            assets: plan.static_files.len(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            pages = stats.pages,
            collections = stats.collections,
            redirects = stats.redirects,
            assets = stats.assets,
            duration_ms = stats.duration_ms,
            "build complete"
        );

        Ok(BuildResult {
            outputs,
            artifacts,
            static_files: plan.static_files,
            stats,
        })
    }

    /// Load and resolve everything a render needs.
    ///
    /// Output paths are claimed in a fixed order: units, then aliases, then
    /// generated files, then static files.
    pub fn plan(&self) -> Result<SitePlan> {
        let config = &self.site.config;

        let units = ContentCollector::new(self.site.content_dir())
            .with_drafts(config.build.drafts)
            .collect()?;

        let mut claims = OutputClaims::default();
        let resolver = CollectionResolver::new(&config.collections, &config.permalink);
        let assignments = resolver.assign_with_claims(&units, &mut claims)?;
        let pages: Vec<Page> = units
            .iter()
            .zip(&assignments)
            .map(|(unit, assignment)| Page::new(unit, assignment))
            .collect();

        let redirects = collect_redirects(&pages, config, &mut claims)?;

        let fragments = FragmentRegistry::load(&self.site.includes_dir())?;
        fragments.validate()?;
        let layouts = LayoutRegistry::load(&self.site.layouts_dir())?;
        layouts.validate()?;
        layouts.check_fragments(&fragments)?;

        let mut layouts_for = Vec::with_capacity(units.len());
        for (unit, page) in units.iter().zip(&pages) {
            let collection_layout = page
                .collection
                .as_deref()
                .and_then(|name| config.collections.get(name))
                .and_then(|def| def.layout.as_deref());
            let selected = layouts.select(unit, collection_layout, &config.build.default_layout);
            if let Some(name) = &selected {
                layouts.resolve_chain(name, &unit.source)?;
            }
            layouts_for.push(selected);
        }

        let collections = build_collections(&config.collections, &pages);
        let collections_value = collections_value(&collections, &pages);

        let sitemap = if config.sitemap.enabled {
            let output = permalink::normalize(&config.sitemap.path, "[sitemap]")?;
            claims.claim(&output, "[sitemap]")?;
            Some(output)
        } else {
            None
        };

        let feed = if !config.feed.enabled {
            None
        } else if collections.contains_key(&config.feed.collection) {
            let output = permalink::normalize(&config.feed.path, "[feed]")?;
            claims.claim(&output, "[feed]")?;
            Some(output)
        } else {
            warn!(collection = %config.feed.collection, "feed collection is not defined, skipping feed");
            None
        };

        let stylesheet = compile_stylesheet(&self.site, &CssBundler::new(config.styles.minify))?;
        if let Some(sheet) = &stylesheet {
            claims.claim(
                &OutputPath {
                    url: sheet.url.clone(),
                    file: sheet.file.clone(),
                },
                "[stylesheet]",
            )?;
        }
        let assets_value = assets_value(stylesheet.as_ref());

        let static_files = AssetProcessor::new(self.site.static_dir()).scan()?;
        for file in &static_files {
            claims.claim(
                &OutputPath {
                    url: format!("/{}", file.relative),
                    file: file.relative.clone(),
                },
                &format!("{}/{}", config.build.static_dir, file.relative),
            )?;
        }

        let renderers = RendererRegistry::with_theme(&config.build.highlight_theme)?;

        Ok(SitePlan {
            units,
            pages,
            layouts_for,
            layouts,
            fragments,
            collections,
            navigation: Navigation::from_site(&self.site),
            redirects,
            stylesheet,
            static_files,
            renderers,
            collections_value,
            assets_value,
            feed,
            sitemap,
        })
    }

    /// Render the unit at `idx` on its own.
    pub fn render_page(&self, plan: &SitePlan, idx: usize) -> Result<String> {
        let page = plan.pages.get(idx).ok_or(BuildError::UnknownUnit(idx))?;
        let nav = plan.navigation.state_for(&page.url);
        self.compose(plan, idx, &nav)
    }

    fn compose(&self, plan: &SitePlan, idx: usize, nav: &[NavState]) -> Result<String> {
        let (Some(unit), Some(page)) = (plan.units.get(idx), plan.pages.get(idx)) else {
            return Err(BuildError::UnknownUnit(idx));
        };

        let chain = match plan.layouts_for.get(idx).and_then(Option::as_deref) {
            Some(name) => plan.layouts.resolve_chain(name, &unit.source)?,
            None => Vec::new(),
        };

        let composer = Composer::new(
            &self.site,
            &plan.fragments,
            &plan.renderers,
            &plan.collections_value,
            &plan.assets_value,
        );
        composer
            .render(unit, page, &chain, nav)
            .map_err(|source| BuildError::Render {
                unit: unit.source.clone(),
                source,
            })
    }

    /// Sitemap, feed and redirects, computed once every path is known.
    fn artifacts(
        &self,
        plan: &SitePlan,
        navigation: BTreeMap<String, Vec<NavState>>,
    ) -> Result<Artifacts> {
        let config = &self.site.config;

        let sitemap = plan.sitemap.as_ref().map(|output| GeneratedFile {
            file: output.file.clone(),
            content: SitemapGenerator::new(config).generate(&plan.pages),
        });

        let feed = plan.feed.as_ref().and_then(|output| {
            let collection = plan.collections.get(&config.feed.collection)?;
            Some(GeneratedFile {
                file: output.file.clone(),
                content: RssGenerator::new(config).generate(&plan.pages, &collection.members),
            })
        });

        let renderer = RedirectRenderer::new()?;
        let mut redirects = BTreeMap::new();
        for redirect in &plan.redirects {
            redirects.insert(redirect.from.file.clone(), renderer.render(&redirect.to)?);
        }

        Ok(Artifacts {
            navigation,
            sitemap,
            feed,
            redirects,
            stylesheet: plan.stylesheet.clone(),
        })
    }
}

/// The `collections` template namespace: name to ordered page summaries.
fn collections_value(collections: &BTreeMap<String, Collection>, pages: &[Page]) -> Value {
    let map: Map = collections
        .iter()
        .map(|(name, collection)| {
            let members = collection
                .members
                .iter()
                .filter_map(|idx| pages.get(*idx))
                .map(Page::to_value)
                .collect();
            (name.clone(), Value::List(members))
        })
        .collect();
    Value::Map(map)
}

fn write_file(root: &Path, relative: &str, content: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| BuildError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, content).map_err(|source| BuildError::Io { path, source })
}

/// Write `result` to `output_root`.
///
/// Everything goes into a staging directory next to the output root, which
/// then replaces it. If any write fails the staging directory is removed and
/// the previous output is left untouched.
pub fn publish(result: &BuildResult, output_root: &Path) -> Result<()> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BuildError::Io { path, source }
    };

    let parent = match output_root.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(io(&parent))?;

    let staging = tempfile::Builder::new()
        .prefix(".quire-staging-")
        .tempdir_in(&parent)
        .map_err(io(&parent))?;

    let files = result.files();
    for (file, content) in &files {
        write_file(staging.path(), file, content)?;
    }
    let manifest = AssetProcessor::copy(&result.static_files, staging.path())?;
    debug!(
        files = files.len(),
        assets = manifest.len(),
        staging = %staging.path().display(),
        "staged output"
    );

    let name = output_root
        .file_name()
        .map_or_else(|| "output".into(), |n| n.to_string_lossy().into_owned());
    let backup = parent.join(format!(".{name}.previous"));
    if backup.exists() {
        fs::remove_dir_all(&backup).map_err(io(&backup))?;
    }

    let had_previous = output_root.exists();
    if had_previous {
        fs::rename(output_root, &backup).map_err(io(output_root))?;
    }

    let staged = staging.keep();
    swap_into_place(&staged, output_root, had_previous.then_some(backup.as_path()))?;

    if had_previous {
        fs::remove_dir_all(&backup).map_err(io(&backup))?;
    }

    info!(output = %output_root.display(), files = files.len() + result.static_files.len(), "published");
    Ok(())
}

/// Move `staged` to `output_root`. On failure the staged tree is removed and
/// the previous output, if any, is moved back from `backup`.
fn swap_into_place(staged: &Path, output_root: &Path, backup: Option<&Path>) -> Result<()> {
    let Err(source) = fs::rename(staged, output_root) else {
        return Ok(());
    };

    if let Err(err) = fs::remove_dir_all(staged) {
        warn!(staging = %staged.display(), error = %err, "failed to remove staging directory");
    }
    if let Some(backup) = backup
        && let Err(err) = fs::rename(backup, output_root)
    {
        warn!(
            backup = %backup.display(),
            output = %output_root.display(),
            error = %err,
            "failed to restore previous output"
        );
        return Err(BuildError::PublishRestore {
            path: output_root.to_path_buf(),
            backup: backup.to_path_buf(),
            source,
        });
    }

    Err(BuildError::Io {
        path: output_root.to_path_buf(),
        source,
    })
}

/// Name of the configuration file looked up in the source root.
pub const CONFIG_FILE: &str = "quire.toml";

/// Build the site at `source_root` and publish it to `output_root`.
pub fn build(source_root: &Path, output_root: &Path) -> Result<BuildStats> {
    let config = Config::load_with_env(&source_root.join(CONFIG_FILE))?;
    let site = Site::load(source_root, config)?;
    let result = Builder::new(site).build()?;
    publish(&result, output_root)?;
    Ok(result.stats)
}
