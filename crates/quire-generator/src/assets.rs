//! Asset processing: static files and the compiled stylesheet.
//!
//! Static files are copied verbatim. Stylesheet sources go through a
//! [`StylesheetCompiler`] and can be fingerprinted for cache busting.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use quire_core::{Map, Site, Value};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed.
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A configured stylesheet source does not exist.
    #[error("stylesheet source {0} not found")]
    MissingStyle(PathBuf),
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AssetError + '_ {
    move |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Asset manifest for tracking processed assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    /// Mapping from original path to published path.
    assets: BTreeMap<String, String>,
}

impl AssetManifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset to the manifest.
    pub fn add(&mut self, original: impl Into<String>, published: impl Into<String>) {
        self.assets.insert(original.into(), published.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// A file below the static directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// `/`-separated path relative to the static dir; also the output file.
    pub relative: String,

    pub path: PathBuf,
}

/// Copies the static directory.
#[derive(Debug)]
pub struct AssetProcessor {
    source_dir: PathBuf,
}

impl AssetProcessor {
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// List static files, sorted, skipping hidden entries.
    pub fn scan(&self) -> Result<Vec<StaticFile>> {
        if !self.source_dir.exists() {
            debug!("static directory does not exist, skipping");
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| AssetError::Walk {
                path: self.source_dir.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_path(&self.source_dir, entry.path());
            files.push(StaticFile {
                relative,
                path: entry.into_path(),
            });
        }
        Ok(files)
    }

    /// Copy `files` below `dest_dir`.
    pub fn copy(files: &[StaticFile], dest_dir: &Path) -> Result<AssetManifest> {
        let mut manifest = AssetManifest::new();
        for file in files {
            let dest = dest_dir.join(&file.relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::copy(&file.path, &dest).map_err(io_error(&file.path))?;
            let url = format!("/{}", file.relative);
            manifest.add(url.clone(), url);
            debug!(src = %file.path.display(), dest = %dest.display(), "copied asset");
        }

        info!(count = manifest.len(), "assets processed");
        Ok(manifest)
    }
}

fn relative_path(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// One stylesheet input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSource {
    /// Path relative to the styles directory.
    pub name: String,

    pub css: String,
}

/// Turns stylesheet sources into one stylesheet.
pub trait StylesheetCompiler: Send + Sync {
    fn compile(&self, sources: &[StyleSource]) -> Result<String>;
}

/// Concatenates CSS sources in order, optionally minified.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssBundler {
    minify: bool,
}

impl CssBundler {
    #[must_use]
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }
}

impl StylesheetCompiler for CssBundler {
    fn compile(&self, sources: &[StyleSource]) -> Result<String> {
        if self.minify {
            return Ok(sources.iter().map(|s| minify_css(&s.css)).collect());
        }

        let mut out = String::new();
        for source in sources {
            out.push_str(&format!("/* {} */\n", source.name));
            out.push_str(source.css.trim_end());
            out.push('\n');
        }
        Ok(out)
    }
}

/// Strip comments and collapse whitespace.
#[must_use]
pub fn minify_css(css: &str) -> String {
    const TIGHT_AFTER: &[char] = &['{', '}', ';', ',', ':'];
    const TIGHT_BEFORE: &[char] = &['{', '}', ';', ','];

    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = '\0';
            for n in chars.by_ref() {
                if prev == '*' && n == '/' {
                    break;
                }
                prev = n;
            }
            pending_space = true;
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        if pending_space && !out.is_empty() && !out.ends_with(TIGHT_AFTER) && !TIGHT_BEFORE.contains(&c)
        {
            out.push(' ');
        }
        pending_space = false;

        if c == '}' && out.ends_with(';') {
            out.pop();
        }
        out.push(c);
    }

    out
}

/// Short FNV-1a hash of `bytes` for fingerprinting.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")[..8].to_string()
}

/// The compiled site stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    /// Output file below the output root.
    pub file: String,

    /// Public URL path.
    pub url: String,

    pub css: String,
}

/// Read stylesheet sources: the configured list in order, or every `.css`
/// file below the styles directory sorted by path.
pub fn collect_style_sources(styles_dir: &Path, configured: &[String]) -> Result<Vec<StyleSource>> {
    let paths: Vec<PathBuf> = if configured.is_empty() {
        if !styles_dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(styles_dir).sort_by_file_name() {
            let entry = entry.map_err(|source| AssetError::Walk {
                path: styles_dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "css") {
                paths.push(entry.into_path());
            }
        }
        paths
    } else {
        configured
            .iter()
            .map(|name| {
                let path = styles_dir.join(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(AssetError::MissingStyle(path))
                }
            })
            .collect::<Result<_>>()?
    };

    paths
        .iter()
        .map(|path| {
            let css = fs::read_to_string(path).map_err(io_error(path))?;
            Ok(StyleSource {
                name: relative_path(styles_dir, path),
                css,
            })
        })
        .collect()
}

/// Compile the site stylesheet. `None` when there are no sources.
pub fn compile_stylesheet(site: &Site, compiler: &dyn StylesheetCompiler) -> Result<Option<Stylesheet>> {
    let styles = &site.config.styles;
    let sources = collect_style_sources(&site.styles_dir(), &styles.sources)?;
    if sources.is_empty() {
        return Ok(None);
    }

    let css = compiler.compile(&sources)?;
    let output = styles.output.trim_start_matches('/');
    let file = if styles.fingerprint {
        let hash = fingerprint(css.as_bytes());
        match output.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}.{hash}.{ext}"),
            None => format!("{output}.{hash}"),
        }
    } else {
        output.to_string()
    };

    info!(sources = sources.len(), file = %file, "compiled stylesheet");
    Ok(Some(Stylesheet {
        url: format!("/{file}"),
        file,
        css,
    }))
}

/// The `assets` template namespace.
#[must_use]
pub fn assets_value(stylesheet: Option<&Stylesheet>) -> Value {
    let mut map = Map::new();
    map.insert(
        "stylesheet".into(),
        stylesheet.map(|s| s.url.clone()).into(),
    );
    Value::Map(map)
}
