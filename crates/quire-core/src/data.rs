//! Structured data tables (`data/*.yml`, `*.toml`, `*.json`).
//!
//! Each file becomes a table named after its stem; nested directories become
//! nested maps, so `data/menus/main.yml` is reachable as `data.menus.main`.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::{
    error::{CoreError, Result},
    value::{Map, Value},
};

/// Supported data table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Toml,
    Json,
}

impl DataFormat {
    /// Determine format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "yml" | "yaml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Parse a document in this format.
    pub fn parse(&self, content: &str, path: &Path) -> Result<Value> {
        let parsed = match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| {
            CoreError::config(format!(
                "Failed to parse data file {}: {message}",
                path.display()
            ))
        })
    }
}

/// Data tables keyed by name.
pub type DataTables = Map;

/// Load every data table under `dir`.
///
/// A missing directory yields no tables. Two files claiming the same table
/// name are rejected rather than merged.
pub fn load_data_tables(dir: &Path) -> Result<DataTables> {
    let mut tables = DataTables::new();
    if !dir.exists() {
        debug!(dir = %dir.display(), "no data directory");
        return Ok(tables);
    }

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::config(format!("Failed to read data dir: {e}")))?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DataFormat::from_extension)
        else {
            continue;
        };

        let relative = path.strip_prefix(dir).unwrap_or(path).with_extension("");
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let value = format.parse(&content, path)?;
        insert_table(&mut tables, &segments, value, path)?;
        debug!(table = %segments.join("."), "loaded data table");
    }

    Ok(tables)
}

fn insert_table(tables: &mut Map, segments: &[String], value: Value, path: &Path) -> Result<()> {
    let conflict = || {
        CoreError::config(format!(
            "Data table `{}` from {} is defined more than once",
            segments.join("."),
            path.display()
        ))
    };

    let Some((last, parents)) = segments.split_last() else {
        return Err(conflict());
    };

    let mut current = tables;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Map(Map::new()));
        current = match slot {
            Value::Map(map) => map,
            _ => return Err(conflict()),
        };
    }

    if current.contains_key(last) {
        return Err(conflict());
    }
    current.insert(last.clone(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_load_tables_of_every_format() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("navigation.yml"),
            "- label: Home\n  url: /\n- label: Blog\n  url: /blog/\n",
        )
        .unwrap();
        fs::write(dir.path().join("authors.toml"), "[ada]\nname = \"Ada\"\n").unwrap();
        fs::write(dir.path().join("stats.json"), r#"{"visits": 3}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let tables = load_data_tables(dir.path()).unwrap();

        assert_eq!(tables.len(), 3);
        let nav = tables["navigation"].as_list().unwrap();
        assert_eq!(nav[1].get("url"), Some(&Value::from("/blog/")));
        assert_eq!(
            tables["authors"].get_path(["ada", "name"]),
            Some(&Value::from("Ada"))
        );
        assert_eq!(tables["stats"].get("visits"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_nested_directories_become_nested_maps() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("menus")).unwrap();
        fs::write(dir.path().join("menus/footer.yml"), "- label: Legal\n").unwrap();

        let tables = load_data_tables(dir.path()).unwrap();
        assert!(tables["menus"].get("footer").is_some());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let tables = load_data_tables(Path::new("/nonexistent/data")).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_malformed_table_is_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let err = load_data_tables(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_same_table_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nav.json"), "[]").unwrap();
        fs::write(dir.path().join("nav.yml"), "[]").unwrap();

        let err = load_data_tables(dir.path()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
