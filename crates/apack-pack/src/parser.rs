//! Shared YAML/JSON parsing.
//!
//! Every data file and the loader configuration are decoded through these
//! helpers so errors consistently carry the file path and format.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::FormatError;
use crate::model::DataFile;

/// Data file encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
}

impl DataFormat {
    /// Pick a format from a file name's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, extension) = path.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }
}

/// Decode JSON bytes into a strongly-typed value.
pub fn from_json_slice<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, FormatError> {
    serde_json::from_slice(bytes).map_err(|e| FormatError::Parse {
        path: path.to_string(),
        format: DataFormat::Json.label(),
        reason: e.to_string(),
    })
}

/// Decode YAML bytes into a strongly-typed value.
pub fn from_yaml_slice<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, FormatError> {
    serde_yaml::from_slice(bytes).map_err(|e| FormatError::Parse {
        path: path.to_string(),
        format: DataFormat::Yaml.label(),
        reason: e.to_string(),
    })
}

/// Decode bytes in whichever format the path's extension names.
pub fn from_slice<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, FormatError> {
    match DataFormat::from_path(path) {
        Some(DataFormat::Json) => from_json_slice(path, bytes),
        Some(DataFormat::Yaml) => from_yaml_slice(path, bytes),
        None => Err(FormatError::UnsupportedFile {
            path: path.to_string(),
        }),
    }
}

/// Parse one pack data file.
pub fn parse_data_file(path: &str, bytes: &[u8]) -> Result<DataFile, FormatError> {
    from_slice(path, bytes)
}

/// Load a JSON or YAML file from disk into a strongly-typed struct.
pub fn load_typed<T: DeserializeOwned>(path: &Path) -> Result<T, FormatError> {
    let display = path.display().to_string();
    let format = DataFormat::from_path(&display).ok_or_else(|| FormatError::UnsupportedFile {
        path: display.clone(),
    })?;
    let bytes = std::fs::read(path).map_err(|e| FormatError::Parse {
        path: display.clone(),
        format: format.label(),
        reason: e.to_string(),
    })?;
    from_slice(&display, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
categories:
  - id: events
    name: Events
    collections:
      - id: daily
        name: { en: Daily, de: Täglich }
";

    #[test]
    fn format_from_extension() {
        assert_eq!(DataFormat::from_path("a/b.JSON"), Some(DataFormat::Json));
        assert_eq!(DataFormat::from_path("b.yml"), Some(DataFormat::Yaml));
        assert_eq!(DataFormat::from_path("b.toml"), None);
        assert_eq!(DataFormat::from_path("noext"), None);
    }

    #[test]
    fn parses_yaml_data_file() {
        let file = parse_data_file("data/events.yaml", YAML.as_bytes()).unwrap();
        assert_eq!(file.categories.len(), 1);
        assert_eq!(file.categories[0].collections[0].name.get("de"), Some("Täglich"));
    }

    #[test]
    fn parse_errors_carry_path_and_format() {
        let err = parse_data_file("data/broken.json", b"{ \"categories\": [").unwrap_err();
        match err {
            FormatError::Parse { path, format, .. } => {
                assert_eq!(path, "data/broken.json");
                assert_eq!(format, "JSON");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(parse_data_file("x.json", br#"{"categorys": []}"#).is_err());
    }

    #[test]
    fn unsupported_extension() {
        assert!(matches!(
            parse_data_file("notes.txt", b""),
            Err(FormatError::UnsupportedFile { .. })
        ));
    }

    #[test]
    fn load_typed_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.yaml");
        std::fs::write(&path, "resource_dir: assets\n").unwrap();
        let options: crate::options::PackOptions = load_typed(&path).unwrap();
        assert_eq!(options.resource_dir, "assets");

        assert!(load_typed::<crate::options::PackOptions>(&dir.path().join("missing.json")).is_err());
    }
}
