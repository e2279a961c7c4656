//! Loader configuration.

use serde::{Deserialize, Serialize};

/// Where the loader looks for pack content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Extensions (without the dot) treated as data files.
    pub data_extensions: Vec<String>,
    /// Directory holding resources, relative to the pack root.
    pub resource_dir: String,
    /// Manifest file name at the pack root.
    pub manifest_file: String,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            data_extensions: vec!["json".into(), "yaml".into(), "yml".into()],
            resource_dir: "resources".into(),
            manifest_file: "manifest.json".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let options: PackOptions = serde_json::from_str(r#"{"resource_dir": "assets"}"#).unwrap();
        assert_eq!(options.resource_dir, "assets");
        assert_eq!(options.manifest_file, "manifest.json");
        assert_eq!(options.data_extensions.len(), 3);
    }
}
