//! Loading a pack directory for a single command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use apack_fulfill::ActionRegistry;
use apack_pack::{parser, Catalog, DirectoryReader, MemoryPropertyStore, Pack, PackOptions};
use apack_state::PackState;
use serde::Deserialize;
use tracing::info;

/// Contents of the optional `--config` file (JSON or YAML).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Loader options.
    #[serde(flatten)]
    pub pack: PackOptions,
    /// Extra action discriminators accepted in data files.
    pub action_kinds: Vec<String>,
}

impl CliConfig {
    /// Read the config file, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => parser::load_typed(path)
                .with_context(|| format!("failed to read config {}", path.display())),
            None => Ok(Self::default()),
        }
    }

    fn registry(&self) -> anyhow::Result<ActionRegistry> {
        let mut registry = ActionRegistry::new();
        for kind in &self.action_kinds {
            registry
                .register(kind.as_str())
                .with_context(|| format!("invalid action kind in config: {kind}"))?;
        }
        Ok(registry)
    }
}

/// A catalog holding exactly one settled pack.
#[derive(Debug)]
pub struct LoadedPack {
    /// The catalog the pack was loaded into.
    pub catalog: Catalog,
    /// The pack itself.
    pub pack: Arc<Pack>,
    /// State the load settled in.
    pub state: PackState,
}

/// Register the pack in `dir`, enable it and wait for the load to settle.
pub async fn load_directory(dir: &Path, config: &CliConfig) -> anyhow::Result<LoadedPack> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let catalog = Catalog::new(
        config.pack.clone(),
        config.registry()?,
        Arc::new(MemoryPropertyStore::new()),
    );
    let pack = catalog
        .register(Arc::new(DirectoryReader::new(dir)))
        .with_context(|| format!("cannot register pack at {}", dir.display()))?;
    pack.enable()?;
    let state = pack.settled().await;
    info!(pack = %pack.namespace(), state = %state, "pack settled");
    Ok(LoadedPack {
        catalog,
        pack,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flattens_pack_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apack.yaml");
        std::fs::write(&path, "resource_dir: assets\naction_kinds: [festival]\n").unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.pack.resource_dir, "assets");
        assert_eq!(config.pack.manifest_file, "manifest.json");
        assert_eq!(config.action_kinds, vec!["festival"]);
        assert!(config.registry().unwrap().is_known("festival"));
    }

    #[test]
    fn builtin_kinds_cannot_be_redeclared() {
        let config = CliConfig {
            action_kinds: vec!["map".into()],
            ..CliConfig::default()
        };
        assert!(config.registry().is_err());
    }

    #[tokio::test]
    async fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_directory(&dir.path().join("nope"), &CliConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
