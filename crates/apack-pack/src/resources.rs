//! Resource manager: the pack's `resources/` area.
//!
//! Achievements reference icons and other assets by paths relative to the
//! resource area. The manager answers existence checks, loads bytes, and
//! acts as the asset [`ResolveContext`] during resolution.

use std::io::{Cursor, Read};
use std::sync::Arc;

use apack_core::{AssetPath, ReferenceKind, ResolveContext, ResolveError, ResolvedTarget};

use crate::content::ContentReader;
use crate::error::{ContentError, ResourceError};

/// Read access scoped to a pack's resource directory.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    reader: Arc<dyn ContentReader>,
}

fn read_error(path: &AssetPath, err: ContentError) -> ResourceError {
    match err {
        ContentError::NotFound { .. } => ResourceError::Missing {
            path: path.to_string(),
            owner: String::new(),
        },
        other => ResourceError::Read {
            path: path.to_string(),
            reason: other.to_string(),
        },
    }
}

impl ResourceManager {
    /// Scope `pack_reader` to `directory`.
    pub fn new(pack_reader: &dyn ContentReader, directory: &str) -> Self {
        Self {
            reader: pack_reader.sub_reader(directory),
        }
    }

    /// Whether a resource exists.
    pub fn resource_exists(&self, path: &str) -> bool {
        self.reader.file_exists(AssetPath::new(path).as_str())
    }

    /// Load a resource.
    pub fn load_bytes(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let asset = AssetPath::new(path);
        self.reader
            .read_bytes(asset.as_str())
            .map_err(|e| read_error(&asset, e))
    }

    /// Load a resource without blocking the runtime.
    pub async fn load_bytes_async(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let asset = AssetPath::new(path);
        self.reader
            .read_bytes_async(asset.as_str())
            .await
            .map_err(|e| read_error(&asset, e))
    }

    /// Open a resource as a byte stream.
    pub fn open_stream(&self, path: &str) -> Result<Box<dyn Read + Send>, ResourceError> {
        Ok(Box::new(Cursor::new(self.load_bytes(path)?)))
    }

    /// Human-readable location of a resource.
    pub fn path_representation(&self, path: &str) -> String {
        self.reader.path_representation(AssetPath::new(path).as_str())
    }
}

impl ResolveContext for ResourceManager {
    fn can_resolve(&self, kind: ReferenceKind) -> bool {
        kind == ReferenceKind::Asset
    }

    fn resolve(&self, kind: ReferenceKind, reference_id: &str) -> Result<ResolvedTarget, ResolveError> {
        if kind != ReferenceKind::Asset {
            return Err(ResolveError::NoContext {
                kind,
                reference_id: reference_id.to_string(),
            });
        }
        let asset = AssetPath::new(reference_id);
        if self.reader.file_exists(asset.as_str()) {
            Ok(ResolvedTarget::Asset(asset))
        } else {
            Err(ResolveError::MissingAsset {
                reference_id: reference_id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryReader;
    use apack_core::ResolvableReference;

    fn manager() -> ResourceManager {
        let reader = MemoryReader::new()
            .with_file("resources/icons/a.png", vec![7u8; 4])
            .with_file("manifest.json", "{}");
        ResourceManager::new(&reader, "resources")
    }

    #[test]
    fn scoped_to_resource_directory() {
        let resources = manager();
        assert!(resources.resource_exists("icons/a.png"));
        assert!(resources.resource_exists("./icons/a.png"));
        assert!(!resources.resource_exists("manifest.json"));
    }

    #[test]
    fn load_and_stream() {
        let resources = manager();
        assert_eq!(resources.load_bytes("icons/a.png").unwrap().len(), 4);
        let mut stream = resources.open_stream("icons/a.png").unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![7u8; 4]);
        assert!(matches!(
            resources.load_bytes("icons/b.png"),
            Err(ResourceError::Missing { .. })
        ));
    }

    #[test]
    fn resolves_asset_references() {
        let resources = manager();
        let found = ResolvableReference::asset("icons/a.png");
        let target = resources.resolve(found.kind(), found.reference_id()).unwrap();
        found.bind(target).unwrap();
        assert_eq!(found.resolved_asset().unwrap().as_str(), "icons/a.png");

        assert!(matches!(
            resources.resolve(ReferenceKind::Asset, "icons/missing.png"),
            Err(ResolveError::MissingAsset { .. })
        ));
        assert!(!resources.can_resolve(ReferenceKind::Hierarchy));
    }

    #[tokio::test]
    async fn async_load() {
        assert_eq!(manager().load_bytes_async("icons/a.png").await.unwrap(), vec![7u8; 4]);
    }
}
