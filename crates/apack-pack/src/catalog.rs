//! # Catalog
//!
//! The set of registered packs and the state they share: one hierarchy, one
//! condition graph and one hierarchy resolve context. Because every pack
//! attaches into the same hierarchy, prerequisites and achievement actions
//! may reference objects of other loaded packs by full name.
//!
//! Registration reads and validates the manifest only. Loading happens when
//! the returned [`Pack`] is enabled.

use std::sync::Arc;

use apack_core::{identity, Hierarchy, HierarchyResolveContext, NodeId};
use apack_fulfill::{ActionRegistry, SharedGraph};
use parking_lot::RwLock;
use tracing::info;

use crate::content::ContentReader;
use crate::error::{ContentError, ManifestError, PackError, PackResult};
use crate::manifest::Manifest;
use crate::model::ContentNode;
use crate::options::PackOptions;
use crate::pack::Pack;
use crate::pipeline::PipelineContext;
use crate::progress::{self, AchievementStatus};
use crate::properties::{MemoryPropertyStore, PropertyStore};
use crate::resources::ResourceManager;

/// State shared by every pack of a catalog.
#[derive(Debug)]
pub struct CatalogState {
    /// Every attached object.
    pub hierarchy: Arc<RwLock<Hierarchy<ContentNode>>>,
    /// Every condition.
    pub graph: SharedGraph,
    /// Registered pack roots.
    pub resolver: Arc<HierarchyResolveContext<ContentNode>>,
    /// Persisted object properties.
    pub properties: Arc<dyn PropertyStore>,
    /// Known action kinds.
    pub registry: ActionRegistry,
    /// Loader configuration.
    pub options: PackOptions,
}

impl CatalogState {
    /// Fresh shared state.
    pub fn new(
        options: PackOptions,
        registry: ActionRegistry,
        properties: Arc<dyn PropertyStore>,
    ) -> Self {
        let hierarchy = Arc::new(RwLock::new(Hierarchy::new()));
        Self {
            resolver: Arc::new(HierarchyResolveContext::new(Arc::clone(&hierarchy))),
            hierarchy,
            graph: SharedGraph::new(),
            properties,
            registry,
            options,
        }
    }
}

/// Registered packs over shared state.
#[derive(Debug)]
pub struct Catalog {
    state: Arc<CatalogState>,
    packs: RwLock<Vec<Arc<Pack>>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(
            PackOptions::default(),
            ActionRegistry::new(),
            Arc::new(MemoryPropertyStore::new()),
        )
    }
}

impl Catalog {
    /// An empty catalog.
    pub fn new(
        options: PackOptions,
        registry: ActionRegistry,
        properties: Arc<dyn PropertyStore>,
    ) -> Self {
        Self {
            state: Arc::new(CatalogState::new(options, registry, properties)),
            packs: RwLock::new(Vec::new()),
        }
    }

    /// Shared state.
    pub fn state(&self) -> &Arc<CatalogState> {
        &self.state
    }

    /// Read and validate the manifest behind `reader`, then register the
    /// pack. The pack starts `Unloaded`.
    pub fn register(&self, reader: Arc<dyn ContentReader>) -> PackResult<Arc<Pack>> {
        let manifest_file = &self.state.options.manifest_file;
        let location = reader.path_representation(manifest_file);
        let bytes = reader.read_bytes(manifest_file).map_err(|e| match e {
            ContentError::NotFound { .. } => PackError::from(ManifestError::Missing {
                path: location.clone(),
            }),
            other => other.into(),
        })?;
        let manifest = Manifest::parse(&location, &bytes)?;

        let mut packs = self.packs.write();
        if let Some(existing) = packs
            .iter()
            .find(|p| identity::namespaces_overlap(p.namespace(), manifest.namespace()))
        {
            return Err(PackError::NamespaceTaken {
                namespace: manifest.namespace().to_string(),
                existing: existing.namespace().to_string(),
            });
        }

        let resources = ResourceManager::new(reader.as_ref(), &self.state.options.resource_dir);
        let pack = Arc::new(Pack::new(PipelineContext {
            state: Arc::clone(&self.state),
            manifest: Arc::new(manifest),
            reader,
            resources,
        }));
        info!(
            pack = %pack.namespace(),
            version = %pack.manifest().version(),
            author = %pack.manifest().author(),
            "pack registered"
        );
        packs.push(Arc::clone(&pack));
        Ok(pack)
    }

    /// Registered packs in registration order.
    pub fn packs(&self) -> Vec<Arc<Pack>> {
        self.packs.read().clone()
    }

    /// The pack registered under exactly `namespace`.
    pub fn pack(&self, namespace: &str) -> Option<Arc<Pack>> {
        self.packs
            .read()
            .iter()
            .find(|p| p.namespace() == namespace)
            .cloned()
    }

    /// Unload and forget a pack. Returns whether it was registered.
    pub async fn unregister(&self, namespace: &str) -> PackResult<bool> {
        let Some(pack) = self.pack(namespace) else {
            return Ok(false);
        };
        pack.disable(true).await?;
        self.packs.write().retain(|p| !Arc::ptr_eq(p, &pack));
        info!(pack = %namespace, "pack unregistered");
        Ok(true)
    }

    /// Resolve a full name across every loaded pack.
    pub fn resolve(&self, full_name: &str) -> PackResult<NodeId> {
        Ok(self.state.resolver.resolve_node(full_name)?)
    }

    /// Full name of a live node.
    pub fn full_name(&self, node: NodeId) -> Option<String> {
        self.state.hierarchy.read().full_name(node)
    }

    /// Progress of any loaded achievement.
    pub fn achievement_status(&self, full_name: &str) -> PackResult<AchievementStatus> {
        let node = self.resolve(full_name)?;
        let hierarchy = self.state.hierarchy.read();
        let graph = self.state.graph.read();
        progress::achievement_status(&hierarchy, &graph, node)
    }
}
