//! # Load Pipeline
//!
//! The five load steps as a typestate chain:
//!
//! ```text
//! LoadPipeline<Start> ─discover→ <Discovered> ─validate→ <Validated>
//!   ─attach→ <Attached> ─resolve→ <Resolved> ─load_resources→ <Complete>
//! ```
//!
//! Each step consumes the pipeline, so a step can never run twice or out of
//! order. Steps 1 to 4 are fatal on failure and return a
//! [`PipelineFailure`] carrying whatever content was already attached so
//! the caller can tear it down. Step 5 never fails: resource errors are
//! aggregated in the result.
//!
//! The pipeline does not check for cancellation itself; the pack runtime
//! checks its token between steps and calls [`teardown`] on the content of
//! an abandoned pipeline.

use std::sync::Arc;

use apack_core::{
    identity, AssetPath, Hierarchy, HierarchyError, InternalError, NodeId, ReferenceKind,
    ResolvableReference, ResolveContext, ResolveContextCollection, ResolveError, ResolvedTarget,
};
use apack_fulfill::{ConditionGraph, ConditionId, FulfillResult};
use apack_state::LoadStep;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::catalog::CatalogState;
use crate::content::ContentReader;
use crate::error::{FormatError, PackError, ResourceError};
use crate::manifest::Manifest;
use crate::model::{AchievementNode, ContentNode, DataFile, GroupNode, ObjectiveNode, PackNode};
use crate::parser;
use crate::properties::{load_record, AchievementProperties};
use crate::resources::ResourceManager;
use crate::validation::{self, ConditionTree, ValidatedCategory};

// ---------------------------------------------------------------------------
// Attached content
// ---------------------------------------------------------------------------

/// An achievement placed in the hierarchy.
#[derive(Debug, Clone)]
pub struct AttachedAchievement {
    /// Hierarchy node.
    pub node: NodeId,
    /// Full name.
    pub full_name: String,
    /// Root condition of each objective, in order.
    pub objectives: Vec<ConditionId>,
    /// Icon reference, bound in the resource step.
    pub icon: Option<Arc<ResolvableReference>>,
}

/// Everything a pack added to the shared state.
#[derive(Debug, Clone)]
pub struct AttachedContent {
    /// Pack root node.
    pub root: NodeId,
    /// Achievements in load order.
    pub achievements: Vec<AttachedAchievement>,
    /// Root of every condition tree created for this pack.
    pub conditions: Vec<ConditionId>,
    /// Whether the root is registered with the resolver.
    pub registered: bool,
}

impl AttachedContent {
    fn new(root: NodeId) -> Self {
        Self {
            root,
            achievements: Vec::new(),
            conditions: Vec::new(),
            registered: false,
        }
    }

    /// Look up an achievement by node.
    pub fn achievement(&self, node: NodeId) -> Option<&AttachedAchievement> {
        self.achievements.iter().find(|a| a.node == node)
    }
}

/// Remove everything `content` added to the shared state.
///
/// Order: unregister the root, remove condition trees, dispose the
/// hierarchy subtree depth-first. Observer registrations on conditions and
/// references are cleared along the way.
pub fn teardown(state: &CatalogState, content: AttachedContent) {
    if content.registered {
        state.resolver.remove(content.root);
    }
    {
        let mut graph = state.graph.write();
        for condition in &content.conditions {
            if let Err(e) = graph.remove_tree(*condition) {
                debug!(condition = %condition, error = %e, "condition already removed");
            }
        }
    }
    let disposed = state.hierarchy.write().dispose(content.root);
    for (_, node) in &disposed {
        for reference in node.payload().references() {
            reference.clear_observers();
        }
    }
    debug!(nodes = disposed.len(), conditions = content.conditions.len(), "content torn down");
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// A fatal pipeline failure.
#[derive(Debug)]
pub struct PipelineFailure {
    /// Step that failed.
    pub step: LoadStep,
    /// The first error.
    pub error: PackError,
    /// Every data error, when the failure is about data.
    pub data_errors: Vec<FormatError>,
    /// Content attached before the failure; must be torn down.
    pub attached: Option<AttachedContent>,
}

impl PipelineFailure {
    fn new(step: LoadStep, error: impl Into<PackError>) -> Self {
        Self {
            step,
            error: error.into(),
            data_errors: Vec::new(),
            attached: None,
        }
    }

    fn data(step: LoadStep, errors: Vec<FormatError>) -> Self {
        let error = errors
            .first()
            .cloned()
            .map(PackError::from)
            .unwrap_or_else(|| InternalError::new("data step failed without errors").into());
        Self {
            step,
            error,
            data_errors: errors,
            attached: None,
        }
    }

    fn with_content(mut self, content: AttachedContent) -> Self {
        self.attached = Some(content);
        self
    }
}

/// Result of a fatal step.
pub type StepResult<T> = Result<T, Box<PipelineFailure>>;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Nothing done yet.
#[derive(Debug)]
pub struct Start;

/// Data files parsed.
#[derive(Debug)]
pub struct Discovered {
    files: Vec<(String, DataFile)>,
}

/// Data validated.
#[derive(Debug)]
pub struct Validated {
    categories: Vec<ValidatedCategory>,
}

/// Content attached and registered.
#[derive(Debug)]
pub struct Attached {
    content: AttachedContent,
}

/// References bound.
#[derive(Debug)]
pub struct Resolved {
    content: AttachedContent,
}

/// Resources loaded; the pack is usable.
#[derive(Debug)]
pub struct Complete {
    content: AttachedContent,
    resource_errors: Vec<ResourceError>,
}

/// Everything the steps read from.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Shared hierarchy, graph and resolver.
    pub state: Arc<CatalogState>,
    /// The pack manifest.
    pub manifest: Arc<Manifest>,
    /// Reader over the pack archive.
    pub reader: Arc<dyn ContentReader>,
    /// Resource area.
    pub resources: ResourceManager,
}

/// A load pipeline in stage `S`.
#[derive(Debug)]
pub struct LoadPipeline<S> {
    ctx: PipelineContext,
    stage: S,
}

impl<S> LoadPipeline<S> {
    fn namespace(&self) -> &str {
        self.ctx.manifest.namespace()
    }
}

impl LoadPipeline<Start> {
    /// A pipeline that has not run any step.
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx, stage: Start }
    }

    /// Step 1: find and parse every data file outside the manifest and the
    /// resource area. Parse errors are collected for all files before
    /// failing.
    pub fn discover(self) -> StepResult<LoadPipeline<Discovered>> {
        let options = &self.ctx.state.options;
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for extension in &options.data_extensions {
            let entries = self
                .ctx
                .reader
                .enumerate_by_extension(extension)
                .map_err(|e| Box::new(PipelineFailure::new(LoadStep::Discover, e)))?;
            for entry in entries {
                let in_resources = entry
                    .name
                    .strip_prefix(options.resource_dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
                if entry.name == options.manifest_file || in_resources {
                    continue;
                }
                debug!(pack = %self.namespace(), file = %entry.name, "parsing data file");
                match parser::parse_data_file(&entry.name, &entry.content) {
                    Ok(file) => files.push((entry.name, file)),
                    Err(e) => errors.push(e),
                }
            }
        }
        if !errors.is_empty() {
            return Err(Box::new(PipelineFailure::data(LoadStep::Discover, errors)));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(LoadPipeline {
            ctx: self.ctx,
            stage: Discovered { files },
        })
    }
}

/// Run a synchronous step on the blocking pool so filesystem enumeration
/// and parsing stay off the runtime's worker threads.
pub async fn run_blocking<T, F>(step: LoadStep, run: F) -> StepResult<T>
where
    F: FnOnce() -> StepResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(run).await {
        Ok(result) => result,
        Err(e) => Err(Box::new(PipelineFailure::new(
            step,
            InternalError::new(format!("{step} task failed: {e}")),
        ))),
    }
}

impl LoadPipeline<Discovered> {
    /// Number of parsed data files.
    pub fn file_count(&self) -> usize {
        self.stage.files.len()
    }

    /// Step 2: validate every parsed unit.
    pub fn validate(self) -> StepResult<LoadPipeline<Validated>> {
        let categories =
            validation::validate_files(self.namespace(), &self.ctx.state.registry, &self.stage.files)
                .map_err(|errors| Box::new(PipelineFailure::data(LoadStep::Validate, errors)))?;
        Ok(LoadPipeline {
            ctx: self.ctx,
            stage: Validated { categories },
        })
    }
}

/// Add a condition tree bottom-up. A failure removes the partial tree.
fn add_tree(graph: &mut ConditionGraph, tree: ConditionTree) -> FulfillResult<ConditionId> {
    let and = tree.and.map(|t| add_tree(graph, *t)).transpose()?;
    let or = match tree.or.map(|t| add_tree(graph, *t)).transpose() {
        Ok(or) => or,
        Err(e) => {
            discard_trees(graph, [and]);
            return Err(e);
        }
    };
    graph.add_condition(tree.action, and, or).map_err(|e| {
        discard_trees(graph, [and, or]);
        e
    })
}

fn discard_trees<const N: usize>(graph: &mut ConditionGraph, roots: [Option<ConditionId>; N]) {
    for root in roots.into_iter().flatten() {
        if let Err(e) = graph.remove_tree(root) {
            debug!(condition = %root, error = %e, "cannot discard partial condition tree");
        }
    }
}

fn attach_error(object: String, source: HierarchyError) -> PackError {
    FormatError::Attach { object, source }.into()
}

impl LoadPipeline<Validated> {
    /// Number of validated categories.
    pub fn category_count(&self) -> usize {
        self.stage.categories.len()
    }

    /// Step 3: build each category as a detached subtree, attach it under
    /// the pack root, register the root and apply persisted properties.
    pub fn attach(self) -> StepResult<LoadPipeline<Attached>> {
        let ctx = self.ctx;
        let state = Arc::clone(&ctx.state);
        let namespace = ctx.manifest.namespace().to_string();

        let root = state
            .hierarchy
            .write()
            .create_root(
                namespace.as_str(),
                ContentNode::Pack(PackNode {
                    name: ctx.manifest.name().clone(),
                }),
            )
            .map_err(|e| Box::new(PipelineFailure::new(LoadStep::Attach, attach_error(namespace.clone(), e))))?;
        let mut content = AttachedContent::new(root);

        for category in self.stage.categories {
            if let Err(error) = attach_category(&state, &namespace, &mut content, category) {
                return Err(Box::new(
                    PipelineFailure::new(LoadStep::Attach, error).with_content(content),
                ));
            }
        }

        if let Err(e) = state.resolver.add(root) {
            return Err(Box::new(
                PipelineFailure::new(LoadStep::Attach, e).with_content(content),
            ));
        }
        content.registered = true;

        apply_properties(&state, &content);
        debug!(
            pack = %namespace,
            achievements = content.achievements.len(),
            conditions = content.conditions.len(),
            "content attached"
        );
        Ok(LoadPipeline {
            ctx,
            stage: Attached { content },
        })
    }
}

fn attach_category(
    state: &CatalogState,
    namespace: &str,
    content: &mut AttachedContent,
    category: ValidatedCategory,
) -> Result<(), PackError> {
    // Conditions first, without the hierarchy lock.
    let mut trees = Vec::new();
    {
        let mut graph = state.graph.write();
        for collection in &category.collections {
            for achievement in &collection.achievements {
                let mut ids = Vec::with_capacity(achievement.objectives.len());
                for objective in &achievement.objectives {
                    let id = add_tree(&mut graph, objective.condition.clone())?;
                    content.conditions.push(id);
                    ids.push(id);
                }
                trees.push(ids);
            }
        }
    }

    let category_full = identity::join(namespace, &category.id);
    let mut hierarchy = state.hierarchy.write();
    let detached = hierarchy
        .create_root(
            category.id.as_str(),
            ContentNode::Category(GroupNode {
                name: category.name.clone(),
            }),
        )
        .map_err(|e| attach_error(category_full.clone(), e))?;

    let built = build_category(&mut hierarchy, detached, &category_full, category, trees);
    let achievements = match built {
        Ok(achievements) => achievements,
        Err(e) => {
            hierarchy.dispose(detached);
            return Err(e);
        }
    };
    if let Err(e) = hierarchy.attach(content.root, detached) {
        hierarchy.dispose(detached);
        return Err(attach_error(category_full, e));
    }
    content.achievements.extend(achievements);
    Ok(())
}

fn build_category(
    hierarchy: &mut Hierarchy<ContentNode>,
    detached: NodeId,
    category_full: &str,
    category: ValidatedCategory,
    trees: Vec<Vec<ConditionId>>,
) -> Result<Vec<AttachedAchievement>, PackError> {
    let mut trees = trees.into_iter();
    let mut attached = Vec::new();
    for collection in category.collections {
        let collection_full = identity::join(category_full, &collection.id);
        let collection_node = hierarchy
            .create_child(
                detached,
                collection.id.as_str(),
                ContentNode::Collection(GroupNode {
                    name: collection.name,
                }),
            )
            .map_err(|e| attach_error(collection_full.clone(), e))?;

        for achievement in collection.achievements {
            let full_name = identity::join(&collection_full, &achievement.id);
            let conditions = trees.next().unwrap_or_default();
            let icon = achievement
                .icon
                .as_deref()
                .map(|path| Arc::new(ResolvableReference::asset(path)));
            let node = hierarchy
                .create_child(
                    collection_node,
                    achievement.id.as_str(),
                    ContentNode::Achievement(AchievementNode {
                        name: achievement.name,
                        description: achievement.description,
                        icon: icon.clone(),
                        icon_data: None,
                        prerequisites: achievement
                            .prerequisites
                            .into_iter()
                            .map(|p| Arc::new(ResolvableReference::node(p)))
                            .collect(),
                        tiers: achievement.tiers,
                        tracked: false,
                    }),
                )
                .map_err(|e| attach_error(full_name.clone(), e))?;

            for (objective, condition) in achievement.objectives.into_iter().zip(&conditions) {
                hierarchy
                    .create_child(
                        node,
                        objective.id.as_str(),
                        ContentNode::Objective(ObjectiveNode {
                            name: objective.name,
                            description: objective.description,
                            condition: *condition,
                        }),
                    )
                    .map_err(|e| attach_error(identity::join(&full_name, &objective.id), e))?;
            }
            attached.push(AttachedAchievement {
                node,
                full_name,
                objectives: conditions,
                icon,
            });
        }
    }
    Ok(attached)
}

fn apply_properties(state: &CatalogState, content: &AttachedContent) {
    let loaded: Vec<_> = content
        .achievements
        .iter()
        .filter_map(|a| {
            match load_record::<AchievementProperties>(state.properties.as_ref(), &a.full_name) {
                Ok(props) => Some((a.node, props.tracked)),
                Err(e) => {
                    warn!(achievement = %a.full_name, error = %e, "ignoring stored properties");
                    None
                }
            }
        })
        .collect();
    let mut hierarchy = state.hierarchy.write();
    for (node, tracked) in loaded {
        if let Some(ach) = hierarchy.payload_mut(node).and_then(ContentNode::as_achievement_mut) {
            ach.tracked = tracked;
        }
    }
}

impl LoadPipeline<Attached> {
    /// The attached content.
    pub fn content(&self) -> &AttachedContent {
        &self.stage.content
    }

    /// Give up the pipeline, keeping its content for teardown.
    pub fn into_content(self) -> AttachedContent {
        self.stage.content
    }

    /// Step 4: bind prerequisites and achievement actions.
    ///
    /// References are collected under the read locks, then bound with no
    /// lock held so observers may query the hierarchy.
    pub fn resolve(self) -> StepResult<LoadPipeline<Resolved>> {
        let state = Arc::clone(&self.ctx.state);
        let content = self.stage.content;

        let fail = |error: PackError, content: AttachedContent| {
            Box::new(PipelineFailure::new(LoadStep::Resolve, error).with_content(content))
        };

        for dependency in self.ctx.manifest.dependencies() {
            if state.resolver.try_resolve(dependency).is_none() {
                let error = ResolveError::MissingDependency {
                    namespace: dependency.clone(),
                };
                return Err(fail(error.into(), content));
            }
        }

        let references = collect_references(&state, &content);
        let contexts = ResolveContextCollection::new()
            .with(Arc::clone(&state.resolver) as Arc<dyn ResolveContext>)
            .with(Arc::new(self.ctx.resources.clone()));

        let mut first: Option<PackError> = None;
        for (owner, reference) in &references {
            let outcome = contexts
                .resolve_reference(reference)
                .map_err(PackError::from)
                .and_then(|()| check_target(&state, reference));
            if let Err(e) = outcome {
                debug!(pack = %self.ctx.manifest.namespace(), owner = %owner, error = %e, "unresolved reference");
                first.get_or_insert(e);
            }
        }
        if let Some(error) = first {
            return Err(fail(error, content));
        }

        debug!(pack = %self.ctx.manifest.namespace(), references = references.len(), "references resolved");
        Ok(LoadPipeline {
            ctx: self.ctx,
            stage: Resolved { content },
        })
    }
}

fn collect_references(
    state: &CatalogState,
    content: &AttachedContent,
) -> Vec<(String, Arc<ResolvableReference>)> {
    let mut out = Vec::new();
    {
        let hierarchy = state.hierarchy.read();
        for ach in &content.achievements {
            if let Some(payload) = hierarchy.payload(ach.node).and_then(ContentNode::as_achievement) {
                out.extend(
                    payload
                        .prerequisites
                        .iter()
                        .map(|r| (ach.full_name.clone(), Arc::clone(r))),
                );
            }
        }
    }
    let graph = state.graph.read();
    for ach in &content.achievements {
        for condition in &ach.objectives {
            out.extend(
                graph
                    .references(*condition)
                    .into_iter()
                    .map(|r| (ach.full_name.clone(), r)),
            );
        }
    }
    out
}

/// Hierarchy references must land on achievements.
fn check_target(state: &CatalogState, reference: &ResolvableReference) -> Result<(), PackError> {
    if reference.kind() != ReferenceKind::Hierarchy {
        return Ok(());
    }
    let hierarchy = state.hierarchy.read();
    let is_achievement = reference
        .resolved_node()
        .and_then(|node| hierarchy.payload(node))
        .is_some_and(|payload| payload.as_achievement().is_some());
    if is_achievement {
        Ok(())
    } else {
        Err(PackError::NotAnAchievement(reference.reference_id().to_string()))
    }
}

impl LoadPipeline<Resolved> {
    /// Give up the pipeline, keeping its content for teardown.
    pub fn into_content(self) -> AttachedContent {
        self.stage.content
    }

    /// Step 5: load every icon concurrently. Failures are aggregated.
    pub async fn load_resources(self) -> LoadPipeline<Complete> {
        let mut tasks = JoinSet::new();
        for ach in &self.stage.content.achievements {
            let Some(icon) = ach.icon.clone() else { continue };
            let resources = self.ctx.resources.clone();
            let node = ach.node;
            let owner = ach.full_name.clone();
            tasks.spawn(async move {
                let path = AssetPath::new(icon.reference_id());
                let result = resources
                    .load_bytes_async(path.as_str())
                    .await
                    .map_err(|e| match e {
                        ResourceError::Missing { path, .. } => ResourceError::Missing {
                            path,
                            owner: owner.clone(),
                        },
                        other => other,
                    });
                (node, owner, icon, path, result)
            });
        }

        let mut resource_errors = Vec::new();
        let mut loaded = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((node, _, icon, path, Ok(bytes))) => {
                    if let Err(e) = icon.bind(ResolvedTarget::Asset(path)) {
                        debug!(error = %e, "icon already bound");
                    }
                    loaded.push((node, Arc::<[u8]>::from(bytes)));
                }
                Ok((_, owner, _, _, Err(e))) => {
                    warn!(pack = %self.ctx.manifest.namespace(), achievement = %owner, error = %e, "resource failed to load");
                    resource_errors.push(e);
                }
                Err(e) => {
                    warn!(pack = %self.ctx.manifest.namespace(), error = %e, "resource task failed");
                    resource_errors.push(ResourceError::Read {
                        path: String::new(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        {
            let mut hierarchy = self.ctx.state.hierarchy.write();
            for (node, bytes) in loaded {
                if let Some(ach) = hierarchy.payload_mut(node).and_then(ContentNode::as_achievement_mut) {
                    ach.icon_data = Some(bytes);
                }
            }
        }

        LoadPipeline {
            ctx: self.ctx,
            stage: Complete {
                content: self.stage.content,
                resource_errors,
            },
        }
    }
}

impl LoadPipeline<Complete> {
    /// Hand back the content plus aggregated resource errors.
    pub fn finish(self) -> (AttachedContent, Vec<ResourceError>) {
        (self.stage.content, self.stage.resource_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apack_fulfill::{ActionKind, FulfillError};

    fn leaf() -> ConditionTree {
        ConditionTree {
            action: Some(ActionKind::Manual),
            and: None,
            or: None,
        }
    }

    fn empty() -> ConditionTree {
        ConditionTree {
            action: None,
            and: None,
            or: None,
        }
    }

    #[test]
    fn add_tree_builds_every_branch() {
        let mut graph = ConditionGraph::new();
        let tree = ConditionTree {
            action: Some(ActionKind::Manual),
            and: Some(Box::new(leaf())),
            or: Some(Box::new(leaf())),
        };
        let root = add_tree(&mut graph, tree).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.subtree(root).len(), 3);
    }

    #[test]
    fn failed_or_branch_discards_built_and_branch() {
        let mut graph = ConditionGraph::new();
        let tree = ConditionTree {
            action: None,
            and: Some(Box::new(leaf())),
            or: Some(Box::new(empty())),
        };
        assert!(matches!(
            add_tree(&mut graph, tree),
            Err(FulfillError::EmptyCondition)
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn discarding_a_removed_tree_is_harmless() {
        let mut graph = ConditionGraph::new();
        let root = add_tree(&mut graph, leaf()).unwrap();
        discard_trees(&mut graph, [Some(root), Some(root), None]);
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn blocking_steps_return_their_result() {
        let value = run_blocking(LoadStep::Discover, || Ok(7)).await.unwrap();
        assert_eq!(value, 7);

        let failure = run_blocking::<(), _>(LoadStep::Validate, || {
            Err(Box::new(PipelineFailure::new(
                LoadStep::Validate,
                InternalError::new("boom"),
            )))
        })
        .await
        .unwrap_err();
        assert_eq!(failure.step, LoadStep::Validate);
    }
}
