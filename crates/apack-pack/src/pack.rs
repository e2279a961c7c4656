//! # Pack Runtime
//!
//! A [`Pack`] owns one registered content pack and drives its lifecycle:
//!
//! ```text
//! Unloaded ─enable→ Loading ─→ Loaded | FatalError ─disable→ Unloading ─→ Unloaded
//!                      └──── forced disable / cancel ───────→ Unloading ─→ Unloaded
//! ```
//!
//! `enable` spawns the load pipeline as a tokio task. The task checks a
//! [`CancellationToken`] between steps; a cancelled load tears down whatever
//! it attached and never reports `Loaded` or `FatalError`.
//!
//! Events are delivered to subscribers synchronously, always after the
//! pack's internal lock has been released, so a callback may call back
//! into the pack (for example to cancel on a step event).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use apack_core::{identity, NodeId, Observers, SubscriptionId};
use apack_fulfill::{ActionCheckContext, ActionKind, ConditionId, FulfillError, FulfillmentChange};
use apack_state::{LoadStep, PackLifecycle, PackState, TransitionRecord};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PackError, PackResult, ResourceError};
use crate::manifest::Manifest;
use crate::pipeline::{
    run_blocking, teardown, AttachedContent, LoadPipeline, PipelineContext, PipelineFailure,
};
use crate::progress::{self, AchievementStatus};
use crate::properties::{store_record, AchievementProperties};
use crate::report::LoadReport;
use crate::text::LocalizedText;

/// Something that happened to a pack.
#[derive(Debug, Clone)]
pub enum PackEvent {
    /// The lifecycle state changed.
    StateChanged {
        /// Previous state.
        from: PackState,
        /// New state.
        to: PackState,
    },
    /// A load step finished successfully.
    StepCompleted(LoadStep),
    /// The pack entered `Loaded`.
    Loaded,
    /// The pack entered `Unloaded`.
    Unloaded,
    /// An error was captured.
    Error(Arc<PackError>),
    /// A condition of this pack changed its reported value.
    Fulfillment(FulfillmentChange),
}

/// One line of a pack outline.
#[derive(Debug, Clone, Serialize)]
pub struct OutlineEntry {
    /// Full name.
    pub full_name: String,
    /// Object kind.
    pub kind: &'static str,
    /// Display name.
    pub name: LocalizedText,
    /// Distance from the pack root.
    pub depth: usize,
}

#[derive(Default)]
struct PackInner {
    lifecycle: PackLifecycle,
    content: Option<AttachedContent>,
    report: LoadReport,
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

enum Outcome {
    Complete(AttachedContent, Vec<ResourceError>),
    Cancelled(Option<AttachedContent>),
}

/// A registered content pack.
pub struct Pack {
    ctx: PipelineContext,
    inner: Mutex<PackInner>,
    state_tx: watch::Sender<PackState>,
    events: Observers<PackEvent>,
}

impl fmt::Debug for Pack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pack")
            .field("namespace", &self.namespace())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Pack {
    pub(crate) fn new(ctx: PipelineContext) -> Self {
        let (state_tx, _) = watch::channel(PackState::Unloaded);
        Self {
            ctx,
            inner: Mutex::new(PackInner::default()),
            state_tx,
            events: Observers::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The accepted manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.ctx.manifest
    }

    /// Root namespace.
    pub fn namespace(&self) -> &str {
        self.ctx.manifest.namespace()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PackState {
        self.inner.lock().lifecycle.state()
    }

    /// Outcome of the last load.
    pub fn report(&self) -> LoadReport {
        self.inner.lock().report.clone()
    }

    /// Every lifecycle transition so far.
    pub fn transition_log(&self) -> Vec<TransitionRecord> {
        self.inner.lock().lifecycle.transition_log().to_vec()
    }

    /// Full names of loaded achievements.
    pub fn achievements(&self) -> Vec<String> {
        self.inner
            .lock()
            .content
            .as_ref()
            .map(|c| c.achievements.iter().map(|a| a.full_name.clone()).collect())
            .unwrap_or_default()
    }

    /// Subscribe to pack events.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PackEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Remove an event subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Watch the lifecycle state.
    pub fn watch_state(&self) -> watch::Receiver<PackState> {
        self.state_tx.subscribe()
    }

    /// Wait until the pack is `Loaded`, `FatalError` or `Unloaded`.
    pub async fn settled(&self) -> PackState {
        let mut rx = self.state_tx.subscribe();
        let settled = rx.wait_for(PackState::is_settled).await.map(|state| *state);
        settled.unwrap_or_else(|_| self.state())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    fn emit(&self, events: impl IntoIterator<Item = PackEvent>) {
        for event in events {
            self.events.notify(&event);
        }
    }

    fn transition(&self, inner: &mut PackInner, to: PackState, reason: &str) -> PackResult<PackEvent> {
        let from = inner.lifecycle.try_transition(to, Some(reason.to_string()))?;
        self.state_tx.send_replace(to);
        info!(pack = %self.namespace(), from = %from, to = %to, reason, "pack state changed");
        Ok(PackEvent::StateChanged { from, to })
    }

    /// Start loading. Requires a tokio runtime and the `Unloaded` state.
    pub fn enable(self: &Arc<Self>) -> PackResult<()> {
        let runtime = Handle::try_current().map_err(|_| PackError::NoRuntime)?;
        let (start_tx, start_rx) = oneshot::channel();
        let event = {
            let mut inner = self.inner.lock();
            let state = inner.lifecycle.state();
            if state != PackState::Unloaded {
                return Err(PackError::AlreadyEnabled {
                    namespace: self.namespace().to_string(),
                    state,
                });
            }
            let event = self.transition(&mut inner, PackState::Loading, "enable")?;
            inner.report = LoadReport::default();
            let token = CancellationToken::new();
            inner.cancel = Some(token.clone());
            let pack = Arc::clone(self);
            inner.task = Some(runtime.spawn(async move {
                // Step events must not overtake the Loading event.
                let _ = start_rx.await;
                pack.run(token).await;
            }));
            event
        };
        self.emit([event]);
        let _ = start_tx.send(());
        Ok(())
    }

    /// Request cancellation of an in-flight load. Returns whether a load
    /// was running.
    pub fn cancel(&self) -> bool {
        let inner = self.inner.lock();
        match (&inner.cancel, inner.lifecycle.state()) {
            (Some(token), PackState::Loading) => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Unload the pack.
    ///
    /// Without `force`, a pack that is still loading is left alone and
    /// [`PackError::StillLoading`] is returned. With `force`, the load is
    /// cancelled and awaited first. Disabling an unloaded pack is a no-op.
    pub async fn disable(&self, force: bool) -> PackResult<()> {
        let task = {
            let mut inner = self.inner.lock();
            match inner.lifecycle.state() {
                PackState::Unloaded | PackState::Unloading => return Ok(()),
                PackState::Loading if !force => {
                    return Err(PackError::StillLoading {
                        namespace: self.namespace().to_string(),
                    })
                }
                PackState::Loading => {
                    if let Some(token) = &inner.cancel {
                        token.cancel();
                    }
                    inner.task.take()
                }
                PackState::Loaded | PackState::FatalError => None,
            }
        };

        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!(pack = %self.namespace(), error = %e, "load task ended abnormally");
                }
            }
            None if self.state() == PackState::Loading => {
                self.settled().await;
            }
            None => {}
        }
        self.unload("disable")
    }

    /// Tear down attached content through `Unloading` into `Unloaded`.
    fn unload(&self, reason: &str) -> PackResult<()> {
        let (content, event) = {
            let mut inner = self.inner.lock();
            // A cancelled load already reached Unloaded on its own.
            if matches!(inner.lifecycle.state(), PackState::Unloaded | PackState::Unloading) {
                return Ok(());
            }
            let event = self.transition(&mut inner, PackState::Unloading, reason)?;
            inner.task = None;
            inner.cancel = None;
            (inner.content.take(), event)
        };
        self.emit([event]);
        if let Some(content) = content {
            teardown(&self.ctx.state, content);
        }
        let event = {
            let mut inner = self.inner.lock();
            self.transition(&mut inner, PackState::Unloaded, reason)?
        };
        self.emit([event, PackEvent::Unloaded]);
        Ok(())
    }

    // ── Load task ────────────────────────────────────────────────────

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let outcome = self.execute(&token).await;
        self.ctx.reader.release_locks();
        match outcome {
            Ok(Outcome::Complete(content, resource_errors)) if !token.is_cancelled() => {
                self.complete(content, resource_errors)
            }
            Ok(Outcome::Complete(content, _)) => self.abandon(Some(content)),
            Ok(Outcome::Cancelled(content)) => self.abandon(content),
            Err(failure) => self.fail(*failure),
        }
    }

    fn step_completed(&self, step: LoadStep) {
        debug!(pack = %self.namespace(), step = %step, "load step completed");
        self.emit([PackEvent::StepCompleted(step)]);
    }

    async fn execute(&self, token: &CancellationToken) -> Result<Outcome, Box<PipelineFailure>> {
        if token.is_cancelled() {
            return Ok(Outcome::Cancelled(None));
        }
        let pipeline = LoadPipeline::new(self.ctx.clone());
        let pipeline = run_blocking(LoadStep::Discover, move || pipeline.discover()).await?;
        debug!(pack = %self.namespace(), files = pipeline.file_count(), "data files parsed");
        self.step_completed(LoadStep::Discover);
        if token.is_cancelled() {
            return Ok(Outcome::Cancelled(None));
        }

        let pipeline = run_blocking(LoadStep::Validate, move || pipeline.validate()).await?;
        self.step_completed(LoadStep::Validate);
        if token.is_cancelled() {
            return Ok(Outcome::Cancelled(None));
        }

        let pipeline = pipeline.attach()?;
        self.step_completed(LoadStep::Attach);
        if token.is_cancelled() {
            return Ok(Outcome::Cancelled(Some(pipeline.into_content())));
        }

        let pipeline = pipeline.resolve()?;
        self.step_completed(LoadStep::Resolve);
        if token.is_cancelled() {
            return Ok(Outcome::Cancelled(Some(pipeline.into_content())));
        }

        let pipeline = pipeline.load_resources().await;
        self.step_completed(LoadStep::LoadResources);
        let (content, resource_errors) = pipeline.finish();
        Ok(Outcome::Complete(content, resource_errors))
    }

    fn complete(&self, content: AttachedContent, resource_errors: Vec<ResourceError>) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.report.faulty_data = Some(false);
            inner.report.faulty_references = Some(false);
            inner.report.faulty_resources = Some(!resource_errors.is_empty());
            for e in &resource_errors {
                let error = inner.report.record_error(e.clone().into());
                events.push(PackEvent::Error(error));
            }
            inner.report.resource_errors = resource_errors;
            let achievements = content.achievements.len();
            inner.content = Some(content);
            inner.task = None;
            inner.cancel = None;
            match self.transition(&mut inner, PackState::Loaded, "load complete") {
                Ok(event) => events.extend([event, PackEvent::Loaded]),
                Err(e) => error!(pack = %self.namespace(), error = %e, "cannot enter Loaded"),
            }
            info!(
                pack = %self.namespace(),
                achievements,
                resource_errors = inner.report.resource_errors.len(),
                "pack loaded"
            );
        }
        self.emit(events);
    }

    fn fail(&self, failure: PipelineFailure) {
        if let Some(content) = failure.attached {
            teardown(&self.ctx.state, content);
        }
        error!(pack = %self.namespace(), step = %failure.step, error = %failure.error, "pack load failed");
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            match failure.step {
                LoadStep::Resolve => {
                    inner.report.faulty_data = Some(false);
                    inner.report.faulty_references = Some(true);
                }
                _ => inner.report.faulty_data = Some(true),
            }
            inner.report.data_errors = failure.data_errors;
            let error = inner.report.record_error(failure.error);
            inner.task = None;
            inner.cancel = None;
            match self.transition(&mut inner, PackState::FatalError, "load failed") {
                Ok(event) => events.push(event),
                Err(e) => error!(pack = %self.namespace(), error = %e, "cannot enter FatalError"),
            }
            events.push(PackEvent::Error(error));
        }
        self.emit(events);
    }

    fn abandon(&self, content: Option<AttachedContent>) {
        info!(pack = %self.namespace(), "load cancelled");
        let event = {
            let mut inner = self.inner.lock();
            inner.task = None;
            inner.cancel = None;
            self.transition(&mut inner, PackState::Unloading, "cancelled")
        };
        match event {
            Ok(event) => self.emit([event]),
            Err(e) => error!(pack = %self.namespace(), error = %e, "cannot enter Unloading"),
        }
        if let Some(content) = content {
            teardown(&self.ctx.state, content);
        }
        let event = {
            let mut inner = self.inner.lock();
            self.transition(&mut inner, PackState::Unloaded, "cancelled")
        };
        match event {
            Ok(event) => self.emit([event, PackEvent::Unloaded]),
            Err(e) => error!(pack = %self.namespace(), error = %e, "cannot enter Unloaded"),
        }
    }

    // ── Fulfillment ──────────────────────────────────────────────────

    fn loaded_content(&self) -> Option<AttachedContent> {
        let inner = self.inner.lock();
        match inner.lifecycle.state() {
            PackState::Loaded => inner.content.clone(),
            _ => None,
        }
    }

    fn publish(&self, changes: &[FulfillmentChange]) {
        self.ctx.state.graph.dispatch(changes);
        self.emit(changes.iter().copied().map(PackEvent::Fulfillment));
    }

    fn evaluate(&self, kind: &ActionKind, checks: &ActionCheckContext) -> bool {
        match kind {
            ActionKind::AchievementCompleted { achievement } => {
                achievement.resolved_node().is_some_and(|node| {
                    let hierarchy = self.ctx.state.hierarchy.read();
                    let graph = self.ctx.state.graph.read();
                    progress::is_completed(&hierarchy, &graph, node)
                })
            }
            other => checks.is_met(other),
        }
    }

    /// Re-evaluate every non-manual action of this pack's unfinished
    /// achievements.
    ///
    /// External kinds go through `checks`; `achievement` actions are
    /// evaluated against the graph. Evaluation repeats until nothing
    /// changes so chains of achievement actions settle in one call.
    /// Completed achievements have their objective conditions frozen.
    /// Returns every reported change. A pack that is not loaded reports
    /// nothing.
    pub fn refresh(&self, checks: &ActionCheckContext) -> Vec<FulfillmentChange> {
        let Some(content) = self.loaded_content() else {
            return Vec::new();
        };
        let graph = &self.ctx.state.graph;
        let mut reported = Vec::new();

        for _ in 0..=content.achievements.len() + 1 {
            // Branch freezing only gates notifications, so every action
            // outside a completed achievement is evaluated.
            let actions: Vec<(ConditionId, ActionKind)> = {
                let hierarchy = self.ctx.state.hierarchy.read();
                let g = graph.read();
                let settled: HashSet<ConditionId> = content
                    .achievements
                    .iter()
                    .filter(|a| progress::is_completed(&hierarchy, &g, a.node))
                    .flat_map(|a| a.objectives.iter().copied())
                    .collect();
                content
                    .conditions
                    .iter()
                    .filter(|root| !settled.contains(*root))
                    .flat_map(|root| g.subtree(*root))
                    .filter_map(|c| {
                        let action = g.action(c)?;
                        let manual = matches!(action.kind(), ActionKind::Manual);
                        (!manual).then(|| (c, action.kind().clone()))
                    })
                    .collect()
            };
            let values: Vec<_> = actions
                .iter()
                .map(|(c, kind)| (*c, self.evaluate(kind, checks)))
                .collect();

            let mut changes = Vec::new();
            {
                let mut g = graph.write();
                for (condition, value) in values {
                    match g.set_action_fulfilled(condition, value) {
                        Ok(c) => changes.extend(c),
                        Err(e) => debug!(condition = %condition, error = %e, "skipping action"),
                    }
                }
            }
            self.publish(&changes);
            self.freeze_completed(&content);
            if changes.is_empty() {
                break;
            }
            reported.extend(changes);
        }
        reported
    }

    fn freeze_completed(&self, content: &AttachedContent) {
        let to_freeze: Vec<ConditionId> = {
            let hierarchy = self.ctx.state.hierarchy.read();
            let graph = self.ctx.state.graph.read();
            content
                .achievements
                .iter()
                .filter(|a| progress::is_completed(&hierarchy, &graph, a.node))
                .flat_map(|a| a.objectives.iter().copied())
                .filter(|c| graph.is_frozen(*c) == Some(false))
                .collect()
        };
        for condition in to_freeze {
            if let Err(e) = self.ctx.state.graph.freeze(condition) {
                debug!(condition = %condition, error = %e, "cannot freeze objective");
            }
        }
    }

    fn lookup(&self, full_name: &str) -> PackResult<NodeId> {
        if !identity::is_namespace_parent(self.namespace(), full_name) {
            return Err(PackError::UnknownObject(full_name.to_string()));
        }
        self.ctx
            .state
            .resolver
            .resolve_node(full_name)
            .map_err(|_| PackError::UnknownObject(full_name.to_string()))
    }

    /// Set every manual action of an objective's condition tree.
    pub fn set_manual(&self, objective: &str, fulfilled: bool) -> PackResult<Vec<FulfillmentChange>> {
        let node = self.lookup(objective)?;
        let condition = {
            let hierarchy = self.ctx.state.hierarchy.read();
            hierarchy
                .payload(node)
                .and_then(|p| p.as_objective())
                .map(|o| o.condition)
                .ok_or_else(|| PackError::UnknownObject(objective.to_string()))?
        };
        let changes = {
            let mut graph = self.ctx.state.graph.write();
            let manual: Vec<_> = graph
                .subtree(condition)
                .into_iter()
                .filter(|c| {
                    graph
                        .action(*c)
                        .is_some_and(|a| matches!(a.kind(), ActionKind::Manual))
                })
                .collect();
            if manual.is_empty() {
                return Err(FulfillError::NoAction(condition).into());
            }
            let mut changes = Vec::new();
            for c in manual {
                changes.extend(graph.set_action_fulfilled(c, fulfilled)?);
            }
            changes
        };
        self.publish(&changes);
        Ok(changes)
    }

    /// Progress of one of this pack's achievements.
    pub fn achievement_status(&self, full_name: &str) -> PackResult<AchievementStatus> {
        let node = self.lookup(full_name)?;
        let hierarchy = self.ctx.state.hierarchy.read();
        let graph = self.ctx.state.graph.read();
        progress::achievement_status(&hierarchy, &graph, node)
    }

    /// Set and persist the tracked flag of an achievement.
    pub fn set_tracked(&self, full_name: &str, tracked: bool) -> PackResult<()> {
        let node = self.lookup(full_name)?;
        {
            let mut hierarchy = self.ctx.state.hierarchy.write();
            let achievement = hierarchy
                .payload_mut(node)
                .and_then(|p| p.as_achievement_mut())
                .ok_or_else(|| PackError::NotAnAchievement(full_name.to_string()))?;
            achievement.tracked = tracked;
        }
        store_record(
            self.ctx.state.properties.as_ref(),
            &AchievementProperties {
                full_name: full_name.to_string(),
                tracked,
            },
        )?;
        Ok(())
    }

    /// Every loaded object in pre-order.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        let Some(root) = self.inner.lock().content.as_ref().map(|c| c.root) else {
            return Vec::new();
        };
        let hierarchy = self.ctx.state.hierarchy.read();
        hierarchy
            .subtree(root)
            .into_iter()
            .filter_map(|node| {
                let payload = hierarchy.payload(node)?;
                Some(OutlineEntry {
                    full_name: hierarchy.full_name(node)?,
                    kind: payload.kind(),
                    name: payload.name().clone(),
                    depth: hierarchy.ancestors(node).count(),
                })
            })
            .collect()
    }
}

impl Drop for Pack {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(token) = &inner.cancel {
            token.cancel();
        }
        if let Some(content) = inner.content.take() {
            warn!(pack = %self.ctx.manifest.namespace(), "pack dropped while loaded; tearing down");
            teardown(&self.ctx.state, content);
        }
    }
}
