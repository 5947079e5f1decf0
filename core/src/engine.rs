//! Intake workflow engine.
//!
//! The engine owns the active category and the upload ledger behind a single
//! lock that is never held across an await point. A submission records the
//! payload, releases the lock while the gateway scores it, then re-acquires the
//! lock to store the verdict. Replacing a document removes its id from the
//! ledger, so a verdict that arrives late for it is rejected by the ledger's
//! transition check and dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::IntakeConfig;
use crate::error::GatewayError;
use crate::error::IntakeError;
use crate::error::Result;
use crate::event::IntakeEvent;
use crate::event::IntakeEventKind;
use crate::gateway::PayloadHandle;
use crate::gateway::ValidationGateway;
use crate::gateway::ValidationOutcome;
use crate::ledger::DocumentId;
use crate::ledger::LifecycleState;
use crate::ledger::UploadLedger;
use crate::registry::CategoryId;
use crate::registry::DocumentRegistry;
use crate::snapshot::IntakeSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Valid,
    Invalid,
    /// The document was replaced or removed before its verdict arrived.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub document: DocumentId,
    pub category: CategoryId,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ValidationOutcome>,
}

/// Cheap-to-clone handle to one user's intake session.
#[derive(Clone)]
pub struct IntakeWorkflow {
    inner: Arc<WorkflowInner>,
}

struct WorkflowInner {
    registry: Arc<DocumentRegistry>,
    gateway: Arc<dyn ValidationGateway>,
    config: IntakeConfig,
    state: Mutex<WorkflowState>,
    events: broadcast::Sender<IntakeEvent>,
}

struct WorkflowState {
    active: CategoryId,
    /// Bumped on every change of the active category.
    navigation_epoch: u64,
    ledger: UploadLedger,
    revision: u64,
}

impl IntakeWorkflow {
    pub fn new(
        registry: DocumentRegistry,
        gateway: Arc<dyn ValidationGateway>,
        config: IntakeConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = WorkflowState {
            active: registry.first(),
            ledger: UploadLedger::new(Arc::clone(&registry)),
            navigation_epoch: 0,
            revision: 0,
        };
        Self {
            inner: Arc::new(WorkflowInner {
                registry,
                gateway,
                config,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn with_standard_registry(gateway: Arc<dyn ValidationGateway>, config: IntakeConfig) -> Self {
        Self::new(DocumentRegistry::standard(), gateway, config)
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.inner.config
    }

    /// Every later mutation is delivered with the full snapshot attached.
    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> IntakeSnapshot {
        let state = self.lock();
        self.inner.snapshot_locked(&state)
    }

    pub fn active_category(&self) -> CategoryId {
        self.lock().active
    }

    pub fn state_of(&self, category: CategoryId) -> Option<LifecycleState> {
        self.lock().ledger.state_of(category)
    }

    pub fn completion_ratio(&self) -> f64 {
        let state = self.lock();
        self.inner.completion_ratio_locked(&state)
    }

    /// Forward navigation is only offered once the active category is valid.
    pub fn can_advance(&self) -> bool {
        let state = self.lock();
        state.ledger.state_of(state.active) == Some(LifecycleState::Valid)
    }

    pub fn document_set_ready(&self) -> bool {
        let state = self.lock();
        state.ledger.valid_count() == self.inner.registry.len()
    }

    pub fn go_to(&self, category: CategoryId) -> bool {
        if !self.inner.registry.contains(category) {
            tracing::warn!(%category, "ignoring navigation to a category outside the registry");
            return false;
        }
        let mut state = self.lock();
        self.inner.set_active_locked(&mut state, category)
    }

    /// No-op on the last category.
    pub fn advance(&self) -> bool {
        let mut state = self.lock();
        match self.inner.registry.next_after(state.active) {
            Some(next) => self.inner.set_active_locked(&mut state, next),
            None => false,
        }
    }

    /// No-op on the first category.
    pub fn retreat(&self) -> bool {
        let mut state = self.lock();
        match self.inner.registry.previous_before(state.active) {
            Some(previous) => self.inner.set_active_locked(&mut state, previous),
            None => false,
        }
    }

    /// Discards the category's current upload, if any.
    pub fn remove(&self, category: CategoryId) -> bool {
        let mut state = self.lock();
        let removed = state.ledger.remove_category(category);
        for document in &removed {
            tracing::debug!(%category, %document, "document removed");
            self.inner.emit_locked(
                &mut state,
                IntakeEventKind::DocumentRemoved {
                    category,
                    document: *document,
                },
            );
        }
        !removed.is_empty()
    }

    /// Submits to the active category.
    pub async fn submit_active(&self, payload: PayloadHandle) -> Result<SubmissionReport> {
        let category = self.active_category();
        self.submit(category, payload).await
    }

    /// Records the payload, validates it and stores the verdict. Gateway
    /// failures end as `Invalid`; only unknown categories and constraint
    /// violations are returned as errors.
    pub async fn submit(
        &self,
        category: CategoryId,
        payload: PayloadHandle,
    ) -> Result<SubmissionReport> {
        self.inner
            .registry
            .get(category)?
            .admits(payload.descriptor())
            .map_err(|violation| IntakeError::ConstraintViolation {
                category,
                violation,
            })?;

        let document = self.begin_submission(category, payload.clone())?;
        let outcome = self.run_validation(category, document, &payload).await;
        drop(payload);
        Ok(self.finish_submission(category, document, outcome))
    }

    fn begin_submission(&self, category: CategoryId, payload: PayloadHandle) -> Result<DocumentId> {
        let mut state = self.lock();
        let document = state.ledger.record(category, payload)?;
        self.inner.emit_locked(
            &mut state,
            IntakeEventKind::DocumentRecorded { category, document },
        );
        if let Err(err) = state.ledger.mark_validating(document) {
            tracing::error!(%category, error = %err, "could not start validation");
            return Err(err);
        }
        self.inner.emit_locked(
            &mut state,
            IntakeEventKind::ValidationStarted { category, document },
        );
        Ok(document)
    }

    async fn run_validation(
        &self,
        category: CategoryId,
        document: DocumentId,
        payload: &PayloadHandle,
    ) -> ValidationOutcome {
        let timeout = self.inner.config.validation_timeout();
        let call = self.inner.gateway.validate(payload, category);
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(GatewayError::Timeout(timeout)),
        };
        match result {
            Ok(outcome) => outcome,
            Err(source) => {
                let err = IntakeError::ValidationUnavailable { category, source };
                tracing::warn!(%document, error = %err, "marking document invalid");
                ValidationOutcome::unavailable()
            }
        }
    }

    fn finish_submission(
        &self,
        category: CategoryId,
        document: DocumentId,
        outcome: ValidationOutcome,
    ) -> SubmissionReport {
        let mut state = self.lock();
        let lifecycle = match state.ledger.mark_result(document, outcome.clone()) {
            Ok(lifecycle) => lifecycle,
            Err(err) => {
                tracing::warn!(%category, error = %err, "dropping verdict for superseded document");
                return SubmissionReport {
                    document,
                    category,
                    status: SubmissionStatus::Superseded,
                    outcome: None,
                };
            }
        };
        self.inner.emit_locked(
            &mut state,
            IntakeEventKind::ValidationFinished {
                category,
                document,
                state: lifecycle,
            },
        );
        let advance = lifecycle == LifecycleState::Valid
            && state.active == category
            && !self.inner.registry.is_last(category);
        let epoch = state.navigation_epoch;
        drop(state);

        tracing::info!(%category, %document, score = outcome.score(), state = %lifecycle, "validation finished");
        if advance {
            self.schedule_auto_advance(category, document, epoch);
        }
        let status = match lifecycle {
            LifecycleState::Valid => SubmissionStatus::Valid,
            _ => SubmissionStatus::Invalid,
        };
        SubmissionReport {
            document,
            category,
            status,
            outcome: Some(outcome),
        }
    }

    fn schedule_auto_advance(&self, category: CategoryId, document: DocumentId, epoch: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%category, "no tokio runtime; skipping auto-advance");
            return;
        };
        let delay = self.inner.config.auto_advance_delay();
        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // the session may have been closed in the meantime
            if let Some(inner) = weak.upgrade() {
                IntakeWorkflow { inner }.auto_advance(category, document, epoch);
            }
        });
    }

    /// Moves past `category` unless the user navigated at all since the
    /// verdict, even back to `category`, or the document is no longer the
    /// valid one.
    fn auto_advance(&self, category: CategoryId, document: DocumentId, epoch: u64) -> bool {
        let mut state = self.lock();
        if state.navigation_epoch != epoch || state.active != category {
            tracing::debug!(%category, active = %state.active, "skipping auto-advance");
            return false;
        }
        let still_valid = state.ledger.latest(category).is_some_and(|doc| {
            doc.id() == document && doc.state() == LifecycleState::Valid
        });
        if !still_valid {
            return false;
        }
        match self.inner.registry.next_after(category) {
            Some(next) => self.inner.set_active_locked(&mut state, next),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkflowInner {
    fn completion_ratio_locked(&self, state: &WorkflowState) -> f64 {
        state.ledger.valid_count() as f64 / self.registry.len() as f64
    }

    fn snapshot_locked(&self, state: &WorkflowState) -> IntakeSnapshot {
        let valid = state.ledger.valid_count();
        IntakeSnapshot {
            revision: state.revision,
            active_category: state.active,
            documents: state.ledger.snapshot(),
            completion_ratio: self.completion_ratio_locked(state),
            can_advance: state.ledger.state_of(state.active) == Some(LifecycleState::Valid),
            document_set_ready: valid == self.registry.len(),
        }
    }

    fn set_active_locked(&self, state: &mut WorkflowState, to: CategoryId) -> bool {
        let from = state.active;
        if from == to {
            return false;
        }
        state.active = to;
        state.navigation_epoch += 1;
        tracing::debug!(%from, %to, "active category changed");
        self.emit_locked(state, IntakeEventKind::CategoryChanged { from, to });
        true
    }

    fn emit_locked(&self, state: &mut WorkflowState, kind: IntakeEventKind) {
        state.revision += 1;
        let snapshot = self.snapshot_locked(state);
        // sending only fails when nobody is subscribed
        let _ = self.events.send(IntakeEvent { kind, snapshot });
    }
}

impl fmt::Debug for IntakeWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("IntakeWorkflow")
            .field("active", &state.active)
            .field("documents", &state.ledger.len())
            .field("revision", &state.revision)
            .field("subscribers", &self.inner.events.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;
    use crate::gateway::ScriptedResponse;
    use crate::registry::PayloadDescriptor;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn workflow(gateway: Arc<ScriptedGateway>) -> IntakeWorkflow {
        IntakeWorkflow::with_standard_registry(gateway, IntakeConfig::default())
    }

    fn png(name: &str) -> PayloadHandle {
        PayloadHandle::new(PayloadDescriptor::new(name, "image/png", 2048), vec![7u8; 16])
    }

    #[test]
    fn navigation_stays_inside_the_sequence() {
        let workflow = workflow(Arc::new(ScriptedGateway::new()));
        assert_eq!(workflow.active_category(), CategoryId::Identity);
        assert!(!workflow.retreat());
        assert_eq!(workflow.active_category(), CategoryId::Identity);

        for _ in 0..10 {
            workflow.advance();
        }
        assert_eq!(workflow.active_category(), CategoryId::Signature);
        assert!(!workflow.advance());

        assert!(workflow.go_to(CategoryId::Address));
        assert!(!workflow.go_to(CategoryId::Address));
        assert!(workflow.retreat());
        assert_eq!(workflow.active_category(), CategoryId::Identity);
    }

    #[test]
    fn fresh_workflow_reports_nothing_done() {
        let workflow = workflow(Arc::new(ScriptedGateway::new()));
        assert_eq!(workflow.completion_ratio(), 0.0);
        assert!(!workflow.can_advance());
        assert!(!workflow.document_set_ready());
        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.revision, 0);
        assert_eq!(snapshot.documents.len(), 4);
        assert!(snapshot.documents.values().all(Option::is_none));
    }

    #[tokio::test]
    async fn constraint_violations_never_touch_the_ledger() {
        let gateway = Arc::new(ScriptedGateway::new());
        let workflow = workflow(Arc::clone(&gateway));
        let pdf = PayloadHandle::new(
            PayloadDescriptor::new("photo.pdf", "application/pdf", 2048),
            vec![1u8; 4],
        );
        let err = workflow.submit(CategoryId::Photo, pdf).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::ConstraintViolation {
                category: CategoryId::Photo,
                ..
            }
        ));
        assert_eq!(workflow.state_of(CategoryId::Photo), None);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_category_is_reported() {
        let registry = DocumentRegistry::new(vec![
            crate::registry::DocumentCategory::new(CategoryId::Photo, "Photo", ["image/png"], 4096),
        ])
        .unwrap();
        let workflow = IntakeWorkflow::new(
            registry,
            Arc::new(ScriptedGateway::new()),
            IntakeConfig::default(),
        );
        let err = workflow
            .submit(CategoryId::Signature, png("sig.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::CategoryUnknown { .. }));
        assert!(!workflow.go_to(CategoryId::Signature));
        assert_eq!(workflow.active_category(), CategoryId::Photo);
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_failure_becomes_invalid() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push(CategoryId::Identity, ScriptedResponse::Fail("connection reset".into()));
        let workflow = workflow(Arc::clone(&gateway));

        let report = workflow
            .submit(CategoryId::Identity, png("id.png"))
            .await
            .unwrap();
        assert_eq!(report.status, SubmissionStatus::Invalid);
        let outcome = report.outcome.unwrap();
        assert!(outcome.is_unavailable());
        assert_eq!(workflow.state_of(CategoryId::Identity), Some(LifecycleState::Invalid));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_navigation_cancels_auto_advance() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push(CategoryId::Identity, ScriptedResponse::score(90));
        let workflow = workflow(Arc::clone(&gateway));

        workflow
            .submit(CategoryId::Identity, png("id.png"))
            .await
            .unwrap();
        assert!(workflow.go_to(CategoryId::Photo));
        tokio::time::sleep(workflow.config().auto_advance_delay() + Duration::from_millis(10)).await;
        assert_eq!(workflow.active_category(), CategoryId::Photo);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_the_category_does_not_rearm_auto_advance() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push(CategoryId::Identity, ScriptedResponse::score(95));
        let workflow = workflow(Arc::clone(&gateway));

        workflow
            .submit(CategoryId::Identity, png("id.png"))
            .await
            .unwrap();
        assert!(workflow.go_to(CategoryId::Photo));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(workflow.go_to(CategoryId::Identity));

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(workflow.active_category(), CategoryId::Identity);
        assert!(workflow.can_advance());
    }

    #[tokio::test(start_paused = true)]
    async fn removal_releases_payload_and_notifies() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push(CategoryId::Identity, ScriptedResponse::score(40));
        let workflow = workflow(Arc::clone(&gateway));
        let mut events = workflow.subscribe();

        let handle = png("id.png");
        let probe = handle.release_probe();
        workflow.submit(CategoryId::Identity, handle).await.unwrap();
        assert!(!probe.is_released());

        assert!(workflow.remove(CategoryId::Identity));
        assert!(!workflow.remove(CategoryId::Identity));
        assert!(probe.is_released());

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], IntakeEventKind::DocumentRecorded { .. }));
        assert!(matches!(kinds[1], IntakeEventKind::ValidationStarted { .. }));
        assert!(matches!(
            kinds[2],
            IntakeEventKind::ValidationFinished {
                state: LifecycleState::Invalid,
                ..
            }
        ));
        assert!(matches!(kinds[3], IntakeEventKind::DocumentRemoved { .. }));
        assert_eq!(workflow.snapshot().revision, 4);
    }
}
