//! Upload ledger: the authoritative record of submitted documents and their
//! validation lifecycle.
//!
//! Per document the lifecycle is `Uploading -> Validating -> {Valid | Invalid}`.
//! Terminal documents only leave the ledger through replacement or removal.

use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use uuid::Uuid;

use crate::error::IntakeError;
use crate::error::Result;
use crate::gateway::PayloadHandle;
use crate::gateway::ValidationOutcome;
use crate::registry::CategoryId;
use crate::registry::DocumentRegistry;
use crate::registry::PayloadDescriptor;

/// Minimum score a document needs to count as valid.
pub const VALID_THRESHOLD: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    Uploading,
    Validating,
    Valid,
    Invalid,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Valid | LifecycleState::Invalid)
    }
}

/// A document held by the ledger. Dropping it releases the payload handle.
#[derive(Debug)]
pub struct UploadedDocument {
    id: DocumentId,
    category: CategoryId,
    payload: PayloadHandle,
    state: LifecycleState,
    outcome: Option<ValidationOutcome>,
    submitted_at: DateTime<Utc>,
}

impl UploadedDocument {
    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    pub fn payload(&self) -> &PayloadHandle {
        &self.payload
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn outcome(&self) -> Option<&ValidationOutcome> {
        self.outcome.as_ref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn view(&self) -> DocumentView {
        DocumentView {
            id: self.id,
            category: self.category,
            file: self.payload.descriptor().clone(),
            state: self.state,
            outcome: self.outcome.clone(),
            submitted_at: self.submitted_at,
        }
    }
}

/// Render-side copy of an [`UploadedDocument`] without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub category: CategoryId,
    pub file: PayloadDescriptor,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ValidationOutcome>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct UploadLedger {
    registry: Arc<DocumentRegistry>,
    entries: IndexMap<DocumentId, UploadedDocument>,
}

impl UploadLedger {
    pub fn new(registry: Arc<DocumentRegistry>) -> Self {
        Self {
            registry,
            entries: IndexMap::new(),
        }
    }

    /// Records a fresh submission in `Uploading`, replacing whatever the
    /// category held before.
    pub fn record(&mut self, category: CategoryId, payload: PayloadHandle) -> Result<DocumentId> {
        if !self.registry.contains(category) {
            return Err(IntakeError::category_unknown(category));
        }
        let replaced = self.discard_category(category);
        let id = DocumentId::new();
        self.entries.insert(
            id,
            UploadedDocument {
                id,
                category,
                payload,
                state: LifecycleState::Uploading,
                outcome: None,
                submitted_at: Utc::now(),
            },
        );
        tracing::debug!(%category, document = %id, replaced = replaced.len(), "document recorded");
        Ok(id)
    }

    pub fn mark_validating(&mut self, id: DocumentId) -> Result<()> {
        let doc = self.expect_state(id, LifecycleState::Uploading, LifecycleState::Validating)?;
        doc.state = LifecycleState::Validating;
        Ok(())
    }

    /// Stores the verdict; `score >= VALID_THRESHOLD` means `Valid`.
    pub fn mark_result(
        &mut self,
        id: DocumentId,
        outcome: ValidationOutcome,
    ) -> Result<LifecycleState> {
        let next = if outcome.score() >= VALID_THRESHOLD {
            LifecycleState::Valid
        } else {
            LifecycleState::Invalid
        };
        let doc = self.expect_state(id, LifecycleState::Validating, next)?;
        doc.state = next;
        doc.outcome = Some(outcome);
        Ok(next)
    }

    /// Deletes an entry and releases its payload. Unknown ids are ignored.
    pub fn remove(&mut self, id: DocumentId) -> bool {
        self.entries.shift_remove(&id).is_some()
    }

    /// Removes whatever the category currently holds.
    pub fn remove_category(&mut self, category: CategoryId) -> Vec<DocumentId> {
        self.discard_category(category)
    }

    pub fn get(&self, id: DocumentId) -> Option<&UploadedDocument> {
        self.entries.get(&id)
    }

    pub fn entries_for(&self, category: CategoryId) -> impl Iterator<Item = &UploadedDocument> {
        self.entries
            .values()
            .filter(move |doc| doc.category == category)
    }

    pub fn latest(&self, category: CategoryId) -> Option<&UploadedDocument> {
        self.entries_for(category).last()
    }

    pub fn state_of(&self, category: CategoryId) -> Option<LifecycleState> {
        self.latest(category).map(UploadedDocument::state)
    }

    /// Every registry category in step order, with its latest document.
    pub fn snapshot(&self) -> IndexMap<CategoryId, Option<DocumentView>> {
        self.registry
            .ids()
            .map(|category| (category, self.latest(category).map(UploadedDocument::view)))
            .collect()
    }

    pub fn valid_count(&self) -> usize {
        self.registry
            .ids()
            .filter(|category| self.state_of(*category) == Some(LifecycleState::Valid))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn discard_category(&mut self, category: CategoryId) -> Vec<DocumentId> {
        let stale: Vec<DocumentId> = self
            .entries_for(category)
            .map(UploadedDocument::id)
            .collect();
        for id in &stale {
            self.entries.shift_remove(id);
        }
        stale
    }

    fn expect_state(
        &mut self,
        id: DocumentId,
        required: LifecycleState,
        attempted: LifecycleState,
    ) -> Result<&mut UploadedDocument> {
        match self.entries.get_mut(&id) {
            Some(doc) if doc.state == required => Ok(doc),
            Some(doc) => Err(IntakeError::invalid_transition(
                id,
                Some(doc.state),
                attempted,
            )),
            None => Err(IntakeError::invalid_transition(id, None, attempted)),
        }
    }
}
