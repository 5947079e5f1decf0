use indexmap::IndexMap;
use serde::Serialize;

use crate::ledger::DocumentView;
use crate::ledger::LifecycleState;
use crate::registry::CategoryId;

/// Everything the presentation layer needs to render the intake screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeSnapshot {
    /// Bumped on every mutation so renderers can skip stale frames.
    pub revision: u64,
    pub active_category: CategoryId,
    pub documents: IndexMap<CategoryId, Option<DocumentView>>,
    pub completion_ratio: f64,
    pub can_advance: bool,
    pub document_set_ready: bool,
}

impl IntakeSnapshot {
    pub fn document(&self, category: CategoryId) -> Option<&DocumentView> {
        self.documents.get(&category).and_then(Option::as_ref)
    }

    pub fn state_of(&self, category: CategoryId) -> Option<LifecycleState> {
        self.document(category).map(|doc| doc.state)
    }

    pub fn completion_percent(&self) -> u8 {
        (self.completion_ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn pending_count(&self) -> usize {
        self.documents
            .values()
            .flatten()
            .filter(|doc| !doc.state.is_terminal())
            .count()
    }
}
