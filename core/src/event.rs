use serde::Serialize;

use crate::ledger::DocumentId;
use crate::ledger::LifecycleState;
use crate::registry::CategoryId;
use crate::snapshot::IntakeSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IntakeEventKind {
    DocumentRecorded {
        category: CategoryId,
        document: DocumentId,
    },
    ValidationStarted {
        category: CategoryId,
        document: DocumentId,
    },
    ValidationFinished {
        category: CategoryId,
        document: DocumentId,
        state: LifecycleState,
    },
    DocumentRemoved {
        category: CategoryId,
        document: DocumentId,
    },
    CategoryChanged {
        from: CategoryId,
        to: CategoryId,
    },
}

/// Change notification; always carries the full post-change snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeEvent {
    pub kind: IntakeEventKind,
    pub snapshot: IntakeSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UploadLedger;
    use crate::registry::DocumentRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn empty_snapshot() -> IntakeSnapshot {
        let ledger = UploadLedger::new(Arc::new(DocumentRegistry::standard()));
        IntakeSnapshot {
            revision: 3,
            active_category: CategoryId::Address,
            documents: ledger.snapshot(),
            completion_ratio: 0.0,
            can_advance: false,
            document_set_ready: false,
        }
    }

    #[test]
    fn events_serialize_with_kebab_case_type_tag() {
        let event = IntakeEvent {
            kind: IntakeEventKind::CategoryChanged {
                from: CategoryId::Identity,
                to: CategoryId::Address,
            },
            snapshot: empty_snapshot(),
        };
        let value = serde_json::to_value(event).expect("serialize event");
        assert_eq!(
            value,
            json!({
                "kind": {
                    "type": "category-changed",
                    "from": "identity",
                    "to": "address",
                },
                "snapshot": {
                    "revision": 3,
                    "active_category": "address",
                    "documents": {
                        "identity": null,
                        "address": null,
                        "photo": null,
                        "signature": null,
                    },
                    "completion_ratio": 0.0,
                    "can_advance": false,
                    "document_set_ready": false,
                },
            })
        );
    }

    #[test]
    fn validation_finished_carries_lifecycle_state() {
        let document = DocumentId::new();
        let kind = IntakeEventKind::ValidationFinished {
            category: CategoryId::Photo,
            document,
            state: LifecycleState::Invalid,
        };
        let value = serde_json::to_value(kind).expect("serialize kind");
        assert_eq!(value["type"], "validation-finished");
        assert_eq!(value["category"], "photo");
        assert_eq!(value["document"], document.to_string());
        assert_eq!(value["state"], "invalid");
    }
}
