use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ledger::DocumentId;
use crate::ledger::LifecycleState;
use crate::registry::CategoryId;

pub type Result<T> = std::result::Result<T, IntakeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("unknown document category '{category}'")]
    CategoryUnknown { category: String },
    #[error("document {document} cannot move to {attempted} from {}", describe_state(.from))]
    InvalidTransition {
        document: DocumentId,
        from: Option<LifecycleState>,
        attempted: LifecycleState,
    },
    #[error("{category} upload rejected: {violation}")]
    ConstraintViolation {
        category: CategoryId,
        #[source]
        violation: ConstraintViolation,
    },
    #[error("validation unavailable for {category}: {source}")]
    ValidationUnavailable {
        category: CategoryId,
        #[source]
        source: GatewayError,
    },
    #[error("invalid document registry: {reason}")]
    RegistryInvalid { reason: String },
}

impl IntakeError {
    pub(crate) fn category_unknown(category: impl ToString) -> Self {
        Self::CategoryUnknown {
            category: category.to_string(),
        }
    }

    pub(crate) fn invalid_transition(
        document: DocumentId,
        from: Option<LifecycleState>,
        attempted: LifecycleState,
    ) -> Self {
        Self::InvalidTransition {
            document,
            from,
            attempted,
        }
    }
}

fn describe_state(state: &Option<LifecycleState>) -> String {
    match state {
        Some(state) => state.to_string(),
        None => "a missing entry".to_string(),
    }
}

/// Reasons a payload is refused before it ever reaches the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    #[error("unsupported format {media_type} (accepted: {})", .accepted.join(", "))]
    UnsupportedMediaType {
        media_type: String,
        accepted: Vec<String>,
    },
    #[error("file is too large ({size_bytes} bytes, limit {max_size_bytes})")]
    TooLarge { size_bytes: u64, max_size_bytes: u64 },
}

/// Failures of the external validation capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("validation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
