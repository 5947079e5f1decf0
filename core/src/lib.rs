//! Document intake and validation workflow.
//!
//! An applicant walks a fixed sequence of [`DocumentCategory`] entries held in
//! a [`DocumentRegistry`]. Each upload is recorded in the [`UploadLedger`],
//! scored by a [`ValidationGateway`] and marked valid or invalid. The
//! [`IntakeWorkflow`] drives navigation, auto-advances after a valid upload
//! and broadcasts an [`IntakeEvent`] carrying an [`IntakeSnapshot`] on every
//! change so front-ends can re-render.

mod config;
mod engine;
mod error;
mod event;
mod gateway;
mod ledger;
mod registry;
mod snapshot;
mod step;

pub use config::DEFAULT_AUTO_ADVANCE_DELAY_MS;
pub use config::DEFAULT_EVENT_CAPACITY;
pub use config::DEFAULT_VALIDATION_TIMEOUT_MS;
pub use config::IntakeConfig;
pub use config::MockGatewayConfig;
pub use engine::IntakeWorkflow;
pub use engine::SubmissionReport;
pub use engine::SubmissionStatus;
pub use error::ConfigError;
pub use error::ConstraintViolation;
pub use error::GatewayError;
pub use error::IntakeError;
pub use error::Result;
pub use event::IntakeEvent;
pub use event::IntakeEventKind;
pub use gateway::MAX_SCORE;
pub use gateway::PayloadHandle;
pub use gateway::RandomGateway;
pub use gateway::ReleaseProbe;
pub use gateway::ScriptedGateway;
pub use gateway::ScriptedResponse;
pub use gateway::VALIDATION_UNAVAILABLE_ISSUE;
pub use gateway::ValidationGateway;
pub use gateway::ValidationOutcome;
pub use ledger::DocumentId;
pub use ledger::DocumentView;
pub use ledger::LifecycleState;
pub use ledger::UploadLedger;
pub use ledger::UploadedDocument;
pub use ledger::VALID_THRESHOLD;
pub use registry::CategoryId;
pub use registry::DocumentCategory;
pub use registry::DocumentRegistry;
pub use registry::PayloadDescriptor;
pub use snapshot::IntakeSnapshot;
pub use step::ApplicationStep;
