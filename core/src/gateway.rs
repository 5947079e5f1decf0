//! Contract for the external validation capability plus the stock gateways
//! used for demos and tests.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::config::MockGatewayConfig;
use crate::error::GatewayError;
use crate::ledger::VALID_THRESHOLD;
use crate::registry::CategoryId;
use crate::registry::PayloadDescriptor;

/// Synthetic issue attached when the gateway could not produce a verdict.
pub const VALIDATION_UNAVAILABLE_ISSUE: &str = "validation unavailable";

pub const MAX_SCORE: u8 = 100;

/// Opaque reference to uploaded bytes. Cloning shares the same payload; the
/// payload is released once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct PayloadHandle {
    inner: Arc<Payload>,
}

#[derive(Debug)]
struct Payload {
    descriptor: PayloadDescriptor,
    bytes: Bytes,
}

impl PayloadHandle {
    pub fn new(descriptor: PayloadDescriptor, bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(Payload {
                descriptor,
                bytes: bytes.into(),
            }),
        }
    }

    pub fn descriptor(&self) -> &PayloadDescriptor {
        &self.inner.descriptor
    }

    /// Raw content, for gateway implementations only.
    pub fn bytes(&self) -> &Bytes {
        &self.inner.bytes
    }

    pub fn release_probe(&self) -> ReleaseProbe {
        ReleaseProbe(Arc::downgrade(&self.inner))
    }
}

/// Observes whether every handle to a payload has been dropped.
#[derive(Debug, Clone)]
pub struct ReleaseProbe(Weak<Payload>);

impl ReleaseProbe {
    pub fn is_released(&self) -> bool {
        self.0.strong_count() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    score: u8,
    issues: Vec<String>,
    suggestions: Vec<String>,
}

impl ValidationOutcome {
    /// Scores above [`MAX_SCORE`] are clamped.
    pub fn new(score: u8) -> Self {
        Self {
            score: score.min(MAX_SCORE),
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(0)
            .with_issue(VALIDATION_UNAVAILABLE_ISSUE)
            .with_suggestion("Upload the document again to retry validation")
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn is_unavailable(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue == VALIDATION_UNAVAILABLE_ISSUE)
    }
}

/// Scores an uploaded file against a category. Implementations may be slow
/// or fail; the workflow bounds every call with a timeout.
#[async_trait]
pub trait ValidationGateway: Send + Sync {
    async fn validate(
        &self,
        payload: &PayloadHandle,
        category: CategoryId,
    ) -> Result<ValidationOutcome, GatewayError>;
}

/// Stand-in scorer producing uniformly random scores after a simulated delay.
#[derive(Debug)]
pub struct RandomGateway {
    rng: Mutex<StdRng>,
    config: MockGatewayConfig,
}

impl RandomGateway {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self::with_rng(StdRng::from_os_rng(), config)
    }

    pub fn seeded(seed: u64, config: MockGatewayConfig) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), config)
    }

    fn with_rng(rng: StdRng, config: MockGatewayConfig) -> Self {
        Self {
            rng: Mutex::new(rng),
            config,
        }
    }

    fn roll(&self) -> (u8, usize) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let low = self.config.min_score.min(MAX_SCORE);
        let high = self.config.max_score.clamp(low, MAX_SCORE);
        (rng.random_range(low..=high), rng.random_range(0..usize::MAX))
    }
}

#[async_trait]
impl ValidationGateway for RandomGateway {
    async fn validate(
        &self,
        _payload: &PayloadHandle,
        category: CategoryId,
    ) -> Result<ValidationOutcome, GatewayError> {
        let (score, pick) = self.roll();
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        let mut outcome = ValidationOutcome::new(score);
        if score < VALID_THRESHOLD {
            let (issues, suggestions) = canned_feedback(category);
            outcome = outcome
                .with_issue(issues[pick % issues.len()])
                .with_suggestion(suggestions[pick % suggestions.len()]);
        }
        Ok(outcome)
    }
}

const IDENTITY_ISSUES: &[&str] = &[
    "Document edges are cut off",
    "Identity number is not readable",
];
const IDENTITY_SUGGESTIONS: &[&str] = &[
    "Place the whole card inside the frame",
    "Avoid glare on the card surface",
];
const ADDRESS_ISSUES: &[&str] = &[
    "Address is not legible",
    "Document appears to be older than three months",
];
const ADDRESS_SUGGESTIONS: &[&str] = &["Upload a recent utility bill or bank statement"];
const PHOTO_ISSUES: &[&str] = &["Face is not clearly visible", "Background is not plain"];
const PHOTO_SUGGESTIONS: &[&str] = &[
    "Use a plain light background",
    "Take the photo in even lighting",
];
const SIGNATURE_ISSUES: &[&str] = &["Signature is too faint"];
const SIGNATURE_SUGGESTIONS: &[&str] = &["Sign with a dark pen on white paper"];

fn canned_feedback(category: CategoryId) -> (&'static [&'static str], &'static [&'static str]) {
    match category {
        CategoryId::Identity => (IDENTITY_ISSUES, IDENTITY_SUGGESTIONS),
        CategoryId::Address => (ADDRESS_ISSUES, ADDRESS_SUGGESTIONS),
        CategoryId::Photo => (PHOTO_ISSUES, PHOTO_SUGGESTIONS),
        CategoryId::Signature => (SIGNATURE_ISSUES, SIGNATURE_SUGGESTIONS),
    }
}

/// A queued reply of a [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Outcome(ValidationOutcome),
    Fail(String),
    /// Never resolves; exercises the workflow timeout.
    Hang,
}

impl ScriptedResponse {
    pub fn score(score: u8) -> Self {
        Self::Outcome(ValidationOutcome::new(score))
    }
}

#[derive(Debug, Clone)]
struct ScriptedStep {
    delay: Duration,
    response: ScriptedResponse,
}

/// Replays queued responses per category, in order.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    queues: Mutex<HashMap<CategoryId, VecDeque<ScriptedStep>>>,
    calls: Mutex<Vec<CategoryId>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, category: CategoryId, response: ScriptedResponse) {
        self.push_delayed(category, Duration::ZERO, response);
    }

    pub fn push_delayed(&self, category: CategoryId, delay: Duration, response: ScriptedResponse) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(category)
            .or_default()
            .push_back(ScriptedStep { delay, response });
    }

    /// Categories validated so far, in call order.
    pub fn calls(&self) -> Vec<CategoryId> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self, category: CategoryId) -> Option<ScriptedStep> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(category);
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get_mut(&category).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ValidationGateway for ScriptedGateway {
    async fn validate(
        &self,
        _payload: &PayloadHandle,
        category: CategoryId,
    ) -> Result<ValidationOutcome, GatewayError> {
        let Some(step) = self.next_step(category) else {
            return Err(GatewayError::Transport(format!(
                "no scripted response queued for {category}"
            )));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        match step.response {
            ScriptedResponse::Outcome(outcome) => Ok(outcome),
            ScriptedResponse::Fail(reason) => Err(GatewayError::Transport(reason)),
            ScriptedResponse::Hang => std::future::pending().await,
        }
    }
}
