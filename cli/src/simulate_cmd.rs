//! `docintake simulate`: walks an intake session end to end, either along a
//! TOML script against a scripted gateway or as a default journey scored by
//! the random gateway.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use docintake_core::ApplicationStep;
use docintake_core::CategoryId;
use docintake_core::IntakeConfig;
use docintake_core::IntakeError;
use docintake_core::IntakeEvent;
use docintake_core::IntakeSnapshot;
use docintake_core::IntakeWorkflow;
use docintake_core::LifecycleState;
use docintake_core::PayloadDescriptor;
use docintake_core::PayloadHandle;
use docintake_core::RandomGateway;
use docintake_core::ScriptedGateway;
use docintake_core::ScriptedResponse;
use docintake_core::SubmissionReport;
use docintake_core::SubmissionStatus;
use docintake_core::ValidationOutcome;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::format_size;
use crate::print_json;

/// Attempts per category in the default journey before giving up.
const MAX_ATTEMPTS: usize = 3;
const ADVANCE_GRACE: Duration = Duration::from_millis(500);

/// Simulate an applicant uploading their documents.
#[derive(Debug, Parser)]
pub struct SimulateCli {
    /// Intake settings (TOML). Defaults apply when omitted.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seed for the random gateway so runs are reproducible.
    #[arg(long = "seed", value_name = "N", conflicts_with = "script")]
    seed: Option<u64>,

    /// Replay the steps of a TOML script instead of the default journey.
    #[arg(long = "script", value_name = "PATH")]
    script: Option<PathBuf>,

    /// Emit the full report as JSON.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Script {
    #[serde(default, rename = "step")]
    steps: Vec<ScriptStep>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
enum ScriptStep {
    Submit {
        category: String,
        file_name: String,
        media_type: String,
        size_bytes: u64,
        score: Option<u8>,
        fail: Option<String>,
        #[serde(default)]
        hang: bool,
    },
    Goto {
        category: String,
    },
    Advance,
    Retreat,
    Remove {
        category: String,
    },
    WaitMs {
        ms: u64,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StepRecord {
    Submitted {
        file_name: String,
        report: SubmissionReport,
    },
    Rejected {
        category: CategoryId,
        file_name: String,
        error: String,
    },
    Navigated {
        moved: bool,
        active: CategoryId,
    },
    Removed {
        category: CategoryId,
        removed: bool,
    },
    Waited {
        ms: u64,
        active: CategoryId,
    },
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    steps: Vec<StepRecord>,
    application_step: ApplicationStep,
    application_progress_percent: u8,
    snapshot: IntakeSnapshot,
}

impl SimulationReport {
    fn new(steps: Vec<StepRecord>, snapshot: IntakeSnapshot) -> Self {
        let application_step = if snapshot.document_set_ready {
            ApplicationStep::DocumentUpload.next()
        } else {
            ApplicationStep::DocumentUpload
        };
        Self {
            steps,
            application_step,
            application_progress_percent: application_step.progress_percent(),
            snapshot,
        }
    }
}

pub async fn run(cli: SimulateCli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => IntakeConfig::load(path)
            .with_context(|| format!("failed to load intake config from {}", path.display()))?,
        None => IntakeConfig::default(),
    };

    let report = match &cli.script {
        Some(path) => {
            let script = load_script(path)?;
            let gateway = Arc::new(ScriptedGateway::new());
            let workflow = IntakeWorkflow::with_standard_registry(gateway.clone(), config);
            let steps = run_script(&workflow, &gateway, script.steps).await?;
            SimulationReport::new(steps, workflow.snapshot())
        }
        None => {
            let gateway = match cli.seed {
                Some(seed) => RandomGateway::seeded(seed, config.mock.clone()),
                None => RandomGateway::new(config.mock.clone()),
            };
            let workflow = IntakeWorkflow::with_standard_registry(Arc::new(gateway), config);
            let steps = run_journey(&workflow).await?;
            SimulationReport::new(steps, workflow.snapshot())
        }
    };

    if cli.json {
        print_json(&report)
    } else {
        print_text(&report);
        Ok(())
    }
}

fn load_script(path: &Path) -> Result<Script> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse script {}", path.display()))
}

async fn run_script(
    workflow: &IntakeWorkflow,
    gateway: &ScriptedGateway,
    script: Vec<ScriptStep>,
) -> Result<Vec<StepRecord>> {
    let mut records = Vec::with_capacity(script.len());
    for (idx, step) in script.into_iter().enumerate() {
        let record = run_step(workflow, gateway, step)
            .await
            .with_context(|| format!("script step {} failed", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

async fn run_step(
    workflow: &IntakeWorkflow,
    gateway: &ScriptedGateway,
    step: ScriptStep,
) -> Result<StepRecord> {
    let record = match step {
        ScriptStep::Submit {
            category,
            file_name,
            media_type,
            size_bytes,
            score,
            fail,
            hang,
        } => {
            let category = CategoryId::parse(&category)?;
            let response = scripted_response(score, fail, hang)?;
            let descriptor = PayloadDescriptor::new(file_name, media_type, size_bytes);
            // a refused upload never reaches the gateway, so keep its reply unqueued
            if let Err(violation) = workflow.registry().get(category)?.admits(&descriptor) {
                let file_name = descriptor.file_name;
                let error = IntakeError::ConstraintViolation {
                    category,
                    violation,
                };
                return Ok(StepRecord::Rejected {
                    category,
                    file_name,
                    error: error.to_string(),
                });
            }
            gateway.push(category, response);
            submit(workflow, category, descriptor).await?
        }
        ScriptStep::Goto { category } => {
            let moved = workflow.go_to(CategoryId::parse(&category)?);
            StepRecord::Navigated {
                moved,
                active: workflow.active_category(),
            }
        }
        ScriptStep::Advance => StepRecord::Navigated {
            moved: workflow.advance(),
            active: workflow.active_category(),
        },
        ScriptStep::Retreat => StepRecord::Navigated {
            moved: workflow.retreat(),
            active: workflow.active_category(),
        },
        ScriptStep::Remove { category } => {
            let category = CategoryId::parse(&category)?;
            StepRecord::Removed {
                category,
                removed: workflow.remove(category),
            }
        }
        ScriptStep::WaitMs { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            StepRecord::Waited {
                ms,
                active: workflow.active_category(),
            }
        }
    };
    Ok(record)
}

fn scripted_response(
    score: Option<u8>,
    fail: Option<String>,
    hang: bool,
) -> Result<ScriptedResponse> {
    match (score, fail, hang) {
        (Some(score), None, false) => Ok(ScriptedResponse::score(score)),
        (None, Some(reason), false) => Ok(ScriptedResponse::Fail(reason)),
        (None, None, true) => Ok(ScriptedResponse::Hang),
        _ => bail!("a submit step needs exactly one of `score`, `fail` or `hang`"),
    }
}

async fn run_journey(workflow: &IntakeWorkflow) -> Result<Vec<StepRecord>> {
    let mut events = workflow.subscribe();
    let mut records = Vec::new();
    loop {
        let category = workflow.active_category();
        let mut valid = false;
        for attempt in 1..=MAX_ATTEMPTS {
            let record = submit(workflow, category, sample_descriptor(category)).await?;
            valid = matches!(
                &record,
                StepRecord::Submitted { report, .. } if report.status == SubmissionStatus::Valid
            );
            records.push(record);
            if valid {
                break;
            }
            tracing::info!(%category, attempt, "upload judged invalid");
        }
        if !valid {
            tracing::warn!(%category, attempts = MAX_ATTEMPTS, "giving up on category");
            break;
        }
        if workflow.registry().is_last(category) {
            break;
        }
        if !wait_for_advance(workflow, &mut events, category).await {
            bail!("intake did not move past {category}");
        }
        records.push(StepRecord::Navigated {
            moved: true,
            active: workflow.active_category(),
        });
    }
    Ok(records)
}

/// Waits for the workflow's own auto-advance out of `from`.
async fn wait_for_advance(
    workflow: &IntakeWorkflow,
    events: &mut broadcast::Receiver<IntakeEvent>,
    from: CategoryId,
) -> bool {
    let deadline = workflow.config().auto_advance_delay() + ADVANCE_GRACE;
    let moved = async {
        loop {
            if workflow.active_category() != from {
                return true;
            }
            match events.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(deadline, moved).await.unwrap_or(false)
}

/// The simulator carries no file contents; only the descriptor matters.
async fn submit(
    workflow: &IntakeWorkflow,
    category: CategoryId,
    descriptor: PayloadDescriptor,
) -> Result<StepRecord> {
    let file_name = descriptor.file_name.clone();
    let payload = PayloadHandle::new(descriptor, Vec::<u8>::new());
    match workflow.submit(category, payload).await {
        Ok(report) => Ok(StepRecord::Submitted { file_name, report }),
        Err(err @ IntakeError::ConstraintViolation { .. }) => Ok(StepRecord::Rejected {
            category,
            file_name,
            error: err.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

fn sample_descriptor(category: CategoryId) -> PayloadDescriptor {
    match category {
        CategoryId::Identity => {
            PayloadDescriptor::new("identity-proof.pdf", "application/pdf", 240 * 1024)
        }
        CategoryId::Address => {
            PayloadDescriptor::new("utility-bill.pdf", "application/pdf", 310 * 1024)
        }
        CategoryId::Photo => PayloadDescriptor::new("passport-photo.jpg", "image/jpeg", 180 * 1024),
        CategoryId::Signature => PayloadDescriptor::new("signature.png", "image/png", 40 * 1024),
    }
}

fn print_text(report: &SimulationReport) {
    for record in &report.steps {
        match record {
            StepRecord::Submitted { file_name, report } => {
                println!("[{}] {file_name}: {}", report.category, describe(report));
                if let Some(outcome) = &report.outcome {
                    for issue in outcome.issues() {
                        println!("    issue: {issue}");
                    }
                    for suggestion in outcome.suggestions() {
                        println!("    suggestion: {suggestion}");
                    }
                }
            }
            StepRecord::Rejected {
                category,
                file_name,
                error,
            } => println!("[{category}] {file_name}: rejected ({error})"),
            StepRecord::Navigated { moved: true, active } => println!("-> now on {active}"),
            StepRecord::Navigated {
                moved: false,
                active,
            } => println!("-> stayed on {active}"),
            StepRecord::Removed {
                category,
                removed: true,
            } => println!("[{category}] upload removed"),
            StepRecord::Removed {
                category,
                removed: false,
            } => println!("[{category}] nothing to remove"),
            StepRecord::Waited { ms, active } => println!("waited {ms}ms, active: {active}"),
        }
    }

    let snapshot = &report.snapshot;
    println!();
    for (category, document) in &snapshot.documents {
        let status = match document {
            Some(document) => format!(
                "{} {} ({})",
                document.state,
                document.file.file_name,
                format_size(document.file.size_bytes)
            ),
            None => "missing".to_string(),
        };
        println!("{:<10} {status}", category.as_str());
    }
    let valid = snapshot
        .documents
        .values()
        .flatten()
        .filter(|document| document.state == LifecycleState::Valid)
        .count();
    println!(
        "documents: {valid}/{} valid ({}%)",
        snapshot.documents.len(),
        snapshot.completion_percent()
    );
    println!(
        "application step: {} ({}%)",
        report.application_step.title(),
        report.application_progress_percent
    );
}

fn describe(report: &SubmissionReport) -> String {
    let score = report.outcome.as_ref().map(ValidationOutcome::score);
    match (report.status, score) {
        (SubmissionStatus::Valid, Some(score)) => format!("valid (score {score})"),
        (SubmissionStatus::Invalid, Some(score)) => format!("invalid (score {score})"),
        (SubmissionStatus::Superseded, _) | (_, None) => "superseded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn script_steps_parse_from_toml() {
        let script: Script = toml::from_str(
            r#"
[[step]]
action = "submit"
category = "Identity"
file_name = "id.pdf"
media_type = "application/pdf"
size_bytes = 1024
score = 91

[[step]]
action = "wait_ms"
ms = 10

[[step]]
action = "retreat"
"#,
        )
        .expect("parse script");
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(
            &script.steps[0],
            ScriptStep::Submit {
                score: Some(91),
                hang: false,
                ..
            }
        ));
        assert!(matches!(script.steps[1], ScriptStep::WaitMs { ms: 10 }));
        assert!(matches!(script.steps[2], ScriptStep::Retreat));
    }

    #[test]
    fn submit_needs_exactly_one_verdict() {
        assert_eq!(
            scripted_response(Some(80), None, false).expect("score"),
            ScriptedResponse::score(80)
        );
        assert_eq!(
            scripted_response(None, None, true).expect("hang"),
            ScriptedResponse::Hang
        );
        assert!(scripted_response(None, None, false).is_err());
        assert!(scripted_response(Some(80), None, true).is_err());
    }

    #[test]
    fn incomplete_document_set_stays_on_upload_step() {
        let workflow = IntakeWorkflow::with_standard_registry(
            Arc::new(ScriptedGateway::new()),
            IntakeConfig::default(),
        );
        let report = SimulationReport::new(Vec::new(), workflow.snapshot());
        assert_eq!(report.application_step, ApplicationStep::DocumentUpload);
        assert_eq!(report.application_progress_percent, 50);
    }
}
