use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::steps;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The guarded precondition already held; nothing was changed.
    AlreadySatisfied,
    /// Optional input absent or capability missing.
    Skipped(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => f.write_str("applied"),
            StepOutcome::AlreadySatisfied => f.write_str("already satisfied"),
            StepOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed(StepOutcome),
    Failed(String),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Completed(outcome) => outcome.fmt(f),
            StepStatus::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: StepStatus,
}

impl StepRecord {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// One idempotent unit of the provisioning workflow.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError>;
}

/// Runs an ordered list of steps, stopping at the first failure.
///
/// There is no rollback. Recovery is a re-run, which every step tolerates.
pub struct Provisioner {
    cx: StepContext,
    steps: Vec<Box<dyn Step>>,
    log: Vec<StepRecord>,
}

impl Provisioner {
    pub fn new(cx: StepContext) -> Self {
        Self::with_steps(cx, steps::default_steps())
    }

    pub fn with_steps(cx: StepContext, steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            cx,
            steps,
            log: Vec::new(),
        }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&mut self) -> Result<(), ProvisionError> {
        for step in &self.steps {
            let name = step.name();
            let started_at = Utc::now();
            info!(step = name, "Step started");

            let result = step.execute(&mut self.cx).await;
            let finished_at = Utc::now();
            let status = match &result {
                Ok(outcome) => StepStatus::Completed(outcome.clone()),
                Err(err) => StepStatus::Failed(err.to_string()),
            };
            let record = StepRecord {
                step: name,
                started_at,
                finished_at,
                status,
            };

            match result {
                Ok(outcome) => {
                    info!(
                        step = name,
                        outcome = %outcome,
                        elapsed_ms = record.elapsed_ms(),
                        "Step finished"
                    );
                    self.log.push(record);
                }
                Err(err) => {
                    error!(step = name, error = %err, "Step failed, aborting run");
                    self.log.push(record);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Records of every step attempted so far, in execution order.
    pub fn log(&self) -> &[StepRecord] {
        &self.log
    }

    pub fn context(&self) -> &StepContext {
        &self.cx
    }

    pub fn into_context(self) -> StepContext {
        self.cx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_display() {
        assert_eq!(StepOutcome::Applied.to_string(), "applied");
        assert_eq!(
            StepOutcome::Skipped("no branding configured".into()).to_string(),
            "skipped (no branding configured)"
        );
        assert_eq!(
            StepStatus::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }
}
