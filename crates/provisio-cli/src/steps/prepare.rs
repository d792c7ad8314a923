use async_trait::async_trait;
use tracing::{debug, error, warn};

use provisio_core::ProvisionError;
use provisio_target::DiagnosticStatus;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Clear derived caches and run the target's self-diagnostics.
///
/// Diagnostic findings are reported, never fatal.
pub struct Prepare;

#[async_trait]
impl Step for Prepare {
    fn name(&self) -> &'static str {
        "prepare"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        cx.adapters.caches.clear_derived_caches().await?;

        for result in cx.adapters.diagnostics.run_all().await? {
            let comment = result.comment.as_deref().unwrap_or("");
            match result.status {
                DiagnosticStatus::Ok => debug!(check = %result.label, "Diagnostic passed"),
                DiagnosticStatus::Warning => {
                    warn!(check = %result.label, comment, "Diagnostic warning")
                }
                DiagnosticStatus::Error => {
                    error!(check = %result.label, comment, "Diagnostic failed")
                }
            }
        }
        Ok(StepOutcome::Applied)
    }
}
