use thiserror::Error;

/// Failure taxonomy for a provisioning run.
///
/// Only [`ProvisionError::TransientConnectivity`] is ever retried. Guarded
/// steps whose precondition already holds and missing optional capabilities
/// are not errors at all; they surface as step outcomes.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("database not reachable: {0}")]
    TransientConnectivity(String),

    #[error("invalid provisioning config: {0}")]
    InvalidConfig(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("step `{step}` requires {requirement}")]
    OutOfOrder {
        step: &'static str,
        requirement: &'static str,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("target error: {0:#}")]
    Target(#[from] anyhow::Error),
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::TransientConnectivity(_))
    }
}
