/// Failure taxonomy for a provisioning run.
///
/// A run aborts on the first error of any kind; resources created before the
/// failure are left behind and must be cleaned up by the operator.
#[derive(thiserror::Error, Debug)]
pub enum ProvisionerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to provision {resource}: {reason}")]
    Provision { resource: String, reason: String },
    #[error("{resource} was not found when read back after creation")]
    NotFound { resource: String },
    #[error("request to the control plane failed")]
    Transport(#[from] reqwest::Error),
}

impl From<config::ConfigError> for ProvisionerError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
