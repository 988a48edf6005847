//! Cloud provider error types

use crate::action::ResourceKind;
use cloudweave_rules::RuleError;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider '{provider}' does not manage {kind} resources")]
    UnsupportedResource {
        provider: String,
        kind: ResourceKind,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Apply failed for {resource}: {failed} action(s) failed")]
    ApplyFailed { resource: String, failed: usize },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether running the whole list/diff/apply cycle again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::ApiError(_)
                | CloudError::ApplyFailed { .. }
                | CloudError::Timeout(_)
                | CloudError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
