//! Rule parsing error types

use thiserror::Error;

/// Errors raised while parsing rules and record sets.
///
/// Comparisons never fail; only turning text into typed rules does.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("Invalid port specification: {0}")]
    InvalidPorts(String),

    #[error("Invalid priority order: {0}")]
    InvalidOrder(String),

    #[error("Unknown DNS record type: {0}")]
    UnknownDnsType(String),

    #[error("Unknown DNS policy type: {0}")]
    UnknownPolicyType(String),

    #[error("Unknown read/write access type: {0}")]
    UnknownRwAccessType(String),

    #[error("Unknown user access type: {0}")]
    UnknownUserAccessType(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;
