//! Stable error categories shared across the UTCP client.
//!
//! These map onto stable error categories: configuration failures are fatal to
//! `create`, variable/security/lookup failures are fatal to the call that
//! triggered them, and transport registration failures are packed into
//! [`crate::manual::RegisterManualResult`] instead of being raised.

use thiserror::Error;

/// A specialized `Result` for UTCP operations.
pub type UtcpResult<T> = std::result::Result<T, UtcpError>;

/// Stable error categories for the UTCP client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UtcpError {
    /// Configuration parse/validation failure. Fatal to client creation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A `$VAR`/`${VAR}` reference could not be resolved.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// A transport refused a non-HTTPS/non-local URL, or an insecure gNMI
    /// channel outside localhost.
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// A manual name was registered while already present in the repository.
    #[error("manual already registered: {0}")]
    ManualAlreadyRegistered(String),

    /// No tool exists under the given fully-qualified name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// No manual exists under the given name.
    #[error("manual not found: {0}")]
    ManualNotFound(String),

    /// A transport's own per-call failure (timeout, connection refused,
    /// protocol error, remote status >= 400). Always raised to the caller.
    #[error("call failed: {0}")]
    CallFailure(String),

    /// An operation unsupported by this transport or configuration.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Errors below are not in the stable category list above but are necessary to
    /// carry underlying causes without losing information; callers should
    /// match on the categories above and treat this as an opaque fallback.
    #[error("{0}")]
    Other(String),
}

impl UtcpError {
    /// Wrap an arbitrary display-able error as [`UtcpError::Other`].
    pub fn other(err: impl std::fmt::Display) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for UtcpError {
    fn from(err: serde_json::Error) -> Self {
        UtcpError::Other(format!("JSON error: {err}"))
    }
}
