//! Result envelope returned by a switch for a completed RPC.
//!
//! A switch answers every request with an [`RpcResult`]: a success flag plus
//! either the output payload or an ordered list of [`RpcErrorMessage`]s. The
//! error list is what the classifier inspects when deciding whether a
//! failure is worth logging.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a device-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
        }
    }
}

/// One entry of a device-reported error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorMessage {
    pub severity: ErrorSeverity,
    /// Human readable message. Devices are not required to send one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Description of an underlying failure attached by the device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl RpcErrorMessage {
    /// Creates an error-severity entry with a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Error,
            message: Some(message.into()),
            cause: None,
        }
    }

    /// Creates a warning-severity entry with a message.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Warning,
            message: Some(message.into()),
            cause: None,
        }
    }

    /// Creates an entry that carries no message at all.
    pub fn unspecified() -> Self {
        Self {
            severity: ErrorSeverity::Error,
            message: None,
            cause: None,
        }
    }

    /// Attaches an underlying cause.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for RpcErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message.as_deref().unwrap_or("<none>"))?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {})", cause)?;
        }
        Ok(())
    }
}

/// Renders an error list as `[a, b, ...]` for log records.
pub fn format_errors(errors: &[RpcErrorMessage]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

/// Success flag plus payload-or-error-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResult<T> {
    successful: bool,
    result: Option<T>,
    errors: Vec<RpcErrorMessage>,
}

impl<T> RpcResult<T> {
    /// Creates a successful result carrying `value`.
    pub fn success(value: T) -> Self {
        Self {
            successful: true,
            result: Some(value),
            errors: Vec::new(),
        }
    }

    /// Creates a failed result carrying the device's error list.
    pub fn failed(errors: Vec<RpcErrorMessage>) -> Self {
        Self {
            successful: false,
            result: None,
            errors,
        }
    }

    /// Returns the success flag.
    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// Returns the payload, if any.
    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    /// Returns the error list.
    pub fn errors(&self) -> &[RpcErrorMessage] {
        &self.errors
    }

    /// Splits the envelope into its parts.
    pub fn into_parts(self) -> (bool, Option<T>, Vec<RpcErrorMessage>) {
        (self.successful, self.result, self.errors)
    }
}
