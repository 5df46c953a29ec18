//! Error types for device calls.
//!
//! Two layers are distinguished:
//!
//! - [`RpcCause`]: the raw failure cause a pending result handle resolved with
//!   (the transport could not serve the request, the handle was cancelled,
//!   and so on).
//! - [`RpcError`]: what a device call raises to its caller after the cause
//!   (or the device-reported error list) has been classified.

use crate::result::{format_errors, RpcErrorMessage};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure cause carried by a resolved pending handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcCause {
    /// No implementation was available to service the request, usually
    /// because the switch session just went away.
    #[error("operation not available: {0}")]
    Unavailable(String),

    /// The pending handle was cancelled before it resolved.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The caller stopped waiting after the deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The transport failed to deliver the request or the response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Cause attached by the device to a failed result.
    #[error("device error: {0}")]
    Device(String),
}

/// Discriminant of [`RpcCause`], used by classifier tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CauseKind {
    Unavailable,
    Cancelled,
    TimedOut,
    Transport,
    Device,
}

impl RpcCause {
    /// Returns the kind of this cause.
    pub fn kind(&self) -> CauseKind {
        match self {
            RpcCause::Unavailable(_) => CauseKind::Unavailable,
            RpcCause::Cancelled(_) => CauseKind::Cancelled,
            RpcCause::TimedOut(_) => CauseKind::TimedOut,
            RpcCause::Transport(_) => CauseKind::Transport,
            RpcCause::Device(_) => CauseKind::Device,
        }
    }

    /// Returns true if this cause is a cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RpcCause::Cancelled(_))
    }
}

/// Coarse error tag reported to callers of the flow RPC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTag {
    Timeout,
    InternalError,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTag::Timeout => write!(f, "TIMEOUT"),
            ErrorTag::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Outcome class of a failed device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// Deadline exceeded. Always logged.
    Timeout,
    /// Cancelled because the target device disappeared. Never logged.
    DeviceRemoved,
    /// No implementation could serve the request. Never logged.
    TransportUnavailable,
    /// The device answered with a failed result.
    DeviceReportedFailure,
    /// Any other failure cause. Always logged.
    Other,
}

impl RpcErrorKind {
    /// Returns the tag reported for this kind.
    pub fn tag(&self) -> ErrorTag {
        match self {
            RpcErrorKind::Timeout => ErrorTag::Timeout,
            _ => ErrorTag::InternalError,
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcErrorKind::Timeout => "TIMEOUT",
            RpcErrorKind::DeviceRemoved => "DEVICE_REMOVED",
            RpcErrorKind::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            RpcErrorKind::DeviceReportedFailure => "DEVICE_REPORTED_FAILURE",
            RpcErrorKind::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

/// Message raised for a failed result reported by the device.
pub const DEVICE_FAILURE_MESSAGE: &str = "operation returned error";

/// Error raised by a device call.
#[derive(Debug, Clone, Error)]
#[error("{operation}: {message}")]
pub struct RpcError {
    kind: RpcErrorKind,
    operation: &'static str,
    message: String,
    #[source]
    cause: Option<RpcCause>,
    errors: Vec<RpcErrorMessage>,
}

impl RpcError {
    fn new(
        kind: RpcErrorKind,
        operation: &'static str,
        message: impl Into<String>,
        cause: Option<RpcCause>,
    ) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
            cause,
            errors: Vec::new(),
        }
    }

    /// Creates a timeout error.
    pub fn timed_out(operation: &'static str, timeout: Duration) -> Self {
        Self::new(
            RpcErrorKind::Timeout,
            operation,
            "canceled due to timeout",
            Some(RpcCause::TimedOut(timeout)),
        )
    }

    /// Creates the error raised when the target device was removed.
    pub fn device_removed(operation: &'static str, cause: RpcCause) -> Self {
        Self::new(
            RpcErrorKind::DeviceRemoved,
            operation,
            "target device was removed",
            Some(cause),
        )
    }

    /// Creates the error raised when no implementation could serve the request.
    pub fn unavailable(operation: &'static str, cause: RpcCause) -> Self {
        Self::new(
            RpcErrorKind::TransportUnavailable,
            operation,
            "operation not available",
            Some(cause),
        )
    }

    /// Creates the error raised for a failed result reported by the device.
    pub fn device_failure(
        operation: &'static str,
        errors: Vec<RpcErrorMessage>,
        cause: Option<RpcCause>,
    ) -> Self {
        let mut err = Self::new(
            RpcErrorKind::DeviceReportedFailure,
            operation,
            DEVICE_FAILURE_MESSAGE,
            cause,
        );
        err.errors = errors;
        err
    }

    /// Creates an error for any other failure.
    pub fn other(operation: &'static str, message: impl Into<String>, cause: Option<RpcCause>) -> Self {
        Self::new(RpcErrorKind::Other, operation, message, cause)
    }

    /// Returns the outcome class.
    pub fn kind(&self) -> RpcErrorKind {
        self.kind
    }

    /// Returns the coarse tag.
    pub fn tag(&self) -> ErrorTag {
        self.kind.tag()
    }

    /// Returns the name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wrapped cause.
    pub fn cause(&self) -> Option<&RpcCause> {
        self.cause.as_ref()
    }

    /// Returns the device-reported error list (empty unless the device failed).
    pub fn errors(&self) -> &[RpcErrorMessage] {
        &self.errors
    }

    /// Returns true if the error is cancellation-flavored.
    pub fn is_cancellation(&self) -> bool {
        self.cause.as_ref().is_some_and(RpcCause::is_cancellation)
    }

    /// Returns a one-line description including the error list, for reports.
    pub fn describe(&self) -> String {
        let mut s = format!("[{}] {}", self.tag(), self);
        if let Some(cause) = &self.cause {
            s.push_str(&format!(": {}", cause));
        }
        if !self.errors.is_empty() {
            s.push_str(&format!(": {}", format_errors(&self.errors)));
        }
        s
    }
}

/// Result type for device calls.
pub type CallResult<T> = Result<T, RpcError>;
