//! Structured call logging.
//!
//! Device calls and the batch driver never log through a global directly;
//! they receive a [`CallLogger`] so callers choose where records go and tests
//! can count them. [`LogFacade`] forwards to the `log` crate.

use crate::result::{format_errors, RpcErrorMessage};
use crate::types::DeviceId;
use log::Level;
use std::fmt;

/// Log target used by [`LogFacade`].
pub const LOG_TARGET: &str = "sonic_flow_rpc";

/// One structured log record about a device call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub operation: &'static str,
    pub device: DeviceId,
    pub message: String,
    /// Rendered request payload.
    pub payload: String,
    pub cause: Option<String>,
    pub errors: Vec<RpcErrorMessage>,
}

impl CallRecord {
    /// Creates a record without cause or error list.
    pub fn new(
        operation: &'static str,
        device: DeviceId,
        message: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            device,
            message: message.into(),
            payload: payload.into(),
            cause: None,
            errors: Vec::new(),
        }
    }

    /// Attaches a cause description.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Attaches the device-reported error list.
    pub fn with_errors(mut self, errors: &[RpcErrorMessage]) -> Self {
        self.errors = errors.to_vec();
        self
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: input={}", self.operation, self.message, self.payload)?;
        if let Some(cause) = &self.cause {
            write!(f, ", cause={}", cause)?;
        }
        if !self.errors.is_empty() {
            write!(f, ", errors={}", format_errors(&self.errors))?;
        }
        Ok(())
    }
}

/// Sink for call records.
pub trait CallLogger: Send + Sync {
    /// Emits a record at the given level.
    fn log(&self, level: Level, record: CallRecord);
}

/// [`CallLogger`] backed by the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl CallLogger for LogFacade {
    fn log(&self, level: Level, record: CallRecord) {
        log::log!(target: LOG_TARGET, level, "{}", record);
    }
}

/// Renders a payload for a log record as JSON, falling back to `Debug`.
pub fn render_payload<T: serde::Serialize + fmt::Debug>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| format!("{:?}", payload))
}
