//! Failure classification for device calls.
//!
//! A failed call is either a *transient* disconnection (the switch dropped off
//! or its session is congested; expected during normal operation and kept out
//! of the error log) or a *real* error. Each operation kind has its own table
//! of signatures; the evaluation algorithm is shared.
//!
//! Classification is pure: the same input always yields the same answer.

use crate::error::{CauseKind, RpcCause};
use crate::result::RpcErrorMessage;
use std::fmt;

/// Classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Expected device unavailability. Not logged.
    Transient,
    /// Anything else. Logged.
    Real,
}

impl Classification {
    /// Returns true if a failure with this classification should be logged.
    pub fn needs_logging(&self) -> bool {
        matches!(self, Classification::Real)
    }
}

/// A message signature: every fragment must occur in the message, in order,
/// ignoring case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub &'static [&'static str]);

impl Signature {
    /// Returns true if `message` contains every fragment in order.
    pub fn matches(&self, message: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let haystack = message.to_ascii_lowercase();
        let mut rest = haystack.as_str();
        for fragment in self.0 {
            let needle = fragment.to_ascii_lowercase();
            match rest.find(&needle) {
                Some(pos) => rest = &rest[pos + needle.len()..],
                None => return false,
            }
        }
        true
    }
}

/// Signature table for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassifier {
    /// Cause kinds that mean the endpoint could not serve the request.
    pub unavailable_causes: &'static [CauseKind],
    /// Device message signatures that denote congestion or disconnection.
    pub transient_messages: &'static [Signature],
}

impl ErrorClassifier {
    /// Classifies a wrapped failure cause.
    pub fn classify_cause(&self, cause: &RpcCause) -> Classification {
        if self.unavailable_causes.contains(&cause.kind()) {
            Classification::Transient
        } else {
            Classification::Real
        }
    }

    /// Classifies a single device message. An absent message is real.
    pub fn classify_message(&self, message: Option<&str>) -> Classification {
        match message {
            Some(msg) if self.transient_messages.iter().any(|sig| sig.matches(msg)) => {
                Classification::Transient
            }
            _ => Classification::Real,
        }
    }

    /// Classifies a device-reported error list.
    ///
    /// The list is transient only if it is non-empty and every entry is
    /// transient.
    pub fn classify_errors(&self, errors: &[RpcErrorMessage]) -> Classification {
        if errors.is_empty() {
            return Classification::Real;
        }
        let all_transient = errors.iter().all(|e| {
            self.classify_message(e.message.as_deref()) == Classification::Transient
        });
        if all_transient {
            Classification::Transient
        } else {
            Classification::Real
        }
    }
}

const DEVICE_DISCONNECTED: Signature = Signature(&["device disconnected"]);
const XID_QUEUE_FULL: Signature = Signature(&["queue", "reserve", "transaction id"]);
const CONNECTION_CLOSED: Signature = Signature(&["connection", "closed"]);

const UNAVAILABLE: &[CauseKind] = &[CauseKind::Unavailable];

/// Signatures shared by add-flow, send-barrier and statistics calls.
pub static DEFAULT_CLASSIFIER: ErrorClassifier = ErrorClassifier {
    unavailable_causes: UNAVAILABLE,
    transient_messages: &[DEVICE_DISCONNECTED],
};

/// Remove-flow calls also treat transaction-id exhaustion and a closing
/// connection as transient.
pub static REMOVE_FLOW_CLASSIFIER: ErrorClassifier = ErrorClassifier {
    unavailable_causes: UNAVAILABLE,
    transient_messages: &[DEVICE_DISCONNECTED, XID_QUEUE_FULL, CONNECTION_CLOSED],
};

/// Kind of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    AddFlow,
    RemoveFlow,
    SendBarrier,
    GetFlowStats,
}

impl OperationKind {
    /// Returns the operation name used in log records and errors.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::AddFlow => "add-flow",
            OperationKind::RemoveFlow => "remove-flow",
            OperationKind::SendBarrier => "send-barrier",
            OperationKind::GetFlowStats => "get-flow-statistics",
        }
    }

    /// Returns the signature table for this kind.
    pub fn classifier(&self) -> &'static ErrorClassifier {
        match self {
            OperationKind::RemoveFlow => &REMOVE_FLOW_CLASSIFIER,
            OperationKind::AddFlow | OperationKind::SendBarrier | OperationKind::GetFlowStats => {
                &DEFAULT_CLASSIFIER
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
