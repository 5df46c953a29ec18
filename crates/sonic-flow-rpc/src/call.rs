//! Device call: one asynchronous remote operation issued to one switch.
//!
//! A [`DeviceCall`] owns the pending result handle of its operation, keeps
//! itself registered with the [`NodeWatcher`] while the operation is in
//! flight, bounds the wait with a deadline and classifies every failure to
//! decide whether it deserves an error log.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──invoke()──> Invoked ──await_result()──┬─> Resolved (success)
//!                          │                       ├─> Resolved (failure)
//!                          │                       └─> Cancelled (timeout)
//!                          └──on_removed()───────────> Cancelled (removal)
//! ```
//!
//! Every terminal state unregisters from the watcher exactly once. A call
//! dropped while still registered cancels its handle and unregisters.

use crate::classifier::{Classification, ErrorClassifier, OperationKind};
use crate::error::{CallResult, RpcCause, RpcError};
use crate::logger::{CallLogger, CallRecord};
use crate::pending::{Cancellable, PendingResult, RpcOutcome};
use crate::result::RpcErrorMessage;
use crate::transport::SwitchTransport;
use crate::types::DeviceId;
use crate::watcher::{NodeWatcher, RemovalListener};
use log::{warn, Level};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// One kind of remote operation together with its request payload.
pub trait RemoteOperation: Send + Sync + 'static {
    /// Payload of a successful result.
    type Output: Send + 'static;

    /// Returns the operation kind.
    fn kind(&self) -> OperationKind;

    /// Returns the target device.
    fn device(&self) -> &DeviceId;

    /// Renders the request payload for log records.
    fn payload_for_log(&self) -> String;

    /// Puts the operation in flight on the transport.
    fn dispatch(&self, transport: &dyn SwitchTransport) -> PendingResult<Self::Output>;

    /// Returns the operation name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns the signature table used to classify failures.
    fn classifier(&self) -> &'static ErrorClassifier {
        self.kind().classifier()
    }
}

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// The part of a call the watcher holds on to.
struct CallShared {
    id: u64,
    device: DeviceId,
    removed: AtomicBool,
    canceller: OnceLock<Arc<dyn Cancellable>>,
}

impl CallShared {
    fn cancel_pending(&self) {
        if let Some(canceller) = self.canceller.get() {
            canceller.cancel();
        }
    }
}

impl RemovalListener for CallShared {
    fn call_id(&self) -> u64 {
        self.id
    }

    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn on_removed(&self) -> bool {
        if self.removed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel_pending();
        true
    }
}

/// A single asynchronous remote operation bound to a watcher and a transport.
pub struct DeviceCall<O: RemoteOperation> {
    op: O,
    shared: Arc<CallShared>,
    pending: OnceLock<PendingResult<O::Output>>,
    invoked: AtomicBool,
    registered: AtomicBool,
    awaited: AtomicBool,
    disconnected: AtomicBool,
    watcher: Arc<dyn NodeWatcher>,
    transport: Arc<dyn SwitchTransport>,
}

impl<O: RemoteOperation> DeviceCall<O> {
    /// Creates a call for `op`. Nothing is sent until [`invoke`](Self::invoke).
    pub fn new(op: O, watcher: Arc<dyn NodeWatcher>, transport: Arc<dyn SwitchTransport>) -> Self {
        let shared = Arc::new(CallShared {
            id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            device: op.device().clone(),
            removed: AtomicBool::new(false),
            canceller: OnceLock::new(),
        });
        Self {
            op,
            shared,
            pending: OnceLock::new(),
            invoked: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            awaited: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            watcher,
            transport,
        }
    }

    /// Dispatches the operation and registers with the watcher.
    ///
    /// The remote operation is in flight when this returns. Returns false,
    /// doing nothing, if the call was already invoked. A call whose device
    /// was removed before invocation is not dispatched; its handle starts
    /// out cancelled.
    pub fn invoke(&self) -> bool {
        if self.invoked.swap(true, Ordering::SeqCst) {
            warn!("{}: call {} invoked more than once", self.name(), self.id());
            return false;
        }

        let pending = if self.removed() {
            PendingResult::cancelled()
        } else {
            self.op.dispatch(self.transport.as_ref())
        };
        let _ = self.shared.canceller.set(pending.canceller());
        let _ = self.pending.set(pending);

        // A removal signal racing with this invocation may have missed the
        // handle.
        if self.removed() {
            self.shared.cancel_pending();
        }

        self.registered.store(true, Ordering::SeqCst);
        let listener: Arc<dyn RemovalListener> = self.shared.clone();
        self.watcher.register(listener);
        true
    }

    /// Waits up to `timeout` for the result.
    ///
    /// Unregisters from the watcher on every path. Failures are classified
    /// and logged to `log` unless they are expected noise (device removal,
    /// transient unavailability). Awaiting a call that was never invoked, or
    /// awaiting it a second time, is logged and leaves the watcher alone.
    pub async fn await_result(&self, timeout: Duration, log: &dyn CallLogger) -> CallResult<O::Output> {
        let Some(pending) = self.pending.get() else {
            return Err(self.misuse("call was not invoked", log));
        };
        if self.awaited.swap(true, Ordering::SeqCst) {
            return Err(self.misuse("result was already awaited", log));
        }

        let outcome = tokio::time::timeout(timeout, pending.wait()).await;
        let result = match outcome {
            Ok(outcome) => self.evaluate(outcome, log),
            Err(_elapsed) => {
                pending.cancel();
                let err = RpcError::timed_out(self.name(), timeout);
                if let Some(cause) = err.cause() {
                    log.log(
                        Level::Error,
                        self.record("Canceled due to timeout").with_cause(cause),
                    );
                }
                Err(err)
            }
        };

        self.unregister_once();
        result
    }

    fn misuse(&self, message: &'static str, log: &dyn CallLogger) -> RpcError {
        log.log(Level::Error, self.record(message));
        RpcError::other(self.name(), message, None)
    }

    fn evaluate(&self, outcome: RpcOutcome<O::Output>, log: &dyn CallLogger) -> CallResult<O::Output> {
        match outcome {
            Ok(result) => {
                let (successful, value, errors) = result.into_parts();
                if !successful {
                    return Err(self.device_failure(errors, log));
                }
                value.ok_or_else(|| {
                    let err = RpcError::other(self.name(), "operation returned no result", None);
                    if !self.removed() {
                        log.log(Level::Error, self.record("RPC returned no result"));
                    }
                    err
                })
            }
            Err(cause) => Err(self.failure(cause, log)),
        }
    }

    fn failure(&self, cause: RpcCause, log: &dyn CallLogger) -> RpcError {
        if cause.is_cancellation() && self.removed() {
            return RpcError::device_removed(self.name(), cause);
        }

        if !self.needs_logging_cause(&cause) {
            self.disconnected.store(true, Ordering::SeqCst);
            return RpcError::unavailable(self.name(), cause);
        }

        if !self.removed() {
            log.log(Level::Error, self.record("Caught an exception").with_cause(&cause));
        }
        RpcError::other(self.name(), cause.to_string(), Some(cause))
    }

    fn device_failure(&self, errors: Vec<RpcErrorMessage>, log: &dyn CallLogger) -> RpcError {
        let cause = errors
            .iter()
            .find_map(|e| e.cause.clone())
            .map(RpcCause::Device);

        if !self.needs_logging_errors(&errors) {
            self.disconnected.store(true, Ordering::SeqCst);
        } else if !self.removed() {
            log.log(
                Level::Error,
                self.record("RPC returned error").with_errors(&errors),
            );
        }
        RpcError::device_failure(self.name(), errors, cause)
    }

    fn unregister_once(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            self.watcher.unregister(self.shared.as_ref());
        }
    }

    fn record(&self, message: &str) -> CallRecord {
        CallRecord::new(self.name(), self.device().clone(), message, self.payload_for_log())
    }

    /// Delivers a removal signal. Only the first signal cancels the pending
    /// handle and returns true.
    pub fn on_removed(&self) -> bool {
        self.shared.on_removed()
    }

    /// Returns true if a failure with this cause should be logged.
    pub fn needs_logging_cause(&self, cause: &RpcCause) -> bool {
        self.op.classifier().classify_cause(cause) == Classification::Real
    }

    /// Returns true if a failure with this error list should be logged.
    pub fn needs_logging_errors(&self, errors: &[RpcErrorMessage]) -> bool {
        self.op.classifier().classify_errors(errors) == Classification::Real
    }

    /// Returns true once a removal signal was delivered.
    pub fn removed(&self) -> bool {
        self.shared.removed.load(Ordering::SeqCst)
    }

    /// Returns true if a failure was classified as transient unavailability.
    pub fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Returns true once the pending handle ended cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.pending.get().is_some_and(PendingResult::is_cancelled)
    }

    /// Returns true once the call was invoked.
    pub fn is_invoked(&self) -> bool {
        self.invoked.load(Ordering::SeqCst)
    }

    /// Returns the unique call id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Returns the operation name.
    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    /// Returns the target device.
    pub fn device(&self) -> &DeviceId {
        self.op.device()
    }

    /// Returns the operation.
    pub fn operation(&self) -> &O {
        &self.op
    }

    /// Renders the request payload. Never blocks on the outcome.
    pub fn payload_for_log(&self) -> String {
        self.op.payload_for_log()
    }
}

impl<O: RemoteOperation> Drop for DeviceCall<O> {
    fn drop(&mut self) {
        if self.registered.load(Ordering::SeqCst) {
            if let Some(pending) = self.pending.get() {
                pending.cancel();
            }
            self.unregister_once();
        }
    }
}

impl<O: RemoteOperation> std::fmt::Debug for DeviceCall<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCall")
            .field("id", &self.id())
            .field("operation", &self.name())
            .field("device", self.device())
            .field("removed", &self.removed())
            .field("disconnected", &self.disconnected())
            .finish()
    }
}
