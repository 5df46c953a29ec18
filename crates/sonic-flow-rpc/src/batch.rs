//! Batch driver.
//!
//! Fires an ordered sequence of independent device calls, then drains all of
//! them against the same per-call deadline. The drain never stops early:
//! every call is awaited and its outcome logged, and only after the full pass
//! is the earliest failure (by position) returned.

use crate::api::BarrierCall;
use crate::call::{DeviceCall, RemoteOperation};
use crate::error::{CallResult, RpcCause};
use crate::logger::{CallLogger, CallRecord};
use crate::result::RpcErrorMessage;
use crate::transport::SwitchTransport;
use crate::types::DeviceId;
use crate::watcher::NodeWatcher;
use async_trait::async_trait;
use log::{debug, Level};
use std::sync::Arc;
use std::time::Duration;

/// Type-erased view of a fired device call.
#[async_trait]
pub trait BatchedCall: Send + Sync {
    /// Returns the operation name.
    fn name(&self) -> &'static str;

    /// Returns the target device.
    fn device(&self) -> &DeviceId;

    /// Renders the request payload.
    fn payload_for_log(&self) -> String;

    /// Returns true once a removal signal was delivered.
    fn removed(&self) -> bool;

    /// Returns true if a failure was classified as transient.
    fn disconnected(&self) -> bool;

    /// Returns true if a failure with this cause would be logged.
    fn needs_logging_cause(&self, cause: &RpcCause) -> bool;

    /// Returns true if a failure with this error list would be logged.
    fn needs_logging_errors(&self, errors: &[RpcErrorMessage]) -> bool;

    /// Awaits the call, discarding its output.
    async fn settle(&self, timeout: Duration, log: &dyn CallLogger) -> CallResult<()>;
}

#[async_trait]
impl<O: RemoteOperation> BatchedCall for DeviceCall<O> {
    fn name(&self) -> &'static str {
        DeviceCall::name(self)
    }

    fn device(&self) -> &DeviceId {
        DeviceCall::device(self)
    }

    fn payload_for_log(&self) -> String {
        DeviceCall::payload_for_log(self)
    }

    fn removed(&self) -> bool {
        DeviceCall::removed(self)
    }

    fn disconnected(&self) -> bool {
        DeviceCall::disconnected(self)
    }

    fn needs_logging_cause(&self, cause: &RpcCause) -> bool {
        DeviceCall::needs_logging_cause(self, cause)
    }

    fn needs_logging_errors(&self, errors: &[RpcErrorMessage]) -> bool {
        DeviceCall::needs_logging_errors(self, errors)
    }

    async fn settle(&self, timeout: Duration, log: &dyn CallLogger) -> CallResult<()> {
        self.await_result(timeout, log).await.map(|_| ())
    }
}

/// An input builder the batch driver can turn into a device call.
///
/// Builders are accepted instead of finished inputs so the ordering flag can
/// still be placed before the call is fired.
pub trait CallBuilder {
    type Operation: RemoteOperation;

    /// Returns the target device.
    fn device(&self) -> &DeviceId;

    /// Asks the transport to fence this call. Builders of operations without
    /// an ordering flag ignore it.
    fn set_barrier(&mut self, _barrier: bool) {}

    /// Finishes the builder.
    fn build_operation(self) -> Self::Operation;
}

/// Fires and drains a batch of device calls.
pub struct BatchDriver {
    watcher: Arc<dyn NodeWatcher>,
    transport: Arc<dyn SwitchTransport>,
    calls: Vec<Arc<dyn BatchedCall>>,
}

impl BatchDriver {
    pub fn new(watcher: Arc<dyn NodeWatcher>, transport: Arc<dyn SwitchTransport>) -> Self {
        Self {
            watcher,
            transport,
            calls: Vec::new(),
        }
    }

    /// Builds, fires and appends one call.
    pub fn invoke<B: CallBuilder>(&mut self, builder: B) {
        let call = DeviceCall::new(
            builder.build_operation(),
            Arc::clone(&self.watcher),
            Arc::clone(&self.transport),
        );
        call.invoke();
        self.calls.push(Arc::new(call));
    }

    /// Fires every builder in order. With `fence` set, the last builder
    /// targeting each device carries the barrier flag.
    pub fn invoke_all<B, I>(&mut self, builders: I, fence: bool)
    where
        B: CallBuilder,
        I: IntoIterator<Item = B>,
    {
        let mut builders: Vec<B> = builders.into_iter().collect();
        if fence {
            let mut fenced: Vec<DeviceId> = Vec::new();
            for builder in builders.iter_mut().rev() {
                if !fenced.contains(builder.device()) {
                    fenced.push(builder.device().clone());
                    builder.set_barrier(true);
                }
            }
        }
        for builder in builders {
            self.invoke(builder);
        }
    }

    /// Fires a stand-alone barrier to `device` and appends it.
    pub fn fence(&mut self, device: impl Into<DeviceId>) {
        let call = BarrierCall::barrier(
            device,
            Arc::clone(&self.watcher),
            Arc::clone(&self.transport),
        );
        call.invoke();
        self.calls.push(Arc::new(call));
    }

    /// Every call is dispatched by `invoke` itself, so this only marks the
    /// synchronization point.
    pub fn flush(&self) {
        debug!("Batch of {} call(s) flushed", self.calls.len());
    }

    /// Returns the number of calls fired.
    pub fn size(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns the calls in invocation order.
    pub fn calls(&self) -> &[Arc<dyn BatchedCall>] {
        &self.calls
    }

    /// Awaits every call in invocation order, each with `timeout`.
    ///
    /// Successes are logged at trace level with their payload; failures log
    /// according to their own classification. Returns the first failure once
    /// every call has been observed.
    pub async fn drain(self, log: &dyn CallLogger, timeout: Duration) -> CallResult<()> {
        let mut first_failure = None;
        let mut failures = 0_usize;

        for call in &self.calls {
            match call.settle(timeout, log).await {
                Ok(()) => log.log(
                    Level::Trace,
                    CallRecord::new(
                        call.name(),
                        call.device().clone(),
                        "RPC completed",
                        call.payload_for_log(),
                    ),
                ),
                Err(err) => {
                    failures += 1;
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        debug!(
            "Drained batch of {} call(s), {} failed",
            self.calls.len(),
            failures
        );

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BatchDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDriver")
            .field("calls", &self.calls.len())
            .finish()
    }
}
