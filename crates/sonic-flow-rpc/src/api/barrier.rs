//! Barrier requests.
//!
//! A barrier completes only after the switch has processed every flow-mod it
//! received before it, so awaiting one fences earlier calls on the same
//! device.

use crate::call::{DeviceCall, RemoteOperation};
use crate::classifier::OperationKind;
use crate::logger::render_payload;
use crate::pending::PendingResult;
use crate::transport::SwitchTransport;
use crate::types::{DeviceId, SendBarrierInput};
use crate::watcher::NodeWatcher;
use std::sync::Arc;

/// Sends a barrier to one device.
#[derive(Debug, Clone)]
pub struct SendBarrier {
    input: SendBarrierInput,
}

impl SendBarrier {
    pub fn new(device: impl Into<DeviceId>) -> Self {
        Self {
            input: SendBarrierInput {
                node: device.into(),
            },
        }
    }
}

impl RemoteOperation for SendBarrier {
    type Output = ();

    fn kind(&self) -> OperationKind {
        OperationKind::SendBarrier
    }

    fn device(&self) -> &DeviceId {
        &self.input.node
    }

    fn payload_for_log(&self) -> String {
        render_payload(&self.input)
    }

    fn dispatch(&self, transport: &dyn SwitchTransport) -> PendingResult<()> {
        transport.send_barrier(self.input.clone())
    }
}

/// Device call that sends a barrier.
pub type BarrierCall = DeviceCall<SendBarrier>;

impl DeviceCall<SendBarrier> {
    /// Creates a barrier call for `device`.
    pub fn barrier(
        device: impl Into<DeviceId>,
        watcher: Arc<dyn NodeWatcher>,
        transport: Arc<dyn SwitchTransport>,
    ) -> Self {
        DeviceCall::new(SendBarrier::new(device), watcher, transport)
    }
}
