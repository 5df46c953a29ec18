//! Flow statistics reads.

use crate::call::RemoteOperation;
use crate::classifier::OperationKind;
use crate::logger::render_payload;
use crate::pending::PendingResult;
use crate::transport::SwitchTransport;
use crate::types::{DeviceId, FlowStatsInput, FlowStatsOutput};

/// Reads the counters of the flows installed on one device.
#[derive(Debug, Clone)]
pub struct GetFlowStats {
    input: FlowStatsInput,
}

impl GetFlowStats {
    /// Reads every table when `table_id` is `None`.
    pub fn new(device: impl Into<DeviceId>, table_id: Option<u8>) -> Self {
        Self {
            input: FlowStatsInput {
                node: device.into(),
                table_id,
            },
        }
    }
}

impl RemoteOperation for GetFlowStats {
    type Output = FlowStatsOutput;

    fn kind(&self) -> OperationKind {
        OperationKind::GetFlowStats
    }

    fn device(&self) -> &DeviceId {
        &self.input.node
    }

    fn payload_for_log(&self) -> String {
        render_payload(&self.input)
    }

    fn dispatch(&self, transport: &dyn SwitchTransport) -> PendingResult<FlowStatsOutput> {
        transport.get_flow_statistics(self.input.clone())
    }
}
