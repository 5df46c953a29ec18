//! Transport stub seen by device calls.

use crate::pending::PendingResult;
use crate::types::{
    AddFlowInput, AddFlowOutput, FlowStatsInput, FlowStatsOutput, RemoveFlowInput,
    RemoveFlowOutput, SendBarrierInput,
};

/// Asynchronous switch RPC service.
///
/// Each method puts the request in flight and returns its pending result
/// handle immediately; none of them block. Implementations that cannot reach
/// the device resolve the handle with [`crate::RpcCause::Unavailable`].
pub trait SwitchTransport: Send + Sync {
    fn add_flow(&self, input: AddFlowInput) -> PendingResult<AddFlowOutput>;

    fn remove_flow(&self, input: RemoveFlowInput) -> PendingResult<RemoveFlowOutput>;

    fn send_barrier(&self, input: SendBarrierInput) -> PendingResult<()>;

    fn get_flow_statistics(&self, input: FlowStatsInput) -> PendingResult<FlowStatsOutput>;
}
