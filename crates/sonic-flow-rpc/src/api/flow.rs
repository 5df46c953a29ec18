//! Flow installation and removal.

use crate::batch::CallBuilder;
use crate::call::RemoteOperation;
use crate::classifier::OperationKind;
use crate::logger::render_payload;
use crate::pending::PendingResult;
use crate::transport::SwitchTransport;
use crate::types::{
    AddFlowInput, AddFlowInputBuilder, AddFlowOutput, DeviceId, RemoveFlowInput,
    RemoveFlowInputBuilder, RemoveFlowOutput,
};

/// Installs one flow entry.
#[derive(Debug, Clone)]
pub struct AddFlow {
    input: AddFlowInput,
}

impl AddFlow {
    pub fn new(input: AddFlowInput) -> Self {
        Self { input }
    }

    pub fn input(&self) -> &AddFlowInput {
        &self.input
    }
}

impl RemoteOperation for AddFlow {
    type Output = AddFlowOutput;

    fn kind(&self) -> OperationKind {
        OperationKind::AddFlow
    }

    fn device(&self) -> &DeviceId {
        &self.input.node
    }

    fn payload_for_log(&self) -> String {
        render_payload(&self.input)
    }

    fn dispatch(&self, transport: &dyn SwitchTransport) -> PendingResult<AddFlowOutput> {
        transport.add_flow(self.input.clone())
    }
}

impl CallBuilder for AddFlowInputBuilder {
    type Operation = AddFlow;

    fn device(&self) -> &DeviceId {
        self.node()
    }

    fn set_barrier(&mut self, barrier: bool) {
        self.set_barrier_flag(barrier);
    }

    fn build_operation(self) -> AddFlow {
        AddFlow::new(self.build())
    }
}

/// Removes the flows selected by a remove-flow input.
///
/// Uses the remove-flow classifier table, which also treats transaction-id
/// exhaustion and a closing connection as transient.
#[derive(Debug, Clone)]
pub struct RemoveFlow {
    input: RemoveFlowInput,
}

impl RemoveFlow {
    pub fn new(input: RemoveFlowInput) -> Self {
        Self { input }
    }

    pub fn input(&self) -> &RemoveFlowInput {
        &self.input
    }
}

impl RemoteOperation for RemoveFlow {
    type Output = RemoveFlowOutput;

    fn kind(&self) -> OperationKind {
        OperationKind::RemoveFlow
    }

    fn device(&self) -> &DeviceId {
        &self.input.node
    }

    fn payload_for_log(&self) -> String {
        render_payload(&self.input)
    }

    fn dispatch(&self, transport: &dyn SwitchTransport) -> PendingResult<RemoveFlowOutput> {
        transport.remove_flow(self.input.clone())
    }
}

impl CallBuilder for RemoveFlowInputBuilder {
    type Operation = RemoveFlow;

    fn device(&self) -> &DeviceId {
        self.node()
    }

    fn set_barrier(&mut self, barrier: bool) {
        self.set_barrier_flag(barrier);
    }

    fn build_operation(self) -> RemoveFlow {
        RemoveFlow::new(self.build())
    }
}
