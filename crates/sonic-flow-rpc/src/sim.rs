//! In-process simulated switch.
//!
//! [`SimSwitch`] implements [`SwitchTransport`] without a network. Each
//! device has a default [`Behavior`] and a FIFO script of behaviours that
//! override it one request at a time, which makes every failure path of a
//! device call reproducible. Successful flow-mods update a per-device flow
//! table so statistics reads reflect what was installed.
//!
//! The simulator backs tests and dry runs. Its request log keeps only the
//! most recent [`REQUEST_LOG_CAPACITY`] entries, and parked responders are
//! dropped once their caller cancels them.

use crate::error::RpcCause;
use crate::pending::{PendingResult, Responder};
use crate::result::RpcErrorMessage;
use crate::transport::SwitchTransport;
use crate::types::{
    AddFlowInput, AddFlowOutput, DeviceId, FlowEntry, FlowStats, FlowStatsInput, FlowStatsOutput,
    RemoveFlowInput, RemoveFlowOutput, SendBarrierInput,
};
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// How the simulated device answers one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Resolve with a successful result.
    Succeed,
    /// Resolve with a failed result carrying these errors.
    Fail(Vec<RpcErrorMessage>),
    /// Resolve with an operation-not-available cause.
    Unavailable(String),
    /// Resolve with a transport failure.
    TransportError(String),
    /// Never resolve. The responder is parked so its cancellation can be
    /// observed.
    Hang,
    /// Drop the responder without answering.
    Abandon,
}

/// A request as received by the simulated switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimRequest {
    AddFlow(AddFlowInput),
    RemoveFlow(RemoveFlowInput),
    Barrier(SendBarrierInput),
    FlowStats(FlowStatsInput),
}

impl SimRequest {
    pub fn node(&self) -> &DeviceId {
        match self {
            SimRequest::AddFlow(input) => &input.node,
            SimRequest::RemoveFlow(input) => &input.node,
            SimRequest::Barrier(input) => &input.node,
            SimRequest::FlowStats(input) => &input.node,
        }
    }
}

trait Parked: Send {
    fn is_cancelled(&self) -> bool;
}

impl<T: Send> Parked for Responder<T> {
    fn is_cancelled(&self) -> bool {
        Responder::is_cancelled(self)
    }
}

struct SimDevice {
    default: Behavior,
    script: VecDeque<Behavior>,
    flows: Vec<FlowEntry>,
    stats: Option<Vec<FlowStats>>,
}

impl SimDevice {
    fn next_behavior(&mut self) -> Behavior {
        self.script
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }

    fn install(&mut self, flow: FlowEntry) {
        self.flows.retain(|f| {
            !(f.table_id == flow.table_id
                && f.priority == flow.priority
                && f.flow_match == flow.flow_match)
        });
        self.flows.push(flow);
    }

    fn remove(&mut self, input: &RemoveFlowInput) -> usize {
        let before = self.flows.len();
        self.flows.retain(|f| !removal_selects(input, f));
        before - self.flows.len()
    }

    fn statistics(&self, table_id: Option<u8>) -> Vec<FlowStats> {
        let selected = |id: u8| table_id.map_or(true, |t| t == id);
        match &self.stats {
            Some(stats) => stats
                .iter()
                .filter(|s| selected(s.table_id))
                .cloned()
                .collect(),
            None => self
                .flows
                .iter()
                .filter(|f| selected(f.table_id))
                .map(|f| FlowStats {
                    table_id: f.table_id,
                    priority: f.priority,
                    cookie: f.cookie,
                    packet_count: 0,
                    byte_count: 0,
                    duration_secs: 0,
                })
                .collect(),
        }
    }
}

fn removal_selects(input: &RemoveFlowInput, flow: &FlowEntry) -> bool {
    if input.table_id.is_some_and(|t| t != flow.table_id) {
        return false;
    }
    if flow.cookie & input.cookie_mask != input.cookie & input.cookie_mask {
        return false;
    }
    match &input.flow_match {
        Some(m) if input.strict => *m == flow.flow_match,
        Some(m) => m.is_wildcard() || *m == flow.flow_match,
        None => true,
    }
}

/// Number of requests retained by [`SimSwitch::requests`].
pub const REQUEST_LOG_CAPACITY: usize = 1024;

#[derive(Default)]
struct SimState {
    devices: HashMap<DeviceId, SimDevice>,
    requests: VecDeque<SimRequest>,
    parked: Vec<Box<dyn Parked>>,
    pruned_cancelled: usize,
    next_xid: u64,
}

impl SimState {
    fn log_request(&mut self, request: SimRequest) {
        if self.requests.len() == REQUEST_LOG_CAPACITY {
            self.requests.pop_front();
        }
        self.requests.push_back(request);
    }

    fn park(&mut self, responder: Box<dyn Parked>) {
        let before = self.parked.len();
        self.parked.retain(|p| !p.is_cancelled());
        self.pruned_cancelled += before - self.parked.len();
        self.parked.push(responder);
    }
}

/// Simulated switch fleet.
#[derive(Default)]
pub struct SimSwitch {
    state: Mutex<SimState>,
}

impl SimSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a device answering with `behavior` by default.
    pub fn add_device(&self, device: impl Into<DeviceId>, behavior: Behavior) {
        let device = device.into();
        debug!("SimSwitch: device {} connected ({:?})", device, behavior);
        self.state.lock().devices.insert(
            device,
            SimDevice {
                default: behavior,
                script: VecDeque::new(),
                flows: Vec::new(),
                stats: None,
            },
        );
    }

    /// Disconnects a device. Later requests to it are unavailable. Parked
    /// requests stay parked.
    pub fn disconnect(&self, device: &DeviceId) -> bool {
        let removed = self.state.lock().devices.remove(device).is_some();
        if removed {
            debug!("SimSwitch: device {} disconnected", device);
        }
        removed
    }

    /// Queues behaviours consumed one per request before the default applies.
    pub fn script<I>(&self, device: impl Into<DeviceId>, behaviors: I)
    where
        I: IntoIterator<Item = Behavior>,
    {
        let device = device.into();
        if let Some(dev) = self.state.lock().devices.get_mut(&device) {
            dev.script.extend(behaviors);
        }
    }

    /// Replaces the default behaviour of a device.
    pub fn set_default(&self, device: &DeviceId, behavior: Behavior) {
        if let Some(dev) = self.state.lock().devices.get_mut(device) {
            dev.default = behavior;
        }
    }

    /// Makes statistics reads return `stats` instead of the installed flows.
    pub fn set_flow_stats(&self, device: &DeviceId, stats: Vec<FlowStats>) {
        if let Some(dev) = self.state.lock().devices.get_mut(device) {
            dev.stats = Some(stats);
        }
    }

    /// Returns the retained requests, oldest first.
    pub fn requests(&self) -> Vec<SimRequest> {
        self.state.lock().requests.iter().cloned().collect()
    }

    /// Returns the retained requests and clears the log.
    pub fn take_requests(&self) -> Vec<SimRequest> {
        std::mem::take(&mut self.state.lock().requests).into()
    }

    /// Returns the flows currently installed on a device.
    pub fn installed_flows(&self, device: &DeviceId) -> Vec<FlowEntry> {
        self.state
            .lock()
            .devices
            .get(device)
            .map(|dev| dev.flows.clone())
            .unwrap_or_default()
    }

    /// Returns the number of unanswered requests still awaited by a caller.
    pub fn hung_requests(&self) -> usize {
        self.state
            .lock()
            .parked
            .iter()
            .filter(|p| !p.is_cancelled())
            .count()
    }

    /// Returns how many unanswered requests were cancelled by their caller.
    pub fn cancelled_hung_requests(&self) -> usize {
        let state = self.state.lock();
        state.pruned_cancelled + state.parked.iter().filter(|p| p.is_cancelled()).count()
    }

    fn respond<T, F>(&self, request: SimRequest, on_success: F) -> PendingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SimDevice, u64) -> T,
    {
        let (pending, responder) = PendingResult::channel();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.next_xid += 1;
        let xid = state.next_xid;
        let node = request.node().clone();
        trace!("SimSwitch: request {} to {}: {:?}", xid, node, request);
        state.log_request(request);

        let Some(device) = state.devices.get_mut(&node) else {
            responder.fail_with(RpcCause::Unavailable(format!(
                "node {} is not connected",
                node
            )));
            return pending;
        };

        match device.next_behavior() {
            Behavior::Succeed => {
                responder.succeed(on_success(device, xid));
            }
            Behavior::Fail(errors) => {
                responder.fail(errors);
            }
            Behavior::Unavailable(msg) => {
                responder.fail_with(RpcCause::Unavailable(msg));
            }
            Behavior::TransportError(msg) => {
                responder.fail_with(RpcCause::Transport(msg));
            }
            Behavior::Hang => state.park(Box::new(responder)),
            Behavior::Abandon => drop(responder),
        }
        pending
    }
}

impl SwitchTransport for SimSwitch {
    fn add_flow(&self, input: AddFlowInput) -> PendingResult<AddFlowOutput> {
        let flow = input.flow.clone();
        self.respond(SimRequest::AddFlow(input), move |device, xid| {
            device.install(flow);
            AddFlowOutput {
                transaction_id: xid,
            }
        })
    }

    fn remove_flow(&self, input: RemoveFlowInput) -> PendingResult<RemoveFlowOutput> {
        let selector = input.clone();
        self.respond(SimRequest::RemoveFlow(input), move |device, xid| {
            let removed = device.remove(&selector);
            trace!("SimSwitch: removed {} flow(s)", removed);
            RemoveFlowOutput {
                transaction_id: xid,
            }
        })
    }

    fn send_barrier(&self, input: SendBarrierInput) -> PendingResult<()> {
        self.respond(SimRequest::Barrier(input), |_, _| ())
    }

    fn get_flow_statistics(&self, input: FlowStatsInput) -> PendingResult<FlowStatsOutput> {
        let table_id = input.table_id;
        self.respond(SimRequest::FlowStats(input), move |device, _| FlowStatsOutput {
            stats: device.statistics(table_id),
        })
    }
}

impl std::fmt::Debug for SimSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimSwitch")
            .field("devices", &state.devices.len())
            .field("requests", &state.requests.len())
            .field("parked", &state.parked.len())
            .finish()
    }
}
