//! Device identity and flow RPC payload types.
//!
//! The request payloads defined here are what the transport stub sends to a
//! switch. They are serializable so that diagnostics can echo the full request
//! into the log when a call fails.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a switch device as known to the node inventory
/// (e.g. `openflow:1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Match fields of a forwarding rule.
///
/// Absent fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<String>,
}

impl FlowMatch {
    /// Returns a match that accepts every packet.
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns true if no field is constrained.
    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }
}

/// Action applied to packets matching a flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum FlowAction {
    /// Forward out of a switch port.
    Output { port: u32 },
    /// Punt to the controller.
    Controller,
    /// Push or rewrite the VLAN tag.
    SetVlan { vlan_id: u16 },
    /// Strip the VLAN tag.
    PopVlan,
    /// Discard the packet.
    Drop,
}

/// A forwarding rule as installed into a switch flow table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEntry {
    pub table_id: u8,
    pub priority: u16,
    pub cookie: u64,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
}

impl FlowEntry {
    /// Creates a permanent flow entry with no actions (drop by default).
    pub fn new(table_id: u8, priority: u16, flow_match: FlowMatch) -> Self {
        Self {
            table_id,
            priority,
            cookie: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            flow_match,
            actions: Vec::new(),
        }
    }

    /// Sets the cookie.
    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    /// Sets the idle and hard timeouts, in seconds.
    pub fn with_timeouts(mut self, idle: u16, hard: u16) -> Self {
        self.idle_timeout = idle;
        self.hard_timeout = hard;
        self
    }

    /// Appends an action.
    pub fn with_action(mut self, action: FlowAction) -> Self {
        self.actions.push(action);
        self
    }
}

// ============================================================================
// RPC inputs and outputs
// ============================================================================

/// Input of the add-flow RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFlowInput {
    pub node: DeviceId,
    pub flow: FlowEntry,
    /// Asks the switch to fence this flow-mod with a barrier.
    pub barrier: bool,
}

/// Output of the add-flow RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFlowOutput {
    pub transaction_id: u64,
}

/// Input of the remove-flow RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFlowInput {
    pub node: DeviceId,
    /// Table to remove from; `None` means every table.
    pub table_id: Option<u8>,
    pub cookie: u64,
    pub cookie_mask: u64,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub flow_match: Option<FlowMatch>,
    /// Strict removal matches priority and match fields exactly.
    pub strict: bool,
    pub barrier: bool,
}

/// Output of the remove-flow RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFlowOutput {
    pub transaction_id: u64,
}

/// Input of the send-barrier RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBarrierInput {
    pub node: DeviceId,
}

/// Input of the flow statistics RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatsInput {
    pub node: DeviceId,
    /// Restrict to a single table; `None` reads every table.
    pub table_id: Option<u8>,
}

/// Counters of a single installed flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub table_id: u8,
    pub priority: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub duration_secs: u32,
}

/// Output of the flow statistics RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatsOutput {
    pub stats: Vec<FlowStats>,
}

// ============================================================================
// Input builders
// ============================================================================

/// Builder for [`AddFlowInput`].
#[derive(Debug, Clone)]
pub struct AddFlowInputBuilder {
    node: DeviceId,
    flow: FlowEntry,
    barrier: bool,
}

impl AddFlowInputBuilder {
    /// Starts an add-flow request for the given device.
    pub fn new(node: impl Into<DeviceId>, flow: FlowEntry) -> Self {
        Self {
            node: node.into(),
            flow,
            barrier: false,
        }
    }

    /// Sets the barrier flag.
    pub fn barrier(mut self, barrier: bool) -> Self {
        self.barrier = barrier;
        self
    }

    /// Returns the target device.
    pub fn node(&self) -> &DeviceId {
        &self.node
    }

    /// Returns true if the barrier flag is set.
    pub fn is_barrier(&self) -> bool {
        self.barrier
    }

    pub(crate) fn set_barrier_flag(&mut self, barrier: bool) {
        self.barrier = barrier;
    }

    /// Builds the input.
    pub fn build(self) -> AddFlowInput {
        AddFlowInput {
            node: self.node,
            flow: self.flow,
            barrier: self.barrier,
        }
    }
}

/// Builder for [`RemoveFlowInput`].
#[derive(Debug, Clone)]
pub struct RemoveFlowInputBuilder {
    input: RemoveFlowInput,
}

impl RemoveFlowInputBuilder {
    /// Starts a remove-flow request that removes every flow on the device.
    pub fn new(node: impl Into<DeviceId>) -> Self {
        Self {
            input: RemoveFlowInput {
                node: node.into(),
                table_id: None,
                cookie: 0,
                cookie_mask: 0,
                flow_match: None,
                strict: false,
                barrier: false,
            },
        }
    }

    /// Starts a strict removal of exactly the given flow.
    pub fn for_flow(node: impl Into<DeviceId>, flow: &FlowEntry) -> Self {
        Self::new(node)
            .table(flow.table_id)
            .cookie(flow.cookie, u64::MAX)
            .flow_match(flow.flow_match.clone())
            .strict(true)
    }

    /// Restricts the removal to one table.
    pub fn table(mut self, table_id: u8) -> Self {
        self.input.table_id = Some(table_id);
        self
    }

    /// Restricts the removal to flows whose masked cookie matches.
    pub fn cookie(mut self, cookie: u64, mask: u64) -> Self {
        self.input.cookie = cookie;
        self.input.cookie_mask = mask;
        self
    }

    /// Restricts the removal to flows with the given match.
    pub fn flow_match(mut self, flow_match: FlowMatch) -> Self {
        self.input.flow_match = Some(flow_match);
        self
    }

    /// Sets strict matching.
    pub fn strict(mut self, strict: bool) -> Self {
        self.input.strict = strict;
        self
    }

    /// Sets the barrier flag.
    pub fn barrier(mut self, barrier: bool) -> Self {
        self.input.barrier = barrier;
        self
    }

    /// Returns the target device.
    pub fn node(&self) -> &DeviceId {
        &self.input.node
    }

    pub(crate) fn set_barrier_flag(&mut self, barrier: bool) {
        self.input.barrier = barrier;
    }

    /// Builds the input.
    pub fn build(self) -> RemoveFlowInput {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_id() {
        let id = DeviceId::new("openflow:1");
        assert_eq!(id.as_str(), "openflow:1");
        assert_eq!(id.to_string(), "openflow:1");
        assert_eq!(DeviceId::from("openflow:1"), id);
    }

    #[test]
    fn test_device_id_serializes_as_string() {
        let json = serde_json::to_string(&DeviceId::new("openflow:7")).unwrap();
        assert_eq!(json, "\"openflow:7\"");
    }

    #[test]
    fn test_flow_match_wildcard() {
        assert!(FlowMatch::any().is_wildcard());
        let m = FlowMatch {
            in_port: Some(3),
            ..Default::default()
        };
        assert!(!m.is_wildcard());
    }

    #[test]
    fn test_add_flow_builder() {
        let flow = FlowEntry::new(0, 100, FlowMatch::any())
            .with_cookie(0xabc)
            .with_action(FlowAction::Output { port: 2 });
        let input = AddFlowInputBuilder::new("openflow:1", flow.clone())
            .barrier(true)
            .build();

        assert_eq!(input.node, DeviceId::new("openflow:1"));
        assert_eq!(input.flow, flow);
        assert!(input.barrier);
    }

    #[test]
    fn test_remove_flow_builder_for_flow() {
        let flow = FlowEntry::new(2, 10, FlowMatch {
            eth_type: Some(0x0800),
            ..Default::default()
        })
        .with_cookie(42);
        let input = RemoveFlowInputBuilder::for_flow("openflow:9", &flow).build();

        assert_eq!(input.table_id, Some(2));
        assert_eq!(input.cookie, 42);
        assert_eq!(input.cookie_mask, u64::MAX);
        assert_eq!(input.flow_match, Some(flow.flow_match));
        assert!(input.strict);
        assert!(!input.barrier);
    }

    #[test]
    fn test_remove_all_builder_has_no_match() {
        let input = RemoveFlowInputBuilder::new("openflow:9").build();
        assert_eq!(input.table_id, None);
        assert_eq!(input.flow_match, None);
        assert!(!input.strict);
    }

    #[test]
    fn test_flow_entry_json_uses_match_key() {
        let flow = FlowEntry::new(0, 1, FlowMatch {
            in_port: Some(1),
            ..Default::default()
        })
        .with_action(FlowAction::Drop);
        let json = serde_json::to_string(&flow).unwrap();
        assert!(json.contains("\"match\":{\"in_port\":1}"));
        assert!(json.contains("\"type\":\"drop\""));
    }
}
