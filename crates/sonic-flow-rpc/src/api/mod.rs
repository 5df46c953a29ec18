//! Typed remote operations.
//!
//! Each submodule wraps one RPC of the switch transport as a
//! [`RemoteOperation`](crate::call::RemoteOperation) so it can be driven by a
//! [`DeviceCall`](crate::call::DeviceCall):
//!
//! - [`flow`]: flow installation and removal
//! - [`barrier`]: barrier requests fencing earlier flow-mods
//! - [`stats`]: flow statistics reads

pub mod barrier;
pub mod flow;
pub mod stats;

pub use barrier::{BarrierCall, SendBarrier};
pub use flow::{AddFlow, RemoveFlow};
pub use stats::GetFlowStats;
