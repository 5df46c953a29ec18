//! Reliable asynchronous flow RPCs to switch devices.
//!
//! This crate wraps the outbound RPCs a controller issues to its switches
//! (add/remove a flow, send a barrier, read flow statistics) so that a switch
//! disappearing, timing out or reporting a failure never leaks a pending call
//! and expected disconnection noise never reaches the error log.
//!
//! # Architecture
//!
//! - [`call`]: [`DeviceCall`], one remote operation with deadline-bounded
//!   waiting, removal handling and classified failures
//! - [`classifier`]: per-operation tables deciding transient vs real failures
//! - [`batch`]: [`BatchDriver`], fires many calls and drains all of them
//! - [`api`]: the typed operations, including [`BarrierCall`]
//! - [`watcher`]: node liveness tracking ([`NodeWatcher`], [`InventoryWatcher`])
//! - [`pending`]: cancellable pending result handles
//! - [`installer`]: [`FlowInstaller`], the caller-facing convenience layer
//! - [`sim`]: an in-process simulated switch transport
//!
//! # Example
//!
//! ```ignore
//! use sonic_flow_rpc::{AddFlowInputBuilder, BatchDriver, LogFacade};
//!
//! async fn push(driver: BatchDriver) -> sonic_flow_rpc::CallResult<()> {
//!     // Every call is awaited even if an earlier one failed.
//!     driver.drain(&LogFacade, std::time::Duration::from_secs(5)).await
//! }
//! ```

pub mod api;
pub mod batch;
pub mod call;
pub mod classifier;
pub mod config;
pub mod error;
pub mod installer;
pub mod logger;
pub mod pending;
pub mod result;
pub mod sim;
pub mod transport;
pub mod types;
pub mod watcher;

pub use api::{AddFlow, BarrierCall, GetFlowStats, RemoveFlow, SendBarrier};
pub use batch::{BatchDriver, BatchedCall, CallBuilder};
pub use call::{DeviceCall, RemoteOperation};
pub use classifier::{Classification, ErrorClassifier, OperationKind};
pub use config::{ConfigError, RpcConfig};
pub use error::{CallResult, ErrorTag, RpcCause, RpcError, RpcErrorKind};
pub use installer::FlowInstaller;
pub use logger::{CallLogger, CallRecord, LogFacade};
pub use pending::{PendingResult, Responder, RpcOutcome};
pub use result::{ErrorSeverity, RpcErrorMessage, RpcResult};
pub use transport::SwitchTransport;
pub use types::{
    AddFlowInput, AddFlowInputBuilder, AddFlowOutput, DeviceId, FlowAction, FlowEntry, FlowMatch,
    FlowStats, FlowStatsInput, FlowStatsOutput, RemoveFlowInput, RemoveFlowInputBuilder,
    RemoveFlowOutput, SendBarrierInput,
};
pub use watcher::{InventoryWatcher, NodeWatcher, RemovalListener};
