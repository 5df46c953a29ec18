//! Node liveness watching.
//!
//! Every in-flight device call registers with a [`NodeWatcher`]. When the
//! target device disappears the watcher calls [`RemovalListener::on_removed`]
//! on each call registered against it, which cancels the call's pending
//! handle.

use crate::types::DeviceId;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A call that can be told its target device disappeared.
pub trait RemovalListener: Send + Sync {
    /// Unique id of the call.
    fn call_id(&self) -> u64;

    /// Device the call targets.
    fn device(&self) -> &DeviceId;

    /// Delivers the removal signal. Returns true only for the first signal.
    fn on_removed(&self) -> bool;
}

/// Liveness tracker that device calls register with.
pub trait NodeWatcher: Send + Sync {
    /// Registers an in-flight call.
    fn register(&self, call: Arc<dyn RemovalListener>);

    /// Unregisters a call previously registered.
    fn unregister(&self, call: &dyn RemovalListener);
}

#[derive(Default)]
struct Inventory {
    present: HashSet<DeviceId>,
    calls: HashMap<DeviceId, HashMap<u64, Arc<dyn RemovalListener>>>,
}

/// In-process node inventory.
///
/// Tracks which devices are present and which calls are registered against
/// each. Registering against an absent device delivers the removal signal at
/// once.
#[derive(Default)]
pub struct InventoryWatcher {
    inner: Mutex<Inventory>,
}

impl InventoryWatcher {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory with the given devices present.
    pub fn with_nodes<I, D>(nodes: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        let watcher = Self::new();
        for node in nodes {
            watcher.node_added(node.into());
        }
        watcher
    }

    /// Marks a device as present. Returns false if it already was.
    pub fn node_added(&self, device: DeviceId) -> bool {
        let added = self.inner.lock().present.insert(device.clone());
        if added {
            info!("Node {} added to inventory", device);
        }
        added
    }

    /// Marks a device as gone and signals every call registered against it.
    ///
    /// Returns the number of calls that were signalled.
    pub fn node_removed(&self, device: &DeviceId) -> usize {
        let listeners: Vec<Arc<dyn RemovalListener>> = {
            let mut inner = self.inner.lock();
            inner.present.remove(device);
            inner
                .calls
                .remove(device)
                .map(|calls| calls.into_values().collect())
                .unwrap_or_default()
        };

        info!(
            "Node {} removed from inventory, cancelling {} pending call(s)",
            device,
            listeners.len()
        );

        listeners
            .iter()
            .filter(|listener| listener.on_removed())
            .count()
    }

    /// Returns true if the device is present.
    pub fn is_present(&self, device: &DeviceId) -> bool {
        self.inner.lock().present.contains(device)
    }

    /// Returns the number of calls currently registered.
    pub fn registered_calls(&self) -> usize {
        self.inner.lock().calls.values().map(HashMap::len).sum()
    }

    /// Returns the number of calls registered against one device.
    pub fn registered_calls_for(&self, device: &DeviceId) -> usize {
        self.inner
            .lock()
            .calls
            .get(device)
            .map_or(0, HashMap::len)
    }
}

impl NodeWatcher for InventoryWatcher {
    fn register(&self, call: Arc<dyn RemovalListener>) {
        let present = {
            let mut inner = self.inner.lock();
            let present = inner.present.contains(call.device());
            if present {
                inner
                    .calls
                    .entry(call.device().clone())
                    .or_default()
                    .insert(call.call_id(), Arc::clone(&call));
            }
            present
        };

        if !present {
            debug!(
                "Call {} registered against absent node {}",
                call.call_id(),
                call.device()
            );
            call.on_removed();
        }
    }

    fn unregister(&self, call: &dyn RemovalListener) {
        let mut inner = self.inner.lock();
        if let Some(calls) = inner.calls.get_mut(call.device()) {
            calls.remove(&call.call_id());
            if calls.is_empty() {
                inner.calls.remove(call.device());
            }
        }
    }
}

impl std::fmt::Debug for InventoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("InventoryWatcher")
            .field("present", &inner.present.len())
            .field("registered", &inner.calls.values().map(HashMap::len).sum::<usize>())
            .finish()
    }
}
