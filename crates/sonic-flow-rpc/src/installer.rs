//! Flow installer.
//!
//! Caller-facing layer over device calls and the batch driver: installs or
//! removes a set of flows on one node, sends stand-alone barriers and reads
//! statistics back, with deadlines taken from [`RpcConfig`].

use crate::api::{BarrierCall, GetFlowStats};
use crate::batch::BatchDriver;
use crate::call::DeviceCall;
use crate::config::RpcConfig;
use crate::error::CallResult;
use crate::logger::CallLogger;
use crate::transport::SwitchTransport;
use crate::types::{AddFlowInputBuilder, DeviceId, FlowEntry, FlowStats, RemoveFlowInputBuilder};
use crate::watcher::NodeWatcher;
use log::{info, warn};
use std::sync::Arc;

/// Installs and removes flows on switches.
pub struct FlowInstaller {
    watcher: Arc<dyn NodeWatcher>,
    transport: Arc<dyn SwitchTransport>,
    config: RpcConfig,
}

impl FlowInstaller {
    pub fn new(
        watcher: Arc<dyn NodeWatcher>,
        transport: Arc<dyn SwitchTransport>,
        config: RpcConfig,
    ) -> Self {
        Self {
            watcher,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Returns an empty batch bound to this installer's watcher and transport.
    pub fn batch(&self) -> BatchDriver {
        BatchDriver::new(Arc::clone(&self.watcher), Arc::clone(&self.transport))
    }

    /// Fires one add-flow call per entry without waiting for the results.
    pub fn begin_install(&self, node: &DeviceId, flows: Vec<FlowEntry>) -> BatchDriver {
        let mut batch = self.batch();
        batch.invoke_all(
            flows
                .into_iter()
                .map(|flow| AddFlowInputBuilder::new(node.clone(), flow)),
            self.config.fence_batches,
        );
        batch.flush();
        batch
    }

    /// Fires one remove-flow call per builder without waiting for the results.
    pub fn begin_uninstall(&self, removals: Vec<RemoveFlowInputBuilder>) -> BatchDriver {
        let mut batch = self.batch();
        batch.invoke_all(removals, self.config.fence_batches);
        batch.flush();
        batch
    }

    /// Drains a flow-mod batch with the flow-mod deadline.
    pub async fn complete(&self, batch: BatchDriver, log: &dyn CallLogger) -> CallResult<usize> {
        let count = batch.size();
        batch.drain(log, self.config.flow_mod_timeout()).await?;
        Ok(count)
    }

    /// Installs `flows` on `node`. Returns the number of flows installed.
    pub async fn install(
        &self,
        node: &DeviceId,
        flows: Vec<FlowEntry>,
        log: &dyn CallLogger,
    ) -> CallResult<usize> {
        let batch = self.begin_install(node, flows);
        let result = self.complete(batch, log).await;
        match &result {
            Ok(count) => info!("Installed {} flow(s) on {}", count, node),
            Err(e) => warn!("Flow installation on {} failed: {}", node, e),
        }
        result
    }

    /// Removes the flows selected by `removals` from `node`.
    pub async fn uninstall(
        &self,
        node: &DeviceId,
        removals: Vec<RemoveFlowInputBuilder>,
        log: &dyn CallLogger,
    ) -> CallResult<usize> {
        let removals: Vec<_> = removals
            .into_iter()
            .filter(|r| {
                let same = r.node() == node;
                if !same {
                    warn!("Skipping removal for {} in batch for {}", r.node(), node);
                }
                same
            })
            .collect();
        let batch = self.begin_uninstall(removals);
        let result = self.complete(batch, log).await;
        if let Ok(count) = &result {
            info!("Sent {} flow removal(s) to {}", count, node);
        }
        result
    }

    /// Sends a barrier and waits for it.
    pub async fn barrier(&self, node: &DeviceId, log: &dyn CallLogger) -> CallResult<()> {
        let call = BarrierCall::barrier(
            node.clone(),
            Arc::clone(&self.watcher),
            Arc::clone(&self.transport),
        );
        call.invoke();
        call.await_result(self.config.barrier_timeout(), log).await
    }

    /// Reads flow statistics, restricted to one table when `table_id` is set.
    pub async fn read_statistics(
        &self,
        node: &DeviceId,
        table_id: Option<u8>,
        log: &dyn CallLogger,
    ) -> CallResult<Vec<FlowStats>> {
        let call = DeviceCall::new(
            GetFlowStats::new(node.clone(), table_id),
            Arc::clone(&self.watcher),
            Arc::clone(&self.transport),
        );
        call.invoke();
        let output = call.await_result(self.config.stats_timeout(), log).await?;
        Ok(output.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::tests::RecordingLogger;
    use crate::error::RpcErrorKind;
    use crate::sim::{Behavior, SimRequest, SimSwitch};
    use crate::types::FlowMatch;
    use crate::watcher::InventoryWatcher;
    use log::Level;
    use pretty_assertions::assert_eq;

    fn flows(n: u64) -> Vec<FlowEntry> {
        (0..n)
            .map(|i| {
                let flow_match = FlowMatch {
                    vlan_id: Some(i as u16),
                    ..FlowMatch::any()
                };
                FlowEntry::new(0, 100, flow_match).with_cookie(i)
            })
            .collect()
    }

    fn setup(config: RpcConfig) -> (FlowInstaller, Arc<SimSwitch>, Arc<InventoryWatcher>, DeviceId) {
        let dev = DeviceId::new("openflow:1");
        let sim = Arc::new(SimSwitch::new());
        sim.add_device(dev.clone(), Behavior::Succeed);
        let watcher = Arc::new(InventoryWatcher::with_nodes([dev.clone()]));
        let installer = FlowInstaller::new(watcher.clone(), sim.clone(), config);
        (installer, sim, watcher, dev)
    }

    #[tokio::test]
    async fn test_install_then_read_back() {
        let (installer, sim, watcher, dev) = setup(RpcConfig::default());
        let log = RecordingLogger::default();

        let count = installer.install(&dev, flows(3), &log).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(sim.installed_flows(&dev).len(), 3);
        assert_eq!(watcher.registered_calls(), 0);
        assert_eq!(log.count(Level::Trace), 3);

        let stats = installer.read_statistics(&dev, None, &log).await.unwrap();
        let mut cookies: Vec<u64> = stats.iter().map(|s| s.cookie).collect();
        cookies.sort_unstable();
        assert_eq!(cookies, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_install_fences_last_flow() {
        let (installer, sim, _, dev) = setup(RpcConfig::default());
        installer
            .install(&dev, flows(2), &RecordingLogger::default())
            .await
            .unwrap();
        let flags: Vec<bool> = sim
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                SimRequest::AddFlow(input) => Some(input.barrier),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[tokio::test]
    async fn test_install_without_fence() {
        let config = RpcConfig {
            fence_batches: false,
            ..RpcConfig::default()
        };
        let (installer, sim, _, dev) = setup(config);
        installer
            .install(&dev, flows(2), &RecordingLogger::default())
            .await
            .unwrap();
        assert!(sim.requests().iter().all(|r| match r {
            SimRequest::AddFlow(input) => !input.barrier,
            _ => true,
        }));
    }

    #[tokio::test]
    async fn test_uninstall_removes_flows() {
        let (installer, sim, _, dev) = setup(RpcConfig::default());
        let log = RecordingLogger::default();
        let installed = flows(3);
        installer.install(&dev, installed.clone(), &log).await.unwrap();

        let removals = vec![
            RemoveFlowInputBuilder::for_flow(dev.clone(), &installed[0]),
            RemoveFlowInputBuilder::for_flow(dev.clone(), &installed[2]),
            RemoveFlowInputBuilder::new("openflow:2"),
        ];
        assert_eq!(installer.uninstall(&dev, removals, &log).await.unwrap(), 2);
        let left: Vec<u64> = sim.installed_flows(&dev).iter().map(|f| f.cookie).collect();
        assert_eq!(left, vec![1]);
    }

    #[tokio::test]
    async fn test_barrier() {
        let (installer, sim, _, dev) = setup(RpcConfig::default());
        installer
            .barrier(&dev, &RecordingLogger::default())
            .await
            .unwrap();
        assert!(matches!(sim.requests()[..], [SimRequest::Barrier(_)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_statistics_timeout() {
        let config = RpcConfig {
            stats_timeout_ms: 20,
            ..RpcConfig::default()
        };
        let (installer, sim, _, dev) = setup(config);
        sim.set_default(&dev, Behavior::Hang);
        let log = RecordingLogger::default();

        let err = installer.read_statistics(&dev, Some(0), &log).await.unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::Timeout);
        assert_eq!(log.count(Level::Error), 1);
        assert_eq!(sim.cancelled_hung_requests(), 1);
    }

    #[tokio::test]
    async fn test_install_on_absent_node_is_device_removed() {
        let (installer, sim, watcher, _) = setup(RpcConfig::default());
        let ghost = DeviceId::new("openflow:7");
        sim.add_device(ghost.clone(), Behavior::Hang);
        let log = RecordingLogger::default();

        let err = installer.install(&ghost, flows(2), &log).await.unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::DeviceRemoved);
        assert!(log.records.lock().is_empty());
        assert_eq!(watcher.registered_calls(), 0);
    }
}
