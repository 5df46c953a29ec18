//! End-to-end scenarios for device calls and batches.
//!
//! These tests drive the public API against the simulated switch, an
//! in-process inventory watcher and a recording logger, and check the
//! outcome class, log records and watcher bookkeeping of every terminal path.

use log::Level;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sonic_flow_rpc::sim::{Behavior, SimSwitch};
use sonic_flow_rpc::{
    AddFlow, AddFlowInputBuilder, BarrierCall, BatchDriver, CallLogger, CallRecord, DeviceCall,
    DeviceId, ErrorTag, FlowEntry, FlowMatch, InventoryWatcher, NodeWatcher, RemovalListener,
    RemoveFlowInputBuilder, RpcErrorKind, RpcErrorMessage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEV: &str = "openflow:1";

/// Logger that keeps every record for inspection.
#[derive(Default)]
struct RecordingLogger {
    records: Mutex<Vec<(Level, CallRecord)>>,
}

impl CallLogger for RecordingLogger {
    fn log(&self, level: Level, record: CallRecord) {
        self.records.lock().push((level, record));
    }
}

impl RecordingLogger {
    fn count(&self, level: Level) -> usize {
        self.records.lock().iter().filter(|(l, _)| *l == level).count()
    }

    fn lines(&self, level: Level) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, r)| r.to_string())
            .collect()
    }
}

/// Inventory watcher that also counts register/unregister calls.
struct CountingInventory {
    inner: InventoryWatcher,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
}

impl CountingInventory {
    fn new(nodes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner: InventoryWatcher::with_nodes(nodes.iter().copied()),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
        })
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.registered.load(Ordering::SeqCst),
            self.unregistered.load(Ordering::SeqCst),
        )
    }
}

impl NodeWatcher for CountingInventory {
    fn register(&self, call: Arc<dyn RemovalListener>) {
        self.registered.fetch_add(1, Ordering::SeqCst);
        self.inner.register(call);
    }

    fn unregister(&self, call: &dyn RemovalListener) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
        self.inner.unregister(call);
    }
}

fn flow(cookie: u64) -> FlowEntry {
    FlowEntry::new(0, 200, FlowMatch::any()).with_cookie(cookie)
}

fn add_flow(
    cookie: u64,
    watcher: &Arc<CountingInventory>,
    sim: &Arc<SimSwitch>,
) -> DeviceCall<AddFlow> {
    let op = AddFlow::new(AddFlowInputBuilder::new(DEV, flow(cookie)).build());
    DeviceCall::new(op, watcher.clone(), sim.clone())
}

fn switch(behavior: Behavior) -> Arc<SimSwitch> {
    let sim = Arc::new(SimSwitch::new());
    sim.add_device(DEV, behavior);
    sim
}

// ============================================================================
// Single call scenarios
// ============================================================================

#[tokio::test]
async fn test_transport_unavailable_is_silent() {
    let sim = switch(Behavior::Unavailable("switch session is down".into()));
    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();

    let call = add_flow(1, &watcher, &sim);
    call.invoke();
    let err = call
        .await_result(Duration::from_secs(1), &log)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcErrorKind::TransportUnavailable);
    assert_eq!(err.tag(), ErrorTag::InternalError);
    assert!(call.disconnected());
    assert!(!call.removed());
    assert!(log.records.lock().is_empty());
    assert_eq!(watcher.counts(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_removal_while_pending() {
    let sim = switch(Behavior::Hang);
    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();

    let call = add_flow(1, &watcher, &sim);
    call.invoke();
    assert_eq!(watcher.inner.registered_calls(), 1);

    let remover = {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            watcher.inner.node_removed(&DeviceId::new(DEV))
        })
    };

    let err = call
        .await_result(Duration::from_secs(5), &log)
        .await
        .unwrap_err();
    assert_eq!(remover.await.unwrap(), 1);

    assert_eq!(err.kind(), RpcErrorKind::DeviceRemoved);
    assert!(err.is_cancellation());
    assert!(call.removed());
    assert!(call.is_cancelled());
    assert_eq!(sim.cancelled_hung_requests(), 1);
    assert!(log.records.lock().is_empty());
    assert_eq!(watcher.counts(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_logged_once() {
    let sim = switch(Behavior::Hang);
    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();

    let call = add_flow(99, &watcher, &sim);
    call.invoke();
    let err = call
        .await_result(Duration::from_millis(1), &log)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcErrorKind::Timeout);
    assert_eq!(err.tag(), ErrorTag::Timeout);
    assert!(call.is_cancelled());

    let errors = log.lines(Level::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("add-flow:"));
    assert!(errors[0].contains("\"cookie\":99"));
    assert_eq!(log.records.lock().len(), 1);
    assert_eq!(watcher.counts(), (1, 1));
    assert_eq!(watcher.inner.registered_calls(), 0);
}

#[tokio::test]
async fn test_abandoned_request_is_other_failure() {
    let sim = switch(Behavior::Abandon);
    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();

    let call = add_flow(1, &watcher, &sim);
    call.invoke();
    let err = call
        .await_result(Duration::from_secs(1), &log)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcErrorKind::Other);
    assert_eq!(log.count(Level::Error), 1);
    assert_eq!(watcher.counts(), (1, 1));
}

#[tokio::test]
async fn test_removal_only_affects_its_node() {
    let sim = Arc::new(SimSwitch::new());
    sim.add_device("openflow:1", Behavior::Hang);
    sim.add_device("openflow:2", Behavior::Hang);
    let watcher = CountingInventory::new(&["openflow:1", "openflow:2"]);

    let gone = BarrierCall::barrier("openflow:1", watcher.clone(), sim.clone());
    let kept = BarrierCall::barrier("openflow:2", watcher.clone(), sim.clone());
    gone.invoke();
    kept.invoke();

    assert_eq!(watcher.inner.node_removed(&DeviceId::new("openflow:1")), 1);
    assert!(gone.removed());
    assert!(gone.is_cancelled());
    assert!(!kept.removed());
    assert!(!kept.is_cancelled());
    assert_eq!(
        watcher.inner.registered_calls_for(&DeviceId::new("openflow:2")),
        1
    );
}

// ============================================================================
// Batch scenarios
// ============================================================================

#[tokio::test]
async fn test_batch_reports_earliest_failure() {
    let sim = switch(Behavior::Succeed);
    let mut script: Vec<Behavior> = vec![Behavior::Succeed; 10];
    script[2] = Behavior::Fail(vec![RpcErrorMessage::error("flow #3 rejected")]);
    script[6] = Behavior::Fail(vec![RpcErrorMessage::error("flow #7 rejected")]);
    sim.script(DEV, script);

    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();
    let mut batch = BatchDriver::new(watcher.clone(), sim.clone());
    for cookie in 1..=10 {
        batch.invoke(AddFlowInputBuilder::new(DEV, flow(cookie)));
    }
    batch.flush();
    assert_eq!(batch.size(), 10);

    let err = batch
        .drain(&log, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcErrorKind::DeviceReportedFailure);
    assert_eq!(err.errors()[0].message.as_deref(), Some("flow #3 rejected"));
    assert_eq!(log.count(Level::Trace), 8);
    assert_eq!(log.count(Level::Error), 2);

    let errors = log.lines(Level::Error);
    assert!(errors[0].contains("flow #3 rejected"));
    assert!(errors[1].contains("flow #7 rejected"));
    assert_eq!(watcher.counts(), (10, 10));
}

#[tokio::test]
async fn test_batch_drains_everything_even_when_mostly_failing() {
    let sim = switch(Behavior::TransportError("reset by peer".into()));
    sim.script(DEV, [Behavior::Succeed]);
    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();

    let mut batch = BatchDriver::new(watcher.clone(), sim.clone());
    for cookie in 0..6 {
        batch.invoke(RemoveFlowInputBuilder::for_flow(DEV, &flow(cookie)));
    }
    let err = batch
        .drain(&log, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcErrorKind::Other);
    assert_eq!(log.count(Level::Trace), 1);
    assert_eq!(log.count(Level::Error), 5);
    assert_eq!(watcher.counts(), (6, 6));
}

#[tokio::test(start_paused = true)]
async fn test_batch_with_removed_device() {
    let sim = Arc::new(SimSwitch::new());
    sim.add_device("openflow:1", Behavior::Succeed);
    sim.add_device("openflow:2", Behavior::Hang);
    let watcher = CountingInventory::new(&["openflow:1", "openflow:2"]);
    let log = RecordingLogger::default();

    let mut batch = BatchDriver::new(watcher.clone(), sim.clone());
    batch.invoke(AddFlowInputBuilder::new("openflow:1", flow(1)));
    batch.invoke(AddFlowInputBuilder::new("openflow:2", flow(2)));
    batch.fence("openflow:2");
    batch.invoke(AddFlowInputBuilder::new("openflow:1", flow(3)));

    assert_eq!(watcher.inner.node_removed(&DeviceId::new("openflow:2")), 2);

    let err = batch
        .drain(&log, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::DeviceRemoved);
    assert_eq!(log.count(Level::Trace), 2);
    assert_eq!(log.count(Level::Error), 0);
    assert_eq!(watcher.counts(), (4, 4));
}

#[tokio::test(start_paused = true)]
async fn test_batch_timeouts_are_per_call() {
    let sim = switch(Behavior::Hang);
    let watcher = CountingInventory::new(&[DEV]);
    let log = RecordingLogger::default();

    let mut batch = BatchDriver::new(watcher.clone(), sim.clone());
    for cookie in 0..3 {
        batch.invoke(AddFlowInputBuilder::new(DEV, flow(cookie)));
    }

    let started = tokio::time::Instant::now();
    let err = batch
        .drain(&log, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcErrorKind::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(log.count(Level::Error), 3);
    assert_eq!(sim.cancelled_hung_requests(), 3);
    assert_eq!(watcher.counts(), (3, 3));
}
