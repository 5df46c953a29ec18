//! Flow RPC daemon entry point.
//!
//! Brings up a simulated switch fleet behind an inventory watcher, pushes a
//! generated flow set to every switch through the reliable RPC layer, reads
//! the statistics back and reports the outcome of each batch.

use clap::Parser;
use log::{error, info, warn};
use sonic_flow_rpc::sim::{Behavior, SimSwitch};
use sonic_flow_rpc::{
    BatchDriver, DeviceId, FlowAction, FlowEntry, FlowInstaller, FlowMatch, InventoryWatcher,
    LogFacade, RpcConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Flow RPC daemon
#[derive(Parser, Debug)]
#[command(name = "flowrpcd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, default_value = "/etc/sonic/flowrpcd.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Number of simulated switches
    #[arg(short = 'd', long, default_value = "2")]
    devices: u32,

    /// Flows installed per switch
    #[arg(short = 'f', long, default_value = "8")]
    flows: u16,

    /// Remove this switch while its batch is pending (e.g. openflow:2)
    #[arg(long)]
    remove_device: Option<String>,

    /// Override the per-call deadline of flow-mod batches, in milliseconds
    #[arg(long)]
    flow_mod_timeout_ms: Option<u64>,

    /// Do not flag the last flow-mod per switch as barrier-bearing
    #[arg(long)]
    no_fence: bool,
}

fn load_config(args: &Args) -> Result<RpcConfig, sonic_flow_rpc::ConfigError> {
    let mut config = RpcConfig::load_or_default(&args.config)?;
    if let Some(timeout) = args.flow_mod_timeout_ms {
        config.flow_mod_timeout_ms = timeout;
    }
    if args.no_fence {
        config.fence_batches = false;
    }
    config.validate()?;
    Ok(config)
}

fn device_ids(count: u32) -> Vec<DeviceId> {
    (1..=count)
        .map(|i| DeviceId::new(format!("openflow:{}", i)))
        .collect()
}

/// Builds one forwarding flow per ingress port: port `n` forwards to `n + 1`.
/// Priorities start at 100 and saturate at the top of the range.
fn generate_flows(device_index: u64, count: u16) -> Vec<FlowEntry> {
    (0..count)
        .map(|i| {
            let in_port = u32::from(i) + 1;
            let flow_match = FlowMatch {
                in_port: Some(in_port),
                ..FlowMatch::any()
            };
            FlowEntry::new(0, 100_u16.saturating_add(i), flow_match)
                .with_cookie((device_index << 32) | u64::from(i))
                .with_action(FlowAction::Output { port: in_port + 1 })
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting flowrpcd");
    info!("Switches: {}, flows per switch: {}", args.devices, args.flows);
    info!(
        "Deadlines: flow-mod {:?}, barrier {:?}, stats {:?}",
        config.flow_mod_timeout(),
        config.barrier_timeout(),
        config.stats_timeout()
    );

    let devices = device_ids(args.devices);
    let removed = args.remove_device.as_deref().map(DeviceId::new);

    let sim = Arc::new(SimSwitch::new());
    for device in &devices {
        // The switch about to be removed never answers, so its batch is
        // still pending when the removal arrives.
        let behavior = if removed.as_ref() == Some(device) {
            Behavior::Hang
        } else {
            Behavior::Succeed
        };
        sim.add_device(device.clone(), behavior);
    }
    let watcher = Arc::new(InventoryWatcher::with_nodes(devices.iter().cloned()));
    let installer = FlowInstaller::new(watcher.clone(), sim.clone(), config);

    let batches: Vec<(DeviceId, BatchDriver)> = devices
        .iter()
        .zip(1_u64..)
        .map(|(device, index)| {
            let batch = installer.begin_install(device, generate_flows(index, args.flows));
            (device.clone(), batch)
        })
        .collect();

    if let Some(device) = &removed {
        if watcher.is_present(device) {
            let cancelled = watcher.node_removed(device);
            sim.disconnect(device);
            info!("Removed {}: {} pending call(s) cancelled", device, cancelled);
        } else {
            warn!("Cannot remove unknown switch {}", device);
        }
    }

    let mut failed = 0_usize;
    for (device, batch) in batches {
        match installer.complete(batch, &LogFacade).await {
            Ok(count) => info!("{}: installed {} flow(s)", device, count),
            Err(e) => {
                error!("{}: install failed: {}", device, e.describe());
                failed += 1;
            }
        }
    }

    for device in devices.iter().filter(|d| watcher.is_present(d)) {
        match installer.read_statistics(device, None, &LogFacade).await {
            Ok(stats) => info!("{}: {} flow(s) reported", device, stats.len()),
            Err(e) => warn!("{}: statistics unavailable: {}", device, e),
        }
    }

    if failed > 0 {
        error!("{} of {} switch(es) failed", failed, devices.len());
        return ExitCode::FAILURE;
    }

    info!("All switches programmed");
    ExitCode::SUCCESS
}
