//! `remapd`: the CLI entry point wiring `remap-core`'s pipeline worker to
//! `remap-hid-transport`'s connection pool and, in `serve-virtual-device`
//! mode, to `remap-virtual-device`'s `uinput` bridge.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod bridge;
mod cli;
mod pipeline;
mod replay;
mod settings;

use cli::{Cli, Commands};
use settings::DaemonSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { profile } => validate(&profile),
        Commands::Run { profile, replay, settings } => run_pipeline(&profile, &replay, settings.as_deref()).await,
        Commands::ServeVirtualDevice { settings } => serve_virtual_device(settings.as_deref()).await,
    }
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Waits for Ctrl+C via the `ctrlc` crate, bridged into a future so callers
/// can `tokio::select!` on it alongside the pipeline worker and the
/// bridge's accept loop — a oneshot channel stands in for a polled flag
/// since both of this binary's long-running loops are already
/// `tokio::select!`-driven.
fn ctrl_c_signal() -> tokio::sync::oneshot::Receiver<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    let _ = ctrlc::set_handler(move || {
        if let Some(tx) = tx.lock().expect("not poisoned").take() {
            let _ = tx.send(());
        }
    });
    rx
}

fn validate(profile_path: &Path) -> Result<()> {
    init_logging("info");
    let text = std::fs::read_to_string(profile_path).with_context(|| format!("reading profile {}", profile_path.display()))?;
    let configuration = remap_core::CoreConfiguration::from_json_str(&text)?;
    let profile = configuration.selected_profile().context("configuration has no selected profile")?;
    let manipulator_count: usize = profile.rules.iter().map(|rule| rule.manipulators.len()).sum();
    println!("{}: {} rule(s), {} manipulator(s) — OK", profile.name, profile.rules.len(), manipulator_count);
    Ok(())
}

async fn run_pipeline(profile_path: &Path, replay_path: &Path, settings_path: Option<&Path>) -> Result<()> {
    let settings = DaemonSettings::load_or_default(settings_path)?;
    init_logging(&settings.log_level);

    let text = std::fs::read_to_string(profile_path).with_context(|| format!("reading profile {}", profile_path.display()))?;
    let configuration = remap_core::CoreConfiguration::from_json_str(&text)?;

    let transport = Arc::new(remap_hid_transport::ConnectionPool::new());
    let endpoint = remap_hid_transport::EndpointId(settings.endpoint_id);
    transport
        .register(
            endpoint,
            remap_hid_transport::EndpointAddress {
                datagram_path: settings.datagram_path(),
                stream_path: settings.stream_path(),
            },
        )
        .await;

    let logger = remap_core::Logger::new("pipeline");
    let worker = pipeline::PipelineWorker::new(&configuration, transport, endpoint, logger)
        .context("selected profile has no rules to compile into a chain")?;

    let entries = replay::load(replay_path)?;
    info!(count = entries.len(), "loaded replay entries");

    let (tx, rx) = tokio::sync::mpsc::channel(256);
    let feed = replay::spawn_feed(entries, tx);

    tokio::select! {
        _ = worker.run(rx) => {}
        _ = ctrl_c_signal() => {
            info!("received interrupt, shutting down pipeline");
        }
    }
    feed.abort();
    Ok(())
}

async fn serve_virtual_device(settings_path: Option<&Path>) -> Result<()> {
    let settings = DaemonSettings::load_or_default(settings_path)?;
    init_logging(&settings.log_level);
    info!(device = %settings.device_name, "starting virtual-HID bridge");

    tokio::select! {
        result = bridge::run(&settings) => result,
        _ = ctrl_c_signal() => {
            info!("received interrupt, shutting down bridge");
            Ok(())
        }
    }
}
