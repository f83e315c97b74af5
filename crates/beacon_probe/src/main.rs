//! # Beacon Probe
//!
//! Command-line exercise client: connects to a Beacon backend, subscribes
//! to every push kind, fires correlated calls on an interval, and reports
//! summary statistics. Useful for smoke-testing a server and for watching
//! the client core's behavior under real traffic.

mod config;

use anyhow::Result;
use beacon_client::{
    CallHandle, Client, ConnectionState, Envelope, Payload, PushEventKind, TransportKind,
};
use clap::Parser;
use config::ProbeConfig;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "beacon-probe")]
#[command(about = "Beacon backend exercise client")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Use the one-shot HTTP transport instead of the persistent socket
    #[arg(long)]
    http: bool,

    /// Run duration in seconds (overrides the config file)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the level derived from the `--debug` flag.
fn setup_logging(args: &Args) {
    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn resolve_config(args: &Args) -> Result<ProbeConfig> {
    let mut config = match &args.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(host) = &args.host {
        config.client.host = host.clone();
    }
    if let Some(port) = args.port {
        config.client.port = port;
    }
    if args.http {
        config.client.transport = TransportKind::Http;
    }
    if let Some(duration) = args.duration {
        config.workload.duration_secs = duration;
    }
    Ok(config)
}

fn subscribe_push_logging(client: &Client) {
    for kind in [
        PushEventKind::Presence,
        PushEventKind::ChannelMessage,
        PushEventKind::MatchData,
        PushEventKind::MatchmakerMatched,
        PushEventKind::Notification,
    ] {
        client.subscribe(kind, move |event| {
            info!("📨 Push {kind:?}: {event:?}");
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args);
    let config = resolve_config(&args)?;

    info!("🚀 Starting probe");
    info!(
        "   • Target: {}:{} ({:?})",
        config.client.host, config.client.port, config.client.transport
    );
    info!(
        "   • Workload: one call every {}ms for {}s",
        config.workload.request_interval_ms, config.workload.duration_secs
    );

    let client = Client::new(config.client.clone())?;
    subscribe_push_logging(&client);
    client.on_connected(|| info!("✅ Connected"));
    client.on_disconnected(|details| {
        info!(
            "🔌 Disconnected (code {}, clean: {}): {}",
            details.code, details.was_clean, details.reason
        );
    });
    client.on_transport_error(|message| warn!("⚠️ Transport error: {message}"));

    client.connect();

    let deadline = Duration::from_millis(config.workload.request_deadline_ms);
    let run_duration = Duration::from_secs(config.workload.duration_secs);
    let connectionless = config.client.transport == TransportKind::Http;
    let mut request_timer = interval(Duration::from_millis(config.workload.request_interval_ms));
    let mut tick_timer = interval(Duration::from_millis(50));

    let mut pending: Vec<CallHandle> = Vec::new();
    let mut sent = 0u64;
    let mut succeeded = 0u64;
    let mut failed = 0u64;
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = request_timer.tick() => {
                if !connectionless && client.state() != ConnectionState::Connected {
                    debug!("Skipping call: not connected");
                    continue;
                }
                let seq = sent;
                let outcome = client.send_with_deadline(deadline, |cid| {
                    Envelope::request(cid, Payload::Result(json!({"op": "ping", "seq": seq}))).encode()
                });
                match outcome {
                    Ok(handle) => {
                        debug!("📤 Sent call {} ({})", seq, handle.correlation_id());
                        pending.push(handle);
                        sent += 1;
                    }
                    Err(e) => warn!("⚠️ Send failed: {e}"),
                }
            }
            _ = tick_timer.tick() => {
                client.tick();
                pending.retain_mut(|handle| match handle.try_result() {
                    Some(Ok(value)) => {
                        debug!("✅ Call {} resolved: {value}", handle.correlation_id());
                        succeeded += 1;
                        false
                    }
                    Some(Err(e)) => {
                        warn!("❌ Call {} failed: {e}", handle.correlation_id());
                        failed += 1;
                        false
                    }
                    None => true,
                });
                if started.elapsed() >= run_duration {
                    break;
                }
            }
        }
    }

    info!("⏰ Run complete; disconnecting");
    client.disconnect();
    for _ in 0..40 {
        client.tick();
        if client.state() == ConnectionState::Disconnected {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    info!("📊 Summary:");
    info!("   • Sent: {sent}");
    info!("   • Succeeded: {succeeded}");
    info!("   • Failed: {failed}");
    info!("   • Still pending at exit: {}", pending.len());
    info!("   • Server time: {}", client.server_time_ms());

    Ok(())
}
