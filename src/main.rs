use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use tether_intake::IntakeConfig;
use tether_mux::{PaneTarget, PaneTransport, TmuxConfig, TmuxTransport};
use tether_session::registry::{start_dispatcher, start_eviction_sweep};
use tether_session::{LogSink, PermissionConfig, RegistryConfig, SessionConfig, SessionRegistry};
use tether_telemetry::TelemetryConfig;

/// Relay between a chat frontend and a CLI agent running in a tmux pane.
#[derive(Debug, Parser)]
#[command(name = "tetherd", version, about)]
struct Cli {
    /// Pane to relay to, as session:window.pane. Auto-discovered when omitted.
    #[arg(long, env = "TETHER_PANE")]
    pane: Option<String>,

    /// Path of the hook intake socket.
    #[arg(long, env = "TETHER_SOCKET")]
    socket: Option<PathBuf>,

    /// Drop hook events whose cwd is outside this root.
    #[arg(long, env = "TETHER_FILTER_CWD")]
    filter_cwd: Option<PathBuf>,

    /// Process name the agent runs under, used during pane discovery.
    #[arg(long, env = "TETHER_AGENT_COMMAND", default_value = "claude")]
    agent_command: String,

    /// Lines captured per pane snapshot.
    #[arg(long, env = "TETHER_CAPTURE_LINES", default_value_t = 50)]
    capture_lines: u32,

    /// Seconds an unanswered permission request stays live.
    #[arg(long, env = "TETHER_PERMISSION_TIMEOUT_SECS", default_value_t = 300)]
    permission_timeout_secs: u64,

    /// Seconds of inactivity before a session is evicted.
    #[arg(long, env = "TETHER_IDLE_TIMEOUT_SECS", default_value_t = 1800)]
    idle_timeout_secs: u64,

    /// Emit JSON log lines.
    #[arg(long, env = "TETHER_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = tether_telemetry::init_telemetry(TelemetryConfig {
        json_output: cli.log_json,
        ..Default::default()
    });

    tracing::info!("starting tetherd");

    let transport = Arc::new(TmuxTransport::new(TmuxConfig {
        agent_command: cli.agent_command.clone(),
        ..Default::default()
    }));

    // No usable pane is a configuration error; exit instead of limping along.
    let target: PaneTarget = match &cli.pane {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid --pane value `{raw}`"))?,
        None => transport
            .discover()
            .await
            .context("no agent pane found; pass --pane or start the agent inside tmux")?,
    };
    tracing::info!(target = %target, "relaying to pane");

    let registry = Arc::new(SessionRegistry::new(
        SessionConfig {
            sink: Arc::new(LogSink),
            transport: transport.clone(),
            target,
            permission: PermissionConfig {
                timeout: Duration::from_secs(cli.permission_timeout_secs),
                capture_lines: cli.capture_lines,
                ..Default::default()
            },
            metrics: telemetry.metrics(),
            inbox_capacity: 256,
        },
        RegistryConfig {
            idle_timeout: Duration::from_secs(cli.idle_timeout_secs),
            ..Default::default()
        },
    ));

    let (event_tx, event_rx) = mpsc::channel(1024);
    let intake = tether_intake::start(
        IntakeConfig {
            socket_path: cli
                .socket
                .unwrap_or_else(tether_intake::default_socket_path),
            expected_root: cli.filter_cwd,
            ..Default::default()
        },
        event_tx,
    )
    .context("failed to bind intake socket")?;

    let _dispatcher = start_dispatcher(registry.clone(), event_rx);
    let _sweep = start_eviction_sweep(registry.clone());
    let _chat = spawn_stdin_chat(registry.clone());

    tracing::info!(socket = %intake.socket_path().display(), "tetherd ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    registry.teardown();
    intake.shutdown();
    Ok(())
}

/// Forward stdin lines as user chat messages, one message per line. Stands
/// in for a chat frontend wired to the same registry.
fn spawn_stdin_chat(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if let Err(e) = registry.dispatch_chat(text.to_string()).await {
                        tracing::warn!(error = %e, "chat message not delivered");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    })
}
