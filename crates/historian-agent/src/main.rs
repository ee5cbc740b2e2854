// crates/historian-agent/src/main.rs
// ============================================================================
// Module: Historian Agent Entry Point
// Description: Channel wiring, timers, and lifecycle for the agent binary.
// Purpose: Read envelopes from stdin, answer on stdout, run the timers.
// Dependencies: historian-agent, historian-core, historian-store, serde_json,
//               tokio, tracing, tracing-subscriber.
// ============================================================================

//! ## Overview
//! The binary wires the store gateway, the handlers, and the IPC channel
//! together. One reader task parses stdin line by line; each envelope is
//! dispatched on the blocking pool so slow statements never stall the
//! reader. One writer task serializes outbound messages as one JSON object
//! per line. Two timers run independently: the size poll and the settings
//! solicitation. A startup failure is answered with a single error envelope
//! before the process exits with a code identifying the failing stage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use historian_agent::AgentConfig;
use historian_agent::Channel;
use historian_agent::Dispatcher;
use historian_agent::OverflowController;
use historian_agent::ReadPath;
use historian_agent::RetentionEngine;
use historian_agent::WritePath;
use historian_agent::unix_millis;
use historian_core::OutboundMessage;
use historian_core::RequestEnvelope;
use historian_core::SharedState;
use historian_core::StorageGateway;
use historian_store::SqliteGateway;
use historian_store::SqliteGatewayConfig;
use historian_store::provision_schema;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Exit code for configuration failures.
const EXIT_CONFIG: u8 = 2;

/// Exit code for store open or provisioning failures.
const EXIT_STORE: u8 = 3;

/// Delay before exiting after a fatal error, letting the peer drain the
/// error envelope.
const FATAL_FLUSH_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Agent entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let argument = std::env::args().nth(1);
    let config = match AgentConfig::load(argument.as_deref()) {
        Ok(config) => config,
        Err(err) => return fatal(EXIT_CONFIG, &err.to_string()),
    };
    info!(dbfile = %config.dbfile.display(), limit_mb = config.db_limit_mb, "starting");

    let store_config = SqliteGatewayConfig {
        path: config.dbfile.clone(),
        busy_timeout_ms: config.busy_timeout_ms,
        read_pool_size: config.read_pool_size,
    };
    let opened = tokio::task::spawn_blocking(move || {
        let gateway = SqliteGateway::open(&store_config)?;
        provision_schema(&gateway).map_err(|err| {
            historian_store::SqliteGatewayError::Open(err.to_string())
        })?;
        Ok::<SqliteGateway, historian_store::SqliteGatewayError>(gateway)
    })
    .await;
    let gateway: Arc<dyn StorageGateway> = match opened {
        Ok(Ok(gateway)) => Arc::new(gateway),
        Ok(Err(err)) => return fatal(EXIT_STORE, &err.to_string()),
        Err(err) => return fatal(EXIT_STORE, &err.to_string()),
    };

    let (sender, receiver) = mpsc::unbounded_channel::<OutboundMessage>();
    let channel = Channel::new(sender);
    let writer = tokio::spawn(write_loop(receiver));

    let state = Arc::new(SharedState::new());
    let retention =
        RetentionEngine::new(Arc::clone(&gateway), channel.clone(), config.max_log_records);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gateway),
        channel.clone(),
        WritePath::new(Arc::clone(&gateway), Arc::clone(&state), channel.clone()),
        ReadPath::new(Arc::clone(&gateway), Arc::clone(&state), channel.clone()),
        retention.clone(),
    ));

    let size_poll = spawn_size_poll(
        OverflowController::new(Arc::clone(&gateway), state, channel.clone(), config.db_limit_mb),
        retention,
        config.size_poll_interval_secs,
    );
    let settings_timer = spawn_settings_timer(channel.clone(), config.settings_interval_secs);
    channel.send(OutboundMessage::settings_request());

    read_loop(Arc::clone(&dispatcher), channel).await;

    // Stop the timers and release every sender; the writer then drains the
    // queue (in-flight dispatches included) before the process exits.
    size_poll.abort();
    settings_timer.abort();
    drop(dispatcher);
    if writer.await.is_err() {
        warn!("writer task ended abnormally");
    }
    info!("channel drained, exiting");
    ExitCode::SUCCESS
}

/// Reports a startup failure on the channel and returns the exit code.
fn fatal(code: u8, message: &str) -> ExitCode {
    error!(code, error = message, "fatal startup error");
    let envelope = OutboundMessage::error("main".to_string(), message.to_string());
    if let Ok(line) = serde_json::to_string(&envelope) {
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
    std::thread::sleep(FATAL_FLUSH_DELAY);
    ExitCode::from(code)
}

// ============================================================================
// SECTION: Channel Tasks
// ============================================================================

/// Reads envelopes from stdin until the peer closes the pipe or the process
/// is signalled.
async fn read_loop(dispatcher: Arc<Dispatcher>, channel: Channel) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = shutdown_signal() => {
                info!("shutdown signal received");
                return;
            }
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(&dispatcher, &channel, &line);
            }
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                return;
            }
        }
    }
}

/// Parses one line and dispatches it on the blocking pool.
fn handle_line(dispatcher: &Arc<Dispatcher>, channel: &Channel, line: &str) {
    let raw: Value = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "unparseable line on channel");
            return;
        }
    };
    let envelope: RequestEnvelope = match serde_json::from_value(raw.clone()) {
        Ok(envelope) => envelope,
        Err(err) => {
            // A bad envelope with a usable id still gets a correlated reply.
            if let Some(id) = raw.get("id").and_then(Value::as_str) {
                channel.send(OutboundMessage::error(id.to_string(), err.to_string()));
            } else {
                warn!(error = %err, "malformed envelope without id");
            }
            return;
        }
    };
    let dispatcher = Arc::clone(dispatcher);
    tokio::task::spawn_blocking(move || dispatcher.dispatch(&envelope));
}

/// Serializes outbound messages as one JSON object per line on stdout.
async fn write_loop(mut receiver: mpsc::UnboundedReceiver<OutboundMessage>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = receiver.recv().await {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "outbound serialization failed");
                continue;
            }
        };
        if stdout.write_all(line.as_bytes()).await.is_err()
            || stdout.write_all(b"\n").await.is_err()
            || stdout.flush().await.is_err()
        {
            warn!("stdout write failed, stopping writer");
            return;
        }
    }
}

// ============================================================================
// SECTION: Timers
// ============================================================================

/// Runs the size poll on its own interval; each sweep executes on the
/// blocking pool. The log row cap is enforced on the same cadence.
fn spawn_size_poll(
    controller: OverflowController,
    retention: RetentionEngine,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    let controller = Arc::new(Mutex::new(controller));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let controller = Arc::clone(&controller);
            let retention = retention.clone();
            let sweep = tokio::task::spawn_blocking(move || {
                if let Ok(mut controller) = controller.lock() {
                    controller.sweep();
                }
                retention.enforce_log_cap(unix_millis());
            });
            if sweep.await.is_err() {
                warn!("size poll sweep panicked");
            }
        }
    })
}

/// Solicits a fresh retention settings push on a fixed interval.
fn spawn_settings_timer(channel: Channel, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the startup request already
        // covered it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!(now_ms = unix_millis(), "soliciting retention settings");
            channel.send(OutboundMessage::settings_request());
        }
    })
}

/// Resolves when the process receives SIGTERM or ctrl-c.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "sigterm handler unavailable");
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
