//! `tutorbot serve`: run the bot.

use std::io::{BufRead, Write};

#[cfg(not(feature = "gateway-discord"))]
use anyhow::bail;
use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use tutorbot::controller::{Command, CommandOutcome, Controller};

/// Gateway events buffered ahead of the engine loop.
#[cfg(feature = "gateway-discord")]
const EVENT_BUFFER: usize = 256;

#[cfg(feature = "gateway-discord")]
pub async fn run(config_path: &str, console: bool) -> Result<()> {
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::Context;
    use tokio::sync::{mpsc, watch};
    use tutorbot::bridge::Bridge;
    use tutorbot::config::Config;
    use tutorbot::engine::{Engine, EngineConfig};
    use tutorbot::store::{FileRecordStore, RecordStore};
    use tutorbot_gateway_discord::{DiscordConfig, DiscordGateway};
    use tutorbot_gateway_protocol::ChatTransport;

    let config = Config::load(config_path).await?;
    let token = config.bot.active_token()?;

    let data_dir = config.data_dir(Path::new(config_path));
    let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(&data_dir));
    info!(data_dir = %data_dir.display(), "Record store ready");

    // Gateway
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let discord_config = DiscordConfig::new(token).with_guild(config.bot.guild_id);
    let gateway = DiscordGateway::connect(discord_config, event_tx)
        .await
        .context("failed to create Discord client")?;
    let transport: Arc<dyn ChatTransport> = gateway.transport();
    let gateway_shutdown = gateway.shutdown_handle();

    // Engine
    let bridge = Bridge::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (engine, timer_rx) = Engine::new(EngineConfig::from_config(&config), transport, store);
    let mut engine_handle = engine.spawn(timer_rx, &bridge, event_rx, shutdown_rx);
    let gateway_handle = tokio::spawn(gateway.run());

    // Controller
    match Controller::new(&config, bridge) {
        Ok(controller) if console => {
            std::thread::Builder::new()
                .name("tutorbot-console".to_string())
                .spawn(move || run_console(&controller))
                .context("failed to start command console")?;
            info!("Command console reading from stdin");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Controller disabled"),
    }

    info!(
        groups = config.groups.len(),
        development_mode = config.bot.development_mode,
        "tutorbot running"
    );

    tokio::select! {
        () = shutdown_signal() => {}
        _ = &mut engine_handle => {
            warn!("Engine loop stopped");
        }
    }

    info!("Shutting down");
    gateway_shutdown.shutdown().await;
    let _ = shutdown_tx.send(true);
    if !engine_handle.is_finished() {
        let _ = engine_handle.await;
    }
    let _ = gateway_handle.await;

    info!("tutorbot stopped");
    Ok(())
}

#[cfg(not(feature = "gateway-discord"))]
pub async fn run(_config_path: &str, _console: bool) -> Result<()> {
    bail!("tutorbot was built without a chat gateway (enable the `gateway-discord` feature)")
}

/// Execute JSON commands read from stdin, one per line, printing each outcome
/// as a JSON line. Runs on its own thread; stops at end of input.
#[cfg_attr(not(feature = "gateway-discord"), allow(dead_code))]
fn run_console(controller: &Controller) {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read command");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = execute_line(controller, &line);
        let rendered = serde_json::to_string(&outcome)
            .unwrap_or_else(|e| format!(r#"{{"status":"error","message":"{e}"}}"#));
        if writeln!(stdout, "{rendered}").is_err() {
            break;
        }
    }
    info!("Command console closed");
}

#[cfg_attr(not(feature = "gateway-discord"), allow(dead_code))]
fn execute_line(controller: &Controller, line: &str) -> CommandOutcome {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => controller.execute(command),
        Err(e) => CommandOutcome::error(format!("Invalid command: {e}")),
    }
}

#[cfg_attr(not(feature = "gateway-discord"), allow(dead_code))]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
