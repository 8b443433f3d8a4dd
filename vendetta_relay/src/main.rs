// CLI entry point for the Silent Vendetta relay.
//
// Starts a standalone game server that clients connect to over TCP. See
// `server.rs` for the threading model and `handler.rs` for what each
// request does.
//
// Usage:
//   vendetta-relay [OPTIONS]
//     --host <HOST>              Bind address (default: 127.0.0.1)
//     --port <PORT>              Listen port (default: 3001)
//     --game-config <FILE>       JSON file with roster limits and phase lengths
//     --phase-clock-ms <MS>      Advance phases on their deadlines, checking
//                                every MS milliseconds (default: off)
//
// Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vendetta_game::GameConfig;
use vendetta_relay::{RelayConfig, start_relay};

#[derive(Parser, Debug)]
#[command(name = "vendetta-relay", version, about = "Silent Vendetta game server")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port (0 picks a free one)
    #[arg(short, long, default_value_t = 3001)]
    port: u16,

    /// JSON game configuration (roster limits, phase lengths)
    #[arg(long, value_name = "FILE")]
    game_config: Option<PathBuf>,

    /// Enable the phase clock with this tick interval
    #[arg(long, value_name = "MS")]
    phase_clock_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let game = match &args.game_config {
        Some(path) => GameConfig::from_json_file(path)
            .with_context(|| format!("loading game config {}", path.display()))?,
        None => GameConfig::default(),
    };

    let config = RelayConfig {
        host: args.host,
        port: args.port,
        game,
        phase_clock: args.phase_clock_ms.map(Duration::from_millis),
    };
    let (handle, addr) = start_relay(config).context("failed to start relay")?;
    info!(%addr, "press Ctrl+C to stop");

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl+C handler")?;
    let _ = stop_rx.recv();

    info!("shutting down");
    handle.stop();
    Ok(())
}
