// In app/src/main.rs

use anyhow::Result;
use api_client::{ApiClient, StreamClient};
use app_config::Settings;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use core_types::{Interval, Symbol};
use engine::{ControlCommand, MarketController};
use events::MarketEvent;
use std::str::FromStr;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::prelude::*;

mod commands;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "Live kline window and moving-average crossover signals for Binance Futures.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seeds the window, follows the live stream and reports crossovers.
    ///
    /// While running, type `SYMBOL INTERVAL` to switch context or `quit` to stop.
    Run {
        /// Overrides `market.symbol` (e.g. "BTCUSDT").
        #[arg(short, long)]
        symbol: Option<String>,

        /// Overrides `market.interval` (e.g. "1m", "4h").
        #[arg(short, long)]
        interval: Option<String>,
    },

    /// Fetches recent closed klines and prints them.
    History {
        /// The trading pair (e.g., "BTCUSDT").
        #[arg(short, long)]
        symbol: String,

        /// The interval for the klines (e.g., "5m", "1h").
        #[arg(short, long)]
        interval: String,

        /// Number of bars; defaults to `market.window_capacity`.
        #[arg(short, long)]
        count: Option<usize>,

        /// Print the bars as a JSON array instead of a table.
        #[arg(long)]
        json: bool,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let cli = Cli::parse();

    let settings = app_config::load_settings();
    let default_level = settings
        .as_ref()
        .ok()
        .and_then(|s| tracing::Level::from_str(&s.app.log_level).ok())
        .unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("tungstenite", tracing::Level::WARN)
            .with_target("tokio_tungstenite", tracing::Level::WARN)
            .with_default(default_level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();

    let settings = settings?;
    tracing::info!(environment = %settings.app.environment, "Application settings loaded successfully.");

    match cli.command {
        Commands::Run { symbol, interval } => {
            run_app(settings, symbol, interval).await?;
        }
        Commands::History {
            symbol,
            interval,
            count,
            json,
        } => {
            handle_history(settings, symbol, interval, count, json).await?;
        }
    }

    tracing::info!("Application has finished successfully.");

    Ok(())
}

// --- "Run" Subcommand Logic ---

/// Wires the history loader and the stream client into one controller and drives it
/// until `quit` or Ctrl-C.
async fn run_app(mut settings: Settings, symbol: Option<String>, interval: Option<String>) -> Result<()> {
    if let Some(symbol) = symbol {
        settings.market.symbol = Symbol::new(&symbol)?;
    }
    if let Some(interval) = interval {
        settings.market.interval = interval.parse::<Interval>()?;
    }

    // --- 1. Component Instantiation ---
    let api_client = api_client::new(&settings.binance)?;
    let stream_client = StreamClient::new(&settings.binance, &settings.stream);
    let (events_tx, events_rx) = broadcast::channel::<MarketEvent>(1024);

    let mut controller = MarketController::new(
        &settings.market,
        settings.strategy.clone(),
        Box::new(api_client),
        Box::new(stream_client),
        events_tx,
    );

    // --- 2. Launch Concurrent Tasks ---
    let (commands_tx, commands_rx) = mpsc::channel::<ControlCommand>(16);
    tokio::spawn(log_market_events(events_rx));
    tokio::spawn(commands::read_stdin_commands(commands_tx.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received. Shutting down.");
            let _ = commands_tx.send(ControlCommand::Shutdown).await;
        }
    });

    // The controller runs in the current task until told to stop.
    controller.run(commands_rx).await
}

/// Reports what the controller broadcasts. Stands in for a UI consumer.
async fn log_market_events(mut events_rx: broadcast::Receiver<MarketEvent>) {
    loop {
        match events_rx.recv().await {
            Ok(MarketEvent::SignalEmitted(signal)) => {
                tracing::info!(
                    id = %signal.id,
                    direction = %signal.direction,
                    price = %signal.price,
                    at = %format_time(signal.time),
                    "SIGNAL"
                );
            }
            Ok(MarketEvent::ConnectionChanged(state)) => {
                tracing::info!(?state, "Stream connection changed.");
            }
            Ok(MarketEvent::WindowReset(reset)) => {
                tracing::info!(symbol = %reset.symbol, interval = %reset.interval, "Window reset.");
            }
            Ok(MarketEvent::WindowUpdated(snapshot)) => {
                if let Some(last) = snapshot.bars.last() {
                    tracing::debug!(
                        bars = snapshot.bars.len(),
                        at = %format_time(last.time),
                        close = %last.close,
                        "Window updated."
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger fell behind.");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

// --- "History" Subcommand Logic ---

async fn handle_history(
    settings: Settings,
    symbol: String,
    interval: String,
    count: Option<usize>,
    json: bool,
) -> Result<()> {
    let symbol = Symbol::new(&symbol)?;
    let interval = interval.parse::<Interval>()?;
    let count = count.unwrap_or(settings.market.window_capacity);
    let api_client = ApiClient::new(&settings.binance)?;

    tracing::info!(%symbol, %interval, count, "Fetching historical klines.");
    let bars = api_client.get_continuous_klines(&symbol, interval, count).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bars)?);
        return Ok(());
    }

    println!("{:<20} {:>14} {:>14} {:>14} {:>14} {:>16}", "time", "open", "high", "low", "close", "volume");
    for bar in &bars {
        println!(
            "{:<20} {:>14} {:>14} {:>14} {:>14} {:>16}",
            format_time(bar.time),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
    }
    tracing::info!(count = bars.len(), "Done.");
    Ok(())
}

fn format_time(epoch_ms: i64) -> String {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}
