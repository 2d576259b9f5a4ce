use bybit_tape::api::BybitWebSocketClient;
use bybit_tape::config::Config;
use bybit_tape::models::{EventKind, RawEnvelope};
use bybit_tape::pipeline::{Classification, DispatchReport, LineFormatter, SeverityTable, StreamDispatcher};
use bybit_tape::utils::TerminalConsole;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bybit_tape=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Bybit market tape");

    // Load environment variables
    dotenv::dotenv().ok();

    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Configuration loaded from {}", config_path);

    // Build the dispatcher
    let dispatcher = StreamDispatcher::from_config(&config, Arc::new(TerminalConsole))?;
    for sink in dispatcher.sinks() {
        info!("Logging {} events to {}", sink.kind(), sink.path().display());
    }

    print_banner(&config);

    // Create WebSocket client
    let ws_client = BybitWebSocketClient::new(
        config.stream.ws_url.clone(),
        config.subscription_topics(),
        Duration::from_secs(config.stream.ping_interval_secs.max(1)),
        Duration::from_secs(config.stream.max_reconnect_delay_secs.max(1)),
    );

    // Create channel for envelopes
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RawEnvelope>();

    // Spawn WebSocket task
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_client.run(event_tx).await {
            error!("WebSocket task failed: {:?}", e);
        }
    });

    // Main event loop
    let mut totals = DispatchReport::default();
    let mut status = tokio::time::interval(Duration::from_secs(60));
    status.tick().await;

    loop {
        tokio::select! {
            Some(envelope) = event_rx.recv() => {
                totals += dispatcher.dispatch(&envelope);
            }
            _ = status.tick() => {
                info!(
                    "Status: processed {} | malformed {} | persist failures {} | alerts {}",
                    totals.processed, totals.malformed, totals.persist_failures, totals.alerts
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    println!("\nExiting...");
    ws_handle.abort();

    Ok(())
}

fn print_banner(config: &Config) {
    let severity = SeverityTable::from_config(config);

    for kind in &config.stream.kinds {
        println!(
            "Subscribed to {} info for {}",
            kind,
            config.symbols_for(*kind).join(", ")
        );
        if let Some(Classification::Notional(breakpoints)) = severity.get(*kind) {
            println!("Stars indicate size: {}", breakpoints.legend());
        }
        if *kind == EventKind::Liquidation {
            println!("Liquidation USD values use the bankruptcy price and are approximate");
        }
        println!("{}", LineFormatter::legend(*kind));
    }
    println!("Monitoring...");
}
