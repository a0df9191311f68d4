mod coordinator;
mod http;
mod metrics;
mod state;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coordinator::MutationCoordinator;
use firewatch_core::{IncidentStore, StoreMutation};
use firewatch_feed::{FeedAdapter, FeedClient, RestBackend, SharedStore};
use http::router;
use metrics::init_metrics;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "firewatch")]
#[command(about = "Wildfire incident sync engine: change-feed driven store with operator triage API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync engine and HTTP API
    Run {
        /// Websocket URL of the incident change feed
        #[arg(long, default_value = "ws://127.0.0.1:4000/feed")]
        feed_url: String,
        /// Base URL of the incident REST backend
        #[arg(long, default_value = "http://127.0.0.1:4000")]
        api_url: String,
        /// HTTP server address
        #[arg(long, default_value = "127.0.0.1:8080")]
        http: String,
        /// Feed ping interval (e.g., "30s")
        #[arg(long, default_value = "30s")]
        ping_interval: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            feed_url,
            api_url,
            http,
            ping_interval,
        } => {
            run_engine(feed_url, api_url, http, ping_interval).await?;
        }
    }

    Ok(())
}

async fn run_engine(
    feed_url: String,
    api_url: String,
    http_addr: String,
    ping_interval_str: String,
) -> anyhow::Result<()> {
    info!("starting firewatch");
    info!("feed: {}, api: {}, http: {}", feed_url, api_url, http_addr);

    let ping_interval = parse_duration(&ping_interval_str)
        .context("Invalid ping interval format (e.g., '30s', '1m')")?;

    init_metrics();
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus metrics recorder")?;

    let store: SharedStore = Arc::new(RwLock::new({
        let mut store = IncidentStore::new();
        store.on_mutation(|mutation| match mutation {
            StoreMutation::Upserted(_) => metrics::record_store_upsert(),
            StoreMutation::Removed(_) => metrics::record_store_remove(),
        });
        store
    }));

    let backend = Arc::new(RestBackend::new(api_url));

    // Feed client -> adapter channel, and the teardown switch for the
    // subscription (flipped on shutdown so the channel is not leaked)
    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = FeedClient::new(feed_url, ping_interval, feed_tx);
    let mut client_handle = tokio::spawn(async move {
        if let Err(e) = client.run(shutdown_rx).await {
            error!("feed client error: {}", e);
        }
    });

    let (adapter, feed_status) = FeedAdapter::new(store.clone(), backend.clone());
    let mut adapter_handle = tokio::spawn(adapter.run(feed_rx));

    let coordinator = Arc::new(MutationCoordinator::new(store.clone(), backend));
    let app_state = AppState::new(store, coordinator, feed_status, metrics_handle);

    let app = router(app_state);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;
    info!("HTTP server listening on http://{}", http_addr);
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("http server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, closing feed subscription");
            let _ = shutdown_tx.send(true);
            let _ = (&mut client_handle).await;
        }
        _ = &mut client_handle => {
            warn!("feed client task ended");
        }
        _ = &mut adapter_handle => {
            warn!("feed adapter task ended");
        }
        _ = &mut server_handle => {
            warn!("http server task ended");
        }
    }

    Ok(())
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(secs.parse()?))
    } else if let Some(mins) = s.strip_suffix('m') {
        Ok(Duration::from_secs(mins.parse::<u64>()? * 60))
    } else {
        // Bare number means seconds
        Ok(Duration::from_secs(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("fast").is_err());
    }
}
