//! skyloc-ingest - live image geolocation service
//!
//! Reads the Bluesky firehose, finds places mentioned in English image alt
//! text, geocodes them, and streams located images to `/feed` subscribers.

use anyhow::{Context, Result};
use clap::Parser;
use skyloc_common::config::TomlConfig;
use skyloc_ingest::config::{resolve_config, ConfigOverrides};
use skyloc_ingest::locate::{GeocodeCache, LocationResolver, PlaceLookup};
use skyloc_ingest::pipeline::{AcceptStage, ExtractStage, IngestQueue, PipelineStats, Supervisor};
use skyloc_ingest::services::{HttpEntityExtractor, JetstreamFeed, NominatimClient, WhatlangDetector};
use skyloc_ingest::subscribers::SubscriberRegistry;
use skyloc_ingest::{AppState, PipelineError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "skyloc-ingest")]
#[command(about = "Live geolocation of Bluesky image alt text")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "SKYLOC_CONFIG")]
    config: Option<PathBuf>,

    /// Address to serve /feed, /stats and /health on
    #[arg(short, long, env = "SKYLOC_BIND")]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SKYLOC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Upstream Jetstream websocket URL
    #[arg(long, env = "SKYLOC_FEED_URL")]
    feed_url: Option<String>,

    /// Entity extraction endpoint
    #[arg(long, env = "SKYLOC_EXTRACTOR_URL")]
    extractor_url: Option<String>,

    /// Nominatim base URL
    #[arg(long, env = "SKYLOC_GEOCODER_URL")]
    geocoder_url: Option<String>,

    /// User-Agent with contact details, sent to the geocoder
    #[arg(long, env = "SKYLOC_GEOCODER_USER_AGENT")]
    geocoder_user_agent: Option<String>,

    /// Minimum milliseconds between geocoder calls
    #[arg(long, env = "SKYLOC_GEOCODER_MIN_INTERVAL_MS")]
    geocoder_min_interval_ms: Option<u64>,

    /// Events buffered between feed and extraction
    #[arg(long, env = "SKYLOC_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            bind: self.bind.clone(),
            feed_url: self.feed_url.clone(),
            extractor_url: self.extractor_url.clone(),
            geocoder_url: self.geocoder_url.clone(),
            geocoder_user_agent: self.geocoder_user_agent.clone(),
            geocoder_min_interval_ms: self.geocoder_min_interval_ms,
            queue_capacity: self.queue_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(args.config.as_deref(), args.overrides())
        .context("Failed to load configuration")?;

    let default_filter = format!(
        "skyloc_ingest={level},skyloc_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting skyloc-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        reason = run(config) => {
            let reason = reason?;
            error!("Pipeline stopped: {}", reason);
            Err(reason).context("Pipeline failed")
        }
        _ = shutdown_signal() => {
            info!("Shutdown complete");
            Ok(())
        }
    }
}

/// Wire every component together and run until a stage stops
async fn run(config: TomlConfig) -> Result<PipelineError> {
    let stats = Arc::new(PipelineStats::new());
    let queue = Arc::new(IngestQueue::new(config.queue.capacity, Arc::clone(&stats)));
    let registry = Arc::new(SubscriberRegistry::new(
        config.subscribers.history,
        Arc::clone(&stats),
    ));

    let geocoder = NominatimClient::from_config(&config.geocoder)
        .context("Failed to build geocoding client")?;
    let cache = GeocodeCache::from_config(Arc::new(geocoder), &config.geocoder)
        .with_stats(Arc::clone(&stats));
    let lookup: Arc<dyn PlaceLookup> = Arc::new(cache);
    info!("Geocoder: {}", config.geocoder.base_url);

    let extractor = HttpEntityExtractor::from_config(&config.extractor)
        .context("Failed to build extraction client")?;
    info!("Entity extractor: {}", config.extractor.url);

    let feed = JetstreamFeed::connect(&config.feed.url)
        .await
        .context("Failed to connect to upstream feed")?;

    let accept = AcceptStage::new(
        Box::new(feed),
        Arc::clone(&queue),
        Arc::clone(&stats),
        config.feed.idle_timeout(),
    );
    let extract = ExtractStage::new(
        queue,
        Arc::new(WhatlangDetector),
        Arc::new(extractor),
        LocationResolver::new(lookup),
        Arc::clone(&registry),
        Arc::clone(&stats),
    );

    let state = AppState::new(registry, stats, config.subscribers.buffer);
    let app = skyloc_ingest::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;
    info!("Listening on http://{}", config.server.bind);
    info!("Located image stream: http://{}/feed", config.server.bind);

    let mut supervisor = Supervisor::new();
    supervisor.spawn("accept", accept.run());
    supervisor.spawn("extract", extract.run());
    supervisor.spawn("http", async move {
        axum::serve(listener, app).await?;
        Ok(())
    });

    Ok(supervisor.wait().await)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
