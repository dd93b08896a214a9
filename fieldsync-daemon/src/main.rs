//! fieldsync daemon
//!
//! Runs the content bridge next to a host that talks JSON lines:
//! 1. host envelopes (`{"origin": ..., "data": {...}}`) are read from stdin
//! 2. outbound protocol messages are written to stdout
//! 3. rendering consumers read content over HTTP
//!
//! Usage:
//!   fieldsync-daemon --config bridge.json --data-dir ./content --http-port 4180
//!
//! Logs go to stderr so stdout stays a clean message stream.

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::Parser;
use fieldsync_daemon::{build_router, load_config, pump_host_messages, write_host_messages};
use fieldsync_storage::{FileTier, SessionTier, SqliteTier};
use fieldsync_sync::{ContentService, MpscChannel};
use tokio::io::BufReader;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const OUTBOUND_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "fieldsync-daemon")]
#[command(about = "Content sync bridge between a rendering frontend and its host")]
struct Args {
    /// Path to a JSON bridge config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the durable storage tiers
    #[arg(short, long, default_value = "fieldsync-data")]
    data_dir: PathBuf,

    /// HTTP API port for rendering consumers
    #[arg(long, default_value = "4180")]
    http_port: u16,

    /// Storage namespace (overrides the config file)
    #[arg(long)]
    origin: Option<String>,

    /// Trusted host origin, repeatable (adds to the config file)
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Content endpoint URL (overrides the config file)
    #[arg(long)]
    content_endpoint: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(origin) = args.origin {
        config.origin = origin;
    }
    config.allowed_origins.extend(args.allow_origins);
    if let Some(endpoint) = args.content_endpoint {
        config.remote.content_endpoint = endpoint;
    }
    if config.allowed_origins.is_empty() {
        warn!("No trusted origins configured, every host message will be dropped");
    }

    info!("fieldsync daemon starting for origin {}...", config.origin);
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("Failed to create data dir {}", args.data_dir.display()))?;
    let sqlite = SqliteTier::open(args.data_dir.join("content.db"), config.origin.clone())
        .context("Failed to open SQLite tier")?;

    let (channel, outbound) = MpscChannel::pair(OUTBOUND_BUFFER);
    let writer = tokio::spawn(write_host_messages(outbound, tokio::io::stdout()));

    let service = Arc::new(
        ContentService::builder(config.clone())
            .tier(Arc::new(FileTier::new(&args.data_dir, &config.origin)))
            .tier(Arc::new(SessionTier::new()))
            .tier(Arc::new(sqlite))
            .channel(Arc::new(channel))
            .build()
            .context("Failed to build content service")?,
    );
    service.start().await.context("Failed to start content service")?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", args.http_port))?;
    info!("HTTP content API listening on port {}", args.http_port);
    let app = build_router(service.clone());
    let http = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("HTTP server failed: {}", e);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = pump_host_messages(&service, stdin) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    service.shutdown();
    http.abort();
    writer.abort();
    Ok(())
}
