use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use todo_sync::application::ports::NetworkMonitor;
use todo_sync::domain::{NetworkState, TodoPayload};
use todo_sync::infrastructure::{
    ConnectionPool, MemoryRemoteStore, ProbeNetworkMonitor, ReportedNetworkMonitor,
    SqliteRecordStore,
};
use todo_sync::{init_logging, AppConfig, AppError, SyncEngine, DEFAULT_LOG_FILTER};
use tracing::info;

#[derive(Parser)]
#[command(name = "sync-harness")]
#[command(about = "Drives the offline-first todo engine end to end", long_about = None)]
struct Cli {
    /// SQLite database url (overrides TODO_SYNC_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Todos to create while offline
    #[arg(short, long, default_value_t = 3)]
    records: u32,

    /// Simulated remote latency per call
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Probe the configured endpoint before running
    #[arg(long)]
    probe: bool,

    /// Log filter (trace, debug, info, warn, error or directives)
    #[arg(short, long, default_value = DEFAULT_LOG_FILTER, env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    config.validate().map_err(AppError::ValidationError)?;
    ensure_database_dir(&config.database.url)?;

    if cli.probe {
        let probe = ProbeNetworkMonitor::from_config(&config.network);
        let state = probe.fetch_once().await?;
        info!(
            address = %config.network.probe_address,
            online = state.is_online(),
            "connectivity probe"
        );
    }

    let pool = ConnectionPool::from_config(&config.database)
        .await
        .with_context(|| format!("opening {}", config.database.url))?;
    let store = Arc::new(SqliteRecordStore::open(pool.clone()).await?);
    let remote = Arc::new(MemoryRemoteStore::new(config.sync.collection.clone()));
    remote.set_latency(Duration::from_millis(cli.latency_ms));
    let network = Arc::new(ReportedNetworkMonitor::offline());

    let engine = SyncEngine::new(store, remote.clone(), network.clone(), config.sync.clone());
    let _network_changes =
        engine.on_network_change(|online| info!(online, "network change observed"));
    let _sync_complete = engine.on_sync_complete(|| info!("sync complete observed"));
    engine.init().await;

    for index in 0..cli.records {
        let record = engine
            .create(TodoPayload::new(
                format!("todo {}", index + 1),
                20 + i64::from(index),
            ))
            .await?;
        info!(local_id = %record.local_id, "created offline");
    }

    network.report(NetworkState::online()).await;
    let report = engine.full_sync().await?;
    engine.wait_for_background().await;

    let output = json!({
        "report": report,
        "todos": engine.list().await?,
        "remote": remote.stats(),
        "metrics": engine.metrics_snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    engine.cleanup();
    pool.close().await;
    Ok(())
}

fn ensure_database_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let path = path.trim_start_matches("//");
    if path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}
