//! FleetRun Control Plane Server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetrun_control_plane::config::{
    StorageBackend, StorageConfig, DEFAULT_FORWARD_TIMEOUT_SECS, DEFAULT_LOCAL_TASK_ID_START,
};
use fleetrun_control_plane::replay::spawn_replay_loop;
use fleetrun_control_plane::table::DEFAULT_TABLE_SHARDS;
use fleetrun_control_plane::{http, AppState, Config, TaskHostService};
use fleetrun_core::TaskId;

#[derive(Parser, Debug)]
#[command(name = "fleetrun-control-plane")]
#[command(about = "Task host status tracking for center and edge sites")]
struct Args {
    /// Run as the center, owning the status store
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    authoritative: bool,

    /// HTTP bind address
    #[arg(long, default_value = "[::1]:50080")]
    http_addr: String,

    /// Center API base URL (repeatable, tried in order)
    #[arg(long = "center-api")]
    center_api: Vec<String>,

    /// Seconds to wait on one center before trying the next
    #[arg(long, default_value_t = DEFAULT_FORWARD_TIMEOUT_SECS)]
    forward_timeout_secs: u64,

    /// Status store backend (memory or sqlite)
    #[arg(long, default_value = "memory")]
    storage_backend: String,

    /// SQLite database path
    #[arg(long, default_value = "fleetrun.db")]
    sqlite_path: String,

    /// Prefix of every table name
    #[arg(long, default_value = "")]
    table_prefix: String,

    /// Number of task host tables
    #[arg(long, default_value_t = DEFAULT_TABLE_SHARDS)]
    table_shards: u32,

    /// First task id reserved for locally synthesized tasks
    #[arg(long, default_value_t = DEFAULT_LOCAL_TASK_ID_START)]
    local_task_id_start: i64,

    /// Seconds between result buffer replays
    #[arg(long, default_value_t = 5)]
    replay_interval_secs: u64,
}

impl Args {
    fn into_config(self) -> Result<Config, Box<dyn std::error::Error>> {
        let backend: StorageBackend = self.storage_backend.parse()?;
        Ok(Config {
            authoritative: self.authoritative,
            http_bind_addr: self.http_addr,
            center_api: self.center_api,
            forward_timeout_secs: self.forward_timeout_secs,
            storage: StorageConfig {
                backend,
                sqlite_path: self.sqlite_path,
                table_prefix: self.table_prefix,
                table_shards: self.table_shards,
            },
            local_task_id_start: TaskId::new(self.local_task_id_start),
            replay_interval_secs: self.replay_interval_secs,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fleetrun=info".parse()?),
        )
        .with_target(true)
        .init();

    let config = Args::parse().into_config()?;
    let http_addr: SocketAddr = config.http_bind_addr.parse()?;

    let service = Arc::new(TaskHostService::from_config(&config)?);
    let replay = spawn_replay_loop(
        service.clone(),
        Duration::from_secs(config.replay_interval_secs),
    );

    let state = AppState::with_service(service);
    let http_router = http::create_router(state);

    info!(
        http_addr = %http_addr,
        authoritative = config.authoritative,
        "Starting FleetRun control plane"
    );

    let http_listener = TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, http_router);

    info!("HTTP server listening on {}", http_addr);

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    replay.abort();
    Ok(())
}
