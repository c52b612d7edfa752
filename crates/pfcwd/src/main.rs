//! PFC watchdog orchestration agent entry point.
//!
//! Wires the PfcWdOrch to Redis: the `PFC_WD` table of CONFIG_DB and the
//! `PFC_WD` notification channel of COUNTERS_DB feed the daemon event loop,
//! and counters and polling metadata are written back to COUNTERS_DB and
//! PFC_WD_DB. The switch itself is the in-memory virtual switch, populated
//! from a JSON port inventory.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sonic_orch_common::redis_backend::{
    subscribe_config_table, subscribe_notifications, RedisConfig, RedisTable,
};
use sonic_orch_common::{MemoryTable, Table};
use sonic_pfcwd::audit::{init_logging, init_logging_pretty};
use sonic_pfcwd::daemon::{DaemonEvent, OrchDaemon, OrchDaemonConfig};
use sonic_pfcwd::pfcwd::{
    EngineProfile, PfcWdOrch, PfcWdOrchConfig, COUNTERS_TABLE, PFC_WD_NOTIFICATION_CHANNEL,
    PFC_WD_STATE_TABLE, PFC_WD_TABLE,
};
use sonic_pfcwd::vs::VirtualSwitch;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

/// Where counters and polling metadata are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Storage {
    Redis,
    /// Keep published state in process (dry runs)
    Memory,
}

/// SONiC PFC Watchdog Orchestration Agent
#[derive(Parser, Debug)]
#[command(name = "pfcwdorch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Mitigation profile (acl, zero-buffer)
    #[arg(short = 'p', long, default_value = "acl")]
    profile: EngineProfile,

    /// Detector polling interval in milliseconds
    #[arg(long, default_value = "200")]
    poll_interval: u32,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat_interval: u64,

    /// Redis server host
    #[arg(long, default_value = "127.0.0.1")]
    redis_host: String,

    /// Redis server port
    #[arg(long, default_value = "6379")]
    redis_port: u16,

    /// Where counters and polling metadata are written
    #[arg(long, value_enum, default_value_t = Storage::Redis)]
    storage: Storage,

    /// JSON port inventory for the virtual switch
    #[arg(short = 'i', long)]
    inventory: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Json => init_logging(&args.log_level),
        LogFormat::Pretty => init_logging_pretty(&args.log_level),
    }

    info!(
        profile = %args.profile,
        poll_interval_ms = args.poll_interval,
        heartbeat_interval_ms = args.heartbeat_interval,
        redis = %format!("{}:{}", args.redis_host, args.redis_port),
        storage = ?args.storage,
        "Starting SONiC PFC watchdog orchestration"
    );

    match run(args).await {
        Ok(()) => {
            info!("PFC watchdog orchestration stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let vs = Arc::new(match &args.inventory {
        Some(path) => VirtualSwitch::load_inventory(path)
            .with_context(|| format!("loading inventory {}", path.display()))?,
        None => {
            warn!("No port inventory given, starting with an empty switch");
            VirtualSwitch::new()
        }
    });

    let (counters, metadata): (Arc<dyn Table>, Arc<dyn Table>) = match args.storage {
        Storage::Redis => (
            Arc::new(
                RedisTable::connect(
                    &RedisConfig::counter_db(&args.redis_host, args.redis_port),
                    COUNTERS_TABLE,
                )
                .context("connecting to COUNTERS_DB")?,
            ),
            Arc::new(
                RedisTable::connect(
                    &RedisConfig::pfc_wd_db(&args.redis_host, args.redis_port),
                    PFC_WD_STATE_TABLE,
                )
                .context("connecting to PFC_WD_DB")?,
            ),
        ),
        Storage::Memory => (
            Arc::new(MemoryTable::new(COUNTERS_TABLE)),
            Arc::new(MemoryTable::new(PFC_WD_STATE_TABLE)),
        ),
    };

    let orch_config = PfcWdOrchConfig {
        poll_interval_ms: args.poll_interval,
        profile: args.profile,
        ..Default::default()
    };
    let orch = PfcWdOrch::new(orch_config, vs.clone(), vs, counters, metadata);

    let daemon_config = OrchDaemonConfig {
        heartbeat_interval_ms: args.heartbeat_interval,
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel::<DaemonEvent>(daemon_config.channel_capacity);
    let mut daemon = OrchDaemon::new(daemon_config, rx);
    daemon.register_orch(Box::new(orch));

    let config_tx = tx.clone();
    let config_db = RedisConfig::config_db(&args.redis_host, args.redis_port);
    tokio::spawn(async move {
        if let Err(e) = subscribe_config_table(config_db, PFC_WD_TABLE.to_string(), config_tx).await
        {
            error!("{} subscriber stopped: {}", PFC_WD_TABLE, e);
        }
    });

    let notification_tx = tx.clone();
    let counter_db = RedisConfig::counter_db(&args.redis_host, args.redis_port);
    tokio::spawn(async move {
        if let Err(e) = subscribe_notifications(
            counter_db,
            PFC_WD_NOTIFICATION_CHANNEL.to_string(),
            notification_tx,
        )
        .await
        {
            error!("{} channel subscriber stopped: {}", PFC_WD_NOTIFICATION_CHANNEL, e);
        }
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received interrupt"),
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
        let _ = tx.send(DaemonEvent::Shutdown).await;
    });

    daemon.run().await;
    Ok(())
}
