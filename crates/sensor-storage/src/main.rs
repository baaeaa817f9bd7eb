// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor Storage Service CLI
//!
//! Subscribes to the sensor feeds on NATS, persists every message to SQLite
//! and serves the latest documents over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Run with default settings (NATS on localhost, HTTP on :4000)
//! sensor-storage --nats-server nats://127.0.0.1:4222 --db sensor_storage.db
//!
//! # Same, configured through the environment
//! NATS_SERVER=nats://nats:4222 PORT=8080 sensor-storage serve
//!
//! # Document counts per partition
//! sensor-storage --db sensor_storage.db stats
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_storage::{
    AppContext, Config, DocumentStore, FeedSubjects, NatsBus, Partition, PartitionNames,
    SqliteStore, StorageService,
};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "sensor-storage")]
#[command(about = "Sensor Storage Service - bus ingestion with a read-only REST API", long_about = None)]
#[command(version)]
struct Args {
    /// NATS server URL
    #[arg(long, env = "NATS_SERVER", default_value = "nats://127.0.0.1:4222")]
    nats_server: String,

    /// NATS connection timeout in seconds
    #[arg(long, env = "NATS_CONNECT_TIMEOUT", default_value_t = 5)]
    nats_connect_timeout: u64,

    /// Database path (SQLite file)
    #[arg(short, long, env = "STORAGE_DB", default_value = "sensor_storage.db")]
    db: String,

    /// Table holding raw readings
    #[arg(long, env = "RAW_COLLECTION", default_value = "raw_measurements")]
    raw_collection: String,

    /// Table holding windowed averages
    #[arg(long, env = "AVG_COLLECTION", default_value = "avg_measurements")]
    avg_collection: String,

    /// Table holding security events
    #[arg(long, env = "SEC_COLLECTION", default_value = "security_events")]
    sec_collection: String,

    /// Table holding commands
    #[arg(long, env = "COMMANDS_COLLECTION", default_value = "commands")]
    commands_collection: String,

    /// Subject for raw readings (NATS wildcards allowed)
    #[arg(long, env = "SUBJECT_RAW", default_value = "sensors.raw.>")]
    subject_raw: String,

    /// Subject for windowed averages
    #[arg(long, env = "SUBJECT_AVG", default_value = "sensors.avg.>")]
    subject_avg: String,

    /// Subject for security events
    #[arg(long, env = "SUBJECT_SECURITY", default_value = "sensors.security.>")]
    subject_security: String,

    /// HTTP bind address
    #[arg(short, long, env = "BIND", default_value = "0.0.0.0")]
    bind: String,

    /// HTTP server port
    #[arg(short, long, env = "PORT", default_value_t = 4000)]
    port: u16,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the service (default)
    Serve,
    /// Show document counts per partition
    Stats,
}

impl Args {
    fn config(&self) -> Result<Config> {
        let config = Config::builder()
            .nats_server(&self.nats_server)
            .nats_connect_timeout_secs(self.nats_connect_timeout)
            .db_path(&self.db)
            .partitions(PartitionNames {
                raw: self.raw_collection.clone(),
                average: self.avg_collection.clone(),
                security: self.sec_collection.clone(),
                commands: self.commands_collection.clone(),
            })
            .subjects(FeedSubjects {
                raw: self.subject_raw.clone(),
                average: self.subject_avg.clone(),
                security: self.subject_security.clone(),
            })
            .bind(&self.bind)
            .port(self.port)
            .build()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = args.config().context("Invalid configuration")?;

    // Create SQLite store
    let store = SqliteStore::new(&config.db_path, config.partitions.clone())
        .with_context(|| format!("Failed to open database {}", config.db_path))?;

    match args.command {
        Some(Commands::Stats) => print_stats(&store, &config),
        Some(Commands::Serve) | None => serve(config, store).await,
    }
}

async fn serve(config: Config, store: SqliteStore) -> Result<()> {
    let bus = NatsBus::connect(&config.nats_server, config.nats_connect_timeout())
        .await
        .context("Failed to connect to the message bus")?;

    let addr = config.http_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let service = StorageService::new(config, AppContext::new(store));
    let result = service.run(&bus, listener, shutdown_signal()).await;

    bus.close().await;
    result
}

fn print_stats(store: &SqliteStore, config: &Config) -> Result<()> {
    println!("Database: {}", config.db_path);
    for partition in Partition::ALL {
        let count = store.count(partition)?;
        println!(
            "  {:<10} {:<20} {} documents",
            partition,
            store.table(partition),
            count
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
