// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor Storage Service
//!
//! Persists sensor telemetry streamed over a message bus and serves the
//! latest documents over a small read-only REST API.
//!
//! # Features
//!
//! - **Three feeds** -- Raw readings, windowed averages and security events
//! - **Lenient decoding** -- Bad timestamps become `null`, never a dropped message
//! - **SQLite Backend** -- One append-only table per partition
//! - **Read API** -- Latest-first listings filtered by sensor and house
//!
//! # Architecture
//!
//! ```text
//! StorageService
//! +-- SubscriptionRouter  (bus subject -> FeedHandler, one task per message)
//! |   +-- FeedHandler     (decode -> transform -> PersistenceSink)
//! +-- Read API            (axum, query params -> FindSpec -> DocumentStore)
//! +-- DocumentStore       (SQLite backend)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sensor_storage::{AppContext, Config, NatsBus, SqliteStore, StorageService};
//!
//! let config = Config::builder().nats_server("nats://127.0.0.1:4222").build()?;
//! let store = SqliteStore::new(&config.db_path, config.partitions.clone())?;
//! let bus = NatsBus::connect(&config.nats_server, config.nats_connect_timeout()).await?;
//! let listener = tokio::net::TcpListener::bind(config.http_addr()?).await?;
//!
//! StorageService::new(config, AppContext::new(store))
//!     .run(&bus, listener, shutdown_signal())
//!     .await?;
//! ```

pub mod api;
pub mod bus;
pub mod config;
pub mod context;
pub mod document;
pub mod message;
pub mod nats;
pub mod query;
pub mod router;
pub mod sink;
pub mod sqlite;
pub mod store;
pub mod transform;

pub use bus::{BusError, BusMessage, ChannelBus, MessageBus};
pub use config::{Config, ConfigError, FeedSubjects, PartitionNames};
pub use context::AppContext;
pub use document::{AggregateWindow, Command, Document, NormalizedDocument, RawReading, SecurityEvent};
pub use message::{DecodeError, Feed, InboundMessage};
pub use nats::NatsBus;
pub use router::{
    FeedHandler, FeedRoute, IngestError, IngestStatsSnapshot, MessageHandler, RouterHandle,
    SubscriptionRouter,
};
pub use sink::PersistenceSink;
pub use sqlite::SqliteStore;
pub use store::{DocumentStore, Filter, FindSpec, Partition, StoreError};

use anyhow::{Context, Result};
use std::future::Future;
use tokio::net::TcpListener;

/// Storage Service
///
/// Runs the subscription router and the read API side by side until the
/// shutdown future resolves.
pub struct StorageService {
    config: Config,
    ctx: AppContext,
}

impl StorageService {
    pub fn new(config: Config, ctx: AppContext) -> Self {
        Self { config, ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Run the storage service
    ///
    /// Subscription failures abort startup. Once `shutdown` resolves the
    /// router drains in-flight inserts and the HTTP server stops accepting
    /// requests.
    pub async fn run<B, F>(self, bus: &B, listener: TcpListener, shutdown: F) -> Result<()>
    where
        B: MessageBus + ?Sized,
        F: Future<Output = ()> + Send,
    {
        tracing::info!("Starting Sensor Storage Service");
        self.config.log_summary();

        let router = SubscriptionRouter::new(&self.ctx, self.config.routes());
        let handle = router.handle();

        let http_handle = handle.clone();
        let http = api::serve(listener, self.ctx.clone(), async move {
            http_handle.stopped().await
        });

        let stop = async {
            shutdown.await;
            tracing::info!("Shutdown requested");
            handle.stop();
            Ok::<(), anyhow::Error>(())
        };

        tokio::try_join!(
            async { router.run(bus).await.context("Subscription router failed") },
            async { http.await.context("HTTP server failed") },
            stop,
        )?;

        tracing::info!("Sensor Storage Service stopped");
        Ok(())
    }
}
