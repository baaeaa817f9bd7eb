// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription router
//!
//! Binds each feed's subject to a message handler and pumps bus messages
//! into it.
//!
//! # Operation
//!
//! 1. Subscribe to every configured subject (any failure aborts startup)
//! 2. Run one pump task per feed
//! 3. Handle every message on its own task: decode, transform, insert
//! 4. Log one line per message (insert summary or error), never retry
//! 5. On stop or bus close, drain in-flight handlers and return

use crate::bus::{BusError, BusMessage, MessageBus, Subscription};
use crate::context::AppContext;
use crate::document::NormalizedDocument;
use crate::message::{DecodeError, Feed, InboundMessage};
use crate::sink::PersistenceSink;
use crate::store::{InsertReceipt, StoreError};
use crate::transform;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Per-message failure. Logged by the router; the message is dropped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("insert failed: {0}")]
    Store(#[from] StoreError),
}

/// Binding of a feed to the subject it is received on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRoute {
    pub feed: Feed,
    pub subject: String,
}

impl FeedRoute {
    pub fn new(feed: Feed, subject: impl Into<String>) -> Self {
        Self {
            feed,
            subject: subject.into(),
        }
    }
}

/// Result of handling one message.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub receipt: InsertReceipt,
    pub document: NormalizedDocument,
}

/// Handles one bus message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: BusMessage) -> Result<Ingested, IngestError>;
}

/// Decode -> transform -> insert for one feed.
pub struct FeedHandler {
    sink: PersistenceSink,
}

impl FeedHandler {
    pub fn new(sink: PersistenceSink) -> Self {
        Self { sink }
    }

    pub fn feed(&self) -> Feed {
        self.sink.feed()
    }
}

#[async_trait]
impl MessageHandler for FeedHandler {
    async fn handle(&self, message: BusMessage) -> Result<Ingested, IngestError> {
        let inbound = InboundMessage::decode(self.feed(), &message.payload)?;
        let document = transform::normalize(inbound);
        let receipt = self.sink.insert(&document).await?;

        Ok(Ingested { receipt, document })
    }
}

/// Per-feed counters.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub received: AtomicU64,
    pub stored: AtomicU64,
    pub failed: AtomicU64,
}

impl IngestStats {
    pub fn snapshot(&self, feed: Feed) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            feed,
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub feed: Feed,
    pub received: u64,
    pub stored: u64,
    pub failed: u64,
}

/// Stops a running router.
#[derive(Clone)]
pub struct RouterHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl RouterHandle {
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        let mut rx = self.stop_tx.subscribe();
        // Err only when the sender is gone, which cannot happen while `self` holds it.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

struct BoundFeed {
    route: FeedRoute,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<IngestStats>,
}

/// Subscription router
pub struct SubscriptionRouter {
    feeds: Vec<BoundFeed>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl SubscriptionRouter {
    /// Router with no feeds bound.
    pub fn empty() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            feeds: Vec::new(),
            stop_tx: Arc::new(stop_tx),
        }
    }

    /// Bind every route to a `FeedHandler` writing through `ctx`.
    pub fn new(ctx: &AppContext, routes: Vec<FeedRoute>) -> Self {
        routes.into_iter().fold(Self::empty(), |router, route| {
            let handler = FeedHandler::new(ctx.sink(route.feed));
            router.bind(route, Arc::new(handler))
        })
    }

    pub fn bind(mut self, route: FeedRoute, handler: Arc<dyn MessageHandler>) -> Self {
        self.feeds.push(BoundFeed {
            route,
            handler,
            stats: Arc::new(IngestStats::default()),
        });
        self
    }

    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            stop_tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Counters of the first route bound to `feed`.
    pub fn stats(&self, feed: Feed) -> Option<IngestStatsSnapshot> {
        self.feeds
            .iter()
            .find(|bound| bound.route.feed == feed)
            .map(|bound| bound.stats.snapshot(feed))
    }

    pub fn stats_snapshot(&self) -> Vec<IngestStatsSnapshot> {
        self.feeds
            .iter()
            .map(|bound| bound.stats.snapshot(bound.route.feed))
            .collect()
    }

    /// Subscribe all routes and process messages until stopped or the bus
    /// closes every subscription.
    pub async fn run<B: MessageBus + ?Sized>(&self, bus: &B) -> Result<(), BusError> {
        let mut subscriptions = Vec::with_capacity(self.feeds.len());
        for bound in &self.feeds {
            let subscription = bus.subscribe(&bound.route.subject).await?;
            info!(
                "[{}] subscribed to {}",
                bound.route.feed.tag(),
                bound.route.subject
            );
            subscriptions.push(subscription);
        }

        let mut pumps = JoinSet::new();
        for (bound, subscription) in self.feeds.iter().zip(subscriptions) {
            pumps.spawn(pump(
                bound.route.clone(),
                subscription,
                Arc::clone(&bound.handler),
                Arc::clone(&bound.stats),
                self.stop_tx.subscribe(),
            ));
        }

        while let Some(joined) = pumps.join_next().await {
            if let Err(e) = joined {
                error!("Feed task failed: {}", e);
            }
        }

        for stats in self.stats_snapshot() {
            info!(
                "[{}] received={} stored={} failed={}",
                stats.feed.tag(),
                stats.received,
                stats.stored,
                stats.failed
            );
        }
        Ok(())
    }
}

async fn pump(
    route: FeedRoute,
    mut subscription: Subscription,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<IngestStats>,
    mut stop: watch::Receiver<bool>,
) {
    let mut inflight = JoinSet::new();

    while !*stop.borrow() {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            message = subscription.recv() => match message {
                Some(message) => {
                    inflight.spawn(dispatch(
                        route.feed,
                        Arc::clone(&handler),
                        Arc::clone(&stats),
                        message,
                    ));
                }
                None => {
                    info!("[{}] subscription {} closed", route.feed.tag(), route.subject);
                    break;
                }
            },
            Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                if let Err(e) = joined {
                    error!("[{}] handler task failed: {}", route.feed.tag(), e);
                }
            }
        }
    }

    // Messages already delivered to the subscription still get their insert.
    subscription.close();
    let mut drained = 0usize;
    while let Some(message) = subscription.recv().await {
        drained += 1;
        inflight.spawn(dispatch(
            route.feed,
            Arc::clone(&handler),
            Arc::clone(&stats),
            message,
        ));
    }
    if drained > 0 {
        info!("[{}] draining {} buffered messages", route.feed.tag(), drained);
    }

    while let Some(joined) = inflight.join_next().await {
        if let Err(e) = joined {
            error!("[{}] handler task failed: {}", route.feed.tag(), e);
        }
    }
}

/// Exactly one insert attempt and one log line per message.
async fn dispatch(
    feed: Feed,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<IngestStats>,
    message: BusMessage,
) {
    stats.received.fetch_add(1, Ordering::Relaxed);
    let subject = message.subject.clone();

    match handler.handle(message).await {
        Ok(ingested) => {
            stats.stored.fetch_add(1, Ordering::Relaxed);
            log_inserted(&ingested);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("[{}] insert error (subject {}): {}", feed.tag(), subject, e);
        }
    }
}

fn log_inserted(ingested: &Ingested) {
    let id = ingested.receipt.id;
    match &ingested.document {
        NormalizedDocument::Raw(doc) => info!(
            "[RAW] inserted id={} sensor={} ts={} temp={} hum={} press={}",
            id,
            or_null(doc.metadata.sensor_name.as_ref()),
            iso(doc.ts_server),
            or_null(doc.temperature.as_ref()),
            or_null(doc.humidity.as_ref()),
            or_null(doc.pressure.as_ref()),
        ),
        NormalizedDocument::Average(doc) => info!(
            "[AVG] inserted id={} sensor={} t_end={} avg={} count={}",
            id,
            or_null(doc.metadata.sensor_name.as_ref()),
            iso(doc.t_end),
            or_null(doc.avg.as_ref()),
            or_null(doc.count.as_ref()),
        ),
        NormalizedDocument::Security(doc) => info!(
            "[SEC] inserted id={} sensor={} ts={} type={} from={} to={}",
            id,
            or_null(doc.metadata.sensor_name.as_ref()),
            iso(doc.ts_server),
            or_null(doc.event_type.as_ref()),
            or_null(doc.prev_state.as_ref()),
            or_null(doc.new_state.as_ref()),
        ),
    }
}

fn or_null<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

fn iso(ts: Option<DateTime<Utc>>) -> String {
    or_null(ts.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)))
}
