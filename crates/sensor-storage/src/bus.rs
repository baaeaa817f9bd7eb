// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message bus abstraction
//!
//! The storage service only needs to subscribe to subjects and receive
//! payloads. `NatsBus` implements this against a NATS server; `ChannelBus`
//! is an in-process implementation for tests and tooling.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Per-subscription buffer between the transport and the router.
pub const SUBSCRIPTION_BUFFER: usize = 1024;

/// Transport errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("Bus closed")]
    Closed,
}

/// A message as delivered by the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Concrete subject the message was published on
    pub subject: String,
    /// Raw payload (JSON)
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of messages for one subscription. Closed when the bus goes away.
pub type Subscription = mpsc::Receiver<BusMessage>;

/// Abstract bus interface
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribe to a subject (wildcards follow NATS rules).
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError>;
}

/// NATS subject matching: `*` matches one token, a trailing `>` matches
/// one or more tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// ============================================================================
// In-process implementation
// ============================================================================

/// In-process bus backed by tokio channels.
pub struct ChannelBus {
    subscribers: Mutex<Vec<(String, mpsc::Sender<BusMessage>)>>,
    closed: AtomicBool,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver a payload to every matching subscription.
    ///
    /// Returns the number of subscriptions that received it.
    pub async fn publish(&self, subject: &str, payload: impl Into<Vec<u8>>) -> usize {
        let payload = payload.into();
        let targets: Vec<_> = {
            let subscribers = match self.subscribers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            subscribers
                .iter()
                .filter(|(pattern, _)| subject_matches(pattern, subject))
                .map(|(_, tx)| tx.clone())
                .collect()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.send(BusMessage::new(subject, payload.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Serialize `value` as JSON and publish it.
    pub async fn publish_json(&self, subject: &str, value: &serde_json::Value) -> usize {
        self.publish(subject, value.to_string()).await
    }

    /// Drop all subscriptions; receivers see end-of-stream.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        match self.subscribers.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    pub fn subscription_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        match self.subscribers.lock() {
            Ok(mut guard) => guard.push((subject.to_string(), tx)),
            Err(poisoned) => poisoned.into_inner().push((subject.to_string(), tx)),
        }
        Ok(rx)
    }
}
