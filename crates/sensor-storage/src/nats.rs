// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NATS-backed message bus.

use crate::bus::{BusError, BusMessage, MessageBus, Subscription, SUBSCRIPTION_BUFFER};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Core NATS (no JetStream) subscriber.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, BusError> {
        info!("Connecting to NATS at {} (timeout {:?})", url, timeout);

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .map_err(|e| BusError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        info!("Connected to NATS");
        Ok(Self { client })
    }

    /// Flush pending protocol traffic before shutdown.
    pub async fn close(&self) {
        if let Err(e) = self.client.flush().await {
            warn!("NATS flush failed during shutdown: {}", e);
        }
        info!("NATS connection closed");
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        let mut subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let pattern = subject.to_string();
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let forwarded = BusMessage::new(message.subject.to_string(), message.payload.to_vec());
                if let Err(rejected) = tx.send(forwarded).await {
                    // Router stopped; stop server-side delivery for this subject.
                    warn!(
                        "Router gone, message on {} not handled",
                        rejected.0.subject
                    );
                    if let Err(e) = subscriber.unsubscribe().await {
                        warn!("Unsubscribe from {} failed: {}", pattern, e);
                    }
                    break;
                }
            }
            debug!("NATS subscription {} ended", pattern);
        });

        info!("Subscribed to {}", subject);
        Ok(rx)
    }
}
