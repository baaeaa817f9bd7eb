// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence sink
//!
//! Append-only writer bound to one feed's partition.

use crate::document::{Document, NormalizedDocument};
use crate::message::Feed;
use crate::store::{DocumentStore, InsertReceipt, Partition, StoreError};
use std::sync::Arc;

/// Inserts normalized documents for one feed.
///
/// Every call is an unconditional insert; no batching or deduplication.
#[derive(Clone)]
pub struct PersistenceSink {
    feed: Feed,
    store: Arc<dyn DocumentStore>,
}

impl PersistenceSink {
    pub fn new(feed: Feed, store: Arc<dyn DocumentStore>) -> Self {
        Self { feed, store }
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    pub fn partition(&self) -> Partition {
        self.feed.partition()
    }

    /// Append one document to the feed's partition.
    ///
    /// The store call runs on the blocking pool.
    pub async fn insert(&self, document: &NormalizedDocument) -> Result<InsertReceipt, StoreError> {
        let partition = self.partition();
        if document.partition() != partition {
            return Err(StoreError::Rejected(format!(
                "{} document does not belong to the {} partition",
                document.partition(),
                partition
            )));
        }

        let indexed = document.index()?;
        let store = Arc::clone(&self.store);
        let id = tokio::task::spawn_blocking(move || store.insert(partition, &indexed))
            .await
            .map_err(|e| StoreError::Unavailable(format!("insert task failed: {}", e)))??;

        Ok(InsertReceipt { partition, id })
    }
}
