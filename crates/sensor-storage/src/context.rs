// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared service context
//!
//! Built once at startup and handed to the subscription router and the
//! read API.

use crate::message::Feed;
use crate::sink::PersistenceSink;
use crate::store::{DocumentStore, FindSpec, Partition, StoreError};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    store: Arc<dyn DocumentStore>,
}

impl AppContext {
    pub fn new<S: DocumentStore + 'static>(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Sink writing to `feed`'s partition.
    pub fn sink(&self, feed: Feed) -> PersistenceSink {
        PersistenceSink::new(feed, self.store())
    }

    /// Run a find on the blocking pool.
    pub async fn find(&self, partition: Partition, spec: FindSpec) -> Result<Vec<Value>, StoreError> {
        let store = self.store();
        tokio::task::spawn_blocking(move || store.find(partition, &spec))
            .await
            .map_err(|e| StoreError::Unavailable(format!("query task failed: {}", e)))?
    }

    pub async fn count(&self, partition: Partition) -> Result<usize, StoreError> {
        let store = self.store();
        tokio::task::spawn_blocking(move || store.count(partition))
            .await
            .map_err(|e| StoreError::Unavailable(format!("count task failed: {}", e)))?
    }
}
