// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Document store abstraction
//!
//! Defines the partitions, the find specification and the trait that
//! storage backends implement (see `SqliteStore`).

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised at the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document rejected: {0}")]
    Rejected(String),

    #[error("Invalid partition name: {0:?}")]
    InvalidPartitionName(String),

    #[error("Partition {partition} cannot be sorted by {field}")]
    UnsupportedSort {
        partition: Partition,
        field: SortField,
    },
}

/// Store area holding the documents of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Raw,
    Average,
    Security,
    Commands,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Raw,
        Partition::Average,
        Partition::Security,
        Partition::Commands,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Average => "avg",
            Self::Security => "security",
            Self::Commands => "commands",
        }
    }

    /// Primary timestamp field; reads are always ordered by it.
    pub fn sort_field(&self) -> SortField {
        match self {
            Self::Average => SortField::WindowEnd,
            Self::Raw | Self::Security | Self::Commands => SortField::ServerTimestamp,
        }
    }

    /// Page size used when the caller supplies no usable `limit`.
    pub fn default_limit(&self) -> usize {
        match self {
            Self::Raw => 100,
            Self::Average => 200,
            Self::Security | Self::Commands => 50,
        }
    }

    /// Whether reads accept the sensor/house equality filters.
    pub fn supports_identity_filter(&self) -> bool {
        !matches!(self, Self::Commands)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp field a partition is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ServerTimestamp,
    WindowEnd,
}

impl SortField {
    /// Document field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerTimestamp => "ts_server",
            Self::WindowEnd => "t_end",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on the identity metadata. `None` leaves the field
/// unconstrained (it is not matched against null).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// `metadata.sensor_name`
    pub sensor_name: Option<String>,
    /// `metadata.house_id`
    pub house_id: Option<String>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.sensor_name.is_none() && self.house_id.is_none()
    }
}

/// Filter + sort + limit, as understood by `DocumentStore::find`.
///
/// Results are always newest first on `sort`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindSpec {
    pub filter: Filter,
    pub sort: SortField,
    pub limit: usize,
}

/// A document ready for insertion: the JSON body plus the fields the store
/// indexes for filtering and ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub sensor_name: Option<String>,
    pub house_id: Option<String>,
    pub sort_key: Option<DateTime<Utc>>,
    pub body: Value,
}

/// Outcome of a successful insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReceipt {
    pub partition: Partition,
    /// Store-assigned identity, exposed as `_id` on reads.
    pub id: i64,
}

/// Document store trait
///
/// Append-only storage for the four partitions. Implementations are
/// synchronous; async callers go through `spawn_blocking`.
pub trait DocumentStore: Send + Sync {
    /// Append one document. Every call is an unconditional insert.
    fn insert(&self, partition: Partition, document: &IndexedDocument) -> Result<i64, StoreError>;

    /// Return documents matching `spec`, each with its `_id` field set.
    fn find(&self, partition: Partition, spec: &FindSpec) -> Result<Vec<Value>, StoreError>;

    /// Number of documents in a partition.
    fn count(&self, partition: Partition) -> Result<usize, StoreError>;
}
