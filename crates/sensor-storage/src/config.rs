// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage service configuration

use crate::message::Feed;
use crate::router::FeedRoute;
use crate::store::Partition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Table name per partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionNames {
    pub raw: String,
    pub average: String,
    pub security: String,
    pub commands: String,
}

impl Default for PartitionNames {
    fn default() -> Self {
        Self {
            raw: "raw_measurements".to_string(),
            average: "avg_measurements".to_string(),
            security: "security_events".to_string(),
            commands: "commands".to_string(),
        }
    }
}

impl PartitionNames {
    pub fn get(&self, partition: Partition) -> &str {
        match partition {
            Partition::Raw => &self.raw,
            Partition::Average => &self.average,
            Partition::Security => &self.security,
            Partition::Commands => &self.commands,
        }
    }

    /// Names must be plain SQL identifiers and pairwise distinct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for partition in Partition::ALL {
            let name = self.get(partition);
            if !is_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "{} partition name {:?} is not a valid identifier",
                    partition, name
                )));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "partition name {:?} is used more than once",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Bus subject per feed (NATS wildcards allowed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSubjects {
    pub raw: String,
    pub average: String,
    pub security: String,
}

impl Default for FeedSubjects {
    fn default() -> Self {
        Self {
            raw: "sensors.raw.>".to_string(),
            average: "sensors.avg.>".to_string(),
            security: "sensors.security.>".to_string(),
        }
    }
}

impl FeedSubjects {
    pub fn get(&self, feed: Feed) -> &str {
        match feed {
            Feed::Raw => &self.raw,
            Feed::Average => &self.average,
            Feed::Security => &self.security,
        }
    }
}

/// Storage service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// NATS server URL
    pub nats_server: String,

    /// NATS connection timeout in seconds
    pub nats_connect_timeout_secs: u64,

    /// SQLite database path
    pub db_path: String,

    /// Table names
    pub partitions: PartitionNames,

    /// Feed subjects
    pub subjects: FeedSubjects,

    /// HTTP bind address
    pub bind: String,

    /// HTTP port
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nats_server: "nats://127.0.0.1:4222".to_string(),
            nats_connect_timeout_secs: 5,
            db_path: "sensor_storage.db".to_string(),
            partitions: PartitionNames::default(),
            subjects: FeedSubjects::default(),
            bind: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for feed in Feed::ALL {
            if self.subjects.get(feed).trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "subject for the {} feed is empty",
                    feed
                )));
            }
        }
        self.http_addr()?;
        self.partitions.validate()
    }

    /// One route per feed, bound to its configured subject.
    pub fn routes(&self) -> Vec<FeedRoute> {
        Feed::ALL
            .into_iter()
            .map(|feed| FeedRoute::new(feed, self.subjects.get(feed)))
            .collect()
    }

    /// HTTP listen address. `bind` must be an IP literal (v4 or v6).
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!("bind address {:?} is not an IP address", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn nats_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.nats_connect_timeout_secs)
    }

    /// Log the effective configuration at startup.
    pub fn log_summary(&self) {
        tracing::info!("Config:");
        tracing::info!("  NATS server: {}", self.nats_server);
        tracing::info!("  Database: {}", self.db_path);
        for partition in Partition::ALL {
            tracing::info!(
                "  Partition {}: {}",
                partition,
                self.partitions.get(partition)
            );
        }
        for feed in Feed::ALL {
            tracing::info!("  Subject {}: {}", feed, self.subjects.get(feed));
        }
        match self.http_addr() {
            Ok(addr) => tracing::info!("  HTTP: {}", addr),
            Err(_) => tracing::info!("  HTTP: {} port {}", self.bind, self.port),
        }
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    nats_server: Option<String>,
    nats_connect_timeout_secs: Option<u64>,
    db_path: Option<String>,
    partitions: Option<PartitionNames>,
    subjects: Option<FeedSubjects>,
    bind: Option<String>,
    port: Option<u16>,
}

impl ConfigBuilder {
    pub fn nats_server(mut self, url: impl Into<String>) -> Self {
        self.nats_server = Some(url.into());
        self
    }

    pub fn nats_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.nats_connect_timeout_secs = Some(secs);
        self
    }

    pub fn db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn partitions(mut self, partitions: PartitionNames) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn subjects(mut self, subjects: FeedSubjects) -> Self {
        self.subjects = Some(subjects);
        self
    }

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = Some(bind.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let config = Config {
            nats_server: self.nats_server.unwrap_or(defaults.nats_server),
            nats_connect_timeout_secs: self
                .nats_connect_timeout_secs
                .unwrap_or(defaults.nats_connect_timeout_secs),
            db_path: self.db_path.unwrap_or(defaults.db_path),
            partitions: self.partitions.unwrap_or(defaults.partitions),
            subjects: self.subjects.unwrap_or(defaults.subjects),
            bind: self.bind.unwrap_or(defaults.bind),
            port: self.port.unwrap_or(defaults.port),
        };
        config.validate()?;
        Ok(config)
    }
}
