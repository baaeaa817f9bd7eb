// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persisted document shapes
//!
//! One struct per partition. Field names are the stored (and served) JSON
//! names. Absent values serialize as `null`.

use crate::store::{IndexedDocument, Partition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Raw sensor reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Server receive time; null when the source value was absent or unparsable.
    pub ts_server: Option<DateTime<Utc>>,
    pub metadata: ReadingMetadata,
    /// Readings keep the published number form (integer or float).
    pub temperature: Option<Number>,
    pub humidity: Option<Number>,
    pub pressure: Option<Number>,
    /// Device uptime counter.
    pub millis: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingMetadata {
    pub sensor_name: Option<String>,
    pub house_id: Option<String>,
    pub user_id: Option<String>,
    pub state: Option<String>,
}

/// Aggregate over one window of readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub t_end: Option<DateTime<Utc>>,
    pub t_start: Option<DateTime<Utc>>,
    pub metadata: WindowMetadata,
    /// Averages as published, usually `{temperature, humidity, pressure}`.
    pub avg: Option<Value>,
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowMetadata {
    pub sensor_name: Option<String>,
    pub house_id: Option<String>,
    /// Window label, usually `{type, size_sec}`.
    pub window: Option<Value>,
}

/// Alarm/security state transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub ts_server: Option<DateTime<Utc>>,
    pub metadata: EventMetadata,
    pub event_type: Option<String>,
    pub prev_state: Option<String>,
    pub new_state: Option<String>,
    pub reason: Option<String>,
    pub failed_attempts: Option<i64>,
    pub millis: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub sensor_name: Option<String>,
    pub house_id: Option<String>,
    pub user_id: Option<String>,
}

/// Command issued to a device. Written by other services; this one only
/// reads them, so everything besides `ts_server` is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub ts_server: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Anything that can be stored in a partition.
pub trait Document: Serialize {
    fn partition(&self) -> Partition;
    fn sensor_name(&self) -> Option<&str>;
    fn house_id(&self) -> Option<&str>;
    /// Value of the partition's sort field.
    fn sort_key(&self) -> Option<DateTime<Utc>>;

    /// Encode the body and pull out the indexed fields.
    fn index(&self) -> Result<IndexedDocument, serde_json::Error> {
        Ok(IndexedDocument {
            sensor_name: self.sensor_name().map(str::to_owned),
            house_id: self.house_id().map(str::to_owned),
            sort_key: self.sort_key(),
            body: serde_json::to_value(self)?,
        })
    }
}

impl Document for RawReading {
    fn partition(&self) -> Partition {
        Partition::Raw
    }

    fn sensor_name(&self) -> Option<&str> {
        self.metadata.sensor_name.as_deref()
    }

    fn house_id(&self) -> Option<&str> {
        self.metadata.house_id.as_deref()
    }

    fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.ts_server
    }
}

impl Document for AggregateWindow {
    fn partition(&self) -> Partition {
        Partition::Average
    }

    fn sensor_name(&self) -> Option<&str> {
        self.metadata.sensor_name.as_deref()
    }

    fn house_id(&self) -> Option<&str> {
        self.metadata.house_id.as_deref()
    }

    fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.t_end
    }
}

impl Document for SecurityEvent {
    fn partition(&self) -> Partition {
        Partition::Security
    }

    fn sensor_name(&self) -> Option<&str> {
        self.metadata.sensor_name.as_deref()
    }

    fn house_id(&self) -> Option<&str> {
        self.metadata.house_id.as_deref()
    }

    fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.ts_server
    }
}

impl Document for Command {
    fn partition(&self) -> Partition {
        Partition::Commands
    }

    fn sensor_name(&self) -> Option<&str> {
        self.fields.get("sensor_name").and_then(Value::as_str)
    }

    fn house_id(&self) -> Option<&str> {
        self.fields.get("house_id").and_then(Value::as_str)
    }

    fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.ts_server
    }
}

/// Output of a transformer: exactly one document for one feed message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedDocument {
    Raw(RawReading),
    Average(AggregateWindow),
    Security(SecurityEvent),
}

impl Document for NormalizedDocument {
    fn partition(&self) -> Partition {
        match self {
            Self::Raw(doc) => doc.partition(),
            Self::Average(doc) => doc.partition(),
            Self::Security(doc) => doc.partition(),
        }
    }

    fn sensor_name(&self) -> Option<&str> {
        match self {
            Self::Raw(doc) => doc.sensor_name(),
            Self::Average(doc) => doc.sensor_name(),
            Self::Security(doc) => doc.sensor_name(),
        }
    }

    fn house_id(&self) -> Option<&str> {
        match self {
            Self::Raw(doc) => doc.house_id(),
            Self::Average(doc) => doc.house_id(),
            Self::Security(doc) => doc.house_id(),
        }
    }

    fn sort_key(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Raw(doc) => doc.sort_key(),
            Self::Average(doc) => doc.sort_key(),
            Self::Security(doc) => doc.sort_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_reading_serializes_nulls() {
        let reading = RawReading {
            metadata: ReadingMetadata {
                sensor_name: Some("S1".into()),
                ..Default::default()
            },
            temperature: Number::from_f64(21.5),
            ..Default::default()
        };

        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["ts_server"], Value::Null);
        assert_eq!(value["metadata"]["sensor_name"], "S1");
        assert_eq!(value["metadata"]["user_id"], Value::Null);
        assert_eq!(value["metadata"]["state"], Value::Null);
        assert_eq!(value["temperature"], 21.5);
    }

    #[test]
    fn test_index_extracts_identity_and_sort_key() {
        let t_end = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let window = AggregateWindow {
            t_end: Some(t_end),
            metadata: WindowMetadata {
                sensor_name: Some("S2".into()),
                house_id: Some("H9".into()),
                window: Some(json!({"type": "tumbling", "size_sec": 60})),
            },
            ..Default::default()
        };

        let indexed = window.index().unwrap();
        assert_eq!(indexed.sensor_name.as_deref(), Some("S2"));
        assert_eq!(indexed.house_id.as_deref(), Some("H9"));
        assert_eq!(indexed.sort_key, Some(t_end));
        assert_eq!(indexed.body["t_end"], "2024-03-01T12:00:00Z");
        assert_eq!(indexed.body["metadata"]["window"]["size_sec"], 60);
    }

    #[test]
    fn test_command_keeps_extra_fields() {
        let command: Command = serde_json::from_value(json!({
            "ts_server": "2024-01-01T00:00:00Z",
            "command": "arm",
            "sensor_name": "door-1"
        }))
        .unwrap();

        assert_eq!(command.partition(), Partition::Commands);
        assert_eq!(command.sensor_name(), Some("door-1"));
        let body = command.index().unwrap().body;
        assert_eq!(body["command"], "arm");
        assert_eq!(body["ts_server"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_normalized_document_serializes_inner_shape() {
        let doc = NormalizedDocument::Security(SecurityEvent {
            event_type: Some("alarm".into()),
            ..Default::default()
        });
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["event_type"], "alarm");
        assert!(value.get("Security").is_none());
        assert_eq!(doc.partition(), Partition::Security);
    }
}
