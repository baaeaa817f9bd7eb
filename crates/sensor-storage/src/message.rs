// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound bus message schemas
//!
//! One struct per feed. Every field is optional and decoded on its own: a
//! value of the wrong JSON type becomes `None` instead of failing the whole
//! message. Timestamps stay as raw JSON; coercion happens in `transform`.

use crate::store::Partition;
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// Payload could not be read as a message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Logical inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Raw,
    Average,
    Security,
}

impl Feed {
    pub const ALL: [Feed; 3] = [Feed::Raw, Feed::Average, Feed::Security];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Average => "avg",
            Self::Security => "security",
        }
    }

    /// Short upper-case tag used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::Average => "AVG",
            Self::Security => "SEC",
        }
    }

    /// Partition the feed's documents are written to.
    pub fn partition(&self) -> Partition {
        match self {
            Self::Raw => Partition::Raw,
            Self::Average => Partition::Average,
            Self::Security => Partition::Security,
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw reading as published by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "lenient::value")]
    pub ts_server: Option<Value>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub sensor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub house_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub temperature: Option<Number>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub humidity: Option<Number>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pressure: Option<Number>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub millis: Option<i64>,
}

/// Window aggregate as published by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AverageMessage {
    #[serde(default, deserialize_with = "lenient::value")]
    pub t_end: Option<Value>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub t_start: Option<Value>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub sensor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub house_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub window: Option<Value>,
    #[serde(default, deserialize_with = "lenient::value")]
    pub avg: Option<Value>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub count: Option<i64>,
}

/// Security event as published by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityMessage {
    #[serde(default, deserialize_with = "lenient::value")]
    pub ts_server: Option<Value>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub sensor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub house_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub prev_state: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub new_state: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub failed_attempts: Option<i64>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub millis: Option<i64>,
}

/// A decoded message, tagged by the feed it arrived on.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Raw(RawMessage),
    Average(AverageMessage),
    Security(SecurityMessage),
}

impl InboundMessage {
    /// Decode a bus payload for `feed`.
    ///
    /// Only a payload that is not a JSON object fails; field-level problems
    /// degrade to `None`.
    pub fn decode(feed: Feed, payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(json_kind(&value)));
        }

        let message = match feed {
            Feed::Raw => Self::Raw(RawMessage::deserialize(value)?),
            Feed::Average => Self::Average(AverageMessage::deserialize(value)?),
            Feed::Security => Self::Security(SecurityMessage::deserialize(value)?),
        };
        Ok(message)
    }

    pub fn feed(&self) -> Feed {
        match self {
            Self::Raw(_) => Feed::Raw,
            Self::Average(_) => Feed::Average,
            Self::Security(_) => Feed::Security,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Field decoders that never reject a well-formed JSON value.
mod lenient {
    use super::*;

    pub fn value<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok((!v.is_null()).then_some(v))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Numbers keep their JSON form (`40` stays an integer).
    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Number>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => Some(n),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .map(Number::from)
                    .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64))
            }
            _ => None,
        })
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(truncate))
            }
            _ => None,
        })
    }

    fn truncate(f: f64) -> Option<i64> {
        // `as` saturates; reject values that would be clamped.
        (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f.trunc() as i64)
    }
}
