// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message transformers
//!
//! Pure functions mapping one inbound message to one persisted document.
//! They never fail: anything missing or unparsable ends up as `null`.

use crate::document::{
    AggregateWindow, EventMetadata, NormalizedDocument, RawReading, ReadingMetadata,
    SecurityEvent, WindowMetadata,
};
use crate::message::{AverageMessage, InboundMessage, RawMessage, SecurityMessage};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Offset-less layouts, read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Coerce a timestamp-like JSON value to an instant.
///
/// Absent, `null`, `false`, `0` and empty strings are treated as missing.
/// Strings are parsed as RFC 3339, RFC 2822, ISO 8601 without offset (UTC)
/// or a bare date (midnight UTC). Numbers are Unix epoch milliseconds.
/// Anything else yields `None`.
pub fn coerce_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            })?;
            if millis == 0 {
                return None;
            }
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn raw_reading(msg: RawMessage) -> RawReading {
    RawReading {
        ts_server: coerce_timestamp(msg.ts_server.as_ref()),
        metadata: ReadingMetadata {
            sensor_name: msg.sensor_name,
            house_id: msg.house_id,
            user_id: msg.user_id,
            state: msg.state,
        },
        temperature: msg.temperature,
        humidity: msg.humidity,
        pressure: msg.pressure,
        millis: msg.millis,
    }
}

pub fn aggregate_window(msg: AverageMessage) -> AggregateWindow {
    AggregateWindow {
        t_end: coerce_timestamp(msg.t_end.as_ref()),
        t_start: coerce_timestamp(msg.t_start.as_ref()),
        metadata: WindowMetadata {
            sensor_name: msg.sensor_name,
            house_id: msg.house_id,
            window: msg.window,
        },
        avg: msg.avg,
        count: msg.count,
    }
}

pub fn security_event(msg: SecurityMessage) -> SecurityEvent {
    SecurityEvent {
        ts_server: coerce_timestamp(msg.ts_server.as_ref()),
        metadata: EventMetadata {
            sensor_name: msg.sensor_name,
            house_id: msg.house_id,
            user_id: msg.user_id,
        },
        event_type: msg.event_type,
        prev_state: msg.prev_state,
        new_state: msg.new_state,
        reason: msg.reason,
        failed_attempts: msg.failed_attempts,
        millis: msg.millis,
    }
}

/// Dispatch to the transformer for the message's feed.
pub fn normalize(message: InboundMessage) -> NormalizedDocument {
    match message {
        InboundMessage::Raw(msg) => NormalizedDocument::Raw(raw_reading(msg)),
        InboundMessage::Average(msg) => NormalizedDocument::Average(aggregate_window(msg)),
        InboundMessage::Security(msg) => NormalizedDocument::Security(security_event(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Feed;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_coerce_missing_and_empty() {
        assert_eq!(coerce_timestamp(None), None);
        assert_eq!(coerce_timestamp(Some(&json!(null))), None);
        assert_eq!(coerce_timestamp(Some(&json!(""))), None);
        assert_eq!(coerce_timestamp(Some(&json!("   "))), None);
        assert_eq!(coerce_timestamp(Some(&json!(false))), None);
        assert_eq!(coerce_timestamp(Some(&json!(0))), None);
    }

    #[test]
    fn test_coerce_unparsable() {
        for bad in ["yesterday", "2024-13-45T99:00:00Z", "1704067200000", "not a date"] {
            assert_eq!(coerce_timestamp(Some(&json!(bad))), None, "{bad}");
        }
        assert_eq!(coerce_timestamp(Some(&json!({"t": 1}))), None);
        assert_eq!(coerce_timestamp(Some(&json!([2024, 1, 1]))), None);
    }

    #[test]
    fn test_coerce_rfc3339_variants() {
        let expected = utc(2024, 1, 1, 0, 0, 0);
        assert_eq!(
            coerce_timestamp(Some(&json!("2024-01-01T00:00:00Z"))),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp(Some(&json!("2024-01-01T01:00:00+01:00"))),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp(Some(&json!("2024-01-01 00:00:00+00:00"))),
            Some(expected)
        );

        let micros = coerce_timestamp(Some(&json!("2024-01-01T00:00:00.123456+00:00"))).unwrap();
        assert_eq!(micros.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_coerce_naive_and_date_only() {
        assert_eq!(
            coerce_timestamp(Some(&json!("2024-05-06T07:08:09"))),
            Some(utc(2024, 5, 6, 7, 8, 9))
        );
        assert_eq!(
            coerce_timestamp(Some(&json!("2024-05-06"))),
            Some(utc(2024, 5, 6, 0, 0, 0))
        );
        assert_eq!(
            coerce_timestamp(Some(&json!("Mon, 01 Jan 2024 00:00:00 GMT"))),
            Some(utc(2024, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_coerce_epoch_millis() {
        assert_eq!(
            coerce_timestamp(Some(&json!(1_704_067_200_000_i64))),
            Some(utc(2024, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            coerce_timestamp(Some(&json!(1_704_067_200_000.9_f64))),
            Some(utc(2024, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_raw_reading_defaults_optional_identity() {
        let msg = InboundMessage::decode(
            Feed::Raw,
            json!({
                "ts_server": "2024-01-01T00:00:00Z",
                "sensor_name": "S1",
                "house_id": "H1",
                "temperature": 21.5,
                "humidity": 40,
                "pressure": 1012,
                "millis": 1000
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let NormalizedDocument::Raw(doc) = normalize(msg) else {
            panic!("expected raw reading");
        };
        assert_eq!(doc.ts_server, Some(utc(2024, 1, 1, 0, 0, 0)));
        assert_eq!(doc.metadata.sensor_name.as_deref(), Some("S1"));
        assert_eq!(doc.metadata.user_id, None);
        assert_eq!(doc.metadata.state, None);
        assert_eq!(doc.temperature, serde_json::Number::from_f64(21.5));
        assert_eq!(doc.pressure, Some(serde_json::Number::from(1012)));
        assert_eq!(doc.millis, Some(1000));
    }

    #[test]
    fn test_missing_required_fields_pass_through_as_null() {
        let doc = raw_reading(RawMessage::default());
        assert_eq!(doc.metadata.sensor_name, None);
        assert_eq!(doc.metadata.house_id, None);
        assert_eq!(doc.ts_server, None);
    }

    #[test]
    fn test_aggregate_window_timestamps() {
        let doc = aggregate_window(AverageMessage {
            t_end: Some(json!("2024-02-01T10:01:00+00:00")),
            t_start: Some(json!("garbage")),
            sensor_name: Some("S3".into()),
            window: Some(json!({"type": "tumbling", "size_sec": 60})),
            avg: Some(json!({"temperature": 22.1})),
            count: Some(6),
            ..Default::default()
        });

        assert_eq!(doc.t_end, Some(utc(2024, 2, 1, 10, 1, 0)));
        assert_eq!(doc.t_start, None);
        assert_eq!(doc.metadata.window.as_ref().unwrap()["type"], "tumbling");
        assert_eq!(doc.count, Some(6));
    }

    #[test]
    fn test_security_event_mapping() {
        let doc = security_event(SecurityMessage {
            ts_server: Some(json!("2024-02-01T10:00:00Z")),
            sensor_name: Some("keypad".into()),
            house_id: Some("H1".into()),
            event_type: Some("state_change".into()),
            prev_state: Some("DISARMED".into()),
            new_state: Some("ARMED".into()),
            reason: Some("pin_ok".into()),
            failed_attempts: Some(0),
            millis: Some(5_000),
            ..Default::default()
        });

        assert_eq!(doc.ts_server, Some(utc(2024, 2, 1, 10, 0, 0)));
        assert_eq!(doc.metadata.user_id, None);
        assert_eq!(doc.prev_state.as_deref(), Some("DISARMED"));
        assert_eq!(doc.new_state.as_deref(), Some("ARMED"));
        assert_eq!(doc.failed_attempts, Some(0));
    }
}
