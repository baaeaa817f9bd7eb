// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query translation
//!
//! Turns HTTP query parameters into a `FindSpec`. Nothing in here fails:
//! unusable values fall back to "no filter" or the partition's default
//! page size.

use crate::store::{Filter, FindSpec, Partition};
use std::collections::HashMap;

/// Raw query string parameters.
pub type QueryParams = HashMap<String, String>;

/// First parameter among `keys` that is present and non-empty.
pub fn first_non_empty<'a>(params: &'a QueryParams, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| params.get(*key))
        .map(String::as_str)
        .find(|value| !value.is_empty())
}

/// `sensor_name`/`sensor` and `house_id`/`house` equality filters.
pub fn build_filter(params: &QueryParams) -> Filter {
    Filter {
        sensor_name: first_non_empty(params, &["sensor_name", "sensor"]).map(str::to_string),
        house_id: first_non_empty(params, &["house_id", "house"]).map(str::to_string),
    }
}

/// Positive page size from `raw`, or `default`.
///
/// Reads a leading integer: whitespace is skipped, a sign is accepted and
/// parsing stops at the first non-digit (`"17abc"` is 17).
pub fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    match raw.and_then(leading_integer) {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => default,
    }
}

fn leading_integer(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    // Overflowing digit runs saturate instead of failing.
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

impl FindSpec {
    /// Latest-first read of `partition` driven by query parameters.
    ///
    /// Partitions without identity metadata ignore the sensor/house
    /// parameters.
    pub fn for_partition(partition: Partition, params: &QueryParams) -> Self {
        let filter = if partition.supports_identity_filter() {
            build_filter(params)
        } else {
            Filter::default()
        };

        Self {
            filter,
            sort: partition.sort_field(),
            limit: parse_limit(
                params.get("limit").map(String::as_str),
                partition.default_limit(),
            ),
        }
    }
}
