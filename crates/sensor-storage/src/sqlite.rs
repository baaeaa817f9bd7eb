// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite document store
//!
//! One table per partition. The document body is stored as JSON text next
//! to the columns used for filtering and ordering.

use crate::config::PartitionNames;
use crate::store::{DocumentStore, FindSpec, IndexedDocument, Partition, StoreError};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

/// SQLite document store
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
///
/// # Schema (per partition)
///
/// ```sql
/// CREATE TABLE <name> (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     sensor_name TEXT,
///     house_id TEXT,
///     sort_key INTEGER,          -- primary timestamp, Unix microseconds
///     body TEXT NOT NULL         -- JSON document
/// );
/// CREATE INDEX idx_<name>_identity ON <name>(sensor_name, house_id, sort_key);
/// CREATE INDEX idx_<name>_sort ON <name>(sort_key);
/// ```
///
/// Rows written by other processes only need `body`: when `sort_key` is
/// NULL an insert trigger fills it from the partition's timestamp field
/// (ISO 8601 text or epoch milliseconds). Unparsable values stay NULL.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    tables: PartitionNames,
}

impl SqliteStore {
    /// Open (or create) a file-based database
    pub fn new(path: &str, tables: PartitionNames) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn, tables)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory(tables: PartitionNames) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, tables)
    }

    fn with_connection(conn: Connection, tables: PartitionNames) -> Result<Self, StoreError> {
        for partition in Partition::ALL {
            let name = tables.get(partition);
            if !crate::config::is_identifier(name) {
                return Err(StoreError::InvalidPartitionName(name.to_string()));
            }
        }

        let store = Self {
            conn: Mutex::new(conn),
            tables,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        for partition in Partition::ALL {
            let table = self.tables.get(partition);
            let field = partition.sort_field().as_str();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sensor_name TEXT,
                    house_id TEXT,
                    sort_key INTEGER,
                    body TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_identity
                    ON {table}(sensor_name, house_id, sort_key);
                CREATE INDEX IF NOT EXISTS idx_{table}_sort ON {table}(sort_key);
                CREATE TRIGGER IF NOT EXISTS trg_{table}_sort_key AFTER INSERT ON {table}
                WHEN NEW.sort_key IS NULL AND json_valid(NEW.body)
                BEGIN
                    UPDATE {table} SET sort_key = (
                        CASE json_type(NEW.body, '$.{field}')
                            WHEN 'integer' THEN NULLIF(json_extract(NEW.body, '$.{field}'), 0) * 1000
                            WHEN 'real' THEN CAST(NULLIF(json_extract(NEW.body, '$.{field}'), 0) * 1000 AS INTEGER)
                            WHEN 'text' THEN CAST(round(unixepoch(json_extract(NEW.body, '$.{field}'), 'subsec') * 1000000) AS INTEGER)
                        END
                    )
                    WHERE id = NEW.id;
                END;"
            ))?;
        }
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Table name backing a partition
    pub fn table(&self, partition: Partition) -> &str {
        self.tables.get(partition)
    }
}

impl DocumentStore for SqliteStore {
    fn insert(&self, partition: Partition, document: &IndexedDocument) -> Result<i64, StoreError> {
        let body = serde_json::to_string(&document.body)?;
        let sort_key = document.sort_key.map(|ts| ts.timestamp_micros());

        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO {} (sensor_name, house_id, sort_key, body) VALUES (?1, ?2, ?3, ?4)",
                self.table(partition)
            ),
            params![document.sensor_name, document.house_id, sort_key, body],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn find(&self, partition: Partition, spec: &FindSpec) -> Result<Vec<Value>, StoreError> {
        if spec.sort != partition.sort_field() {
            return Err(StoreError::UnsupportedSort {
                partition,
                field: spec.sort,
            });
        }

        let mut sql = format!("SELECT id, body FROM {}", self.table(partition));
        let mut args: Vec<SqlValue> = Vec::new();
        let mut clauses: Vec<&str> = Vec::new();

        if let Some(sensor_name) = &spec.filter.sensor_name {
            clauses.push("sensor_name = ?");
            args.push(SqlValue::Text(sensor_name.clone()));
        }
        if let Some(house_id) = &spec.filter.house_id {
            clauses.push("house_id = ?");
            args.push(SqlValue::Text(house_id.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        // NULL sort keys sort lowest, so they come last.
        sql.push_str(" ORDER BY sort_key DESC, id DESC LIMIT ?");
        args.push(SqlValue::Integer(
            i64::try_from(spec.limit).unwrap_or(i64::MAX),
        ));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| -> Result<Value, StoreError> {
                let mut doc: Value = serde_json::from_str(&body)?;
                if let Value::Object(map) = &mut doc {
                    map.insert("_id".to_string(), Value::from(id));
                }
                Ok(doc)
            })
            .collect()
    }

    fn count(&self, partition: Partition) -> Result<usize, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table(partition)),
            [],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Command, Document, RawReading, ReadingMetadata};
    use crate::store::{Filter, SortField};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn reading(sensor: &str, house: &str, ts: Option<DateTime<Utc>>) -> IndexedDocument {
        RawReading {
            ts_server: ts,
            metadata: ReadingMetadata {
                sensor_name: Some(sensor.into()),
                house_id: Some(house.into()),
                ..Default::default()
            },
            temperature: serde_json::Number::from_f64(20.0),
            ..Default::default()
        }
        .index()
        .unwrap()
    }

    fn latest(filter: Filter, limit: usize) -> FindSpec {
        FindSpec {
            filter,
            sort: SortField::ServerTimestamp,
            limit,
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_sqlite_store_insert_and_find() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();

        let id = store
            .insert(Partition::Raw, &reading("S1", "H1", Some(base())))
            .unwrap();
        assert_eq!(id, 1);

        let docs = store
            .find(Partition::Raw, &latest(Filter::default(), 10))
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], 1);
        assert_eq!(docs[0]["metadata"]["sensor_name"], "S1");
        assert_eq!(docs[0]["ts_server"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_sqlite_store_orders_descending_nulls_last() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();

        store.insert(Partition::Raw, &reading("S1", "H1", None)).unwrap();
        for minutes in [5, 1, 9, 3] {
            let ts = base() + Duration::minutes(minutes);
            store
                .insert(Partition::Raw, &reading("S1", "H1", Some(ts)))
                .unwrap();
        }

        let docs = store
            .find(Partition::Raw, &latest(Filter::default(), 100))
            .unwrap();
        let stamps: Vec<_> = docs.iter().map(|d| d["ts_server"].clone()).collect();
        assert_eq!(
            stamps,
            vec![
                serde_json::json!("2024-01-01T00:09:00Z"),
                serde_json::json!("2024-01-01T00:05:00Z"),
                serde_json::json!("2024-01-01T00:03:00Z"),
                serde_json::json!("2024-01-01T00:01:00Z"),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_sqlite_store_filter_and_limit() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();

        for i in 0..5 {
            let ts = Some(base() + Duration::seconds(i));
            store.insert(Partition::Raw, &reading("S1", "H1", ts)).unwrap();
            store.insert(Partition::Raw, &reading("S2", "H1", ts)).unwrap();
            store.insert(Partition::Raw, &reading("S1", "H2", ts)).unwrap();
        }

        let by_sensor = Filter {
            sensor_name: Some("S1".into()),
            house_id: None,
        };
        assert_eq!(
            store.find(Partition::Raw, &latest(by_sensor, 100)).unwrap().len(),
            10
        );

        let by_both = Filter {
            sensor_name: Some("S1".into()),
            house_id: Some("H2".into()),
        };
        let docs = store.find(Partition::Raw, &latest(by_both, 3)).unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs
            .iter()
            .all(|d| d["metadata"]["house_id"] == "H2" && d["metadata"]["sensor_name"] == "S1"));

        let none = Filter {
            sensor_name: Some("missing".into()),
            house_id: None,
        };
        assert!(store.find(Partition::Raw, &latest(none, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_store_partitions_are_independent() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();

        store.insert(Partition::Raw, &reading("S1", "H1", None)).unwrap();
        store.insert(Partition::Raw, &reading("S1", "H1", None)).unwrap();
        store
            .insert(Partition::Commands, &reading("S1", "H1", None))
            .unwrap();

        assert_eq!(store.count(Partition::Raw).unwrap(), 2);
        assert_eq!(store.count(Partition::Commands).unwrap(), 1);
        assert_eq!(store.count(Partition::Average).unwrap(), 0);
        assert_eq!(store.count(Partition::Security).unwrap(), 0);
    }

    #[test]
    fn test_sqlite_store_rejects_foreign_sort_field() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();
        let spec = FindSpec {
            filter: Filter::default(),
            sort: SortField::WindowEnd,
            limit: 10,
        };

        assert!(matches!(
            store.find(Partition::Raw, &spec),
            Err(StoreError::UnsupportedSort { .. })
        ));
    }

    #[test]
    fn test_sqlite_store_orders_externally_written_rows() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();

        {
            let conn = store.conn();
            for body in [
                r#"{"label":"new","ts_server":"2024-01-01T00:00:09Z"}"#,
                r#"{"label":"old","ts_server":"2024-01-01T00:00:01Z"}"#,
                r#"{"label":"millis","ts_server":1704067205000}"#,
                r#"{"label":"none"}"#,
                r#"{"label":"garbage","ts_server":"yesterday"}"#,
            ] {
                conn.execute("INSERT INTO commands (body) VALUES (?1)", [body])
                    .unwrap();
            }
        }

        let mut fields = serde_json::Map::new();
        fields.insert("label".into(), serde_json::json!("internal"));
        let command = Command {
            ts_server: Some(base() + Duration::seconds(7)),
            fields,
        };
        store
            .insert(Partition::Commands, &command.index().unwrap())
            .unwrap();

        let spec = FindSpec {
            filter: Filter::default(),
            sort: SortField::ServerTimestamp,
            limit: 50,
        };
        let labels: Vec<_> = store
            .find(Partition::Commands, &spec)
            .unwrap()
            .iter()
            .map(|d| d["label"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            labels,
            vec!["new", "internal", "millis", "old", "garbage", "none"]
        );
    }

    #[test]
    fn test_sqlite_store_keeps_explicit_sort_key() {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();
        let ts = base() + Duration::milliseconds(1500) + Duration::microseconds(7);
        store
            .insert(Partition::Raw, &reading("S1", "H1", Some(ts)))
            .unwrap();

        let sort_key: i64 = store
            .conn()
            .query_row("SELECT sort_key FROM raw_measurements", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sort_key, ts.timestamp_micros());
    }

    #[test]
    fn test_sqlite_store_rejects_bad_table_names() {
        let names = PartitionNames {
            raw: "raw readings".into(),
            ..Default::default()
        };
        assert!(matches!(
            SqliteStore::new_in_memory(names),
            Err(StoreError::InvalidPartitionName(_))
        ));
    }

    #[test]
    fn test_sqlite_store_file_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::new(path, PartitionNames::default()).unwrap();
            store.insert(Partition::Raw, &reading("S1", "H1", None)).unwrap();
        }

        let store = SqliteStore::new(path, PartitionNames::default()).unwrap();
        assert_eq!(store.count(Partition::Raw).unwrap(), 1);
    }
}
