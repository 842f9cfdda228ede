//! The sync ledger: what was written for each feed uid, run history, and
//! a small key/value table.

mod lock;
mod records;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{StateError, StateResult};

pub use lock::SyncLock;
pub use records::{RunCounts, RunStatus, SyncRunRecord, SyncedEventRecord};

pub const SCHEMA_VERSION: i64 = 1;

const RECORD_COLUMNS: &str = "source_uid, store_item_id, store_local_id, content_hash, sequence, last_modified, synced_at, raw_source_data";

const RUN_COLUMNS: &str =
    "id, started_at, completed_at, status, created, updated, deleted, unchanged, error_message";

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (creating if needed) the ledger at `path`.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;

        let store = StateStore { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StateResult<Self> {
        let store = StateStore {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> StateResult<()> {
        let current: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if current < 1 {
            self.conn.execute_batch(include_str!("schema.sql"))?;
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(())
    }

    // Ledger

    pub fn all_records(&self) -> StateResult<Vec<SyncedEventRecord>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM synced_events ORDER BY source_uid"
        ))?;
        let rows = statement.query_map([], record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn record(&self, source_uid: &str) -> StateResult<Option<SyncedEventRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM synced_events WHERE source_uid = ?1"),
                [source_uid],
                record_from_row,
            )
            .optional()?)
    }

    /// Insert the record, or replace the existing row for its uid.
    pub fn upsert_record(&self, record: &SyncedEventRecord) -> StateResult<()> {
        self.conn.execute(
            "
            INSERT INTO synced_events (
                source_uid,
                store_item_id,
                store_local_id,
                content_hash,
                sequence,
                last_modified,
                synced_at,
                raw_source_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(source_uid) DO UPDATE SET
                store_item_id=excluded.store_item_id,
                store_local_id=excluded.store_local_id,
                content_hash=excluded.content_hash,
                sequence=excluded.sequence,
                last_modified=excluded.last_modified,
                synced_at=excluded.synced_at,
                raw_source_data=excluded.raw_source_data
            ",
            params![
                record.source_uid,
                record.store_item_id,
                record.store_local_id,
                record.content_hash,
                record.sequence,
                record.last_modified.as_ref().map(format_timestamp),
                format_timestamp(&record.synced_at),
                record.raw_source_data,
            ],
        )?;
        Ok(())
    }

    pub fn update_content(&self, source_uid: &str, content_hash: &str, sequence: u32) -> StateResult<()> {
        self.conn.execute(
            "UPDATE synced_events SET content_hash = ?2, sequence = ?3, synced_at = ?4 WHERE source_uid = ?1",
            params![source_uid, content_hash, sequence, format_timestamp(&Utc::now())],
        )?;
        Ok(())
    }

    /// Re-point a row at the identifiers the entry has now.
    pub fn update_identifiers(
        &self,
        source_uid: &str,
        store_item_id: &str,
        store_local_id: Option<&str>,
    ) -> StateResult<()> {
        self.conn.execute(
            "UPDATE synced_events SET store_item_id = ?2, store_local_id = ?3 WHERE source_uid = ?1",
            params![source_uid, store_item_id, store_local_id],
        )?;
        Ok(())
    }

    pub fn delete_record(&self, source_uid: &str) -> StateResult<()> {
        self.conn
            .execute("DELETE FROM synced_events WHERE source_uid = ?1", [source_uid])?;
        Ok(())
    }

    pub fn record_count(&self) -> StateResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM synced_events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    // Run history

    /// Open a history row. It reads as failed until `complete_run` closes it,
    /// so a crashed run is never mistaken for a good one.
    pub fn begin_run(&self, started_at: DateTime<Utc>) -> StateResult<i64> {
        self.conn.execute(
            "INSERT INTO sync_history (started_at, status) VALUES (?1, ?2)",
            params![format_timestamp(&started_at), RunStatus::Failed.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn complete_run(
        &self,
        run_id: i64,
        completed_at: DateTime<Utc>,
        status: RunStatus,
        counts: &RunCounts,
        error_message: Option<&str>,
    ) -> StateResult<()> {
        self.conn.execute(
            "
            UPDATE sync_history SET
                completed_at = ?2,
                status = ?3,
                created = ?4,
                updated = ?5,
                deleted = ?6,
                unchanged = ?7,
                error_message = ?8
            WHERE id = ?1
            ",
            params![
                run_id,
                format_timestamp(&completed_at),
                status.as_str(),
                counts.created,
                counts.updated,
                counts.deleted,
                counts.unchanged,
                error_message,
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn recent_runs(&self, limit: usize) -> StateResult<Vec<SyncRunRecord>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_history ORDER BY id DESC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement.query_map([limit], run_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn last_successful_run(&self) -> StateResult<Option<SyncRunRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM sync_history WHERE status = ?1 ORDER BY id DESC LIMIT 1"
                ),
                [RunStatus::Success.as_str()],
                run_from_row,
            )
            .optional()?)
    }

    pub fn run(&self, run_id: i64) -> StateResult<Option<SyncRunRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM sync_history WHERE id = ?1"),
                [run_id],
                run_from_row,
            )
            .optional()?)
    }

    // Metadata

    pub fn metadata(&self, key: &str) -> StateResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> StateResult<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // Maintenance

    /// Forget everything: ledger, history and metadata.
    pub fn reset(&self) -> StateResult<()> {
        self.conn.execute_batch(
            "
            BEGIN;
            DELETE FROM synced_events;
            DELETE FROM sync_history;
            DELETE FROM metadata;
            DELETE FROM sqlite_sequence WHERE name = 'sync_history';
            COMMIT;
            ",
        )?;
        self.conn.execute_batch("VACUUM")?;
        tracing::info!("Sync state reset");
        Ok(())
    }

    pub fn integrity_check(&self) -> StateResult<()> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result == "ok" {
            Ok(())
        } else {
            Err(StateError::Integrity(result))
        }
    }
}

/// RFC 3339, UTC, millisecond precision. Sorts lexically.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StateError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| StateError::Timestamp(value.to_string()))
}

fn conversion_error(column: usize, err: StateError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn timestamp_column(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(column)?;
    parse_timestamp(&value).map_err(|err| conversion_error(column, err))
}

fn optional_timestamp_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(column)?;
    value
        .map(|value| parse_timestamp(&value).map_err(|err| conversion_error(column, err)))
        .transpose()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SyncedEventRecord> {
    Ok(SyncedEventRecord {
        source_uid: row.get(0)?,
        store_item_id: row.get(1)?,
        store_local_id: row.get(2)?,
        content_hash: row.get(3)?,
        sequence: row.get(4)?,
        last_modified: optional_timestamp_column(row, 5)?,
        synced_at: timestamp_column(row, 6)?,
        raw_source_data: row.get(7)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRunRecord> {
    let status: String = row.get(3)?;
    let status = RunStatus::parse(&status).unwrap_or(RunStatus::Failed);

    Ok(SyncRunRecord {
        id: row.get(0)?,
        started_at: timestamp_column(row, 1)?,
        completed_at: optional_timestamp_column(row, 2)?,
        status,
        counts: RunCounts {
            created: row.get(4)?,
            updated: row.get(5)?,
            deleted: row.get(6)?,
            unchanged: row.get(7)?,
        },
        error_message: row.get(8)?,
    })
}
