//! Fetch-audit and compute-audit writers (§3/§6): append-only rows the
//! scheduler records on every provider call and every feature-computer
//! pass, regardless of outcome.

use chrono::DateTime;
use rusqlite::params;

use crate::domain::{ComputeAudit, FetchAudit, Period};
use crate::error::PersistenceError;

pub fn record_fetch(conn: &rusqlite::Connection, audit: &FetchAudit) -> Result<i64, PersistenceError> {
    conn.execute(
        "INSERT INTO fetch_audit (
            symbol, source, period, requested_start_ms, requested_end_ms, fetched_count,
            inserted_count, updated_count, latency_ms, success, quota_remaining, error_text, timestamp_ms
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            audit.symbol,
            audit.source,
            audit.period.code(),
            audit.requested_start.timestamp_millis(),
            audit.requested_end.timestamp_millis(),
            audit.fetched_count,
            audit.inserted_count,
            audit.updated_count,
            audit.latency_ms,
            audit.success,
            audit.quota_remaining,
            audit.error_text,
            audit.timestamp.timestamp_millis(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn record_compute(conn: &rusqlite::Connection, audit: &ComputeAudit) -> Result<i64, PersistenceError> {
    conn.execute(
        "INSERT INTO compute_audit (
            symbol, period, candles_processed, features_computed, duration_ms, success, error_text, timestamp_ms
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            audit.symbol,
            audit.period.code(),
            audit.candles_processed,
            audit.features_computed,
            audit.duration_ms,
            audit.success,
            audit.error_text,
            audit.timestamp.timestamp_millis(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn recent_fetch_audits(conn: &rusqlite::Connection, symbol: &str, limit: i64) -> Result<Vec<FetchAudit>, PersistenceError> {
    let mut stmt = conn.prepare(
        "SELECT id, symbol, source, period, requested_start_ms, requested_end_ms, fetched_count,
                inserted_count, updated_count, latency_ms, success, quota_remaining, error_text, timestamp_ms
         FROM fetch_audit WHERE symbol = ?1 ORDER BY timestamp_ms DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![symbol, limit], |row| {
        let period_code: String = row.get(3)?;
        Ok(FetchAudit {
            id: Some(row.get(0)?),
            symbol: row.get(1)?,
            source: row.get(2)?,
            period: Period::from_code(&period_code).unwrap_or(Period::OneDay),
            requested_start: DateTime::from_timestamp_millis(row.get(4)?).unwrap_or_default(),
            requested_end: DateTime::from_timestamp_millis(row.get(5)?).unwrap_or_default(),
            fetched_count: row.get(6)?,
            inserted_count: row.get(7)?,
            updated_count: row.get(8)?,
            latency_ms: row.get(9)?,
            success: row.get(10)?,
            quota_remaining: row.get(11)?,
            error_text: row.get(12)?,
            timestamp: DateTime::from_timestamp_millis(row.get(13)?).unwrap_or_default(),
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(PersistenceError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::database::Database;
    use chrono::Utc;

    fn audit(symbol: &str, success: bool) -> FetchAudit {
        let now = Utc::now();
        FetchAudit {
            id: None,
            symbol: symbol.to_string(),
            source: "rich".into(),
            period: Period::OneDay,
            requested_start: now,
            requested_end: now,
            fetched_count: 10,
            inserted_count: 10,
            updated_count: 0,
            latency_ms: 42,
            success,
            quota_remaining: Some(100),
            error_text: None,
            timestamp: now,
        }
    }

    #[test]
    fn records_and_reads_back_fetch_audit() {
        let db = Database::open_in_memory().unwrap();
        record_fetch(db.connection(), &audit("AAPL", true)).unwrap();
        record_fetch(db.connection(), &audit("AAPL", false)).unwrap();
        let recent = recent_fetch_audits(db.connection(), "AAPL", 10).unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn compute_audit_round_trips_through_insert() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let audit = ComputeAudit {
            id: None,
            symbol: "AAPL".into(),
            period: Period::OneDay,
            candles_processed: 500,
            features_computed: 500,
            duration_ms: 30,
            success: true,
            error_text: None,
            timestamp: now,
        };
        let id = record_compute(db.connection(), &audit).unwrap();
        assert!(id > 0);
    }
}
