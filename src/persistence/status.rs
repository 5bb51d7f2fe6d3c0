//! Enrichment-status reader/writer (§3/§6): the row the scheduler's
//! exposed "per-symbol status" query reads from.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::domain::{AssetClass, EnrichmentState, EnrichmentStatus};
use crate::error::PersistenceError;

fn row_to_status(row: &rusqlite::Row) -> rusqlite::Result<EnrichmentStatus> {
    let asset_class_code: String = row.get(1)?;
    let state_code: String = row.get(5)?;
    let last_success_ms: Option<i64> = row.get(2)?;
    Ok(EnrichmentStatus {
        symbol: row.get(0)?,
        asset_class: AssetClass::from_code(&asset_class_code).unwrap_or(AssetClass::Stock),
        last_success: last_success_ms.and_then(chrono::DateTime::from_timestamp_millis),
        last_source: row.get(3)?,
        last_compute_duration_ms: row.get(4)?,
        state: code_to_state(&state_code),
        current_quality_score: row.get(6)?,
        current_record_count: row.get(7)?,
        last_error: row.get(8)?,
    })
}

fn code_to_state(code: &str) -> EnrichmentState {
    match code {
        "healthy" => EnrichmentState::Healthy,
        "warning" => EnrichmentState::Warning,
        "stale" => EnrichmentState::Stale,
        "error" => EnrichmentState::Error,
        _ => EnrichmentState::NotEnriched,
    }
}

pub fn get_status(conn: &rusqlite::Connection, symbol: &str, asset_class: AssetClass) -> Result<Option<EnrichmentStatus>, PersistenceError> {
    conn.query_row(
        "SELECT symbol, asset_class, last_success_ms, last_source, last_compute_duration_ms,
                state, current_quality_score, current_record_count, last_error
         FROM enrichment_status WHERE symbol = ?1 AND asset_class = ?2",
        params![symbol, asset_class.code()],
        row_to_status,
    )
    .optional()
    .map_err(PersistenceError::from)
}

pub fn upsert_status(conn: &rusqlite::Connection, status: &EnrichmentStatus) -> Result<(), PersistenceError> {
    conn.execute(
        "INSERT INTO enrichment_status (
            symbol, asset_class, last_success_ms, last_source, last_compute_duration_ms,
            state, current_quality_score, current_record_count, last_error
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
        ON CONFLICT(symbol, asset_class) DO UPDATE SET
            last_success_ms = excluded.last_success_ms,
            last_source = excluded.last_source,
            last_compute_duration_ms = excluded.last_compute_duration_ms,
            state = excluded.state,
            current_quality_score = excluded.current_quality_score,
            current_record_count = excluded.current_record_count,
            last_error = excluded.last_error",
        params![
            status.symbol,
            status.asset_class.code(),
            status.last_success.map(|t| t.timestamp_millis()),
            status.last_source,
            status.last_compute_duration_ms,
            status.state.code(),
            status.current_quality_score,
            status.current_record_count,
            status.last_error,
        ],
    )?;
    Ok(())
}

/// Transitions a symbol's stored state to `stale` when its last success
/// is older than the asset class's freshness SLA "stale" threshold,
/// without waiting for the next fetch attempt to discover it.
pub fn mark_stale_if_expired(conn: &rusqlite::Connection, symbol: &str, asset_class: AssetClass) -> Result<(), PersistenceError> {
    let Some(mut status) = get_status(conn, symbol, asset_class)? else {
        return Ok(());
    };
    let Some(last_success) = status.last_success else {
        return Ok(());
    };
    let sla = crate::config::FreshnessSla::for_asset_class(asset_class);
    if (Utc::now() - last_success).to_std().unwrap_or_default() >= sla.stale {
        status.state = EnrichmentState::Stale;
        upsert_status(conn, &status)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::database::Database;

    #[test]
    fn unknown_symbol_has_no_status() {
        let db = Database::open_in_memory().unwrap();
        assert!(get_status(db.connection(), "AAPL", AssetClass::Stock).unwrap().is_none());
    }

    #[test]
    fn upsert_then_read_roundtrips() {
        let db = Database::open_in_memory().unwrap();
        let status = EnrichmentStatus {
            symbol: "AAPL".into(),
            asset_class: AssetClass::Stock,
            last_success: Some(Utc::now()),
            last_source: Some("rich".into()),
            last_compute_duration_ms: Some(120),
            state: EnrichmentState::Healthy,
            current_quality_score: Some(0.95),
            current_record_count: 500,
            last_error: None,
        };
        upsert_status(db.connection(), &status).unwrap();
        let read_back = get_status(db.connection(), "AAPL", AssetClass::Stock).unwrap().unwrap();
        assert_eq!(read_back.state, EnrichmentState::Healthy);
        assert_eq!(read_back.current_record_count, 500);
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let mut status = EnrichmentStatus::not_enriched("AAPL", AssetClass::Stock);
        upsert_status(db.connection(), &status).unwrap();
        status.state = EnrichmentState::Healthy;
        status.current_record_count = 10;
        upsert_status(db.connection(), &status).unwrap();
        let read_back = get_status(db.connection(), "AAPL", AssetClass::Stock).unwrap().unwrap();
        assert_eq!(read_back.state, EnrichmentState::Healthy);
        assert_eq!(read_back.current_record_count, 10);
    }
}
