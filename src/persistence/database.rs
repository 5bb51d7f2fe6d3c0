//! SQLite schema owner (§6), generalized from the teacher's
//! `DatabaseManager`: same "open, init schema, hand out the connection"
//! shape, extended from two tables (`candlesticks`, `timeframe_status`)
//! to the full warehouse schema (§3).

use std::path::Path;

use rusqlite::Connection;

use crate::error::PersistenceError;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_file: &str) -> Result<Self, PersistenceError> {
        let conn = Connection::open(Path::new(db_file))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), PersistenceError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS enriched_candles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                period TEXT NOT NULL,
                period_open_ms INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume INTEGER NOT NULL,
                universal_json TEXT NOT NULL,
                crypto_json TEXT NOT NULL,
                source TEXT NOT NULL,
                validated INTEGER NOT NULL,
                quality_score REAL NOT NULL,
                completeness REAL NOT NULL,
                gap_flag INTEGER NOT NULL,
                volume_anomaly_flag INTEGER NOT NULL,
                validation_note TEXT,
                revision INTEGER NOT NULL DEFAULT 1,
                amended_from INTEGER,
                fetched_at_ms INTEGER NOT NULL,
                computed_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                UNIQUE(symbol, asset_class, period, period_open_ms)
            );
            CREATE INDEX IF NOT EXISTS idx_enriched_candles_lookup
                ON enriched_candles(symbol, asset_class, period, period_open_ms);

            CREATE TABLE IF NOT EXISTS backfill_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                period TEXT NOT NULL,
                requested_start TEXT NOT NULL,
                requested_end TEXT NOT NULL,
                last_successful_date TEXT,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                UNIQUE(job_id, symbol, asset_class, period)
            );
            CREATE INDEX IF NOT EXISTS idx_backfill_state_status
                ON backfill_state(status);

            CREATE TABLE IF NOT EXISTS enrichment_status (
                symbol TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                last_success_ms INTEGER,
                last_source TEXT,
                last_compute_duration_ms INTEGER,
                state TEXT NOT NULL,
                current_quality_score REAL,
                current_record_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                PRIMARY KEY (symbol, asset_class)
            );

            CREATE TABLE IF NOT EXISTS amendment_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                original_row_id INTEGER NOT NULL,
                field_name TEXT NOT NULL,
                old_value TEXT NOT NULL,
                new_value TEXT NOT NULL,
                reason TEXT NOT NULL,
                actor TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_amendment_log_row
                ON amendment_log(original_row_id);

            CREATE TABLE IF NOT EXISTS fetch_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                source TEXT NOT NULL,
                period TEXT NOT NULL,
                requested_start_ms INTEGER NOT NULL,
                requested_end_ms INTEGER NOT NULL,
                fetched_count INTEGER NOT NULL,
                inserted_count INTEGER NOT NULL,
                updated_count INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL,
                success INTEGER NOT NULL,
                quota_remaining INTEGER,
                error_text TEXT,
                timestamp_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fetch_audit_symbol
                ON fetch_audit(symbol, timestamp_ms);

            CREATE TABLE IF NOT EXISTS compute_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                period TEXT NOT NULL,
                candles_processed INTEGER NOT NULL,
                features_computed INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                success INTEGER NOT NULL,
                error_text TEXT,
                timestamp_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_compute_audit_symbol
                ON compute_audit(symbol, timestamp_ms);
            ",
        )?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
