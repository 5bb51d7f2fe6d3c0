//! Enriched-candle UPSERT (§4.6). Keeps the teacher's
//! transaction-plus-prepared-statement idiom from `insert_batch`, but
//! swaps `INSERT OR IGNORE` for a read-compare-then-conditionally-UPDATE
//! sequence: a row is only overwritten when the incoming quality score
//! is strictly higher than the stored one, and the overwrite is logged
//! to the amendment table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

use crate::config::PERSISTENCE_BATCH_SIZE;
use crate::domain::{AmendmentLogEntry, AmendmentReason, EnrichedCandle};
use crate::error::PersistenceError;

pub struct UpsertSummary {
    pub inserted: i64,
    pub updated: i64,
    pub unchanged: i64,
}

struct ExistingRow {
    id: i64,
    quality_score: f64,
    revision: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: i64,
    universal_json: String,
    crypto_json: String,
    source: String,
}

fn find_existing(tx: &Transaction, candle: &EnrichedCandle) -> Result<Option<ExistingRow>, PersistenceError> {
    tx.query_row(
        "SELECT id, quality_score, revision, open, high, low, close, volume, universal_json, crypto_json, source
         FROM enriched_candles
         WHERE symbol = ?1 AND asset_class = ?2 AND period = ?3 AND period_open_ms = ?4",
        params![
            candle.symbol,
            candle.asset_class.code(),
            candle.period.code(),
            candle.period_open.timestamp_millis(),
        ],
        |row| {
            Ok(ExistingRow {
                id: row.get(0)?,
                quality_score: row.get(1)?,
                revision: row.get(2)?,
                open: row.get(3)?,
                high: row.get(4)?,
                low: row.get(5)?,
                close: row.get(6)?,
                volume: row.get(7)?,
                universal_json: row.get(8)?,
                crypto_json: row.get(9)?,
                source: row.get(10)?,
            })
        },
    )
    .optional()
    .map_err(PersistenceError::from)
}

fn insert_new(tx: &Transaction, candle: &EnrichedCandle) -> Result<i64, PersistenceError> {
    tx.execute(
        "INSERT INTO enriched_candles (
            symbol, asset_class, period, period_open_ms, open, high, low, close, volume,
            universal_json, crypto_json, source, validated, quality_score, completeness,
            gap_flag, volume_anomaly_flag, validation_note, revision, amended_from,
            fetched_at_ms, computed_at_ms, updated_at_ms
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)",
        params![
            candle.symbol,
            candle.asset_class.code(),
            candle.period.code(),
            candle.period_open.timestamp_millis(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume,
            serde_json::to_string(&candle.universal).map_err(|e| PersistenceError::BatchRolledBack(e.to_string()))?,
            serde_json::to_string(&candle.crypto).map_err(|e| PersistenceError::BatchRolledBack(e.to_string()))?,
            candle.quality.source,
            candle.quality.validated,
            candle.quality.quality_score,
            candle.quality.completeness,
            candle.quality.gap_flag,
            candle.quality.volume_anomaly_flag,
            candle.quality.validation_note,
            1i64,
            Option::<i64>::None,
            candle.fetched_at.timestamp_millis(),
            candle.computed_at.timestamp_millis(),
            candle.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_existing(tx: &Transaction, existing: &ExistingRow, candle: &EnrichedCandle) -> Result<(), PersistenceError> {
    tx.execute(
        "UPDATE enriched_candles SET
            open = ?1, high = ?2, low = ?3, close = ?4, volume = ?5,
            universal_json = ?6, crypto_json = ?7, source = ?8, validated = ?9,
            quality_score = ?10, completeness = ?11, gap_flag = ?12,
            volume_anomaly_flag = ?13, validation_note = ?14, revision = ?15,
            amended_from = ?16, updated_at_ms = ?17
         WHERE id = ?18",
        params![
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume,
            serde_json::to_string(&candle.universal).map_err(|e| PersistenceError::BatchRolledBack(e.to_string()))?,
            serde_json::to_string(&candle.crypto).map_err(|e| PersistenceError::BatchRolledBack(e.to_string()))?,
            candle.quality.source,
            candle.quality.validated,
            candle.quality.quality_score,
            candle.quality.completeness,
            candle.quality.gap_flag,
            candle.quality.volume_anomaly_flag,
            candle.quality.validation_note,
            existing.revision + 1,
            candle.amended_from,
            candle.updated_at.timestamp_millis(),
            existing.id,
        ],
    )?;
    Ok(())
}

/// §4.6 requires one amendment-log row per mutated value-field, not one
/// row for the whole update; this walks the OHLCV and feature/source
/// fields the update is about to overwrite and logs only the ones whose
/// stringified value actually changes.
fn log_mutated_fields(tx: &Transaction, existing: &ExistingRow, candle: &EnrichedCandle) -> Result<(), PersistenceError> {
    let universal_json = serde_json::to_string(&candle.universal).map_err(|e| PersistenceError::BatchRolledBack(e.to_string()))?;
    let crypto_json = serde_json::to_string(&candle.crypto).map_err(|e| PersistenceError::BatchRolledBack(e.to_string()))?;

    let candidates: Vec<(&str, String, String)> = vec![
        ("open", existing.open.clone(), candle.open.to_string()),
        ("high", existing.high.clone(), candle.high.to_string()),
        ("low", existing.low.clone(), candle.low.to_string()),
        ("close", existing.close.clone(), candle.close.to_string()),
        ("volume", existing.volume.to_string(), candle.volume.to_string()),
        ("universal_features", existing.universal_json.clone(), universal_json),
        ("crypto_features", existing.crypto_json.clone(), crypto_json),
        ("source", existing.source.clone(), candle.quality.source.clone()),
        ("quality_score", existing.quality_score.to_string(), candle.quality.quality_score.to_string()),
    ];

    for (field_name, old_value, new_value) in candidates {
        if old_value != new_value {
            log_amendment(tx, existing.id, field_name, old_value, new_value, candle.updated_at)?;
        }
    }
    Ok(())
}

fn log_amendment(tx: &Transaction, existing_row_id: i64, field_name: &str, old_value: String, new_value: String, now: DateTime<Utc>) -> Result<(), PersistenceError> {
    let entry = AmendmentLogEntry {
        id: None,
        original_row_id: existing_row_id,
        field_name: field_name.to_string(),
        old_value,
        new_value,
        reason: AmendmentReason::SourceUpdated,
        actor: "aggregator".to_string(),
        timestamp: now,
    };
    tx.execute(
        "INSERT INTO amendment_log (original_row_id, field_name, old_value, new_value, reason, actor, timestamp_ms)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            entry.original_row_id,
            entry.field_name,
            entry.old_value,
            entry.new_value,
            entry.reason.code(),
            entry.actor,
            entry.timestamp.timestamp_millis(),
        ],
    )?;
    Ok(())
}

/// Applies `candles` in atomic batches of [`PERSISTENCE_BATCH_SIZE`]
/// (§4.6): a higher incoming quality score updates the row and bumps
/// `revision`; an equal-or-lower score leaves the stored row untouched.
pub fn upsert_candles(conn: &mut rusqlite::Connection, candles: &[EnrichedCandle]) -> Result<UpsertSummary, PersistenceError> {
    let mut summary = UpsertSummary { inserted: 0, updated: 0, unchanged: 0 };

    for chunk in candles.chunks(PERSISTENCE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        for candle in chunk {
            match find_existing(&tx, candle)? {
                None => {
                    insert_new(&tx, candle)?;
                    summary.inserted += 1;
                }
                Some(existing) => {
                    if candle.quality.quality_score > existing.quality_score {
                        log_mutated_fields(&tx, &existing, candle)?;
                        update_existing(&tx, &existing, candle)?;
                        summary.updated += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
            }
        }
        tx.commit()?;
    }

    Ok(summary)
}
