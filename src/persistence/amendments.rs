//! Amendment-log reader (§3). Writing happens inline with the UPSERT
//! transaction in [`super::candles`]; this module only exposes the
//! append-only audit trail back out for inspection.

use chrono::DateTime;
use rusqlite::params;

use crate::domain::{AmendmentLogEntry, AmendmentReason};
use crate::error::PersistenceError;

fn code_to_reason(code: &str) -> AmendmentReason {
    match code {
        "bug-fix" => AmendmentReason::BugFix,
        "manual-correction" => AmendmentReason::ManualCorrection,
        "validation-failure" => AmendmentReason::ValidationFailure,
        _ => AmendmentReason::SourceUpdated,
    }
}

pub fn for_row(conn: &rusqlite::Connection, original_row_id: i64) -> Result<Vec<AmendmentLogEntry>, PersistenceError> {
    let mut stmt = conn.prepare(
        "SELECT id, original_row_id, field_name, old_value, new_value, reason, actor, timestamp_ms
         FROM amendment_log WHERE original_row_id = ?1 ORDER BY timestamp_ms ASC",
    )?;
    let rows = stmt.query_map(params![original_row_id], |row| {
        let reason_code: String = row.get(5)?;
        Ok(AmendmentLogEntry {
            id: Some(row.get(0)?),
            original_row_id: row.get(1)?,
            field_name: row.get(2)?,
            old_value: row.get(3)?,
            new_value: row.get(4)?,
            reason: code_to_reason(&reason_code),
            actor: row.get(6)?,
            timestamp: DateTime::from_timestamp_millis(row.get(7)?).unwrap_or_default(),
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(PersistenceError::from)
}
