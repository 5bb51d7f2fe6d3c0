//! Backfill job state (§4.6/§4.7), replacing the teacher's
//! `TimeframeStatus` static-method table with the richer
//! (job_id, symbol, asset_class, period) row the scheduler resumes
//! from on restart.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

use crate::domain::{AssetClass, BackfillState, BackfillStatus, Period};
use crate::error::PersistenceError;

fn row_to_state(row: &rusqlite::Row) -> rusqlite::Result<BackfillState> {
    let asset_class_code: String = row.get(3)?;
    let period_code: String = row.get(4)?;
    let status_code: String = row.get(8)?;
    let last_successful: Option<String> = row.get(7)?;
    Ok(BackfillState {
        id: Some(row.get(0)?),
        job_id: row.get(1)?,
        symbol: row.get(2)?,
        asset_class: AssetClass::from_code(&asset_class_code).unwrap_or(AssetClass::Stock),
        period: Period::from_code(&period_code).unwrap_or(Period::OneDay),
        requested_start: NaiveDate::parse_from_str(&row.get::<_, String>(5)?, "%Y-%m-%d").unwrap(),
        requested_end: NaiveDate::parse_from_str(&row.get::<_, String>(6)?, "%Y-%m-%d").unwrap(),
        last_successful_date: last_successful.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        status: BackfillStatus::from_code(&status_code).unwrap_or(BackfillStatus::Pending),
        retry_count: row.get(9)?,
        last_error: row.get(10)?,
        created_at: chrono::DateTime::from_timestamp_millis(row.get(11)?).unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(row.get(12)?).unwrap_or_else(Utc::now),
    })
}

/// Registers a new job, or returns the existing row unchanged if one
/// already exists for (job_id, symbol, asset_class, period) — restart
/// safety per §4.6.
pub fn register_job(conn: &rusqlite::Connection, job_id: &str, symbol: &str, asset_class: AssetClass, period: Period, requested_start: NaiveDate, requested_end: NaiveDate) -> Result<BackfillState, PersistenceError> {
    if let Some(existing) = get_job(conn, job_id, symbol, asset_class, period)? {
        return Ok(existing);
    }
    let now = Utc::now();
    conn.execute(
        "INSERT INTO backfill_state (
            job_id, symbol, asset_class, period, requested_start, requested_end,
            last_successful_date, status, retry_count, last_error, created_at_ms, updated_at_ms
        ) VALUES (?1,?2,?3,?4,?5,?6,NULL,?7,0,NULL,?8,?8)",
        params![
            job_id,
            symbol,
            asset_class.code(),
            period.code(),
            requested_start.to_string(),
            requested_end.to_string(),
            BackfillStatus::Pending.code(),
            now.timestamp_millis(),
        ],
    )?;
    Ok(get_job(conn, job_id, symbol, asset_class, period)?.expect("just inserted"))
}

pub fn get_job(conn: &rusqlite::Connection, job_id: &str, symbol: &str, asset_class: AssetClass, period: Period) -> Result<Option<BackfillState>, PersistenceError> {
    conn.query_row(
        "SELECT id, job_id, symbol, asset_class, period, requested_start, requested_end,
                last_successful_date, status, retry_count, last_error, created_at_ms, updated_at_ms
         FROM backfill_state
         WHERE job_id = ?1 AND symbol = ?2 AND asset_class = ?3 AND period = ?4",
        params![job_id, symbol, asset_class.code(), period.code()],
        row_to_state,
    )
    .optional()
    .map_err(PersistenceError::from)
}

/// Advances progress after a successful page (§4.6): bumps
/// `last_successful_date`, sets status `in-progress`, resets the retry
/// counter.
pub fn advance(conn: &rusqlite::Connection, id: i64, new_last_successful_date: NaiveDate) -> Result<(), PersistenceError> {
    conn.execute(
        "UPDATE backfill_state SET last_successful_date = ?1, status = ?2, retry_count = 0, last_error = NULL, updated_at_ms = ?3 WHERE id = ?4",
        params![
            new_last_successful_date.to_string(),
            BackfillStatus::InProgress.code(),
            Utc::now().timestamp_millis(),
            id,
        ],
    )?;
    Ok(())
}

pub fn complete(conn: &rusqlite::Connection, id: i64) -> Result<(), PersistenceError> {
    conn.execute(
        "UPDATE backfill_state SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
        params![BackfillStatus::Completed.code(), Utc::now().timestamp_millis(), id],
    )?;
    Ok(())
}

/// Marks a job failed and increments its retry counter (§4.7: the
/// scheduler's retry loop reads this back to decide whether to give up).
pub fn fail(conn: &rusqlite::Connection, id: i64, error_text: &str) -> Result<(), PersistenceError> {
    conn.execute(
        "UPDATE backfill_state SET status = ?1, retry_count = retry_count + 1, last_error = ?2, updated_at_ms = ?3 WHERE id = ?4",
        params![BackfillStatus::Failed.code(), error_text, Utc::now().timestamp_millis(), id],
    )?;
    Ok(())
}

/// §4.6's resumption rule: a newly started job for the same (symbol,
/// asset class, period) resumes from `last_successful_date + 1 period`
/// rather than `start_date` when an in-progress or failed row already
/// exists for that triple under *any* job id.
pub fn resume_start_date(conn: &rusqlite::Connection, symbol: &str, asset_class: AssetClass, period: Period) -> Result<Option<NaiveDate>, PersistenceError> {
    let row: Option<(Option<String>, String)> = conn
        .query_row(
            "SELECT last_successful_date, status FROM backfill_state
             WHERE symbol = ?1 AND asset_class = ?2 AND period = ?3
               AND status IN (?4, ?5)
             ORDER BY updated_at_ms DESC LIMIT 1",
            params![
                symbol,
                asset_class.code(),
                period.code(),
                BackfillStatus::InProgress.code(),
                BackfillStatus::Failed.code(),
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(row.and_then(|(last_successful, _status)| {
        last_successful
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
            .and_then(|d| d.succ_opt())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::database::Database;

    fn dates() -> (NaiveDate, NaiveDate) {
        (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (start, end) = dates();
        let first = register_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay, start, end).unwrap();
        let second = register_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay, start, end).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn advance_updates_last_successful_date_and_resets_retries() {
        let db = Database::open_in_memory().unwrap();
        let (start, end) = dates();
        let job = register_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay, start, end).unwrap();
        fail(db.connection(), job.id.unwrap(), "boom").unwrap();
        let mid = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        advance(db.connection(), job.id.unwrap(), mid).unwrap();

        let refreshed = get_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay).unwrap().unwrap();
        assert_eq!(refreshed.last_successful_date, Some(mid));
        assert_eq!(refreshed.retry_count, 0);
        assert_eq!(refreshed.status, BackfillStatus::InProgress);
    }

    #[test]
    fn resume_start_date_picks_up_after_last_success() {
        let db = Database::open_in_memory().unwrap();
        let (start, end) = dates();
        let job = register_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay, start, end).unwrap();
        let mid = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        advance(db.connection(), job.id.unwrap(), mid).unwrap();
        fail(db.connection(), job.id.unwrap(), "transient").unwrap();

        let resume = resume_start_date(db.connection(), "AAPL", AssetClass::Stock, Period::OneDay).unwrap();
        assert_eq!(resume, Some(mid.succ_opt().unwrap()));
    }

    #[test]
    fn resume_start_date_is_none_without_a_prior_job() {
        let db = Database::open_in_memory().unwrap();
        let resume = resume_start_date(db.connection(), "AAPL", AssetClass::Stock, Period::OneDay).unwrap();
        assert_eq!(resume, None);
    }

    #[test]
    fn fail_increments_retry_count() {
        let db = Database::open_in_memory().unwrap();
        let (start, end) = dates();
        let job = register_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay, start, end).unwrap();
        fail(db.connection(), job.id.unwrap(), "boom").unwrap();
        fail(db.connection(), job.id.unwrap(), "boom again").unwrap();
        let refreshed = get_job(db.connection(), "job-1", "AAPL", AssetClass::Stock, Period::OneDay).unwrap().unwrap();
        assert_eq!(refreshed.retry_count, 2);
        assert_eq!(refreshed.status, BackfillStatus::Failed);
    }
}
