use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::period::{AssetClass, Period};

/// Status of a backfill-state row (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackfillStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BackfillStatus {
    pub fn code(self) -> &'static str {
        match self {
            BackfillStatus::Pending => "pending",
            BackfillStatus::InProgress => "in-progress",
            BackfillStatus::Completed => "completed",
            BackfillStatus::Failed => "failed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "pending" => BackfillStatus::Pending,
            "in-progress" => BackfillStatus::InProgress,
            "completed" => BackfillStatus::Completed,
            "failed" => BackfillStatus::Failed,
            _ => return None,
        })
    }
}

/// One row per (symbol, asset class, period, job id) (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillState {
    pub id: Option<i64>,
    pub job_id: String,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub period: Period,
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    pub last_successful_date: Option<NaiveDate>,
    pub status: BackfillStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackfillState {
    /// §3 invariant: a `completed` row must have
    /// `last_successful_date >= requested_end`.
    pub fn satisfies_completion_invariant(&self) -> bool {
        if self.status != BackfillStatus::Completed {
            return true;
        }
        matches!(self.last_successful_date, Some(d) if d >= self.requested_end)
    }

    /// §4.6 resumption rule: a job resuming this state starts from
    /// `last_successful_date + 1 period` rather than `requested_start`.
    pub fn resume_from(&self) -> NaiveDate {
        match self.last_successful_date {
            Some(d) => d.succ_opt().unwrap_or(d),
            None => self.requested_start,
        }
    }
}

/// Current health state exposed per (symbol, asset class) (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrichmentState {
    Healthy,
    Warning,
    Stale,
    Error,
    NotEnriched,
}

impl EnrichmentState {
    pub fn code(self) -> &'static str {
        match self {
            EnrichmentState::Healthy => "healthy",
            EnrichmentState::Warning => "warning",
            EnrichmentState::Stale => "stale",
            EnrichmentState::Error => "error",
            EnrichmentState::NotEnriched => "not-enriched",
        }
    }
}

/// One row per (symbol, asset class) (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentStatus {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub last_success: Option<DateTime<Utc>>,
    pub last_source: Option<String>,
    pub last_compute_duration_ms: Option<i64>,
    pub state: EnrichmentState,
    pub current_quality_score: Option<f64>,
    pub current_record_count: i64,
    pub last_error: Option<String>,
}

impl EnrichmentStatus {
    pub fn not_enriched(symbol: impl Into<String>, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
            last_success: None,
            last_source: None,
            last_compute_duration_ms: None,
            state: EnrichmentState::NotEnriched,
            current_quality_score: None,
            current_record_count: 0,
            last_error: None,
        }
    }
}

/// Reason an enriched-candle field was overwritten (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmendmentReason {
    SourceUpdated,
    BugFix,
    ManualCorrection,
    ValidationFailure,
}

impl AmendmentReason {
    pub fn code(self) -> &'static str {
        match self {
            AmendmentReason::SourceUpdated => "source-updated",
            AmendmentReason::BugFix => "bug-fix",
            AmendmentReason::ManualCorrection => "manual-correction",
            AmendmentReason::ValidationFailure => "validation-failure",
        }
    }
}

/// Append-only amendment-log row (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmendmentLogEntry {
    pub id: Option<i64>,
    pub original_row_id: i64,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub reason: AmendmentReason,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only fetch-audit row (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAudit {
    pub id: Option<i64>,
    pub symbol: String,
    pub source: String,
    pub period: Period,
    pub requested_start: DateTime<Utc>,
    pub requested_end: DateTime<Utc>,
    pub fetched_count: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub latency_ms: i64,
    pub success: bool,
    pub quota_remaining: Option<i64>,
    pub error_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only compute-audit row (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeAudit {
    pub id: Option<i64>,
    pub symbol: String,
    pub period: Period,
    pub candles_processed: i64,
    pub features_computed: i64,
    pub duration_ms: i64,
    pub success: bool,
    pub error_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: BackfillStatus, last: Option<NaiveDate>, end: NaiveDate) -> BackfillState {
        let now = Utc::now();
        BackfillState {
            id: None,
            job_id: "job-1".into(),
            symbol: "AAPL".into(),
            asset_class: AssetClass::Stock,
            period: Period::OneDay,
            requested_start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            requested_end: end,
            last_successful_date: last,
            status,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn completed_without_reaching_end_violates_invariant() {
        let end = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let short = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let s = state(BackfillStatus::Completed, Some(short), end);
        assert!(!s.satisfies_completion_invariant());
    }

    #[test]
    fn completed_reaching_end_satisfies_invariant() {
        let end = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let s = state(BackfillStatus::Completed, Some(end), end);
        assert!(s.satisfies_completion_invariant());
    }

    #[test]
    fn resume_from_picks_day_after_last_success() {
        let end = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let s = state(BackfillStatus::Failed, Some(last), end);
        assert_eq!(s.resume_from(), NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn resume_from_falls_back_to_requested_start_when_never_advanced() {
        let end = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let s = state(BackfillStatus::Pending, None, end);
        assert_eq!(s.resume_from(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }
}
