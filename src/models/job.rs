use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Database row for copy_execution_jobs: one durable unit of work per
/// (origin operation, follower, action).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CopyJob {
    pub id: Uuid,
    pub origin_id: String,
    pub user_id: Uuid,
    pub action: String,
    pub status: String,
    pub attempt: i32,
    pub next_run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub payload: String,
    pub last_error_category: String,
    pub last_error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CopyJob {
    pub fn action_kind(&self) -> Option<JobAction> {
        JobAction::from_str(&self.action)
    }
}

// ---------------------------------------------------------------------------
// JobAction / JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobAction {
    Open,
    Close,
}

impl JobAction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(JobAction::Open),
            "CLOSE" => Some(JobAction::Close),
            _ => None,
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobAction::Open => write!(f, "OPEN"),
            JobAction::Close => write!(f, "CLOSE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Dead,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Done => write!(f, "DONE"),
            JobStatus::Dead => write!(f, "DEAD"),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorCategory — retry taxonomy for failed executions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    None,
    /// Intentionally abandoned; dead-lettered without counting as failure noise.
    Skip,
    RateLimit,
    /// Declared client error — retrying the same request cannot succeed.
    Validation,
    Network,
    /// Server-side external failure, expected to clear.
    Transient,
    /// Worker pool saturation; the job was never attempted.
    Rejected,
    Unknown,
}

impl ErrorCategory {
    /// Retried with the longer rate-limit schedule.
    pub fn is_rate_limit(self) -> bool {
        matches!(self, ErrorCategory::RateLimit)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::None => "NONE",
            ErrorCategory::Skip => "SKIP",
            ErrorCategory::RateLimit => "RATE_LIMIT",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Transient => "TRANSIENT",
            ErrorCategory::Rejected => "REJECTED",
            ErrorCategory::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}
