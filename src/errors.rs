use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::exchange::client::ExchangeError;
use crate::models::ErrorCategory;

// ---------------------------------------------------------------------------
// EngineError — failures surfaced by job execution
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The job is intentionally abandoned (follower gone, budget exhausted,
    /// sizing reject). Dead-lettered immediately, never retried.
    #[error("skipped: {0}")]
    Skip(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn skip(reason: impl Into<String>) -> Self {
        EngineError::Skip(reason.into())
    }
}

/// Classify a failure for retry scheduling. First match wins, walking the
/// full cause chain: a contextual wrapper around a rate-limit response must
/// still back off on the rate-limit schedule.
pub fn classify(err: &EngineError) -> ErrorCategory {
    match err {
        EngineError::Skip(_) => ErrorCategory::Skip,
        EngineError::Exchange(e) => classify_exchange(e),
        // Connection/pool trouble clears on its own; statement errors are
        // rare enough to retry conservatively too.
        EngineError::Db(_) => ErrorCategory::Transient,
        EngineError::Other(e) => classify_chain(e.chain()),
    }
}

fn classify_exchange(err: &ExchangeError) -> ErrorCategory {
    match err {
        ExchangeError::RateLimited(_) => ErrorCategory::RateLimit,
        ExchangeError::Rejected { .. } => ErrorCategory::Validation,
        ExchangeError::Server { .. } => ErrorCategory::Transient,
        ExchangeError::InvalidResponse(_) => ErrorCategory::Transient,
        ExchangeError::Http(e) => classify_reqwest(e),
    }
}

fn classify_reqwest(err: &reqwest::Error) -> ErrorCategory {
    if let Some(status) = err.status() {
        if status.as_u16() == 429 {
            return ErrorCategory::RateLimit;
        }
        if status.is_client_error() {
            return ErrorCategory::Validation;
        }
        if status.is_server_error() {
            return ErrorCategory::Transient;
        }
    }
    if err.is_connect() || err.is_timeout() {
        return ErrorCategory::Network;
    }
    ErrorCategory::Unknown
}

fn classify_chain<'a>(
    chain: impl Iterator<Item = &'a (dyn std::error::Error + 'static)>,
) -> ErrorCategory {
    for cause in chain {
        if let Some(e) = cause.downcast_ref::<ExchangeError>() {
            return classify_exchange(e);
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return classify_reqwest(e);
        }
        if cause.downcast_ref::<sqlx::Error>().is_some() {
            return ErrorCategory::Transient;
        }
    }
    ErrorCategory::Unknown
}

/// Truncate error text before persisting it on the job row.
pub fn safe_message(err: &EngineError) -> String {
    const MAX: usize = 4000;
    let msg = err.to_string();
    if msg.len() > MAX {
        msg.chars().take(MAX).collect()
    } else {
        msg
    }
}

// ---------------------------------------------------------------------------
// AppError — HTTP-facing failures
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_classified_as_skip() {
        let err = EngineError::skip("budget exhausted");
        assert_eq!(classify(&err), ErrorCategory::Skip);
    }

    #[test]
    fn test_exchange_rejection_is_validation() {
        let err = EngineError::Exchange(ExchangeError::Rejected {
            status: 400,
            message: "invalid quantity".into(),
        });
        assert_eq!(classify(&err), ErrorCategory::Validation);
    }

    #[test]
    fn test_rate_limit_found_through_cause_chain() {
        let inner = ExchangeError::RateLimited("too many requests".into());
        let wrapped =
            EngineError::Other(anyhow::Error::new(inner).context("placing order for follower"));
        assert_eq!(classify(&wrapped), ErrorCategory::RateLimit);
    }

    #[test]
    fn test_server_error_is_transient() {
        let err = EngineError::Exchange(ExchangeError::Server {
            status: 503,
            message: "maintenance".into(),
        });
        assert_eq!(classify(&err), ErrorCategory::Transient);
    }

    #[test]
    fn test_invalid_response_is_transient() {
        let err = EngineError::Exchange(ExchangeError::InvalidResponse("no orderId".into()));
        assert_eq!(classify(&err), ErrorCategory::Transient);
    }

    #[test]
    fn test_unclassifiable_is_unknown() {
        let err = EngineError::Other(anyhow::anyhow!("something odd"));
        assert_eq!(classify(&err), ErrorCategory::Unknown);
    }
}
