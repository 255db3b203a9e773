// =============================================================================
// API errors: mapping failures onto HTTP responses
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::rate_limit::{QuotaSnapshot, RateLimitRejection};

/// Body of every listing failure; upstream details are logged, never sent.
pub const LISTING_FAILURE: &str = "Failed to fetch cryptocurrency data";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    RateLimited(RateLimitRejection),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// `X-RateLimit-*` headers for a quota snapshot.
pub fn quota_headers(quota: &QuotaSnapshot) -> [(&'static str, String); 3] {
    [
        ("X-RateLimit-Limit", quota.limit.to_string()),
        ("X-RateLimit-Remaining", quota.remaining.to_string()),
        ("X-RateLimit-Reset", quota.reset_epoch_secs.to_string()),
    ]
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::RateLimited(rejection) => {
                let mut body = json!({
                    "error": "Rate limit exceeded",
                    "message": rejection.message(),
                });
                if rejection.retry_budget > 0 {
                    body["retryAfter"] = json!(rejection.retry_after_secs);
                    body["retryCount"] = json!(rejection.retry_count);
                }
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    quota_headers(&rejection.quota),
                    Json(body),
                )
                    .into_response()
            }
            Self::Upstream(detail) => {
                error!(detail = %detail, "upstream failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": LISTING_FAILURE })),
                )
                    .into_response()
            }
            Self::Internal(e) => {
                error!(error = %format!("{e:#}"), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(retry_budget: u32, exhausted: bool) -> RateLimitRejection {
        RateLimitRejection {
            quota: QuotaSnapshot {
                limit: 3,
                remaining: 0,
                reset_epoch_secs: 60,
            },
            retry_after_secs: 42,
            retry_count: retry_budget,
            retry_budget,
            exhausted,
        }
    }

    #[test]
    fn rate_limited_carries_headers() {
        let resp = ApiError::RateLimited(rejection(0, true)).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = resp.headers();
        assert_eq!(headers["X-RateLimit-Limit"], "3");
        assert_eq!(headers["X-RateLimit-Remaining"], "0");
        assert_eq!(headers["X-RateLimit-Reset"], "60");
    }

    #[test]
    fn exhausted_message_mentions_maximum_retries() {
        assert!(rejection(3, true).message().starts_with("Maximum retries reached"));
        assert!(rejection(0, true).message().starts_with("Please wait 42 seconds"));
        assert!(rejection(3, false).message().starts_with("Please wait 42 seconds"));
    }

    #[test]
    fn statuses() {
        assert_eq!(
            ApiError::Validation("Invalid symbol format".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Upstream("503".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
