use rocket::http::{Header, Status};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, Response};
use thiserror::Error;

use crate::rate_limit::Tier;
use crate::types::ErrorResponse;

/// Typed failures of the GitHub Data Fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GitHub user not found. Please check the username and ensure the profile is public.")]
    NotFound,
    #[error("GitHub API rate limit exceeded. Please wait and try again.")]
    UpstreamRateLimited { reset_at_ms: Option<i64> },
    #[error("GitHub API error: {status}")]
    Upstream { status: u16 },
    #[error("Invalid GitHub user profile")]
    InvalidProfile,
    #[error("User has no public repositories or activity. Please ensure the profile is public and has content.")]
    NoActivity,
    #[error("Invalid repository data from GitHub")]
    Malformed,
    #[error("GitHub request failed: {0}")]
    Transport(String),
}

/// Everything the analyze use case can surface to a caller. Duplicate-key
/// recovery is handled internally and never appears here.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Invalid authentication token")]
    AuthInvalid,
    #[error("Rate limit exceeded for {tier} tier. Please try again later.")]
    RateLimited { reset_in_ms: i64, tier: Tier },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Database error occurred")]
    Storage(#[source] anyhow::Error),
}

impl AnalyzeError {
    fn status(&self) -> Status {
        match self {
            Self::AuthInvalid => Status::Unauthorized,
            Self::RateLimited { .. } => Status::TooManyRequests,
            Self::Validation(_) => Status::BadRequest,
            // Not-found and upstream conditions fold into a 500 with a
            // distinguishing message, matching the public API contract.
            Self::Fetch(_) | Self::Storage(_) => Status::InternalServerError,
        }
    }

    fn body(&self) -> ErrorResponse {
        let mut body = ErrorResponse::new(self.to_string());
        match self {
            Self::RateLimited { reset_in_ms, tier } => {
                body.retry_after = Some(ceil_seconds(*reset_in_ms));
                body.tier = Some(tier.to_string());
            }
            Self::Fetch(FetchError::UpstreamRateLimited { reset_at_ms }) => {
                body.reset_at = *reset_at_ms;
            }
            _ => {}
        }
        body
    }
}

fn ceil_seconds(ms: i64) -> i64 {
    (ms.max(0) + 999) / 1000
}

impl<'r> Responder<'r, 'static> for AnalyzeError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let mut response = Response::build_from(Json(self.body()).respond_to(req)?);
        response.status(status);

        if let Self::RateLimited { reset_in_ms, tier } = &self {
            let reset_seconds = ceil_seconds(*reset_in_ms).to_string();
            response.header(Header::new("Retry-After", reset_seconds.clone()));
            response.header(Header::new("X-RateLimit-Remaining", "0"));
            response.header(Header::new("X-RateLimit-Reset", reset_seconds));
            response.header(Header::new("X-RateLimit-Tier", tier.to_string()));
        }

        response.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_body_carries_retry_delay_and_tier() {
        let error = AnalyzeError::RateLimited {
            reset_in_ms: 90_500,
            tier: Tier::Anonymous,
        };
        assert_eq!(error.status(), Status::TooManyRequests);

        let body = error.body();
        assert_eq!(body.retry_after, Some(91));
        assert_eq!(body.tier.as_deref(), Some("ANONYMOUS"));
    }

    #[test]
    fn upstream_rate_limit_preserves_reset_timestamp() {
        let error = AnalyzeError::Fetch(FetchError::UpstreamRateLimited {
            reset_at_ms: Some(1_750_000_000_000),
        });
        assert_eq!(error.status(), Status::InternalServerError);
        assert_eq!(error.body().reset_at, Some(1_750_000_000_000));
    }

    #[test]
    fn not_found_is_distinguishable_from_generic_failures() {
        let not_found = AnalyzeError::Fetch(FetchError::NotFound);
        let storage = AnalyzeError::Storage(anyhow::anyhow!("pool timed out"));
        assert_ne!(not_found.to_string(), storage.to_string());
        assert!(not_found.to_string().contains("not found"));
    }
}
