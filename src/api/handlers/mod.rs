//! API handlers and shared utilities.
//!
//! Route handlers parse inputs and map the high-level flow; the storage
//! functions next to them own the SQL. Shared pieces here: the caller
//! principal, the storage error type, and pagination.

pub mod bookmarks;
pub mod exams;
pub mod files;
pub mod health;
pub mod plans;
pub mod questions;
pub mod root;
pub mod subjects;
#[cfg(test)]
pub mod testutil;
pub mod usage;
pub mod users;
pub mod webhooks;

use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use regex::Regex;
use serde::Deserialize;
use tracing::error;
use utoipa::IntoParams;

/// Header carrying the authenticated subject, injected by the edge after it
/// validates the identity provider token. Requests without it are anonymous.
pub const USER_ID_HEADER: &str = "x-user-id";

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Extracts the authenticated external user id, or `401` when absent.
pub fn require_user(headers: &HeaderMap) -> Result<String, StatusCode> {
    match optional_user(headers) {
        Some(user_id) => Ok(user_id),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

/// The external user id when the edge forwarded one.
#[must_use]
pub fn optional_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Lightweight email sanity check used before persisting webhook payloads.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Failures surfaced by the storage layer, mapped to stable HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Forbidden(String),
    NotFound(&'static str),
    Conflict(&'static str),
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Record not found."),
            other => Self::Database(other),
        }
    }
}

impl IntoResponse for ApiError {
    /// Database errors are logged server-side and surfaced as `500` without
    /// leaking details.
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message).into_response(),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Limit/offset pagination for list endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct Pagination {
    /// Page size, capped at 200 (default 50).
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

impl Pagination {
    /// Clamped `(limit, offset)` safe to interpolate into a query.
    #[must_use]
    pub fn clamp(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn require_user_reads_header() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user_123"));
        assert_eq!(require_user(&headers).as_deref(), Ok("user_123"));
    }

    #[test]
    fn require_user_rejects_missing_or_blank() {
        let headers = HeaderMap::new();
        assert_eq!(require_user(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(require_user(&headers), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn valid_email_accepts_plain_addresses() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("first.last+tag@sub.example.org"));
    }

    #[test]
    fn valid_email_rejects_junk() {
        assert!(!valid_email(""));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("spaces in@example.com"));
        assert!(!valid_email("user@nodot"));
    }

    #[test]
    fn pagination_defaults_and_caps() {
        let (limit, offset) = Pagination::default().clamp();
        assert_eq!((limit, offset), (50, 0));

        let page = Pagination {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(page.clamp(), (200, 0));

        let page = Pagination {
            limit: Some(0),
            offset: Some(25),
        };
        assert_eq!(page.clamp(), (1, 25));
    }
}
