//! Per-user bookmarks over exam resources.
//!
//! A bookmark points at a resource by `(resource_type, resource_id)` with the
//! exam (and optionally subject) kept as context for filtering. Toggling is
//! the only write: it adds when absent and removes when present, reporting
//! which way it went.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{exams::visible_exam, require_user, subjects::find_subject, ApiError};

/// One row of the `bookmarks` table.
#[derive(Debug, Clone)]
pub struct BookmarkRecord {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub resource_type: String,
    pub resource_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookmarkResponse {
    pub id: String,
    pub exam_id: String,
    pub subject_id: Option<String>,
    pub resource_type: String,
    pub resource_id: String,
    pub created_at: String,
}

impl From<BookmarkRecord> for BookmarkResponse {
    fn from(record: BookmarkRecord) -> Self {
        Self {
            id: record.id.to_string(),
            exam_id: record.exam_id.to_string(),
            subject_id: record.subject_id.map(|id| id.to_string()),
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

fn record_from_row(row: &PgRow) -> Result<BookmarkRecord, sqlx::Error> {
    Ok(BookmarkRecord {
        id: row.try_get("id")?,
        exam_id: row.try_get("exam_id")?,
        subject_id: row.try_get("subject_id")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListBookmarksQuery {
    /// Restrict to one exam by its slug.
    pub exam: Option<String>,
    /// Restrict to one resource type.
    pub resource_type: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/bookmarks",
    params(ListBookmarksQuery),
    responses(
        (status = 200, description = "The caller's bookmarks, newest first.", body = [BookmarkResponse]),
        (status = 401, description = "Missing x-user-id header."),
        (status = 404, description = "Filter exam not found.", body = String),
    ),
    tag = "bookmarks"
)]
pub async fn list_bookmarks(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<ListBookmarksQuery>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match list(&pool, &user_id, &query).await {
        Ok(bookmarks) => (StatusCode::OK, Json(bookmarks)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list(
    pool: &PgPool,
    user_id: &str,
    query: &ListBookmarksQuery,
) -> Result<Vec<BookmarkResponse>, ApiError> {
    let exam_id = match &query.exam {
        Some(slug) => Some(visible_exam(pool, slug, Some(user_id)).await?.id),
        None => None,
    };

    let rows = sqlx::query(
        r"
        SELECT id, exam_id, subject_id, resource_type, resource_id, created_at
        FROM bookmarks
        WHERE user_external_id = $1
          AND ($2::UUID IS NULL OR exam_id = $2)
          AND ($3::TEXT IS NULL OR resource_type = $3)
        ORDER BY created_at DESC
        ",
    )
    .bind(user_id)
    .bind(exam_id)
    .bind(&query.resource_type)
    .fetch_all(pool)
    .await?;

    let mut bookmarks = Vec::with_capacity(rows.len());
    for row in &rows {
        bookmarks.push(BookmarkResponse::from(record_from_row(row)?));
    }
    Ok(bookmarks)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleBookmarkRequest {
    /// Exam slug providing the context.
    pub exam: String,
    /// Subject slug within the exam, if the resource belongs to one.
    pub subject: Option<String>,
    pub resource_type: String,
    pub resource_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToggleBookmarkResponse {
    /// `added` or `removed`.
    pub action: &'static str,
}

#[utoipa::path(
    post,
    path = "/v1/bookmarks/toggle",
    request_body = ToggleBookmarkRequest,
    responses(
        (status = 200, description = "Which way the toggle went.", body = ToggleBookmarkResponse),
        (status = 400, description = "Blank resource fields.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "bookmarks"
)]
pub async fn toggle_bookmark(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<ToggleBookmarkRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match toggle(&pool, &user_id, request).await {
        Ok(action) => (StatusCode::OK, Json(ToggleBookmarkResponse { action })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn toggle(
    pool: &PgPool,
    user_id: &str,
    request: ToggleBookmarkRequest,
) -> Result<&'static str, ApiError> {
    if request.resource_type.trim().is_empty() || request.resource_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "resource_type and resource_id must not be blank.",
        ));
    }

    let exam = visible_exam(pool, &request.exam, Some(user_id)).await?;
    let subject_id = match &request.subject {
        Some(subject_slug) => Some(
            find_subject(pool, exam.id, subject_slug)
                .await?
                .ok_or(ApiError::NotFound("Subject not found."))?
                .id,
        ),
        None => None,
    };

    // Remove first; when nothing was there, insert. The UNIQUE constraint on
    // (user, resource_type, resource_id) keeps concurrent toggles sane.
    let removed = sqlx::query(
        r"
        DELETE FROM bookmarks
        WHERE user_external_id = $1 AND resource_type = $2 AND resource_id = $3
        ",
    )
    .bind(user_id)
    .bind(&request.resource_type)
    .bind(&request.resource_id)
    .execute(pool)
    .await?;

    if removed.rows_affected() > 0 {
        return Ok("removed");
    }

    sqlx::query(
        r"
        INSERT INTO bookmarks (user_external_id, exam_id, subject_id, resource_type, resource_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_external_id, resource_type, resource_id) DO NOTHING
        ",
    )
    .bind(user_id)
    .bind(exam.id)
    .bind(subject_id)
    .bind(&request.resource_type)
    .bind(&request.resource_id)
    .execute(pool)
    .await?;

    Ok("added")
}
