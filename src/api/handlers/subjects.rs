//! Subjects inside an exam.
//!
//! Subject slugs are unique per exam, not globally, so the collision probe is
//! scoped to the parent. Creating and deleting keeps the exam's denormalized
//! `total_subjects` counter in step, floored at zero on the way down.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    exams::{find_exam_by_slug, matches_base, visible_exam, ExamRecord},
    optional_user, require_user,
    users::find_user,
    ApiError,
};
use crate::{access::within_limit, slug};

/// One row of the `subjects` table.
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub display_order: i64,
    pub total_questions: i64,
    pub total_files: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubjectResponse {
    pub id: String,
    pub exam_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub display_order: i64,
    pub total_questions: i64,
    pub total_files: i64,
    pub created_at: String,
}

impl From<SubjectRecord> for SubjectResponse {
    fn from(record: SubjectRecord) -> Self {
        Self {
            id: record.id.to_string(),
            exam_id: record.exam_id.to_string(),
            name: record.name,
            slug: record.slug,
            description: record.description,
            icon: record.icon,
            color: record.color,
            display_order: record.display_order,
            total_questions: record.total_questions,
            total_files: record.total_files,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

const SUBJECT_COLUMNS: &str = "id, exam_id, name, slug, description, icon, color, display_order, \
     total_questions, total_files, created_at";

fn record_from_row(row: &PgRow) -> Result<SubjectRecord, sqlx::Error> {
    Ok(SubjectRecord {
        id: row.try_get("id")?,
        exam_id: row.try_get("exam_id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        color: row.try_get("color")?,
        display_order: row.try_get("display_order")?,
        total_questions: row.try_get("total_questions")?,
        total_files: row.try_get("total_files")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Looks up a subject by slug within one exam.
pub async fn find_subject(
    pool: &PgPool,
    exam_id: Uuid,
    slug: &str,
) -> Result<Option<SubjectRecord>, sqlx::Error> {
    let query = format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE exam_id = $1 AND slug = $2");
    let row = sqlx::query(&query)
        .bind(exam_id)
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

/// First free slug for `base` within one exam.
async fn assign_slug(pool: &PgPool, exam_id: Uuid, base: &str) -> Result<String, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT slug FROM subjects WHERE exam_id = $1 AND (slug = $2 OR slug LIKE $3)",
    )
    .bind(exam_id)
    .bind(base)
    .bind(format!("{base}-%"))
    .fetch_all(pool)
    .await?;

    let mut taken = Vec::with_capacity(rows.len());
    for row in &rows {
        taken.push(row.try_get::<String, _>("slug")?);
    }
    Ok(slug::first_free(base, |candidate| {
        taken.iter().any(|slug| slug == candidate)
    }))
}

fn slug_conflict(err: sqlx::Error) -> ApiError {
    if err
        .as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
    {
        return ApiError::Conflict("Slug was taken concurrently, retry the request.");
    }
    ApiError::from(err)
}

/// Resolves the exam and requires the caller to be its creator.
async fn owned_exam(pool: &PgPool, slug: &str, user_id: &str) -> Result<ExamRecord, ApiError> {
    let exam = find_exam_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("Exam not found."))?;
    if exam.created_by != user_id {
        return Err(ApiError::Forbidden(
            "Only the creator may modify an exam's subjects.".to_string(),
        ));
    }
    Ok(exam)
}

#[utoipa::path(
    get,
    path = "/v1/exams/{slug}/subjects",
    params(("slug" = String, Path, description = "Exam slug.")),
    responses(
        (status = 200, description = "Subjects in display order.", body = [SubjectResponse]),
        (status = 403, description = "Premium exam beyond the caller's tier.", body = String),
        (status = 404, description = "Exam not found.", body = String),
    ),
    tag = "subjects"
)]
pub async fn list_subjects(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let caller = optional_user(&headers);
    match list(&pool, &slug, caller.as_deref()).await {
        Ok(subjects) => (StatusCode::OK, Json(subjects)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list(
    pool: &PgPool,
    exam_slug: &str,
    caller: Option<&str>,
) -> Result<Vec<SubjectResponse>, ApiError> {
    let exam = visible_exam(pool, exam_slug, caller).await?;

    let query = format!(
        "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE exam_id = $1 \
         ORDER BY display_order, created_at"
    );
    let rows = sqlx::query(&query).bind(exam.id).fetch_all(pool).await?;

    let mut subjects = Vec::with_capacity(rows.len());
    for row in &rows {
        subjects.push(SubjectResponse::from(record_from_row(row)?));
    }
    Ok(subjects)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/exams/{slug}/subjects",
    params(("slug" = String, Path, description = "Exam slug.")),
    request_body = CreateSubjectRequest,
    responses(
        (status = 201, description = "Subject created at the end of the display order.", body = SubjectResponse),
        (status = 400, description = "Blank name or one that normalizes to nothing.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Not the creator, or the plan's subject limit is reached.", body = String),
        (status = 404, description = "Exam not found.", body = String),
        (status = 409, description = "Lost a concurrent race for the same slug.", body = String),
    ),
    tag = "subjects"
)]
pub async fn create_subject(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
    Json(request): Json<CreateSubjectRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match create(&pool, &user_id, &slug, request).await {
        Ok(subject) => (StatusCode::CREATED, Json(SubjectResponse::from(subject))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create(
    pool: &PgPool,
    user_id: &str,
    exam_slug: &str,
    request: CreateSubjectRequest,
) -> Result<SubjectRecord, ApiError> {
    let exam = owned_exam(pool, exam_slug, user_id).await?;

    let user = find_user(pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))?;
    let plan = super::plans::plan_for_tier(pool, &user.subscription_tier)
        .await?
        .ok_or(ApiError::NotFound("No active plan for tier."))?;

    let existing: i64 = sqlx::query("SELECT count(*) AS n FROM subjects WHERE exam_id = $1")
        .bind(exam.id)
        .fetch_one(pool)
        .await?
        .try_get("n")?;
    if !within_limit(plan.max_subjects_per_exam, existing) {
        return Err(ApiError::Forbidden(format!(
            "Your plan allows {} subjects per exam.",
            plan.max_subjects_per_exam
        )));
    }

    let base = slug::normalize(&request.name);
    if base.is_empty() {
        return Err(ApiError::BadRequest(
            "Name must contain at least one letter or digit.",
        ));
    }
    let assigned = assign_slug(pool, exam.id, &base).await?;

    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    // New subjects land at the end of the display order.
    let query = format!(
        "INSERT INTO subjects (exam_id, name, slug, description, icon, color, display_order) \
         SELECT $1, $2, $3, $4, $5, $6, COALESCE(MAX(display_order), 0) + 1 \
         FROM subjects WHERE exam_id = $1 \
         RETURNING {SUBJECT_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(exam.id)
        .bind(request.name.trim())
        .bind(&assigned)
        .bind(&request.description)
        .bind(&request.icon)
        .bind(&request.color)
        .fetch_one(&mut *tx)
        .await
        .map_err(slug_conflict)?;
    let subject = record_from_row(&row)?;

    sqlx::query(
        "UPDATE exams SET total_subjects = total_subjects + 1, updated_at = now() WHERE id = $1",
    )
    .bind(exam.id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(subject)
}

#[utoipa::path(
    get,
    path = "/v1/exams/{slug}/subjects/{subject}",
    params(
        ("slug" = String, Path, description = "Exam slug."),
        ("subject" = String, Path, description = "Subject slug."),
    ),
    responses(
        (status = 200, description = "The subject.", body = SubjectResponse),
        (status = 403, description = "Premium exam beyond the caller's tier.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "subjects"
)]
pub async fn get_subject(
    headers: HeaderMap,
    Path((slug, subject)): Path<(String, String)>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let caller = optional_user(&headers);
    let result = async {
        let exam = visible_exam(&pool, &slug, caller.as_deref()).await?;
        find_subject(&pool, exam.id, &subject)
            .await?
            .ok_or(ApiError::NotFound("Subject not found."))
    }
    .await;

    match result {
        Ok(record) => (StatusCode::OK, Json(SubjectResponse::from(record))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSubjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub display_order: Option<i64>,
}

#[utoipa::path(
    patch,
    path = "/v1/exams/{slug}/subjects/{subject}",
    params(
        ("slug" = String, Path, description = "Exam slug."),
        ("subject" = String, Path, description = "Subject slug."),
    ),
    request_body = UpdateSubjectRequest,
    responses(
        (status = 200, description = "The updated subject, possibly re-slugged.", body = SubjectResponse),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Only the creator may modify subjects.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
        (status = 409, description = "Lost a concurrent race for the new slug.", body = String),
    ),
    tag = "subjects"
)]
pub async fn update_subject(
    headers: HeaderMap,
    Path((slug, subject)): Path<(String, String)>,
    pool: Extension<PgPool>,
    Json(request): Json<UpdateSubjectRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match update(&pool, &user_id, &slug, &subject, request).await {
        Ok(record) => (StatusCode::OK, Json(SubjectResponse::from(record))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update(
    pool: &PgPool,
    user_id: &str,
    exam_slug: &str,
    subject_slug: &str,
    request: UpdateSubjectRequest,
) -> Result<SubjectRecord, ApiError> {
    let exam = owned_exam(pool, exam_slug, user_id).await?;
    let subject = find_subject(pool, exam.id, subject_slug)
        .await?
        .ok_or(ApiError::NotFound("Subject not found."))?;

    let name = match request.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::BadRequest("Name must not be blank."));
        }
        Some(name) => name.trim().to_string(),
        None => subject.name.clone(),
    };

    let base = slug::normalize(&name);
    if base.is_empty() {
        return Err(ApiError::BadRequest(
            "Name must contain at least one letter or digit.",
        ));
    }
    let new_slug = if matches_base(&subject.slug, &base) {
        subject.slug.clone()
    } else {
        assign_slug(pool, exam.id, &base).await?
    };

    let query = format!(
        "UPDATE subjects \
         SET name = $2, slug = $3, description = $4, icon = $5, color = $6, display_order = $7 \
         WHERE id = $1 \
         RETURNING {SUBJECT_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(subject.id)
        .bind(&name)
        .bind(&new_slug)
        .bind(request.description.or(subject.description))
        .bind(request.icon.or(subject.icon))
        .bind(request.color.or(subject.color))
        .bind(request.display_order.unwrap_or(subject.display_order))
        .fetch_one(pool)
        .await
        .map_err(slug_conflict)?;
    Ok(record_from_row(&row)?)
}

#[utoipa::path(
    delete,
    path = "/v1/exams/{slug}/subjects/{subject}",
    params(
        ("slug" = String, Path, description = "Exam slug."),
        ("subject" = String, Path, description = "Subject slug."),
    ),
    responses(
        (status = 204, description = "Subject removed, exam totals decremented."),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Only the creator may modify subjects.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "subjects"
)]
pub async fn delete_subject(
    headers: HeaderMap,
    Path((slug, subject)): Path<(String, String)>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match delete(&pool, &user_id, &slug, &subject).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete(
    pool: &PgPool,
    user_id: &str,
    exam_slug: &str,
    subject_slug: &str,
) -> Result<(), ApiError> {
    let exam = owned_exam(pool, exam_slug, user_id).await?;
    let subject = find_subject(pool, exam.id, subject_slug)
        .await?
        .ok_or(ApiError::NotFound("Subject not found."))?;

    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    sqlx::query("DELETE FROM subjects WHERE id = $1")
        .bind(subject.id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::Database)?;

    // Counter floors at zero in case it ever drifted below the real count.
    sqlx::query(
        "UPDATE exams SET total_subjects = GREATEST(total_subjects - 1, 0), updated_at = now() \
         WHERE id = $1",
    )
    .bind(exam.id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(())
}
