//! File metadata attached to exams and subjects.
//!
//! Blobs live in an external object store; only their metadata is recorded
//! here. Creating a record is where the lifetime storage cap bites: the
//! caller's used megabytes are compared against the plan's GB limit before
//! anything is written, and a successful insert bumps the exam/subject
//! totals, the lifetime counters, and the day's upload counter in one
//! transaction.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    exams::visible_exam,
    plans::plan_for_tier,
    require_user,
    subjects::find_subject,
    usage::storage_used_mb,
    users::find_user,
    ApiError,
};
use crate::{
    access::{storage_decision, within_limit},
    clock::DayClock,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One row of the `files` table.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub file_url: String,
    pub storage_id: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub uploaded_by: String,
    pub is_new: bool,
    pub is_premium: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub exam_id: String,
    pub subject_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub file_url: String,
    pub storage_id: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub uploaded_by: String,
    pub is_new: bool,
    pub is_premium: bool,
    pub uploaded_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id.to_string(),
            exam_id: record.exam_id.to_string(),
            subject_id: record.subject_id.map(|id| id.to_string()),
            name: record.name,
            description: record.description,
            file_url: record.file_url,
            storage_id: record.storage_id,
            file_type: record.file_type,
            file_size_bytes: record.file_size_bytes,
            uploaded_by: record.uploaded_by,
            is_new: record.is_new,
            is_premium: record.is_premium,
            uploaded_at: record.uploaded_at.to_rfc3339(),
        }
    }
}

const FILE_COLUMNS: &str = "id, exam_id, subject_id, name, description, file_url, storage_id, \
     file_type, file_size_bytes, uploaded_by, is_new, is_premium, uploaded_at";

fn record_from_row(row: &PgRow) -> Result<FileRecord, sqlx::Error> {
    Ok(FileRecord {
        id: row.try_get("id")?,
        exam_id: row.try_get("exam_id")?,
        subject_id: row.try_get("subject_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        file_url: row.try_get("file_url")?,
        storage_id: row.try_get("storage_id")?,
        file_type: row.try_get("file_type")?,
        file_size_bytes: row.try_get("file_size_bytes")?,
        uploaded_by: row.try_get("uploaded_by")?,
        is_new: row.try_get("is_new")?,
        is_premium: row.try_get("is_premium")?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListFilesQuery {
    /// Exam slug. Required.
    pub exam: String,
    /// Restrict to one subject by its slug.
    pub subject: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "File records for the exam, newest first.", body = [FileResponse]),
        (status = 403, description = "Premium exam beyond the caller's tier.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "files"
)]
pub async fn list_files(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<ListFilesQuery>,
) -> impl IntoResponse {
    let caller = super::optional_user(&headers);
    match list(&pool, caller.as_deref(), &query).await {
        Ok(files) => (StatusCode::OK, Json(files)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list(
    pool: &PgPool,
    caller: Option<&str>,
    query: &ListFilesQuery,
) -> Result<Vec<FileResponse>, ApiError> {
    let exam = visible_exam(pool, &query.exam, caller).await?;
    let subject_id = match &query.subject {
        Some(subject_slug) => Some(
            find_subject(pool, exam.id, subject_slug)
                .await?
                .ok_or(ApiError::NotFound("Subject not found."))?
                .id,
        ),
        None => None,
    };

    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM files \
         WHERE exam_id = $1 AND ($2::UUID IS NULL OR subject_id = $2) \
         ORDER BY uploaded_at DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(exam.id)
        .bind(subject_id)
        .fetch_all(pool)
        .await?;

    let mut files = Vec::with_capacity(rows.len());
    for row in &rows {
        files.push(FileResponse::from(record_from_row(row)?));
    }
    Ok(files)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFileRequest {
    /// Exam slug.
    pub exam: String,
    /// Subject slug within the exam.
    pub subject: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub file_url: String,
    pub storage_id: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    #[serde(default)]
    pub is_premium: bool,
}

#[utoipa::path(
    post,
    path = "/v1/files",
    request_body = CreateFileRequest,
    responses(
        (status = 201, description = "File record created, counters bumped.", body = FileResponse),
        (status = 400, description = "Blank fields or a non-positive size.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Storage cap or per-exam file limit reached.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "files"
)]
pub async fn create_file(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    clock: Extension<DayClock>,
    Json(request): Json<CreateFileRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match create(&pool, &clock, &user_id, request).await {
        Ok(record) => (StatusCode::CREATED, Json(FileResponse::from(record))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create(
    pool: &PgPool,
    clock: &DayClock,
    user_id: &str,
    request: CreateFileRequest,
) -> Result<FileRecord, ApiError> {
    if request.name.trim().is_empty()
        || request.file_url.trim().is_empty()
        || request.storage_id.trim().is_empty()
    {
        return Err(ApiError::BadRequest(
            "name, file_url, and storage_id must not be blank.",
        ));
    }
    if request.file_size_bytes <= 0 {
        return Err(ApiError::BadRequest("file_size_bytes must be positive."));
    }

    let exam = visible_exam(pool, &request.exam, Some(user_id)).await?;
    let subject = match &request.subject {
        Some(subject_slug) => Some(
            find_subject(pool, exam.id, subject_slug)
                .await?
                .ok_or(ApiError::NotFound("Subject not found."))?,
        ),
        None => None,
    };

    let user = find_user(pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))?;
    let plan = plan_for_tier(pool, &user.subscription_tier)
        .await?
        .ok_or(ApiError::NotFound("No active plan for tier."))?;

    let used_mb = storage_used_mb(pool, user_id).await?;
    let decision = storage_decision(used_mb, plan.file_storage_gb);
    if !decision.allowed {
        return Err(ApiError::Forbidden(format!(
            "Storage cap reached: {:.2} of {} GB used.",
            decision.current, decision.limit
        )));
    }

    let existing: i64 = sqlx::query("SELECT count(*) AS n FROM files WHERE exam_id = $1")
        .bind(exam.id)
        .fetch_one(pool)
        .await?
        .try_get("n")?;
    if !within_limit(plan.max_files_per_exam, existing) {
        return Err(ApiError::Forbidden(format!(
            "Your plan allows {} files per exam.",
            plan.max_files_per_exam
        )));
    }

    #[allow(clippy::cast_precision_loss)]
    let size_mb = request.file_size_bytes as f64 / BYTES_PER_MB;

    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    let query = format!(
        "INSERT INTO files (exam_id, subject_id, name, description, file_url, storage_id, \
             file_type, file_size_bytes, uploaded_by, is_premium) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {FILE_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(exam.id)
        .bind(subject.as_ref().map(|subject| subject.id))
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(&request.file_url)
        .bind(&request.storage_id)
        .bind(&request.file_type)
        .bind(request.file_size_bytes)
        .bind(user_id)
        .bind(request.is_premium)
        .fetch_one(&mut *tx)
        .await
        .map_err(ApiError::Database)?;
    let record = record_from_row(&row)?;

    sqlx::query(
        "UPDATE exams SET total_files = total_files + 1, updated_at = now() WHERE id = $1",
    )
    .bind(exam.id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    if let Some(subject) = &subject {
        sqlx::query("UPDATE subjects SET total_files = total_files + 1 WHERE id = $1")
            .bind(subject.id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::Database)?;
    }

    sqlx::query(
        r"
        UPDATE total_usage
        SET file_storage_used_mb = file_storage_used_mb + $2,
            total_files_uploaded = total_files_uploaded + 1,
            updated_at = now()
        WHERE user_external_id = $1
        ",
    )
    .bind(user_id)
    .bind(size_mb)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    sqlx::query(
        r"
        INSERT INTO daily_usage (user_external_id, day, files_uploaded)
        VALUES ($1, $2, 1)
        ON CONFLICT (user_external_id, day)
        DO UPDATE SET files_uploaded = daily_usage.files_uploaded + 1, updated_at = now()
        ",
    )
    .bind(user_id)
    .bind(clock.today())
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(record)
}

fn parse_file_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest("Invalid file id."))
}

#[utoipa::path(
    post,
    path = "/v1/files/{id}/viewed",
    params(("id" = String, Path, description = "File id.")),
    responses(
        (status = 200, description = "The file with its new-upload flag cleared.", body = FileResponse),
        (status = 400, description = "Malformed file id.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 404, description = "File not found.", body = String),
    ),
    tag = "files"
)]
pub async fn mark_viewed(
    headers: HeaderMap,
    Path(id): Path<String>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    if let Err(status) = require_user(&headers) {
        return status.into_response();
    }

    match view(&pool, &id).await {
        Ok(record) => (StatusCode::OK, Json(FileResponse::from(record))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn view(pool: &PgPool, id: &str) -> Result<FileRecord, ApiError> {
    let id = parse_file_id(id)?;
    let query = format!("UPDATE files SET is_new = FALSE WHERE id = $1 RETURNING {FILE_COLUMNS}");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("File not found."))?;
    Ok(record_from_row(&row)?)
}

#[utoipa::path(
    delete,
    path = "/v1/files/{id}",
    params(("id" = String, Path, description = "File id.")),
    responses(
        (status = 204, description = "File record removed, totals decremented."),
        (status = 400, description = "Malformed file id.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Only the uploader or the exam creator may delete a file.", body = String),
        (status = 404, description = "File not found.", body = String),
    ),
    tag = "files"
)]
pub async fn delete_file(
    headers: HeaderMap,
    Path(id): Path<String>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match remove(&pool, &user_id, &id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

/// Deletes one file record and walks the denormalized counters back down,
/// floored at zero. The lifetime storage counters are left alone: storage
/// already consumed stays counted against the cap.
async fn remove(pool: &PgPool, user_id: &str, id: &str) -> Result<(), ApiError> {
    let id = parse_file_id(id)?;
    let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    let file = row
        .as_ref()
        .map(record_from_row)
        .transpose()?
        .ok_or(ApiError::NotFound("File not found."))?;

    let creator: String = sqlx::query("SELECT created_by FROM exams WHERE id = $1")
        .bind(file.exam_id)
        .fetch_one(pool)
        .await?
        .try_get("created_by")?;
    if file.uploaded_by != user_id && creator != user_id {
        return Err(ApiError::Forbidden(
            "Only the uploader or the exam creator may delete a file.".to_string(),
        ));
    }

    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    sqlx::query("DELETE FROM files WHERE id = $1")
        .bind(file.id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::Database)?;

    sqlx::query(
        "UPDATE exams SET total_files = GREATEST(total_files - 1, 0), updated_at = now() \
         WHERE id = $1",
    )
    .bind(file.exam_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    if let Some(subject_id) = file.subject_id {
        sqlx::query("UPDATE subjects SET total_files = GREATEST(total_files - 1, 0) WHERE id = $1")
            .bind(subject_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::Database)?;
    }

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testutil;
    use anyhow::Result;

    #[test]
    fn size_converts_to_megabytes() {
        assert_eq!(5_242_880.0 / BYTES_PER_MB, 5.0);
        assert_eq!(524_288.0 / BYTES_PER_MB, 0.5);
    }

    #[test]
    fn file_id_must_be_a_uuid() {
        assert!(parse_file_id("not-a-uuid").is_err());
        assert!(parse_file_id("8c25df26-0b1a-4f56-9d2c-7f3fd1a40b11").is_ok());
    }

    #[tokio::test]
    async fn upload_view_delete_round_trip() -> Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        testutil::seed_user(&pool, "user_1", "free").await?;
        testutil::seed_exam(&pool, "user_1", "SMLE Prep", "smle").await?;
        let clock = DayClock::from_offset_minutes(0)?;

        let record = create(
            &pool,
            &clock,
            "user_1",
            CreateFileRequest {
                exam: "smle".into(),
                subject: None,
                name: "Anatomy notes".into(),
                description: None,
                file_url: "https://cdn.example.com/anatomy.pdf".into(),
                storage_id: "st_1".into(),
                file_type: "pdf".into(),
                file_size_bytes: 1_048_576,
                is_premium: false,
            },
        )
        .await
        .expect("file should be created");
        assert!(record.is_new);

        let viewed = view(&pool, &record.id.to_string())
            .await
            .expect("file should be marked viewed");
        assert!(!viewed.is_new);

        remove(&pool, "user_1", &record.id.to_string())
            .await
            .expect("file should be deleted");

        let total: i64 = sqlx::query("SELECT total_files FROM exams WHERE slug = 'smle'")
            .fetch_one(&pool)
            .await?
            .try_get("total_files")?;
        assert_eq!(total, 0);

        let err = remove(&pool, "user_1", &record.id.to_string())
            .await
            .expect_err("second delete should report not found");
        assert!(matches!(err, ApiError::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn only_uploader_or_creator_may_delete() -> Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        testutil::seed_user(&pool, "user_1", "free").await?;
        testutil::seed_user(&pool, "user_2", "free").await?;
        testutil::seed_exam(&pool, "user_1", "SMLE Prep", "smle").await?;
        let clock = DayClock::from_offset_minutes(0)?;

        let record = create(
            &pool,
            &clock,
            "user_1",
            CreateFileRequest {
                exam: "smle".into(),
                subject: None,
                name: "Anatomy notes".into(),
                description: None,
                file_url: "https://cdn.example.com/anatomy.pdf".into(),
                storage_id: "st_1".into(),
                file_type: "pdf".into(),
                file_size_bytes: 1_048_576,
                is_premium: false,
            },
        )
        .await
        .expect("file should be created");

        let err = remove(&pool, "user_2", &record.id.to_string())
            .await
            .expect_err("stranger delete should be rejected");
        assert!(matches!(err, ApiError::Forbidden(_)));
        Ok(())
    }
}
