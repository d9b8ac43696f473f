//! Question bank per exam.

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
    optional_user, require_user,
    subjects::find_subject,
    ApiError, Pagination,
};

const DIFFICULTIES: [&str; 3] = ["easy", "medium", "hard"];

/// One row of the `questions` table.
#[derive(Debug, Clone)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub question_text: String,
    pub question_type: String,
    pub options: Option<serde_json::Value>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: String,
    pub marks: i64,
    pub is_premium: bool,
    pub ai_generated: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionResponse {
    pub id: String,
    pub exam_id: String,
    pub subject_id: Option<String>,
    pub question_text: String,
    pub question_type: String,
    pub options: Option<serde_json::Value>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: String,
    pub marks: i64,
    pub is_premium: bool,
    pub ai_generated: bool,
    pub created_by: String,
    pub created_at: String,
}

impl From<QuestionRecord> for QuestionResponse {
    fn from(record: QuestionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            exam_id: record.exam_id.to_string(),
            subject_id: record.subject_id.map(|id| id.to_string()),
            question_text: record.question_text,
            question_type: record.question_type,
            options: record.options,
            correct_answer: record.correct_answer,
            explanation: record.explanation,
            difficulty: record.difficulty,
            marks: record.marks,
            is_premium: record.is_premium,
            ai_generated: record.ai_generated,
            created_by: record.created_by,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

const QUESTION_COLUMNS: &str = "id, exam_id, subject_id, question_text, question_type, options, \
     correct_answer, explanation, difficulty, marks, is_premium, ai_generated, \
     created_by, created_at";

fn record_from_row(row: &PgRow) -> Result<QuestionRecord, sqlx::Error> {
    Ok(QuestionRecord {
        id: row.try_get("id")?,
        exam_id: row.try_get("exam_id")?,
        subject_id: row.try_get("subject_id")?,
        question_text: row.try_get("question_text")?,
        question_type: row.try_get("question_type")?,
        options: row.try_get("options")?,
        correct_answer: row.try_get("correct_answer")?,
        explanation: row.try_get("explanation")?,
        difficulty: row.try_get("difficulty")?,
        marks: row.try_get("marks")?,
        is_premium: row.try_get("is_premium")?,
        ai_generated: row.try_get("ai_generated")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuestionsQuery {
    /// Restrict to one subject by its slug.
    pub subject: Option<String>,
    /// easy, medium, or hard.
    pub difficulty: Option<String>,
    /// Page size, capped at 200 (default 50).
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/v1/exams/{slug}/questions",
    params(("slug" = String, Path, description = "Exam slug."), ListQuestionsQuery),
    responses(
        (status = 200, description = "Questions, newest first.", body = [QuestionResponse]),
        (status = 403, description = "Premium exam beyond the caller's tier.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "questions"
)]
pub async fn list_questions(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
    Query(query): Query<ListQuestionsQuery>,
) -> impl IntoResponse {
    let caller = optional_user(&headers);
    match list(&pool, &slug, caller.as_deref(), &query).await {
        Ok(questions) => (StatusCode::OK, Json(questions)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list(
    pool: &PgPool,
    exam_slug: &str,
    caller: Option<&str>,
    query: &ListQuestionsQuery,
) -> Result<Vec<QuestionResponse>, ApiError> {
    let exam = visible_exam(pool, exam_slug, caller).await?;

    let subject_id = match &query.subject {
        Some(subject_slug) => Some(
            find_subject(pool, exam.id, subject_slug)
                .await?
                .ok_or(ApiError::NotFound("Subject not found."))?
                .id,
        ),
        None => None,
    };

    let pagination = Pagination {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = pagination.clamp();

    let sql = format!(
        "SELECT {QUESTION_COLUMNS} FROM questions \
         WHERE exam_id = $1 \
           AND ($2::UUID IS NULL OR subject_id = $2) \
           AND ($3::TEXT IS NULL OR difficulty = $3) \
         ORDER BY created_at DESC \
         LIMIT $4 OFFSET $5"
    );
    let rows = sqlx::query(&sql)
        .bind(exam.id)
        .bind(subject_id)
        .bind(&query.difficulty)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let mut questions = Vec::with_capacity(rows.len());
    for row in &rows {
        questions.push(QuestionResponse::from(record_from_row(row)?));
    }
    Ok(questions)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateQuestionRequest {
    /// Subject slug within the exam.
    pub subject: Option<String>,
    pub question_text: String,
    pub question_type: String,
    pub options: Option<serde_json::Value>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: String,
    pub marks: Option<i64>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub ai_generated: bool,
}

#[utoipa::path(
    post,
    path = "/v1/exams/{slug}/questions",
    params(("slug" = String, Path, description = "Exam slug.")),
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question created, totals bumped.", body = QuestionResponse),
        (status = 400, description = "Blank text or unknown difficulty.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Only the creator may add questions.", body = String),
        (status = 404, description = "Exam or subject not found.", body = String),
    ),
    tag = "questions"
)]
pub async fn create_question(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
    Json(request): Json<CreateQuestionRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match create(&pool, &user_id, &slug, request).await {
        Ok(record) => (StatusCode::CREATED, Json(QuestionResponse::from(record))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create(
    pool: &PgPool,
    user_id: &str,
    exam_slug: &str,
    request: CreateQuestionRequest,
) -> Result<QuestionRecord, ApiError> {
    let exam = super::exams::find_exam_by_slug(pool, exam_slug)
        .await?
        .ok_or(ApiError::NotFound("Exam not found."))?;
    if exam.created_by != user_id {
        return Err(ApiError::Forbidden(
            "Only the creator may add questions.".to_string(),
        ));
    }

    if request.question_text.trim().is_empty() {
        return Err(ApiError::BadRequest("Question text must not be blank."));
    }
    if !DIFFICULTIES.contains(&request.difficulty.as_str()) {
        return Err(ApiError::BadRequest(
            "Difficulty must be easy, medium, or hard.",
        ));
    }
    let marks = request.marks.unwrap_or(1);
    if marks <= 0 {
        return Err(ApiError::BadRequest("Marks must be positive."));
    }

    let subject = match &request.subject {
        Some(subject_slug) => Some(
            find_subject(pool, exam.id, subject_slug)
                .await?
                .ok_or(ApiError::NotFound("Subject not found."))?,
        ),
        None => None,
    };

    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    let query = format!(
        "INSERT INTO questions (exam_id, subject_id, question_text, question_type, options, \
             correct_answer, explanation, difficulty, marks, is_premium, ai_generated, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {QUESTION_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(exam.id)
        .bind(subject.as_ref().map(|subject| subject.id))
        .bind(request.question_text.trim())
        .bind(&request.question_type)
        .bind(&request.options)
        .bind(&request.correct_answer)
        .bind(&request.explanation)
        .bind(&request.difficulty)
        .bind(marks)
        .bind(request.is_premium)
        .bind(request.ai_generated)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(ApiError::Database)?;
    let record = record_from_row(&row)?;

    sqlx::query(
        "UPDATE exams SET total_questions = total_questions + 1, updated_at = now() WHERE id = $1",
    )
    .bind(exam.id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    if let Some(subject) = &subject {
        sqlx::query("UPDATE subjects SET total_questions = total_questions + 1 WHERE id = $1")
            .bind(subject.id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::Database)?;
    }

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(record)
}
