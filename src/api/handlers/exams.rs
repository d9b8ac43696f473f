//! Exam catalogue: creation with slug assignment, tier-filtered listing,
//! updates, and pinning.
//!
//! Slug assignment probes the store for the normalized base and its numeric
//! variants, picks the first free candidate, and relies on the UNIQUE
//! constraint to close the race between concurrent creators: a collision on
//! insert surfaces as `409` instead of a duplicate slug.

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

use super::{optional_user, require_user, users::find_user, ApiError};
use crate::{
    access::{within_limit, Tier},
    slug,
};

/// One row of the `exams` table.
#[derive(Debug, Clone)]
pub struct ExamRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_by: String,
    pub is_public: bool,
    pub is_premium: bool,
    pub required_tier: String,
    pub is_pinned: bool,
    pub total_subjects: i64,
    pub total_questions: i64,
    pub total_files: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExamResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_by: String,
    pub is_public: bool,
    pub is_premium: bool,
    pub required_tier: String,
    pub is_pinned: bool,
    pub total_subjects: i64,
    pub total_questions: i64,
    pub total_files: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ExamRecord> for ExamResponse {
    fn from(record: ExamRecord) -> Self {
        Self {
            id: record.id.to_string(),
            name: record.name,
            slug: record.slug,
            abbreviation: record.abbreviation,
            description: record.description,
            category: record.category,
            created_by: record.created_by,
            is_public: record.is_public,
            is_premium: record.is_premium,
            required_tier: record.required_tier,
            is_pinned: record.is_pinned,
            total_subjects: record.total_subjects,
            total_questions: record.total_questions,
            total_files: record.total_files,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

const EXAM_COLUMNS: &str = "id, name, slug, abbreviation, description, category, created_by, \
     is_public, is_premium, required_tier, is_pinned, total_subjects, \
     total_questions, total_files, created_at, updated_at";

fn record_from_row(row: &PgRow) -> Result<ExamRecord, sqlx::Error> {
    Ok(ExamRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        abbreviation: row.try_get("abbreviation")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        created_by: row.try_get("created_by")?,
        is_public: row.try_get("is_public")?,
        is_premium: row.try_get("is_premium")?,
        required_tier: row.try_get("required_tier")?,
        is_pinned: row.try_get("is_pinned")?,
        total_subjects: row.try_get("total_subjects")?,
        total_questions: row.try_get("total_questions")?,
        total_files: row.try_get("total_files")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Looks up an exam by its slug.
pub async fn find_exam_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ExamRecord>, sqlx::Error> {
    let query = format!("SELECT {EXAM_COLUMNS} FROM exams WHERE slug = $1");
    let row = sqlx::query(&query).bind(slug).fetch_optional(pool).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// The caller's tier, read from their user row. Anonymous callers and users
/// with an unrecognized tier string read as `free`.
pub async fn caller_tier(pool: &PgPool, user_id: Option<&str>) -> Result<Tier, sqlx::Error> {
    let Some(user_id) = user_id else {
        return Ok(Tier::Free);
    };
    match find_user(pool, user_id).await? {
        Some(user) => Ok(user.subscription_tier.parse().unwrap_or(Tier::Free)),
        None => Ok(Tier::Free),
    }
}

/// `true` when the caller may read this exam: their own, public free content,
/// or public premium content their tier reaches.
#[must_use]
pub fn can_view(exam: &ExamRecord, caller: Option<&str>, tier: Tier) -> bool {
    if caller == Some(exam.created_by.as_str()) {
        return true;
    }
    if !exam.is_public {
        return false;
    }
    if !exam.is_premium {
        return true;
    }
    let required = exam.required_tier.parse().unwrap_or(Tier::Premium);
    tier.satisfies(required)
}

/// Resolves an exam and enforces read access: `404` when it does not exist or
/// is private to someone else, `403` when it is premium beyond the caller.
pub async fn visible_exam(
    pool: &PgPool,
    slug: &str,
    caller: Option<&str>,
) -> Result<ExamRecord, ApiError> {
    let exam = find_exam_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("Exam not found."))?;

    if caller == Some(exam.created_by.as_str()) {
        return Ok(exam);
    }
    if !exam.is_public {
        // Private exams read as absent to everyone but their creator.
        return Err(ApiError::NotFound("Exam not found."));
    }
    if exam.is_premium {
        let tier = caller_tier(pool, caller).await?;
        let required = exam.required_tier.parse().unwrap_or(Tier::Premium);
        if !tier.satisfies(required) {
            return Err(ApiError::Forbidden(format!(
                "This exam requires the {required} tier."
            )));
        }
    }
    Ok(exam)
}

/// Picks the first free slug for `base` with one round trip: fetch the base
/// and every `base-N` variant already taken, then probe in memory.
async fn assign_slug(pool: &PgPool, base: &str) -> Result<String, sqlx::Error> {
    let rows = sqlx::query("SELECT slug FROM exams WHERE slug = $1 OR slug LIKE $2")
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

/// `true` when `candidate` is `base` itself or a `base-N` collision variant,
/// meaning the stored slug still matches the exam's name.
pub(super) fn matches_base(candidate: &str, base: &str) -> bool {
    if candidate == base {
        return true;
    }
    candidate
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateExamRequest {
    pub name: String,
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_premium: bool,
    pub required_tier: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/exams",
    request_body = CreateExamRequest,
    responses(
        (status = 201, description = "Exam created with its assigned slug.", body = ExamResponse),
        (status = 400, description = "Blank name or one that normalizes to nothing.", body = String),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "The plan's exam limit is reached.", body = String),
        (status = 409, description = "Lost a concurrent race for the same slug.", body = String),
    ),
    tag = "exams"
)]
pub async fn create_exam(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<CreateExamRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match create(&pool, &user_id, request).await {
        Ok(exam) => (StatusCode::CREATED, Json(ExamResponse::from(exam))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create(
    pool: &PgPool,
    user_id: &str,
    request: CreateExamRequest,
) -> Result<ExamRecord, ApiError> {
    let user = find_user(pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))?;
    let plan = super::plans::plan_for_tier(pool, &user.subscription_tier)
        .await?
        .ok_or(ApiError::NotFound("No active plan for tier."))?;

    // The gate is on the lifetime counter, not the current row count, so
    // deleting exams does not free up quota.
    let created: i64 = sqlx::query(
        "SELECT total_exams_created AS n FROM total_usage WHERE user_external_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .map(|row| row.try_get("n"))
    .transpose()?
    .unwrap_or(0);
    if !within_limit(plan.max_exams, created) {
        return Err(ApiError::Forbidden(format!(
            "Your plan allows {} exams.",
            plan.max_exams
        )));
    }

    let required_tier = validated_tier(request.required_tier.as_deref())?;

    let base = slug::base_candidate(&request.name, request.abbreviation.as_deref());
    let base = slug::normalize(&base);
    if base.is_empty() {
        return Err(ApiError::BadRequest(
            "Name must contain at least one letter or digit.",
        ));
    }
    let assigned = assign_slug(pool, &base).await?;

    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    let query = format!(
        "INSERT INTO exams (name, slug, abbreviation, description, category, created_by, \
             is_public, is_premium, required_tier) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {EXAM_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(request.name.trim())
        .bind(&assigned)
        .bind(&request.abbreviation)
        .bind(&request.description)
        .bind(&request.category)
        .bind(user_id)
        .bind(request.is_public)
        .bind(request.is_premium)
        .bind(required_tier)
        .fetch_one(&mut *tx)
        .await
        .map_err(slug_conflict)?;
    let exam = record_from_row(&row)?;

    sqlx::query(
        r"
        UPDATE total_usage
        SET total_exams_created = total_exams_created + 1, updated_at = now()
        WHERE user_external_id = $1
        ",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(exam)
}

/// Maps a UNIQUE violation on the slug column to `409`.
fn slug_conflict(err: sqlx::Error) -> ApiError {
    if err
        .as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
    {
        return ApiError::Conflict("Slug was taken concurrently, retry the request.");
    }
    ApiError::from(err)
}

fn validated_tier(tier: Option<&str>) -> Result<String, ApiError> {
    match tier {
        None => Ok(Tier::Free.as_str().to_string()),
        Some(raw) => raw
            .parse::<Tier>()
            .map(|tier| tier.as_str().to_string())
            .map_err(|_| ApiError::BadRequest("Unknown required_tier.")),
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListExamsQuery {
    /// Restrict to one category.
    pub category: Option<String>,
    /// Page size, capped at 200 (default 50).
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/v1/exams",
    params(ListExamsQuery),
    responses(
        (status = 200, description = "Exams the caller may see, pinned first.", body = [ExamResponse]),
    ),
    tag = "exams"
)]
pub async fn list_exams(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<ListExamsQuery>,
) -> impl IntoResponse {
    let caller = optional_user(&headers);
    match list(&pool, caller.as_deref(), &query).await {
        Ok(exams) => (StatusCode::OK, Json(exams)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list(
    pool: &PgPool,
    caller: Option<&str>,
    query: &ListExamsQuery,
) -> Result<Vec<ExamResponse>, ApiError> {
    let tier = caller_tier(pool, caller).await?;
    let reachable: Vec<String> = [Tier::Free, Tier::Basic, Tier::Premium, Tier::Enterprise]
        .into_iter()
        .filter(|required| tier.satisfies(*required))
        .map(|required| required.as_str().to_string())
        .collect();

    let pagination = super::Pagination {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = pagination.clamp();

    // Visible: the caller's own exams, public free exams, and public premium
    // exams whose required tier the caller reaches.
    let sql = format!(
        "SELECT {EXAM_COLUMNS} FROM exams \
         WHERE (created_by = $1 \
                OR (is_public AND NOT is_premium) \
                OR (is_public AND is_premium AND required_tier = ANY($2))) \
           AND ($3::TEXT IS NULL OR category = $3) \
         ORDER BY is_pinned DESC, created_at DESC \
         LIMIT $4 OFFSET $5"
    );
    let rows = sqlx::query(&sql)
        .bind(caller.unwrap_or_default())
        .bind(&reachable)
        .bind(&query.category)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let mut exams = Vec::with_capacity(rows.len());
    for row in &rows {
        exams.push(ExamResponse::from(record_from_row(row)?));
    }
    Ok(exams)
}

#[utoipa::path(
    get,
    path = "/v1/exams/{slug}",
    params(("slug" = String, Path, description = "Exam slug.")),
    responses(
        (status = 200, description = "The exam.", body = ExamResponse),
        (status = 403, description = "Premium exam beyond the caller's tier.", body = String),
        (status = 404, description = "No such exam, or private to someone else.", body = String),
    ),
    tag = "exams"
)]
pub async fn get_exam(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let caller = optional_user(&headers);
    match visible_exam(&pool, &slug, caller.as_deref()).await {
        Ok(exam) => (StatusCode::OK, Json(ExamResponse::from(exam))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateExamRequest {
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub is_public: Option<bool>,
    pub is_premium: Option<bool>,
    pub required_tier: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/v1/exams/{slug}",
    params(("slug" = String, Path, description = "Exam slug.")),
    request_body = UpdateExamRequest,
    responses(
        (status = 200, description = "The updated exam, possibly with a new slug.", body = ExamResponse),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Only the creator may update an exam.", body = String),
        (status = 404, description = "Exam not found.", body = String),
        (status = 409, description = "Lost a concurrent race for the new slug.", body = String),
    ),
    tag = "exams"
)]
pub async fn update_exam(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
    Json(request): Json<UpdateExamRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match update(&pool, &user_id, &slug, request).await {
        Ok(exam) => (StatusCode::OK, Json(ExamResponse::from(exam))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update(
    pool: &PgPool,
    user_id: &str,
    slug: &str,
    request: UpdateExamRequest,
) -> Result<ExamRecord, ApiError> {
    let exam = find_exam_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("Exam not found."))?;
    if exam.created_by != user_id {
        return Err(ApiError::Forbidden(
            "Only the creator may update an exam.".to_string(),
        ));
    }

    let name = match request.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::BadRequest("Name must not be blank."));
        }
        Some(name) => name.trim().to_string(),
        None => exam.name.clone(),
    };
    let abbreviation = match request.abbreviation {
        Some(abbreviation) => Some(abbreviation),
        None => exam.abbreviation.clone(),
    };
    let required_tier = match request.required_tier {
        Some(raw) => validated_tier(Some(&raw))?,
        None => exam.required_tier.clone(),
    };

    // Re-slug only when the stored slug no longer matches the new
    // name/abbreviation; a `base-N` collision variant still counts as
    // matching so updates don't churn published URLs.
    let base = slug::normalize(&slug::base_candidate(&name, abbreviation.as_deref()));
    if base.is_empty() {
        return Err(ApiError::BadRequest(
            "Name must contain at least one letter or digit.",
        ));
    }
    let new_slug = if matches_base(&exam.slug, &base) {
        exam.slug.clone()
    } else {
        assign_slug(pool, &base).await?
    };

    let query = format!(
        "UPDATE exams \
         SET name = $2, slug = $3, abbreviation = $4, description = $5, category = $6, \
             is_public = $7, is_premium = $8, required_tier = $9, updated_at = now() \
         WHERE id = $1 \
         RETURNING {EXAM_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(exam.id)
        .bind(&name)
        .bind(&new_slug)
        .bind(&abbreviation)
        .bind(request.description.or(exam.description))
        .bind(request.category.or(exam.category))
        .bind(request.is_public.unwrap_or(exam.is_public))
        .bind(request.is_premium.unwrap_or(exam.is_premium))
        .bind(&required_tier)
        .fetch_one(pool)
        .await
        .map_err(slug_conflict)?;
    Ok(record_from_row(&row)?)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PinResponse {
    pub slug: String,
    pub is_pinned: bool,
}

#[utoipa::path(
    post,
    path = "/v1/exams/{slug}/pin",
    params(("slug" = String, Path, description = "Exam slug.")),
    responses(
        (status = 200, description = "The new pin state.", body = PinResponse),
        (status = 401, description = "Missing x-user-id header."),
        (status = 403, description = "Only the creator may pin an exam.", body = String),
        (status = 404, description = "Exam not found.", body = String),
    ),
    tag = "exams"
)]
pub async fn toggle_pin(
    headers: HeaderMap,
    Path(slug): Path<String>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match pin(&pool, &user_id, &slug).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn pin(pool: &PgPool, user_id: &str, slug: &str) -> Result<PinResponse, ApiError> {
    let exam = find_exam_by_slug(pool, slug)
        .await?
        .ok_or(ApiError::NotFound("Exam not found."))?;
    if exam.created_by != user_id {
        return Err(ApiError::Forbidden(
            "Only the creator may pin an exam.".to_string(),
        ));
    }

    let row = sqlx::query(
        "UPDATE exams SET is_pinned = NOT is_pinned, updated_at = now() \
         WHERE id = $1 RETURNING is_pinned",
    )
    .bind(exam.id)
    .fetch_one(pool)
    .await?;

    Ok(PinResponse {
        slug: exam.slug,
        is_pinned: row.try_get("is_pinned")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testutil;

    fn exam(created_by: &str, is_public: bool, is_premium: bool, tier: &str) -> ExamRecord {
        ExamRecord {
            id: Uuid::nil(),
            name: "Exam".into(),
            slug: "exam".into(),
            abbreviation: None,
            description: None,
            category: None,
            created_by: created_by.into(),
            is_public,
            is_premium,
            required_tier: tier.into(),
            is_pinned: false,
            total_subjects: 0,
            total_questions: 0,
            total_files: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn creator_sees_private_exams() {
        let exam = exam("user_1", false, false, "free");
        assert!(can_view(&exam, Some("user_1"), Tier::Free));
        assert!(!can_view(&exam, Some("user_2"), Tier::Enterprise));
        assert!(!can_view(&exam, None, Tier::Free));
    }

    #[test]
    fn public_free_exams_are_visible_to_everyone() {
        let exam = exam("user_1", true, false, "free");
        assert!(can_view(&exam, None, Tier::Free));
        assert!(can_view(&exam, Some("user_2"), Tier::Free));
    }

    #[test]
    fn premium_exams_require_the_tier() {
        let exam = exam("user_1", true, true, "premium");
        assert!(!can_view(&exam, Some("user_2"), Tier::Basic));
        assert!(can_view(&exam, Some("user_2"), Tier::Premium));
        assert!(can_view(&exam, Some("user_2"), Tier::Enterprise));
    }

    #[test]
    fn unknown_required_tier_reads_as_premium() {
        let exam = exam("user_1", true, true, "platinum");
        assert!(!can_view(&exam, Some("user_2"), Tier::Basic));
        assert!(can_view(&exam, Some("user_2"), Tier::Premium));
    }

    #[test]
    fn matches_base_accepts_collision_variants() {
        assert!(matches_base("smle", "smle"));
        assert!(matches_base("smle-2", "smle"));
        assert!(matches_base("smle-10", "smle"));
        assert!(!matches_base("smle-two", "smle"));
        assert!(!matches_base("smle-", "smle"));
        assert!(!matches_base("smledge", "smle"));
        assert!(!matches_base("other", "smle"));
    }

    #[test]
    fn validated_tier_defaults_to_free() {
        assert_eq!(validated_tier(None).unwrap(), "free");
        assert_eq!(validated_tier(Some("premium")).unwrap(), "premium");
        assert!(validated_tier(Some("gold")).is_err());
    }

    fn request(name: &str, abbreviation: Option<&str>) -> CreateExamRequest {
        CreateExamRequest {
            name: name.to_string(),
            abbreviation: abbreviation.map(ToString::to_string),
            description: None,
            category: None,
            is_public: false,
            is_premium: false,
            required_tier: None,
        }
    }

    #[tokio::test]
    async fn exam_gate_reads_the_lifetime_counter() -> anyhow::Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        testutil::seed_user(&pool, "user_1", "free").await?;

        // No exam rows exist, but the lifetime counter already sits at the
        // free plan's limit of two: creation must be refused.
        sqlx::query(
            "UPDATE total_usage SET total_exams_created = 2 WHERE user_external_id = $1",
        )
        .bind("user_1")
        .execute(&pool)
        .await?;

        let err = create(&pool, "user_1", request("Anatomy Finals", None))
            .await
            .expect_err("lifetime limit should refuse creation");
        assert!(matches!(err, ApiError::Forbidden(_)));
        Ok(())
    }

    #[tokio::test]
    async fn create_assigns_slugs_and_bumps_the_lifetime_counter() -> anyhow::Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        testutil::seed_user(&pool, "user_1", "free").await?;

        let first = create(&pool, "user_1", request("SMLE Prep", Some("SMLE")))
            .await
            .expect("first exam");
        assert_eq!(first.slug, "smle");

        let second = create(&pool, "user_1", request("SMLE Prep", Some("SMLE")))
            .await
            .expect("second exam");
        assert_eq!(second.slug, "smle-1");

        let counter: i64 = sqlx::query(
            "SELECT total_exams_created AS n FROM total_usage WHERE user_external_id = $1",
        )
        .bind("user_1")
        .fetch_one(&pool)
        .await?
        .try_get("n")?;
        assert_eq!(counter, 2);
        Ok(())
    }
}
