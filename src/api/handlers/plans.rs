//! Subscription plan catalogue.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use sqlx::{postgres::PgRow, PgPool, Row};
use utoipa::ToSchema;

use crate::access::PlanLimits;

/// One active plan as presented on the pricing surface.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub tier: String,
    pub price_cents: i64,
    pub currency: String,
    pub max_exams: i64,
    pub max_subjects_per_exam: i64,
    pub max_assessments_per_day: i64,
    pub ai_questions_per_day: i64,
    pub file_storage_gb: f64,
    pub max_files_per_exam: i64,
    pub premium_content: bool,
    pub library: bool,
    pub high_yield: bool,
    pub download_pdfs: bool,
    pub custom_assessments: bool,
    pub display_order: i64,
}

fn limits_from_row(row: &PgRow) -> Result<PlanLimits, sqlx::Error> {
    Ok(PlanLimits {
        max_exams: row.try_get("max_exams")?,
        max_subjects_per_exam: row.try_get("max_subjects_per_exam")?,
        max_assessments_per_day: row.try_get("max_assessments_per_day")?,
        ai_questions_per_day: row.try_get("ai_questions_per_day")?,
        file_storage_gb: row.try_get("file_storage_gb")?,
        max_files_per_exam: row.try_get("max_files_per_exam")?,
        premium_content: row.try_get("premium_content")?,
        library: row.try_get("library")?,
        high_yield: row.try_get("high_yield")?,
        download_pdfs: row.try_get("download_pdfs")?,
        custom_assessments: row.try_get("custom_assessments")?,
    })
}

/// Loads the active plan for a tier. At most one row matches thanks to the
/// partial unique index on `(tier) WHERE is_active`.
pub async fn plan_for_tier(pool: &PgPool, tier: &str) -> Result<Option<PlanLimits>, sqlx::Error> {
    let row = sqlx::query(
        r"
        SELECT max_exams, max_subjects_per_exam, max_assessments_per_day,
               ai_questions_per_day, file_storage_gb, max_files_per_exam,
               premium_content, library, high_yield, download_pdfs,
               custom_assessments
        FROM plans
        WHERE tier = $1 AND is_active
        ",
    )
    .bind(tier)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(limits_from_row).transpose()
}

#[utoipa::path(
    get,
    path = "/v1/plans",
    responses(
        (status = 200, description = "Active plans ordered for display.", body = [PlanResponse]),
    ),
    tag = "plans"
)]
pub async fn list_plans(pool: Extension<PgPool>) -> impl IntoResponse {
    let rows = sqlx::query(
        r"
        SELECT id, name, tier, price_cents, currency, max_exams,
               max_subjects_per_exam, max_assessments_per_day,
               ai_questions_per_day, file_storage_gb, max_files_per_exam,
               premium_content, library, high_yield, download_pdfs,
               custom_assessments, display_order
        FROM plans
        WHERE is_active
        ORDER BY display_order, name
        ",
    )
    .fetch_all(&pool.0)
    .await;

    let rows = match rows {
        Ok(rows) => rows,
        Err(err) => {
            tracing::error!("Failed to load plans: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut plans = Vec::with_capacity(rows.len());
    for row in &rows {
        match plan_response_from_row(row) {
            Ok(plan) => plans.push(plan),
            Err(err) => {
                tracing::error!("Malformed plan row: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    (StatusCode::OK, Json(plans)).into_response()
}

fn plan_response_from_row(row: &PgRow) -> Result<PlanResponse, sqlx::Error> {
    let id: uuid::Uuid = row.try_get("id")?;
    Ok(PlanResponse {
        id: id.to_string(),
        name: row.try_get("name")?,
        tier: row.try_get("tier")?,
        price_cents: row.try_get("price_cents")?,
        currency: row.try_get("currency")?,
        max_exams: row.try_get("max_exams")?,
        max_subjects_per_exam: row.try_get("max_subjects_per_exam")?,
        max_assessments_per_day: row.try_get("max_assessments_per_day")?,
        ai_questions_per_day: row.try_get("ai_questions_per_day")?,
        file_storage_gb: row.try_get("file_storage_gb")?,
        max_files_per_exam: row.try_get("max_files_per_exam")?,
        premium_content: row.try_get("premium_content")?,
        library: row.try_get("library")?,
        high_yield: row.try_get("high_yield")?,
        download_pdfs: row.try_get("download_pdfs")?,
        custom_assessments: row.try_get("custom_assessments")?,
        display_order: row.try_get("display_order")?,
    })
}
