//! Usage limits: daily counters, the lifetime storage cap, and feature gates.
//!
//! The decision rules live in [`crate::access`]; this module loads the plan
//! and counters, asks for a verdict, and maps it to HTTP. Two deliberate
//! asymmetries from the limit-check side:
//!   - `limits/{action}` errors with `404` when the user or plan row is
//!     missing (a configuration problem worth surfacing),
//!   - `features/{feature}` never errors: missing user, missing plan, and
//!     unknown feature names all read as `allowed: false`.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::debug;
use utoipa::ToSchema;

use super::{plans::plan_for_tier, require_user, users::find_user, ApiError};
use crate::{
    access::{daily_decision, storage_decision, DailyCounters, Feature, LimitDecision, UsageAction},
    clock::DayClock,
};

/// Loads one user's counters for `day`. A missing row reads as all zeros.
pub async fn daily_counters(
    pool: &PgPool,
    user_id: &str,
    day: NaiveDate,
) -> Result<DailyCounters, sqlx::Error> {
    let row = sqlx::query(
        r"
        SELECT assessments_taken, ai_questions_generated, files_uploaded
        FROM daily_usage
        WHERE user_external_id = $1 AND day = $2
        ",
    )
    .bind(user_id)
    .bind(day)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(DailyCounters {
            assessments_taken: row.try_get("assessments_taken")?,
            ai_questions_generated: row.try_get("ai_questions_generated")?,
            files_uploaded: row.try_get("files_uploaded")?,
        }),
        None => Ok(DailyCounters::default()),
    }
}

/// Lifetime storage used in megabytes. Missing rows read as zero.
pub async fn storage_used_mb(pool: &PgPool, user_id: &str) -> Result<f64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT file_storage_used_mb FROM total_usage WHERE user_external_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_get("file_storage_used_mb"),
        None => Ok(0.0),
    }
}

/// Adds `amount` to the day's counter for `action`, creating the row with the
/// other counters at zero when this is the first action of the day.
pub async fn increment_daily(
    pool: &PgPool,
    user_id: &str,
    day: NaiveDate,
    action: UsageAction,
    amount: i64,
) -> Result<(), sqlx::Error> {
    let column = match action {
        UsageAction::Assessment => "assessments_taken",
        UsageAction::AiQuestion => "ai_questions_generated",
        UsageAction::FileUpload => "files_uploaded",
    };
    let query = format!(
        "INSERT INTO daily_usage (user_external_id, day, {column}) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (user_external_id, day) \
         DO UPDATE SET {column} = daily_usage.{column} + $3, updated_at = now()"
    );
    sqlx::query(&query)
        .bind(user_id)
        .bind(day)
        .bind(amount)
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolves the caller's active plan, mapping missing rows to `NotFound`.
async fn plan_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<crate::access::PlanLimits, ApiError> {
    let user = find_user(pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))?;
    plan_for_tier(pool, &user.subscription_tier)
        .await?
        .ok_or(ApiError::NotFound("No active plan for tier."))
}

#[utoipa::path(
    get,
    path = "/v1/usage/limits/{action}",
    params(("action" = String, Path, description = "assessment, ai_question, or file_upload")),
    responses(
        (status = 200, description = "The verdict with the counter and limit behind it.", body = LimitDecision),
        (status = 401, description = "Missing x-user-id header."),
        (status = 404, description = "User or active plan missing.", body = String),
    ),
    tag = "usage"
)]
pub async fn check_daily_limit(
    headers: HeaderMap,
    Path(action): Path<String>,
    pool: Extension<PgPool>,
    clock: Extension<DayClock>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match limit_verdict(&pool, &clock, &user_id, &action).await {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn limit_verdict(
    pool: &PgPool,
    clock: &DayClock,
    user_id: &str,
    action: &str,
) -> Result<LimitDecision, ApiError> {
    let plan = plan_for_user(pool, user_id).await?;

    let Ok(action) = action.parse::<UsageAction>() else {
        debug!("Unknown usage action {action}, denying");
        return Ok(LimitDecision::denied());
    };

    if action == UsageAction::FileUpload {
        let used_mb = storage_used_mb(pool, user_id).await?;
        return Ok(storage_decision(used_mb, plan.file_storage_gb));
    }

    let usage = daily_counters(pool, user_id, clock.today()).await?;
    Ok(daily_decision(action, &plan, usage))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IncrementRequest {
    /// assessment, ai_question, or file_upload.
    pub action: String,
    /// Amount to add, defaulting to one.
    pub amount: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/v1/usage/increment",
    request_body = IncrementRequest,
    responses(
        (status = 200, description = "Counter bumped, or silently ignored for unknown actions."),
        (status = 400, description = "Non-positive amount.", body = String),
        (status = 401, description = "Missing x-user-id header."),
    ),
    tag = "usage"
)]
pub async fn increment_usage(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    clock: Extension<DayClock>,
    Json(request): Json<IncrementRequest>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    let amount = request.amount.unwrap_or(1);
    if amount <= 0 {
        return ApiError::BadRequest("Amount must be positive.").into_response();
    }

    let Ok(action) = request.action.parse::<UsageAction>() else {
        debug!("Unknown usage action {}, ignoring", request.action);
        return StatusCode::OK.into_response();
    };

    match increment_daily(&pool, &user_id, clock.today(), action, amount).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeatureVerdict {
    pub allowed: bool,
}

#[utoipa::path(
    get,
    path = "/v1/usage/features/{feature}",
    params(("feature" = String, Path, description = "Feature flag name.")),
    responses(
        (status = 200, description = "Whether the caller's plan grants the feature.", body = FeatureVerdict),
        (status = 401, description = "Missing x-user-id header."),
    ),
    tag = "usage"
)]
pub async fn can_access_feature(
    headers: HeaderMap,
    Path(feature): Path<String>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    let allowed = match feature_allowed(&pool, &user_id, &feature).await {
        Ok(allowed) => allowed,
        Err(err) => return err.into_response(),
    };
    (StatusCode::OK, Json(FeatureVerdict { allowed })).into_response()
}

/// Boolean gate. Missing user, missing plan, and unknown feature names all
/// read as `false` instead of erroring.
async fn feature_allowed(pool: &PgPool, user_id: &str, feature: &str) -> Result<bool, ApiError> {
    let Ok(feature) = feature.parse::<Feature>() else {
        return Ok(false);
    };
    let Some(user) = find_user(pool, user_id).await? else {
        return Ok(false);
    };
    let Some(plan) = plan_for_tier(pool, &user.subscription_tier).await? else {
        return Ok(false);
    };
    Ok(plan.allows(feature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testutil;
    use anyhow::Result;

    #[tokio::test]
    async fn increment_is_reflected_by_the_limit_check() -> Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        testutil::seed_user(&pool, "user_1", "free").await?;
        let clock = DayClock::from_offset_minutes(0)?;

        increment_daily(&pool, "user_1", clock.today(), UsageAction::AiQuestion, 3).await?;

        let decision = limit_verdict(&pool, &clock, "user_1", "ai_question")
            .await
            .expect("verdict for a seeded user");
        assert!(decision.allowed);
        assert_eq!(decision.current, 3.0);
        assert_eq!(decision.limit, 5.0);

        // The day row was created lazily and only the matching counter moved.
        let counters = daily_counters(&pool, "user_1", clock.today()).await?;
        assert_eq!(counters.ai_questions_generated, 3);
        assert_eq!(counters.assessments_taken, 0);
        assert_eq!(counters.files_uploaded, 0);
        Ok(())
    }

    #[tokio::test]
    async fn free_plan_denies_the_third_assessment() -> Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        testutil::seed_user(&pool, "user_1", "free").await?;
        let clock = DayClock::from_offset_minutes(0)?;
        let day = clock.today();

        let decision = limit_verdict(&pool, &clock, "user_1", "assessment")
            .await
            .expect("fresh day starts at zero");
        assert!(decision.allowed);
        assert_eq!(decision.current, 0.0);

        increment_daily(&pool, "user_1", day, UsageAction::Assessment, 1).await?;
        let decision = limit_verdict(&pool, &clock, "user_1", "assessment")
            .await
            .expect("one of two used");
        assert!(decision.allowed);
        assert_eq!(decision.current, 1.0);

        increment_daily(&pool, "user_1", day, UsageAction::Assessment, 1).await?;
        let decision = limit_verdict(&pool, &clock, "user_1", "assessment")
            .await
            .expect("limit reached");
        assert!(!decision.allowed);
        assert_eq!(decision.current, 2.0);
        assert_eq!(decision.limit, 2.0);
        Ok(())
    }

    #[tokio::test]
    async fn limit_check_errors_for_unknown_user() -> Result<()> {
        if !testutil::container_runtime_available() {
            eprintln!("Skipping integration test: no container runtime");
            return Ok(());
        }
        let (pool, _postgres) = testutil::start_postgres().await?;
        let clock = DayClock::from_offset_minutes(0)?;

        let err = limit_verdict(&pool, &clock, "ghost", "assessment")
            .await
            .expect_err("missing user should surface");
        assert!(matches!(err, ApiError::NotFound(_)));
        Ok(())
    }
}
