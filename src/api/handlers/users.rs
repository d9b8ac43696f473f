//! User records mirrored from the identity provider.
//!
//! Flow Overview:
//! 1) Webhook events insert, update, and delete rows here.
//! 2) `/v1/me` resolves the caller from the forwarded subject header.
//! 3) Usage and exam handlers read the tier/status pair for gating.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::ToSchema;

use super::{require_user, ApiError};

/// One row of the `users` table.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub subscription_tier: String,
    pub subscription_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub subscription_tier: String,
    pub subscription_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserRecord> for UserResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            external_id: record.external_id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            image_url: record.image_url,
            subscription_tier: record.subscription_tier,
            subscription_status: record.subscription_status,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        image_url: row.try_get("image_url")?,
        subscription_tier: row.try_get("subscription_tier")?,
        subscription_status: row.try_get("subscription_status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const USER_COLUMNS: &str = "external_id, email, first_name, last_name, image_url, \
     subscription_tier, subscription_status, created_at, updated_at";

/// Looks up a user by the identity provider subject.
pub async fn find_user(pool: &PgPool, external_id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = $1");
    let row = sqlx::query(&query)
        .bind(external_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Profile fields carried by `user.created` and `user.updated` events.
#[derive(Debug)]
pub struct UserProfile {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

/// Inserts a user with the default free tier and a zeroed lifetime-usage row.
/// Duplicate deliveries are idempotent: an existing user is left untouched.
pub async fn create_user(pool: &PgPool, profile: &UserProfile) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    sqlx::query(
        r"
        INSERT INTO users (external_id, email, first_name, last_name, image_url)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (external_id) DO NOTHING
        ",
    )
    .bind(&profile.external_id)
    .bind(&profile.email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.image_url)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    sqlx::query(
        r"
        INSERT INTO total_usage (user_external_id)
        VALUES ($1)
        ON CONFLICT (user_external_id) DO NOTHING
        ",
    )
    .bind(&profile.external_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Database)?;

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(())
}

/// Applies a `user.updated` event. Missing users are a `NotFound`.
pub async fn update_user(pool: &PgPool, profile: &UserProfile) -> Result<(), ApiError> {
    let result = sqlx::query(
        r"
        UPDATE users
        SET email = $2, first_name = $3, last_name = $4, image_url = $5, updated_at = now()
        WHERE external_id = $1
        ",
    )
    .bind(&profile.external_id)
    .bind(&profile.email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.image_url)
    .execute(pool)
    .await
    .map_err(ApiError::Database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("User not found."));
    }
    Ok(())
}

/// Subscription fields carried by `subscription.updated` events.
#[derive(Debug)]
pub struct SubscriptionUpdate {
    pub external_id: String,
    pub tier: String,
    pub status: String,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: Option<bool>,
}

/// Applies a `subscription.updated` event. Missing users are a `NotFound`.
pub async fn update_subscription(pool: &PgPool, update: &SubscriptionUpdate) -> Result<(), ApiError> {
    let result = sqlx::query(
        r"
        UPDATE users
        SET subscription_tier = $2,
            subscription_status = $3,
            billing_customer_id = $4,
            billing_subscription_id = $5,
            current_period_end = $6,
            cancel_at_period_end = $7,
            updated_at = now()
        WHERE external_id = $1
        ",
    )
    .bind(&update.external_id)
    .bind(&update.tier)
    .bind(&update.status)
    .bind(&update.billing_customer_id)
    .bind(&update.billing_subscription_id)
    .bind(update.current_period_end)
    .bind(update.cancel_at_period_end)
    .execute(pool)
    .await
    .map_err(ApiError::Database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("User not found."));
    }
    Ok(())
}

/// Removes a user together with their usage rows. Deleting an unknown user
/// is a no-op so replayed `user.deleted` events stay harmless.
pub async fn delete_user(pool: &PgPool, external_id: &str) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::Database)?;

    for statement in [
        "DELETE FROM users WHERE external_id = $1",
        "DELETE FROM total_usage WHERE user_external_id = $1",
        "DELETE FROM daily_usage WHERE user_external_id = $1",
    ] {
        sqlx::query(statement)
            .bind(external_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::Database)?;
    }

    tx.commit().await.map_err(ApiError::Database)?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The authenticated user's profile.", body = UserResponse),
        (status = 401, description = "Missing x-user-id header."),
        (status = 404, description = "No user record for this subject."),
    ),
    tag = "users"
)]
pub async fn get_me(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let user_id = match require_user(&headers) {
        Ok(user_id) => user_id,
        Err(status) => return status.into_response(),
    };

    match find_user(&pool, &user_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(UserResponse::from(record))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to load user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_formats_timestamps() {
        let record = UserRecord {
            external_id: "user_1".into(),
            email: "user@example.com".into(),
            first_name: Some("Nora".into()),
            last_name: None,
            image_url: None,
            subscription_tier: "free".into(),
            subscription_status: "active".into(),
            created_at: DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339("2024-06-02T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let response = UserResponse::from(record);
        assert_eq!(response.created_at, "2024-06-01T10:00:00+00:00");
        assert_eq!(response.subscription_tier, "free");
    }
}
