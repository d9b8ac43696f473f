//! Identity provider lifecycle events.
//!
//! The provider signs deliveries and an upstream verifier terminates the
//! signature; what arrives here carries a shared secret header instead.
//! Events mirror users into the local store: `user.created`, `user.updated`,
//! `user.deleted`, and `subscription.updated`. Anything else is acknowledged
//! and ignored so new provider event types never bounce deliveries.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{
    users::{self, SubscriptionUpdate, UserProfile},
    valid_email, ApiError,
};
use crate::{access::Tier, cli::globals::GlobalArgs};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Deserialize, ToSchema)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UserEventData {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionEventData {
    id: String,
    tier: String,
    status: String,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    subscription_id: Option<String>,
    /// Unix seconds, as billing providers report period boundaries.
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: Option<bool>,
}

/// Compares the presented secret against the configured one through SHA-256
/// digests, so the comparison runs over fixed-length values instead of
/// short-circuiting on the first differing byte of the secret itself.
fn secret_matches(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

fn profile_from(data: UserEventData) -> Result<UserProfile, ApiError> {
    let email = data.email.unwrap_or_default();
    if !valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email address."));
    }
    Ok(UserProfile {
        external_id: data.id,
        email,
        first_name: data.first_name,
        last_name: data.last_name,
        image_url: data.image_url,
    })
}

fn period_end(seconds: Option<i64>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match seconds {
        None => Ok(None),
        Some(secs) => match Utc.timestamp_opt(secs, 0).single() {
            Some(instant) => Ok(Some(instant)),
            None => Err(ApiError::BadRequest("Invalid current_period_end timestamp.")),
        },
    }
}

#[utoipa::path(
    post,
    path = "/v1/webhooks/identity",
    request_body = IdentityEvent,
    responses(
        (status = 200, description = "Event applied or ignored."),
        (status = 400, description = "Malformed event payload.", body = String),
        (status = 401, description = "Missing or wrong shared secret."),
        (status = 404, description = "Event references an unknown user.", body = String),
    ),
    tag = "webhooks"
)]
pub async fn identity_event(
    headers: HeaderMap,
    globals: Extension<GlobalArgs>,
    pool: Extension<PgPool>,
    Json(event): Json<IdentityEvent>,
) -> impl IntoResponse {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || !secret_matches(presented, globals.webhook_secret.expose_secret()) {
        warn!("Webhook delivery rejected: bad shared secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match apply_event(&pool, event).await {
        Ok(outcome) => {
            info!("Webhook event {outcome}");
            (StatusCode::OK, outcome).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Applies one event, returning a short human-readable outcome.
async fn apply_event(pool: &PgPool, event: IdentityEvent) -> Result<&'static str, ApiError> {
    match event.event_type.as_str() {
        "user.created" => {
            let data: UserEventData = parse_data(event.data)?;
            users::create_user(pool, &profile_from(data)?).await?;
            Ok("user created")
        }
        "user.updated" => {
            let data: UserEventData = parse_data(event.data)?;
            users::update_user(pool, &profile_from(data)?).await?;
            Ok("user updated")
        }
        "user.deleted" => {
            let data: UserEventData = parse_data(event.data)?;
            users::delete_user(pool, &data.id).await?;
            Ok("user deleted")
        }
        "subscription.updated" => {
            let data: SubscriptionEventData = parse_data(event.data)?;
            if data.tier.parse::<Tier>().is_err() {
                return Err(ApiError::BadRequest("Unknown subscription tier."));
            }
            let update = SubscriptionUpdate {
                current_period_end: period_end(data.current_period_end)?,
                external_id: data.id,
                tier: data.tier,
                status: data.status,
                billing_customer_id: data.customer_id,
                billing_subscription_id: data.subscription_id,
                cancel_at_period_end: data.cancel_at_period_end,
            };
            users::update_subscription(pool, &update).await?;
            Ok("subscription updated")
        }
        other => {
            info!("Ignoring webhook event type {other}");
            Ok("ignored")
        }
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|_| ApiError::BadRequest("Malformed event data."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_event_data_parses() {
        let data: UserEventData = serde_json::from_value(json!({
            "id": "user_1",
            "email": "nora@example.com",
            "first_name": "Nora"
        }))
        .unwrap();
        assert_eq!(data.id, "user_1");
        assert_eq!(data.email.as_deref(), Some("nora@example.com"));
        assert_eq!(data.last_name, None);
    }

    #[test]
    fn profile_requires_valid_email() {
        let data: UserEventData =
            serde_json::from_value(json!({ "id": "user_1", "email": "bogus" })).unwrap();
        assert!(profile_from(data).is_err());

        let data: UserEventData = serde_json::from_value(json!({ "id": "user_1" })).unwrap();
        assert!(profile_from(data).is_err());
    }

    #[test]
    fn subscription_event_data_parses() {
        let data: SubscriptionEventData = serde_json::from_value(json!({
            "id": "user_1",
            "tier": "premium",
            "status": "active",
            "current_period_end": 1_717_200_000,
            "cancel_at_period_end": false
        }))
        .unwrap();
        assert_eq!(data.tier, "premium");
        assert_eq!(data.current_period_end, Some(1_717_200_000));
    }

    #[test]
    fn period_end_converts_unix_seconds() {
        let instant = period_end(Some(1_717_200_000)).unwrap().unwrap();
        assert_eq!(instant.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        assert_eq!(period_end(None).unwrap(), None);
    }

    #[test]
    fn secret_comparison_goes_through_digests() {
        assert!(secret_matches("whsec_1", "whsec_1"));
        assert!(!secret_matches("whsec_1", "whsec_2"));
        assert!(!secret_matches("whsec_", "whsec_1"));
        assert!(!secret_matches("", "whsec_1"));
    }

    #[test]
    fn event_envelope_parses() {
        let event: IdentityEvent = serde_json::from_value(json!({
            "type": "user.created",
            "data": { "id": "user_1", "email": "a@b.co" }
        }))
        .unwrap();
        assert_eq!(event.event_type, "user.created");
    }
}
