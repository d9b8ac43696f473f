use crate::{
    api::handlers::{
        bookmarks, exams, files, health, plans, questions, root, subjects, usage, users, webhooks,
    },
    cli::globals::GlobalArgs,
    clock::DayClock,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod openapi;

pub use openapi::ApiDoc;

pub const GIT_COMMIT_HASH: &str = crate::GIT_COMMIT_HASH;

/// Build the `/v1` router. Split out so tests can mount it against an
/// ephemeral database without binding a socket.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/v1/webhooks/identity", post(webhooks::identity_event))
        .route("/v1/me", get(users::get_me))
        .route("/v1/plans", get(plans::list_plans))
        .route("/v1/exams", get(exams::list_exams).post(exams::create_exam))
        .route("/v1/exams/:slug", get(exams::get_exam).patch(exams::update_exam))
        .route("/v1/exams/:slug/pin", post(exams::toggle_pin))
        .route(
            "/v1/exams/:slug/subjects",
            get(subjects::list_subjects).post(subjects::create_subject),
        )
        .route(
            "/v1/exams/:slug/subjects/:subject",
            get(subjects::get_subject)
                .patch(subjects::update_subject)
                .delete(subjects::delete_subject),
        )
        .route(
            "/v1/exams/:slug/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route("/v1/bookmarks", get(bookmarks::list_bookmarks))
        .route("/v1/bookmarks/toggle", post(bookmarks::toggle_bookmark))
        .route("/v1/files", get(files::list_files).post(files::create_file))
        .route("/v1/files/:id", delete(files::delete_file))
        .route("/v1/files/:id/viewed", post(files::mark_viewed))
        .route("/v1/usage/limits/:action", get(usage::check_daily_limit))
        .route("/v1/usage/increment", post(usage::increment_usage))
        .route("/v1/usage/features/:feature", get(usage::can_access_feature))
}

/// Start the server
///
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: GlobalArgs, day_clock: DayClock) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let origin = frontend_origin(&globals.frontend_origin)?;
    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-webhook-secret"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = router()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(globals))
                .layer(Extension(day_clock))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    crate::cli::telemetry::shutdown_tracer();

    Ok(())
}

/// Span for every HTTP request carrying the matched route and request id.
fn make_span(request: &Request<Body>) -> Span {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let matched = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| path.clone(), |m| m.as_str().to_string());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    info_span!("http.request", %method, path, matched, request_id)
}

/// Reduce the configured frontend URL to an exact CORS origin value.
fn frontend_origin(base_url: &str) -> Result<HeaderValue> {
    let url = Url::parse(base_url).context("invalid frontend origin")?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(anyhow!("frontend origin must be an http(s) URL"));
    }
    HeaderValue::from_str(&origin.ascii_serialization()).context("frontend origin is not a valid header value")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path() {
        let value = frontend_origin("https://app.prepdesk.dev/login?next=/home").unwrap();
        assert_eq!(value, "https://app.prepdesk.dev");
    }

    #[test]
    fn frontend_origin_keeps_port() {
        let value = frontend_origin("http://localhost:5173").unwrap();
        assert_eq!(value, "http://localhost:5173");
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
        assert!(frontend_origin("data:text/plain,nope").is_err());
    }
}
