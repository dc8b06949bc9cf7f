//! HTTP surface: router, middleware stack and server entry point.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::{delete, get, post, put},
    Extension, Router,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, warn, Span};
use ulid::Ulid;

use crate::auth::AuthService;

pub mod handlers;
pub mod openapi;

const CONNECT_ATTEMPTS: u32 = 3;

/// Build the application router around a shared pool and coordinator.
#[must_use]
pub fn router(pool: PgPool, auth: Arc<AuthService>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/register", post(handlers::auth::register))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/complete", post(handlers::auth::complete))
        .route(
            "/v1/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/v1/auth/logout", post(handlers::auth::logout))
        .route(
            "/v1/devices/register",
            post(handlers::devices::register_device),
        )
        .route("/v1/devices/verify", post(handlers::devices::verify_device))
        .route(
            "/v1/accounts/:account_id/devices",
            get(handlers::devices::list_devices),
        )
        .route(
            "/v1/accounts/:account_id/devices/:device_id",
            delete(handlers::devices::remove_device),
        )
        .route(
            "/v1/challenges",
            post(handlers::challenges::create_challenge),
        )
        .route(
            "/v1/challenges/:challenge_id",
            put(handlers::challenges::approve_challenge)
                .get(handlers::challenges::challenge_status),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth))
                .layer(Extension(pool)),
        )
}

/// Connect to the store and run the HTTP server until shutdown.
///
/// # Errors
/// Returns an error when the store stays unreachable, migrations fail or the
/// listener cannot bind.
pub async fn serve(port: u16, dsn: &str, session_ttl: i64) -> Result<()> {
    let pool = connect_with_retry(dsn).await?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let auth = Arc::new(AuthService::new(pool.clone(), session_ttl));
    let app = router(pool, auth);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    info!("listening on [::]:{port}");

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn connect_with_retry(dsn: &str) -> Result<PgPool> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await;

        match result {
            Ok(pool) => return Ok(pool),
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, "database connection failed: {err}");
                tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
            }
            Err(err) => {
                return Err(err).context("failed to connect to database");
            }
        }
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, request_id)
}
