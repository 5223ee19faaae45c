//! Shared helpers for router-level tests
//!
//! Routers built here use a lazy pool, so requests that never reach the
//! database (auth rejections, validation, rate limits) run without
//! PostgreSQL. Tests that need one are `#[ignore]`d and read
//! `DATABASE_URL`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use planboard_api::{
    app::{build_router, AppState},
    config::Config,
};
use planboard_shared::db::{
    migrations::run_migrations,
    pool::{create_lazy_pool, create_pool, DatabaseConfig},
};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-key-at-least-32-characters-long";

/// Test configuration; the auth rate limit is per router
pub fn test_config(database_url: &str, auth_per_minute: u32) -> Config {
    let url = database_url.to_string();
    Config::from_lookup(move |key| match key {
        "DATABASE_URL" => Some(url.clone()),
        "JWT_SECRET" => Some(TEST_SECRET.to_string()),
        "AUTH_RATE_LIMIT_PER_MINUTE" => Some(auth_per_minute.to_string()),
        _ => None,
    })
    .expect("test configuration is valid")
}

/// Router over a pool that never connects unless a handler needs it
///
/// Auth routes allow three requests per minute.
pub fn offline_app() -> Router {
    let config = test_config("postgresql://planboard@127.0.0.1:1/planboard_test", 3);
    let pool = create_lazy_pool(&DatabaseConfig::new(config.database.url.clone()))
        .expect("lazy pool builds without I/O");

    build_router(AppState::new(pool, config))
}

/// Router over a migrated database named by `DATABASE_URL`
pub async fn database_app() -> anyhow::Result<Router> {
    let url = std::env::var("DATABASE_URL")?;
    let config = test_config(&url, 1000);
    let pool = create_pool(DatabaseConfig::new(url)).await?;
    run_migrations(&pool).await?;

    Ok(build_router(AppState::new(pool, config)))
}

/// Sends a JSON request, optionally authenticated
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).expect("request builds"))
        .await
        .expect("router is infallible")
}

/// Reads the response body as JSON
pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable");

    serde_json::from_slice(&bytes).expect("body is JSON")
}
