/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use planboard_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = planboard_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        auth::jwt_auth_layer,
        rate_limit::{auth_rate_limit_layer, user_rate_limit_layer, RateLimiter},
        security::SecurityHeadersLayer,
    },
    openapi, routes,
};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
    Router,
};
use planboard_shared::auth::jwt::TokenTtl;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Per-user limiter for authenticated routes
    pub user_limiter: Arc<RateLimiter>,

    /// Per-IP limiter for `/v1/auth/*`
    pub auth_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let user_limiter = Arc::new(RateLimiter::new(config.rate_limit.per_minute));
        let auth_limiter = Arc::new(RateLimiter::new(config.rate_limit.auth_per_minute));

        Self {
            db,
            config: Arc::new(config),
            user_limiter,
            auth_limiter,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn token_ttl(&self) -> TokenTtl {
        self.config.jwt.token_ttl()
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health                         # public
/// ├── GET /openapi.json                   # public
/// └── /v1/
///     ├── /auth/register|login|refresh    # public, per-IP rate limit
///     ├── /auth/me
///     ├── /users, /users/me, /users/:id
///     ├── /projects, /projects/:id
///     │   ├── /members, /members/:user_id
///     │   ├── /statuses, /statuses/order
///     │   ├── /tasks
///     │   └── /activity
///     ├── /statuses/:id
///     ├── /tasks/:id, /tasks/:id/move
///     ├── /activity
///     ├── /dashboard
///     └── /reports/projects, /reports/projects/:id, /reports/activity
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication, then rate limiting (per-route basis)
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/openapi.json", get(openapi::openapi_json));

    let auth_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route_layer(from_fn_with_state(state.clone(), auth_rate_limit_layer));

    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        // Users
        .route("/users", get(routes::users::list_users))
        .route(
            "/users/me",
            get(routes::users::get_me).patch(routes::users::update_me),
        )
        .route("/users/me/password", post(routes::users::change_password))
        .route(
            "/users/:id",
            get(routes::users::get_user).delete(routes::users::delete_user),
        )
        .route("/users/:id/role", patch(routes::users::update_role))
        // Projects
        .route(
            "/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/projects/:id",
            get(routes::projects::get_project)
                .patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/projects/:id/members",
            get(routes::projects::list_members).post(routes::projects::add_member),
        )
        .route(
            "/projects/:id/members/:user_id",
            axum::routing::delete(routes::projects::remove_member),
        )
        // Columns
        .route(
            "/projects/:id/statuses",
            get(routes::statuses::list_statuses).post(routes::statuses::create_status),
        )
        .route("/projects/:id/statuses/order", put(routes::statuses::reorder_statuses))
        .route(
            "/statuses/:id",
            patch(routes::statuses::rename_status).delete(routes::statuses::delete_status),
        )
        // Tasks
        .route(
            "/projects/:id/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/tasks/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/tasks/:id/move", post(routes::tasks::move_task))
        // Activity and reports
        .route("/activity", get(routes::activity::list_activity))
        .route("/projects/:id/activity", get(routes::activity::list_project_activity))
        .route("/dashboard", get(routes::reports::dashboard))
        .route("/reports/projects", get(routes::reports::project_stats))
        .route("/reports/projects/:id", get(routes::reports::project_report))
        .route("/reports/activity", get(routes::reports::activity_report))
        .route_layer(from_fn_with_state(state.clone(), user_rate_limit_layer))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new().merge(auth_routes).merge(protected_routes);

    Router::new()
        .merge(public_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Permissive when the origin list contains `*`, otherwise an explicit allow-list
fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_allows_any() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
