/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register new user
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for an access token
/// - `GET /v1/auth/me` - Current user
///
/// The first account ever registered becomes ADMIN; every later account
/// starts as MEMBER.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{trimmed, ApiJson},
};
use axum::{extract::State, http::StatusCode, Json};
use planboard_shared::{
    auth::{
        context::AuthContext,
        jwt::{self, TokenPair, TokenType},
        password,
    },
    models::{
        activity::{ActivityAction, ActivityEvent, NewActivity},
        user::{CreateUser, User, UserResponse},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Register request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// At least 8 characters with upper, lower, digit and special character
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Returned by register and login
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Refresh token response
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Register a new user
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed or weak password
/// - `409 Conflict`: Email already in use by an active account
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse),
        (status = 429, description = "Too many requests", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    password::validate_password_strength(&req.password)
        .map_err(|message| ApiError::invalid_field("password", message))?;

    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;

    let role = User::registration_role(&mut tx).await?;
    let user = User::create(
        &mut *tx,
        CreateUser {
            email: req.email,
            password_hash,
            name: req.name,
            role,
        },
    )
    .await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::UserRegistered, Some(user.id))
            .metadata(json!({ "email": user.email, "role": user.role })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User registered");

    let tokens = jwt::issue_token_pair(user.id, user.role, state.jwt_secret(), &state.token_ttl())?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            tokens,
        }),
    ))
}

/// Login endpoint
///
/// Unknown email, wrong password and deleted accounts all answer with the
/// same 401.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 429, description = "Too many requests", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let user = User::find_active_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    User::update_last_login(&state.db, user.id).await?;

    let tokens = jwt::issue_token_pair(user.id, user.role, state.jwt_secret(), &state.token_ttl())?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

/// Token refresh endpoint
///
/// The user must still be active; the new token carries their current role.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = crate::error::ErrorResponse)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    req.validate()?;

    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_active_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account is no longer active".to_string()))?;

    let ttl = state.token_ttl();
    let access_token = jwt::issue_token(user.id, user.role, TokenType::Access, state.jwt_secret(), &ttl)?;

    Ok(Json(RefreshResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: ttl.access.num_seconds(),
    }))
}

/// Current user
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<UserResponse>> {
    let user = User::find_active_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account is no longer active".to_string()))?;

    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_registration_name_rejected() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"email": "ada@example.com", "password": "Str0ng!Pass", "name": "   "}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            email: "ada@example.com".to_string(),
            password: "Str0ng!pass".to_string(),
            name: "Ada".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            name: String::new(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("name"));
    }

    #[test]
    fn test_auth_response_flattens_tokens() {
        let response = AuthResponse {
            user: UserResponse {
                id: uuid::Uuid::new_v4(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                role: planboard_shared::models::user::UserRole::Member,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                last_login_at: None,
            },
            tokens: TokenPair {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
            },
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["access_token"], "a");
        assert_eq!(value["refresh_token"], "r");
        assert_eq!(value["user"]["role"], "MEMBER");
        assert!(value["user"].get("password_hash").is_none());
    }
}
