/// The authenticated caller
///
/// The API's authentication layer validates the bearer token, reloads the
/// user and inserts an [`AuthContext`] into the request extensions. Handlers
/// then take `auth: AuthContext` as an argument.
///
/// # Example
///
/// ```no_run
/// use planboard_shared::auth::context::AuthContext;
///
/// async fn handler(auth: AuthContext) -> String {
///     format!("user {} ({})", auth.user_id, auth.role.as_str())
/// }
/// ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::user::{User, UserRole};

/// Identity and role of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    /// Context for a freshly loaded user row
    pub fn from_user(user: &User) -> Self {
        Self::new(user.id, user.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Authentication failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Account is no longer active")]
    InactiveUser,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            AuthError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::DatabaseError(msg) => {
                tracing::error!(error = %msg, "Authentication lookup failed");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let code = if status == StatusCode::BAD_REQUEST {
            "bad_request"
        } else if status == StatusCode::UNAUTHORIZED {
            "unauthorized"
        } else {
            "internal_error"
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or(AuthError::MissingCredentials)
    }
}
