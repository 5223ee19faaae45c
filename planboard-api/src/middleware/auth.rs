/// JWT authentication middleware
///
/// Extracts and validates the bearer token from the `Authorization` header,
/// reloads the user so soft-deleted accounts are rejected and role changes
/// take effect immediately, then injects an [`AuthContext`] into the request
/// extensions.
///
/// # Errors
///
/// - 401 Unauthorized: missing header, invalid or expired token, deleted user
/// - 400 Bad Request: header present but not `Bearer <token>`

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use planboard_shared::auth::{
    context::{AuthContext, AuthError},
    jwt,
};
use planboard_shared::models::user::User;

/// Returns the raw token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Authorization header is not valid ASCII".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let claims = jwt::validate_access_token(token, state.jwt_secret())?;

    let user = User::find_active_by_id(&state.db, claims.sub)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %claims.sub, "Failed to load user for token");
            AuthError::DatabaseError(e.to_string())
        })?
        .ok_or_else(|| {
            tracing::debug!(user_id = %claims.sub, "Token presented for missing or deleted user");
            AuthError::InactiveUser
        })?;

    req.extensions_mut().insert(AuthContext::from_user(&user));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token_extracted() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_wrong_scheme() {
        assert!(matches!(
            bearer_token(&headers("Basic dXNlcjpwYXNz")),
            Err(AuthError::InvalidFormat(_))
        ));
        assert!(matches!(
            bearer_token(&headers("Bearer ")),
            Err(AuthError::InvalidFormat(_))
        ));
    }
}
