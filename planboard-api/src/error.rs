/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `ApiResult<T>`; library errors convert with `?`.
///
/// Every error body has the same shape:
///
/// ```json
/// { "error": "validation_error", "message": "Request validation failed",
///   "details": [{ "field": "email", "message": "must be a valid email" }] }
/// ```

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use planboard_shared::auth::{
    authorization::AuthzError, context::AuthError, jwt::JwtError, password::PasswordError,
};
use planboard_shared::models::report::RangeError;
use planboard_shared::models::task_status::DeleteStatusError;
use planboard_shared::ordering::OrderingError;
use planboard_shared::pagination::PageError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found (404), also used for resources outside the caller's scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (409), e.g. duplicate email or non-empty column
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Field validation failures (400)
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// Well-formed request referencing something unusable (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Too many requests (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Service unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Field-level validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::Unprocessable(_) => "unprocessable_entity",
            ApiError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.code().to_string();
        let mut retry_after = None;

        let (message, details) = match self {
            ApiError::ValidationError(errors) => ("Request validation failed".to_string(), Some(errors)),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %msg, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
            ApiError::RateLimitExceeded {
                retry_after: seconds,
                message,
            } => {
                retry_after = Some(seconds);
                (message, None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::ServiceUnavailable(msg) => (msg, None),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error,
                message,
                details,
            }),
        )
            .into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                match db_err.code().as_deref() {
                    // unique_violation
                    Some("23505") => {
                        let constraint = db_err.constraint().unwrap_or_default();
                        if constraint.contains("email") {
                            ApiError::Conflict("Email already exists".to_string())
                        } else if constraint == "project_members_pkey" {
                            ApiError::Conflict("User is already a member of this project".to_string())
                        } else {
                            ApiError::Conflict(format!("Constraint violation: {}", constraint))
                        }
                    }
                    // foreign_key_violation
                    Some("23503") => {
                        ApiError::Unprocessable("Referenced resource does not exist".to_string())
                    }
                    _ => ApiError::InternalError(format!("Database error: {}", db_err)),
                }
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is busy, try again later".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert validator errors to API errors, one detail per failed rule
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("is invalid ({})", e.code));
                    ValidationErrorDetail::new(field.to_string(), message)
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(details)
    }
}

impl From<PageError> for ApiError {
    fn from(err: PageError) -> Self {
        ApiError::invalid_field(err.field(), err.to_string())
    }
}

impl From<OrderingError> for ApiError {
    fn from(err: OrderingError) -> Self {
        ApiError::invalid_field("status_ids", err.to_string())
    }
}

impl From<RangeError> for ApiError {
    fn from(err: RangeError) -> Self {
        ApiError::invalid_field("from", err.to_string())
    }
}

impl From<DeleteStatusError> for ApiError {
    fn from(err: DeleteStatusError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

/// Convert authentication errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::DatabaseError(msg) => ApiError::InternalError(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::SelfModification(msg) => ApiError::BadRequest(msg.to_string()),
            other => ApiError::Forbidden(other.to_string()),
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::InternalError(format!("Token creation failed: {}", msg)),
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");

        let err = ApiError::invalid_field("name", "Name must be 1-120 characters");
        assert_eq!(err.to_string(), "Validation failed: 1 errors");

        let err = ApiError::RateLimitExceeded {
            retry_after: 5,
            message: "Slow down".to_string(),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded: Slow down");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::invalid_field("a", "b").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unprocessable("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: 12,
            message: "slow down".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }

    #[test]
    fn test_authz_mapping() {
        assert_eq!(
            ApiError::from(AuthzError::NotProjectManager).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthzError::SelfModification("no")).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_jwt_mapping() {
        assert_eq!(ApiError::from(JwtError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(JwtError::CreateError("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_page_error_names_field() {
        match ApiError::from(PageError::InvalidLimit) {
            ApiError::ValidationError(details) => assert_eq!(details[0].field, "limit"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(email(message = "must be a valid email"))]
        email: String,
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
    }

    #[test]
    fn test_validator_errors_become_details() {
        let probe = Probe {
            email: "nope".to_string(),
            name: String::new(),
        };
        let err = ApiError::from(probe.validate().unwrap_err());

        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(
                    details,
                    vec![
                        ValidationErrorDetail::new("email", "must be a valid email"),
                        ValidationErrorDetail::new("name", "must not be empty"),
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
