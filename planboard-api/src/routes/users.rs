/// User endpoints
///
/// # Endpoints
///
/// - `GET /v1/users/me`, `PATCH /v1/users/me` - Own profile
/// - `POST /v1/users/me/password` - Change own password
/// - `GET /v1/users` - List users (admin)
/// - `GET /v1/users/:id` - Get user (admin)
/// - `PATCH /v1/users/:id/role` - Change role (admin, not self)
/// - `DELETE /v1/users/:id` - Soft delete (admin, not self)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{trimmed_opt, ApiJson, ApiPath, ApiQuery},
    routes::page_request,
};
use axum::{extract::State, http::StatusCode, Json};
use planboard_shared::{
    auth::{authorization, context::AuthContext, password},
    models::{
        activity::{ActivityAction, ActivityEvent, NewActivity},
        user::{UpdateProfile, User, UserFilter, UserResponse, UserRole},
    },
    pagination::Page,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

/// Query parameters for the user listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Page size, 1-100
    pub limit: Option<u32>,
    /// Case-insensitive match on email or name
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Own profile", body = UserResponse))
)]
pub async fn get_me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<UserResponse>> {
    let user = User::find_active_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(Json(user.into()))
}

/// Updates own name and/or email
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `409 Conflict`: Email already in use
#[utoipa::path(
    patch,
    path = "/v1/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<UserResponse>> {
    req.validate()?;

    let changes = UpdateProfile {
        name: req.name,
        email: req.email,
    };

    let user = if changes.is_empty() {
        User::find_active_by_id(&state.db, auth.user_id).await?
    } else {
        User::update_profile(&state.db, auth.user_id, changes).await?
    }
    .ok_or_else(user_not_found)?;

    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(Json(user.into()))
}

/// Changes own password after verifying the current one
///
/// # Errors
///
/// - `400 Bad Request`: New password too weak
/// - `401 Unauthorized`: Current password is wrong
#[utoipa::path(
    post,
    path = "/v1/users/me/password",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Weak password", body = crate::error::ErrorResponse),
        (status = 401, description = "Current password is wrong", body = crate::error::ErrorResponse)
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    req.validate()?;

    let user = User::find_active_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(user_not_found)?;

    if !password::verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
    }

    password::validate_password_strength(&req.new_password)
        .map_err(|message| ApiError::invalid_field("new_password", message))?;

    let hash = password::hash_password(&req.new_password)?;
    if !User::update_password(&state.db, user.id, &hash).await? {
        return Err(user_not_found());
    }

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

/// Lists active users (admin only)
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users", body = Page<UserResponse>),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> ApiResult<Json<Page<UserResponse>>> {
    authorization::require_admin(&auth)?;
    let page = page_request(query.page, query.limit)?;

    let filter = UserFilter {
        search: query.search,
        role: query.role,
    };
    let (users, total) = User::list(&state.db, &filter, page).await?;

    Ok(Json(Page::new(users, page, total).map(UserResponse::from)))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or deleted user", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    authorization::require_admin(&auth)?;

    let user = User::find_active_by_id(&state.db, id)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(Json(user.into()))
}

/// Changes a user's role (admin only, not on oneself)
#[utoipa::path(
    patch,
    path = "/v1/users/{id}/role",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Own role", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or deleted user", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> ApiResult<Json<UserResponse>> {
    authorization::require_admin(&auth)?;
    authorization::forbid_self(&auth, id, "Admins cannot change their own role")?;

    let mut tx = state.db.begin().await?;

    let previous = User::find_active_by_id(&mut *tx, id)
        .await?
        .ok_or_else(user_not_found)?;
    let user = User::set_role(&mut *tx, id, req.role)
        .await?
        .ok_or_else(user_not_found)?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::UserRoleChanged, Some(auth.user_id))
            .metadata(json!({ "target_user_id": id, "from": previous.role, "to": user.role })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %auth.user_id,
        target_user_id = %id,
        role = user.role.as_str(),
        "User role changed"
    );

    Ok(Json(user.into()))
}

/// Soft deletes a user (admin only, not oneself)
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Own account", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or already deleted user", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    authorization::require_admin(&auth)?;
    authorization::forbid_self(&auth, id, "Admins cannot delete their own account")?;

    let mut tx = state.db.begin().await?;

    if !User::soft_delete(&mut *tx, id).await? {
        return Err(user_not_found());
    }

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::UserDeleted, Some(auth.user_id))
            .metadata(json!({ "target_user_id": id })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, target_user_id = %id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_profile_name_rejected() {
        let req: UpdateProfileRequest = serde_json::from_str(r#"{"name": "  "}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProfileRequest = serde_json::from_str(r#"{"email": "ada@example.com"}"#).unwrap();
        assert_eq!(req.name, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_profile_request_validation() {
        let req: UpdateProfileRequest = serde_json::from_str(r#"{"name": ""}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProfileRequest = serde_json::from_str(r#"{"email": "nope"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProfileRequest = serde_json::from_str("{}").unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_role_request_rejects_unknown_role() {
        assert!(serde_json::from_str::<UpdateRoleRequest>(r#"{"role": "OWNER"}"#).is_err());
        let req: UpdateRoleRequest = serde_json::from_str(r#"{"role": "MAINTAINER"}"#).unwrap();
        assert_eq!(req.role, UserRole::Maintainer);
    }
}
