/// Column (task status) endpoints
///
/// # Endpoints
///
/// - `GET /v1/projects/:id/statuses` - Columns in order
/// - `POST /v1/projects/:id/statuses` - Append a column
/// - `PUT /v1/projects/:id/statuses/order` - Reorder columns
/// - `PATCH /v1/statuses/:id` - Rename
/// - `DELETE /v1/statuses/:id` - Delete an empty column
///
/// Every mutation requires ADMIN or the project owner and holds the project
/// row lock, so column positions stay dense (0..n-1).

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{trimmed, ApiJson, ApiPath},
    routes::{lock_project, visible_project},
};
use axum::{extract::State, http::StatusCode, Json};
use planboard_shared::{
    auth::{
        authorization::{self, ProjectScope},
        context::AuthContext,
    },
    models::{
        activity::{ActivityAction, ActivityEvent, NewActivity},
        project::Project,
        task_status::TaskStatus,
    },
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgConnection;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StatusNameRequest {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 60, message = "Name must be 1-60 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderStatusesRequest {
    /// Every column id of the project, in the new order
    pub status_ids: Vec<Uuid>,
}

fn status_not_found() -> ApiError {
    ApiError::NotFound("Status not found".to_string())
}

/// Loads a column and locks its project, checking the caller may manage it
async fn managed_status(
    conn: &mut PgConnection,
    id: Uuid,
    auth: &AuthContext,
) -> ApiResult<(TaskStatus, Project)> {
    let status = TaskStatus::find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(status_not_found)?;

    let project = Project::lock_visible(conn, status.project_id, ProjectScope::for_user(auth))
        .await?
        .ok_or_else(status_not_found)?;
    authorization::require_project_manager(auth, project.owner_id)?;

    Ok((status, project))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{id}/statuses",
    tag = "statuses",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Columns in order", body = Vec<TaskStatus>),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_statuses(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<TaskStatus>>> {
    let project = visible_project(&state.db, id, &auth).await?;

    Ok(Json(TaskStatus::list_for_project(&state.db, project.id).await?))
}

/// Appends a column at the end of the board
#[utoipa::path(
    post,
    path = "/v1/projects/{id}/statuses",
    tag = "statuses",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = StatusNameRequest,
    responses(
        (status = 201, description = "Column created", body = TaskStatus),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_status(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusNameRequest>,
) -> ApiResult<(StatusCode, Json<TaskStatus>)> {
    req.validate()?;

    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    let status = TaskStatus::append(&mut tx, project.id, &req.name).await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::StatusCreated, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "status_id": status.id, "name": status.name })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, status_id = %status.id, "Column created");

    Ok((StatusCode::CREATED, Json(status)))
}

#[utoipa::path(
    patch,
    path = "/v1/statuses/{id}",
    tag = "statuses",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Column id")),
    request_body = StatusNameRequest,
    responses(
        (status = 200, description = "Column renamed", body = TaskStatus),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown column", body = crate::error::ErrorResponse)
    )
)]
pub async fn rename_status(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusNameRequest>,
) -> ApiResult<Json<TaskStatus>> {
    req.validate()?;

    let mut tx = state.db.begin().await?;

    let (previous, project) = managed_status(&mut tx, id, &auth).await?;
    let status = TaskStatus::rename(&mut *tx, id, &req.name)
        .await?
        .ok_or_else(status_not_found)?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::StatusUpdated, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "status_id": id, "from": previous.name, "to": status.name })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, status_id = %id, "Column renamed");

    Ok(Json(status))
}

/// Deletes an empty column; the project's last column cannot be deleted
#[utoipa::path(
    delete,
    path = "/v1/statuses/{id}",
    tag = "statuses",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Column id")),
    responses(
        (status = 204, description = "Column deleted"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown column", body = crate::error::ErrorResponse),
        (status = 409, description = "Column holds tasks or is the last one", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_status(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;

    let (status, project) = managed_status(&mut tx, id, &auth).await?;
    TaskStatus::delete(&mut tx, &status).await??;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::StatusDeleted, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "status_id": id, "name": status.name })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, status_id = %id, "Column deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Sets each column's order to its index in `status_ids`
///
/// `status_ids` must list every column of the project exactly once.
#[utoipa::path(
    put,
    path = "/v1/projects/{id}/statuses/order",
    tag = "statuses",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ReorderStatusesRequest,
    responses(
        (status = 200, description = "Columns in their new order", body = Vec<TaskStatus>),
        (status = 400, description = "Not a permutation of the project's columns", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn reorder_statuses(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReorderStatusesRequest>,
) -> ApiResult<Json<Vec<TaskStatus>>> {
    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    let statuses = TaskStatus::reorder(&mut tx, project.id, &req.status_ids).await??;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::StatusesReordered, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "status_ids": req.status_ids })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, "Columns reordered");

    Ok(Json(statuses))
}
