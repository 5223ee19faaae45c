/// Task (card) endpoints
///
/// # Endpoints
///
/// - `POST /v1/projects/:id/tasks` - Create, appended to its column
/// - `GET /v1/projects/:id/tasks` - List by column order, then card order
/// - `GET /v1/tasks/:id` - Get
/// - `PATCH /v1/tasks/:id` - Update title, description or assignee
/// - `DELETE /v1/tasks/:id` - Delete (ADMIN or project owner)
/// - `POST /v1/tasks/:id/move` - Move within or across columns
///
/// Anyone who can see a project may create, edit and move its tasks.
/// Assignees must be the project owner or a member.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{nullable, trimmed, trimmed_opt, ApiJson, ApiPath, ApiQuery},
    routes::{lock_project, page_request, visible_project},
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
        task::{CreateTask, Task, TaskFilter, UpdateTask},
        task_status::TaskStatus,
    },
    pagination::Page,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgConnection;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const MAX_DESCRIPTION: usize = 10_000;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTaskRequest {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    /// Column to create the task in; defaults to the first column
    pub status_id: Option<Uuid>,

    pub assignee_id: Option<Uuid>,
}

/// Partial update; `description: null` clears, `assignee_id: null` unassigns
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTaskRequest {
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>)]
    pub assignee_id: Option<Option<Uuid>>,
}

impl UpdateTaskRequest {
    fn check_description(&self) -> ApiResult<()> {
        match &self.description {
            Some(Some(text)) if text.chars().count() > MAX_DESCRIPTION => Err(ApiError::invalid_field(
                "description",
                "Description must be at most 10000 characters",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveTaskRequest {
    /// Destination column, in the same project
    pub status_id: Uuid,

    /// Destination position, clamped into the column
    pub order: i32,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTasksQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    /// Case-insensitive match on title or description
    pub search: Option<String>,
}

fn task_not_found() -> ApiError {
    ApiError::NotFound("Task not found".to_string())
}

/// Column `status_id` must exist and belong to `project_id`
async fn column_in_project(conn: &mut PgConnection, project_id: Uuid, status_id: Uuid) -> ApiResult<TaskStatus> {
    TaskStatus::find_by_id(conn, status_id)
        .await?
        .filter(|status| status.project_id == project_id)
        .ok_or_else(|| ApiError::Unprocessable("Status does not belong to this project".to_string()))
}

async fn check_assignee(conn: &mut PgConnection, project_id: Uuid, assignee_id: Uuid) -> ApiResult<()> {
    if Project::is_participant(conn, project_id, assignee_id).await? {
        Ok(())
    } else {
        Err(ApiError::Unprocessable(
            "Assignee must be the project owner or a project member".to_string(),
        ))
    }
}

/// Loads a visible task and locks its project for the rest of the transaction
async fn lock_task(conn: &mut PgConnection, id: Uuid, auth: &AuthContext) -> ApiResult<(Task, Project)> {
    let task = Task::find_visible(&mut *conn, id, ProjectScope::for_user(auth))
        .await?
        .ok_or_else(task_not_found)?;
    let project = lock_project(conn, task.project_id, auth).await?;

    Ok((task, project))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{id}/tasks",
    tag = "tasks",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse),
        (status = 422, description = "Column or assignee not valid for this project", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    req.validate()?;

    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, id, &auth).await?;

    let status = match req.status_id {
        Some(status_id) => column_in_project(&mut tx, project.id, status_id).await?,
        None => TaskStatus::first_for_project(&mut *tx, project.id)
            .await?
            .ok_or_else(|| ApiError::Unprocessable("Project has no columns".to_string()))?,
    };

    if let Some(assignee_id) = req.assignee_id {
        check_assignee(&mut tx, project.id, assignee_id).await?;
    }

    let task = Task::create(
        &mut tx,
        CreateTask {
            project_id: project.id,
            status_id: status.id,
            assignee_id: req.assignee_id,
            created_by: auth.user_id,
            title: req.title,
            description: req.description,
        },
    )
    .await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::TaskCreated, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "task_id": task.id, "title": task.title, "status_id": status.id })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, task_id = %task.id, "Task created");

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{id}/tasks",
    tag = "tasks",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id"), ListTasksQuery),
    responses(
        (status = 200, description = "Page of tasks", body = Page<Task>),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListTasksQuery>,
) -> ApiResult<Json<Page<Task>>> {
    let page = page_request(query.page, query.limit)?;
    let project = visible_project(&state.db, id, &auth).await?;

    let filter = TaskFilter {
        status_id: query.status_id,
        assignee_id: query.assignee_id,
        search: query.search,
    };
    let (tasks, total) = Task::list(&state.db, project.id, &filter, page).await?;

    Ok(Json(Page::new(tasks, page, total)))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = Task::find_visible(&state.db, id, ProjectScope::for_user(&auth))
        .await?
        .ok_or_else(task_not_found)?;

    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse),
        (status = 422, description = "Assignee not in project", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    req.validate()?;
    req.check_description()?;

    let mut tx = state.db.begin().await?;

    let (task, project) = lock_task(&mut tx, id, &auth).await?;

    if let Some(Some(assignee_id)) = req.assignee_id {
        check_assignee(&mut tx, project.id, assignee_id).await?;
    }

    let changes = UpdateTask {
        title: req.title,
        description: req.description,
        assignee_id: req.assignee_id,
    };
    if changes.is_empty() {
        return Ok(Json(task));
    }

    let changed: Vec<&str> = [
        ("title", changes.title.is_some()),
        ("description", changes.description.is_some()),
        ("assignee_id", changes.assignee_id.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, present)| present.then_some(field))
    .collect();

    let updated = Task::update(&mut *tx, id, changes)
        .await?
        .ok_or_else(task_not_found)?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::TaskUpdated, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({
                "task_id": id,
                "fields": changed,
                "assignee_id": updated.assignee_id,
            })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, task_id = %id, "Task updated");

    Ok(Json(updated))
}

/// Deletes a task and closes the gap in its column (ADMIN or project owner)
#[utoipa::path(
    delete,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Not the project owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;

    let (task, project) = lock_task(&mut tx, id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    if !Task::delete(&mut tx, id).await? {
        return Err(task_not_found());
    }

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::TaskDeleted, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "task_id": id, "title": task.title })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, task_id = %id, "Task deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Moves a task to `order` in column `status_id`
///
/// Cards in the source and destination columns shift so both stay dense.
#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/move",
    tag = "tasks",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = MoveTaskRequest,
    responses(
        (status = 200, description = "Moved task", body = Task),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse),
        (status = 422, description = "Column belongs to another project", body = crate::error::ErrorResponse)
    )
)]
pub async fn move_task(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<MoveTaskRequest>,
) -> ApiResult<Json<Task>> {
    let mut tx = state.db.begin().await?;

    let (_, project) = lock_task(&mut tx, id, &auth).await?;
    let target = column_in_project(&mut tx, project.id, req.status_id).await?;

    let (task, from) = Task::move_to(&mut tx, id, target.id, req.order).await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::TaskMoved, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({
                "task_id": id,
                "from_status_id": from.status_id,
                "from_order": from.position,
                "to_status_id": task.status_id,
                "to_order": task.position,
            })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %auth.user_id,
        project_id = %project.id,
        task_id = %id,
        status_id = %task.status_id,
        order = task.position,
        "Task moved"
    );

    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_task_title_rejected() {
        let req: CreateTaskRequest = serde_json::from_str(r#"{"title": " \t "}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateTaskRequest = serde_json::from_str(r#"{"title": "   "}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateTaskRequest = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(req.title, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_request_nullable_fields() {
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(req.assignee_id, Some(None));
        assert_eq!(req.description, None);

        let req: UpdateTaskRequest = serde_json::from_str(r#"{"title": "Ship it"}"#).unwrap();
        assert_eq!(req.assignee_id, None);
    }

    #[test]
    fn test_description_limit() {
        let req = UpdateTaskRequest {
            description: Some(Some("x".repeat(MAX_DESCRIPTION + 1))),
            ..Default::default()
        };
        assert!(req.check_description().is_err());

        let req = CreateTaskRequest {
            title: "t".to_string(),
            description: Some("x".repeat(MAX_DESCRIPTION + 1)),
            status_id: None,
            assignee_id: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_title_required() {
        let req = CreateTaskRequest {
            title: String::new(),
            description: None,
            status_id: None,
            assignee_id: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_move_request_uses_order_field() {
        let id = Uuid::new_v4();
        let req: MoveTaskRequest =
            serde_json::from_str(&format!(r#"{{"status_id": "{}", "order": 2}}"#, id)).unwrap();
        assert_eq!(req.status_id, id);
        assert_eq!(req.order, 2);
    }
}
