/// Project endpoints
///
/// # Endpoints
///
/// - `POST /v1/projects` - Create (ADMIN, MAINTAINER)
/// - `GET /v1/projects` - List visible projects
/// - `GET /v1/projects/:id` - Project with its columns
/// - `PATCH /v1/projects/:id` - Update (ADMIN or owner)
/// - `DELETE /v1/projects/:id` - Soft delete (ADMIN or owner)
/// - `GET /v1/projects/:id/members` - List members
/// - `POST /v1/projects/:id/members` - Add member (ADMIN or owner)
/// - `DELETE /v1/projects/:id/members/:user_id` - Remove member (ADMIN or owner)
///
/// Projects outside the caller's scope answer 404, the same as missing ones.

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
        project::{CreateProject, Project, ProjectFilter, ProjectStatus, UpdateProject},
        project_member::ProjectMember,
        task::Task,
        task_status::TaskStatus,
        user::User,
    },
    pagination::Page,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

/// Partial update; `description: null` clears the description
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectRequest {
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,

    pub status: Option<ProjectStatus>,

    /// New owner (ADMIN only); must be an active ADMIN or MAINTAINER
    pub owner_id: Option<Uuid>,
}

impl UpdateProjectRequest {
    fn check_description(&self) -> ApiResult<()> {
        match &self.description {
            Some(Some(text)) if text.chars().count() > 2000 => Err(ApiError::invalid_field(
                "description",
                "Description must be at most 2000 characters",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListProjectsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ProjectStatus>,
    /// Case-insensitive match on name or description
    pub search: Option<String>,
}

/// A project together with its columns in order
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub statuses: Vec<TaskStatus>,
}

#[derive(Debug, Deserialize)]
pub struct MemberPath {
    pub id: Uuid,
    pub user_id: Uuid,
}

/// Creates a project owned by the caller with "To Do", "In Progress" and "Done" columns
#[utoipa::path(
    post,
    path = "/v1/projects",
    tag = "projects",
    security(("bearer_auth" = [])),
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectDetail),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 403, description = "Members cannot create projects", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectDetail>)> {
    authorization::require_project_creator(&auth)?;
    req.validate()?;

    let mut tx = state.db.begin().await?;

    let (project, statuses) = Project::create(
        &mut tx,
        auth.user_id,
        CreateProject {
            name: req.name,
            description: req.description,
        },
    )
    .await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::ProjectCreated, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "name": project.name })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project.id, "Project created");

    Ok((StatusCode::CREATED, Json(ProjectDetail { project, statuses })))
}

/// Lists projects visible to the caller, newest first
#[utoipa::path(
    get,
    path = "/v1/projects",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(ListProjectsQuery),
    responses((status = 200, description = "Page of projects", body = Page<Project>))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<ListProjectsQuery>,
) -> ApiResult<Json<Page<Project>>> {
    let page = page_request(query.page, query.limit)?;
    let filter = ProjectFilter {
        status: query.status,
        search: query.search,
    };

    let (projects, total) = Project::list(&state.db, ProjectScope::for_user(&auth), &filter, page).await?;

    Ok(Json(Page::new(projects, page, total)))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{id}",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project with columns", body = ProjectDetail),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ProjectDetail>> {
    let project = visible_project(&state.db, id, &auth).await?;
    let statuses = TaskStatus::list_for_project(&state.db, project.id).await?;

    Ok(Json(ProjectDetail { project, statuses }))
}

/// Updates a project (ADMIN or owner); only ADMIN may change the owner
#[utoipa::path(
    patch,
    path = "/v1/projects/{id}",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Updated project", body = Project),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse),
        (status = 422, description = "New owner cannot own projects", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    req.validate()?;
    req.check_description()?;

    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    if let Some(owner_id) = req.owner_id {
        if !auth.is_admin() {
            return Err(ApiError::Forbidden(
                "Only admins may transfer project ownership".to_string(),
            ));
        }

        let owner = User::find_active_by_id(&mut *tx, owner_id).await?;
        if !owner.is_some_and(|user| user.role.can_own_projects()) {
            return Err(ApiError::Unprocessable(
                "New owner must be an active ADMIN or MAINTAINER".to_string(),
            ));
        }
    }

    let changes = UpdateProject {
        name: req.name,
        description: req.description,
        status: req.status,
        owner_id: req.owner_id,
    };
    if changes.is_empty() {
        return Ok(Json(project));
    }

    let changed: Vec<&str> = [
        ("name", changes.name.is_some()),
        ("description", changes.description.is_some()),
        ("status", changes.status.is_some()),
        ("owner_id", changes.owner_id.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, present)| present.then_some(field))
    .collect();

    let updated = Project::update(&mut *tx, id, changes)
        .await?
        .ok_or_else(super::project_not_found)?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::ProjectUpdated, Some(auth.user_id))
            .project(id)
            .metadata(json!({
                "fields": changed,
                "status": updated.status,
                "owner_id": updated.owner_id,
            })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %id, fields = ?changed, "Project updated");

    Ok(Json(updated))
}

/// Soft deletes a project (ADMIN or owner)
#[utoipa::path(
    delete,
    path = "/v1/projects/{id}",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    if !Project::soft_delete(&mut *tx, id).await? {
        return Err(super::project_not_found());
    }

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::ProjectDeleted, Some(auth.user_id))
            .project(id)
            .metadata(json!({ "name": project.name })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %id, "Project deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/projects/{id}/members",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project members", body = Vec<ProjectMember>),
        (status = 404, description = "Unknown or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<ProjectMember>>> {
    let project = visible_project(&state.db, id, &auth).await?;

    Ok(Json(ProjectMember::list(&state.db, project.id).await?))
}

/// Adds a member (ADMIN or owner)
#[utoipa::path(
    post,
    path = "/v1/projects/{id}/members",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = ProjectMember),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown project or user", body = crate::error::ErrorResponse),
        (status = 409, description = "Already a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<ProjectMember>)> {
    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    let user = User::find_active_by_id(&mut *tx, req.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let joined_at = ProjectMember::add(&mut *tx, id, user.id).await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::MemberAdded, Some(auth.user_id))
            .project(id)
            .metadata(json!({ "member_id": user.id })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, project_id = %id, member_id = %user.id, "Member added");

    Ok((
        StatusCode::CREATED,
        Json(ProjectMember {
            project_id: id,
            user_id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            joined_at,
        }),
    ))
}

/// Removes a member and unassigns their tasks in the project (ADMIN or owner)
#[utoipa::path(
    delete,
    path = "/v1/projects/{id}/members/{user_id}",
    tag = "projects",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member's user id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown project or not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(path): ApiPath<MemberPath>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;

    let project = lock_project(&mut tx, path.id, &auth).await?;
    authorization::require_project_manager(&auth, project.owner_id)?;

    if !ProjectMember::remove(&mut *tx, project.id, path.user_id).await? {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }

    let unassigned = Task::unassign_user(&mut *tx, project.id, path.user_id).await?;

    ActivityEvent::record(
        &mut *tx,
        NewActivity::new(ActivityAction::MemberRemoved, Some(auth.user_id))
            .project(project.id)
            .metadata(json!({ "member_id": path.user_id, "unassigned_tasks": unassigned })),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %auth.user_id,
        project_id = %project.id,
        member_id = %path.user_id,
        unassigned,
        "Member removed"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_project_name_rejected() {
        let req: CreateProjectRequest = serde_json::from_str(r#"{"name": "   "}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProjectRequest = serde_json::from_str(r#"{"name": "\t \n"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: CreateProjectRequest = serde_json::from_str(r#"{"name": "  Roadmap "}"#).unwrap();
        assert_eq!(req.name, "Roadmap");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_request_distinguishes_null_description() {
        let req: UpdateProjectRequest = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(req.description, Some(None));

        let req: UpdateProjectRequest = serde_json::from_str(r#"{"name": "Renamed"}"#).unwrap();
        assert_eq!(req.description, None);
        assert_eq!(req.name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_update_request_limits() {
        let req = UpdateProjectRequest {
            description: Some(Some("x".repeat(2001))),
            ..Default::default()
        };
        assert!(req.check_description().is_err());

        let req = UpdateProjectRequest {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_limits() {
        let req = CreateProjectRequest {
            name: "x".repeat(121),
            description: None,
        };
        assert!(req.validate().is_err());

        let req = CreateProjectRequest {
            name: "Roadmap".to_string(),
            description: Some("Q3".to_string()),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_status_parses_uppercase() {
        let req: UpdateProjectRequest = serde_json::from_str(r#"{"status": "ARCHIVED"}"#).unwrap();
        assert_eq!(req.status, Some(ProjectStatus::Archived));
    }
}
