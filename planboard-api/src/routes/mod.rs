/// API route handlers
///
/// Handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login, token refresh, current user
/// - `users`: Profile, password and admin user management
/// - `projects`: Projects and their members
/// - `statuses`: Kanban columns
/// - `tasks`: Cards, including moves between columns
/// - `activity`: Activity feed
/// - `reports`: Dashboard and aggregate reports
///
/// Every mutation records its activity event in the same transaction.

pub mod activity;
pub mod auth;
pub mod health;
pub mod projects;
pub mod reports;
pub mod statuses;
pub mod tasks;
pub mod users;

use crate::error::{ApiError, ApiResult};
use planboard_shared::{
    auth::{authorization::ProjectScope, context::AuthContext},
    models::project::Project,
    pagination::PageRequest,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

pub(crate) fn project_not_found() -> ApiError {
    ApiError::NotFound("Project not found".to_string())
}

/// Loads a project the caller can see; invisible and missing both give 404
pub(crate) async fn visible_project(db: &PgPool, id: Uuid, auth: &AuthContext) -> ApiResult<Project> {
    Project::find_visible(db, id, ProjectScope::for_user(auth))
        .await?
        .ok_or_else(project_not_found)
}

/// Like [`visible_project`] but holds the row lock until the transaction ends
///
/// Column and card mutations take this lock first so concurrent reorders of
/// the same project serialize.
pub(crate) async fn lock_project(conn: &mut PgConnection, id: Uuid, auth: &AuthContext) -> ApiResult<Project> {
    Project::lock_visible(conn, id, ProjectScope::for_user(auth))
        .await?
        .ok_or_else(project_not_found)
}

pub(crate) fn page_request(page: Option<u32>, limit: Option<u32>) -> ApiResult<PageRequest> {
    Ok(PageRequest::from_query(page, limit)?)
}
