/// Dashboard and report endpoints
///
/// # Endpoints
///
/// - `GET /v1/dashboard` - Counts and recent activity for the caller
/// - `GET /v1/reports/projects` - Per-project statistics
/// - `GET /v1/reports/projects/:id` - Breakdown for one project
/// - `GET /v1/reports/activity` - Events per UTC day
///
/// All figures are limited to projects visible to the caller.

use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiPath, ApiQuery},
    routes::{page_request, visible_project},
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use planboard_shared::{
    auth::{authorization::ProjectScope, context::AuthContext},
    models::{
        project::{ProjectFilter, ProjectStatus},
        report::{self, ActivityRange, ActivityReport, Dashboard, ProjectReport, ProjectStats},
    },
    pagination::Page,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectStatsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityReportQuery {
    /// Defaults to 30 days before `to`
    pub from: Option<DateTime<Utc>>,
    /// Defaults to now
    pub to: Option<DateTime<Utc>>,
    pub project_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/v1/dashboard",
    tag = "reports",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Dashboard", body = Dashboard))
)]
pub async fn dashboard(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Dashboard>> {
    let dashboard = report::dashboard(&state.db, ProjectScope::for_user(&auth), auth.user_id).await?;

    Ok(Json(dashboard))
}

#[utoipa::path(
    get,
    path = "/v1/reports/projects",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ProjectStatsQuery),
    responses((status = 200, description = "Per-project statistics", body = Page<ProjectStats>))
)]
pub async fn project_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<ProjectStatsQuery>,
) -> ApiResult<Json<Page<ProjectStats>>> {
    let page = page_request(query.page, query.limit)?;
    let filter = ProjectFilter {
        status: query.status,
        search: None,
    };

    let (rows, total) = report::project_stats(&state.db, ProjectScope::for_user(&auth), &filter, page).await?;

    Ok(Json(Page::new(rows, page, total)))
}

#[utoipa::path(
    get,
    path = "/v1/reports/projects/{id}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project breakdown", body = ProjectReport),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn project_report(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ProjectReport>> {
    let project = visible_project(&state.db, id, &auth).await?;

    Ok(Json(report::project_report(&state.db, project.id).await?))
}

/// Events per UTC day, ascending, with empty days reported as zero
///
/// # Errors
///
/// - `400 Bad Request`: `from` after `to`, or a range over 366 days
/// - `404 Not Found`: `project_id` names a project the caller can't see
#[utoipa::path(
    get,
    path = "/v1/reports/activity",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ActivityReportQuery),
    responses(
        (status = 200, description = "Daily activity", body = ActivityReport),
        (status = 400, description = "Invalid range", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn activity_report(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<ActivityReportQuery>,
) -> ApiResult<Json<ActivityReport>> {
    let range = ActivityRange::resolve(query.from, query.to, Utc::now())?;

    if let Some(project_id) = query.project_id {
        visible_project(&state.db, project_id, &auth).await?;
    }

    let report =
        report::activity_report(&state.db, ProjectScope::for_user(&auth), range, query.project_id).await?;

    Ok(Json(report))
}
