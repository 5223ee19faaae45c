/// Activity feed endpoints
///
/// - `GET /v1/activity` - Events visible to the caller, newest first
/// - `GET /v1/projects/:id/activity` - Events of one visible project
///
/// ADMIN sees every event, user-level ones included. Everyone else sees the
/// events of projects visible to them.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiPath, ApiQuery},
    routes::{page_request, visible_project},
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use planboard_shared::{
    auth::{authorization::ProjectScope, context::AuthContext},
    models::activity::{ActivityAction, ActivityEvent, ActivityFilter},
    pagination::Page,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Ignored on the per-project endpoint
    pub project_id: Option<Uuid>,
    /// Acting user
    pub user_id: Option<Uuid>,
    pub action: Option<ActivityAction>,
    /// Inclusive lower bound (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    pub to: Option<DateTime<Utc>>,
}

impl ActivityQuery {
    fn into_filter(self, project_id: Option<Uuid>) -> ApiResult<ActivityFilter> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ApiError::invalid_field("from", "from must not be after to"));
            }
        }

        Ok(ActivityFilter {
            project_id,
            user_id: self.user_id,
            action: self.action,
            from: self.from,
            to: self.to,
        })
    }
}

#[utoipa::path(
    get,
    path = "/v1/activity",
    tag = "activity",
    security(("bearer_auth" = [])),
    params(ActivityQuery),
    responses(
        (status = 200, description = "Page of events", body = Page<ActivityEvent>),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_activity(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> ApiResult<Json<Page<ActivityEvent>>> {
    let page = page_request(query.page, query.limit)?;
    let project_id = query.project_id;
    let filter = query.into_filter(project_id)?;

    let (events, total) =
        ActivityEvent::list(&state.db, ProjectScope::for_user(&auth), &filter, page).await?;

    Ok(Json(Page::new(events, page, total)))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{id}/activity",
    tag = "activity",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Project id"), ActivityQuery),
    responses(
        (status = 200, description = "Page of events", body = Page<ActivityEvent>),
        (status = 404, description = "Unknown or not visible project", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_project_activity(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> ApiResult<Json<Page<ActivityEvent>>> {
    let page = page_request(query.page, query.limit)?;
    let project = visible_project(&state.db, id, &auth).await?;
    let filter = query.into_filter(Some(project.id))?;

    let (events, total) =
        ActivityEvent::list(&state.db, ProjectScope::for_user(&auth), &filter, page).await?;

    Ok(Json(Page::new(events, page, total)))
}
