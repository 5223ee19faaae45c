/// OpenAPI document
///
/// Generated with `utoipa` from the handler annotations and served at
/// `GET /openapi.json`. Authenticated operations reference the
/// `bearer_auth` scheme (HTTP bearer, JWT).

use crate::routes;
use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "Planboard API", description = "Projects, Kanban boards, activity and reports"),
    paths(
        routes::health::health_check,
        routes::auth::register,
        routes::auth::login,
        routes::auth::refresh,
        routes::auth::me,
        routes::users::get_me,
        routes::users::update_me,
        routes::users::change_password,
        routes::users::list_users,
        routes::users::get_user,
        routes::users::update_role,
        routes::users::delete_user,
        routes::projects::create_project,
        routes::projects::list_projects,
        routes::projects::get_project,
        routes::projects::update_project,
        routes::projects::delete_project,
        routes::projects::list_members,
        routes::projects::add_member,
        routes::projects::remove_member,
        routes::statuses::list_statuses,
        routes::statuses::create_status,
        routes::statuses::rename_status,
        routes::statuses::delete_status,
        routes::statuses::reorder_statuses,
        routes::tasks::create_task,
        routes::tasks::list_tasks,
        routes::tasks::get_task,
        routes::tasks::update_task,
        routes::tasks::delete_task,
        routes::tasks::move_task,
        routes::activity::list_activity,
        routes::activity::list_project_activity,
        routes::reports::dashboard,
        routes::reports::project_stats,
        routes::reports::project_report,
        routes::reports::activity_report,
    ),
    components(schemas(crate::error::ErrorResponse, crate::error::ValidationErrorDetail)),
    modifiers(&BearerAuth),
    tags(
        (name = "health"),
        (name = "auth", description = "Registration, login and tokens"),
        (name = "users", description = "Profiles and user administration"),
        (name = "projects", description = "Projects and membership"),
        (name = "statuses", description = "Kanban columns"),
        (name = "tasks", description = "Kanban cards"),
        (name = "activity", description = "Activity feed"),
        (name = "reports", description = "Dashboard and reports")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// `GET /openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        assert!(paths.contains_key("/v1/auth/register"));
        assert!(paths.contains_key("/v1/projects/{id}/tasks"));
        assert!(paths.contains_key("/v1/tasks/{id}/move"));
        assert!(paths.contains_key("/v1/reports/activity"));
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(
            json["components"]["securitySchemes"]["bearer_auth"]["scheme"],
            "bearer"
        );
    }
}
