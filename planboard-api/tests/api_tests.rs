//! Router-level tests
//!
//! The first group runs without a database. Tests marked `#[ignore]` need
//! PostgreSQL at `DATABASE_URL`:
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/planboard_test cargo test -p planboard-api -- --ignored
//! ```

mod common;

use axum::http::{header, Request, StatusCode};
use axum::body::Body;
use common::{database_app, json_body, offline_app, send};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = offline_app();

    let response = send(&app, "GET", "/v1/projects", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let app = offline_app();

    let response = send(&app, "GET", "/v1/auth/me", Some("not.a.jwt"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = offline_app();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = offline_app();

    let response = send(
        &app,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({ "email": "not-an-email", "password": "short", "name": "" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation_error");

    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|detail| detail["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
}

#[tokio::test]
async fn test_auth_routes_rate_limited() {
    let app = offline_app();
    let invalid = json!({ "email": "nope", "password": "x" });

    for _ in 0..3 {
        let response = send(&app, "POST", "/v1/auth/login", None, Some(invalid.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let response = send(&app, "POST", "/v1/auth/login", None, Some(invalid)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let body = json_body(response).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
}

#[tokio::test]
async fn test_rate_limit_keyed_by_forwarded_address() {
    let app = offline_app();
    let invalid = json!({ "email": "nope", "password": "x" });

    for _ in 0..3 {
        send(&app, "POST", "/v1/auth/login", None, Some(invalid.clone())).await;
    }

    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::from(invalid.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = offline_app();

    let response = send(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["info"]["title"], "Planboard API");
    assert!(body["paths"]["/v1/projects/{id}/tasks"].is_object());
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = offline_app();

    let response = send(&app, "GET", "/v1/projects", None, None).await;
    let headers = response.headers();

    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = offline_app();

    let response = send(&app, "GET", "/v1/nothing-here", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Registers a fresh account and returns (user id, access token)
async fn register(app: &axum::Router, name: &str) -> (String, String) {
    let response = send(
        app,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({
            "email": format!("{}-{}@example.com", name, Uuid::new_v4()),
            "password": "Correct-Horse-9",
            "name": name,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["access_token"].as_str().unwrap().to_string(),
    )
}

async fn set_role(user_id: &str, role: &str) {
    let pool = sqlx::PgPool::connect(&std::env::var("DATABASE_URL").unwrap())
        .await
        .unwrap();
    sqlx::query("UPDATE users SET role = $1::user_role WHERE id = $2")
        .bind(role)
        .bind(Uuid::parse_str(user_id).unwrap())
        .execute(&pool)
        .await
        .unwrap();
}

/// Registers an account and gives it `role`; the auth layer reloads the role per request
async fn register_as(app: &axum::Router, name: &str, role: &str) -> (String, String) {
    let (id, token) = register(app, name).await;
    set_role(&id, role).await;
    (id, token)
}

async fn create_project(app: &axum::Router, token: &str, name: &str) -> String {
    let response = send(app, "POST", "/v1/projects", Some(token), Some(json!({ "name": name }))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_register_login_refresh() {
    let app = database_app().await.unwrap();
    let email = format!("flow-{}@example.com", Uuid::new_v4());

    let response = send(
        &app,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({ "email": email, "password": "Correct-Horse-9", "name": "Flow" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(
        &app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "wrong-password-1A" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "Correct-Horse-9" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let login = json_body(response).await;

    let response = send(
        &app,
        "POST",
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": login["refresh_token"] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = json_body(response).await;

    let token = refreshed["access_token"].as_str().unwrap();
    let response = send(&app, "GET", "/v1/auth/me", Some(token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["email"], email.as_str());
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_board_flow() {
    let app = database_app().await.unwrap();
    let (_, owner) = register_as(&app, "owner", "MAINTAINER").await;
    let (member_id, member) = register_as(&app, "member", "MEMBER").await;
    let project_id = create_project(&app, &owner, "Launch").await;

    // Not visible to a non-member
    let response = send(&app, "GET", &format!("/v1/projects/{}", project_id), Some(&member), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        "POST",
        &format!("/v1/projects/{}/members", project_id),
        Some(&owner),
        Some(json!({ "user_id": member_id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, "GET", &format!("/v1/projects/{}", project_id), Some(&member), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = json_body(response).await;
    let statuses = detail["statuses"].as_array().unwrap();
    assert_eq!(statuses.len(), 3);
    let done = statuses[2]["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        "POST",
        &format!("/v1/projects/{}/tasks", project_id),
        Some(&member),
        Some(json!({ "title": "Write changelog", "assignee_id": member_id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let task = json_body(response).await;
    assert_eq!(task["status_id"], statuses[0]["id"]);
    assert_eq!(task["order"], 0);
    let task_id = task["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        "POST",
        &format!("/v1/tasks/{}/move", task_id),
        Some(&member),
        Some(json!({ "status_id": done, "order": 7 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let moved = json_body(response).await;
    assert_eq!(moved["status_id"], done.as_str());
    assert_eq!(moved["order"], 0);

    // Members can't delete tasks
    let response = send(&app, "DELETE", &format!("/v1/tasks/{}", task_id), Some(&member), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A column holding tasks can't be deleted
    let response = send(&app, "DELETE", &format!("/v1/statuses/{}", done), Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &app,
        "GET",
        &format!("/v1/projects/{}/activity", project_id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let activity = json_body(response).await;
    assert_eq!(activity["data"][0]["action"], "TASK_MOVED");

    let response = send(&app, "GET", &format!("/v1/reports/projects/{}", project_id), Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_removing_member_unassigns_their_tasks() {
    let app = database_app().await.unwrap();
    let (_, owner) = register_as(&app, "owner", "MAINTAINER").await;
    let (member_id, member) = register_as(&app, "member", "MEMBER").await;
    let project_id = create_project(&app, &owner, "Cleanup").await;
    let other_project = create_project(&app, &owner, "Elsewhere").await;

    for project in [&project_id, &other_project] {
        let response = send(
            &app,
            "POST",
            &format!("/v1/projects/{}/members", project),
            Some(&owner),
            Some(json!({ "user_id": member_id })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let mut task_ids = Vec::new();
    for project in [&project_id, &other_project] {
        let response = send(
            &app,
            "POST",
            &format!("/v1/projects/{}/tasks", project),
            Some(&owner),
            Some(json!({ "title": "Triage inbox", "assignee_id": member_id })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        task_ids.push(json_body(response).await["id"].as_str().unwrap().to_string());
    }

    let uri = format!("/v1/projects/{}/members/{}", project_id, member_id);
    let response = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, "GET", &format!("/v1/tasks/{}", task_ids[0]), Some(&owner), None).await;
    assert!(json_body(response).await["assignee_id"].is_null());

    // Membership elsewhere is untouched
    let response = send(&app, "GET", &format!("/v1/tasks/{}", task_ids[1]), Some(&member), None).await;
    assert_eq!(json_body(response).await["assignee_id"], member_id.as_str());

    // The project is no longer visible to the removed member
    let response = send(&app, "GET", &format!("/v1/projects/{}", project_id), Some(&member), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_ownership_transfer_rules() {
    let app = database_app().await.unwrap();
    let (_, admin) = register_as(&app, "admin", "ADMIN").await;
    let (_, owner) = register_as(&app, "owner", "MAINTAINER").await;
    let (successor_id, successor) = register_as(&app, "successor", "MAINTAINER").await;
    let (member_id, _) = register_as(&app, "member", "MEMBER").await;
    let project_id = create_project(&app, &owner, "Handover").await;
    let uri = format!("/v1/projects/{}", project_id);

    // Owners may edit their project but not give it away
    let response = send(&app, "PATCH", &uri, Some(&owner), Some(json!({ "owner_id": successor_id }))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "PATCH", &uri, Some(&admin), Some(json!({ "owner_id": member_id }))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(&app, "PATCH", &uri, Some(&admin), Some(json!({ "owner_id": Uuid::new_v4() }))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(&app, "PATCH", &uri, Some(&admin), Some(json!({ "owner_id": successor_id }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["owner_id"], successor_id.as_str());

    let response = send(&app, "GET", &uri, Some(&successor), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    // MAINTAINER visibility follows ownership
    let response = send(&app, "GET", &uri, Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
