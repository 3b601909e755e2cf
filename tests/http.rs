//! REST surface driven through the router with `oneshot`, backed by the in-process store.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use estate_crm::{app, prepare, AppState, Catalog, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> Router {
    let catalog = Catalog::standard().unwrap();
    let store = MemoryStore::new();
    prepare(&store, &catalog).await.unwrap();
    app(AppState::new(Arc::new(store), Arc::new(catalog)), 64 * 1024)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>, user: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(u) = user {
        req = req.header("X-User-ID", u);
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    // rejections produced by axum itself are plain text
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_and_ready() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn unit_lifecycle_over_http() {
    let app = test_app().await;
    let (status, created) = send(
        &app,
        Method::POST,
        "/api/v1/units",
        Some(json!({ "projectId": 7, "unitNumber": "U-001", "status": "available" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["unitNumber"], "U-001");
    assert_eq!(created["data"]["deletedAt"], Value::Null);

    let (_, listed) = send(&app, Method::GET, "/api/v1/units", None, None).await;
    assert_eq!(listed["meta"]["count"], 1);

    let (status, deleted) = send(&app, Method::DELETE, &format!("/api/v1/units/{id}"), None, Some("3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"]["deletedBy"], 3);

    let (_, listed) = send(&app, Method::GET, "/api/v1/units", None, None).await;
    assert_eq!(listed["meta"]["count"], 0);
    let (_, listed) = send(&app, Method::GET, "/api/v1/units?include=all", None, None).await;
    assert_eq!(listed["data"][0]["deletedBy"], 3);

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/units/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, &format!("/api/v1/units/{id}?include=archived"), None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, restored) = send(&app, Method::POST, &format!("/api/v1/units/{id}/restore"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["data"]["deletedBy"], Value::Null);
    let (status, err) = send(&app, Method::POST, &format!("/api/v1/units/{id}/restore"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["code"], "not_found");
    assert_eq!(err["error"]["details"]["id"], id);
}

#[tokio::test]
async fn filters_and_paging() {
    let app = test_app().await;
    for (project, number) in [(1, "A-101"), (1, "A-102"), (2, "B-201")] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/units",
            Some(json!({ "projectId": project, "unitNumber": number })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, body) = send(&app, Method::GET, "/api/v1/units?projectId=1", None, None).await;
    assert_eq!(body["meta"]["count"], 2);
    let (_, body) = send(&app, Method::GET, "/api/v1/units?q_unitNumber=b-2", None, None).await;
    assert_eq!(body["data"][0]["unitNumber"], "B-201");
    let (_, body) = send(&app, Method::GET, "/api/v1/units?limit=1&offset=1", None, None).await;
    assert_eq!(body["data"][0]["unitNumber"], "A-102");

    let (status, body) = send(&app, Method::GET, "/api/v1/units?color=red", None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn request_errors() {
    let app = test_app().await;
    let (status, _) = send(&app, Method::GET, "/api/v1/spaceships", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/api/v1/units/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::DELETE, "/api/v1/units/1", None, Some("someone")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(&app, Method::POST, "/api/v1/units", Some(json!({ "unitNumber": "X" })), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["message"].as_str().unwrap().contains("project_id"));
}

#[tokio::test]
async fn legacy_status_is_answered_canonically() {
    let app = test_app().await;
    let (_, created) = send(
        &app,
        Method::POST,
        "/api/v1/clients",
        Some(json!({ "name": "Marta", "status": "Activo" })),
        None,
    )
    .await;
    assert_eq!(created["data"]["status"], "active");
    let (_, listed) = send(&app, Method::GET, "/api/v1/clients?status=activo", None, None).await;
    assert_eq!(listed["meta"]["count"], 1);
}

#[tokio::test]
async fn dependents_and_deleted_by() {
    let app = test_app().await;
    let (_, user) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some(json!({ "name": "Rosa", "email": "rosa@example.com" })),
        None,
    )
    .await;
    let user_id = user["data"]["id"].as_i64().unwrap();
    let (_, project) = send(&app, Method::POST, "/api/v1/projects", Some(json!({ "name": "Mirador" })), None).await;
    let project_id = project["data"]["id"].as_i64().unwrap();
    send(
        &app,
        Method::POST,
        "/api/v1/units",
        Some(json!({ "projectId": project_id, "unitNumber": "M-1" })),
        None,
    )
    .await;

    let (status, deps) = send(&app, Method::GET, &format!("/api/v1/projects/{project_id}/dependents"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deps["data"][0]["entity"], "units");
    assert_eq!(deps["data"][0]["column"], "projectId");
    assert_eq!(deps["data"][0]["count"], 1);

    let uid = user_id.to_string();
    send(&app, Method::DELETE, &format!("/api/v1/projects/{project_id}"), None, Some(uid.as_str())).await;
    let (status, who) = send(&app, Method::GET, &format!("/api/v1/projects/{project_id}/deleted-by"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(who["data"]["email"], "rosa@example.com");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/users/{user_id}"), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let app = test_app().await;
    let big = "x".repeat(128 * 1024);
    let (status, _) = send(&app, Method::POST, "/api/v1/notes", Some(json!({ "body": big })), None).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
