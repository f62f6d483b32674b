//! Integration tests for the HTTP API.
//!
//! Drives the axum router in-process with `tower::ServiceExt::oneshot`,
//! backed by fresh in-memory collections for every test.
//!
//! Verification command: `cargo test --test http_api`

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use taskroo_server::api::{self, AppState};
use tower::ServiceExt;

// =============================================================================
// Helpers
// =============================================================================

const OWNER: &str = "u1";

fn app() -> Router {
    api::router(Arc::new(AppState::in_memory("x-owner-id").unwrap()))
}

struct Reply {
    status: StatusCode,
    location: Option<String>,
    body: Value,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        location,
        body,
    }
}

async fn create_task(app: &Router, body: Value) -> String {
    let reply = send(app, Method::POST, "/tasks", Some(OWNER), Some(body)).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body["id"].as_str().unwrap().to_string()
}

async fn list_tasks(app: &Router, query: &str) -> Vec<Value> {
    let reply = send(app, Method::GET, &format!("/tasks{query}"), Some(OWNER), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.body.as_array().unwrap().clone()
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn missing_owner_header_is_unauthorized() {
    let app = app();

    let reply = send(&app, Method::GET, "/tasks", None, None).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(reply.body["error"].is_string());
}

#[tokio::test]
async fn owners_only_list_their_own_tasks() {
    let app = app();
    create_task(&app, json!({ "title": "mine" })).await;

    let reply = send(&app, Method::GET, "/tasks", Some("u2"), None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!([]));
}

// =============================================================================
// Tasks
// =============================================================================

#[tokio::test]
async fn created_task_is_listed_as_root() {
    let app = app();

    let reply = send(
        &app,
        Method::POST,
        "/tasks",
        Some(OWNER),
        Some(json!({ "title": "A", "description": "first" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.body["id"].as_str().unwrap().to_string();
    assert_eq!(reply.location.as_deref(), Some(format!("tasks/{id}").as_str()));
    assert_eq!(reply.body["title"], "A");
    assert!(reply.body["createdDate"].is_string());
    assert!(reply.body.get("ownerId").is_none());

    let tasks = list_tasks(&app, "").await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], id.as_str());
    assert_eq!(tasks[0]["subtasks"], json!([]));
}

#[tokio::test]
async fn create_with_inline_subtasks_is_bad_request() {
    let app = app();

    let reply = send(
        &app,
        Method::POST,
        "/tasks",
        Some(OWNER),
        Some(json!({ "title": "A", "subtasks": [{ "title": "B" }] })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(list_tasks(&app, "").await.is_empty());
}

#[tokio::test]
async fn create_with_unknown_tag_is_bad_request() {
    let app = app();

    let reply = send(
        &app,
        Method::POST,
        "/tasks",
        Some(OWNER),
        Some(json!({ "title": "A", "tags": [{ "name": "nope" }] })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subtask_moves_and_promotion_reshape_the_forest() {
    let app = app();
    let t1 = create_task(&app, json!({ "title": "T1" })).await;
    let t2 = create_task(&app, json!({ "title": "T2" })).await;

    let reply = send(
        &app,
        Method::POST,
        &format!("/tasks/{t1}/subtasks/{t2}"),
        Some(OWNER),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["id"], t1.as_str());
    assert_eq!(reply.body["subtasks"][0]["id"], t2.as_str());

    let tasks = list_tasks(&app, "").await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["subtasks"].as_array().unwrap().len(), 1);

    let reply = send(&app, Method::POST, &format!("/tasks/{t2}"), Some(OWNER), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["id"], t2.as_str());
    assert_eq!(list_tasks(&app, "").await.len(), 2);
}

#[tokio::test]
async fn cyclic_subtask_is_bad_request() {
    let app = app();
    let t1 = create_task(&app, json!({ "title": "T1" })).await;
    let t2 = create_task(&app, json!({ "title": "T2" })).await;
    send(&app, Method::POST, &format!("/tasks/{t1}/subtasks/{t2}"), Some(OWNER), None).await;

    let reply = send(
        &app,
        Method::POST,
        &format!("/tasks/{t2}/subtasks/{t1}"),
        Some(OWNER),
        None,
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let app = app();
    let t1 = create_task(&app, json!({ "title": "T1" })).await;
    let absent = create_task(&app, json!({ "title": "gone" })).await;
    send(&app, Method::DELETE, &format!("/tasks/{absent}"), Some(OWNER), None).await;

    for uri in [
        format!("/tasks/{t1}/subtasks/{absent}"),
        format!("/tasks/{t1}/subtasks/not-an-id"),
        "/tasks/not-an-id".to_string(),
    ] {
        let reply = send(&app, Method::POST, &uri, Some(OWNER), None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn update_replaces_fields() {
    let app = app();
    let id = create_task(&app, json!({ "title": "draft" })).await;

    let reply = send(
        &app,
        Method::PUT,
        &format!("/tasks/{id}"),
        Some(OWNER),
        Some(json!({ "title": "final", "finished": true, "closedDate": "2026-01-02T03:04:05Z" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["title"], "final");
    assert_eq!(reply.body["finished"], true);

    let missing = send(
        &app,
        Method::PUT,
        "/tasks/not-an-id",
        Some(OWNER),
        Some(json!({ "title": "x" })),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_subtree() {
    let app = app();
    let t1 = create_task(&app, json!({ "title": "T1" })).await;
    let t2 = create_task(&app, json!({ "title": "T2" })).await;
    send(&app, Method::POST, &format!("/tasks/{t1}/subtasks/{t2}"), Some(OWNER), None).await;

    let reply = send(&app, Method::DELETE, &format!("/tasks/{t1}"), Some(OWNER), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(list_tasks(&app, "").await.is_empty());

    let again = send(&app, Method::DELETE, &format!("/tasks/{t1}"), Some(OWNER), None).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finished_filter_selects_open_or_closed_window() {
    let app = app();
    create_task(&app, json!({ "title": "open" })).await;
    create_task(
        &app,
        json!({ "title": "january", "finished": true, "closedDate": "2026-01-15T00:00:00Z" }),
    )
    .await;
    create_task(
        &app,
        json!({ "title": "march", "finished": true, "closedDate": "2026-03-15T00:00:00Z" }),
    )
    .await;

    let open = list_tasks(&app, "?finished=false").await;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["title"], "open");

    let closed = list_tasks(
        &app,
        "?finished=true&closedDateAfter=2026-01-01T00:00:00Z&closedDateBefore=2026-02-01T00:00:00Z",
    )
    .await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0]["title"], "january");

    assert_eq!(list_tasks(&app, "?finished=true").await.len(), 2);
}

// =============================================================================
// Tags
// =============================================================================

#[tokio::test]
async fn tag_lifecycle() {
    let app = app();

    let created = send(
        &app,
        Method::POST,
        "/tags",
        Some(OWNER),
        Some(json!({ "name": "work", "color": "#ff8800" })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_str().unwrap().to_string();
    assert_eq!(created.location.as_deref(), Some(format!("tags/{id}").as_str()));

    let again = send(&app, Method::POST, "/tags", Some(OWNER), Some(json!({ "name": "work" }))).await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["id"], id.as_str());

    create_task(&app, json!({ "title": "A", "tags": [{ "name": "work" }] })).await;
    create_task(
        &app,
        json!({ "title": "B", "finished": true, "tags": [{ "name": "work" }] }),
    )
    .await;

    let listed = send(&app, Method::GET, "/tags", Some(OWNER), None).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body[0]["name"], "work");
    assert_eq!(listed.body[0]["size"], 1);

    let renamed = send(
        &app,
        Method::PUT,
        &format!("/tags/{id}"),
        Some(OWNER),
        Some(json!({ "name": "office", "visibleInWorkView": true })),
    )
    .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["name"], "office");
    assert_eq!(renamed.body["visibleInWorkView"], true);

    let deleted = send(&app, Method::DELETE, &format!("/tags/{id}"), Some(OWNER), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let tasks = list_tasks(&app, "").await;
    assert!(tasks.iter().all(|t| t["tags"] == json!([])));

    let gone = send(&app, Method::DELETE, &format!("/tags/{id}"), Some(OWNER), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn renaming_onto_existing_tag_is_bad_request() {
    let app = app();
    send(&app, Method::POST, "/tags", Some(OWNER), Some(json!({ "name": "a" }))).await;
    let b = send(&app, Method::POST, "/tags", Some(OWNER), Some(json!({ "name": "b" }))).await;
    let b_id = b.body["id"].as_str().unwrap();

    let reply = send(
        &app,
        Method::PUT,
        &format!("/tags/{b_id}"),
        Some(OWNER),
        Some(json!({ "name": "a" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Server startup
// =============================================================================

#[tokio::test]
async fn server_binds_to_ephemeral_port() {
    let state = Arc::new(AppState::in_memory("x-owner-id").unwrap());

    let (addr, handle) = api::start_server_with_state("127.0.0.1:0", state)
        .await
        .unwrap();

    assert_ne!(addr.port(), 0);
    handle.abort();
}
