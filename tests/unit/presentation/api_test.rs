// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::memory_queue;
use axum::http::StatusCode;
use axum_test::TestServer;
use content_tasks::domain::repositories::task_repository::CancelOutcome;
use content_tasks::domain::services::task_status_service::TaskStatusService;
use content_tasks::presentation::handlers::task_handler::CancelResponse;
use content_tasks::presentation::routes;
use content_tasks::queue::client::{QueueTaskClient, TaskClient};
use content_tasks::queue::task_queue::TaskQueue;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

fn test_server() -> (TestServer, Arc<dyn TaskQueue>) {
    let (repo, queue) = memory_queue();
    let client: Arc<dyn TaskClient> = Arc::new(QueueTaskClient::new(queue.clone()));
    let status_service = Arc::new(TaskStatusService::new(repo));
    let server = TestServer::new(routes::routes(client, status_service)).unwrap();
    (server, queue)
}

async fn enqueue_snapshot(server: &TestServer, org_id: &str) -> Uuid {
    let response = server
        .post(&format!("/api/v1/repositories/{}/snapshot", Uuid::new_v4()))
        .add_header("X-Org-Id", org_id.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    body["task_id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health_and_version() {
    let (server, _queue) = test_server();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "OK");

    let response = server.get("/api/v1/version").await;
    assert_eq!(response.text(), env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_org_header_is_rejected() {
    let (server, _queue) = test_server();

    let response = server.get("/api/v1/tasks").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_snapshot_with_templates_enqueues_dependents() {
    let (server, queue) = test_server();
    let repository_uuid = Uuid::new_v4();
    let template_uuid = Uuid::new_v4();

    let response = server
        .post(&format!("/api/v1/repositories/{}/snapshot", repository_uuid))
        .add_header("X-Org-Id", "org-1")
        .add_header("X-Account-Id", "acct-1")
        .add_header("X-Request-Id", "req-42")
        .json(&json!({ "template_uuids": [template_uuid] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: Value = response.json();
    let snapshot_id: Uuid = body["task_id"].as_str().unwrap().parse().unwrap();
    let dependent_id: Uuid = body["dependent_task_ids"][0].as_str().unwrap().parse().unwrap();

    let dependent = queue.fetch(dependent_id).await.unwrap().unwrap();
    assert_eq!(dependent.type_name, "update-template-distributions");
    assert_eq!(dependent.depends_on, Some(snapshot_id));
    assert_eq!(dependent.payload["template_uuid"], json!(template_uuid));

    let response = server
        .get(&format!("/api/v1/tasks/{}", snapshot_id))
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let detail: Value = response.json();
    assert_eq!(detail["type_name"], "snapshot");
    assert_eq!(detail["status"], "pending");
    assert_eq!(detail["account_id"], "acct-1");
    assert_eq!(detail["correlation_id"], "req-42");
    assert_eq!(detail["dependents"], json!([dependent_id]));
}

#[tokio::test]
async fn test_task_of_other_org_is_not_found() {
    let (server, _queue) = test_server();
    let id = enqueue_snapshot(&server, "org-1").await;

    let response = server
        .get(&format!("/api/v1/tasks/{}", id))
        .add_header("X-Org-Id", "org-2")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .post(&format!("/api/v1/tasks/{}/cancel", id))
        .add_header("X-Org-Id", "org-2")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_by_status_and_type() {
    let (server, _queue) = test_server();
    enqueue_snapshot(&server, "org-1").await;
    enqueue_snapshot(&server, "org-1").await;
    enqueue_snapshot(&server, "org-2").await;

    let response = server
        .delete(&format!("/api/v1/repositories/{}/snapshots", Uuid::new_v4()))
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let response = server
        .get("/api/v1/tasks")
        .add_query_param("status", "pending")
        .add_query_param("type", "snapshot")
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let page: Value = response.json();
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 100);
    assert!(page["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .all(|task| task["type_name"] == "snapshot" && task["org_id"] == "org-1"));
}

#[tokio::test]
async fn test_list_rejects_bad_filters() {
    let (server, _queue) = test_server();

    let response = server
        .get("/api/v1/tasks")
        .add_query_param("limit", 5000)
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/tasks")
        .add_query_param("status", "sleeping")
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_pending_then_conflict() {
    let (server, _queue) = test_server();
    let id = enqueue_snapshot(&server, "org-1").await;

    let response = server
        .post(&format!("/api/v1/tasks/{}/cancel", id))
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["outcome"], "canceled");

    let response = server
        .post(&format!("/api/v1/tasks/{}/cancel", id))
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_running_is_requested() {
    let (server, queue) = test_server();
    let id = enqueue_snapshot(&server, "org-1").await;
    queue.claim(&["snapshot".to_string()]).await.unwrap().unwrap();

    let response = server
        .post(&format!("/api/v1/tasks/{}/cancel", id))
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: CancelResponse = response.json();
    assert_eq!(body.id, id);
    assert_eq!(body.outcome, CancelOutcome::Requested);

    let task = queue.fetch(id).await.unwrap().unwrap();
    assert!(task.cancel_requested);
}

#[tokio::test]
async fn test_task_detail_hides_lease() {
    let (server, queue) = test_server();
    let id = enqueue_snapshot(&server, "org-1").await;
    queue.claim(&["snapshot".to_string()]).await.unwrap().unwrap();

    let detail: Value = server
        .get(&format!("/api/v1/tasks/{}", id))
        .add_header("X-Org-Id", "org-1")
        .await
        .json();
    assert_eq!(detail["status"], "running");
    assert!(detail.get("lease_token").is_none());
    assert!(detail.get("lease_expires_at").is_none());

    let page: Value = server
        .get("/api/v1/tasks")
        .add_header("X-Org-Id", "org-1")
        .await
        .json();
    assert!(page["tasks"][0].get("lease_token").is_none());
}

#[tokio::test]
async fn test_admin_list_spans_orgs() {
    let (server, _queue) = test_server();
    enqueue_snapshot(&server, "org-1").await;
    enqueue_snapshot(&server, "org-2").await;

    let page: Value = server.get("/api/v1/admin/tasks").await.json();
    assert_eq!(page["total"], 2);

    let page: Value = server
        .get("/api/v1/admin/tasks")
        .add_query_param("org_id", "org-2")
        .await
        .json();
    assert_eq!(page["total"], 1);
    assert_eq!(page["tasks"][0]["org_id"], "org-2");
}

#[tokio::test]
async fn test_introspect_requires_valid_url() {
    let (server, queue) = test_server();
    let repository_uuid = Uuid::new_v4();

    let response = server
        .post(&format!("/api/v1/repositories/{}/introspect", repository_uuid))
        .add_header("X-Org-Id", "org-1")
        .json(&json!({ "url": "not a url" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .post(&format!("/api/v1/repositories/{}/introspect", repository_uuid))
        .add_header("X-Org-Id", "org-1")
        .json(&json!({ "url": "https://cdn.example.com/repo/el9/" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: Value = response.json();
    let id: Uuid = body["task_id"].as_str().unwrap().parse().unwrap();
    let task = queue.fetch(id).await.unwrap().unwrap();
    assert_eq!(task.type_name, "introspect");
    assert_eq!(task.resource.unwrap().uuid, repository_uuid);
}

#[tokio::test]
async fn test_delete_template_without_body() {
    let (server, queue) = test_server();
    let template_uuid = Uuid::new_v4();

    let response = server
        .delete(&format!("/api/v1/templates/{}", template_uuid))
        .add_header("X-Org-Id", "org-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: Value = response.json();
    let id: Uuid = body["task_id"].as_str().unwrap().parse().unwrap();
    let task = queue.fetch(id).await.unwrap().unwrap();
    assert_eq!(task.type_name, "delete-templates");
    assert_eq!(task.payload["repository_config_uuids"], json!([]));
}
