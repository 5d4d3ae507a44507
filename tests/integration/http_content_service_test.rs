// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use content_tasks::domain::services::content_service::{
    ContentError, ContentService, RemoteTaskState,
};
use content_tasks::infrastructure::services::http_content_service::HttpContentService;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer) -> HttpContentService {
    HttpContentService::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_start_snapshot_returns_task_href() {
    let server = MockServer::start().await;
    let repository_uuid = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!(
            "/api/content/v1/repositories/{}/sync",
            repository_uuid
        )))
        .and(header("X-Org-Id", "org-1"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "task_href": "/api/tasks/7/" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let href = service(&server)
        .start_snapshot("org-1", repository_uuid)
        .await
        .unwrap();
    assert_eq!(href, "/api/tasks/7/");
}

#[tokio::test]
async fn test_remote_task_states() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tasks/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "running" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/2/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "state": "failed", "error": "checksum mismatch" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/3/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let service = service(&server);
    assert_eq!(
        service.remote_task("/api/tasks/1/").await.unwrap(),
        RemoteTaskState::Running
    );
    assert_eq!(
        service.remote_task("/api/tasks/2/").await.unwrap(),
        RemoteTaskState::Failed {
            error: "checksum mismatch".to_string()
        }
    );
    assert!(matches!(
        service.remote_task("/api/tasks/3/").await,
        Err(ContentError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_missing_resource_maps_to_not_found() {
    let server = MockServer::start().await;
    let template_uuid = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!("/api/content/v1/templates/{}", template_uuid)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = service(&server).delete_template("org-1", template_uuid).await;
    assert_eq!(result, Err(ContentError::NotFound));
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    let repository_uuid = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!(
            "/api/content/v1/repositories/{}/snapshots",
            repository_uuid
        )))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = service(&server)
        .delete_repository_snapshots("org-1", repository_uuid)
        .await;
    assert_eq!(
        result,
        Err(ContentError::Status {
            status: 503,
            body: "maintenance".to_string()
        })
    );
}

#[tokio::test]
async fn test_update_template_distributions_sends_repositories() {
    let server = MockServer::start().await;
    let template_uuid = Uuid::new_v4();
    let repositories = vec![Uuid::new_v4(), Uuid::new_v4()];

    Mock::given(method("PUT"))
        .and(path(format!(
            "/api/content/v1/templates/{}/distributions",
            template_uuid
        )))
        .and(header("X-Org-Id", "org-1"))
        .and(body_json(json!({ "repository_uuids": repositories })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    service(&server)
        .update_template_distributions("org-1", template_uuid, &repositories)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_introspect_posts_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/content/v1/repositories/introspect"))
        .and(body_json(json!({ "url": "https://cdn.example.com/repo/el9/" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    service(&server)
        .introspect("https://cdn.example.com/repo/el9/")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_service_is_request_error() {
    let service = HttpContentService::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    assert!(matches!(
        service.introspect("https://cdn.example.com/repo/").await,
        Err(ContentError::Request(_))
    ));
}

#[tokio::test]
async fn test_delete_template_distribution_targets_repository() {
    let server = MockServer::start().await;
    let template_uuid = Uuid::new_v4();
    let present = Uuid::new_v4();
    let missing = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!(
            "/api/content/v1/templates/{}/distributions/{}",
            template_uuid, present
        )))
        .and(header("X-Org-Id", "org-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!(
            "/api/content/v1/templates/{}/distributions/{}",
            template_uuid, missing
        )))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let content = service(&server);
    content
        .delete_template_distribution("org-1", template_uuid, present)
        .await
        .unwrap();
    assert_eq!(
        content
            .delete_template_distribution("org-1", template_uuid, missing)
            .await,
        Err(ContentError::NotFound)
    );
}
