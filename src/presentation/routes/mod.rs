// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::task_repository::TaskRepository;
use crate::domain::services::task_status_service::TaskStatusService;
use crate::presentation::handlers::{content_handler, task_handler};
use crate::queue::client::TaskClient;
use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 创建应用路由
///
/// # 参数
///
/// * `client` - 生产者客户端，用于入队与取消
/// * `status_service` - 任务状态查询服务
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes<R: TaskRepository + 'static>(
    client: Arc<dyn TaskClient>,
    status_service: Arc<TaskStatusService<R>>,
) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/version", get(version));

    let task_routes = Router::new()
        .route("/api/v1/tasks", get(task_handler::list_tasks::<R>))
        .route("/api/v1/tasks/{id}", get(task_handler::get_task::<R>))
        .route(
            "/api/v1/tasks/{id}/cancel",
            post(task_handler::cancel_task::<R>),
        )
        .route(
            "/api/v1/admin/tasks",
            get(task_handler::admin_list_tasks::<R>),
        );

    let content_routes = Router::new()
        .route(
            "/api/v1/repositories/{uuid}/snapshot",
            post(content_handler::snapshot_repository),
        )
        .route(
            "/api/v1/repositories/{uuid}/introspect",
            post(content_handler::introspect_repository),
        )
        .route(
            "/api/v1/repositories/{uuid}/snapshots",
            delete(content_handler::delete_repository_snapshots),
        )
        .route(
            "/api/v1/templates/{uuid}",
            delete(content_handler::delete_template),
        );

    Router::new()
        .merge(public_routes)
        .merge(task_routes)
        .merge(content_routes)
        .layer(Extension(client))
        .layer(Extension(status_service))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
