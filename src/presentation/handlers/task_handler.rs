// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::task_query_request::{AdminTaskListQuery, TaskListQuery};
use crate::domain::repositories::task_repository::{CancelOutcome, TaskRepository};
use crate::domain::services::task_status_service::{TaskDetail, TaskPage, TaskStatusService};
use crate::presentation::errors::AppError;
use crate::presentation::extractors::identity::Identity;
use crate::queue::client::TaskClient;
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// 取消响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: Uuid,
    pub outcome: CancelOutcome,
}

/// 本组织的任务列表
pub async fn list_tasks<R: TaskRepository + 'static>(
    identity: Identity,
    Extension(status_service): Extension<Arc<TaskStatusService<R>>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskPage>, AppError> {
    query.validate()?;
    let params = query.into_params(Some(identity.org_id))?;
    Ok(Json(status_service.list(params).await?))
}

/// 单个任务详情，其他组织的任务返回 404
pub async fn get_task<R: TaskRepository + 'static>(
    identity: Identity,
    Extension(status_service): Extension<Arc<TaskStatusService<R>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetail>, AppError> {
    status_service
        .fetch(&identity.org_id, id)
        .await?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

/// 取消任务
///
/// 等待中的任务立即取消；运行中的任务只记录取消请求，由处理器协作结束。
pub async fn cancel_task<R: TaskRepository + 'static>(
    identity: Identity,
    Extension(status_service): Extension<Arc<TaskStatusService<R>>>,
    Extension(client): Extension<Arc<dyn TaskClient>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<CancelResponse>), AppError> {
    if status_service.fetch(&identity.org_id, id).await?.is_none() {
        return Err(AppError::not_found());
    }

    let outcome = client.cancel(id).await?;
    info!(task_id = %id, request_id = %identity.request_id, outcome = ?outcome, "Cancel requested");

    Ok((StatusCode::ACCEPTED, Json(CancelResponse { id, outcome })))
}

/// 跨组织的管理员任务列表
pub async fn admin_list_tasks<R: TaskRepository + 'static>(
    Extension(status_service): Extension<Arc<TaskStatusService<R>>>,
    Query(query): Query<AdminTaskListQuery>,
) -> Result<Json<TaskPage>, AppError> {
    query.validate()?;
    let params = query.into_params()?;
    Ok(Json(status_service.list(params).await?))
}
