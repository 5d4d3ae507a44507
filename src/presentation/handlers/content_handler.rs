// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::content_request::{
    DeleteTemplateRequest, EnqueuedResponse, IntrospectRequest, SnapshotRequest,
};
use crate::domain::models::payloads::{
    DeleteRepositorySnapshotsPayload, DeleteTemplatesPayload, IntrospectPayload, SnapshotPayload,
    TaskKind, UpdateTemplateDistributionsPayload,
};
use crate::domain::models::task::{NewTask, ResourceRef};
use crate::presentation::errors::AppError;
use crate::presentation::extractors::identity::Identity;
use crate::queue::client::TaskClient;
use axum::body::Bytes;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

type Accepted = (StatusCode, Json<EnqueuedResponse>);

/// 构造带调用方身份的入队请求
fn new_task<P: Serialize>(
    identity: &Identity,
    kind: TaskKind,
    payload: &P,
    resource: ResourceRef,
) -> Result<NewTask, AppError> {
    let mut task = NewTask::new(kind.as_str(), identity.org_id.clone(), serde_json::to_value(payload)?)
        .with_resource(resource)
        .with_correlation_id(identity.request_id.clone());
    if let Some(account_id) = &identity.account_id {
        task = task.with_account(account_id.clone());
    }
    Ok(task)
}

/// 请求体可以为空
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

fn accepted(task_id: Uuid, dependent_task_ids: Vec<Uuid>) -> Accepted {
    (
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            task_id,
            dependent_task_ids,
        }),
    )
}

/// 入队仓库快照，可附带快照完成后更新分发的模板
pub async fn snapshot_repository(
    identity: Identity,
    Extension(client): Extension<Arc<dyn TaskClient>>,
    Path(repository_uuid): Path<Uuid>,
    body: Bytes,
) -> Result<Accepted, AppError> {
    let request: SnapshotRequest = optional_body(&body)?;

    let payload = SnapshotPayload {
        repository_config_uuid: repository_uuid,
        sync_task_href: None,
    };
    let snapshot_id = client
        .enqueue(new_task(
            &identity,
            TaskKind::Snapshot,
            &payload,
            ResourceRef::repository(repository_uuid),
        )?)
        .await?;

    let mut dependent_task_ids = Vec::with_capacity(request.template_uuids.len());
    for template_uuid in request.template_uuids {
        let payload = UpdateTemplateDistributionsPayload {
            template_uuid,
            repository_config_uuids: vec![repository_uuid],
        };
        let task = new_task(
            &identity,
            TaskKind::UpdateTemplateDistributions,
            &payload,
            ResourceRef::template(template_uuid),
        )?
        .depends_on(snapshot_id);
        dependent_task_ids.push(client.enqueue(task).await?);
    }

    Ok(accepted(snapshot_id, dependent_task_ids))
}

/// 入队仓库元数据内省
pub async fn introspect_repository(
    identity: Identity,
    Extension(client): Extension<Arc<dyn TaskClient>>,
    Path(repository_uuid): Path<Uuid>,
    Json(request): Json<IntrospectRequest>,
) -> Result<Accepted, AppError> {
    request.validate()?;

    let payload = IntrospectPayload { url: request.url };
    let task_id = client
        .enqueue(new_task(
            &identity,
            TaskKind::Introspect,
            &payload,
            ResourceRef::repository(repository_uuid),
        )?)
        .await?;

    Ok(accepted(task_id, Vec::new()))
}

/// 入队仓库快照删除
pub async fn delete_repository_snapshots(
    identity: Identity,
    Extension(client): Extension<Arc<dyn TaskClient>>,
    Path(repository_uuid): Path<Uuid>,
) -> Result<Accepted, AppError> {
    let payload = DeleteRepositorySnapshotsPayload {
        repository_config_uuid: repository_uuid,
    };
    let task_id = client
        .enqueue(new_task(
            &identity,
            TaskKind::DeleteRepositorySnapshots,
            &payload,
            ResourceRef::repository(repository_uuid),
        )?)
        .await?;

    Ok(accepted(task_id, Vec::new()))
}

/// 入队模板删除
pub async fn delete_template(
    identity: Identity,
    Extension(client): Extension<Arc<dyn TaskClient>>,
    Path(template_uuid): Path<Uuid>,
    body: Bytes,
) -> Result<Accepted, AppError> {
    let request: DeleteTemplateRequest = optional_body(&body)?;

    let payload = DeleteTemplatesPayload {
        template_uuid,
        repository_config_uuids: request.repository_config_uuids,
    };
    let task_id = client
        .enqueue(new_task(
            &identity,
            TaskKind::DeleteTemplates,
            &payload,
            ResourceRef::template(template_uuid),
        )?)
        .await?;

    Ok(accepted(task_id, Vec::new()))
}
