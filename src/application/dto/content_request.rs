// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 快照请求
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SnapshotRequest {
    /// 快照完成后需要更新分发的模板
    #[serde(default)]
    pub template_uuids: Vec<Uuid>,
}

/// 内省请求
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct IntrospectRequest {
    #[validate(url)]
    pub url: String,
}

/// 模板删除请求
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeleteTemplateRequest {
    #[serde(default)]
    pub repository_config_uuids: Vec<Uuid>,
}

/// 入队响应
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueuedResponse {
    pub task_id: Uuid,
    /// 依赖该任务而一并入队的任务
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependent_task_ids: Vec<Uuid>,
}
