// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::task::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 内置任务类型
///
/// 类型名即处理器注册键，也是数据库中 `type_name` 列的值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// 创建仓库快照
    #[serde(rename = "snapshot")]
    Snapshot,
    /// 删除仓库的全部快照
    #[serde(rename = "delete-repository-snapshots")]
    DeleteRepositorySnapshots,
    /// 仓库元数据内省
    #[serde(rename = "introspect")]
    Introspect,
    /// 更新模板分发
    #[serde(rename = "update-template-distributions")]
    UpdateTemplateDistributions,
    /// 删除模板
    #[serde(rename = "delete-templates")]
    DeleteTemplates,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::Snapshot,
        TaskKind::DeleteRepositorySnapshots,
        TaskKind::Introspect,
        TaskKind::UpdateTemplateDistributions,
        TaskKind::DeleteTemplates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Snapshot => "snapshot",
            TaskKind::DeleteRepositorySnapshots => "delete-repository-snapshots",
            TaskKind::Introspect => "introspect",
            TaskKind::UpdateTemplateDistributions => "update-template-distributions",
            TaskKind::DeleteTemplates => "delete-templates",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::ValidationError(format!("unknown task type: {}", s)))
    }
}

/// 快照任务负载
///
/// `sync_task_href` 是远端同步任务的检查点，重新执行时复用该任务而不是再次发起。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub repository_config_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_task_href: Option<String>,
}

/// 内省任务负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectPayload {
    pub url: String,
}

/// 删除仓库快照任务负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRepositorySnapshotsPayload {
    pub repository_config_uuid: Uuid,
}

/// 更新模板分发任务负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTemplateDistributionsPayload {
    pub template_uuid: Uuid,
    #[serde(default)]
    pub repository_config_uuids: Vec<Uuid>,
}

/// 删除模板任务负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTemplatesPayload {
    pub template_uuid: Uuid,
    #[serde(default)]
    pub repository_config_uuids: Vec<Uuid>,
}
