// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 内容服务错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// 网络或传输层错误
    #[error("content service request failed: {0}")]
    Request(String),

    /// 非成功状态码
    #[error("content service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 资源不存在
    #[error("resource not found")]
    NotFound,

    /// 远端同步任务失败
    #[error("remote task failed: {0}")]
    RemoteTaskFailed(String),

    /// 响应无法解析
    #[error("invalid content service response: {0}")]
    InvalidResponse(String),
}

/// 远端任务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemoteTaskState {
    Running,
    Completed,
    Failed { error: String },
}

/// 内容服务特质
///
/// 封装仓库元数据、快照和模板分发所在的外部服务。
/// 删除类操作把"资源不存在"视为成功，保证处理器可重复执行。
#[async_trait]
pub trait ContentService: Send + Sync {
    /// 抓取并解析仓库元数据
    async fn introspect(&self, url: &str) -> Result<(), ContentError>;

    /// 发起仓库同步，返回远端任务地址
    async fn start_snapshot(&self, org_id: &str, repository_uuid: Uuid)
        -> Result<String, ContentError>;

    /// 查询远端任务状态
    async fn remote_task(&self, href: &str) -> Result<RemoteTaskState, ContentError>;

    /// 删除仓库的全部快照
    async fn delete_repository_snapshots(
        &self,
        org_id: &str,
        repository_uuid: Uuid,
    ) -> Result<(), ContentError>;

    /// 按仓库最新快照更新模板分发
    async fn update_template_distributions(
        &self,
        org_id: &str,
        template_uuid: Uuid,
        repository_uuids: &[Uuid],
    ) -> Result<(), ContentError>;

    /// 删除模板中某个仓库的分发
    ///
    /// 仓库不存在或尚无快照时返回 `NotFound`
    async fn delete_template_distribution(
        &self,
        org_id: &str,
        template_uuid: Uuid,
        repository_uuid: Uuid,
    ) -> Result<(), ContentError>;

    /// 删除模板本身
    async fn delete_template(&self, org_id: &str, template_uuid: Uuid) -> Result<(), ContentError>;
}
