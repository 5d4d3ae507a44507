// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{DomainError, Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 依赖的父任务不存在
    #[error("Parent task {0} not found")]
    ParentNotFound(Uuid),
    /// 租约已失效（令牌不匹配或任务不在运行中）
    #[error("Lease lost")]
    LeaseLost,
    /// 任务已处于终态
    #[error("Task is already in a terminal state")]
    AlreadyTerminal,
    /// 领域规则错误
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// 存储中的记录无法还原为任务，例如未知的状态值
    #[error("Corrupted task record: {0}")]
    Corrupted(DomainError),
}

/// 任务查询参数
#[derive(Debug, Default, Clone)]
pub struct TaskQueryParams {
    /// 组织过滤，仅管理员列表允许为空
    pub org_id: Option<String>,
    pub account_id: Option<String>,
    pub statuses: Option<Vec<TaskStatus>>,
    pub type_names: Option<Vec<String>>,
    pub resource_uuid: Option<Uuid>,
    pub limit: u64,
    pub offset: u64,
}

/// 取消请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// 等待中的任务已直接取消
    Canceled,
    /// 运行中的任务已标记取消请求，由处理器协作结束
    Requested,
}

/// 一次过期租约回收的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// 重新排队的任务数
    pub requeued: u64,
    /// 因重试耗尽而失败的任务数
    pub failed: u64,
    /// 因已请求取消而被取消的任务数
    pub canceled: u64,
    /// 因父任务失败而级联失败的依赖任务数
    pub cascaded: u64,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.failed == 0 && self.canceled == 0 && self.cascaded == 0
    }
}

/// 任务仓库特质
///
/// 定义任务记录存储的访问接口。所有由租约持有者发起的状态变更都是
/// 针对 `(id, lease_token, status = running)` 的比较并交换，
/// 不匹配时返回 [`RepositoryError::LeaseLost`]。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入新任务
    ///
    /// 若父任务已失败或被取消，任务直接以失败状态写入。
    async fn insert(&self, task: &Task) -> Result<Task, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, RepositoryError>;
    /// 原子领取下一个可执行任务
    ///
    /// 租约过期时间按存储自身的时钟计算为当前时间加 `lease_timeout`
    async fn claim_next(
        &self,
        type_names: &[String],
        lease_token: Uuid,
        lease_timeout: Duration,
    ) -> Result<Option<Task>, RepositoryError>;
    /// 续约，返回是否已被请求取消
    async fn renew_lease(
        &self,
        id: Uuid,
        lease_token: Uuid,
        lease_timeout: Duration,
    ) -> Result<bool, RepositoryError>;
    /// 标记任务已完成
    async fn complete(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError>;
    /// 标记任务失败并级联失败等待中的后代任务，返回级联数量
    async fn fail(&self, id: Uuid, lease_token: Uuid, error: &str)
        -> Result<u64, RepositoryError>;
    /// 确认运行中任务的取消，同样级联后代任务
    async fn mark_canceled(&self, id: Uuid, lease_token: Uuid) -> Result<u64, RepositoryError>;
    /// 主动释放租约，任务回到等待状态
    async fn release(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError>;
    /// 更新任务负载（处理器检查点）
    async fn update_payload(
        &self,
        id: Uuid,
        lease_token: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), RepositoryError>;
    /// 请求取消任务
    async fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome, RepositoryError>;
    /// 回收租约已过期的任务，并清理父任务已失败的等待任务
    ///
    /// `as_of` 为空时使用存储自身的时钟
    async fn reap_expired(
        &self,
        as_of: Option<DateTime<FixedOffset>>,
        max_retries: i32,
    ) -> Result<ReapReport, RepositoryError>;
    /// 高级任务查询
    async fn query_tasks(&self, params: TaskQueryParams)
        -> Result<(Vec<Task>, u64), RepositoryError>;
    /// 查找直接依赖该任务的任务ID
    async fn find_dependents(&self, id: Uuid) -> Result<Vec<Uuid>, RepositoryError>;
}
