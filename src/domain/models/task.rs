// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 父任务失败或被取消时，依赖任务记录的错误信息
pub const PARENT_FAILED_ERROR: &str = "parent task failed";

/// 租约过期且重试次数耗尽时记录的错误信息
pub const LEASE_EXPIRED_ERROR: &str = "lease expired, retries exhausted";

/// 任务实体
///
/// 队列中的一个工作单元。`payload` 只由对应类型的处理器解释，
/// 队列引擎本身从不读取其内容。运行中的任务由 `lease_token`
/// 标识唯一持有者，所有状态变更都以该令牌做比较并交换。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// 任务唯一标识符，入队时生成
    pub id: Uuid,
    /// 任务类型名，决定由哪个处理器执行
    pub type_name: String,
    /// 不透明的任务负载
    pub payload: serde_json::Value,
    /// 所属组织
    pub org_id: String,
    /// 所属账号（可选）
    pub account_id: Option<String>,
    /// 任务关联的资源，例如仓库或模板
    pub resource: Option<ResourceRef>,
    /// 发起请求的追踪ID
    pub correlation_id: Option<String>,
    /// 当前状态
    pub status: TaskStatus,
    /// 父任务ID，父任务成功完成前本任务不可被领取
    pub depends_on: Option<Uuid>,
    /// 当前租约令牌，只在工作器与存储之间传递
    #[serde(skip_serializing)]
    pub lease_token: Option<Uuid>,
    /// 当前租约过期时间
    #[serde(skip_serializing)]
    pub lease_expires_at: Option<DateTime<FixedOffset>>,
    /// 运行中任务的协作式取消标记
    pub cancel_requested: bool,
    /// 入队时间
    pub queued_at: DateTime<FixedOffset>,
    /// 开始执行时间
    pub started_at: Option<DateTime<FixedOffset>>,
    /// 结束时间，仅终态任务有值
    pub finished_at: Option<DateTime<FixedOffset>>,
    /// 失败原因
    pub error: Option<String>,
    /// 租约丢失后被回收的次数
    pub retry_count: i32,
}

/// 任务关联资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub uuid: Uuid,
}

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Repository,
    Template,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResourceKind::Repository => write!(f, "repository"),
            ResourceKind::Template => write!(f, "template"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository" => Ok(ResourceKind::Repository),
            "template" => Ok(ResourceKind::Template),
            other => Err(DomainError::ValidationError(format!(
                "unknown resource kind: {}",
                other
            ))),
        }
    }
}

impl ResourceRef {
    pub fn repository(uuid: Uuid) -> Self {
        Self {
            kind: ResourceKind::Repository,
            uuid,
        }
    }

    pub fn template(uuid: Uuid) -> Self {
        Self {
            kind: ResourceKind::Template,
            uuid,
        }
    }
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Running → Completed/Failed/Canceled
///
/// 另外允许 Pending → Canceled（直接取消）、Pending → Failed（父任务失败），
/// 以及租约回收时的 Running → Pending。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待被领取
    #[default]
    Pending,
    /// 已被某个工作器领取并持有租约
    Running,
    /// 成功完成
    Completed,
    /// 执行失败
    Failed,
    /// 已取消
    Canceled,
}

impl TaskStatus {
    /// 数据库中存储的字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// 作为父任务时，该状态是否导致依赖任务失败
    pub fn fails_dependents(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Canceled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "canceled" => Ok(TaskStatus::Canceled),
            other => Err(DomainError::ValidationError(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 入队请求
///
/// 生产者提交的新任务描述，ID 与时间戳由队列在入队时生成。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub type_name: String,
    pub payload: serde_json::Value,
    pub org_id: String,
    pub account_id: Option<String>,
    pub resource: Option<ResourceRef>,
    pub correlation_id: Option<String>,
    pub depends_on: Option<Uuid>,
}

impl NewTask {
    /// 创建一个新的入队请求
    pub fn new(type_name: impl Into<String>, org_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            payload,
            org_id: org_id.into(),
            account_id: None,
            resource: None,
            correlation_id: None,
            depends_on: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_resource(mut self, resource: ResourceRef) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn depends_on(mut self, parent: Uuid) -> Self {
        self.depends_on = Some(parent);
        self
    }

    /// 校验入队请求
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.type_name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "task type cannot be empty".to_string(),
            ));
        }
        if self.org_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "org id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Task {
    /// 根据入队请求创建 Pending 状态的任务
    pub fn new(request: NewTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            type_name: request.type_name,
            payload: request.payload,
            org_id: request.org_id,
            account_id: request.account_id,
            resource: request.resource,
            correlation_id: request.correlation_id,
            status: TaskStatus::Pending,
            depends_on: request.depends_on,
            lease_token: None,
            lease_expires_at: None,
            cancel_requested: false,
            queued_at: Utc::now().into(),
            started_at: None,
            finished_at: None,
            error: None,
            retry_count: 0,
        }
    }

    /// 领取任务
    ///
    /// Pending → Running，签发新的租约
    pub fn start(
        mut self,
        lease_token: Uuid,
        lease_expires_at: DateTime<FixedOffset>,
    ) -> Result<Self, DomainError> {
        self.ensure(TaskStatus::Pending, TaskStatus::Running)?;
        self.status = TaskStatus::Running;
        self.lease_token = Some(lease_token);
        self.lease_expires_at = Some(lease_expires_at);
        self.started_at = Some(Utc::now().into());
        self.cancel_requested = false;
        Ok(self)
    }

    /// 完成任务
    pub fn complete(mut self) -> Result<Self, DomainError> {
        self.ensure(TaskStatus::Running, TaskStatus::Completed)?;
        self.status = TaskStatus::Completed;
        self.finish_now();
        Ok(self)
    }

    /// 标记任务失败
    ///
    /// Running → Failed；父任务失败时也允许 Pending → Failed
    pub fn fail(mut self, error: impl Into<String>) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: TaskStatus::Failed,
            });
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finish_now();
        Ok(self)
    }

    /// 取消任务
    pub fn cancel(mut self) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: TaskStatus::Canceled,
            });
        }
        self.status = TaskStatus::Canceled;
        self.finish_now();
        Ok(self)
    }

    /// 回收任务
    ///
    /// Running → Pending，清除租约并累加重试次数
    pub fn requeue(mut self) -> Result<Self, DomainError> {
        self.ensure(TaskStatus::Running, TaskStatus::Pending)?;
        self.status = TaskStatus::Pending;
        self.lease_token = None;
        self.lease_expires_at = None;
        self.started_at = None;
        self.cancel_requested = false;
        self.retry_count += 1;
        Ok(self)
    }

    /// 当前令牌是否持有该任务的租约
    pub fn holds_lease(&self, lease_token: Uuid) -> bool {
        self.status == TaskStatus::Running && self.lease_token == Some(lease_token)
    }

    /// 租约在给定时间点是否已过期
    pub fn lease_expired_at(&self, now: DateTime<FixedOffset>) -> bool {
        self.status == TaskStatus::Running
            && self.lease_expires_at.map(|at| at < now).unwrap_or(true)
    }

    fn ensure(&self, from: TaskStatus, to: TaskStatus) -> Result<(), DomainError> {
        if self.status == from {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.status,
                to,
            })
        }
    }

    fn finish_now(&mut self) {
        self.finished_at = Some(Utc::now().into());
        self.lease_token = None;
        self.lease_expires_at = None;
        self.cancel_requested = false;
    }
}
