// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{DomainError, NewTask, Task};
use crate::domain::repositories::task_repository::{RepositoryError, TaskRepository};
use crate::queue::notifier::TaskNotifier;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};
use uuid::Uuid;

pub use crate::domain::repositories::task_repository::{CancelOutcome, ReapReport};

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    /// 调用方不再持有该任务的租约
    #[error("Lease lost")]
    LeaseLost,

    /// 任务不存在
    #[error("Task not found")]
    NotFound,

    /// 依赖的父任务不存在
    #[error("Parent task {0} not found")]
    ParentNotFound(Uuid),

    /// 任务已处于终态
    #[error("Task is already in a terminal state")]
    AlreadyTerminal,

    /// 入队请求无效
    #[error("Invalid task: {0}")]
    Invalid(#[from] DomainError),
}

impl From<RepositoryError> for QueueError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::LeaseLost => QueueError::LeaseLost,
            RepositoryError::NotFound => QueueError::NotFound,
            RepositoryError::ParentNotFound(id) => QueueError::ParentNotFound(id),
            RepositoryError::AlreadyTerminal => QueueError::AlreadyTerminal,
            RepositoryError::Domain(e) => QueueError::Invalid(e),
            other => QueueError::Repository(other),
        }
    }
}

/// 已领取的任务
///
/// `lease_token` 是后续心跳、完成、失败等调用的凭证。
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task: Task,
    pub lease_token: Uuid,
}

/// 心跳结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    /// 继续执行
    Continue,
    /// 任务已被请求取消
    CancelRequested,
}

/// 任务队列特质
///
/// 工作器与生产者共享的队列引擎接口。除 `enqueue`、`cancel`、`fetch`
/// 与回收外，所有操作都需要有效的租约令牌。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 入队任务
    async fn enqueue(&self, task: NewTask) -> Result<Uuid, QueueError>;

    /// 领取一个属于给定类型集合的可执行任务
    async fn claim(&self, type_names: &[String]) -> Result<Option<ClaimedTask>, QueueError>;

    /// 续约
    async fn heartbeat(&self, id: Uuid, lease_token: Uuid) -> Result<Heartbeat, QueueError>;

    /// 完成任务
    async fn finish(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError>;

    /// 失败任务
    async fn fail(&self, id: Uuid, lease_token: Uuid, error: &str) -> Result<(), QueueError>;

    /// 确认取消
    async fn acknowledge_cancel(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError>;

    /// 释放租约
    async fn release(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError>;

    /// 写入负载检查点
    async fn update_payload(
        &self,
        id: Uuid,
        lease_token: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), QueueError>;

    /// 请求取消任务
    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError>;

    /// 查询任务
    async fn fetch(&self, id: Uuid) -> Result<Option<Task>, QueueError>;

    /// 回收租约已过期的任务
    ///
    /// `as_of` 为空时按存储的时钟判断过期，所有进程共用同一个时间来源
    async fn reap_expired(
        &self,
        as_of: Option<DateTime<FixedOffset>>,
    ) -> Result<ReapReport, QueueError>;

    /// 本进程内的唤醒信号
    fn wake_signal(&self) -> Arc<Notify>;

    /// 订阅运行中任务的取消请求，收到的是任务ID
    fn cancellations(&self) -> broadcast::Receiver<Uuid>;
}

/// 队列参数
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// 租约时长，等于心跳间隔乘以允许错过的心跳次数
    pub lease_timeout: Duration,
    /// 租约过期后最多重新排队的次数
    pub max_retries: i32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// 基于租约的任务队列实现
pub struct LeasedTaskQueue<R: TaskRepository> {
    /// 任务仓库
    repository: Arc<R>,
    /// 唤醒通知器
    notifier: Arc<dyn TaskNotifier>,
    options: QueueOptions,
}

impl<R: TaskRepository> LeasedTaskQueue<R> {
    /// 创建新的任务队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `notifier` - 唤醒通知器
    /// * `options` - 租约与重试参数
    ///
    /// # 返回值
    ///
    /// 返回新的任务队列实例
    pub fn new(repository: Arc<R>, notifier: Arc<dyn TaskNotifier>, options: QueueOptions) -> Self {
        Self {
            repository,
            notifier,
            options,
        }
    }

    pub fn options(&self) -> QueueOptions {
        self.options
    }
}

#[async_trait]
impl<R: TaskRepository> TaskQueue for LeasedTaskQueue<R> {
    /// 入队任务
    ///
    /// 未注册的任务类型同样会被接受，等待具备对应处理器的工作器领取。
    ///
    /// # 参数
    ///
    /// * `task` - 入队请求
    ///
    /// # 返回值
    ///
    /// * `Ok(Uuid)` - 新任务ID
    /// * `Err(QueueError)` - 请求无效或存储失败
    async fn enqueue(&self, task: NewTask) -> Result<Uuid, QueueError> {
        task.validate()?;

        let stored = self.repository.insert(&Task::new(task)).await?;
        counter!("tasks_enqueued_total", "task_type" => stored.type_name.clone()).increment(1);
        debug!(
            task_id = %stored.id,
            task_type = %stored.type_name,
            status = %stored.status,
            "Task stored"
        );

        self.notifier.notify().await;
        Ok(stored.id)
    }

    /// 领取任务
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(ClaimedTask))` - 成功领取
    /// * `Ok(None)` - 没有可领取的任务
    /// * `Err(QueueError)` - 存储失败
    async fn claim(&self, type_names: &[String]) -> Result<Option<ClaimedTask>, QueueError> {
        let lease_token = Uuid::new_v4();

        let claimed = self
            .repository
            .claim_next(type_names, lease_token, self.options.lease_timeout)
            .await?;

        Ok(claimed.map(|task| {
            counter!("tasks_claimed_total", "task_type" => task.type_name.clone()).increment(1);
            info!(
                task_id = %task.id,
                task_type = %task.type_name,
                correlation_id = task.correlation_id.as_deref().unwrap_or(""),
                "[Dequeued Task]"
            );
            ClaimedTask { task, lease_token }
        }))
    }

    async fn heartbeat(&self, id: Uuid, lease_token: Uuid) -> Result<Heartbeat, QueueError> {
        let cancel_requested = self
            .repository
            .renew_lease(id, lease_token, self.options.lease_timeout)
            .await?;

        Ok(if cancel_requested {
            Heartbeat::CancelRequested
        } else {
            Heartbeat::Continue
        })
    }

    async fn finish(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError> {
        self.repository.complete(id, lease_token).await?;
        // 依赖该任务的子任务现在可以被领取
        self.notifier.notify().await;
        Ok(())
    }

    async fn fail(&self, id: Uuid, lease_token: Uuid, error: &str) -> Result<(), QueueError> {
        let cascaded = self.repository.fail(id, lease_token, error).await?;
        if cascaded > 0 {
            info!(task_id = %id, cascaded, "Failed dependent tasks");
        }
        self.notifier.notify().await;
        Ok(())
    }

    async fn acknowledge_cancel(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError> {
        let cascaded = self.repository.mark_canceled(id, lease_token).await?;
        if cascaded > 0 {
            info!(task_id = %id, cascaded, "Failed dependent tasks");
        }
        self.notifier.notify().await;
        Ok(())
    }

    async fn release(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError> {
        self.repository.release(id, lease_token).await?;
        info!(task_id = %id, "[Requeued Task]");
        self.notifier.notify().await;
        Ok(())
    }

    async fn update_payload(
        &self,
        id: Uuid,
        lease_token: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), QueueError> {
        self.repository
            .update_payload(id, lease_token, payload)
            .await?;
        Ok(())
    }

    /// 请求取消任务
    ///
    /// 等待中的任务立即取消；运行中的任务设置取消标记并发布取消通知，
    /// 持有该任务的工作器收到通知或在下一次心跳时转告处理器。
    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        let outcome = self.repository.request_cancel(id).await?;
        match outcome {
            CancelOutcome::Canceled => {
                info!(task_id = %id, "[Canceled Task]");
                self.notifier.notify().await;
            }
            CancelOutcome::Requested => {
                info!(task_id = %id, "Cancellation requested");
                self.notifier.notify_canceled(id).await;
            }
        }
        Ok(outcome)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Task>, QueueError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    async fn reap_expired(
        &self,
        as_of: Option<DateTime<FixedOffset>>,
    ) -> Result<ReapReport, QueueError> {
        let report = self
            .repository
            .reap_expired(as_of, self.options.max_retries)
            .await?;
        if report.requeued > 0 {
            self.notifier.notify().await;
        }
        Ok(report)
    }

    fn wake_signal(&self) -> Arc<Notify> {
        self.notifier.wake_signal()
    }

    fn cancellations(&self) -> broadcast::Receiver<Uuid> {
        self.notifier.cancellations()
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(&self, task: NewTask) -> Result<Uuid, QueueError> {
        (**self).enqueue(task).await
    }

    async fn claim(&self, type_names: &[String]) -> Result<Option<ClaimedTask>, QueueError> {
        (**self).claim(type_names).await
    }

    async fn heartbeat(&self, id: Uuid, lease_token: Uuid) -> Result<Heartbeat, QueueError> {
        (**self).heartbeat(id, lease_token).await
    }

    async fn finish(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError> {
        (**self).finish(id, lease_token).await
    }

    async fn fail(&self, id: Uuid, lease_token: Uuid, error: &str) -> Result<(), QueueError> {
        (**self).fail(id, lease_token, error).await
    }

    async fn acknowledge_cancel(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError> {
        (**self).acknowledge_cancel(id, lease_token).await
    }

    async fn release(&self, id: Uuid, lease_token: Uuid) -> Result<(), QueueError> {
        (**self).release(id, lease_token).await
    }

    async fn update_payload(
        &self,
        id: Uuid,
        lease_token: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), QueueError> {
        (**self).update_payload(id, lease_token, payload).await
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        (**self).cancel(id).await
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Task>, QueueError> {
        (**self).fetch(id).await
    }

    async fn reap_expired(
        &self,
        as_of: Option<DateTime<FixedOffset>>,
    ) -> Result<ReapReport, QueueError> {
        (**self).reap_expired(as_of).await
    }

    fn wake_signal(&self) -> Arc<Notify> {
        (**self).wake_signal()
    }

    fn cancellations(&self) -> broadcast::Receiver<Uuid> {
        (**self).cancellations()
    }
}

#[cfg(test)]
#[path = "task_queue_test.rs"]
mod tests;
