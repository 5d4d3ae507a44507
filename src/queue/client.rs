// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{NewTask, Task};
use crate::queue::task_queue::{CancelOutcome, QueueError, TaskQueue};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// 生产者客户端
///
/// 只暴露入队、查询和取消，领取与续约等工作器操作不可见。
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// 入队新任务，返回任务 ID
    async fn enqueue(&self, task: NewTask) -> Result<Uuid, QueueError>;

    /// 按 ID 查询任务
    async fn fetch(&self, id: Uuid) -> Result<Option<Task>, QueueError>;

    /// 取消任务
    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError>;
}

/// 基于任务队列的客户端实现
#[derive(Clone)]
pub struct QueueTaskClient<Q: TaskQueue> {
    queue: Q,
}

impl<Q: TaskQueue> QueueTaskClient<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl<Q: TaskQueue> TaskClient for QueueTaskClient<Q> {
    async fn enqueue(&self, task: NewTask) -> Result<Uuid, QueueError> {
        let type_name = task.type_name.clone();
        let correlation_id = task.correlation_id.clone().unwrap_or_default();
        let depends_on = task.depends_on;

        let id = self.queue.enqueue(task).await?;
        info!(
            task_id = %id,
            task_type = %type_name,
            correlation_id = %correlation_id,
            depends_on = ?depends_on,
            "[Enqueued Task]"
        );
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Task>, QueueError> {
        self.queue.fetch(id).await
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        self.queue.cancel(id).await
    }
}
