// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use crate::domain::services::content_service::ContentError;
use crate::queue::task_queue::{QueueError, TaskQueue};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// 处理器错误类型
#[derive(Error, Debug)]
pub enum HandlerError {
    /// 负载无法解析
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// 内容服务调用失败
    #[error(transparent)]
    Content(#[from] ContentError),

    /// 写检查点失败
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] QueueError),

    /// 处理器响应取消请求而提前结束
    #[error("task canceled")]
    Canceled,

    #[error("{0}")]
    Failed(String),
}

/// 协作式取消信号
///
/// 处理器在检查点调用 `is_canceled`，或在长时间等待时与 `canceled()` 竞争。
#[derive(Clone, Debug)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// 创建一对取消信号：发送端由工作器持有
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self { receiver })
    }

    /// 从不会被触发的信号，用于测试或直接调用处理器
    pub fn never() -> Self {
        let (sender, signal) = Self::channel();
        // 发送端随即丢弃，`canceled()` 将永远挂起
        drop(sender);
        signal
    }

    pub fn is_canceled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// 等待取消；发送端被丢弃而未取消时永远挂起
    pub async fn canceled(&self) {
        let mut receiver = self.receiver.clone();
        let result = receiver.wait_for(|canceled| *canceled).await.map(|_| ());
        if result.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// 处理器执行上下文
#[derive(Clone)]
pub struct TaskContext {
    task: Task,
    lease_token: Uuid,
    queue: Arc<dyn TaskQueue>,
    cancel: CancelSignal,
}

impl TaskContext {
    pub fn new(task: Task, lease_token: Uuid, queue: Arc<dyn TaskQueue>, cancel: CancelSignal) -> Self {
        Self {
            task,
            lease_token,
            queue,
            cancel,
        }
    }

    /// 领取时的任务快照
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// 将负载解析为处理器自己的结构
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(self.task.payload.clone())?)
    }

    /// 写入负载检查点，重新执行时从检查点继续
    pub async fn checkpoint<T: Serialize>(&mut self, payload: &T) -> Result<(), HandlerError> {
        let value = serde_json::to_value(payload)?;
        self.queue
            .update_payload(self.task.id, self.lease_token, value.clone())
            .await?;
        self.task.payload = value;
        Ok(())
    }

    /// 已请求取消时返回 `HandlerError::Canceled`
    pub fn ensure_not_canceled(&self) -> Result<(), HandlerError> {
        if self.is_canceled() {
            Err(HandlerError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// 任务处理器特质
///
/// 处理器必须可以安全地重复执行：租约丢失后任务会被重新领取，
/// 即使上一次执行已经完成了一部分。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, ctx: TaskContext) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn execute(&self, ctx: TaskContext) -> Result<(), HandlerError> {
        (self.0)(ctx).await
    }
}

/// 处理器注册表
///
/// 以任务类型名为键；未注册的类型不会被本进程领取。
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同名类型会被覆盖
    pub fn register(&mut self, type_name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(type_name.into(), handler);
        self
    }

    /// 以异步函数注册处理器
    pub fn register_fn<F, Fut>(&mut self, type_name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(type_name, Arc::new(FnHandler(handler)))
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(type_name).cloned()
    }

    /// 已注册的类型名，按字母排序
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
