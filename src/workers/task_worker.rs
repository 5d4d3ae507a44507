// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::task_queue::{ClaimedTask, Heartbeat, QueueError, TaskQueue};
use crate::utils::backoff::PollBackoff;
use crate::utils::errors::WorkerError;
use crate::workers::registry::{CancelSignal, HandlerError, HandlerRegistry, TaskContext};
use crate::workers::worker::Worker;
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 处理器 panic 时记录的错误信息
pub const HANDLER_PANICKED_ERROR: &str = "task handler panicked";

/// 工作器参数
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// 心跳间隔，必须小于租约时长
    pub heartbeat_interval: Duration,
    /// 空闲轮询退避
    pub poll: PollBackoff,
    /// 关闭时等待处理器自行结束的时间
    pub shutdown_grace: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            poll: PollBackoff::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// 一次执行的最终结果
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Completed,
    Canceled,
    Failed(String),
    Released,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Canceled => "canceled",
            Outcome::Failed(_) => "failed",
            Outcome::Released => "released",
        }
    }
}

/// 任务工作器
///
/// 循环领取已注册类型的任务，在独立的 tokio 任务中执行处理器，
/// 同时按心跳间隔续约，直到处理器结束后再写入终态。
pub struct TaskWorker {
    name: String,
    queue: Arc<dyn TaskQueue>,
    registry: Arc<HandlerRegistry>,
    options: WorkerOptions,
    shutdown: watch::Receiver<bool>,
}

impl TaskWorker {
    /// 创建新的任务工作器
    ///
    /// # 参数
    ///
    /// * `queue` - 任务队列
    /// * `registry` - 处理器注册表，决定本工作器领取哪些类型
    /// * `options` - 心跳、轮询与关闭参数
    /// * `shutdown` - 关闭信号
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        registry: Arc<HandlerRegistry>,
        options: WorkerOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            name: format!("task-worker-{}", Uuid::new_v4()),
            queue,
            registry,
            options,
            shutdown,
        }
    }

    /// 领取并处理一个任务
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 处理了一个任务
    /// * `Ok(false)` - 当前没有可领取的任务
    pub async fn process_next(&self, type_names: &[String]) -> Result<bool, QueueError> {
        match self.queue.claim(type_names).await? {
            Some(claimed) => {
                self.process(claimed).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(
        skip(self, claimed),
        fields(
            task_id = %claimed.task.id,
            task_type = %claimed.task.type_name,
            correlation_id = claimed.task.correlation_id.as_deref().unwrap_or("")
        )
    )]
    async fn process(&self, claimed: ClaimedTask) {
        let ClaimedTask {
            task, lease_token, ..
        } = claimed;
        let id = task.id;
        let type_name = task.type_name.clone();
        let started = Instant::now();

        let outcome = match self.registry.get(&type_name) {
            Some(handler) => {
                let (cancel_tx, cancel) = CancelSignal::channel();
                let cancellations = self.queue.cancellations();
                let ctx = TaskContext::new(task, lease_token, self.queue.clone(), cancel);
                let handle = tokio::spawn(async move { handler.execute(ctx).await });
                self.supervise(id, lease_token, handle, cancel_tx, cancellations)
                    .await
            }
            None => Some(Outcome::Failed(format!(
                "no handler registered for task type {}",
                type_name
            ))),
        };

        // 租约已丢失，任务行属于新的持有者
        let Some(outcome) = outcome else {
            counter!("tasks_finished_total", "task_type" => type_name.clone(), "outcome" => "lease_lost")
                .increment(1);
            return;
        };

        counter!("tasks_finished_total", "task_type" => type_name.clone(), "outcome" => outcome.label())
            .increment(1);
        histogram!("task_duration_seconds", "task_type" => type_name.clone())
            .record(started.elapsed().as_secs_f64());

        self.record(id, lease_token, outcome).await;
    }

    /// 等待处理器结束并维持心跳，返回 `None` 表示租约已丢失
    async fn supervise(
        &self,
        id: Uuid,
        lease_token: Uuid,
        mut handle: tokio::task::JoinHandle<Result<(), HandlerError>>,
        cancel_tx: watch::Sender<bool>,
        mut cancellations: broadcast::Receiver<Uuid>,
    ) -> Option<Outcome> {
        let heartbeat_interval = self.options.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown = self.shutdown.clone();
        let mut cancellations_open = true;
        let mut user_canceled = false;
        let mut grace_deadline: Option<Instant> = None;

        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                _ = ticker.tick() => match self.queue.heartbeat(id, lease_token).await {
                    Ok(Heartbeat::Continue) => {}
                    Ok(Heartbeat::CancelRequested) => {
                        if !user_canceled {
                            info!("Cancellation requested, signalling handler");
                            user_canceled = true;
                            let _ = cancel_tx.send(true);
                        }
                    }
                    Err(QueueError::LeaseLost) => {
                        warn!("Lease lost, abandoning task");
                        handle.abort();
                        return None;
                    }
                    Err(e) => warn!("Heartbeat failed: {}", e),
                },
                received = cancellations.recv(), if cancellations_open => match received {
                    Ok(canceled_id) if canceled_id == id => {
                        if !user_canceled {
                            info!("Cancellation pushed, signalling handler");
                            user_canceled = true;
                            let _ = cancel_tx.send(true);
                        }
                    }
                    // 错过的通知由下一次心跳兜底
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => cancellations_open = false,
                },
                _ = shutdown.changed(), if grace_deadline.is_none() => {
                    info!("Shutdown requested, waiting for handler to stop");
                    let _ = cancel_tx.send(true);
                    grace_deadline = Some(Instant::now() + self.options.shutdown_grace);
                }
                _ = sleep_until(grace_deadline.unwrap_or_else(Instant::now)), if grace_deadline.is_some() => {
                    warn!("Handler did not stop within the shutdown grace period");
                    handle.abort();
                    return Some(Outcome::Released);
                }
            }
        };

        let shutting_down = grace_deadline.is_some();
        Some(match joined {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(HandlerError::Canceled)) if user_canceled => Outcome::Canceled,
            Ok(Err(HandlerError::Canceled)) if shutting_down => Outcome::Released,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(e) if e.is_panic() => {
                error!("Task handler panicked");
                Outcome::Failed(HANDLER_PANICKED_ERROR.to_string())
            }
            Err(e) => Outcome::Failed(format!("task handler aborted: {}", e)),
        })
    }

    async fn record(&self, id: Uuid, lease_token: Uuid, outcome: Outcome) {
        let result = match &outcome {
            Outcome::Completed => self.queue.finish(id, lease_token).await,
            Outcome::Canceled => self.queue.acknowledge_cancel(id, lease_token).await,
            Outcome::Failed(error) => self.queue.fail(id, lease_token, error).await,
            Outcome::Released => self.queue.release(id, lease_token).await,
        };

        match result {
            Ok(()) => match outcome {
                Outcome::Completed => info!(status = "completed", "[Finished Task]"),
                Outcome::Canceled => info!("[Canceled Task]"),
                Outcome::Failed(error) => warn!(status = "failed", error = %error, "[Finished Task]"),
                // release 自身会记录 [Requeued Task]
                Outcome::Released => {}
            },
            Err(QueueError::LeaseLost) => warn!("Lease lost before the outcome was recorded"),
            Err(e) => error!("Failed to record task outcome: {}", e),
        }
    }
}

#[async_trait]
impl Worker for TaskWorker {
    async fn run(&self) -> Result<(), WorkerError> {
        let type_names = self.registry.task_types();
        if type_names.is_empty() {
            return Err(WorkerError::NoHandlers);
        }

        info!("{} started for task types {:?}", self.name, type_names);

        let wake = self.queue.wake_signal();
        let mut shutdown = self.shutdown.clone();
        let mut idle_polls: u32 = 0;

        while !*shutdown.borrow() {
            // 先登记唤醒，再领取，领取期间发布的通知不会丢失
            let notified = wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let delay = match self.process_next(&type_names).await {
                Ok(true) => {
                    idle_polls = 0;
                    continue;
                }
                Ok(false) => self.options.poll.delay(idle_polls),
                Err(e) => {
                    error!("Failed to claim task: {}", e);
                    self.options.poll.delay(idle_polls)
                }
            };
            idle_polls = idle_polls.saturating_add(1);

            tokio::select! {
                _ = &mut notified => idle_polls = 0,
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("{} stopped", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
