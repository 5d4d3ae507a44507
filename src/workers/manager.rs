// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::TaskingSettings;
use crate::queue::task_queue::TaskQueue;
use crate::utils::backoff::PollBackoff;
use crate::utils::errors::WorkerError;
use crate::workers::reaper::Reaper;
use crate::workers::registry::HandlerRegistry;
use crate::workers::task_worker::{TaskWorker, WorkerOptions};
use crate::workers::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作池参数
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// 本进程内的工作器数量
    pub worker_count: usize,
    pub worker: WorkerOptions,
    /// 回收器扫描间隔
    pub reaper_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            worker: WorkerOptions::default(),
            reaper_interval: Duration::from_secs(10),
        }
    }
}

impl From<&TaskingSettings> for PoolOptions {
    fn from(settings: &TaskingSettings) -> Self {
        Self {
            worker_count: settings.worker_count,
            worker: WorkerOptions {
                heartbeat_interval: settings.heartbeat_interval(),
                poll: PollBackoff::new(
                    Duration::from_millis(settings.poll_interval_ms),
                    Duration::from_millis(settings.max_poll_interval_ms),
                ),
                shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
            },
            reaper_interval: settings.reaper_interval(),
        }
    }
}

/// 工作池
///
/// 启动指定数量的任务工作器和一个回收器，统一通过关闭信号停止。
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    registry: Arc<HandlerRegistry>,
    options: PoolOptions,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, registry: HandlerRegistry, options: PoolOptions) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            registry: Arc::new(registry),
            options,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// 关闭信号的接收端，供其他后台任务（如通知监听）共用
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 启动工作器与回收器
    pub fn start(&mut self) {
        info!(
            "Starting {} task workers for types {:?}",
            self.options.worker_count,
            self.registry.task_types()
        );

        for _ in 0..self.options.worker_count {
            let worker = TaskWorker::new(
                self.queue.clone(),
                self.registry.clone(),
                self.options.worker.clone(),
                self.shutdown_receiver(),
            );

            let handle = tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!("{} exited with error: {}", worker.name(), e);
                }
            });
            self.handles.push(handle);
        }

        let reaper = Reaper::new(
            self.queue.clone(),
            self.options.reaper_interval,
            self.shutdown_receiver(),
        );
        self.handles.push(reaper.start());
    }

    /// 托管额外的后台任务，关闭时一并等待
    pub fn attach(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// 发出关闭信号并等待所有后台任务结束
    ///
    /// 正在执行的处理器会收到取消信号，在宽限期内未结束的任务被释放回队列。
    pub async fn shutdown(self) -> Result<(), WorkerError> {
        info!("Shutting down workers...");
        let _ = self.shutdown_tx.send(true);

        for handle in self.handles {
            handle.await?;
        }

        info!("Workers shut down successfully");
        Ok(())
    }
}
