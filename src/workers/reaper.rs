// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::task_queue::{QueueError, ReapReport, TaskQueue};
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 过期租约回收器
///
/// 定期扫描租约已过期的运行中任务：未达重试上限的重新排队，
/// 已请求取消的直接取消，其余标记为失败并级联失败依赖任务。
/// 这是工作器崩溃后任务得以恢复的唯一途径。
pub struct Reaper {
    queue: Arc<dyn TaskQueue>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Reaper {
    pub fn new(queue: Arc<dyn TaskQueue>, interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            queue,
            interval,
            shutdown,
        }
    }

    /// 执行一次回收
    pub async fn reap_once(&self) -> Result<ReapReport, QueueError> {
        let report = self.queue.reap_expired(None).await?;

        for (action, count) in [
            ("requeued", report.requeued),
            ("failed", report.failed),
            ("canceled", report.canceled),
            ("cascaded", report.cascaded),
        ] {
            if count > 0 {
                counter!("tasks_reaped_total", "action" => action).increment(count);
            }
        }

        Ok(report)
    }

    /// 启动后台运行
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Reaper exited with error: {}", e);
            }
        })
    }
}

#[async_trait]
impl Worker for Reaper {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("Reaper started, interval {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        let mut shutdown = self.shutdown.clone();

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.reap_once().await {
                Ok(report) if report.is_empty() => debug!("Reaper tick, nothing to reclaim"),
                Ok(report) => info!(
                    requeued = report.requeued,
                    failed = report.failed,
                    canceled = report.canceled,
                    cascaded = report.cascaded,
                    "Reclaimed expired tasks"
                ),
                Err(e) => error!("Failed to reap expired tasks: {}", e),
            }
        }

        info!("Reaper stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "reaper"
    }
}

#[cfg(test)]
#[path = "reaper_test.rs"]
mod tests;
