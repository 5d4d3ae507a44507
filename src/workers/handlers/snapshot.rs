// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::payloads::SnapshotPayload;
use crate::domain::services::content_service::{ContentError, ContentService, RemoteTaskState};
use crate::workers::registry::{HandlerError, TaskContext, TaskHandler};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 仓库快照处理器
///
/// 首次执行时发起远端同步并把任务地址写入负载检查点；
/// 重新执行时直接轮询已有的远端任务，不会重复发起同步。
pub struct SnapshotHandler {
    content: Arc<dyn ContentService>,
    poll_interval: Duration,
}

impl SnapshotHandler {
    pub fn new(content: Arc<dyn ContentService>, poll_interval: Duration) -> Self {
        Self {
            content,
            poll_interval,
        }
    }
}

#[async_trait]
impl TaskHandler for SnapshotHandler {
    async fn execute(&self, mut ctx: TaskContext) -> Result<(), HandlerError> {
        let mut payload: SnapshotPayload = ctx.payload()?;
        ctx.ensure_not_canceled()?;

        let href = match payload.sync_task_href.clone() {
            Some(href) => {
                info!("Resuming remote sync task {}", href);
                href
            }
            None => {
                let href = self
                    .content
                    .start_snapshot(&ctx.task().org_id, payload.repository_config_uuid)
                    .await?;
                payload.sync_task_href = Some(href.clone());
                ctx.checkpoint(&payload).await?;
                info!("Started remote sync task {}", href);
                href
            }
        };

        loop {
            match self.content.remote_task(&href).await? {
                RemoteTaskState::Completed => return Ok(()),
                RemoteTaskState::Failed { error } => {
                    return Err(ContentError::RemoteTaskFailed(error).into())
                }
                RemoteTaskState::Running => debug!("Remote sync task {} still running", href),
            }

            tokio::select! {
                _ = ctx.cancel_signal().canceled() => return Err(HandlerError::Canceled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
