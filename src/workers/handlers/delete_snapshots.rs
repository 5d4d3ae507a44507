// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::ignore_not_found;
use crate::domain::models::payloads::DeleteRepositorySnapshotsPayload;
use crate::domain::services::content_service::ContentService;
use crate::workers::registry::{HandlerError, TaskContext, TaskHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// 删除仓库快照处理器
pub struct DeleteRepositorySnapshotsHandler {
    content: Arc<dyn ContentService>,
}

impl DeleteRepositorySnapshotsHandler {
    pub fn new(content: Arc<dyn ContentService>) -> Self {
        Self { content }
    }
}

#[async_trait]
impl TaskHandler for DeleteRepositorySnapshotsHandler {
    async fn execute(&self, ctx: TaskContext) -> Result<(), HandlerError> {
        let payload: DeleteRepositorySnapshotsPayload = ctx.payload()?;
        ctx.ensure_not_canceled()?;

        ignore_not_found(
            self.content
                .delete_repository_snapshots(&ctx.task().org_id, payload.repository_config_uuid)
                .await,
        )?;
        Ok(())
    }
}
