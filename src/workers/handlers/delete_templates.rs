// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::ignore_not_found;
use crate::domain::models::payloads::DeleteTemplatesPayload;
use crate::domain::services::content_service::ContentService;
use crate::workers::registry::{HandlerError, TaskContext, TaskHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// 模板删除处理器
pub struct DeleteTemplatesHandler {
    content: Arc<dyn ContentService>,
}

impl DeleteTemplatesHandler {
    pub fn new(content: Arc<dyn ContentService>) -> Self {
        Self { content }
    }
}

#[async_trait]
impl TaskHandler for DeleteTemplatesHandler {
    async fn execute(&self, ctx: TaskContext) -> Result<(), HandlerError> {
        let payload: DeleteTemplatesPayload = ctx.payload()?;
        ctx.ensure_not_canceled()?;

        let org_id = &ctx.task().org_id;

        // 先删除每个仓库在模板中的分发，再删除模板
        for repository_uuid in &payload.repository_config_uuids {
            ctx.ensure_not_canceled()?;
            debug!(
                "Deleting distribution of repository {} in template {}",
                repository_uuid, payload.template_uuid
            );
            ignore_not_found(
                self.content
                    .delete_template_distribution(org_id, payload.template_uuid, *repository_uuid)
                    .await,
            )?;
        }

        ignore_not_found(
            self.content
                .delete_template(org_id, payload.template_uuid)
                .await,
        )?;
        Ok(())
    }
}
