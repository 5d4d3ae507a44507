// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::payloads::UpdateTemplateDistributionsPayload;
use crate::domain::services::content_service::ContentService;
use crate::workers::registry::{HandlerError, TaskContext, TaskHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// 模板分发更新处理器
///
/// 通常作为快照任务的依赖任务入队，快照完成后才会执行。
pub struct UpdateTemplateDistributionsHandler {
    content: Arc<dyn ContentService>,
}

impl UpdateTemplateDistributionsHandler {
    pub fn new(content: Arc<dyn ContentService>) -> Self {
        Self { content }
    }
}

#[async_trait]
impl TaskHandler for UpdateTemplateDistributionsHandler {
    async fn execute(&self, ctx: TaskContext) -> Result<(), HandlerError> {
        let payload: UpdateTemplateDistributionsPayload = ctx.payload()?;
        ctx.ensure_not_canceled()?;

        self.content
            .update_template_distributions(
                &ctx.task().org_id,
                payload.template_uuid,
                &payload.repository_config_uuids,
            )
            .await?;
        Ok(())
    }
}
