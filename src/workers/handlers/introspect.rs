// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::payloads::IntrospectPayload;
use crate::domain::services::content_service::ContentService;
use crate::workers::registry::{HandlerError, TaskContext, TaskHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// 仓库元数据内省处理器
pub struct IntrospectHandler {
    content: Arc<dyn ContentService>,
}

impl IntrospectHandler {
    pub fn new(content: Arc<dyn ContentService>) -> Self {
        Self { content }
    }
}

#[async_trait]
impl TaskHandler for IntrospectHandler {
    async fn execute(&self, ctx: TaskContext) -> Result<(), HandlerError> {
        let payload: IntrospectPayload = ctx.payload()?;
        ctx.ensure_not_canceled()?;

        tokio::select! {
            result = self.content.introspect(&payload.url) => Ok(result?),
            _ = ctx.cancel_signal().canceled() => Err(HandlerError::Canceled),
        }
    }
}
