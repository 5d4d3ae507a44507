// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 内置任务处理器
///
/// 每种任务类型一个处理器，全部通过 [`ContentService`] 访问外部内容服务，
/// 并且都可以在租约丢失后安全地重新执行。
pub mod delete_snapshots;
pub mod delete_templates;
pub mod introspect;
pub mod snapshot;
pub mod update_template_distributions;

use crate::domain::models::payloads::TaskKind;
use crate::domain::services::content_service::{ContentError, ContentService};
use crate::workers::registry::HandlerRegistry;
use std::sync::Arc;
use std::time::Duration;

pub use delete_snapshots::DeleteRepositorySnapshotsHandler;
pub use delete_templates::DeleteTemplatesHandler;
pub use introspect::IntrospectHandler;
pub use snapshot::SnapshotHandler;
pub use update_template_distributions::UpdateTemplateDistributionsHandler;

/// 注册全部内置处理器
///
/// # 参数
///
/// * `registry` - 处理器注册表
/// * `content` - 内容服务
/// * `remote_poll_interval` - 快照处理器轮询远端任务的间隔
pub fn register_builtin_handlers(
    registry: &mut HandlerRegistry,
    content: Arc<dyn ContentService>,
    remote_poll_interval: Duration,
) {
    registry
        .register(
            TaskKind::Snapshot.as_str(),
            Arc::new(SnapshotHandler::new(content.clone(), remote_poll_interval)),
        )
        .register(
            TaskKind::Introspect.as_str(),
            Arc::new(IntrospectHandler::new(content.clone())),
        )
        .register(
            TaskKind::DeleteRepositorySnapshots.as_str(),
            Arc::new(DeleteRepositorySnapshotsHandler::new(content.clone())),
        )
        .register(
            TaskKind::UpdateTemplateDistributions.as_str(),
            Arc::new(UpdateTemplateDistributionsHandler::new(content.clone())),
        )
        .register(
            TaskKind::DeleteTemplates.as_str(),
            Arc::new(DeleteTemplatesHandler::new(content)),
        );
}

/// 删除类操作中资源已不存在视为成功
fn ignore_not_found(result: Result<(), ContentError>) -> Result<(), ContentError> {
    match result {
        Err(ContentError::NotFound) => Ok(()),
        other => other,
    }
}
