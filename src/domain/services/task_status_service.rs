// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::Task;
use crate::domain::repositories::task_repository::{
    RepositoryError, TaskQueryParams, TaskRepository,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// 未指定时的分页大小
pub const DEFAULT_PAGE_LIMIT: u64 = 100;
/// 分页大小上限
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// 任务分页结果
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// 单个任务详情
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    /// 直接依赖该任务的任务ID
    pub dependents: Vec<Uuid>,
}

/// 任务状态查询服务
///
/// 只读门面，供任务列表与管理员列表接口使用。
pub struct TaskStatusService<R: TaskRepository> {
    repository: Arc<R>,
}

impl<R: TaskRepository> TaskStatusService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// 分页查询任务，按入队时间倒序
    ///
    /// # 参数
    ///
    /// * `params` - 查询参数，`limit` 为 0 时使用默认值，超过上限时截断
    ///
    /// # 返回值
    ///
    /// * `Ok(TaskPage)` - 当前页与总数
    /// * `Err(RepositoryError)` - 查询失败
    pub async fn list(&self, mut params: TaskQueryParams) -> Result<TaskPage, RepositoryError> {
        params.limit = match params.limit {
            0 => DEFAULT_PAGE_LIMIT,
            limit => limit.min(MAX_PAGE_LIMIT),
        };
        let (limit, offset) = (params.limit, params.offset);

        let (tasks, total) = self.repository.query_tasks(params).await?;

        Ok(TaskPage {
            tasks,
            total,
            limit,
            offset,
        })
    }

    /// 按组织查询单个任务；其他组织的任务视为不存在
    pub async fn fetch(&self, org_id: &str, id: Uuid) -> Result<Option<TaskDetail>, RepositoryError> {
        let task = match self.repository.find_by_id(id).await? {
            Some(task) if task.org_id == org_id => task,
            _ => return Ok(None),
        };

        let dependents = self.repository.find_dependents(id).await?;
        Ok(Some(TaskDetail { task, dependents }))
    }
}

#[cfg(test)]
#[path = "task_status_service_test.rs"]
mod tests;
