// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{
    Task, TaskStatus, LEASE_EXPIRED_ERROR, PARENT_FAILED_ERROR,
};
use crate::domain::repositories::task_repository::{
    CancelOutcome, ReapReport, RepositoryError, TaskQueryParams, TaskRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    tasks: HashMap<Uuid, (u64, Task)>,
    next_seq: u64,
}

impl MemoryState {
    fn held_mut(&mut self, id: Uuid, lease_token: Uuid) -> Result<&mut Task, RepositoryError> {
        match self.tasks.get_mut(&id) {
            Some((_, task)) if task.holds_lease(lease_token) => Ok(task),
            _ => Err(RepositoryError::LeaseLost),
        }
    }

    fn status_of(&self, id: Uuid) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|(_, task)| task.status)
    }

    fn replace(&mut self, id: Uuid, f: impl FnOnce(Task) -> Result<Task, RepositoryError>) -> Result<(), RepositoryError> {
        let (seq, task) = self.tasks.remove(&id).ok_or(RepositoryError::NotFound)?;
        let result = f(task.clone());
        match result {
            Ok(updated) => {
                self.tasks.insert(id, (seq, updated));
                Ok(())
            }
            Err(e) => {
                self.tasks.insert(id, (seq, task));
                Err(e)
            }
        }
    }

    fn cascade_failure(&mut self, root: Uuid) -> Result<u64, RepositoryError> {
        let mut frontier = vec![root];
        let mut cascaded = 0;

        while !frontier.is_empty() {
            let children: Vec<Uuid> = self
                .tasks
                .values()
                .filter(|(_, task)| {
                    task.status == TaskStatus::Pending
                        && task.depends_on.map(|p| frontier.contains(&p)).unwrap_or(false)
                })
                .map(|(_, task)| task.id)
                .collect();

            for child in &children {
                self.replace(*child, |task| Ok(task.fail(PARENT_FAILED_ERROR)?))?;
                cascaded += 1;
            }
            frontier = children;
        }

        Ok(cascaded)
    }

    fn claimable(&self, task: &Task, type_names: &[String]) -> bool {
        task.status == TaskStatus::Pending
            && type_names.iter().any(|t| t == &task.type_name)
            && match task.depends_on {
                None => true,
                Some(parent) => self.status_of(parent) == Some(TaskStatus::Completed),
            }
    }
}

/// 进程内任务仓库
///
/// 与 Postgres 实现语义一致的内存存储，所有操作在同一把锁内完成，
/// 适用于单进程开发环境和单元测试。
#[derive(Default)]
pub struct MemoryTaskRepository {
    state: Mutex<MemoryState>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存储的任务数量
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expiry_after(lease_timeout: Duration) -> DateTime<FixedOffset> {
    let timeout = chrono::Duration::from_std(lease_timeout)
        .unwrap_or_else(|_| chrono::Duration::seconds(30));
    (Utc::now() + timeout).into()
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn insert(&self, task: &Task) -> Result<Task, RepositoryError> {
        let mut state = self.state.lock();
        let mut task = task.clone();

        if let Some(parent_id) = task.depends_on {
            let parent_status = state
                .status_of(parent_id)
                .ok_or(RepositoryError::ParentNotFound(parent_id))?;
            if parent_status.fails_dependents() {
                task = task.fail(PARENT_FAILED_ERROR)?;
            }
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        state.tasks.insert(task.id, (seq, task.clone()));
        Ok(task)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, RepositoryError> {
        Ok(self.state.lock().tasks.get(&id).map(|(_, task)| task.clone()))
    }

    async fn claim_next(
        &self,
        type_names: &[String],
        lease_token: Uuid,
        lease_timeout: Duration,
    ) -> Result<Option<Task>, RepositoryError> {
        let mut state = self.state.lock();

        let next = state
            .tasks
            .values()
            .filter(|(_, task)| state.claimable(task, type_names))
            .min_by_key(|(seq, task)| (task.queued_at, *seq))
            .map(|(_, task)| task.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let lease_expires_at = expiry_after(lease_timeout);
        state.replace(id, |task| Ok(task.start(lease_token, lease_expires_at)?))?;
        Ok(state.tasks.get(&id).map(|(_, task)| task.clone()))
    }

    async fn renew_lease(
        &self,
        id: Uuid,
        lease_token: Uuid,
        lease_timeout: Duration,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        let task = state.held_mut(id, lease_token)?;
        task.lease_expires_at = Some(expiry_after(lease_timeout));
        Ok(task.cancel_requested)
    }

    async fn complete(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state.held_mut(id, lease_token)?;
        state.replace(id, |task| Ok(task.complete()?))
    }

    async fn fail(
        &self,
        id: Uuid,
        lease_token: Uuid,
        error: &str,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock();
        state.held_mut(id, lease_token)?;
        state.replace(id, |task| Ok(task.fail(error)?))?;
        state.cascade_failure(id)
    }

    async fn mark_canceled(&self, id: Uuid, lease_token: Uuid) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock();
        state.held_mut(id, lease_token)?;
        state.replace(id, |task| Ok(task.cancel()?))?;
        state.cascade_failure(id)
    }

    async fn release(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state.held_mut(id, lease_token)?;
        state.replace(id, |task| Ok(task.requeue()?))
    }

    async fn update_payload(
        &self,
        id: Uuid,
        lease_token: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state.held_mut(id, lease_token)?.payload = payload;
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome, RepositoryError> {
        let mut state = self.state.lock();
        let status = state.status_of(id).ok_or(RepositoryError::NotFound)?;

        match status {
            TaskStatus::Pending => {
                state.replace(id, |task| Ok(task.cancel()?))?;
                state.cascade_failure(id)?;
                Ok(CancelOutcome::Canceled)
            }
            TaskStatus::Running => {
                if let Some((_, task)) = state.tasks.get_mut(&id) {
                    task.cancel_requested = true;
                }
                Ok(CancelOutcome::Requested)
            }
            _ => Err(RepositoryError::AlreadyTerminal),
        }
    }

    async fn reap_expired(
        &self,
        as_of: Option<DateTime<FixedOffset>>,
        max_retries: i32,
    ) -> Result<ReapReport, RepositoryError> {
        let now = as_of.unwrap_or_else(|| Utc::now().into());
        let mut state = self.state.lock();
        let mut report = ReapReport::default();

        let mut expired: Vec<(Option<DateTime<FixedOffset>>, Uuid, bool, i32)> = state
            .tasks
            .values()
            .filter(|(_, task)| task.lease_expired_at(now))
            .map(|(_, task)| {
                (
                    task.lease_expires_at,
                    task.id,
                    task.cancel_requested,
                    task.retry_count,
                )
            })
            .collect();
        expired.sort();

        for (_, id, cancel_requested, retry_count) in expired {
            if cancel_requested {
                state.replace(id, |task| Ok(task.cancel()?))?;
                report.canceled += 1;
                report.cascaded += state.cascade_failure(id)?;
            } else if retry_count < max_retries {
                state.replace(id, |task| Ok(task.requeue()?))?;
                report.requeued += 1;
            } else {
                state.replace(id, |task| Ok(task.fail(LEASE_EXPIRED_ERROR)?))?;
                report.failed += 1;
                report.cascaded += state.cascade_failure(id)?;
            }
        }

        loop {
            let orphans: Vec<Uuid> = state
                .tasks
                .values()
                .filter(|(_, task)| {
                    task.status == TaskStatus::Pending
                        && task
                            .depends_on
                            .and_then(|parent| state.status_of(parent))
                            .map(|status| status.fails_dependents())
                            .unwrap_or(false)
                })
                .map(|(_, task)| task.id)
                .collect();

            if orphans.is_empty() {
                break;
            }
            for id in orphans {
                state.replace(id, |task| Ok(task.fail(PARENT_FAILED_ERROR)?))?;
                report.cascaded += 1;
            }
        }

        Ok(report)
    }

    async fn query_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<Task>, u64), RepositoryError> {
        let state = self.state.lock();

        let mut matched: Vec<&(u64, Task)> = state
            .tasks
            .values()
            .filter(|(_, task)| {
                params.org_id.as_ref().map_or(true, |org| &task.org_id == org)
                    && params
                        .account_id
                        .as_ref()
                        .map_or(true, |account| task.account_id.as_ref() == Some(account))
                    && params
                        .statuses
                        .as_ref()
                        .map_or(true, |statuses| statuses.contains(&task.status))
                    && params
                        .type_names
                        .as_ref()
                        .map_or(true, |types| types.contains(&task.type_name))
                    && params
                        .resource_uuid
                        .map_or(true, |uuid| task.resource.map(|r| r.uuid) == Some(uuid))
            })
            .collect();

        matched.sort_by(|(a_seq, a), (b_seq, b)| {
            (b.queued_at, b_seq).cmp(&(a.queued_at, a_seq))
        });

        let total = matched.len() as u64;
        let tasks = matched
            .into_iter()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .map(|(_, task)| task.clone())
            .collect();

        Ok((tasks, total))
    }

    async fn find_dependents(&self, id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let state = self.state.lock();

        let mut dependents: Vec<(DateTime<FixedOffset>, u64, Uuid)> = state
            .tasks
            .values()
            .filter(|(_, task)| task.depends_on == Some(id))
            .map(|(seq, task)| (task.queued_at, *seq, task.id))
            .collect();
        dependents.sort();

        Ok(dependents.into_iter().map(|(_, _, id)| id).collect())
    }
}
