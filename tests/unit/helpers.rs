// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use content_tasks::domain::models::task::{Task, TaskStatus};
use content_tasks::domain::services::content_service::{
    ContentError, ContentService, RemoteTaskState,
};
use content_tasks::infrastructure::repositories::memory_task_repo::MemoryTaskRepository;
use content_tasks::queue::notifier::LocalTaskNotifier;
use content_tasks::queue::task_queue::{LeasedTaskQueue, QueueOptions, TaskQueue};
use content_tasks::utils::backoff::PollBackoff;
use content_tasks::workers::manager::PoolOptions;
use content_tasks::workers::task_worker::WorkerOptions;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 内存仓库上的队列，租约很短以便测试心跳与回收
pub fn memory_queue() -> (Arc<MemoryTaskRepository>, Arc<dyn TaskQueue>) {
    memory_queue_with_lease(Duration::from_millis(300))
}

pub fn memory_queue_with_lease(
    lease_timeout: Duration,
) -> (Arc<MemoryTaskRepository>, Arc<dyn TaskQueue>) {
    let repo = Arc::new(MemoryTaskRepository::new());
    let queue: Arc<dyn TaskQueue> = Arc::new(LeasedTaskQueue::new(
        repo.clone(),
        Arc::new(LocalTaskNotifier::new()),
        QueueOptions {
            lease_timeout,
            max_retries: 3,
        },
    ));
    (repo, queue)
}

pub fn fast_worker_options() -> WorkerOptions {
    WorkerOptions {
        heartbeat_interval: Duration::from_millis(50),
        poll: PollBackoff::new(Duration::from_millis(10), Duration::from_millis(50)),
        shutdown_grace: Duration::from_millis(200),
    }
}

pub fn fast_pool_options(worker_count: usize) -> PoolOptions {
    PoolOptions {
        worker_count,
        worker: fast_worker_options(),
        reaper_interval: Duration::from_millis(50),
    }
}

/// 比所有租约都晚的时间点
pub fn far_future() -> DateTime<FixedOffset> {
    (Utc::now() + chrono::Duration::hours(1)).into()
}

/// 等待任务进入指定状态，超时则测试失败
pub async fn wait_for_status(queue: &Arc<dyn TaskQueue>, id: Uuid, status: TaskStatus) -> Task {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = queue.fetch(id).await.unwrap() {
                if task.status == status {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {} never reached {:?}", id, status))
}

#[derive(Default)]
struct FakeState {
    calls: HashMap<&'static str, usize>,
    remote_state: Option<RemoteTaskState>,
    deleted_snapshots: HashSet<Uuid>,
    deleted_templates: HashSet<Uuid>,
    deleted_distributions: HashSet<(Uuid, Uuid)>,
    distribution_deletes: HashMap<Uuid, usize>,
    distributions: HashMap<Uuid, Vec<Uuid>>,
}

/// 记录调用次数的内容服务
///
/// 删除操作第二次调用同一资源时返回 `NotFound`，和真实服务一致。
#[derive(Default)]
pub struct FakeContentService {
    state: Mutex<FakeState>,
}

impl FakeContentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn set_remote_state(&self, state: RemoteTaskState) {
        self.state.lock().remote_state = Some(state);
    }

    pub fn distributions(&self, template_uuid: Uuid) -> Option<Vec<Uuid>> {
        self.state.lock().distributions.get(&template_uuid).cloned()
    }

    /// 某个仓库的分发被请求删除的次数
    pub fn distribution_deletes(&self, repository_uuid: Uuid) -> usize {
        self.state
            .lock()
            .distribution_deletes
            .get(&repository_uuid)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> usize {
        let mut state = self.state.lock();
        let count = state.calls.entry(operation).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl ContentService for FakeContentService {
    async fn introspect(&self, _url: &str) -> Result<(), ContentError> {
        self.record("introspect");
        Ok(())
    }

    async fn start_snapshot(
        &self,
        _org_id: &str,
        repository_uuid: Uuid,
    ) -> Result<String, ContentError> {
        let n = self.record("start_snapshot");
        Ok(format!("/api/tasks/{}/{}", repository_uuid, n))
    }

    async fn remote_task(&self, _href: &str) -> Result<RemoteTaskState, ContentError> {
        self.record("remote_task");
        Ok(self
            .state
            .lock()
            .remote_state
            .clone()
            .unwrap_or(RemoteTaskState::Completed))
    }

    async fn delete_repository_snapshots(
        &self,
        _org_id: &str,
        repository_uuid: Uuid,
    ) -> Result<(), ContentError> {
        self.record("delete_repository_snapshots");
        if self.state.lock().deleted_snapshots.insert(repository_uuid) {
            Ok(())
        } else {
            Err(ContentError::NotFound)
        }
    }

    async fn update_template_distributions(
        &self,
        _org_id: &str,
        template_uuid: Uuid,
        repository_uuids: &[Uuid],
    ) -> Result<(), ContentError> {
        self.record("update_template_distributions");
        self.state
            .lock()
            .distributions
            .insert(template_uuid, repository_uuids.to_vec());
        Ok(())
    }

    async fn delete_template_distribution(
        &self,
        _org_id: &str,
        template_uuid: Uuid,
        repository_uuid: Uuid,
    ) -> Result<(), ContentError> {
        self.record("delete_template_distribution");
        let mut state = self.state.lock();
        *state.distribution_deletes.entry(repository_uuid).or_insert(0) += 1;
        if state
            .deleted_distributions
            .insert((template_uuid, repository_uuid))
        {
            Ok(())
        } else {
            Err(ContentError::NotFound)
        }
    }

    async fn delete_template(&self, _org_id: &str, template_uuid: Uuid) -> Result<(), ContentError> {
        self.record("delete_template");
        if self.state.lock().deleted_templates.insert(template_uuid) {
            Ok(())
        } else {
            Err(ContentError::NotFound)
        }
    }
}
