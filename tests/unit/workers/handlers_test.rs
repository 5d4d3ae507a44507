// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::{
    far_future, fast_worker_options, memory_queue, FakeContentService,
};
use content_tasks::domain::models::payloads::{SnapshotPayload, TaskKind};
use content_tasks::domain::models::task::{NewTask, Task, TaskStatus};
use content_tasks::domain::services::content_service::RemoteTaskState;
use content_tasks::queue::task_queue::TaskQueue;
use content_tasks::workers::handlers::{register_builtin_handlers, SnapshotHandler};
use content_tasks::workers::registry::{
    CancelSignal, HandlerError, HandlerRegistry, TaskContext, TaskHandler,
};
use content_tasks::workers::task_worker::TaskWorker;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

struct Harness {
    queue: Arc<dyn TaskQueue>,
    registry: Arc<HandlerRegistry>,
    content: Arc<FakeContentService>,
}

impl Harness {
    fn new() -> Self {
        let (_repo, queue) = memory_queue();
        let content = Arc::new(FakeContentService::new());
        let mut registry = HandlerRegistry::new();
        register_builtin_handlers(&mut registry, content.clone(), Duration::from_millis(10));

        Self {
            queue,
            registry: Arc::new(registry),
            content,
        }
    }

    async fn enqueue(&self, kind: TaskKind, payload: Value) -> Uuid {
        self.queue
            .enqueue(NewTask::new(kind.as_str(), "org-1", payload))
            .await
            .unwrap()
    }

    /// 领取任务并直接构造处理器上下文，模拟一个随后崩溃的工作器
    async fn claim_context(&self, kind: TaskKind, cancel: CancelSignal) -> TaskContext {
        let claimed = self
            .queue
            .claim(&[kind.as_str().to_string()])
            .await
            .unwrap()
            .expect("task should be claimable");
        TaskContext::new(claimed.task, claimed.lease_token, self.queue.clone(), cancel)
    }

    fn handler(&self, kind: TaskKind) -> Arc<dyn TaskHandler> {
        self.registry.get(kind.as_str()).unwrap()
    }

    /// 租约过期，回收器把任务重新排队
    async fn reap(&self) {
        let report = self.queue.reap_expired(Some(far_future())).await.unwrap();
        assert_eq!(report.requeued, 1);
    }

    /// 由正常的工作器完成剩余执行
    async fn run_worker(&self, kind: TaskKind, id: Uuid) -> Task {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = TaskWorker::new(
            self.queue.clone(),
            self.registry.clone(),
            fast_worker_options(),
            shutdown_rx,
        );
        assert!(worker
            .process_next(&[kind.as_str().to_string()])
            .await
            .unwrap());
        self.queue.fetch(id).await.unwrap().unwrap()
    }

    /// 第一次执行完整跑完处理器但没有记录结果，然后回收并重新执行
    async fn crash_after_execution_and_reclaim(&self, kind: TaskKind, payload: Value) -> Task {
        let id = self.enqueue(kind, payload).await;

        let ctx = self.claim_context(kind, CancelSignal::never()).await;
        self.handler(kind).execute(ctx).await.unwrap();

        self.reap().await;
        self.run_worker(kind, id).await
    }
}

#[tokio::test]
async fn test_builtin_handlers_cover_every_task_kind() {
    let harness = Harness::new();
    let mut expected: Vec<String> = TaskKind::ALL.iter().map(|k| k.as_str().to_string()).collect();
    expected.sort();
    assert_eq!(harness.registry.task_types(), expected);
}

#[tokio::test]
async fn test_snapshot_resumes_checkpointed_remote_task() {
    let harness = Harness::new();
    harness.content.set_remote_state(RemoteTaskState::Running);
    let repository_uuid = Uuid::new_v4();
    let id = harness
        .enqueue(
            TaskKind::Snapshot,
            json!({ "repository_config_uuid": repository_uuid }),
        )
        .await;

    // 第一次执行在轮询远端任务时崩溃
    let ctx = harness
        .claim_context(TaskKind::Snapshot, CancelSignal::never())
        .await;
    let handler = harness.handler(TaskKind::Snapshot);
    let first_run = tokio::spawn(async move { handler.execute(ctx).await });
    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.content.calls("remote_task") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    first_run.abort();

    let task = harness.queue.fetch(id).await.unwrap().unwrap();
    let payload: SnapshotPayload = serde_json::from_value(task.payload).unwrap();
    assert!(payload.sync_task_href.is_some());

    harness.reap().await;
    harness.content.set_remote_state(RemoteTaskState::Completed);
    let task = harness.run_worker(TaskKind::Snapshot, id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 1);
    assert_eq!(harness.content.calls("start_snapshot"), 1);
}

#[tokio::test]
async fn test_snapshot_remote_failure_fails_task() {
    let harness = Harness::new();
    harness.content.set_remote_state(RemoteTaskState::Failed {
        error: "sync failed".to_string(),
    });
    let id = harness
        .enqueue(
            TaskKind::Snapshot,
            json!({ "repository_config_uuid": Uuid::new_v4() }),
        )
        .await;

    let task = harness.run_worker(TaskKind::Snapshot, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("remote task failed: sync failed"));
}

#[tokio::test]
async fn test_snapshot_stops_polling_when_canceled() {
    let harness = Harness::new();
    harness.content.set_remote_state(RemoteTaskState::Running);
    harness
        .enqueue(
            TaskKind::Snapshot,
            json!({ "repository_config_uuid": Uuid::new_v4() }),
        )
        .await;

    let (cancel_tx, cancel) = CancelSignal::channel();
    let ctx = harness.claim_context(TaskKind::Snapshot, cancel).await;
    let handler = SnapshotHandler::new(harness.content.clone(), Duration::from_millis(10));
    let run = tokio::spawn(async move { handler.execute(ctx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(HandlerError::Canceled)));
}

#[tokio::test]
async fn test_introspect_reruns_after_crash() {
    let harness = Harness::new();
    let task = harness
        .crash_after_execution_and_reclaim(
            TaskKind::Introspect,
            json!({ "url": "https://cdn.example.com/repo/el9/" }),
        )
        .await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(harness.content.calls("introspect"), 2);
}

#[tokio::test]
async fn test_invalid_payload_fails_task() {
    let harness = Harness::new();
    let id = harness.enqueue(TaskKind::Introspect, json!({})).await;

    let task = harness.run_worker(TaskKind::Introspect, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().starts_with("invalid payload"));
    assert_eq!(harness.content.calls("introspect"), 0);
}

#[tokio::test]
async fn test_delete_snapshots_rerun_tolerates_missing_snapshots() {
    let harness = Harness::new();
    let task = harness
        .crash_after_execution_and_reclaim(
            TaskKind::DeleteRepositorySnapshots,
            json!({ "repository_config_uuid": Uuid::new_v4() }),
        )
        .await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(harness.content.calls("delete_repository_snapshots"), 2);
}

#[tokio::test]
async fn test_update_template_distributions_rerun_converges() {
    let harness = Harness::new();
    let template_uuid = Uuid::new_v4();
    let repositories = vec![Uuid::new_v4(), Uuid::new_v4()];
    let task = harness
        .crash_after_execution_and_reclaim(
            TaskKind::UpdateTemplateDistributions,
            json!({
                "template_uuid": template_uuid,
                "repository_config_uuids": repositories,
            }),
        )
        .await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(harness.content.calls("update_template_distributions"), 2);
    assert_eq!(harness.content.distributions(template_uuid), Some(repositories));
}

#[tokio::test]
async fn test_delete_templates_rerun_tolerates_missing_template() {
    let harness = Harness::new();
    let repositories = [Uuid::new_v4(), Uuid::new_v4()];
    let task = harness
        .crash_after_execution_and_reclaim(
            TaskKind::DeleteTemplates,
            json!({
                "template_uuid": Uuid::new_v4(),
                "repository_config_uuids": repositories,
            }),
        )
        .await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(harness.content.calls("delete_template"), 2);
    // 每次执行都会删除每个仓库的分发，重复执行时的 NotFound 视为成功
    assert_eq!(harness.content.calls("delete_template_distribution"), 4);
    for repository_uuid in repositories {
        assert_eq!(harness.content.distribution_deletes(repository_uuid), 2);
    }
}
