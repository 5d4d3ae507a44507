// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::start_database;
use content_tasks::domain::models::task::{NewTask, TaskStatus};
use content_tasks::queue::notifier::{PgTaskNotifier, TaskNotifier};
use content_tasks::queue::task_queue::{CancelOutcome, LeasedTaskQueue, QueueOptions, TaskQueue};
use content_tasks::utils::backoff::PollBackoff;
use content_tasks::workers::manager::{PoolOptions, WorkerPool};
use content_tasks::workers::registry::{HandlerError, HandlerRegistry};
use content_tasks::workers::task_worker::WorkerOptions;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

fn pool_options() -> PoolOptions {
    PoolOptions {
        worker_count: 3,
        worker: WorkerOptions {
            heartbeat_interval: Duration::from_millis(200),
            // 轮询很慢，任务能及时完成说明唤醒通知生效
            poll: PollBackoff::new(Duration::from_secs(2), Duration::from_secs(5)),
            shutdown_grace: Duration::from_millis(500),
        },
        reaper_interval: Duration::from_millis(200),
    }
}

/// 两个"进程"共享同一个数据库：每个任务恰好执行一次
#[tokio::test]
async fn test_two_pools_share_one_store() {
    let test_db = start_database().await;
    let executions: Arc<Mutex<HashMap<Uuid, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut pools = Vec::new();
    let mut queues = Vec::new();
    for _ in 0..2 {
        let notifier = Arc::new(PgTaskNotifier::new(test_db.db.clone()));
        let queue: Arc<dyn TaskQueue> = Arc::new(LeasedTaskQueue::new(
            test_db.repository(),
            notifier.clone(),
            QueueOptions {
                lease_timeout: Duration::from_secs(2),
                max_retries: 3,
            },
        ));

        let mut registry = HandlerRegistry::new();
        let executions = executions.clone();
        registry.register_fn("introspect", move |ctx| {
            let executions = executions.clone();
            async move {
                *executions.lock().entry(ctx.task().id).or_insert(0) += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }
        });

        let mut pool = WorkerPool::new(queue.clone(), registry, pool_options());
        pool.attach(notifier.listen(test_db.url.clone(), pool.shutdown_receiver()));
        pool.start();
        pools.push(pool);
        queues.push(queue);
    }

    // 等监听连接建立
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut ids = Vec::new();
    for n in 0..30 {
        let queue = &queues[n % 2];
        ids.push(
            queue
                .enqueue(NewTask::new("introspect", "org-1", json!({ "n": n })))
                .await
                .unwrap(),
        );
    }

    tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let mut done = 0;
            for id in &ids {
                if queues[0].fetch(*id).await.unwrap().unwrap().status == TaskStatus::Completed {
                    done += 1;
                }
            }
            if done == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("tasks did not complete");

    for pool in pools {
        pool.shutdown().await.unwrap();
    }

    let executions = executions.lock();
    assert_eq!(executions.len(), 30);
    assert!(executions.values().all(|count| *count == 1));
}

/// 另一个进程发出的 NOTIFY 唤醒本进程的等待者
#[tokio::test]
async fn test_notification_crosses_processes() {
    let test_db = start_database().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = PgTaskNotifier::new(test_db.db.clone());
    let handle = listener.listen(test_db.url.clone(), shutdown_rx);
    let publisher = PgTaskNotifier::new(test_db.db.clone());

    let wake = listener.wake_signal();
    let notified = wake.notified();
    tokio::pin!(notified);

    // 监听连接建立前发出的通知会丢失，持续发送直到收到
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            tokio::select! {
                _ = &mut notified => break,
                _ = tokio::time::sleep(Duration::from_millis(100)) => publisher.notify().await,
            }
        }
    })
    .await
    .expect("notification was not delivered");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

/// 另一个进程发出的取消请求不等心跳即送达正在执行的处理器
#[tokio::test]
async fn test_cancellation_crosses_processes() {
    let test_db = start_database().await;
    let options = QueueOptions {
        lease_timeout: Duration::from_secs(60),
        max_retries: 3,
    };

    // 执行任务的进程
    let worker_notifier = Arc::new(PgTaskNotifier::new(test_db.db.clone()));
    let worker_queue: Arc<dyn TaskQueue> = Arc::new(LeasedTaskQueue::new(
        test_db.repository(),
        worker_notifier.clone(),
        options,
    ));
    let mut registry = HandlerRegistry::new();
    registry.register_fn("snapshot", |ctx| async move {
        ctx.cancel_signal().canceled().await;
        Err(HandlerError::Canceled)
    });
    let mut pool_options = pool_options();
    pool_options.worker_count = 1;
    pool_options.worker.heartbeat_interval = Duration::from_secs(20);
    let mut pool = WorkerPool::new(worker_queue.clone(), registry, pool_options);
    pool.attach(worker_notifier.listen(test_db.url.clone(), pool.shutdown_receiver()));
    pool.start();

    // 发起取消的进程
    let api_queue: Arc<dyn TaskQueue> = Arc::new(LeasedTaskQueue::new(
        test_db.repository(),
        Arc::new(PgTaskNotifier::new(test_db.db.clone())),
        options,
    ));

    let id = api_queue
        .enqueue(NewTask::new("snapshot", "org-1", json!({})))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let task = api_queue.fetch(id).await.unwrap().unwrap();
            if task.status == TaskStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("task was not claimed");
    // 等处理器订阅取消通知
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(api_queue.cancel(id).await.unwrap(), CancelOutcome::Requested);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let task = api_queue.fetch(id).await.unwrap().unwrap();
            if task.status == TaskStatus::Canceled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("cancellation did not reach the handler before the next heartbeat");

    pool.shutdown().await.unwrap();
}
