// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 有新任务可领取时的通知频道
pub const TASKS_CHANNEL: &str = "content_tasks";

/// 运行中任务被请求取消时的通知频道，负载为任务ID
pub const TASK_CANCELED_CHANNEL: &str = "content_tasks_canceled";

const CANCELLATION_CAPACITY: usize = 64;

#[async_trait]
pub trait TaskNotifier: Send + Sync {
    /// 发布唤醒通知
    async fn notify(&self);

    /// 发布运行中任务的取消请求
    async fn notify_canceled(&self, id: Uuid);

    /// 本进程内工作器共享的唤醒信号
    fn wake_signal(&self) -> Arc<Notify>;

    /// 订阅取消请求
    fn cancellations(&self) -> broadcast::Receiver<Uuid>;
}

/// 仅在本进程内生效的通知器
#[derive(Clone)]
pub struct LocalTaskNotifier {
    signal: Arc<Notify>,
    canceled: broadcast::Sender<Uuid>,
}

impl LocalTaskNotifier {
    pub fn new() -> Self {
        let (canceled, _) = broadcast::channel(CANCELLATION_CAPACITY);
        Self {
            signal: Arc::new(Notify::new()),
            canceled,
        }
    }
}

impl Default for LocalTaskNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskNotifier for LocalTaskNotifier {
    async fn notify(&self) {
        self.signal.notify_waiters();
    }

    async fn notify_canceled(&self, id: Uuid) {
        // 没有订阅者时发送失败，可以忽略
        let _ = self.canceled.send(id);
    }

    fn wake_signal(&self) -> Arc<Notify> {
        self.signal.clone()
    }

    fn cancellations(&self) -> broadcast::Receiver<Uuid> {
        self.canceled.subscribe()
    }
}

/// 基于 Postgres `LISTEN/NOTIFY` 的跨进程通知器
pub struct PgTaskNotifier {
    db: Arc<DatabaseConnection>,
    local: LocalTaskNotifier,
}

impl PgTaskNotifier {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            local: LocalTaskNotifier::new(),
        }
    }

    /// 启动监听任务
    ///
    /// 任务频道的通知唤醒本进程内所有等待的工作器，取消频道的通知
    /// 转发给正在执行该任务的工作器。连接断开时等待一秒后重连，
    /// 直到收到关闭信号。
    ///
    /// # 参数
    ///
    /// * `database_url` - 监听使用的独立连接地址
    /// * `shutdown` - 关闭信号
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn listen(&self, database_url: String, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let signal = self.local.signal.clone();
        let canceled = self.local.canceled.clone();

        tokio::spawn(async move {
            info!(
                "Task notification listener starting on channels {}, {}",
                TASKS_CHANNEL, TASK_CANCELED_CHANNEL
            );

            while !*shutdown.borrow() {
                let mut listener = match PgListener::connect(&database_url).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        warn!("Failed to connect task notification listener: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                            _ = shutdown.changed() => break,
                        }
                    }
                };

                if let Err(e) = listener
                    .listen_all([TASKS_CHANNEL, TASK_CANCELED_CHANNEL])
                    .await
                {
                    warn!("Failed to LISTEN on task channels: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                        _ = shutdown.changed() => break,
                    }
                }

                loop {
                    tokio::select! {
                        received = listener.recv() => match received {
                            Ok(notification) if notification.channel() == TASK_CANCELED_CHANNEL => {
                                match notification.payload().parse::<Uuid>() {
                                    Ok(id) => {
                                        debug!(task_id = %id, "Task cancellation received");
                                        let _ = canceled.send(id);
                                    }
                                    Err(e) => warn!(
                                        "Ignoring cancellation with invalid task id {:?}: {}",
                                        notification.payload(),
                                        e
                                    ),
                                }
                            }
                            Ok(_) => {
                                debug!("Task notification received");
                                signal.notify_waiters();
                            }
                            Err(e) => {
                                warn!("Task notification listener error: {}", e);
                                // 重连期间可能错过通知，先唤醒一次让工作器重新领取
                                signal.notify_waiters();
                                break;
                            }
                        },
                        _ = shutdown.changed() => break,
                    }
                }
            }

            info!("Task notification listener stopped");
        })
    }
}

#[async_trait]
impl TaskNotifier for PgTaskNotifier {
    async fn notify(&self) {
        self.local.notify().await;
        if let Err(e) = self
            .db
            .execute_unprepared(&format!("NOTIFY {}", TASKS_CHANNEL))
            .await
        {
            warn!("Failed to publish task notification: {}", e);
        }
    }

    async fn notify_canceled(&self, id: Uuid) {
        self.local.notify_canceled(id).await;
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_notify($1, $2)",
            [TASK_CANCELED_CHANNEL.into(), id.to_string().into()],
        );
        if let Err(e) = self.db.execute(statement).await {
            warn!(task_id = %id, "Failed to publish task cancellation: {}", e);
        }
    }

    fn wake_signal(&self) -> Arc<Notify> {
        self.local.wake_signal()
    }

    fn cancellations(&self) -> broadcast::Receiver<Uuid> {
        self.local.cancellations()
    }
}
