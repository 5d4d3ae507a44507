// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use content_tasks::config::settings::Settings;
use content_tasks::domain::services::content_service::ContentService;
use content_tasks::domain::services::task_status_service::TaskStatusService;
use content_tasks::infrastructure::database::connection;
use content_tasks::infrastructure::metrics;
use content_tasks::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use content_tasks::infrastructure::services::http_content_service::HttpContentService;
use content_tasks::presentation::routes;
use content_tasks::queue::client::{QueueTaskClient, TaskClient};
use content_tasks::queue::notifier::{LocalTaskNotifier, PgTaskNotifier, TaskNotifier};
use content_tasks::queue::task_queue::{LeasedTaskQueue, TaskQueue};
use content_tasks::utils::telemetry;
use content_tasks::workers::handlers::register_builtin_handlers;
use content_tasks::workers::manager::{PoolOptions, WorkerPool};
use content_tasks::workers::registry::HandlerRegistry;
use migration::{Migrator, MigratorTrait};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// 主函数
///
/// 应用程序入口点，按运行模式启动 HTTP 接口和/或工作池
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.logging.json);
    info!("Starting content-tasks in {:?} mode", settings.runtime.mode);
    metrics::init_metrics(&settings.metrics);

    // 3. Connect to database
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Initialize queue
    let task_repo = Arc::new(TaskRepositoryImpl::new(db.clone()));
    let pg_notifier = settings
        .tasking
        .notifications
        .then(|| Arc::new(PgTaskNotifier::new(db.clone())));
    let notifier: Arc<dyn TaskNotifier> = match &pg_notifier {
        Some(notifier) => notifier.clone(),
        None => Arc::new(LocalTaskNotifier::new()),
    };
    let queue: Arc<dyn TaskQueue> = Arc::new(LeasedTaskQueue::new(
        task_repo.clone(),
        notifier,
        settings.tasking.queue_options(),
    ));

    // 5. Start workers
    let pool = if settings.runtime.mode.runs_workers() {
        let content: Arc<dyn ContentService> =
            Arc::new(HttpContentService::from_settings(&settings.content)?);
        let mut registry = HandlerRegistry::new();
        register_builtin_handlers(
            &mut registry,
            content,
            Duration::from_millis(settings.content.poll_interval_ms),
        );

        let mut pool = WorkerPool::new(
            queue.clone(),
            registry,
            PoolOptions::from(&settings.tasking),
        );
        if let Some(notifier) = &pg_notifier {
            let listener = notifier.listen(settings.database.url.clone(), pool.shutdown_receiver());
            pool.attach(listener);
        }
        pool.start();
        Some(pool)
    } else {
        None
    };

    // 6. Start HTTP server
    if settings.runtime.mode.serves_api() {
        let client: Arc<dyn TaskClient> = Arc::new(QueueTaskClient::new(queue.clone()));
        let status_service = Arc::new(TaskStatusService::new(task_repo.clone()));
        let app = routes::routes(client, status_service);

        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    if let Some(pool) = pool {
        pool.shutdown().await?;
    }

    info!("content-tasks stopped");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
