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

use crate::domain::models::task::{
    ResourceRef, Task, TaskStatus, LEASE_EXPIRED_ERROR, PARENT_FAILED_ERROR,
};
use crate::domain::repositories::task_repository::{
    CancelOutcome, ReapReport, RepositoryError, TaskQueryParams, TaskRepository,
};
use crate::infrastructure::database::entities::task as task_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, LockBehavior, LockType, SimpleExpr},
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait, UpdateMany,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use task_entity::Column;

/// 父任务已成功完成
const PARENT_COMPLETED: &str = r#"EXISTS (SELECT 1 FROM "tasks" AS "parent" WHERE "parent"."id" = "tasks"."depends_on" AND "parent"."status" = 'completed')"#;

/// 父任务已失败或被取消
const PARENT_FAILED: &str = r#"EXISTS (SELECT 1 FROM "tasks" AS "parent" WHERE "parent"."id" = "tasks"."depends_on" AND "parent"."status" IN ('failed', 'canceled'))"#;

/// 任务仓库实现
///
/// 基于SeaORM实现的 Postgres 任务记录存储。领取使用
/// `FOR UPDATE SKIP LOCKED`，并发工作器之间不会互相阻塞，
/// 也不会领取到同一行。
#[derive(Clone)]
pub struct TaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl TaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    ///
    /// # 返回值
    ///
    /// 返回新的任务仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<task_entity::Model> for Task {
    type Error = RepositoryError;

    fn try_from(model: task_entity::Model) -> Result<Self, Self::Error> {
        let resource = match (model.resource_type.as_deref(), model.resource_uuid) {
            (Some(kind), Some(uuid)) => Some(ResourceRef {
                kind: kind.parse().map_err(RepositoryError::Corrupted)?,
                uuid,
            }),
            _ => None,
        };

        Ok(Self {
            id: model.id,
            type_name: model.type_name,
            payload: model.payload,
            org_id: model.org_id,
            account_id: model.account_id,
            resource,
            correlation_id: model.correlation_id,
            status: stored_status(&model.status)?,
            depends_on: model.depends_on,
            lease_token: model.lease_token,
            lease_expires_at: model.lease_expires_at,
            cancel_requested: model.cancel_requested,
            queued_at: model.queued_at,
            started_at: model.started_at,
            finished_at: model.finished_at,
            error: model.error,
            retry_count: model.retry_count,
        })
    }
}

/// 解析存储的状态值，未知值视为损坏的记录
fn stored_status(raw: &str) -> Result<TaskStatus, RepositoryError> {
    raw.parse().map_err(RepositoryError::Corrupted)
}

/// 以数据库时钟计算的租约过期时间
fn lease_expiry(lease_timeout: Duration) -> SimpleExpr {
    Expr::cust(format!(
        "CURRENT_TIMESTAMP + interval '{} milliseconds'",
        lease_timeout.as_millis()
    ))
}

impl From<Task> for task_entity::ActiveModel {
    fn from(task: Task) -> Self {
        Self {
            id: Set(task.id),
            seq: NotSet,
            type_name: Set(task.type_name),
            payload: Set(task.payload),
            org_id: Set(task.org_id),
            account_id: Set(task.account_id),
            resource_type: Set(task.resource.map(|r| r.kind.to_string())),
            resource_uuid: Set(task.resource.map(|r| r.uuid)),
            correlation_id: Set(task.correlation_id),
            status: Set(task.status.to_string()),
            depends_on: Set(task.depends_on),
            lease_token: Set(task.lease_token),
            lease_expires_at: Set(task.lease_expires_at),
            cancel_requested: Set(task.cancel_requested),
            queued_at: Set(task.queued_at),
            started_at: Set(task.started_at),
            finished_at: Set(task.finished_at),
            error: Set(task.error),
            retry_count: Set(task.retry_count),
        }
    }
}

/// 仅匹配由该令牌持有且仍在运行的任务
fn held_by(id: Uuid, lease_token: Uuid) -> Condition {
    Condition::all()
        .add(Column::Id.eq(id))
        .add(Column::LeaseToken.eq(lease_token))
        .add(Column::Status.eq(TaskStatus::Running.as_str()))
}

/// 写入终态：设置结束时间并清除租约
fn terminal(
    update: UpdateMany<task_entity::Entity>,
    status: TaskStatus,
    error: Option<&str>,
) -> UpdateMany<task_entity::Entity> {
    let finished_at: DateTime<FixedOffset> = Utc::now().into();
    let update = update
        .col_expr(Column::Status, Expr::value(status.as_str()))
        .col_expr(Column::FinishedAt, Expr::value(Some(finished_at)))
        .col_expr(Column::LeaseToken, Expr::value(Option::<Uuid>::None))
        .col_expr(
            Column::LeaseExpiresAt,
            Expr::value(Option::<DateTime<FixedOffset>>::None),
        )
        .col_expr(Column::CancelRequested, Expr::value(false));

    match error {
        Some(error) => update.col_expr(Column::Error, Expr::value(Some(error.to_string()))),
        None => update,
    }
}

/// 回到等待状态：清除租约并累加重试次数
fn requeue(update: UpdateMany<task_entity::Entity>) -> UpdateMany<task_entity::Entity> {
    update
        .col_expr(Column::Status, Expr::value(TaskStatus::Pending.as_str()))
        .col_expr(Column::LeaseToken, Expr::value(Option::<Uuid>::None))
        .col_expr(
            Column::LeaseExpiresAt,
            Expr::value(Option::<DateTime<FixedOffset>>::None),
        )
        .col_expr(
            Column::StartedAt,
            Expr::value(Option::<DateTime<FixedOffset>>::None),
        )
        .col_expr(Column::CancelRequested, Expr::value(false))
        .col_expr(Column::RetryCount, Expr::col(Column::RetryCount).add(1))
}

/// 将根任务的等待中后代逐层标记为失败
async fn cascade_failure<C: ConnectionTrait>(conn: &C, root: Uuid) -> Result<u64, DbErr> {
    let mut frontier = vec![root];
    let mut cascaded = 0;

    while !frontier.is_empty() {
        let children: Vec<Uuid> = task_entity::Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::DependsOn.is_in(frontier))
            .filter(Column::Status.eq(TaskStatus::Pending.as_str()))
            .into_tuple()
            .all(conn)
            .await?;

        if children.is_empty() {
            break;
        }

        let result = terminal(
            task_entity::Entity::update_many(),
            TaskStatus::Failed,
            Some(PARENT_FAILED_ERROR),
        )
        .filter(Column::Id.is_in(children.clone()))
        .filter(Column::Status.eq(TaskStatus::Pending.as_str()))
        .exec(conn)
        .await?;

        cascaded += result.rows_affected;
        frontier = children;
    }

    Ok(cascaded)
}

/// 清理父任务已失败但自身仍在等待的任务，直到没有新的行被更新
async fn sweep_orphans<C: ConnectionTrait>(conn: &C) -> Result<u64, DbErr> {
    let mut swept = 0;
    loop {
        let result = terminal(
            task_entity::Entity::update_many(),
            TaskStatus::Failed,
            Some(PARENT_FAILED_ERROR),
        )
        .filter(Column::Status.eq(TaskStatus::Pending.as_str()))
        .filter(Expr::cust(PARENT_FAILED))
        .exec(conn)
        .await?;

        if result.rows_affected == 0 {
            return Ok(swept);
        }
        swept += result.rows_affected;
    }
}

#[async_trait]
impl TaskRepository for TaskRepositoryImpl {
    async fn insert(&self, task: &Task) -> Result<Task, RepositoryError> {
        let txn = self.db.begin().await?;
        let mut task = task.clone();

        if let Some(parent_id) = task.depends_on {
            // 共享锁阻止父任务在插入提交前转入终态，级联时一定能看到本行
            let parent = task_entity::Entity::find_by_id(parent_id)
                .lock_shared()
                .one(&txn)
                .await?
                .ok_or(RepositoryError::ParentNotFound(parent_id))?;

            let parent_status = stored_status(&parent.status)?;
            if parent_status.fails_dependents() {
                task = task.fail(PARENT_FAILED_ERROR)?;
            }
        }

        let model: task_entity::ActiveModel = task.into();
        let inserted = model.insert(&txn).await?;
        txn.commit().await?;

        inserted.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        model.map(Task::try_from).transpose()
    }

    async fn claim_next(
        &self,
        type_names: &[String],
        lease_token: Uuid,
        lease_timeout: Duration,
    ) -> Result<Option<Task>, RepositoryError> {
        if type_names.is_empty() {
            return Ok(None);
        }

        let txn = self.db.begin().await?;

        let candidate = task_entity::Entity::find()
            .filter(Column::Status.eq(TaskStatus::Pending.as_str()))
            .filter(Column::TypeName.is_in(type_names.iter().cloned()))
            .filter(
                Condition::any()
                    .add(Column::DependsOn.is_null())
                    .add(Expr::cust(PARENT_COMPLETED)),
            )
            .order_by_asc(Column::QueuedAt)
            .order_by_asc(Column::Seq)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?;

        let Some(model) = candidate else {
            txn.commit().await?;
            return Ok(None);
        };

        let claimed = task_entity::Entity::update_many()
            .col_expr(Column::Status, Expr::value(TaskStatus::Running.as_str()))
            .col_expr(Column::LeaseToken, Expr::value(Some(lease_token)))
            .col_expr(Column::LeaseExpiresAt, lease_expiry(lease_timeout))
            .col_expr(Column::StartedAt, Expr::cust("CURRENT_TIMESTAMP"))
            .col_expr(Column::CancelRequested, Expr::value(false))
            .filter(Column::Id.eq(model.id))
            .exec_with_returning(&txn)
            .await?;
        txn.commit().await?;

        claimed.into_iter().next().map(Task::try_from).transpose()
    }

    async fn renew_lease(
        &self,
        id: Uuid,
        lease_token: Uuid,
        lease_timeout: Duration,
    ) -> Result<bool, RepositoryError> {
        let renewed = task_entity::Entity::update_many()
            .col_expr(Column::LeaseExpiresAt, lease_expiry(lease_timeout))
            .filter(held_by(id, lease_token))
            .exec_with_returning(self.db.as_ref())
            .await?;

        renewed
            .first()
            .map(|model| model.cancel_requested)
            .ok_or(RepositoryError::LeaseLost)
    }

    async fn complete(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError> {
        let result = terminal(
            task_entity::Entity::update_many(),
            TaskStatus::Completed,
            None,
        )
        .filter(held_by(id, lease_token))
        .exec(self.db.as_ref())
        .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost);
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: Uuid,
        lease_token: Uuid,
        error: &str,
    ) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;

        let result = terminal(
            task_entity::Entity::update_many(),
            TaskStatus::Failed,
            Some(error),
        )
        .filter(held_by(id, lease_token))
        .exec(&txn)
        .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost);
        }

        let cascaded = cascade_failure(&txn, id).await?;
        txn.commit().await?;

        Ok(cascaded)
    }

    async fn mark_canceled(&self, id: Uuid, lease_token: Uuid) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;

        let result = terminal(
            task_entity::Entity::update_many(),
            TaskStatus::Canceled,
            None,
        )
        .filter(held_by(id, lease_token))
        .exec(&txn)
        .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost);
        }

        let cascaded = cascade_failure(&txn, id).await?;
        txn.commit().await?;

        Ok(cascaded)
    }

    async fn release(&self, id: Uuid, lease_token: Uuid) -> Result<(), RepositoryError> {
        let result = requeue(task_entity::Entity::update_many())
            .filter(held_by(id, lease_token))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost);
        }
        Ok(())
    }

    async fn update_payload(
        &self,
        id: Uuid,
        lease_token: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let result = task_entity::Entity::update_many()
            .col_expr(Column::Payload, Expr::value(payload))
            .filter(held_by(id, lease_token))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::LeaseLost);
        }
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome, RepositoryError> {
        let txn = self.db.begin().await?;

        let model = task_entity::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let status = stored_status(&model.status)?;
        let outcome = match status {
            TaskStatus::Pending => {
                terminal(
                    task_entity::Entity::update_many(),
                    TaskStatus::Canceled,
                    None,
                )
                .filter(Column::Id.eq(id))
                .exec(&txn)
                .await?;
                cascade_failure(&txn, id).await?;
                CancelOutcome::Canceled
            }
            TaskStatus::Running => {
                task_entity::Entity::update_many()
                    .col_expr(Column::CancelRequested, Expr::value(true))
                    .filter(Column::Id.eq(id))
                    .exec(&txn)
                    .await?;
                CancelOutcome::Requested
            }
            _ => return Err(RepositoryError::AlreadyTerminal),
        };

        txn.commit().await?;
        Ok(outcome)
    }

    async fn reap_expired(
        &self,
        as_of: Option<DateTime<FixedOffset>>,
        max_retries: i32,
    ) -> Result<ReapReport, RepositoryError> {
        let expired_before = match as_of {
            Some(as_of) => Column::LeaseExpiresAt.lt(as_of),
            None => Expr::col(Column::LeaseExpiresAt).lt(Expr::cust("CURRENT_TIMESTAMP")),
        };

        let txn = self.db.begin().await?;

        let expired = task_entity::Entity::find()
            .filter(Column::Status.eq(TaskStatus::Running.as_str()))
            .filter(expired_before)
            .order_by_asc(Column::LeaseExpiresAt)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;

        let mut report = ReapReport::default();

        for model in expired {
            if model.cancel_requested {
                terminal(
                    task_entity::Entity::update_many(),
                    TaskStatus::Canceled,
                    None,
                )
                .filter(Column::Id.eq(model.id))
                .exec(&txn)
                .await?;
                report.canceled += 1;
                report.cascaded += cascade_failure(&txn, model.id).await?;
            } else if model.retry_count < max_retries {
                requeue(task_entity::Entity::update_many())
                    .filter(Column::Id.eq(model.id))
                    .exec(&txn)
                    .await?;
                report.requeued += 1;
            } else {
                terminal(
                    task_entity::Entity::update_many(),
                    TaskStatus::Failed,
                    Some(LEASE_EXPIRED_ERROR),
                )
                .filter(Column::Id.eq(model.id))
                .exec(&txn)
                .await?;
                report.failed += 1;
                report.cascaded += cascade_failure(&txn, model.id).await?;
            }
        }

        report.cascaded += sweep_orphans(&txn).await?;
        txn.commit().await?;

        Ok(report)
    }

    async fn query_tasks(
        &self,
        params: TaskQueryParams,
    ) -> Result<(Vec<Task>, u64), RepositoryError> {
        let mut query = task_entity::Entity::find();

        if let Some(org_id) = params.org_id {
            query = query.filter(Column::OrgId.eq(org_id));
        }
        if let Some(account_id) = params.account_id {
            query = query.filter(Column::AccountId.eq(account_id));
        }
        if let Some(statuses) = params.statuses {
            query = query.filter(Column::Status.is_in(statuses.iter().map(|s| s.as_str())));
        }
        if let Some(type_names) = params.type_names {
            query = query.filter(Column::TypeName.is_in(type_names));
        }
        if let Some(resource_uuid) = params.resource_uuid {
            query = query.filter(Column::ResourceUuid.eq(resource_uuid));
        }

        let total = query.clone().count(self.db.as_ref()).await?;

        let models = query
            .order_by_desc(Column::QueuedAt)
            .order_by_desc(Column::Seq)
            .limit(params.limit)
            .offset(params.offset)
            .all(self.db.as_ref())
            .await?;

        let tasks = models
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((tasks, total))
    }

    async fn find_dependents(&self, id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<Uuid> = task_entity::Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::DependsOn.eq(id))
            .order_by_asc(Column::QueuedAt)
            .order_by_asc(Column::Seq)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        Ok(ids)
    }
}
