// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create tasks table
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tasks::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Tasks::Seq)
                            .big_integer()
                            .not_null()
                            .auto_increment(),
                    )
                    .col(ColumnDef::new(Tasks::TypeName).string().not_null())
                    .col(ColumnDef::new(Tasks::Payload).json_binary().not_null())
                    .col(ColumnDef::new(Tasks::OrgId).string().not_null())
                    .col(ColumnDef::new(Tasks::AccountId).string())
                    .col(ColumnDef::new(Tasks::ResourceType).string())
                    .col(ColumnDef::new(Tasks::ResourceUuid).uuid())
                    .col(ColumnDef::new(Tasks::CorrelationId).string())
                    .col(
                        ColumnDef::new(Tasks::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Tasks::DependsOn).uuid())
                    .col(ColumnDef::new(Tasks::LeaseToken).uuid())
                    .col(ColumnDef::new(Tasks::LeaseExpiresAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Tasks::CancelRequested)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tasks::QueuedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Tasks::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tasks::FinishedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tasks::Error).text())
                    .col(
                        ColumnDef::new(Tasks::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_depends_on")
                            .from(Tasks::Table, Tasks::DependsOn)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // 领取：按状态和类型过滤，按入队顺序排序
        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_claim")
                    .table(Tasks::Table)
                    .col(Tasks::Status)
                    .col(Tasks::TypeName)
                    .col(Tasks::QueuedAt)
                    .col(Tasks::Seq)
                    .to_owned(),
            )
            .await?;

        // 回收：扫描过期租约
        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_lease_expiry")
                    .table(Tasks::Table)
                    .col(Tasks::Status)
                    .col(Tasks::LeaseExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_depends_on")
                    .table(Tasks::Table)
                    .col(Tasks::DependsOn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_org_queued_at")
                    .table(Tasks::Table)
                    .col(Tasks::OrgId)
                    .col(Tasks::QueuedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    Seq,
    TypeName,
    Payload,
    OrgId,
    AccountId,
    ResourceType,
    ResourceUuid,
    CorrelationId,
    Status,
    DependsOn,
    LeaseToken,
    LeaseExpiresAt,
    CancelRequested,
    QueuedAt,
    StartedAt,
    FinishedAt,
    Error,
    RetryCount,
}
