// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// 插入顺序，用于同一入队时间下的 FIFO 排序
    pub seq: i64,
    pub type_name: String,
    pub payload: Json,
    pub org_id: String,
    pub account_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_uuid: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub status: String,
    pub depends_on: Option<Uuid>,
    pub lease_token: Option<Uuid>,
    pub lease_expires_at: Option<ChronoDateTimeWithTimeZone>,
    pub cancel_requested: bool,
    pub queued_at: ChronoDateTimeWithTimeZone,
    pub started_at: Option<ChronoDateTimeWithTimeZone>,
    pub finished_at: Option<ChronoDateTimeWithTimeZone>,
    pub error: Option<String>,
    pub retry_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::DependsOn",
        to = "Column::Id",
        on_delete = "Restrict"
    )]
    Parent,
}

impl ActiveModelBehavior for ActiveModel {}
