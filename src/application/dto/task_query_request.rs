// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{DomainError, TaskStatus};
use crate::domain::repositories::task_repository::TaskQueryParams;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 任务列表查询参数
///
/// `status` 与 `type` 支持逗号分隔的多个值。
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct TaskListQuery {
    /// 任务状态过滤
    pub status: Option<String>,

    /// 任务类型过滤
    #[serde(rename = "type")]
    pub task_type: Option<String>,

    /// 关联资源过滤
    pub resource_uuid: Option<Uuid>,

    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<u64>,

    pub offset: Option<u64>,
}

impl TaskListQuery {
    /// 转换为仓库查询参数，组织范围由调用方给定
    pub fn into_params(self, org_id: Option<String>) -> Result<TaskQueryParams, DomainError> {
        let statuses = match split_list(self.status.as_deref()) {
            Some(values) => Some(
                values
                    .iter()
                    .map(|value| value.parse::<TaskStatus>())
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        Ok(TaskQueryParams {
            org_id,
            account_id: None,
            statuses,
            type_names: split_list(self.task_type.as_deref()),
            resource_uuid: self.resource_uuid,
            limit: self.limit.unwrap_or(0),
            offset: self.offset.unwrap_or(0),
        })
    }
}

/// 管理员任务列表查询参数
///
/// 组织与账号都是可选过滤条件。
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct AdminTaskListQuery {
    pub org_id: Option<String>,
    pub account_id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub resource_uuid: Option<Uuid>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl AdminTaskListQuery {
    pub fn into_params(self) -> Result<TaskQueryParams, DomainError> {
        let filter = TaskListQuery {
            status: self.status,
            task_type: self.task_type,
            resource_uuid: self.resource_uuid,
            limit: self.limit,
            offset: self.offset,
        };
        let mut params = filter.into_params(self.org_id)?;
        params.account_id = self.account_id;
        Ok(params)
    }
}

fn split_list(value: Option<&str>) -> Option<Vec<String>> {
    let values: Vec<String> = value?
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
