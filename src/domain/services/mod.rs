// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 内容服务（content_service）：处理器调用的外部内容服务端口
/// - 任务状态服务（task_status_service）：任务列表与详情的只读查询
pub mod content_service;
pub mod task_status_service;
