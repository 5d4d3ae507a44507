// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 提供任务仓库接口的两种实现：
/// - Postgres 实现（task_repo_impl），用于多进程部署
/// - 进程内实现（memory_task_repo），用于开发环境与测试
pub mod memory_task_repo;
pub mod task_repo_impl;
