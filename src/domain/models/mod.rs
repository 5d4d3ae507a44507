// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了任务队列的核心实体：
/// - 任务（task）：队列中的单个工作单元及其状态机
/// - 任务负载（payloads）：各内置任务类型的负载结构
pub mod payloads;
pub mod task;
