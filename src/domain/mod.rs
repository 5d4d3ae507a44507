// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含任务队列的核心业务逻辑，包括：
/// - 领域模型（models）：任务实体、状态机与各类型负载
/// - 仓库接口（repositories）：任务记录存储的抽象接口
/// - 服务（services）：内容服务端口与任务状态查询
///
/// 领域层不依赖任何具体的存储或网络实现。
pub mod models;
pub mod repositories;
pub mod services;
