// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，提供对领域层抽象接口的具体实现。
///
/// 包含的子模块：
/// - 数据库（database）：提供数据库连接和实体映射
/// - 指标（metrics）：Prometheus 导出器
/// - 仓库实现（repositories）：任务仓库的 Postgres 与内存实现
/// - 服务（services）：内容服务的 HTTP 客户端
pub mod database;
pub mod metrics;
pub mod repositories;
pub mod services;
