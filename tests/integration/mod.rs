// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 集成测试
///
/// Postgres 相关测试通过 testcontainers 启动数据库，需要本地 Docker；
/// 内容服务客户端使用 wiremock 模拟远端。
pub mod helpers;
pub mod http_content_service_test;
pub mod worker_pool_pg_test;
