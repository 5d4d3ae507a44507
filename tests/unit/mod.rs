// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 单元测试
///
/// 全部运行在内存任务仓库上，不依赖外部服务
pub mod helpers;
