// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// HTTP请求处理器模块
///
/// 任务查询与取消，以及各类内容任务的入队入口
pub mod content_handler;
pub mod task_handler;
