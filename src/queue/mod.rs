// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供基于租约的任务队列、唤醒通知和生产者客户端
pub mod client;
pub mod notifier;
pub mod task_queue;
