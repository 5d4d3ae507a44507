// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供任务领取、处理器调度、租约维护和过期回收
pub mod handlers;
pub mod manager;
pub mod reaper;
pub mod registry;
pub mod task_worker;
pub mod worker;

pub use worker::Worker;
