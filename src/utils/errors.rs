// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("未注册任何任务处理器")]
    NoHandlers,

    #[error("后台任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
}
