// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 提供轮询退避、工作器错误和遥测初始化
pub mod backoff;
pub mod errors;
pub mod telemetry;
