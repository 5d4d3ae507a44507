// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 空闲轮询退避策略
///
/// 连续领取不到任务时，等待时间按乘数指数增长，直到上限；
/// 每次等待叠加抖动，避免多个工作器同时命中存储。
#[derive(Debug, Clone)]
pub struct PollBackoff {
    /// 初始等待时间
    pub initial: Duration,
    /// 最大等待时间
    pub max: Duration,
    /// 退避乘数
    pub multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl PollBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            ..Self::default()
        }
    }

    /// 计算第 `attempt` 次连续空轮询后的等待时间（从 0 开始）
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        let jitter_range = capped * self.jitter_factor;
        let jittered = if jitter_range > 0.0 {
            capped + rand::random_range(-jitter_range..jitter_range)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.clamp(0.0, self.max.as_secs_f64()))
    }
}
