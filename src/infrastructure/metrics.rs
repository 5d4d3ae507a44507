// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 安装 Prometheus 导出器并登记指标说明
///
/// 未启用时不安装记录器，所有指标调用成为空操作。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", settings.listen_addr, e);
            return;
        }
    };

    // 端口被占用时只告警，不阻止服务启动
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!("tasks_enqueued_total", "Tasks accepted by the queue");
    describe_counter!("tasks_claimed_total", "Tasks leased by a worker");
    describe_counter!(
        "tasks_finished_total",
        "Task executions by outcome (completed, failed, canceled, released, lease_lost)"
    );
    describe_counter!(
        "tasks_reaped_total",
        "Expired leases handled by the reaper, by action"
    );
    describe_histogram!(
        "task_duration_seconds",
        Unit::Seconds,
        "Wall time of a single handler execution"
    );
}
