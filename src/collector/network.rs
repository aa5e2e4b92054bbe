// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! RoCE network health, link state and traffic.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    gauge, load_all, read_or, series, valid_f64, valid_u64, ChipBase, CollectContext,
    CollectGroup, ContainerView, MetricCache, MetricsCollector,
};
use crate::dcmi::constants::NetworkHealth;
use crate::device::DevType;
use crate::hccn::{Bandwidth, LinkStatus, NetworkStats};
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "network";

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkData {
    pub health: Option<NetworkHealth>,
    pub ip: String,
    pub link: Option<LinkStatus>,
    /// Mb/s
    pub speed: Option<u64>,
    pub stats: NetworkStats,
    pub bandwidth: Bandwidth,
}

pub struct NetworkCollector;

impl MetricsCollector for NetworkCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Network
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        dev_type.has_roce()
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        for chip in chips {
            let id = chip.logic_id;
            let mut data = NetworkData {
                health: read_or(
                    "network health",
                    chip,
                    ctx.manager.get_network_health(id).map(Some),
                    None,
                ),
                ip: read_or("device ip", chip, ctx.manager.get_device_ip(id), String::new()),
                link: None,
                speed: None,
                stats: NetworkStats::failed(),
                bandwidth: Bandwidth::failed(),
            };

            if let Some(hccn) = &ctx.hccn {
                let phy_id = chip.phy_id;
                data.link = read_or("link status", chip, hccn.link_status(phy_id).map(Some), None);
                data.speed = read_or("link speed", chip, hccn.link_speed(phy_id).map(Some), None);
                data.stats = read_or(
                    "network statistics",
                    chip,
                    hccn.network_stats(phy_id),
                    NetworkStats::failed(),
                );
                data.bandwidth = read_or(
                    "network bandwidth",
                    chip,
                    hccn.bandwidth(phy_id),
                    Bandwidth::failed(),
                );
            }
            ctx.store(NAME, id, data);
        }
    }

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        let items = load_all::<NetworkData>(cache, NAME, chips);

        series(
            out,
            containers,
            "npu_chip_info_network_status",
            "the npu network health state, 1 healthy, 0 unhealthy",
            &items,
            |d| {
                d.health
                    .map(|h| (vec![("ip", d.ip.clone())], h.metric_value()))
                    .into_iter()
                    .collect()
            },
        );
        gauge(
            out,
            containers,
            "npu_chip_info_link_status",
            "the npu link status, 1 UP, 0 DOWN",
            &items,
            |d| d.link.map(|l| l.metric_value()),
        );
        gauge(
            out,
            containers,
            "npu_chip_link_speed",
            "the npu link speed in Mb/s",
            &items,
            |d| d.speed,
        );
        gauge(
            out,
            containers,
            "npu_chip_info_bandwidth_tx",
            "the npu network transmit rate in MB/s",
            &items,
            |d| valid_f64(d.bandwidth.tx_mb_s),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_bandwidth_rx",
            "the npu network receive rate in MB/s",
            &items,
            |d| valid_f64(d.bandwidth.rx_mb_s),
        );

        let counter_names = NetworkStats::failed().counters().map(|(name, _)| name);
        for (index, counter) in counter_names.iter().enumerate() {
            let name = format!("npu_chip_{counter}");
            gauge(out, containers, &name, "the npu RoCE packet counter", &items, |d| {
                valid_u64(d.stats.counters()[index].1)
            });
        }
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, d) in load_all::<NetworkData>(cache, NAME, chips) {
            let point = points.chip(chip);
            if let Some(health) = d.health {
                point.field("npu_chip_info_network_status", health.metric_value());
            }
            if let Some(link) = d.link {
                point.field("npu_chip_info_link_status", link.metric_value());
            }
            if let Some(speed) = d.speed {
                point.field("npu_chip_link_speed", speed);
            }
            if let Some(v) = valid_f64(d.bandwidth.tx_mb_s) {
                point.field("npu_chip_info_bandwidth_tx", v);
            }
            if let Some(v) = valid_f64(d.bandwidth.rx_mb_s) {
                point.field("npu_chip_info_bandwidth_rx", v);
            }
            for (counter, value) in d.stats.counters() {
                if let Some(v) = valid_u64(value) {
                    point.field(format!("npu_chip_{counter}"), v);
                }
            }
        }
    }
}
