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

//! HCCS link counters and bandwidth.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    gauge, load_all, read_or, series, valid_f64, valid_u64, ChipBase, CollectContext,
    CollectGroup, ContainerView, Labels, MetricCache, MetricsCollector,
};
use crate::dcmi::constants::HCCS_MAX_PORT_NUM;
use crate::dcmi::{HccsBandwidthInfo, HccsStatisticInfo};
use crate::device::DevType;
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "hccs";

#[derive(Debug, Clone, PartialEq)]
pub struct HccsData {
    pub stats: HccsStatisticInfo,
    pub bandwidth: HccsBandwidthInfo,
}

pub struct HccsCollector;

fn ports_u64(values: &[u64; HCCS_MAX_PORT_NUM]) -> Vec<(Labels, u64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(port, &v)| valid_u64(v).map(|v| (vec![("port", port.to_string())], v)))
        .collect()
}

fn ports_f64(values: &[f64; HCCS_MAX_PORT_NUM]) -> Vec<(Labels, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(port, &v)| valid_f64(v).map(|v| (vec![("port", port.to_string())], v)))
        .collect()
}

impl MetricsCollector for HccsCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Slow
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        dev_type.has_hccs()
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        for chip in chips {
            let id = chip.logic_id;
            let data = HccsData {
                stats: read_or(
                    "HCCS statistics",
                    chip,
                    ctx.manager.get_hccs_statistic(id),
                    HccsStatisticInfo::failed(),
                ),
                bandwidth: read_or(
                    "HCCS bandwidth",
                    chip,
                    ctx.manager.get_hccs_bandwidth(id, ctx.profiling_ms),
                    HccsBandwidthInfo::failed(),
                ),
            };
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
        let items = load_all::<HccsData>(cache, NAME, chips);

        series(
            out,
            containers,
            "npu_chip_info_hccs_statistic_info_tx_cnt",
            "HCCS packets sent per port",
            &items,
            |d| ports_u64(&d.stats.tx_cnt),
        );
        series(
            out,
            containers,
            "npu_chip_info_hccs_statistic_info_rx_cnt",
            "HCCS packets received per port",
            &items,
            |d| ports_u64(&d.stats.rx_cnt),
        );
        series(
            out,
            containers,
            "npu_chip_info_hccs_statistic_info_crc_err_cnt",
            "HCCS CRC errors per port",
            &items,
            |d| ports_u64(&d.stats.crc_err_cnt),
        );
        series(
            out,
            containers,
            "npu_chip_info_hccs_statistic_info_retry_cnt",
            "HCCS retransmissions per port",
            &items,
            |d| ports_u64(&d.stats.retry_cnt),
        );

        gauge(
            out,
            containers,
            "npu_chip_info_hccs_bandwidth_info_profiling_time",
            "HCCS bandwidth sampling window in ms",
            &items,
            |d| (d.bandwidth.profiling_time_ms > 0).then_some(d.bandwidth.profiling_time_ms),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hccs_bandwidth_info_total_tx",
            "HCCS total transmit bandwidth in MB/s",
            &items,
            |d| valid_f64(d.bandwidth.total_tx),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hccs_bandwidth_info_total_rx",
            "HCCS total receive bandwidth in MB/s",
            &items,
            |d| valid_f64(d.bandwidth.total_rx),
        );
        series(
            out,
            containers,
            "npu_chip_info_hccs_bandwidth_info_tx",
            "HCCS transmit bandwidth per port in MB/s",
            &items,
            |d| ports_f64(&d.bandwidth.tx),
        );
        series(
            out,
            containers,
            "npu_chip_info_hccs_bandwidth_info_rx",
            "HCCS receive bandwidth per port in MB/s",
            &items,
            |d| ports_f64(&d.bandwidth.rx),
        );
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, d) in load_all::<HccsData>(cache, NAME, chips) {
            let point = points.chip(chip);
            for (prefix, values) in [
                ("npu_chip_info_hccs_statistic_info_tx_cnt", &d.stats.tx_cnt),
                ("npu_chip_info_hccs_statistic_info_rx_cnt", &d.stats.rx_cnt),
                ("npu_chip_info_hccs_statistic_info_crc_err_cnt", &d.stats.crc_err_cnt),
                ("npu_chip_info_hccs_statistic_info_retry_cnt", &d.stats.retry_cnt),
            ] {
                for (port, &value) in values.iter().enumerate() {
                    if let Some(v) = valid_u64(value) {
                        point.field(format!("{prefix}_{port}"), v);
                    }
                }
            }
            if let Some(v) = valid_f64(d.bandwidth.total_tx) {
                point.field("npu_chip_info_hccs_bandwidth_info_total_tx", v);
            }
            if let Some(v) = valid_f64(d.bandwidth.total_rx) {
                point.field("npu_chip_info_hccs_bandwidth_info_total_rx", v);
            }
        }
    }
}
