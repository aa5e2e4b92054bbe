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

//! Optical module readings through hccn_tool.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    gauge, load_all, read_or, series, valid_f64, ChipBase, CollectContext, CollectGroup,
    ContainerView, MetricCache, MetricsCollector,
};
use crate::device::DevType;
use crate::hccn::{OpticalInfo, OPTICAL_LANES};
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "optical";

pub struct OpticalCollector;

fn lanes(values: &[f64; OPTICAL_LANES]) -> Vec<(Vec<(&'static str, String)>, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(lane, &v)| valid_f64(v).map(|v| (vec![("lane", lane.to_string())], v)))
        .collect()
}

impl MetricsCollector for OpticalCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Slow
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        dev_type.has_roce()
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        let Some(hccn) = &ctx.hccn else {
            return;
        };
        for chip in chips {
            let info = read_or(
                "optical info",
                chip,
                hccn.optical_info(chip.phy_id),
                OpticalInfo::failed(),
            );
            ctx.store(NAME, chip.logic_id, info);
        }
    }

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        let items = load_all::<OpticalInfo>(cache, NAME, chips);

        gauge(
            out,
            containers,
            "npu_chip_optical_state",
            "the optical module presence, 1 present, 0 absent",
            &items,
            |o| Some(u8::from(o.present)),
        );
        gauge(
            out,
            containers,
            "npu_chip_optical_temp",
            "the optical module temperature in celsius",
            &items,
            |o| valid_f64(o.temperature),
        );
        gauge(
            out,
            containers,
            "npu_chip_optical_vcc",
            "the optical module supply voltage in mV",
            &items,
            |o| valid_f64(o.voltage),
        );
        series(
            out,
            containers,
            "npu_chip_optical_tx_power",
            "the optical module transmit power in mW",
            &items,
            |o| lanes(&o.tx_power),
        );
        series(
            out,
            containers,
            "npu_chip_optical_rx_power",
            "the optical module receive power in mW",
            &items,
            |o| lanes(&o.rx_power),
        );
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, o) in load_all::<OpticalInfo>(cache, NAME, chips) {
            let point = points.chip(chip);
            point.field("npu_chip_optical_state", o.present);
            if let Some(v) = valid_f64(o.temperature) {
                point.field("npu_chip_optical_temp", v);
            }
            if let Some(v) = valid_f64(o.voltage) {
                point.field("npu_chip_optical_vcc", v);
            }
            for lane in 0..OPTICAL_LANES {
                if let Some(v) = valid_f64(o.tx_power[lane]) {
                    point.field(format!("npu_chip_optical_tx_power_{lane}"), v);
                }
                if let Some(v) = valid_f64(o.rx_power[lane]) {
                    point.field(format!("npu_chip_optical_rx_power_{lane}"), v);
                }
            }
        }
    }
}
