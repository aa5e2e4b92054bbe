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

//! PCIe link bandwidth sampled over the profiling window.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    gauge, load_all, read_or, valid_u32, ChipBase, CollectContext, CollectGroup, ContainerView,
    MetricCache, MetricsCollector,
};
use crate::dcmi::PcieBandwidth;
use crate::device::DevType;
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "pcie";

pub struct PcieCollector;

impl MetricsCollector for PcieCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Slow
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        dev_type.has_pcie_bandwidth()
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        for chip in chips {
            let bandwidth = read_or(
                "PCIe bandwidth",
                chip,
                ctx.manager.get_pcie_bandwidth(chip.logic_id, ctx.profiling_ms),
                PcieBandwidth::failed(),
            );
            ctx.store(NAME, chip.logic_id, bandwidth);
        }
    }

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        let items = load_all::<PcieBandwidth>(cache, NAME, chips);
        let stat_names = PcieBandwidth::failed().stats().map(|(name, _)| name);

        for (index, stat) in stat_names.iter().enumerate() {
            for (suffix, help) in [
                ("min", "minimum"),
                ("max", "maximum"),
                ("avg", "average"),
            ] {
                let name = format!("npu_chip_info_pcie_{stat}_{suffix}");
                let help = format!("the {help} PCIe {stat} bandwidth in MB/s");
                gauge(out, containers, &name, &help, &items, |b| {
                    let value = b.stats()[index].1;
                    valid_u32(match suffix {
                        "min" => value.min,
                        "max" => value.max,
                        _ => value.avg,
                    })
                });
            }
        }
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, b) in load_all::<PcieBandwidth>(cache, NAME, chips) {
            let point = points.chip(chip);
            for (stat, value) in b.stats() {
                for (suffix, v) in [("min", value.min), ("max", value.max), ("avg", value.avg)] {
                    if let Some(v) = valid_u32(v) {
                        point.field(format!("npu_chip_info_pcie_{stat}_{suffix}"), v);
                    }
                }
            }
        }
    }
}
