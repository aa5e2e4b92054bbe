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

//! Device memory held by host processes.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    load_all, read_or, series, ChipBase, CollectContext, CollectGroup, ContainerView,
    MetricCache, MetricsCollector,
};
use crate::dcmi::ProcessMemInfo;
use crate::device::DevType;
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "process";

pub struct ProcessCollector;

impl MetricsCollector for ProcessCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Chip
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        *dev_type != DevType::Unknown
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        for chip in chips {
            let processes = read_or(
                "process list",
                chip,
                ctx.manager.get_device_processes(chip.logic_id),
                Vec::<ProcessMemInfo>::new(),
            );
            ctx.store(NAME, chip.logic_id, processes);
        }
    }

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        let items = load_all::<Vec<ProcessMemInfo>>(cache, NAME, chips);
        series(
            out,
            containers,
            "npu_chip_info_process_info",
            "the device memory in MB used by each process",
            &items,
            |processes| {
                processes
                    .iter()
                    .map(|p| (vec![("process_id", p.pid.to_string())], p.mem_usage_mb))
                    .collect()
            },
        );
        series(
            out,
            containers,
            "npu_chip_info_process_info_num",
            "the number of processes using the npu",
            &items,
            |processes| vec![(Vec::new(), processes.len())],
        );
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, processes) in load_all::<Vec<ProcessMemInfo>>(cache, NAME, chips) {
            let point = points.chip(chip);
            point.field("npu_chip_info_process_info_num", processes.len() as u64);
            for p in processes.iter() {
                point.field(format!("npu_chip_info_process_info_{}", p.pid), p.mem_usage_mb);
            }
        }
    }
}
