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

//! Per-container view of NPU usage.
//!
//! Polls nothing itself: it joins the container snapshot with what the base
//! and memory collectors cached.

use crate::api::metrics::MetricBuilder;
use crate::collector::base::{self, ChipStatus};
use crate::collector::memory::{self, MemoryData};
use crate::collector::{
    load, valid_u32, ChipBase, CollectContext, CollectGroup, ContainerView, MetricCache,
    MetricsCollector,
};
use crate::container::DevicesInfo;
use crate::device::DevType;
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "container";

pub struct ContainerCollector;

fn container_labels(info: &DevicesInfo, chip: &ChipBase) -> Vec<(&'static str, String)> {
    vec![
        ("id", chip.logic_id.to_string()),
        ("container_id", info.id.clone()),
        ("container_name", info.container_name.clone()),
        ("namespace", info.pod_namespace.clone()),
        ("pod_name", info.pod_name.clone()),
    ]
}

impl MetricsCollector for ContainerCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Chip
    }

    fn is_supported(&self, _dev_type: &DevType) -> bool {
        true
    }

    fn collect_to_cache(&self, _ctx: &CollectContext, _chips: &[ChipBase]) {}

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        if containers.is_empty() {
            return;
        }
        let mounted: Vec<(&ChipBase, &DevicesInfo)> = chips
            .iter()
            .filter_map(|chip| containers.for_chip(chip).map(|info| (chip, info)))
            .collect();

        out.family(
            "npu_container_info",
            "the container name and deviceID relationship",
            "gauge",
        );
        for info in containers.containers() {
            let labels = [
                ("container_id", info.id.clone()),
                ("container_name", info.container_name.clone()),
                ("namespace", info.pod_namespace.clone()),
                ("pod_name", info.pod_name.clone()),
                (
                    "npu_id",
                    info.devices
                        .iter()
                        .map(i32::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                ("is_virtual", info.is_vnpu.to_string()),
            ];
            out.metric("npu_container_info", &labels, 1);
        }

        if mounted.is_empty() {
            return;
        }

        out.family(
            "container_npu_utilization",
            "the AI core utilization of the npu used by the container",
            "gauge",
        );
        for (chip, info) in &mounted {
            if let Some(v) = load::<ChipStatus>(cache, base::NAME, chip.logic_id)
                .and_then(|s| valid_u32(s.aicore_util))
            {
                out.metric("container_npu_utilization", &container_labels(info, chip), v);
            }
        }

        let usage: Vec<_> = mounted
            .iter()
            .filter_map(|(chip, info)| {
                load::<MemoryData>(cache, memory::NAME, chip.logic_id)
                    .and_then(|m| m.usage_mb())
                    .map(|usage| (container_labels(info, chip), usage))
            })
            .collect();
        if usage.is_empty() {
            return;
        }
        out.family(
            "container_npu_total_memory",
            "the total memory in MB of the npu used by the container",
            "gauge",
        );
        for (labels, (total, _)) in &usage {
            out.metric("container_npu_total_memory", labels, total);
        }
        out.family(
            "container_npu_used_memory",
            "the used memory in MB of the npu used by the container",
            "gauge",
        );
        for (labels, (_, used)) in &usage {
            out.metric("container_npu_used_memory", labels, used);
        }
    }

    fn export_telegraf(
        &self,
        _points: &mut TelegrafPoints,
        _chips: &[ChipBase],
        _cache: &MetricCache,
    ) {
    }
}
