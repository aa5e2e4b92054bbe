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

//! vNPU partitions and their activity.

use std::fmt::Display;
use std::sync::Arc;

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    chip_labels, load_all, read_or, valid_u32, valid_u64, ChipBase, CollectContext, CollectGroup,
    ContainerView, MetricCache, MetricsCollector,
};
use crate::dcmi::{VDevActivity, VDevInfo, VDevice};
use crate::device::DevType;
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "vnpu";

#[derive(Debug, Clone, PartialEq)]
pub struct VnpuData {
    pub info: VDevInfo,
    /// Same order as `info.vdevices`.
    pub activities: Vec<VDevActivity>,
}

impl VnpuData {
    pub fn iter(&self) -> impl Iterator<Item = (&VDevice, &VDevActivity)> {
        self.info.vdevices.iter().zip(&self.activities)
    }
}

pub struct VnpuCollector;

/// Emits one family with a sample per vNPU, labelled with the container
/// the vNPU is mounted in.
fn vnpu_family<T: Display>(
    out: &mut MetricBuilder,
    containers: &ContainerView,
    name: &str,
    help: &str,
    items: &[(&ChipBase, Arc<VnpuData>)],
    value: impl Fn(&VDevActivity) -> Option<T>,
) {
    let mut header = false;
    for (chip, data) in items {
        for (vdev, activity) in data.iter() {
            let Some(v) = value(activity) else {
                continue;
            };
            if !header {
                out.family(name, help, "gauge");
                header = true;
            }
            let mut labels = chip_labels(chip, containers.for_vdevice(vdev.vdev_id));
            labels.extend([
                ("vnpu_id", vdev.vdev_id.to_string()),
                ("vnpu_template", vdev.spec_name.clone()),
                ("aicore_num", vdev.aicore_num.to_string()),
            ]);
            out.metric(name, &labels, v);
        }
    }
}

impl MetricsCollector for VnpuCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Chip
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        dev_type.supports_vnpu()
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        for chip in chips {
            let id = chip.logic_id;
            let info = read_or(
                "vNPU info",
                chip,
                ctx.manager.get_vdevice_info(id),
                VDevInfo::default(),
            );
            let activities = info
                .vdevices
                .iter()
                .map(|vdev| {
                    read_or(
                        "vNPU activity",
                        chip,
                        ctx.manager.get_vdevice_activity(id, vdev.vdev_id),
                        VDevActivity::failed(vdev.vdev_id),
                    )
                })
                .collect();
            ctx.store(NAME, id, VnpuData { info, activities });
        }
    }

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        let items: Vec<_> = load_all::<VnpuData>(cache, NAME, chips)
            .into_iter()
            .filter(|(_, data)| !data.info.vdevices.is_empty())
            .collect();

        vnpu_family(
            out,
            containers,
            "vnpu_pod_aicore_utilization",
            "the vNPU AI core utilization in percent",
            &items,
            |a| valid_u32(a.aicore_util),
        );
        vnpu_family(
            out,
            containers,
            "vnpu_pod_total_memory",
            "the vNPU total memory in MB",
            &items,
            |a| valid_u64(a.mem_total_mb),
        );
        vnpu_family(
            out,
            containers,
            "vnpu_pod_used_memory",
            "the vNPU used memory in MB",
            &items,
            |a| valid_u64(a.mem_used_mb),
        );

        if !items.is_empty() {
            out.family(
                "npu_chip_info_vnpu_aicore_free",
                "AI cores not assigned to any vNPU",
                "gauge",
            );
            for (chip, data) in &items {
                out.metric(
                    "npu_chip_info_vnpu_aicore_free",
                    &chip_labels(chip, None),
                    data.info.unused_aicore,
                );
            }
        }
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, data) in load_all::<VnpuData>(cache, NAME, chips) {
            let point = points.chip(chip);
            for (vdev, activity) in data.iter() {
                let id = vdev.vdev_id;
                if let Some(v) = valid_u32(activity.aicore_util) {
                    point.field(format!("vnpu_{id}_aicore_utilization"), v);
                }
                if let Some(v) = valid_u64(activity.mem_total_mb) {
                    point.field(format!("vnpu_{id}_total_memory"), v);
                }
                if let Some(v) = valid_u64(activity.mem_used_mb) {
                    point.field(format!("vnpu_{id}_used_memory"), v);
                }
            }
        }
    }
}
