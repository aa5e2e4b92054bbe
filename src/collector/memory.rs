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

//! DDR and HBM memory.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    gauge, load_all, read_or, valid_i32, valid_u32, valid_u64, ChipBase, CollectContext,
    CollectGroup, ContainerView, MetricCache, MetricsCollector,
};
use crate::dcmi::constants::{EccDeviceType, UtilizationType, UNRET_ERROR};
use crate::dcmi::{EccInfo, HbmInfo, MemoryInfo};
use crate::device::DevType;
use crate::telegraf::TelegrafPoints;

pub const NAME: &str = "memory";

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryData {
    /// 310 family only.
    pub ddr: Option<MemoryInfo>,
    /// 910 family only.
    pub hbm: Option<HbmInfo>,
    pub hbm_util: u32,
    pub hbm_ecc: Option<EccInfo>,
}

impl MemoryData {
    /// Total and used memory in MB, whichever kind the chip has.
    pub fn usage_mb(&self) -> Option<(u64, u64)> {
        if let Some(hbm) = self.hbm.filter(|h| valid_u64(h.total_mb).is_some()) {
            return Some((hbm.total_mb, hbm.used_mb));
        }
        self.ddr
            .filter(|d| valid_u64(d.total_mb).is_some())
            .map(|d| (d.total_mb, d.used_mb()))
    }
}

pub struct MemoryCollector;

impl MetricsCollector for MemoryCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Chip
    }

    fn is_supported(&self, dev_type: &DevType) -> bool {
        dev_type.has_ddr() || dev_type.has_hbm()
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        for chip in chips {
            let id = chip.logic_id;
            let mut data = MemoryData {
                ddr: None,
                hbm: None,
                hbm_util: UNRET_ERROR,
                hbm_ecc: None,
            };
            if chip.dev_type.has_ddr() {
                data.ddr = Some(read_or(
                    "memory info",
                    chip,
                    ctx.manager.get_memory_info(id),
                    MemoryInfo::failed(),
                ));
            }
            if chip.dev_type.has_hbm() {
                data.hbm = Some(read_or(
                    "HBM info",
                    chip,
                    ctx.manager.get_hbm_info(id),
                    HbmInfo::failed(),
                ));
                data.hbm_util = read_or(
                    "HBM utilization",
                    chip,
                    ctx.manager.get_utilization(id, UtilizationType::Hbm),
                    UNRET_ERROR,
                );
                data.hbm_ecc = ctx
                    .manager
                    .get_ecc_info(id, EccDeviceType::Hbm)
                    .map_err(|e| tracing::debug!("No HBM ECC info for NPU {id}: {e}"))
                    .ok();
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
        let items = load_all::<MemoryData>(cache, NAME, chips);

        gauge(
            out,
            containers,
            "npu_chip_info_total_memory",
            "the npu DDR total memory in MB",
            &items,
            |d| d.ddr.and_then(|m| valid_u64(m.total_mb)),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_used_memory",
            "the npu DDR used memory in MB",
            &items,
            |d| d.ddr.filter(|m| valid_u64(m.total_mb).is_some()).map(|m| m.used_mb()),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_memory_utilization",
            "the npu DDR utilization in percent",
            &items,
            |d| d.ddr.and_then(|m| valid_u32(m.utilization)),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_memory_frequency",
            "the npu DDR frequency in MHz",
            &items,
            |d| d.ddr.and_then(|m| valid_u32(m.freq)),
        );

        gauge(
            out,
            containers,
            "npu_chip_info_hbm_total_memory",
            "the npu HBM total memory in MB",
            &items,
            |d| d.hbm.and_then(|h| valid_u64(h.total_mb)),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hbm_used_memory",
            "the npu HBM used memory in MB",
            &items,
            |d| d.hbm.and_then(|h| valid_u64(h.used_mb)),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hbm_utilization",
            "the npu HBM utilization in percent",
            &items,
            |d| valid_u32(d.hbm_util),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hbm_temperature",
            "the npu HBM temperature in celsius",
            &items,
            |d| d.hbm.and_then(|h| valid_i32(h.temperature)),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hbm_bandwidth_utilization",
            "the npu HBM bandwidth utilization in percent",
            &items,
            |d| d.hbm.and_then(|h| valid_u32(h.bandwidth_util)),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_hbm_frequency",
            "the npu HBM frequency in MHz",
            &items,
            |d| d.hbm.and_then(|h| valid_u32(h.freq)),
        );

        type EccField = fn(&EccInfo) -> u32;
        let ecc_metrics: [(&str, &str, EccField); 7] = [
            (
                "npu_chip_info_hbm_ecc_enable_flag",
                "whether HBM ECC is enabled",
                |e| u32::from(e.enabled),
            ),
            (
                "npu_chip_info_hbm_ecc_single_bit_error_cnt",
                "HBM single bit errors",
                |e| e.single_bit_errors,
            ),
            (
                "npu_chip_info_hbm_ecc_double_bit_error_cnt",
                "HBM double bit errors",
                |e| e.double_bit_errors,
            ),
            (
                "npu_chip_info_hbm_ecc_total_single_bit_error_cnt",
                "HBM lifetime single bit errors",
                |e| e.total_single_bit_errors,
            ),
            (
                "npu_chip_info_hbm_ecc_total_double_bit_error_cnt",
                "HBM lifetime double bit errors",
                |e| e.total_double_bit_errors,
            ),
            (
                "npu_chip_info_hbm_ecc_single_bit_isolated_pages_cnt",
                "HBM pages isolated for single bit errors",
                |e| e.single_bit_isolated_pages,
            ),
            (
                "npu_chip_info_hbm_ecc_double_bit_isolated_pages_cnt",
                "HBM pages isolated for double bit errors",
                |e| e.double_bit_isolated_pages,
            ),
        ];
        for (name, help, field) in ecc_metrics {
            gauge(out, containers, name, help, &items, |d| d.hbm_ecc.as_ref().map(field));
        }
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        for (chip, d) in load_all::<MemoryData>(cache, NAME, chips) {
            let point = points.chip(chip);
            if let Some(ddr) = d.ddr.filter(|m| valid_u64(m.total_mb).is_some()) {
                point
                    .field("npu_chip_info_total_memory", ddr.total_mb)
                    .field("npu_chip_info_used_memory", ddr.used_mb());
            }
            if let Some(hbm) = d.hbm {
                if let Some(v) = valid_u64(hbm.total_mb) {
                    point.field("npu_chip_info_hbm_total_memory", v);
                }
                if let Some(v) = valid_u64(hbm.used_mb) {
                    point.field("npu_chip_info_hbm_used_memory", v);
                }
                if let Some(v) = valid_i32(hbm.temperature) {
                    point.field("npu_chip_info_hbm_temperature", v);
                }
            }
            if let Some(v) = valid_u32(d.hbm_util) {
                point.field("npu_chip_info_hbm_utilization", v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_prefers_hbm() {
        let data = MemoryData {
            ddr: None,
            hbm: Some(HbmInfo {
                total_mb: 65536,
                used_mb: 1024,
                freq: 1600,
                temperature: 40,
                bandwidth_util: 0,
            }),
            hbm_util: 2,
            hbm_ecc: None,
        };
        assert_eq!(data.usage_mb(), Some((65536, 1024)));
    }

    #[test]
    fn test_failed_reading_has_no_usage() {
        let data = MemoryData {
            ddr: Some(MemoryInfo::failed()),
            hbm: None,
            hbm_util: UNRET_ERROR,
            hbm_ecc: None,
        };
        assert_eq!(data.usage_mb(), None);
    }
}
