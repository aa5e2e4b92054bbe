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

//! Chip health, temperature, power and utilization.

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    gauge, load, load_all, read_or, series, valid_f64, valid_i32, valid_u32, ChipBase,
    CollectContext, CollectGroup, ContainerView, MetricCache, MetricsCollector,
};
use crate::dcmi::constants::{FrequencyType, HealthState, UtilizationType, RET_ERROR, UNRET_ERROR};
use crate::device::DevType;
use crate::telegraf::{LinePoint, TelegrafPoints};

pub const NAME: &str = "base";
const VERSION_KEY: i32 = -1;

/// Latest reading of the per-chip basics.
#[derive(Debug, Clone, PartialEq)]
pub struct ChipStatus {
    pub health: Option<HealthState>,
    pub error_codes: Vec<u32>,
    pub temperature: i32,
    /// W
    pub power: f64,
    /// V
    pub voltage: f64,
    pub aicore_util: u32,
    pub aicpu_util: u32,
    pub ctrlcpu_util: u32,
    pub vector_util: u32,
    /// MHz
    pub aicore_freq: u32,
    pub aicore_rated_freq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Versions {
    driver: String,
    dcmi: String,
}

pub struct BaseCollector;

impl MetricsCollector for BaseCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn group(&self) -> CollectGroup {
        CollectGroup::Chip
    }

    fn is_supported(&self, _dev_type: &DevType) -> bool {
        true
    }

    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]) {
        let manager = &ctx.manager;
        for chip in chips {
            let id = chip.logic_id;
            let util = |kind: UtilizationType, what: &str| {
                read_or(what, chip, manager.get_utilization(id, kind), UNRET_ERROR)
            };
            let has_vector_core =
                chip.dev_type.is_310_family() || chip.dev_type == DevType::Ascend910B;
            let vector_util = if has_vector_core {
                util(UtilizationType::VectorCore, "vector core utilization")
            } else {
                UNRET_ERROR
            };

            let status = ChipStatus {
                health: read_or("health", chip, manager.get_device_health(id).map(Some), None),
                error_codes: read_or("error codes", chip, manager.get_error_codes(id), Vec::new()),
                temperature: read_or("temperature", chip, manager.get_temperature(id), RET_ERROR),
                power: read_or("power", chip, manager.get_power(id), f64::from(RET_ERROR)),
                voltage: read_or("voltage", chip, manager.get_voltage(id), f64::from(RET_ERROR)),
                aicore_util: util(UtilizationType::AiCore, "AI core utilization"),
                aicpu_util: util(UtilizationType::AiCpu, "AI CPU utilization"),
                ctrlcpu_util: util(UtilizationType::CtrlCpu, "control CPU utilization"),
                vector_util,
                aicore_freq: read_or(
                    "AI core frequency",
                    chip,
                    manager.get_frequency(id, FrequencyType::AiCoreCurrent),
                    UNRET_ERROR,
                ),
                aicore_rated_freq: read_or(
                    "AI core rated frequency",
                    chip,
                    manager.get_frequency(id, FrequencyType::AiCoreRated),
                    UNRET_ERROR,
                ),
            };
            ctx.store(NAME, id, status);
        }

        let versions = Versions {
            driver: manager.get_driver_version().unwrap_or_default(),
            dcmi: manager.get_dcmi_version().unwrap_or_default(),
        };
        ctx.store(NAME, VERSION_KEY, versions);
    }

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    ) {
        out.family("machine_npu_nums", "Amount of npu installed on the machine.", "gauge")
            .metric::<&str, &str>("machine_npu_nums", &[], chips.len());

        let versions = load::<Versions>(cache, NAME, VERSION_KEY);
        out.family(
            "npu_exporter_version_info",
            "exporter version with value '1'",
            "gauge",
        )
        .metric(
            "npu_exporter_version_info",
            &[
                ("exporterVersion", env!("CARGO_PKG_VERSION")),
                (
                    "driverVersion",
                    versions.as_ref().map(|v| v.driver.as_str()).unwrap_or(""),
                ),
                (
                    "dcmiVersion",
                    versions.as_ref().map(|v| v.dcmi.as_str()).unwrap_or(""),
                ),
            ],
            1,
        );

        let items = load_all::<ChipStatus>(cache, NAME, chips);

        series(
            out,
            containers,
            "npu_chip_info_name",
            "the Ascend npu name with value '1'",
            &items,
            |_| vec![(Vec::new(), 1)],
        );
        series(
            out,
            containers,
            "npu_chip_info_health_status",
            "the npu health status, 1 healthy, 0 unhealthy",
            &items,
            |s| {
                s.health
                    .map(|h| (vec![("status", h.as_str().to_string())], h.metric_value()))
                    .into_iter()
                    .collect()
            },
        );
        gauge(out, containers, "npu_chip_info_error_code", "the first npu error code", &items, |s| {
            Some(s.error_codes.first().copied().unwrap_or(0))
        });
        series(
            out,
            containers,
            "npu_chip_info_error_code_n",
            "the npu error codes beyond the first",
            &items,
            |s| {
                s.error_codes
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(i, code)| (vec![("index", i.to_string())], *code))
                    .collect()
            },
        );
        gauge(
            out,
            containers,
            "npu_chip_info_temperature",
            "the npu temperature in celsius",
            &items,
            |s| valid_i32(s.temperature),
        );
        gauge(out, containers, "npu_chip_info_power", "the npu power in watts", &items, |s| {
            valid_f64(s.power)
        });
        gauge(out, containers, "npu_chip_info_voltage", "the npu voltage in volts", &items, |s| {
            valid_f64(s.voltage)
        });
        gauge(
            out,
            containers,
            "npu_chip_info_utilization",
            "the AI core utilization in percent",
            &items,
            |s| valid_u32(s.aicore_util),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_aicpu_utilization",
            "the AI CPU utilization in percent",
            &items,
            |s| valid_u32(s.aicpu_util),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_ctrlcpu_utilization",
            "the control CPU utilization in percent",
            &items,
            |s| valid_u32(s.ctrlcpu_util),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_vector_utilization",
            "the vector core utilization in percent",
            &items,
            |s| valid_u32(s.vector_util),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_aicore_current_freq",
            "the AI core current frequency in MHz",
            &items,
            |s| valid_u32(s.aicore_freq),
        );
        gauge(
            out,
            containers,
            "npu_chip_info_aicore_rated_freq",
            "the AI core rated frequency in MHz",
            &items,
            |s| valid_u32(s.aicore_rated_freq),
        );
    }

    fn export_telegraf(
        &self,
        points: &mut TelegrafPoints,
        chips: &[ChipBase],
        cache: &MetricCache,
    ) {
        let mut machine = LinePoint::new("npu_machine");
        machine
            .field("machine_npu_nums", chips.len() as u64)
            .tag("exporter_version", env!("CARGO_PKG_VERSION"));
        if let Some(versions) = load::<Versions>(cache, NAME, VERSION_KEY) {
            machine.tag("driver_version", versions.driver.clone());
        }
        points.push(machine);

        for (chip, s) in load_all::<ChipStatus>(cache, NAME, chips) {
            let point = points.chip(chip);
            if let Some(health) = s.health {
                point.field("npu_chip_info_health_status", health.metric_value());
            }
            point.field(
                "npu_chip_info_error_code",
                s.error_codes.first().copied().unwrap_or(0),
            );
            if let Some(v) = valid_i32(s.temperature) {
                point.field("npu_chip_info_temperature", v);
            }
            if let Some(v) = valid_f64(s.power) {
                point.field("npu_chip_info_power", v);
            }
            if let Some(v) = valid_f64(s.voltage) {
                point.field("npu_chip_info_voltage", v);
            }
            for (key, value) in [
                ("npu_chip_info_utilization", s.aicore_util),
                ("npu_chip_info_aicpu_utilization", s.aicpu_util),
                ("npu_chip_info_ctrlcpu_utilization", s.ctrlcpu_util),
                ("npu_chip_info_vector_utilization", s.vector_util),
                ("npu_chip_info_aicore_current_freq", s.aicore_freq),
            ] {
                if let Some(v) = valid_u32(value) {
                    point.field(key, v);
                }
            }
        }
    }
}
