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

//! Owned Rust values for the data returned by the driver.
//!
//! These are rebuilt on every poll. Fields that could not be read hold the
//! sentinels from [`super::constants`].

use serde::Serialize;

use super::constants::{HCCS_MAX_PORT_NUM, RET_ERROR, UNRET_ERROR};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChipInfo {
    /// e.g. "Ascend"
    pub chip_type: String,
    /// e.g. "910B3", "310P3"
    pub chip_name: String,
    pub chip_ver: String,
    pub aicore_cnt: u32,
}

impl ChipInfo {
    /// Model name used in metric labels, e.g. "Ascend910B3".
    pub fn model_name(&self) -> String {
        format!("{}{}", self.chip_type, self.chip_name)
    }
}

/// DDR memory of 310 family chips, sizes in MB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub available_mb: u64,
    pub freq: u32,
    pub hugepage_size: u64,
    pub hugepages_total: u64,
    pub hugepages_free: u64,
    pub utilization: u32,
}

impl MemoryInfo {
    pub fn failed() -> Self {
        Self {
            total_mb: u64::MAX,
            available_mb: u64::MAX,
            freq: UNRET_ERROR,
            hugepage_size: u64::MAX,
            hugepages_total: u64::MAX,
            hugepages_free: u64::MAX,
            utilization: UNRET_ERROR,
        }
    }

    pub fn used_mb(&self) -> u64 {
        self.total_mb.saturating_sub(self.available_mb)
    }
}

/// HBM of 910 family chips, sizes in MB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HbmInfo {
    pub total_mb: u64,
    pub used_mb: u64,
    pub freq: u32,
    pub temperature: i32,
    pub bandwidth_util: u32,
}

impl HbmInfo {
    pub fn failed() -> Self {
        Self {
            total_mb: u64::MAX,
            used_mb: u64::MAX,
            freq: UNRET_ERROR,
            temperature: RET_ERROR,
            bandwidth_util: UNRET_ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EccInfo {
    pub enabled: bool,
    pub single_bit_errors: u32,
    pub double_bit_errors: u32,
    pub total_single_bit_errors: u32,
    pub total_double_bit_errors: u32,
    pub single_bit_isolated_pages: u32,
    pub double_bit_isolated_pages: u32,
}

/// PCI location of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PcieInfo {
    pub vendor_id: u32,
    pub device_id: u32,
    pub domain: i32,
    pub bus: u32,
    pub device: u32,
    pub function: u32,
}

impl PcieInfo {
    /// Bus id in the canonical `dddd:bb:dd.f` form.
    pub fn bus_id(&self) -> String {
        format!(
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain.max(0),
            self.bus,
            self.device,
            self.function
        )
    }
}

/// Per-port HCCS link counters. Counters are widened to u64 regardless
/// of which driver subcommand produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HccsStatisticInfo {
    pub tx_cnt: [u64; HCCS_MAX_PORT_NUM],
    pub rx_cnt: [u64; HCCS_MAX_PORT_NUM],
    pub crc_err_cnt: [u64; HCCS_MAX_PORT_NUM],
    pub retry_cnt: [u64; HCCS_MAX_PORT_NUM],
}

impl HccsStatisticInfo {
    pub fn failed() -> Self {
        Self {
            tx_cnt: [u64::MAX; HCCS_MAX_PORT_NUM],
            rx_cnt: [u64::MAX; HCCS_MAX_PORT_NUM],
            crc_err_cnt: [u64::MAX; HCCS_MAX_PORT_NUM],
            retry_cnt: [u64::MAX; HCCS_MAX_PORT_NUM],
        }
    }
}

/// HCCS bandwidth over a profiling window, in MB/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HccsBandwidthInfo {
    pub profiling_time_ms: i32,
    pub total_tx: f64,
    pub total_rx: f64,
    pub tx: [f64; HCCS_MAX_PORT_NUM],
    pub rx: [f64; HCCS_MAX_PORT_NUM],
}

impl HccsBandwidthInfo {
    pub fn failed() -> Self {
        Self {
            profiling_time_ms: RET_ERROR,
            total_tx: f64::from(RET_ERROR),
            total_rx: f64::from(RET_ERROR),
            tx: [f64::from(RET_ERROR); HCCS_MAX_PORT_NUM],
            rx: [f64::from(RET_ERROR); HCCS_MAX_PORT_NUM],
        }
    }
}

/// Minimum, maximum and average of one PCIe bandwidth counter, in MB/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandwidthStat {
    pub min: u32,
    pub max: u32,
    pub avg: u32,
}

impl BandwidthStat {
    pub const FAILED: BandwidthStat = BandwidthStat {
        min: UNRET_ERROR,
        max: UNRET_ERROR,
        avg: UNRET_ERROR,
    };

    /// Builds a stat from the driver's `[min, max, avg]` layout.
    pub fn from_array(values: [u32; 3]) -> Self {
        Self {
            min: values[0],
            max: values[1],
            avg: values[2],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PcieBandwidth {
    pub profiling_time_ms: i32,
    pub tx_posted: BandwidthStat,
    pub tx_non_posted: BandwidthStat,
    pub tx_completion: BandwidthStat,
    pub rx_posted: BandwidthStat,
    pub rx_non_posted: BandwidthStat,
    pub rx_completion: BandwidthStat,
}

impl PcieBandwidth {
    pub fn failed() -> Self {
        Self {
            profiling_time_ms: RET_ERROR,
            tx_posted: BandwidthStat::FAILED,
            tx_non_posted: BandwidthStat::FAILED,
            tx_completion: BandwidthStat::FAILED,
            rx_posted: BandwidthStat::FAILED,
            rx_non_posted: BandwidthStat::FAILED,
            rx_completion: BandwidthStat::FAILED,
        }
    }

    /// Labelled view used by the exporters.
    pub fn stats(&self) -> [(&'static str, BandwidthStat); 6] {
        [
            ("tx_p_bw", self.tx_posted),
            ("tx_np_bw", self.tx_non_posted),
            ("tx_cpl_bw", self.tx_completion),
            ("rx_p_bw", self.rx_posted),
            ("rx_np_bw", self.rx_non_posted),
            ("rx_cpl_bw", self.rx_completion),
        ]
    }
}

/// A process holding device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessMemInfo {
    pub pid: i32,
    pub mem_usage_mb: u64,
}

/// One vNPU partition carved out of a physical chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VDevice {
    pub vdev_id: u32,
    pub vfg_id: u32,
    pub status: u32,
    pub container_id: u64,
    pub spec_name: String,
    pub aicore_num: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VDevInfo {
    pub total_aicore: u32,
    pub unused_aicore: u32,
    pub vdevices: Vec<VDevice>,
}

/// Activity of one vNPU over the last driver sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VDevActivity {
    pub vdev_id: u32,
    pub aicore_util: u32,
    pub mem_total_mb: u64,
    pub mem_used_mb: u64,
}

impl VDevActivity {
    pub fn failed(vdev_id: u32) -> Self {
        Self {
            vdev_id,
            aicore_util: UNRET_ERROR,
            mem_total_mb: u64::MAX,
            mem_used_mb: u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name() {
        let chip = ChipInfo {
            chip_type: "Ascend".to_string(),
            chip_name: "910B3".to_string(),
            chip_ver: "V1".to_string(),
            aicore_cnt: 20,
        };
        assert_eq!(chip.model_name(), "Ascend910B3");
    }

    #[test]
    fn test_bus_id_format() {
        let pcie = PcieInfo {
            vendor_id: 0x19e5,
            device_id: 0xd802,
            domain: 0,
            bus: 0xc1,
            device: 0,
            function: 0,
        };
        assert_eq!(pcie.bus_id(), "0000:c1:00.0");
    }

    #[test]
    fn test_memory_used() {
        let mem = MemoryInfo {
            total_mb: 21534,
            available_mb: 20000,
            freq: 3200,
            hugepage_size: 2048,
            hugepages_total: 0,
            hugepages_free: 0,
            utilization: 7,
        };
        assert_eq!(mem.used_mb(), 1534);
    }
}
