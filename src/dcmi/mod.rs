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

//! Bindings to the Ascend Device Control and Management Interface.
//!
//! [`DcmiDriver`] is the seam between the FFI layer and the rest of the
//! crate. [`LibDcmi`] implements it on top of `libdcmi.so`, [`MockDcmi`]
//! simulates a machine for hardware-less runs and tests.

pub mod constants;
mod ffi;
pub mod library;
pub mod mock;
pub mod types;

pub use library::LibDcmi;
pub use mock::MockDcmi;
pub use types::*;

use crate::error::Result;
use constants::{DieType, EccDeviceType, FrequencyType, HccsSubCommand, UtilizationType};

/// Raw driver operations.
///
/// `card_id`/`device_id` are the DCMI card id and the index of the chip on
/// that card. Implementations must be callable from several threads.
pub trait DcmiDriver: Send + Sync {
    fn init(&self) -> Result<()>;
    fn shutdown(&self) -> Result<()>;

    fn card_list(&self) -> Result<Vec<i32>>;
    fn device_num_in_card(&self, card_id: i32) -> Result<i32>;
    fn logic_id(&self, card_id: i32, device_id: i32) -> Result<i32>;
    fn card_id_device_id(&self, logic_id: i32) -> Result<(i32, i32)>;
    fn phy_id(&self, logic_id: i32) -> Result<u32>;

    fn chip_info(&self, card_id: i32, device_id: i32) -> Result<ChipInfo>;
    fn device_health(&self, card_id: i32, device_id: i32) -> Result<u32>;
    fn error_codes(&self, card_id: i32, device_id: i32) -> Result<Vec<u32>>;
    fn temperature(&self, card_id: i32, device_id: i32) -> Result<i32>;
    /// Power in units of 0.1 W.
    fn power(&self, card_id: i32, device_id: i32) -> Result<i32>;
    /// Voltage in units of 0.01 V.
    fn voltage(&self, card_id: i32, device_id: i32) -> Result<u32>;
    fn utilization_rate(&self, card_id: i32, device_id: i32, kind: UtilizationType)
        -> Result<u32>;
    fn frequency(&self, card_id: i32, device_id: i32, kind: FrequencyType) -> Result<u32>;

    fn memory_info_v3(&self, card_id: i32, device_id: i32) -> Result<MemoryInfo>;
    fn memory_info_v2(&self, card_id: i32, device_id: i32) -> Result<MemoryInfo>;
    fn hbm_info(&self, card_id: i32, device_id: i32) -> Result<HbmInfo>;
    fn ecc_info(&self, card_id: i32, device_id: i32, kind: EccDeviceType) -> Result<EccInfo>;
    fn pcie_info(&self, card_id: i32, device_id: i32) -> Result<PcieInfo>;

    fn device_ip(&self, card_id: i32, device_id: i32, port_id: i32) -> Result<String>;
    fn network_health(&self, card_id: i32, device_id: i32) -> Result<u32>;

    fn hccs_statistic(
        &self,
        card_id: i32,
        device_id: i32,
        sub_command: HccsSubCommand,
    ) -> Result<HccsStatisticInfo>;
    fn hccs_bandwidth(
        &self,
        card_id: i32,
        device_id: i32,
        profiling_ms: i32,
    ) -> Result<HccsBandwidthInfo>;
    fn pcie_bandwidth(&self, card_id: i32, device_id: i32, profiling_ms: i32)
        -> Result<PcieBandwidth>;

    fn device_processes(&self, card_id: i32, device_id: i32) -> Result<Vec<ProcessMemInfo>>;
    fn vdevice_info(&self, card_id: i32, device_id: i32) -> Result<VDevInfo>;
    fn vdevice_activity(&self, card_id: i32, device_id: i32, vdev_id: u32)
        -> Result<VDevActivity>;

    fn die_id(&self, card_id: i32, device_id: i32, kind: DieType) -> Result<String>;
    fn product_type(&self, card_id: i32, device_id: i32) -> Result<String>;
    fn driver_version(&self) -> Result<String>;
    fn dcmi_version(&self) -> Result<String>;
}
