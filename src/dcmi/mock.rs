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

//! Simulated DCMI driver.
//!
//! Serves deterministic values derived from the logic id so the exporter can
//! run on machines without Ascend hardware (`--mock-devices`) and so tests
//! can inject failures per API.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::constants::{
    DieType, EccDeviceType, FrequencyType, HccsSubCommand, UtilizationType, ERR_NOT_SUPPORT,
    HCCS_MAX_PORT_NUM, MAX_DEVICE_NUM_IN_CARD,
};
use super::types::*;
use super::DcmiDriver;
use crate::common::lock;
use crate::error::{Error, Result};

pub struct MockDcmi {
    cards: Vec<i32>,
    devices_per_card: i32,
    chip_name: String,
    failing: Mutex<HashSet<&'static str>>,
    unsupported: Mutex<HashSet<&'static str>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockDcmi {
    /// A machine with `cards` cards of `devices_per_card` chips named `chip_name`.
    pub fn new(cards: usize, devices_per_card: i32, chip_name: &str) -> Self {
        Self {
            cards: (0..cards as i32).collect(),
            devices_per_card: devices_per_card.clamp(1, MAX_DEVICE_NUM_IN_CARD),
            chip_name: chip_name.to_string(),
            failing: Mutex::new(HashSet::new()),
            unsupported: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// A 910B3 server with `devices` single-chip cards.
    pub fn ascend_910b(devices: usize) -> Self {
        Self::new(devices, 1, "910B3")
    }

    /// Makes `api` return an internal error until cleared.
    pub fn fail(&self, api: &'static str) {
        lock(&self.failing).insert(api);
    }

    /// Makes `api` report "not supported".
    pub fn unsupport(&self, api: &'static str) {
        lock(&self.unsupported).insert(api);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
        lock(&self.unsupported).clear();
    }

    /// Number of times `api` was invoked.
    pub fn call_count(&self, api: &'static str) -> usize {
        lock(&self.calls).get(api).copied().unwrap_or(0)
    }

    fn enter(&self, api: &'static str) -> Result<()> {
        *lock(&self.calls).entry(api).or_insert(0) += 1;
        if lock(&self.unsupported).contains(api) {
            return Err(Error::Dcmi {
                api,
                code: ERR_NOT_SUPPORT,
            });
        }
        if lock(&self.failing).contains(api) {
            return Err(Error::Dcmi { api, code: -8005 });
        }
        Ok(())
    }

    fn logic(&self, card_id: i32, device_id: i32) -> Result<i32> {
        if !self.cards.contains(&card_id) || device_id < 0 || device_id >= self.devices_per_card {
            return Err(Error::Dcmi {
                api: "dcmi_get_device_logic_id",
                code: -8001,
            });
        }
        Ok(card_id * self.devices_per_card + device_id)
    }

    fn is_910(&self) -> bool {
        self.chip_name.starts_with("910")
    }
}

impl DcmiDriver for MockDcmi {
    fn init(&self) -> Result<()> {
        self.enter("dcmi_init")
    }

    fn shutdown(&self) -> Result<()> {
        self.enter("dcmi_shutdown")
    }

    fn card_list(&self) -> Result<Vec<i32>> {
        self.enter("dcmi_get_card_list")?;
        Ok(self.cards.clone())
    }

    fn device_num_in_card(&self, card_id: i32) -> Result<i32> {
        self.enter("dcmi_get_device_num_in_card")?;
        if !self.cards.contains(&card_id) {
            return Err(Error::Dcmi {
                api: "dcmi_get_device_num_in_card",
                code: -8001,
            });
        }
        Ok(self.devices_per_card)
    }

    fn logic_id(&self, card_id: i32, device_id: i32) -> Result<i32> {
        self.enter("dcmi_get_device_logic_id")?;
        self.logic(card_id, device_id)
    }

    fn card_id_device_id(&self, logic_id: i32) -> Result<(i32, i32)> {
        self.enter("dcmi_get_card_id_device_id_from_logicid")?;
        let card = logic_id / self.devices_per_card;
        if logic_id < 0 || !self.cards.contains(&card) {
            return Err(Error::Dcmi {
                api: "dcmi_get_card_id_device_id_from_logicid",
                code: -8001,
            });
        }
        Ok((card, logic_id % self.devices_per_card))
    }

    fn phy_id(&self, logic_id: i32) -> Result<u32> {
        self.enter("dcmi_get_device_phyid_from_logicid")?;
        Ok(logic_id as u32)
    }

    fn chip_info(&self, card_id: i32, device_id: i32) -> Result<ChipInfo> {
        self.enter("dcmi_get_device_chip_info")?;
        self.logic(card_id, device_id)?;
        Ok(ChipInfo {
            chip_type: "Ascend".to_string(),
            chip_name: self.chip_name.clone(),
            chip_ver: "V1".to_string(),
            aicore_cnt: if self.is_910() { 20 } else { 8 },
        })
    }

    fn device_health(&self, card_id: i32, device_id: i32) -> Result<u32> {
        self.enter("dcmi_get_device_health")?;
        self.logic(card_id, device_id)?;
        Ok(0)
    }

    fn error_codes(&self, card_id: i32, device_id: i32) -> Result<Vec<u32>> {
        self.enter("dcmi_get_device_errorcode_v2")?;
        self.logic(card_id, device_id)?;
        Ok(Vec::new())
    }

    fn temperature(&self, card_id: i32, device_id: i32) -> Result<i32> {
        self.enter("dcmi_get_device_temperature")?;
        Ok(40 + self.logic(card_id, device_id)?)
    }

    fn power(&self, card_id: i32, device_id: i32) -> Result<i32> {
        self.enter("dcmi_get_device_power_info")?;
        Ok(950 + 10 * self.logic(card_id, device_id)?)
    }

    fn voltage(&self, card_id: i32, device_id: i32) -> Result<u32> {
        self.enter("dcmi_get_device_voltage")?;
        self.logic(card_id, device_id)?;
        Ok(85)
    }

    fn utilization_rate(
        &self,
        card_id: i32,
        device_id: i32,
        kind: UtilizationType,
    ) -> Result<u32> {
        self.enter("dcmi_get_device_utilization_rate")?;
        let logic = self.logic(card_id, device_id)? as u32;
        Ok(match kind {
            UtilizationType::AiCore => 10 + logic,
            UtilizationType::AiCpu => 2,
            UtilizationType::CtrlCpu => 5,
            UtilizationType::VectorCore => 3,
            UtilizationType::Hbm | UtilizationType::Memory => 50,
            UtilizationType::MemoryBandwidth | UtilizationType::HbmBandwidth => 12,
        })
    }

    fn frequency(&self, card_id: i32, device_id: i32, kind: FrequencyType) -> Result<u32> {
        self.enter("dcmi_get_device_frequency")?;
        self.logic(card_id, device_id)?;
        Ok(match kind {
            FrequencyType::AiCoreCurrent | FrequencyType::AiCoreRated => 1800,
            FrequencyType::Hbm => 1600,
            FrequencyType::Ddr => 3200,
            FrequencyType::CtrlCpu | FrequencyType::VectorCore => 1000,
        })
    }

    fn memory_info_v3(&self, card_id: i32, device_id: i32) -> Result<MemoryInfo> {
        self.enter("dcmi_get_device_memory_info_v3")?;
        self.logic(card_id, device_id)?;
        Ok(MemoryInfo {
            total_mb: 21534,
            available_mb: 20000,
            freq: 3200,
            hugepage_size: 2048,
            hugepages_total: 0,
            hugepages_free: 0,
            utilization: 7,
        })
    }

    fn memory_info_v2(&self, card_id: i32, device_id: i32) -> Result<MemoryInfo> {
        self.enter("dcmi_get_device_memory_info_v2")?;
        self.logic(card_id, device_id)?;
        Ok(MemoryInfo {
            total_mb: 21534,
            available_mb: 20026,
            freq: 3200,
            hugepage_size: 0,
            hugepages_total: 0,
            hugepages_free: 0,
            utilization: 7,
        })
    }

    fn hbm_info(&self, card_id: i32, device_id: i32) -> Result<HbmInfo> {
        self.enter("dcmi_get_device_hbm_info")?;
        self.logic(card_id, device_id)?;
        if !self.is_910() {
            return Err(Error::Dcmi {
                api: "dcmi_get_device_hbm_info",
                code: ERR_NOT_SUPPORT,
            });
        }
        Ok(HbmInfo {
            total_mb: 65536,
            used_mb: 3379,
            freq: 1600,
            temperature: 38,
            bandwidth_util: 0,
        })
    }

    fn ecc_info(&self, card_id: i32, device_id: i32, _kind: EccDeviceType) -> Result<EccInfo> {
        self.enter("dcmi_get_device_ecc_info")?;
        self.logic(card_id, device_id)?;
        Ok(EccInfo {
            enabled: true,
            ..EccInfo::default()
        })
    }

    fn pcie_info(&self, card_id: i32, device_id: i32) -> Result<PcieInfo> {
        self.enter("dcmi_get_device_pcie_info_v2")?;
        let logic = self.logic(card_id, device_id)? as u32;
        Ok(PcieInfo {
            vendor_id: 0x19e5,
            device_id: 0xd802,
            domain: 0,
            bus: 0xc1 + logic,
            device: 0,
            function: 0,
        })
    }

    fn device_ip(&self, card_id: i32, device_id: i32, _port_id: i32) -> Result<String> {
        self.enter("dcmi_get_device_ip")?;
        Ok(format!("192.168.100.{}", 100 + self.logic(card_id, device_id)?))
    }

    fn network_health(&self, card_id: i32, device_id: i32) -> Result<u32> {
        self.enter("dcmi_get_device_network_health")?;
        self.logic(card_id, device_id)?;
        Ok(1)
    }

    fn hccs_statistic(
        &self,
        card_id: i32,
        device_id: i32,
        sub_command: HccsSubCommand,
    ) -> Result<HccsStatisticInfo> {
        let api = match sub_command {
            HccsSubCommand::StatisticInfoU64 => "dcmi_get_hccs_statistic_info_u64",
            HccsSubCommand::StatisticInfo => "dcmi_get_hccs_statistic_info",
        };
        self.enter(api)?;
        let logic = self.logic(card_id, device_id)? as u64;
        Ok(HccsStatisticInfo {
            tx_cnt: [1000 + logic; HCCS_MAX_PORT_NUM],
            rx_cnt: [2000 + logic; HCCS_MAX_PORT_NUM],
            crc_err_cnt: [0; HCCS_MAX_PORT_NUM],
            retry_cnt: [0; HCCS_MAX_PORT_NUM],
        })
    }

    fn hccs_bandwidth(
        &self,
        card_id: i32,
        device_id: i32,
        profiling_ms: i32,
    ) -> Result<HccsBandwidthInfo> {
        self.enter("dcmi_get_hccs_link_bandwidth_info")?;
        self.logic(card_id, device_id)?;
        Ok(HccsBandwidthInfo {
            profiling_time_ms: profiling_ms,
            total_tx: 8.0,
            total_rx: 16.0,
            tx: [1.0; HCCS_MAX_PORT_NUM],
            rx: [2.0; HCCS_MAX_PORT_NUM],
        })
    }

    fn pcie_bandwidth(
        &self,
        card_id: i32,
        device_id: i32,
        profiling_ms: i32,
    ) -> Result<PcieBandwidth> {
        self.enter("dcmi_get_pcie_link_bandwidth_info")?;
        self.logic(card_id, device_id)?;
        let stat = BandwidthStat::from_array([10, 30, 20]);
        Ok(PcieBandwidth {
            profiling_time_ms: profiling_ms,
            tx_posted: stat,
            tx_non_posted: stat,
            tx_completion: stat,
            rx_posted: stat,
            rx_non_posted: stat,
            rx_completion: stat,
        })
    }

    fn device_processes(&self, card_id: i32, device_id: i32) -> Result<Vec<ProcessMemInfo>> {
        self.enter("dcmi_get_device_resource_info")?;
        let logic = self.logic(card_id, device_id)?;
        if logic == 0 {
            Ok(vec![ProcessMemInfo {
                pid: 4242,
                mem_usage_mb: 3072,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    fn vdevice_info(&self, card_id: i32, device_id: i32) -> Result<VDevInfo> {
        self.enter("dcmi_get_vdevice_info")?;
        let logic = self.logic(card_id, device_id)?;
        let vdevices = if logic == 0 {
            vec![VDevice {
                vdev_id: 100,
                vfg_id: 0,
                status: 1,
                container_id: 0,
                spec_name: "vir04".to_string(),
                aicore_num: 4,
            }]
        } else {
            Vec::new()
        };
        Ok(VDevInfo {
            total_aicore: 8,
            unused_aicore: 8 - vdevices.iter().map(|v| v.aicore_num).sum::<u32>(),
            vdevices,
        })
    }

    fn vdevice_activity(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
    ) -> Result<VDevActivity> {
        self.enter("dcmi_get_vdevice_activity")?;
        self.logic(card_id, device_id)?;
        Ok(VDevActivity {
            vdev_id,
            aicore_util: 25,
            mem_total_mb: 6144,
            mem_used_mb: 1024,
        })
    }

    fn die_id(&self, card_id: i32, device_id: i32, kind: DieType) -> Result<String> {
        self.enter("dcmi_get_device_die_v2")?;
        let logic = self.logic(card_id, device_id)?;
        Ok(format!("{:08X}{:032X}", kind as i32, logic))
    }

    fn product_type(&self, card_id: i32, device_id: i32) -> Result<String> {
        self.enter("dcmi_get_product_type")?;
        self.logic(card_id, device_id)?;
        Ok(if self.is_910() {
            "Atlas 800T A2".to_string()
        } else {
            "Atlas 300I Duo".to_string()
        })
    }

    fn driver_version(&self) -> Result<String> {
        self.enter("dcmi_get_driver_version")?;
        Ok("23.0.3".to_string())
    }

    fn dcmi_version(&self) -> Result<String> {
        self.enter("dcmi_get_dcmi_version")?;
        Ok("7.0.0".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_ids_round_trip() {
        let mock = MockDcmi::new(2, 2, "310P3");
        let logic = mock.logic_id(1, 1).unwrap();
        assert_eq!(logic, 3);
        assert_eq!(mock.card_id_device_id(logic).unwrap(), (1, 1));
        assert!(mock.logic_id(5, 0).is_err());
    }

    #[test]
    fn test_failure_injection() {
        let mock = MockDcmi::ascend_910b(1);
        mock.fail("dcmi_get_device_temperature");
        assert!(mock.temperature(0, 0).is_err());
        mock.clear_failures();
        assert_eq!(mock.temperature(0, 0).unwrap(), 40);
        assert_eq!(mock.call_count("dcmi_get_device_temperature"), 2);
    }

    #[test]
    fn test_unsupported_is_classified() {
        let mock = MockDcmi::ascend_910b(1);
        mock.unsupport("dcmi_get_device_hbm_info");
        assert!(mock.hbm_info(0, 0).unwrap_err().is_not_supported());
    }
}
