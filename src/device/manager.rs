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

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::DevType;
use crate::common::{read_lock, write_lock, AppConfig};
use crate::dcmi::constants::{
    DieType, EccDeviceType, FrequencyType, HccsSubCommand, HealthState, NetworkHealth,
    UtilizationType, MAX_LOGIC_ID,
};
use crate::dcmi::types::*;
use crate::dcmi::DcmiDriver;
use crate::error::{Error, Result};

/// How often and how patiently flaky driver calls are repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: AppConfig::RETRY_ATTEMPTS,
            delay: Duration::from_millis(AppConfig::RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryVariant {
    V3,
    V2,
}

/// Safe façade over a [`DcmiDriver`] addressed by logic id.
///
/// All methods block on the driver; async callers go through
/// `tokio::task::spawn_blocking`.
pub struct DeviceManager {
    driver: Arc<dyn DcmiDriver>,
    retry: RetryPolicy,
    dev_type: DevType,
    ids: RwLock<HashMap<i32, (i32, i32)>>,
    memory_variant: OnceLock<MemoryVariant>,
    hccs_variant: OnceLock<HccsSubCommand>,
    closed: AtomicBool,
}

impl DeviceManager {
    /// Initializes the driver, enumerates devices and detects the chip family.
    pub fn new(driver: Arc<dyn DcmiDriver>, retry: RetryPolicy) -> Result<Self> {
        driver.init()?;

        let mut manager = Self {
            driver,
            retry,
            dev_type: DevType::Unknown,
            ids: RwLock::new(HashMap::new()),
            memory_variant: OnceLock::new(),
            hccs_variant: OnceLock::new(),
            closed: AtomicBool::new(false),
        };

        let (count, logic_ids) = manager.get_device_list()?;
        if let Some(&first) = logic_ids.first() {
            let chip = manager.get_chip_info(first)?;
            manager.dev_type = DevType::from_chip_name(&chip.chip_name);
            info!(
                "Found {count} Ascend device(s), type {} ({})",
                manager.dev_type,
                chip.model_name()
            );
        } else {
            warn!("DCMI initialized but no Ascend device was found");
        }

        Ok(manager)
    }

    pub fn dev_type(&self) -> DevType {
        self.dev_type
    }

    fn with_retry<T>(&self, what: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_supported() || attempt >= self.retry.attempts => return Err(e),
                Err(e) => {
                    debug!("{what} failed (attempt {attempt}/{}): {e}", self.retry.attempts);
                    if !self.retry.delay.is_zero() {
                        std::thread::sleep(self.retry.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Calls `preferred`, falling back to `fallback` on error. The variant
    /// that answered is pinned once the preferred one is known to be
    /// unsupported or after it first succeeds.
    fn with_fallback<T, V>(
        chosen: &OnceLock<V>,
        preferred: V,
        fallback: V,
        call: impl Fn(V) -> Result<T>,
    ) -> Result<T>
    where
        V: Copy + std::fmt::Debug,
    {
        if let Some(&variant) = chosen.get() {
            return call(variant);
        }
        match call(preferred) {
            Ok(value) => {
                let _ = chosen.set(preferred);
                Ok(value)
            }
            Err(e) => {
                debug!("{preferred:?} failed ({e}), trying {fallback:?}");
                let value = call(fallback)?;
                if e.is_not_supported() {
                    let _ = chosen.set(fallback);
                }
                Ok(value)
            }
        }
    }

    pub fn get_card_list(&self) -> Result<Vec<i32>> {
        self.with_retry("card list", || self.driver.card_list())
    }

    /// Enumerates every chip on every card and refreshes the id cache.
    pub fn get_device_list(&self) -> Result<(usize, Vec<i32>)> {
        let mut logic_ids = Vec::new();
        for card_id in self.get_card_list()? {
            let num = match self.driver.device_num_in_card(card_id) {
                Ok(num) => num,
                Err(e) => {
                    warn!("Failed to get device count of card {card_id}: {e}");
                    continue;
                }
            };
            for device_id in 0..num {
                match self.driver.logic_id(card_id, device_id) {
                    Ok(logic_id) => {
                        write_lock(&self.ids).insert(logic_id, (card_id, device_id));
                        logic_ids.push(logic_id);
                    }
                    Err(e) => {
                        warn!("Failed to get logic id of card {card_id} device {device_id}: {e}")
                    }
                }
            }
        }
        logic_ids.sort_unstable();
        Ok((logic_ids.len(), logic_ids))
    }

    pub fn get_card_id_device_id(&self, logic_id: i32) -> Result<(i32, i32)> {
        if !(0..MAX_LOGIC_ID).contains(&logic_id) {
            return Err(Error::InvalidDevice(format!("logic id {logic_id}")));
        }
        if let Some(&ids) = read_lock(&self.ids).get(&logic_id) {
            return Ok(ids);
        }
        let ids = self.driver.card_id_device_id(logic_id)?;
        write_lock(&self.ids).insert(logic_id, ids);
        Ok(ids)
    }

    pub fn get_phy_id(&self, logic_id: i32) -> Result<u32> {
        self.get_card_id_device_id(logic_id)?;
        self.driver.phy_id(logic_id)
    }

    pub fn get_chip_info(&self, logic_id: i32) -> Result<ChipInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.with_retry("chip info", || self.driver.chip_info(card, dev))
    }

    pub fn get_device_health(&self, logic_id: i32) -> Result<HealthState> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        let code = self.with_retry("health", || self.driver.device_health(card, dev))?;
        Ok(HealthState::from_code(code))
    }

    pub fn get_error_codes(&self, logic_id: i32) -> Result<Vec<u32>> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.error_codes(card, dev)
    }

    /// Chip temperature in °C.
    pub fn get_temperature(&self, logic_id: i32) -> Result<i32> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.temperature(card, dev)
    }

    /// Power draw in watts.
    pub fn get_power(&self, logic_id: i32) -> Result<f64> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        Ok(f64::from(self.driver.power(card, dev)?) / 10.0)
    }

    /// Voltage in volts.
    pub fn get_voltage(&self, logic_id: i32) -> Result<f64> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        Ok(f64::from(self.driver.voltage(card, dev)?) / 100.0)
    }

    pub fn get_utilization(&self, logic_id: i32, kind: UtilizationType) -> Result<u32> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.utilization_rate(card, dev, kind)
    }

    /// Frequency in MHz.
    pub fn get_frequency(&self, logic_id: i32, kind: FrequencyType) -> Result<u32> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.frequency(card, dev, kind)
    }

    /// DDR memory, from the v3 interface when the driver has it, else v2.
    pub fn get_memory_info(&self, logic_id: i32) -> Result<MemoryInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        Self::with_fallback(
            &self.memory_variant,
            MemoryVariant::V3,
            MemoryVariant::V2,
            |variant| match variant {
                MemoryVariant::V3 => self.driver.memory_info_v3(card, dev),
                MemoryVariant::V2 => self.driver.memory_info_v2(card, dev),
            },
        )
    }

    pub fn get_hbm_info(&self, logic_id: i32) -> Result<HbmInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.hbm_info(card, dev)
    }

    pub fn get_ecc_info(&self, logic_id: i32, kind: EccDeviceType) -> Result<EccInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.ecc_info(card, dev, kind)
    }

    pub fn get_pcie_info(&self, logic_id: i32) -> Result<PcieInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.pcie_info(card, dev)
    }

    pub fn get_device_ip(&self, logic_id: i32) -> Result<String> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.device_ip(card, dev, 0)
    }

    pub fn get_network_health(&self, logic_id: i32) -> Result<NetworkHealth> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        Ok(NetworkHealth::from_code(self.driver.network_health(card, dev)?))
    }

    /// HCCS counters, 64-bit when the driver supports it.
    pub fn get_hccs_statistic(&self, logic_id: i32) -> Result<HccsStatisticInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        Self::with_fallback(
            &self.hccs_variant,
            HccsSubCommand::StatisticInfoU64,
            HccsSubCommand::StatisticInfo,
            |sub_command| self.driver.hccs_statistic(card, dev, sub_command),
        )
    }

    pub fn get_hccs_bandwidth(
        &self,
        logic_id: i32,
        profiling_ms: i32,
    ) -> Result<HccsBandwidthInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.hccs_bandwidth(card, dev, profiling_ms)
    }

    pub fn get_pcie_bandwidth(&self, logic_id: i32, profiling_ms: i32) -> Result<PcieBandwidth> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.pcie_bandwidth(card, dev, profiling_ms)
    }

    pub fn get_device_processes(&self, logic_id: i32) -> Result<Vec<ProcessMemInfo>> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.device_processes(card, dev)
    }

    pub fn get_vdevice_info(&self, logic_id: i32) -> Result<VDevInfo> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.vdevice_info(card, dev)
    }

    pub fn get_vdevice_activity(&self, logic_id: i32, vdev_id: u32) -> Result<VDevActivity> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.vdevice_activity(card, dev, vdev_id)
    }

    pub fn get_die_id(&self, logic_id: i32, kind: DieType) -> Result<String> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.die_id(card, dev, kind)
    }

    pub fn get_product_type(&self, logic_id: i32) -> Result<String> {
        let (card, dev) = self.get_card_id_device_id(logic_id)?;
        self.driver.product_type(card, dev)
    }

    pub fn get_driver_version(&self) -> Result<String> {
        self.driver.driver_version()
    }

    pub fn get_dcmi_version(&self) -> Result<String> {
        self.driver.dcmi_version()
    }

    /// Releases the driver. Later calls are no-ops.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Shutting down DCMI");
        self.driver.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcmi::MockDcmi;

    fn manager_with(mock: Arc<MockDcmi>) -> DeviceManager {
        DeviceManager::new(mock, RetryPolicy::none()).unwrap()
    }

    #[test]
    fn test_enumeration_and_type() {
        let mock = Arc::new(MockDcmi::new(2, 2, "310P3"));
        let manager = manager_with(mock);
        let (count, ids) = manager.get_device_list().unwrap();
        assert_eq!(count, 4);
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(manager.dev_type(), DevType::Ascend310P);
    }

    #[test]
    fn test_id_cache_avoids_driver() {
        let mock = Arc::new(MockDcmi::ascend_910b(2));
        let manager = manager_with(mock.clone());
        assert_eq!(manager.get_card_id_device_id(1).unwrap(), (1, 0));
        assert_eq!(manager.get_card_id_device_id(1).unwrap(), (1, 0));
        assert_eq!(mock.call_count("dcmi_get_card_id_device_id_from_logicid"), 0);
    }

    #[test]
    fn test_invalid_logic_id_rejected_without_driver_call() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        let manager = manager_with(mock.clone());
        assert!(matches!(
            manager.get_card_id_device_id(-1),
            Err(Error::InvalidDevice(_))
        ));
        assert!(matches!(
            manager.get_card_id_device_id(MAX_LOGIC_ID),
            Err(Error::InvalidDevice(_))
        ));
        assert_eq!(mock.call_count("dcmi_get_card_id_device_id_from_logicid"), 0);
    }

    #[test]
    fn test_health_retries() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let manager = DeviceManager::new(mock.clone(), retry).unwrap();
        mock.fail("dcmi_get_device_health");
        assert!(manager.get_device_health(0).is_err());
        assert_eq!(mock.call_count("dcmi_get_device_health"), 3);
    }

    #[test]
    fn test_not_supported_is_not_retried() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let manager = DeviceManager::new(mock.clone(), retry).unwrap();
        mock.unsupport("dcmi_get_device_health");
        assert!(manager.get_device_health(0).is_err());
        assert_eq!(mock.call_count("dcmi_get_device_health"), 1);
    }

    #[test]
    fn test_unit_conversion() {
        let manager = manager_with(Arc::new(MockDcmi::ascend_910b(1)));
        assert!((manager.get_power(0).unwrap() - 95.0).abs() < f64::EPSILON);
        assert!((manager.get_voltage(0).unwrap() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_memory_fallback_is_remembered() {
        let mock = Arc::new(MockDcmi::new(1, 1, "310P3"));
        mock.unsupport("dcmi_get_device_memory_info_v3");
        let manager = manager_with(mock.clone());

        assert_eq!(manager.get_memory_info(0).unwrap().available_mb, 20026);
        assert_eq!(manager.get_memory_info(0).unwrap().available_mb, 20026);
        assert_eq!(mock.call_count("dcmi_get_device_memory_info_v3"), 1);
        assert_eq!(mock.call_count("dcmi_get_device_memory_info_v2"), 2);
    }

    #[test]
    fn test_hccs_prefers_u64() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        let manager = manager_with(mock.clone());
        manager.get_hccs_statistic(0).unwrap();
        manager.get_hccs_statistic(0).unwrap();
        assert_eq!(mock.call_count("dcmi_get_hccs_statistic_info_u64"), 2);
        assert_eq!(mock.call_count("dcmi_get_hccs_statistic_info"), 0);
    }

    #[test]
    fn test_hccs_falls_back_to_u32() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        mock.unsupport("dcmi_get_hccs_statistic_info_u64");
        let manager = manager_with(mock.clone());
        let stats = manager.get_hccs_statistic(0).unwrap();
        assert_eq!(stats.tx_cnt[0], 1000);
        manager.get_hccs_statistic(0).unwrap();
        assert_eq!(mock.call_count("dcmi_get_hccs_statistic_info_u64"), 1);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        let manager = manager_with(mock.clone());
        manager.shutdown().unwrap();
        manager.shutdown().unwrap();
        assert_eq!(mock.call_count("dcmi_shutdown"), 1);
    }
}
