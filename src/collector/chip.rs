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

use serde::Serialize;
use tracing::debug;

use crate::dcmi::constants::DieType;
use crate::dcmi::ChipInfo;
use crate::device::{DevType, DeviceManager};
use crate::error::Result;

/// Identity of one chip, refreshed on every chip tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChipBase {
    pub logic_id: i32,
    pub card_id: i32,
    pub device_id: i32,
    pub phy_id: u32,
    pub chip: ChipInfo,
    /// Empty when the driver does not report it.
    pub vdie_id: String,
    pub pcie_bus_id: String,
    pub dev_type: DevType,
}

impl ChipBase {
    pub fn load(manager: &DeviceManager, logic_id: i32) -> Result<Self> {
        let (card_id, device_id) = manager.get_card_id_device_id(logic_id)?;
        let chip = manager.get_chip_info(logic_id)?;
        let phy_id = manager.get_phy_id(logic_id)?;

        let vdie_id = manager
            .get_die_id(logic_id, DieType::VDie)
            .unwrap_or_else(|e| {
                debug!("No VDie id for NPU {logic_id}: {e}");
                String::new()
            });
        let pcie_bus_id = manager
            .get_pcie_info(logic_id)
            .map(|pcie| pcie.bus_id())
            .unwrap_or_else(|e| {
                debug!("No PCIe info for NPU {logic_id}: {e}");
                String::new()
            });

        Ok(Self {
            logic_id,
            card_id,
            device_id,
            phy_id,
            dev_type: DevType::from_chip_name(&chip.chip_name),
            chip,
            vdie_id,
            pcie_bus_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcmi::MockDcmi;
    use crate::device::RetryPolicy;
    use std::sync::Arc;

    #[test]
    fn test_load_chip_base() {
        let mock = Arc::new(MockDcmi::new(1, 2, "310P3"));
        let manager = DeviceManager::new(mock, RetryPolicy::none()).unwrap();
        let chip = ChipBase::load(&manager, 1).unwrap();
        assert_eq!((chip.card_id, chip.device_id, chip.phy_id), (0, 1, 1));
        assert_eq!(chip.dev_type, DevType::Ascend310P);
        assert_eq!(chip.pcie_bus_id, "0000:c2:00.0");
        assert!(!chip.vdie_id.is_empty());
    }

    #[test]
    fn test_missing_pcie_info_is_tolerated() {
        let mock = Arc::new(MockDcmi::ascend_910b(1));
        mock.unsupport("dcmi_get_device_pcie_info_v2");
        let manager = DeviceManager::new(mock, RetryPolicy::none()).unwrap();
        let chip = ChipBase::load(&manager, 0).unwrap();
        assert!(chip.pcie_bus_id.is_empty());
    }
}
