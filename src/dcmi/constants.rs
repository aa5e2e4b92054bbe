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

//! Constants shared with the DCMI C API.

/// Return code of a successful DCMI call.
pub const SUCCESS: i32 = 0;

/// Signed "failed" value stored in place of a metric that could not be read.
pub const RET_ERROR: i32 = -1;

/// Unsigned "failed" value stored in place of a metric that could not be read.
pub const UNRET_ERROR: u32 = u32::MAX;

/// Return code for operations the device does not implement.
pub const ERR_NOT_SUPPORT: i32 = -8255;
/// Return code for an operation not supported in the current device mode.
pub const ERR_NOT_SUPPORT_IN_MODE: i32 = -8008;

pub const MAX_CARD_NUM: i32 = 64;
pub const MAX_DEVICE_NUM_IN_CARD: i32 = 4;
/// Upper bound (exclusive) for logic ids.
pub const MAX_LOGIC_ID: i32 = MAX_CARD_NUM * MAX_DEVICE_NUM_IN_CARD;

pub const MAX_CHIP_NAME_LEN: usize = 32;
pub const IP_ADDR_LEN: usize = 64;
pub const VERSION_LEN: usize = 64;
pub const DIE_ID_NUM: usize = 5;
pub const PRODUCT_TYPE_LEN: usize = 64;
pub const MAX_ERROR_CODE_COUNT: usize = 128;
pub const MAX_PROC_NUM: usize = 32;
pub const MAX_VDEV_NUM: usize = 16;
pub const VDEV_NAME_LEN: usize = 32;

pub const HCCS_MAX_PORT_NUM: usize = 8;
pub const HCCS_RESERVED_NUM: usize = 64;
pub const PCIE_PROF_DATA_NUM: usize = 3;

/// Profiling window used for HCCS and PCIe bandwidth sampling, in milliseconds.
pub const DEFAULT_PROFILING_TIME_MS: i32 = 200;

/// Input selector for `dcmi_get_device_utilization_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum UtilizationType {
    Memory = 1,
    AiCore = 2,
    AiCpu = 3,
    CtrlCpu = 4,
    MemoryBandwidth = 5,
    Hbm = 6,
    HbmBandwidth = 10,
    VectorCore = 12,
}

/// Input selector for `dcmi_get_device_frequency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FrequencyType {
    Ddr = 1,
    CtrlCpu = 2,
    Hbm = 6,
    AiCoreCurrent = 7,
    AiCoreRated = 9,
    VectorCore = 12,
}

/// Selector for `dcmi_get_device_die_v2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DieType {
    NDie = 0,
    VDie = 1,
}

/// Memory kind for `dcmi_get_device_ecc_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EccDeviceType {
    Ddr = 0,
    Sram = 1,
    Hbm = 2,
}

/// Main command ids of `dcmi_get_device_info`.
pub mod main_cmd {
    pub const HCCS: u32 = 16;
    pub const VDEV_MNG: u32 = 52;
}

/// Sub commands of the HCCS main command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HccsSubCommand {
    /// 32-bit counters, available on every driver that knows HCCS.
    StatisticInfo = 1,
    /// 64-bit counters, added in newer drivers.
    StatisticInfoU64 = 3,
}

/// Sub commands of the vNPU management main command.
pub mod vdev_sub_cmd {
    pub const GET_VDEV_RESOURCE: u32 = 0;
    pub const GET_VDEV_ACTIVITY: u32 = 5;
}

/// Port type argument of `dcmi_get_device_ip`.
pub const PORT_TYPE_ROCE: i32 = 1;

/// Device health as reported by `dcmi_get_device_health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    GeneralWarning,
    ImportantWarning,
    EmergencyWarning,
    Unknown,
}

impl HealthState {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => HealthState::Healthy,
            1 => HealthState::GeneralWarning,
            2 => HealthState::ImportantWarning,
            3 => HealthState::EmergencyWarning,
            _ => HealthState::Unknown,
        }
    }

    /// Value exported by `npu_chip_info_health_status`: 1 healthy, 0 otherwise.
    pub fn metric_value(&self) -> i32 {
        match self {
            HealthState::Healthy | HealthState::GeneralWarning => 1,
            _ => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "Healthy",
            HealthState::GeneralWarning => "GeneralWarning",
            HealthState::ImportantWarning => "ImportantWarning",
            HealthState::EmergencyWarning => "EmergencyWarning",
            HealthState::Unknown => "Unknown",
        }
    }
}

/// RoCE network health as reported by `dcmi_get_device_network_health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkHealth {
    Init,
    Success,
    SocketFail,
    ReceiveTimeout,
    Unreachable,
    TimeExceeded,
    Fault,
    ThreadError,
    IpNotSet,
    Unknown,
}

impl NetworkHealth {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 | 7 => NetworkHealth::Init,
            1 => NetworkHealth::Success,
            2 => NetworkHealth::SocketFail,
            3 => NetworkHealth::ReceiveTimeout,
            4 => NetworkHealth::Unreachable,
            5 => NetworkHealth::TimeExceeded,
            6 => NetworkHealth::Fault,
            8 => NetworkHealth::ThreadError,
            9 => NetworkHealth::IpNotSet,
            _ => NetworkHealth::Unknown,
        }
    }

    /// 1 when the detection succeeded, 0 otherwise.
    pub fn metric_value(&self) -> i32 {
        i32::from(*self == NetworkHealth::Success)
    }
}

/// DCMI return code table.
const ERROR_MESSAGES: &[(i32, &str)] = &[
    (-8001, "The input parameter is incorrect"),
    (-8002, "Permission error"),
    (-8003, "The memory interface operation failed"),
    (-8004, "The security function failed to be executed"),
    (-8005, "Internal error"),
    (-8006, "Response timed out"),
    (-8007, "Invalid control command"),
    (-8008, "The device does not support this API in the current mode"),
    (-8009, "DSMI command execution failed"),
    (-8010, "The device is busy"),
    (-8011, "Shared memory interface operation failed"),
    (-8012, "Insufficient memory"),
    (-8013, "The DCMI library is not initialized"),
    (-8014, "Invalid device id"),
    (-8015, "The device is resetting"),
    (-8016, "The device is being upgraded"),
    (-8017, "The device is abnormal"),
    (-8018, "The operation is not allowed on a virtual device"),
    (-8019, "The data buffer is too small"),
    (-8020, "The resource is occupied"),
    (ERR_NOT_SUPPORT, "This API is not supported on the device"),
];

/// Human readable message for a DCMI return code.
pub fn error_message(code: i32) -> &'static str {
    ERROR_MESSAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, msg)| *msg)
        .unwrap_or("unknown error code")
}

pub fn is_not_supported_code(code: i32) -> bool {
    code == ERR_NOT_SUPPORT || code == ERR_NOT_SUPPORT_IN_MODE
}

pub fn is_valid_i32(value: i32) -> bool {
    value != RET_ERROR
}

pub fn is_valid_u32(value: u32) -> bool {
    value != UNRET_ERROR
}

pub fn is_valid_u64(value: u64) -> bool {
    value != u64::MAX
}

pub fn is_valid_f64(value: f64) -> bool {
    value.is_finite() && value != f64::from(RET_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_table() {
        assert_eq!(error_message(-8005), "Internal error");
        assert_eq!(
            error_message(ERR_NOT_SUPPORT),
            "This API is not supported on the device"
        );
        assert_eq!(error_message(-1234), "unknown error code");
    }

    #[test]
    fn test_sentinels() {
        assert!(!is_valid_i32(RET_ERROR));
        assert!(is_valid_i32(0));
        assert!(!is_valid_u32(UNRET_ERROR));
        assert!(is_valid_u32(42));
        assert!(!is_valid_f64(-1.0));
        assert!(!is_valid_f64(f64::NAN));
        assert!(is_valid_f64(12.5));
    }

    #[test]
    fn test_health_mapping() {
        assert_eq!(HealthState::from_code(0), HealthState::Healthy);
        assert_eq!(HealthState::from_code(3), HealthState::EmergencyWarning);
        assert_eq!(HealthState::from_code(77), HealthState::Unknown);
        assert_eq!(HealthState::from_code(1).metric_value(), 1);
        assert_eq!(HealthState::from_code(2).metric_value(), 0);
    }

    #[test]
    fn test_network_health_mapping() {
        assert_eq!(NetworkHealth::from_code(1), NetworkHealth::Success);
        assert_eq!(NetworkHealth::from_code(7), NetworkHealth::Init);
        assert_eq!(NetworkHealth::from_code(1).metric_value(), 1);
        assert_eq!(NetworkHealth::from_code(6).metric_value(), 0);
    }
}
