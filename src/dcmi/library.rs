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

//! `libdcmi.so` loaded at runtime.
//!
//! Every entry point is resolved once when the library is opened. Symbols
//! missing from older drivers stay `None` and the matching operation reports
//! [`Error::SymbolMissing`], which callers treat as "not supported".

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_char, c_int, c_uint, c_void};
use libloading::Library;
use tracing::{debug, info, warn};

use super::constants::{
    main_cmd, vdev_sub_cmd, DieType, EccDeviceType, FrequencyType, HccsSubCommand,
    UtilizationType, MAX_CARD_NUM, MAX_ERROR_CODE_COUNT, MAX_PROC_NUM,
    PRODUCT_TYPE_LEN, SUCCESS, VERSION_LEN,
};
use super::ffi::{self, *};
use super::types::*;
use super::DcmiDriver;
use crate::error::{Error, Result};

/// Environment variable overriding the library search.
pub const LIBRARY_PATH_ENV: &str = "DCMI_LIBRARY_PATH";

const LIBDCMI_PATHS: &[&str] = &[
    "/usr/local/dcmi/libdcmi.so",
    "/usr/local/Ascend/driver/lib64/driver/libdcmi.so",
    "/usr/local/Ascend/driver/lib64/libdcmi.so",
    "libdcmi.so",
];

struct DcmiApi {
    init: dcmi_init_fn,
    shutdown: Option<dcmi_init_fn>,
    get_card_list: Option<dcmi_get_card_list_fn>,
    get_device_num_in_card: Option<dcmi_get_device_num_in_card_fn>,
    get_device_logic_id: Option<dcmi_get_device_logic_id_fn>,
    get_card_id_device_id_from_logicid: Option<dcmi_get_card_id_device_id_from_logicid_fn>,
    get_device_phyid_from_logicid: Option<dcmi_get_device_phyid_from_logicid_fn>,
    get_device_chip_info: Option<dcmi_get_device_chip_info_fn>,
    get_device_health: Option<dcmi_get_u32_fn>,
    get_device_errorcode_v2: Option<dcmi_get_device_errorcode_v2_fn>,
    get_device_temperature: Option<dcmi_get_i32_fn>,
    get_device_power_info: Option<dcmi_get_i32_fn>,
    get_device_voltage: Option<dcmi_get_u32_fn>,
    get_device_utilization_rate: Option<dcmi_get_typed_u32_fn>,
    get_device_frequency: Option<dcmi_get_typed_u32_fn>,
    get_device_memory_info_v3: Option<dcmi_get_device_memory_info_v3_fn>,
    get_device_memory_info_v2: Option<dcmi_get_device_memory_info_v2_fn>,
    get_device_hbm_info: Option<dcmi_get_device_hbm_info_fn>,
    get_device_ecc_info: Option<dcmi_get_device_ecc_info_fn>,
    get_device_pcie_info_v2: Option<dcmi_get_device_pcie_info_v2_fn>,
    get_device_ip: Option<dcmi_get_device_ip_fn>,
    get_device_network_health: Option<dcmi_get_u32_fn>,
    get_device_info: Option<dcmi_get_device_info_fn>,
    get_hccs_link_bandwidth_info: Option<dcmi_get_hccs_link_bandwidth_info_fn>,
    get_pcie_link_bandwidth_info: Option<dcmi_get_pcie_link_bandwidth_info_fn>,
    get_device_resource_info: Option<dcmi_get_device_resource_info_fn>,
    get_device_die_v2: Option<dcmi_get_device_die_v2_fn>,
    get_product_type: Option<dcmi_get_product_type_fn>,
    get_driver_version: Option<dcmi_get_version_fn>,
    get_dcmi_version: Option<dcmi_get_version_fn>,
}

/// Resolves `dcmi_<field>` from the library into an optional function pointer.
macro_rules! resolve {
    ($lib:expr, $field:ident) => {{
        let symbol = concat!("dcmi_", stringify!($field), "\0");
        match $lib.get(symbol.as_bytes()) {
            Ok(sym) => Some(*sym),
            Err(_) => {
                debug!("DCMI: symbol {} not exported", symbol.trim_end_matches('\0'));
                None
            }
        }
    }};
}

/// Calls `dcmi_<field>` and maps a non-zero return code to [`Error::Dcmi`].
macro_rules! dcmi_call {
    ($self:ident, $field:ident, $($arg:expr),* $(,)?) => {{
        const API: &str = concat!("dcmi_", stringify!($field));
        let func = $self.api.$field.ok_or(Error::SymbolMissing(API))?;
        let ret = unsafe { func($($arg),*) };
        check(API, ret)
    }};
}

fn check(api: &'static str, ret: c_int) -> Result<()> {
    if ret == SUCCESS {
        Ok(())
    } else {
        Err(Error::Dcmi { api, code: ret })
    }
}

/// Handle to a loaded `libdcmi.so`.
pub struct LibDcmi {
    api: DcmiApi,
    path: String,
    initialized: AtomicBool,
    // Must outlive every function pointer in `api`.
    _library: Library,
}

// The DCMI library serializes access internally; the handle only holds
// immutable function pointers.
unsafe impl Send for LibDcmi {}
unsafe impl Sync for LibDcmi {}

impl LibDcmi {
    /// Searches `DCMI_LIBRARY_PATH` and the standard driver directories.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(LIBRARY_PATH_ENV) {
            let path = path.to_string_lossy().to_string();
            debug!("DCMI: using {LIBRARY_PATH_ENV}={path}");
            return Self::load_from(&path);
        }

        let mut last_error = None;
        for path in LIBDCMI_PATHS {
            if path.starts_with('/') && !Path::new(path).exists() {
                continue;
            }
            match Self::load_from(path) {
                Ok(lib) => return Ok(lib),
                Err(e) => {
                    debug!("DCMI: failed to load {path}: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::LibraryLoad(format!("libdcmi.so not found in {LIBDCMI_PATHS:?}"))
        }))
    }

    /// Loads the library from an explicit path.
    pub fn load_from(path: &str) -> Result<Self> {
        if path.contains('/') {
            check_library_file(Path::new(path))?;
        }

        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::LibraryLoad(format!("{path}: {e}")))?;

        let api = unsafe {
            let init: Option<dcmi_init_fn> = resolve!(library, init);
            DcmiApi {
                init: init.ok_or(Error::SymbolMissing("dcmi_init"))?,
                shutdown: resolve!(library, shutdown),
                get_card_list: resolve!(library, get_card_list),
                get_device_num_in_card: resolve!(library, get_device_num_in_card),
                get_device_logic_id: resolve!(library, get_device_logic_id),
                get_card_id_device_id_from_logicid: resolve!(
                    library,
                    get_card_id_device_id_from_logicid
                ),
                get_device_phyid_from_logicid: resolve!(library, get_device_phyid_from_logicid),
                get_device_chip_info: resolve!(library, get_device_chip_info),
                get_device_health: resolve!(library, get_device_health),
                get_device_errorcode_v2: resolve!(library, get_device_errorcode_v2),
                get_device_temperature: resolve!(library, get_device_temperature),
                get_device_power_info: resolve!(library, get_device_power_info),
                get_device_voltage: resolve!(library, get_device_voltage),
                get_device_utilization_rate: resolve!(library, get_device_utilization_rate),
                get_device_frequency: resolve!(library, get_device_frequency),
                get_device_memory_info_v3: resolve!(library, get_device_memory_info_v3),
                get_device_memory_info_v2: resolve!(library, get_device_memory_info_v2),
                get_device_hbm_info: resolve!(library, get_device_hbm_info),
                get_device_ecc_info: resolve!(library, get_device_ecc_info),
                get_device_pcie_info_v2: resolve!(library, get_device_pcie_info_v2),
                get_device_ip: resolve!(library, get_device_ip),
                get_device_network_health: resolve!(library, get_device_network_health),
                get_device_info: resolve!(library, get_device_info),
                get_hccs_link_bandwidth_info: resolve!(library, get_hccs_link_bandwidth_info),
                get_pcie_link_bandwidth_info: resolve!(library, get_pcie_link_bandwidth_info),
                get_device_resource_info: resolve!(library, get_device_resource_info),
                get_device_die_v2: resolve!(library, get_device_die_v2),
                get_product_type: resolve!(library, get_product_type),
                get_driver_version: resolve!(library, get_driver_version),
                get_dcmi_version: resolve!(library, get_dcmi_version),
            }
        };

        info!("Loaded DCMI library from {path}");
        Ok(Self {
            api,
            path: path.to_string(),
            initialized: AtomicBool::new(false),
            _library: library,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn get_version(&self, api: &'static str, func: Option<dcmi_get_version_fn>) -> Result<String> {
        let func = func.ok_or(Error::SymbolMissing(api))?;
        let mut buf = [0 as c_char; VERSION_LEN];
        let ret = unsafe { func(buf.as_mut_ptr(), VERSION_LEN as c_uint) };
        check(api, ret)?;
        Ok(ffi::buf_to_string(&buf))
    }

    fn device_info_raw<T: Copy>(
        &self,
        card_id: i32,
        device_id: i32,
        main: u32,
        sub: u32,
        out: &mut T,
    ) -> Result<()> {
        let mut size = std::mem::size_of::<T>() as c_uint;
        dcmi_call!(
            self,
            get_device_info,
            card_id,
            device_id,
            main,
            sub,
            out as *mut T as *mut c_void,
            &mut size,
        )
    }
}

/// Rejects library files that other users could have replaced.
fn check_library_file(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::LibraryLoad(format!("{}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(Error::LibraryLoad(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o022 != 0 {
            return Err(Error::LibraryLoad(format!(
                "{} is writable by group or others",
                path.display()
            )));
        }
    }

    Ok(())
}

impl DcmiDriver for LibDcmi {
    fn init(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let ret = unsafe { (self.api.init)() };
        check("dcmi_init", ret)?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        match self.api.shutdown {
            Some(func) => check("dcmi_shutdown", unsafe { func() }),
            None => Ok(()),
        }
    }

    fn card_list(&self) -> Result<Vec<i32>> {
        let mut count: c_int = 0;
        let mut cards = [0 as c_int; MAX_CARD_NUM as usize];
        dcmi_call!(
            self,
            get_card_list,
            &mut count,
            cards.as_mut_ptr(),
            MAX_CARD_NUM
        )?;
        if count < 0 || count > MAX_CARD_NUM {
            return Err(Error::InvalidDevice(format!("card count {count}")));
        }
        Ok(cards[..count as usize].to_vec())
    }

    fn device_num_in_card(&self, card_id: i32) -> Result<i32> {
        let mut num: c_int = 0;
        dcmi_call!(self, get_device_num_in_card, card_id, &mut num)?;
        Ok(num)
    }

    fn logic_id(&self, card_id: i32, device_id: i32) -> Result<i32> {
        let mut logic: c_int = 0;
        dcmi_call!(self, get_device_logic_id, &mut logic, card_id, device_id)?;
        Ok(logic)
    }

    fn card_id_device_id(&self, logic_id: i32) -> Result<(i32, i32)> {
        let (mut card, mut device): (c_int, c_int) = (0, 0);
        dcmi_call!(
            self,
            get_card_id_device_id_from_logicid,
            &mut card,
            &mut device,
            logic_id as c_uint
        )?;
        Ok((card, device))
    }

    fn phy_id(&self, logic_id: i32) -> Result<u32> {
        let mut phy: c_uint = 0;
        dcmi_call!(
            self,
            get_device_phyid_from_logicid,
            logic_id as c_uint,
            &mut phy
        )?;
        Ok(phy)
    }

    fn chip_info(&self, card_id: i32, device_id: i32) -> Result<ChipInfo> {
        let mut raw: dcmi_chip_info = unsafe { ffi::zeroed() };
        dcmi_call!(self, get_device_chip_info, card_id, device_id, &mut raw)?;
        Ok(ChipInfo {
            chip_type: ffi::buf_to_string(&raw.chip_type),
            chip_name: ffi::buf_to_string(&raw.chip_name),
            chip_ver: ffi::buf_to_string(&raw.chip_ver),
            aicore_cnt: raw.aicore_cnt,
        })
    }

    fn device_health(&self, card_id: i32, device_id: i32) -> Result<u32> {
        let mut health: c_uint = 0;
        dcmi_call!(self, get_device_health, card_id, device_id, &mut health)?;
        Ok(health)
    }

    fn error_codes(&self, card_id: i32, device_id: i32) -> Result<Vec<u32>> {
        let mut count: c_int = 0;
        let mut codes = [0 as c_uint; MAX_ERROR_CODE_COUNT];
        dcmi_call!(
            self,
            get_device_errorcode_v2,
            card_id,
            device_id,
            &mut count,
            codes.as_mut_ptr(),
            MAX_ERROR_CODE_COUNT as c_uint
        )?;
        let count = (count.max(0) as usize).min(MAX_ERROR_CODE_COUNT);
        Ok(codes[..count].to_vec())
    }

    fn temperature(&self, card_id: i32, device_id: i32) -> Result<i32> {
        let mut temp: c_int = 0;
        dcmi_call!(self, get_device_temperature, card_id, device_id, &mut temp)?;
        Ok(temp)
    }

    fn power(&self, card_id: i32, device_id: i32) -> Result<i32> {
        let mut power: c_int = 0;
        dcmi_call!(self, get_device_power_info, card_id, device_id, &mut power)?;
        Ok(power)
    }

    fn voltage(&self, card_id: i32, device_id: i32) -> Result<u32> {
        let mut voltage: c_uint = 0;
        dcmi_call!(self, get_device_voltage, card_id, device_id, &mut voltage)?;
        Ok(voltage)
    }

    fn utilization_rate(
        &self,
        card_id: i32,
        device_id: i32,
        kind: UtilizationType,
    ) -> Result<u32> {
        let mut rate: c_uint = 0;
        dcmi_call!(
            self,
            get_device_utilization_rate,
            card_id,
            device_id,
            kind as c_int,
            &mut rate
        )?;
        Ok(rate)
    }

    fn frequency(&self, card_id: i32, device_id: i32, kind: FrequencyType) -> Result<u32> {
        let mut freq: c_uint = 0;
        dcmi_call!(
            self,
            get_device_frequency,
            card_id,
            device_id,
            kind as c_int,
            &mut freq
        )?;
        Ok(freq)
    }

    fn memory_info_v3(&self, card_id: i32, device_id: i32) -> Result<MemoryInfo> {
        let mut raw: dcmi_get_memory_info_stru = unsafe { ffi::zeroed() };
        dcmi_call!(self, get_device_memory_info_v3, card_id, device_id, &mut raw)?;
        Ok(MemoryInfo {
            total_mb: raw.memory_size,
            available_mb: raw.memory_available,
            freq: raw.freq,
            hugepage_size: raw.hugepagesize as u64,
            hugepages_total: raw.hugepages_total as u64,
            hugepages_free: raw.hugepages_free as u64,
            utilization: raw.utiliza,
        })
    }

    fn memory_info_v2(&self, card_id: i32, device_id: i32) -> Result<MemoryInfo> {
        let mut raw: dcmi_memory_info = unsafe { ffi::zeroed() };
        dcmi_call!(self, get_device_memory_info_v2, card_id, device_id, &mut raw)?;
        let used = raw.memory_size * u64::from(raw.utiliza.min(100)) / 100;
        Ok(MemoryInfo {
            total_mb: raw.memory_size,
            available_mb: raw.memory_size - used,
            freq: raw.freq,
            hugepage_size: 0,
            hugepages_total: 0,
            hugepages_free: 0,
            utilization: raw.utiliza,
        })
    }

    fn hbm_info(&self, card_id: i32, device_id: i32) -> Result<HbmInfo> {
        let mut raw: dcmi_hbm_info = unsafe { ffi::zeroed() };
        dcmi_call!(self, get_device_hbm_info, card_id, device_id, &mut raw)?;
        Ok(HbmInfo {
            total_mb: raw.memory_size,
            used_mb: raw.memory_usage,
            freq: raw.freq,
            temperature: raw.temp,
            bandwidth_util: raw.bandwith_util_rate,
        })
    }

    fn ecc_info(&self, card_id: i32, device_id: i32, kind: EccDeviceType) -> Result<EccInfo> {
        let mut raw: dcmi_ecc_info = unsafe { ffi::zeroed() };
        dcmi_call!(
            self,
            get_device_ecc_info,
            card_id,
            device_id,
            kind as c_int,
            &mut raw
        )?;
        Ok(EccInfo {
            enabled: raw.enable_flag != 0,
            single_bit_errors: raw.single_bit_error_cnt,
            double_bit_errors: raw.double_bit_error_cnt,
            total_single_bit_errors: raw.total_single_bit_error_cnt,
            total_double_bit_errors: raw.total_double_bit_error_cnt,
            single_bit_isolated_pages: raw.single_bit_isolated_pages_cnt,
            double_bit_isolated_pages: raw.double_bit_isolated_pages_cnt,
        })
    }

    fn pcie_info(&self, card_id: i32, device_id: i32) -> Result<PcieInfo> {
        let mut raw: dcmi_pcie_info_all = unsafe { ffi::zeroed() };
        dcmi_call!(self, get_device_pcie_info_v2, card_id, device_id, &mut raw)?;
        Ok(PcieInfo {
            vendor_id: raw.venderid,
            device_id: raw.deviceid,
            domain: raw.domain,
            bus: raw.bdf_busid,
            device: raw.bdf_deviceid,
            function: raw.bdf_funcid,
        })
    }

    fn device_ip(&self, card_id: i32, device_id: i32, port_id: i32) -> Result<String> {
        let mut ip: dcmi_ip_addr = unsafe { ffi::zeroed() };
        let mut mask: dcmi_ip_addr = unsafe { ffi::zeroed() };
        dcmi_call!(
            self,
            get_device_ip,
            card_id,
            device_id,
            super::constants::PORT_TYPE_ROCE,
            port_id,
            &mut ip,
            &mut mask
        )?;
        let text = if ip.ip_type == DCMI_IPADDR_TYPE_V4 {
            std::net::Ipv4Addr::new(ip.addr[0], ip.addr[1], ip.addr[2], ip.addr[3]).to_string()
        } else {
            std::net::Ipv6Addr::from(ip.addr).to_string()
        };
        Ok(text)
    }

    fn network_health(&self, card_id: i32, device_id: i32) -> Result<u32> {
        let mut health: c_uint = 0;
        dcmi_call!(
            self,
            get_device_network_health,
            card_id,
            device_id,
            &mut health
        )?;
        Ok(health)
    }

    fn hccs_statistic(
        &self,
        card_id: i32,
        device_id: i32,
        sub_command: HccsSubCommand,
    ) -> Result<HccsStatisticInfo> {
        match sub_command {
            HccsSubCommand::StatisticInfoU64 => {
                let mut raw: dcmi_hccs_statistic_info_u64 = unsafe { ffi::zeroed() };
                self.device_info_raw(
                    card_id,
                    device_id,
                    main_cmd::HCCS,
                    sub_command as u32,
                    &mut raw,
                )?;
                Ok(HccsStatisticInfo {
                    tx_cnt: raw.tx_cnt,
                    rx_cnt: raw.rx_cnt,
                    crc_err_cnt: raw.crc_err_cnt,
                    retry_cnt: raw.retry_cnt,
                })
            }
            HccsSubCommand::StatisticInfo => {
                let mut raw: dcmi_hccs_statistic_info = unsafe { ffi::zeroed() };
                self.device_info_raw(
                    card_id,
                    device_id,
                    main_cmd::HCCS,
                    sub_command as u32,
                    &mut raw,
                )?;
                Ok(HccsStatisticInfo {
                    tx_cnt: raw.tx_cnt.map(u64::from),
                    rx_cnt: raw.rx_cnt.map(u64::from),
                    crc_err_cnt: raw.crc_err_cnt.map(u64::from),
                    retry_cnt: raw.retry_cnt.map(u64::from),
                })
            }
        }
    }

    fn hccs_bandwidth(
        &self,
        card_id: i32,
        device_id: i32,
        profiling_ms: i32,
    ) -> Result<HccsBandwidthInfo> {
        let mut raw: dcmi_hccs_bandwidth_info = unsafe { ffi::zeroed() };
        raw.profiling_time = profiling_ms;
        dcmi_call!(
            self,
            get_hccs_link_bandwidth_info,
            card_id,
            device_id,
            &mut raw
        )?;
        Ok(HccsBandwidthInfo {
            profiling_time_ms: raw.profiling_time,
            total_tx: raw.total_txbw,
            total_rx: raw.total_rxbw,
            tx: raw.tx_bandwidth,
            rx: raw.rx_bandwidth,
        })
    }

    fn pcie_bandwidth(
        &self,
        card_id: i32,
        device_id: i32,
        profiling_ms: i32,
    ) -> Result<PcieBandwidth> {
        let mut raw: dcmi_pcie_link_bandwidth_info = unsafe { ffi::zeroed() };
        raw.profiling_time = profiling_ms;
        dcmi_call!(
            self,
            get_pcie_link_bandwidth_info,
            card_id,
            device_id,
            &mut raw
        )?;
        Ok(PcieBandwidth {
            profiling_time_ms: raw.profiling_time,
            tx_posted: BandwidthStat::from_array(raw.tx_p_bw),
            tx_non_posted: BandwidthStat::from_array(raw.tx_np_bw),
            tx_completion: BandwidthStat::from_array(raw.tx_cpl_bw),
            rx_posted: BandwidthStat::from_array(raw.rx_p_bw),
            rx_non_posted: BandwidthStat::from_array(raw.rx_np_bw),
            rx_completion: BandwidthStat::from_array(raw.rx_cpl_bw),
        })
    }

    fn device_processes(&self, card_id: i32, device_id: i32) -> Result<Vec<ProcessMemInfo>> {
        let mut procs = [dcmi_proc_mem_info {
            proc_id: 0,
            proc_mem_usage: 0,
        }; MAX_PROC_NUM];
        let mut count: c_int = MAX_PROC_NUM as c_int;
        dcmi_call!(
            self,
            get_device_resource_info,
            card_id,
            device_id,
            procs.as_mut_ptr(),
            &mut count
        )?;
        let count = (count.max(0) as usize).min(MAX_PROC_NUM);
        Ok(procs[..count]
            .iter()
            .map(|p| ProcessMemInfo {
                pid: p.proc_id,
                mem_usage_mb: (p.proc_mem_usage as u64) / (1024 * 1024),
            })
            .collect())
    }

    fn vdevice_info(&self, card_id: i32, device_id: i32) -> Result<VDevInfo> {
        let mut raw: dcmi_vdev_resource = unsafe { ffi::zeroed() };
        self.device_info_raw(
            card_id,
            device_id,
            main_cmd::VDEV_MNG,
            vdev_sub_cmd::GET_VDEV_RESOURCE,
            &mut raw,
        )?;
        let count = (raw.vdev_num as usize).min(raw.vdev.len());
        Ok(VDevInfo {
            total_aicore: raw.total_aicore,
            unused_aicore: raw.unused_aicore,
            vdevices: raw.vdev[..count]
                .iter()
                .map(|v| VDevice {
                    vdev_id: v.vdev_id,
                    vfg_id: v.vfg_id,
                    status: v.status,
                    container_id: v.container_id,
                    spec_name: ffi::buf_to_string(&v.spec_name),
                    aicore_num: v.aicore_num,
                })
                .collect(),
        })
    }

    fn vdevice_activity(
        &self,
        card_id: i32,
        device_id: i32,
        vdev_id: u32,
    ) -> Result<VDevActivity> {
        let mut raw: dcmi_vdev_activity = unsafe { ffi::zeroed() };
        raw.vdev_id = vdev_id;
        self.device_info_raw(
            card_id,
            device_id,
            main_cmd::VDEV_MNG,
            vdev_sub_cmd::GET_VDEV_ACTIVITY,
            &mut raw,
        )?;
        Ok(VDevActivity {
            vdev_id,
            aicore_util: raw.aicore_util,
            mem_total_mb: raw.mem_total,
            mem_used_mb: raw.mem_used,
        })
    }

    fn die_id(&self, card_id: i32, device_id: i32, kind: DieType) -> Result<String> {
        let mut raw: dcmi_die_id = unsafe { ffi::zeroed() };
        dcmi_call!(
            self,
            get_device_die_v2,
            card_id,
            device_id,
            kind as c_int,
            &mut raw
        )?;
        Ok(raw
            .soc_die
            .iter()
            .map(|part| format!("{part:08X}"))
            .collect::<Vec<_>>()
            .join(""))
    }

    fn product_type(&self, card_id: i32, device_id: i32) -> Result<String> {
        let mut buf = [0 as c_char; PRODUCT_TYPE_LEN];
        dcmi_call!(
            self,
            get_product_type,
            card_id,
            device_id,
            buf.as_mut_ptr(),
            PRODUCT_TYPE_LEN as c_int
        )?;
        Ok(ffi::buf_to_string(&buf))
    }

    fn driver_version(&self) -> Result<String> {
        self.get_version("dcmi_get_driver_version", self.api.get_driver_version)
    }

    fn dcmi_version(&self) -> Result<String> {
        self.get_version("dcmi_get_dcmi_version", self.api.get_dcmi_version)
    }
}

impl Drop for LibDcmi {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("DCMI shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library_fails() {
        let err = LibDcmi::load_from("/nonexistent/libdcmi.so")
            .err()
            .expect("loading a missing file must fail");
        assert!(matches!(err, Error::LibraryLoad(_)));
    }

    #[test]
    fn test_world_writable_library_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libdcmi.so");
        std::fs::write(&path, b"not a library").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).unwrap();

        let err = check_library_file(&path).unwrap_err();
        assert!(err.to_string().contains("writable"));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_library_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
