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

//! `#[repr(C)]` mirrors of `dcmi_interface_api.h` and the function pointer
//! types resolved from `libdcmi.so`.
//!
//! Layouts follow the driver header shipped with CANN 7.x / driver 23.x.
//! Only the fields the exporter reads are named; trailing reserved space is
//! kept so the driver never writes past the buffer we hand it.

#![allow(non_camel_case_types)]

use libc::{c_char, c_double, c_int, c_uchar, c_uint, c_ulong, c_ulonglong, c_void};

use super::constants::{
    HCCS_MAX_PORT_NUM, HCCS_RESERVED_NUM, MAX_CHIP_NAME_LEN, MAX_VDEV_NUM, PCIE_PROF_DATA_NUM,
    VDEV_NAME_LEN,
};

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_chip_info {
    pub chip_type: [c_uchar; MAX_CHIP_NAME_LEN],
    pub chip_name: [c_uchar; MAX_CHIP_NAME_LEN],
    pub chip_ver: [c_uchar; MAX_CHIP_NAME_LEN],
    pub aicore_cnt: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_get_memory_info_stru {
    pub memory_size: c_ulonglong,
    pub memory_available: c_ulonglong,
    pub freq: c_uint,
    pub hugepagesize: c_ulong,
    pub hugepages_total: c_ulong,
    pub hugepages_free: c_ulong,
    pub utiliza: c_uint,
    pub reserve: [c_uchar; 60],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_memory_info {
    pub memory_size: c_ulonglong,
    pub freq: c_uint,
    pub utiliza: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_hbm_info {
    pub memory_size: c_ulonglong,
    pub freq: c_uint,
    pub memory_usage: c_ulonglong,
    pub temp: c_int,
    pub bandwith_util_rate: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_ecc_info {
    pub enable_flag: c_int,
    pub single_bit_error_cnt: c_uint,
    pub double_bit_error_cnt: c_uint,
    pub total_single_bit_error_cnt: c_uint,
    pub total_double_bit_error_cnt: c_uint,
    pub single_bit_isolated_pages_cnt: c_uint,
    pub double_bit_isolated_pages_cnt: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_pcie_info_all {
    pub venderid: c_uint,
    pub subvenderid: c_uint,
    pub deviceid: c_uint,
    pub subdeviceid: c_uint,
    pub domain: c_int,
    pub bdf_busid: c_uint,
    pub bdf_deviceid: c_uint,
    pub bdf_funcid: c_uint,
    pub reserve: [c_uchar; 32],
}

/// `struct dcmi_ip_addr`: a v4/v6 union followed by the address family.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_ip_addr {
    pub addr: [c_uchar; 16],
    pub ip_type: c_int,
}

pub const DCMI_IPADDR_TYPE_V4: c_int = 0;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_hccs_statistic_info {
    pub tx_cnt: [c_uint; HCCS_MAX_PORT_NUM],
    pub rx_cnt: [c_uint; HCCS_MAX_PORT_NUM],
    pub crc_err_cnt: [c_uint; HCCS_MAX_PORT_NUM],
    pub retry_cnt: [c_uint; HCCS_MAX_PORT_NUM],
    pub reserve_field_cnt: [c_uint; HCCS_RESERVED_NUM],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_hccs_statistic_info_u64 {
    pub tx_cnt: [c_ulonglong; HCCS_MAX_PORT_NUM],
    pub rx_cnt: [c_ulonglong; HCCS_MAX_PORT_NUM],
    pub crc_err_cnt: [c_ulonglong; HCCS_MAX_PORT_NUM],
    pub retry_cnt: [c_ulonglong; HCCS_MAX_PORT_NUM],
    pub reserve_field_cnt: [c_ulonglong; HCCS_RESERVED_NUM],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_hccs_bandwidth_info {
    pub profiling_time: c_int,
    pub total_txbw: c_double,
    pub total_rxbw: c_double,
    pub tx_bandwidth: [c_double; HCCS_MAX_PORT_NUM],
    pub rx_bandwidth: [c_double; HCCS_MAX_PORT_NUM],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_pcie_link_bandwidth_info {
    pub profiling_time: c_int,
    pub tx_p_bw: [c_uint; PCIE_PROF_DATA_NUM],
    pub tx_np_bw: [c_uint; PCIE_PROF_DATA_NUM],
    pub tx_cpl_bw: [c_uint; PCIE_PROF_DATA_NUM],
    pub tx_np_lantency: [c_uint; PCIE_PROF_DATA_NUM],
    pub tx_cpl_lantency: [c_uint; PCIE_PROF_DATA_NUM],
    pub rx_p_bw: [c_uint; PCIE_PROF_DATA_NUM],
    pub rx_np_bw: [c_uint; PCIE_PROF_DATA_NUM],
    pub rx_cpl_bw: [c_uint; PCIE_PROF_DATA_NUM],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_proc_mem_info {
    pub proc_id: c_int,
    /// Bytes.
    pub proc_mem_usage: c_ulong,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_die_id {
    pub soc_die: [c_uint; super::constants::DIE_ID_NUM],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_vdev_entry {
    pub vdev_id: c_uint,
    pub vfg_id: c_uint,
    pub status: c_uint,
    pub container_id: c_ulonglong,
    pub spec_name: [c_char; VDEV_NAME_LEN],
    pub aicore_num: c_uint,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_vdev_resource {
    pub vdev_num: c_uint,
    pub total_aicore: c_uint,
    pub unused_aicore: c_uint,
    pub vdev: [dcmi_vdev_entry; MAX_VDEV_NUM],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct dcmi_vdev_activity {
    pub vdev_id: c_uint,
    pub aicore_util: c_uint,
    pub mem_total: c_ulonglong,
    pub mem_used: c_ulonglong,
}

// --- Function pointer types ---

pub type dcmi_init_fn = unsafe extern "C" fn() -> c_int;
pub type dcmi_get_card_list_fn = unsafe extern "C" fn(*mut c_int, *mut c_int, c_int) -> c_int;
pub type dcmi_get_device_num_in_card_fn = unsafe extern "C" fn(c_int, *mut c_int) -> c_int;
pub type dcmi_get_device_logic_id_fn = unsafe extern "C" fn(*mut c_int, c_int, c_int) -> c_int;
pub type dcmi_get_card_id_device_id_from_logicid_fn =
    unsafe extern "C" fn(*mut c_int, *mut c_int, c_uint) -> c_int;
pub type dcmi_get_device_phyid_from_logicid_fn = unsafe extern "C" fn(c_uint, *mut c_uint) -> c_int;

pub type dcmi_get_device_chip_info_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_chip_info) -> c_int;
pub type dcmi_get_u32_fn = unsafe extern "C" fn(c_int, c_int, *mut c_uint) -> c_int;
pub type dcmi_get_i32_fn = unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int;
pub type dcmi_get_device_errorcode_v2_fn =
    unsafe extern "C" fn(c_int, c_int, *mut c_int, *mut c_uint, c_uint) -> c_int;
pub type dcmi_get_typed_u32_fn = unsafe extern "C" fn(c_int, c_int, c_int, *mut c_uint) -> c_int;

pub type dcmi_get_device_memory_info_v3_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_get_memory_info_stru) -> c_int;
pub type dcmi_get_device_memory_info_v2_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_memory_info) -> c_int;
pub type dcmi_get_device_hbm_info_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_hbm_info) -> c_int;
pub type dcmi_get_device_ecc_info_fn =
    unsafe extern "C" fn(c_int, c_int, c_int, *mut dcmi_ecc_info) -> c_int;
pub type dcmi_get_device_pcie_info_v2_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_pcie_info_all) -> c_int;

pub type dcmi_get_device_ip_fn = unsafe extern "C" fn(
    c_int,
    c_int,
    c_int,
    c_int,
    *mut dcmi_ip_addr,
    *mut dcmi_ip_addr,
) -> c_int;

pub type dcmi_get_device_info_fn =
    unsafe extern "C" fn(c_int, c_int, c_uint, c_uint, *mut c_void, *mut c_uint) -> c_int;
pub type dcmi_get_hccs_link_bandwidth_info_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_hccs_bandwidth_info) -> c_int;
pub type dcmi_get_pcie_link_bandwidth_info_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_pcie_link_bandwidth_info) -> c_int;
pub type dcmi_get_device_resource_info_fn =
    unsafe extern "C" fn(c_int, c_int, *mut dcmi_proc_mem_info, *mut c_int) -> c_int;
pub type dcmi_get_device_die_v2_fn =
    unsafe extern "C" fn(c_int, c_int, c_int, *mut dcmi_die_id) -> c_int;
pub type dcmi_get_product_type_fn = unsafe extern "C" fn(c_int, c_int, *mut c_char, c_int) -> c_int;
pub type dcmi_get_version_fn = unsafe extern "C" fn(*mut c_char, c_uint) -> c_int;

/// Converts a NUL padded C buffer into a `String`, stopping at the first NUL.
pub fn buf_to_string<T: Copy + Into<i16>>(buf: &[T]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .map(|&b| (b.into() & 0xff) as u8)
        .take_while(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// A zeroed value of a plain C struct.
///
/// # Safety
/// `T` must be a `#[repr(C)]` type for which the all-zero bit pattern is valid.
pub unsafe fn zeroed<T>() -> T {
    std::mem::zeroed()
}
