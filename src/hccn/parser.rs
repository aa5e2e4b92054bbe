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

//! Pure parsers for `hccn_tool` output.
//!
//! The tool prints `key : value` lines with free-form units. Unreadable
//! values become sentinels rather than errors.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static NUMBER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"));

/// Number of optical lanes reported per module.
pub const OPTICAL_LANES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Up,
    Down,
}

impl LinkStatus {
    pub fn metric_value(&self) -> i32 {
        match self {
            LinkStatus::Up => 1,
            LinkStatus::Down => 0,
        }
    }
}

/// RoCE port packet counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub mac_tx_pkt: u64,
    pub mac_rx_pkt: u64,
    pub mac_tx_bad_pkt: u64,
    pub mac_rx_bad_pkt: u64,
    pub mac_tx_pfc_pkt: u64,
    pub mac_rx_pfc_pkt: u64,
    pub roce_tx_pkt: u64,
    pub roce_rx_pkt: u64,
    pub roce_tx_err_pkt: u64,
    pub roce_rx_err_pkt: u64,
}

impl NetworkStats {
    pub fn failed() -> Self {
        Self {
            mac_tx_pkt: u64::MAX,
            mac_rx_pkt: u64::MAX,
            mac_tx_bad_pkt: u64::MAX,
            mac_rx_bad_pkt: u64::MAX,
            mac_tx_pfc_pkt: u64::MAX,
            mac_rx_pfc_pkt: u64::MAX,
            roce_tx_pkt: u64::MAX,
            roce_rx_pkt: u64::MAX,
            roce_tx_err_pkt: u64::MAX,
            roce_rx_err_pkt: u64::MAX,
        }
    }

    /// Labelled counters for export.
    pub fn counters(&self) -> [(&'static str, u64); 10] {
        [
            ("mac_tx_total_pkt_num", self.mac_tx_pkt),
            ("mac_rx_total_pkt_num", self.mac_rx_pkt),
            ("mac_tx_bad_pkt_num", self.mac_tx_bad_pkt),
            ("mac_rx_bad_pkt_num", self.mac_rx_bad_pkt),
            ("mac_tx_pfc_pkt_num", self.mac_tx_pfc_pkt),
            ("mac_rx_pfc_pkt_num", self.mac_rx_pfc_pkt),
            ("roce_tx_all_pkt_num", self.roce_tx_pkt),
            ("roce_rx_all_pkt_num", self.roce_rx_pkt),
            ("roce_tx_err_pkt_num", self.roce_tx_err_pkt),
            ("roce_rx_err_pkt_num", self.roce_rx_err_pkt),
        ]
    }
}

/// Port throughput in MB/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bandwidth {
    pub tx_mb_s: f64,
    pub rx_mb_s: f64,
}

impl Bandwidth {
    pub fn failed() -> Self {
        Self {
            tx_mb_s: -1.0,
            rx_mb_s: -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpticalInfo {
    pub present: bool,
    /// °C
    pub temperature: f64,
    /// mV
    pub voltage: f64,
    /// mW per lane
    pub tx_power: [f64; OPTICAL_LANES],
    pub rx_power: [f64; OPTICAL_LANES],
}

impl OpticalInfo {
    pub fn failed() -> Self {
        Self {
            present: false,
            temperature: -1.0,
            voltage: -1.0,
            tx_power: [-1.0; OPTICAL_LANES],
            rx_power: [-1.0; OPTICAL_LANES],
        }
    }
}

/// Splits `key : value` lines into a map with lowercase, underscore joined keys.
pub fn parse_key_values(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim().to_ascii_lowercase().replace(' ', "_");
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key, value.to_string()))
        })
        .collect()
}

/// First number found in `value`, e.g. `"3287.30 mV"` → 3287.3.
pub fn parse_number(value: &str) -> Option<f64> {
    NUMBER_REGEX
        .find(value)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn parse_link_status(output: &str) -> Result<LinkStatus> {
    let values = parse_key_values(output);
    let status = values
        .get("link_status")
        .ok_or_else(|| Error::Parse(format!("no link status in {output:?}")))?;
    match status.to_ascii_uppercase().as_str() {
        "UP" => Ok(LinkStatus::Up),
        "DOWN" => Ok(LinkStatus::Down),
        other => Err(Error::Parse(format!("unknown link status {other}"))),
    }
}

/// Link speed in Mb/s.
pub fn parse_link_speed(output: &str) -> Result<u64> {
    parse_key_values(output)
        .get("speed")
        .and_then(|v| parse_number(v))
        .map(|v| v as u64)
        .ok_or_else(|| Error::Parse(format!("no speed in {output:?}")))
}

pub fn parse_network_stats(output: &str) -> NetworkStats {
    let values = parse_key_values(output);
    let counter = |key: &str| {
        values
            .get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(u64::MAX)
    };
    NetworkStats {
        mac_tx_pkt: counter("mac_tx_total_pkt_num"),
        mac_rx_pkt: counter("mac_rx_total_pkt_num"),
        mac_tx_bad_pkt: counter("mac_tx_bad_pkt_num"),
        mac_rx_bad_pkt: counter("mac_rx_bad_pkt_num"),
        mac_tx_pfc_pkt: counter("mac_tx_pfc_pkt_num"),
        mac_rx_pfc_pkt: counter("mac_rx_pfc_pkt_num"),
        roce_tx_pkt: counter("roce_tx_all_pkt_num"),
        roce_rx_pkt: counter("roce_rx_all_pkt_num"),
        roce_tx_err_pkt: counter("roce_tx_err_pkt_num"),
        roce_rx_err_pkt: counter("roce_rx_err_pkt_num"),
    }
}

pub fn parse_bandwidth(output: &str) -> Bandwidth {
    let values = parse_key_values(output);
    let rate = |key: &str| values.get(key).and_then(|v| parse_number(v)).unwrap_or(-1.0);
    Bandwidth {
        tx_mb_s: rate("bandwidth_tx"),
        rx_mb_s: rate("bandwidth_rx"),
    }
}

pub fn parse_optical_info(output: &str) -> OpticalInfo {
    let values = parse_key_values(output);
    let number = |key: &str| values.get(key).and_then(|v| parse_number(v)).unwrap_or(-1.0);

    let present = values
        .get("present")
        .map(|v| v.eq_ignore_ascii_case("present"))
        .unwrap_or(false);
    if !present {
        return OpticalInfo::failed();
    }

    let mut info = OpticalInfo {
        present,
        temperature: number("temperature"),
        voltage: number("vcc"),
        tx_power: [-1.0; OPTICAL_LANES],
        rx_power: [-1.0; OPTICAL_LANES],
    };
    for lane in 0..OPTICAL_LANES {
        info.tx_power[lane] = number(&format!("tx_power{lane}"));
        info.rx_power[lane] = number(&format!("rx_power{lane}"));
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_OUTPUT: &str = "packet statistics:
mac_tx_mac_pause_num:0
mac_rx_mac_pause_num:0
mac_tx_pfc_pkt_num:3
mac_rx_pfc_pkt_num:4
mac_tx_total_pkt_num:123456
mac_rx_total_pkt_num:654321
mac_tx_bad_pkt_num:1
mac_rx_bad_pkt_num:2
roce_tx_all_pkt_num:1000
roce_rx_all_pkt_num:2000
roce_rx_err_pkt_num:0
";

    const OPTICAL_OUTPUT: &str = "optical info:
present              : present
Vendor               : HUAWEI
Temperature          : 38 C
Vcc                  : 3287.30 mV
Tx Power0            : 0.9345 mW
Tx Power1            : 0.9251 mW
Tx Power2            : 0.9440 mW
Tx Power3            : 0.9180 mW
Rx Power0            : 0.8012 mW
Rx Power1            : 0.7921 mW
Rx Power2            : 0.8133 mW
Rx Power3            : 0.8055 mW
";

    #[test]
    fn test_parse_link_status() {
        assert_eq!(parse_link_status("link status: UP\n").unwrap(), LinkStatus::Up);
        assert_eq!(
            parse_link_status("link status: DOWN\n").unwrap(),
            LinkStatus::Down
        );
        assert!(parse_link_status("garbage").is_err());
    }

    #[test]
    fn test_parse_link_speed() {
        assert_eq!(parse_link_speed("Speed: 200000 Mb/s\n").unwrap(), 200000);
        assert!(parse_link_speed("Speed:\n").is_err());
    }

    #[test]
    fn test_parse_network_stats() {
        let stats = parse_network_stats(STAT_OUTPUT);
        assert_eq!(stats.mac_tx_pkt, 123456);
        assert_eq!(stats.mac_rx_pkt, 654321);
        assert_eq!(stats.mac_rx_pfc_pkt, 4);
        assert_eq!(stats.roce_rx_pkt, 2000);
        // not printed by this firmware
        assert_eq!(stats.roce_tx_err_pkt, u64::MAX);
    }

    #[test]
    fn test_parse_bandwidth() {
        let bw = parse_bandwidth("Bandwidth TX: 12.50 MB/sec\nBandwidth RX: 0.75 MB/sec\n");
        assert!((bw.tx_mb_s - 12.5).abs() < f64::EPSILON);
        assert!((bw.rx_mb_s - 0.75).abs() < f64::EPSILON);
        assert_eq!(parse_bandwidth(""), Bandwidth::failed());
    }

    #[test]
    fn test_parse_optical_info() {
        let info = parse_optical_info(OPTICAL_OUTPUT);
        assert!(info.present);
        assert!((info.temperature - 38.0).abs() < f64::EPSILON);
        assert!((info.voltage - 3287.3).abs() < 1e-9);
        assert!((info.tx_power[0] - 0.9345).abs() < 1e-9);
        assert!((info.rx_power[3] - 0.8055).abs() < 1e-9);
    }

    #[test]
    fn test_optical_absent() {
        let info = parse_optical_info("optical info:\npresent : not present\n");
        assert!(!info.present);
        assert_eq!(info.temperature, -1.0);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("-3.5 dBm"), Some(-3.5));
        assert_eq!(parse_number("N/A"), None);
    }
}
