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

//! RoCE and optical metrics through a scripted hccn_tool.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use npu_exporter::collector::NpuCollector;
use npu_exporter::common::ExporterConfig;
use npu_exporter::dcmi::MockDcmi;
use npu_exporter::device::{DeviceManager, RetryPolicy};
use npu_exporter::hccn::{HccnTool, LinkStatus};

const FAKE_TOOL: &str = r#"#!/bin/sh
case "$3" in
  -link) echo "link status: UP" ;;
  -speed) echo "Speed: 200000 Mb/s" ;;
  -bandwidth) printf 'Bandwidth TX: 12.50 MB/sec\nBandwidth RX: 0.75 MB/sec\n' ;;
  -stat) printf 'packet statistics:\nmac_tx_total_pkt_num:123456\nmac_rx_total_pkt_num:654321\n' ;;
  -optical) printf 'optical info:\npresent : present\nTemperature : 38 C\nVcc : 3287.30 mV\nTx Power0 : 0.9345 mW\n' ;;
  *) echo "unknown option $3" >&2; exit 1 ;;
esac
"#;

fn install_tool(dir: &Path) -> HccnTool {
    let path = dir.join("hccn_tool");
    std::fs::write(&path, FAKE_TOOL).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    HccnTool::locate(&path).expect("tool installed")
}

fn value_of<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines()
        .find(|l| l.starts_with(prefix))
        .and_then(|l| l.rsplit(' ').next())
}

#[test]
fn test_network_and_optical_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let tool = install_tool(dir.path());
    assert_eq!(tool.link_status(0).unwrap(), LinkStatus::Up);

    let manager =
        DeviceManager::new(Arc::new(MockDcmi::ascend_910b(1)), RetryPolicy::none()).unwrap();
    let npu = NpuCollector::new(
        Arc::new(manager),
        ExporterConfig::default(),
        Some(tool),
        None,
    )
    .unwrap();
    npu.collect_once();
    let text = npu.gather_prometheus();

    assert_eq!(value_of(&text, "npu_chip_info_link_status{id=\"0\""), Some("1"));
    assert_eq!(value_of(&text, "npu_chip_link_speed{id=\"0\""), Some("200000"));
    assert_eq!(value_of(&text, "npu_chip_info_bandwidth_tx{id=\"0\""), Some("12.5"));
    assert_eq!(
        value_of(&text, "npu_chip_mac_tx_total_pkt_num{id=\"0\""),
        Some("123456")
    );
    // not printed by the tool
    assert!(!text.contains("npu_chip_roce_rx_err_pkt_num"));

    assert_eq!(value_of(&text, "npu_chip_optical_state{id=\"0\""), Some("1"));
    assert_eq!(value_of(&text, "npu_chip_optical_temp{id=\"0\""), Some("38"));
    let lane0 = text
        .lines()
        .find(|l| l.starts_with("npu_chip_optical_tx_power{") && l.contains("lane=\"0\""))
        .expect("lane 0 sample");
    assert!(lane0.ends_with(" 0.9345"));
}
