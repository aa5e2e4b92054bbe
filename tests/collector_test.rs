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

//! Collector pipeline tests against the simulated driver.

use std::sync::Arc;

use npu_exporter::collector::NpuCollector;
use npu_exporter::common::ExporterConfig;
use npu_exporter::dcmi::MockDcmi;
use npu_exporter::device::{DeviceManager, RetryPolicy};

fn collector_for(mock: Arc<MockDcmi>) -> NpuCollector {
    let manager = DeviceManager::new(mock, RetryPolicy::none()).expect("mock driver initializes");
    NpuCollector::new(Arc::new(manager), ExporterConfig::default(), None, None)
        .expect("collector starts")
}

fn sample<'a>(text: &'a str, metric: &str, id: i32) -> Option<&'a str> {
    let prefix = format!("{metric}{{id=\"{id}\",");
    text.lines()
        .find(|line| line.starts_with(&prefix))
        .and_then(|line| line.rsplit(' ').next())
}

#[test]
fn test_prometheus_chip_metrics() {
    let npu = collector_for(Arc::new(MockDcmi::ascend_910b(2)));
    npu.collect_once();
    let text = npu.gather_prometheus();

    assert!(text.contains("machine_npu_nums 2\n"));
    assert!(text.contains("driverVersion=\"23.0.3\""));
    assert_eq!(sample(&text, "npu_chip_info_temperature", 0), Some("40"));
    assert_eq!(sample(&text, "npu_chip_info_temperature", 1), Some("41"));
    assert_eq!(sample(&text, "npu_chip_info_power", 0), Some("95"));
    assert_eq!(sample(&text, "npu_chip_info_utilization", 1), Some("11"));
    assert_eq!(sample(&text, "npu_chip_info_hbm_total_memory", 0), Some("65536"));
    assert!(text.contains("model_name=\"Ascend910B3\""));
}

#[test]
fn test_each_family_has_one_header() {
    let npu = collector_for(Arc::new(MockDcmi::ascend_910b(4)));
    npu.collect_once();
    let text = npu.gather_prometheus();

    assert_eq!(
        text.matches("# TYPE npu_chip_info_temperature gauge\n").count(),
        1
    );
    assert_eq!(
        text.lines()
            .filter(|l| l.starts_with("npu_chip_info_temperature{"))
            .count(),
        4
    );

    // samples of one family are contiguous
    let lines: Vec<&str> = text.lines().collect();
    let first = lines
        .iter()
        .position(|l| l.starts_with("npu_chip_info_temperature{"))
        .unwrap();
    assert!(lines[first..first + 4]
        .iter()
        .all(|l| l.starts_with("npu_chip_info_temperature{")));
}

#[test]
fn test_failed_reads_are_not_exported() {
    let mock = Arc::new(MockDcmi::ascend_910b(2));
    mock.fail("dcmi_get_device_temperature");
    let npu = collector_for(mock.clone());
    npu.collect_once();
    let text = npu.gather_prometheus();

    assert!(!text.contains("npu_chip_info_temperature"));
    assert!(text.contains("npu_chip_info_power"));

    mock.clear_failures();
    npu.collect_once();
    let text = npu.gather_prometheus();
    assert_eq!(sample(&text, "npu_chip_info_temperature", 0), Some("40"));
}

#[test]
fn test_unsupported_reads_are_not_retried() {
    let mock = Arc::new(MockDcmi::ascend_910b(1));
    mock.unsupport("dcmi_get_device_health");
    let manager = DeviceManager::new(mock.clone(), RetryPolicy::default()).unwrap();
    let npu = NpuCollector::new(Arc::new(manager), ExporterConfig::default(), None, None).unwrap();
    npu.collect_once();

    assert_eq!(mock.call_count("dcmi_get_device_health"), 1);
    let text = npu.gather_prometheus();
    assert!(!text.contains("npu_chip_info_health_status"));
    assert!(text.contains("npu_chip_info_temperature"));
}

#[test]
fn test_310p_uses_ddr_metrics() {
    let npu = collector_for(Arc::new(MockDcmi::new(1, 2, "310P3")));
    npu.collect_once();
    let text = npu.gather_prometheus();

    assert!(text.contains("npu_chip_info_total_memory{"));
    assert!(!text.contains("npu_chip_info_hbm_total_memory"));
    assert!(!text.contains("hccs"));
}

#[test]
fn test_vnpu_and_process_metrics() {
    let npu = collector_for(Arc::new(MockDcmi::ascend_910b(2)));
    npu.collect_once();
    let text = npu.gather_prometheus();

    let vnpu = text
        .lines()
        .find(|l| l.starts_with("vnpu_pod_aicore_utilization{"))
        .expect("vnpu sample");
    assert!(vnpu.contains("vnpu_id=\"100\""));
    assert!(vnpu.contains("vnpu_template=\"vir04\""));
    assert!(vnpu.ends_with(" 25"));

    let process = text
        .lines()
        .find(|l| l.starts_with("npu_chip_info_process_info{"))
        .expect("process sample");
    assert!(process.contains("process_id=\"4242\""));
    assert!(process.ends_with(" 3072"));
}

#[test]
fn test_telegraf_lines() {
    let npu = collector_for(Arc::new(MockDcmi::ascend_910b(2)));
    npu.collect_once();
    let lines = npu.gather_telegraf(1_700_000_000_000_000_000);

    let chip0 = lines
        .iter()
        .find(|l| l.starts_with("npu,id=0,"))
        .expect("chip 0 point");
    assert!(chip0.contains("npu_chip_info_temperature=40i"));
    assert!(chip0.ends_with(" 1700000000000000000"));

    assert!(lines.iter().any(|l| l.starts_with("npu,id=1,")));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("npu_machine") && l.contains("machine_npu_nums=2")));
}

#[test]
fn test_chip_list_survives_enumeration_failure() {
    let mock = Arc::new(MockDcmi::ascend_910b(2));
    let npu = collector_for(mock.clone());
    mock.fail("dcmi_get_card_list");
    assert!(npu.refresh_chips().is_err());
    assert_eq!(npu.chips().len(), 2);
}
