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

//! Container attribution through a fake runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use npu_exporter::collector::NpuCollector;
use npu_exporter::common::ExporterConfig;
use npu_exporter::container::spec::parse_oci_spec;
use npu_exporter::container::{
    ContainerRecord, ContainerSource, DevicesParser, OciSpec, CONTAINER_NAME_LABEL,
    POD_NAMESPACE_LABEL, POD_NAME_LABEL,
};
use npu_exporter::dcmi::MockDcmi;
use npu_exporter::device::{DeviceManager, RetryPolicy};
use npu_exporter::{Error, Result};

struct FakeRuntime {
    records: Vec<ContainerRecord>,
    specs: HashMap<String, String>,
}

#[async_trait]
impl ContainerSource for FakeRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerRecord>> {
        Ok(self.records.clone())
    }

    async fn runtime_spec(&self, id: &str) -> Result<OciSpec> {
        let json = self
            .specs
            .get(id)
            .ok_or_else(|| Error::ContainerRuntime(format!("no spec for {id}")))?;
        parse_oci_spec(json.as_bytes())
    }
}

fn pod(id: &str, namespace: &str, pod_name: &str, container: &str) -> ContainerRecord {
    ContainerRecord {
        id: id.to_string(),
        name: format!("k8s_{container}"),
        labels: HashMap::from([
            (POD_NAMESPACE_LABEL.to_string(), namespace.to_string()),
            (POD_NAME_LABEL.to_string(), pod_name.to_string()),
            (CONTAINER_NAME_LABEL.to_string(), container.to_string()),
        ]),
    }
}

fn fake_runtime() -> FakeRuntime {
    FakeRuntime {
        records: vec![
            pod("c-train", "ml", "trainer-0", "worker"),
            pod("c-infer", "serving", "infer-7", "server"),
            pod("c-plain", "default", "web-1", "nginx"),
            pod("c-gone", "default", "gone-1", "gone"),
        ],
        specs: HashMap::from([
            (
                "c-train".to_string(),
                r#"{"process":{"env":["PATH=/usr/bin","ASCEND_VISIBLE_DEVICES=0-1"]}}"#.to_string(),
            ),
            (
                "c-infer".to_string(),
                r#"{"linux":{"devices":[{"path":"/dev/davinci_manager","type":"c"},{"path":"/dev/davinci3","type":"c","major":236,"minor":3}]}}"#
                    .to_string(),
            ),
            (
                "c-plain".to_string(),
                r#"{"process":{"env":["PATH=/usr/bin"]}}"#.to_string(),
            ),
        ]),
    }
}

#[tokio::test]
async fn test_devices_parser_maps_containers() {
    let parser = DevicesParser::new(Arc::new(fake_runtime()));
    let found = parser.fetch_and_parse().await.unwrap();

    assert_eq!(found.len(), 2);
    let train = &found["c-train"];
    assert_eq!(train.devices, vec![0, 1]);
    assert_eq!(train.pod_namespace, "ml");
    assert_eq!(train.pod_name, "trainer-0");
    assert_eq!(train.container_name, "worker");
    assert!(!train.is_vnpu);

    assert_eq!(found["c-infer"].devices, vec![3]);
    assert!(!found.contains_key("c-plain"));
    assert!(!found.contains_key("c-gone"));

    assert_eq!(parser.snapshot().len(), 2);
}

#[tokio::test]
async fn test_metrics_carry_container_labels() {
    let parser = Arc::new(DevicesParser::new(Arc::new(fake_runtime())));
    let manager =
        DeviceManager::new(Arc::new(MockDcmi::ascend_910b(4)), RetryPolicy::none()).unwrap();
    let npu = NpuCollector::new(
        Arc::new(manager),
        ExporterConfig::default(),
        None,
        Some(parser),
    )
    .unwrap();
    npu.refresh_containers().await;
    npu.collect_once();
    let text = npu.gather_prometheus();

    let info: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("npu_container_info{"))
        .collect();
    assert_eq!(info.len(), 2);
    assert!(info
        .iter()
        .any(|l| l.contains("container_id=\"c-train\"") && l.contains("npu_id=\"0,1\"")));

    let temp_chip1 = text
        .lines()
        .find(|l| l.starts_with("npu_chip_info_temperature{id=\"1\""))
        .unwrap();
    assert!(temp_chip1.contains("namespace=\"ml\""));
    assert!(temp_chip1.contains("pod_name=\"trainer-0\""));

    let temp_chip2 = text
        .lines()
        .find(|l| l.starts_with("npu_chip_info_temperature{id=\"2\""))
        .unwrap();
    assert!(temp_chip2.contains("namespace=\"\""));

    let util = text
        .lines()
        .find(|l| l.starts_with("container_npu_utilization{id=\"3\""))
        .unwrap();
    assert!(util.contains("container_name=\"server\""));
    assert!(util.ends_with(" 13"));
    assert!(text.contains("container_npu_total_memory{id=\"0\""));
}

#[tokio::test]
async fn test_no_containers_means_no_container_families() {
    let parser = Arc::new(DevicesParser::new(Arc::new(FakeRuntime {
        records: Vec::new(),
        specs: HashMap::new(),
    })));
    let manager =
        DeviceManager::new(Arc::new(MockDcmi::ascend_910b(1)), RetryPolicy::none()).unwrap();
    let npu = NpuCollector::new(
        Arc::new(manager),
        ExporterConfig::default(),
        None,
        Some(parser),
    )
    .unwrap();
    npu.refresh_containers().await;
    npu.collect_once();
    assert!(!npu.gather_prometheus().contains("npu_container_info"));
}

#[tokio::test]
async fn test_vnpu_samples_carry_container_labels() {
    let runtime = FakeRuntime {
        records: vec![pod("c-vnpu", "ml", "finetune-2", "trainer")],
        specs: HashMap::from([(
            "c-vnpu".to_string(),
            r#"{"linux":{"devices":[{"path":"/dev/davinci_manager","type":"c"},{"path":"/dev/vdavinci100","type":"c"}]}}"#
                .to_string(),
        )]),
    };
    let parser = Arc::new(DevicesParser::new(Arc::new(runtime)));
    let manager =
        DeviceManager::new(Arc::new(MockDcmi::ascend_910b(2)), RetryPolicy::none()).unwrap();
    let npu = NpuCollector::new(
        Arc::new(manager),
        ExporterConfig::default(),
        None,
        Some(parser.clone()),
    )
    .unwrap();
    npu.refresh_containers().await;

    let found = parser.snapshot();
    assert!(found["c-vnpu"].is_vnpu);
    assert_eq!(found["c-vnpu"].devices, vec![100]);

    npu.collect_once();
    let text = npu.gather_prometheus();

    let vnpu = text
        .lines()
        .find(|l| l.starts_with("vnpu_pod_aicore_utilization{") && l.contains("vnpu_id=\"100\""))
        .unwrap();
    assert!(vnpu.contains("namespace=\"ml\""));
    assert!(vnpu.contains("pod_name=\"finetune-2\""));
    assert!(vnpu.contains("container_name=\"trainer\""));
    assert!(vnpu.ends_with(" 25"));

    // vNPU 100 must not be confused with a physical chip id.
    let temp_chip0 = text
        .lines()
        .find(|l| l.starts_with("npu_chip_info_temperature{id=\"0\""))
        .unwrap();
    assert!(temp_chip0.contains("pod_name=\"\""));
}
