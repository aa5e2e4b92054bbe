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

//! Polling collectors.
//!
//! Each [`MetricsCollector`] reads one family of device data into the shared
//! [`MetricCache`] on its group's interval, and renders Prometheus or
//! Telegraf output from whatever the cache holds at scrape time.

mod base;
mod chip;
mod container;
mod hccs;
mod memory;
mod network;
mod npu;
mod optical;
mod pcie;
mod process;
mod vnpu;

pub use base::{BaseCollector, ChipStatus};
pub use chip::ChipBase;
pub use container::ContainerCollector;
pub use hccs::{HccsCollector, HccsData};
pub use memory::{MemoryCollector, MemoryData};
pub use network::{NetworkCollector, NetworkData};
pub use npu::NpuCollector;
pub use optical::OpticalCollector;
pub use pcie::PcieCollector;
pub use process::ProcessCollector;
pub use vnpu::{VnpuCollector, VnpuData};

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::metrics::MetricBuilder;
use crate::common::LruCache;
use crate::container::DevicesInfo;
use crate::dcmi::constants::{is_valid_f64, is_valid_i32, is_valid_u32, is_valid_u64};
use crate::device::{DevType, DeviceManager};
use crate::error::Result;
use crate::hccn::HccnTool;
use crate::telegraf::TelegrafPoints;

/// Type-erased polling cache shared by all collectors.
pub type MetricCache = LruCache<String, Arc<dyn Any + Send + Sync>>;

/// Extra labels of one sample on top of the chip labels.
pub type Labels = Vec<(&'static str, String)>;

/// Poll loops. Collectors in one group share an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectGroup {
    /// Chip identity, health, memory, processes, vNPU. Runs every update interval.
    Chip,
    /// RoCE network data. Runs every update interval.
    Network,
    /// Profiling based or expensive reads. Runs every slow interval.
    Slow,
}

/// What a collector needs while polling.
pub struct CollectContext {
    pub manager: Arc<DeviceManager>,
    pub hccn: Option<HccnTool>,
    pub cache: Arc<MetricCache>,
    pub ttl: Duration,
    pub profiling_ms: i32,
}

impl CollectContext {
    pub fn store<T: Any + Send + Sync>(&self, collector: &str, logic_id: i32, value: T) {
        self.cache
            .set(cache_key(collector, logic_id), Arc::new(value), self.ttl);
    }
}

pub fn cache_key(collector: &str, logic_id: i32) -> String {
    format!("{collector}/{logic_id}")
}

/// Cached value of `collector` for `logic_id`, if present and of type `T`.
pub fn load<T: Any + Send + Sync>(
    cache: &MetricCache,
    collector: &str,
    logic_id: i32,
) -> Option<Arc<T>> {
    cache
        .get(&cache_key(collector, logic_id))?
        .downcast::<T>()
        .ok()
}

/// Cached values of `collector` for every chip that has one.
pub fn load_all<'a, T: Any + Send + Sync>(
    cache: &MetricCache,
    collector: &str,
    chips: &'a [ChipBase],
) -> Vec<(&'a ChipBase, Arc<T>)> {
    chips
        .iter()
        .filter_map(|chip| load::<T>(cache, collector, chip.logic_id).map(|data| (chip, data)))
        .collect()
}

pub trait MetricsCollector: Send + Sync {
    fn name(&self) -> &'static str;

    fn group(&self) -> CollectGroup;

    fn is_supported(&self, dev_type: &DevType) -> bool;

    /// Polls the driver for every chip and stores the results. Failures are
    /// stored as sentinels, never returned.
    fn collect_to_cache(&self, ctx: &CollectContext, chips: &[ChipBase]);

    fn export_prometheus(
        &self,
        out: &mut MetricBuilder,
        chips: &[ChipBase],
        cache: &MetricCache,
        containers: &ContainerView,
    );

    fn export_telegraf(&self, points: &mut TelegrafPoints, chips: &[ChipBase], cache: &MetricCache);
}

/// Devices in use by containers, indexed by physical id and vNPU id.
#[derive(Debug, Clone, Default)]
pub struct ContainerView {
    by_device: HashMap<i32, DevicesInfo>,
    by_vdevice: HashMap<i32, DevicesInfo>,
    containers: Vec<DevicesInfo>,
}

impl ContainerView {
    pub fn from_snapshot(snapshot: &HashMap<String, DevicesInfo>) -> Self {
        let mut view = ContainerView::default();
        let mut containers: Vec<_> = snapshot.values().cloned().collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        for info in &containers {
            let index = if info.is_vnpu {
                &mut view.by_vdevice
            } else {
                &mut view.by_device
            };
            for &device in &info.devices {
                index.insert(device, info.clone());
            }
        }
        view.containers = containers;
        view
    }

    pub fn for_chip(&self, chip: &ChipBase) -> Option<&DevicesInfo> {
        self.by_device.get(&(chip.phy_id as i32))
    }

    pub fn for_vdevice(&self, vdev_id: u32) -> Option<&DevicesInfo> {
        self.by_vdevice.get(&(vdev_id as i32))
    }

    pub fn containers(&self) -> &[DevicesInfo] {
        &self.containers
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Identity labels carried by every per-chip sample.
pub fn chip_labels(chip: &ChipBase, container: Option<&DevicesInfo>) -> Labels {
    let (namespace, pod_name, container_name) = container
        .map(|c| {
            (
                c.pod_namespace.clone(),
                c.pod_name.clone(),
                c.container_name.clone(),
            )
        })
        .unwrap_or_default();
    vec![
        ("id", chip.logic_id.to_string()),
        ("model_name", chip.chip.model_name()),
        ("vdie_id", chip.vdie_id.clone()),
        ("pcie_bus_info", chip.pcie_bus_id.clone()),
        ("namespace", namespace),
        ("pod_name", pod_name),
        ("container_name", container_name),
    ]
}

/// Emits one gauge family with a sample per chip whose value is valid.
pub fn gauge<D, T: Display>(
    out: &mut MetricBuilder,
    containers: &ContainerView,
    name: &str,
    help: &str,
    items: &[(&ChipBase, Arc<D>)],
    value: impl Fn(&D) -> Option<T>,
) {
    series(out, containers, name, help, items, |data| {
        value(data).map(|v| (Vec::new(), v)).into_iter().collect()
    });
}

/// Emits one gauge family with any number of samples per chip, each with
/// extra labels (port, lane, pid ...).
pub fn series<D, T: Display>(
    out: &mut MetricBuilder,
    containers: &ContainerView,
    name: &str,
    help: &str,
    items: &[(&ChipBase, Arc<D>)],
    values: impl Fn(&D) -> Vec<(Labels, T)>,
) {
    let mut header = false;
    for (chip, data) in items {
        for (extra, value) in values(data) {
            if !header {
                out.family(name, help, "gauge");
                header = true;
            }
            let mut labels = chip_labels(chip, containers.for_chip(chip));
            labels.extend(extra);
            out.metric(name, &labels, value);
        }
    }
}

/// Unwraps a driver read, logging and substituting `failed` on error.
pub fn read_or<T>(what: &str, chip: &ChipBase, result: Result<T>, failed: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) if e.is_not_supported() => {
            debug!("{what} not supported on NPU {}: {e}", chip.logic_id);
            failed
        }
        Err(e) => {
            warn!("Failed to get {what} of NPU {}: {e}", chip.logic_id);
            failed
        }
    }
}

pub fn valid_i32(value: i32) -> Option<i32> {
    is_valid_i32(value).then_some(value)
}

pub fn valid_u32(value: u32) -> Option<u32> {
    is_valid_u32(value).then_some(value)
}

pub fn valid_u64(value: u64) -> Option<u64> {
    is_valid_u64(value).then_some(value)
}

pub fn valid_f64(value: f64) -> Option<f64> {
    is_valid_f64(value).then_some(value)
}
