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

//! Top-level collector: owns the chip list, the metric cache and the poll
//! loops of every supported collector.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::api::metrics::MetricBuilder;
use crate::collector::{
    BaseCollector, ChipBase, CollectContext, CollectGroup, ContainerCollector, ContainerView,
    HccsCollector, MemoryCollector, MetricCache, MetricsCollector, NetworkCollector,
    OpticalCollector, PcieCollector, ProcessCollector, VnpuCollector,
};
use crate::common::{read_lock, write_lock, ExporterConfig};
use crate::container::DevicesParser;
use crate::device::DeviceManager;
use crate::error::Result;
use crate::hccn::HccnTool;
use crate::telegraf::TelegrafPoints;

const GROUPS: [CollectGroup; 3] = [CollectGroup::Chip, CollectGroup::Network, CollectGroup::Slow];

pub struct NpuCollector {
    manager: Arc<DeviceManager>,
    hccn: Option<HccnTool>,
    devices: Option<Arc<DevicesParser>>,
    cache: Arc<MetricCache>,
    chips: RwLock<Arc<Vec<ChipBase>>>,
    collectors: Vec<Box<dyn MetricsCollector>>,
    config: ExporterConfig,
}

impl NpuCollector {
    /// Selects the collectors the detected chip supports and loads the chip
    /// list once.
    pub fn new(
        manager: Arc<DeviceManager>,
        config: ExporterConfig,
        hccn: Option<HccnTool>,
        devices: Option<Arc<DevicesParser>>,
    ) -> Result<Self> {
        config.validate()?;

        let dev_type = manager.dev_type();
        let all: Vec<Box<dyn MetricsCollector>> = vec![
            Box::new(BaseCollector),
            Box::new(MemoryCollector),
            Box::new(NetworkCollector),
            Box::new(OpticalCollector),
            Box::new(HccsCollector),
            Box::new(PcieCollector),
            Box::new(VnpuCollector),
            Box::new(ProcessCollector),
            Box::new(ContainerCollector),
        ];
        let collectors: Vec<_> = all
            .into_iter()
            .filter(|c| c.is_supported(&dev_type))
            .filter(|c| config.collect_processes || c.name() != super::process::NAME)
            .filter(|c| devices.is_some() || c.name() != super::container::NAME)
            .collect();
        info!(
            "Collectors for {dev_type}: {}",
            collectors
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let collector = Self {
            manager,
            hccn,
            devices,
            cache: Arc::new(MetricCache::new(config.cache_capacity)),
            chips: RwLock::new(Arc::new(Vec::new())),
            collectors,
            config,
        };
        collector.refresh_chips()?;
        Ok(collector)
    }

    pub fn manager(&self) -> &Arc<DeviceManager> {
        &self.manager
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Chips as of the last chip tick.
    pub fn chips(&self) -> Arc<Vec<ChipBase>> {
        read_lock(&self.chips).clone()
    }

    /// Re-enumerates devices. Chips whose identity cannot be read are
    /// skipped; the previous list is kept if enumeration fails.
    pub fn refresh_chips(&self) -> Result<usize> {
        let (_, logic_ids) = self.manager.get_device_list()?;
        let mut chips = Vec::with_capacity(logic_ids.len());
        for logic_id in logic_ids {
            match ChipBase::load(&self.manager, logic_id) {
                Ok(chip) => chips.push(chip),
                Err(e) => warn!("Skipping NPU {logic_id}: {e}"),
            }
        }
        let count = chips.len();
        *write_lock(&self.chips) = Arc::new(chips);
        Ok(count)
    }

    pub fn interval_of(&self, group: CollectGroup) -> Duration {
        match group {
            CollectGroup::Chip | CollectGroup::Network => self.config.update_interval,
            CollectGroup::Slow => self.config.slow_interval(),
        }
    }

    fn context(&self, group: CollectGroup) -> CollectContext {
        CollectContext {
            manager: Arc::clone(&self.manager),
            hccn: self.hccn.clone(),
            cache: Arc::clone(&self.cache),
            ttl: self.config.ttl_for(self.interval_of(group)),
            profiling_ms: self.config.profiling_time_ms,
        }
    }

    fn has_group(&self, group: CollectGroup) -> bool {
        self.collectors.iter().any(|c| c.group() == group)
    }

    /// Runs every collector of `group` once. Blocks on driver calls.
    pub fn collect_group(&self, group: CollectGroup) {
        if group == CollectGroup::Chip {
            if let Err(e) = self.refresh_chips() {
                warn!("Failed to refresh the NPU list: {e}");
            }
        }
        let chips = self.chips();
        let ctx = self.context(group);
        for collector in self.collectors.iter().filter(|c| c.group() == group) {
            collector.collect_to_cache(&ctx, &chips);
        }
        debug!("Collected {group:?} metrics of {} NPU(s)", chips.len());
    }

    /// Refreshes every group in order.
    pub fn collect_once(&self) {
        for group in GROUPS {
            self.collect_group(group);
        }
    }

    /// Re-reads the container mapping. No-op without a container runtime.
    pub async fn refresh_containers(&self) {
        if let Some(devices) = &self.devices {
            if let Err(e) = devices.fetch_and_parse().await {
                warn!("Failed to refresh container info: {e}");
            }
        }
    }

    pub fn container_view(&self) -> ContainerView {
        self.devices
            .as_ref()
            .map(|d| ContainerView::from_snapshot(&d.snapshot()))
            .unwrap_or_default()
    }

    /// Spawns one poll loop per collector group, plus the container refresh
    /// loop. Every loop exits once `shutdown` flips to true or its sender
    /// is dropped.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for group in GROUPS.into_iter().filter(|g| self.has_group(*g)) {
            let this = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            let period = self.interval_of(group);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                            continue;
                        }
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                    let worker = Arc::clone(&this);
                    if let Err(e) =
                        tokio::task::spawn_blocking(move || worker.collect_group(group)).await
                    {
                        error!("{group:?} collection panicked: {e}");
                    }
                }
                debug!("{group:?} poll loop stopped");
            }));
        }

        if self.devices.is_some() {
            let this = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            let period = self.config.update_interval;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => this.refresh_containers().await,
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                debug!("Container poll loop stopped");
            }));
        }

        handles
    }

    /// Prometheus text exposition of everything currently cached.
    pub fn gather_prometheus(&self) -> String {
        let chips = self.chips();
        let containers = self.container_view();
        let mut out = MetricBuilder::new();
        for collector in &self.collectors {
            collector.export_prometheus(&mut out, &chips, &self.cache, &containers);
        }
        out.build()
    }

    /// Line protocol of everything currently cached, stamped `timestamp_ns`.
    pub fn gather_telegraf(&self, timestamp_ns: i64) -> Vec<String> {
        let chips = self.chips();
        let mut points = TelegrafPoints::new();
        for collector in &self.collectors {
            collector.export_telegraf(&mut points, &chips, &self.cache);
        }
        points.into_lines(timestamp_ns)
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.manager.shutdown() {
            warn!("DCMI shutdown failed: {e}");
        }
    }
}
