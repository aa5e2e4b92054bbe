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

use std::path::PathBuf;
use std::time::Duration;

use crate::container::ContainerRuntime;
use crate::error::{Error, Result};

/// Application configuration constants
pub struct AppConfig;

impl AppConfig {
    // Polling
    pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;
    pub const MIN_UPDATE_INTERVAL_SECS: u64 = 1;
    pub const MAX_UPDATE_INTERVAL_SECS: u64 = 60;
    pub const MAX_CACHE_TIME_SECS: u64 = 3600;
    pub const SLOW_POLL_MULTIPLIER: u32 = 5;
    pub const DEFAULT_PROFILING_TIME_MS: i32 = 200;
    pub const CACHE_CAPACITY: usize = 512;

    // Driver retries
    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 100;

    // External tools
    pub const HCCN_TOOL: &'static str = "hccn_tool";
    pub const COMMAND_TIMEOUT_SECS: u64 = 3;

    // Container runtime
    pub const GRPC_CONNECT_TIMEOUT_SECS: u64 = 3;
    pub const GRPC_REQUEST_TIMEOUT_SECS: u64 = 5;

    // API server
    pub const DEFAULT_PORT: u16 = 8082;
}

/// Container attribution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub runtime: ContainerRuntime,
    pub cri_endpoint: PathBuf,
    pub oci_endpoint: PathBuf,
}

impl ContainerConfig {
    /// Uses the runtime's default sockets unless overridden.
    pub fn new(
        runtime: ContainerRuntime,
        cri_endpoint: Option<PathBuf>,
        oci_endpoint: Option<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            cri_endpoint: cri_endpoint.unwrap_or_else(|| runtime.default_cri_endpoint().into()),
            oci_endpoint: oci_endpoint.unwrap_or_else(|| runtime.default_oci_endpoint().into()),
        }
    }
}

/// Validated settings shared by the collectors and both output modes.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub update_interval: Duration,
    /// How long a polled value stays servable.
    pub cache_time: Duration,
    pub profiling_time_ms: i32,
    pub cache_capacity: usize,
    pub hccn_tool: PathBuf,
    pub container: Option<ContainerConfig>,
    pub collect_processes: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        let update_interval = Duration::from_secs(AppConfig::DEFAULT_UPDATE_INTERVAL_SECS);
        Self {
            update_interval,
            cache_time: update_interval * 13,
            profiling_time_ms: AppConfig::DEFAULT_PROFILING_TIME_MS,
            cache_capacity: AppConfig::CACHE_CAPACITY,
            hccn_tool: PathBuf::from(AppConfig::HCCN_TOOL),
            container: None,
            collect_processes: true,
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        let interval = self.update_interval.as_secs();
        if !(AppConfig::MIN_UPDATE_INTERVAL_SECS..=AppConfig::MAX_UPDATE_INTERVAL_SECS)
            .contains(&interval)
            || self.update_interval.subsec_nanos() != 0
        {
            return Err(Error::Config(format!(
                "update interval must be between {} and {} seconds, got {:?}",
                AppConfig::MIN_UPDATE_INTERVAL_SECS,
                AppConfig::MAX_UPDATE_INTERVAL_SECS,
                self.update_interval
            )));
        }
        if self.cache_time < self.update_interval {
            return Err(Error::Config(format!(
                "cache time {:?} is shorter than the update interval {:?}",
                self.cache_time, self.update_interval
            )));
        }
        if self.cache_time > Duration::from_secs(AppConfig::MAX_CACHE_TIME_SECS) {
            return Err(Error::Config(format!(
                "cache time must not exceed {} seconds",
                AppConfig::MAX_CACHE_TIME_SECS
            )));
        }
        if !(1..=1000).contains(&self.profiling_time_ms) {
            return Err(Error::Config(format!(
                "profiling time must be between 1 and 1000 ms, got {}",
                self.profiling_time_ms
            )));
        }
        Ok(())
    }

    /// Interval of the slow group (HCCS, PCIe bandwidth, optical modules).
    pub fn slow_interval(&self) -> Duration {
        self.update_interval * AppConfig::SLOW_POLL_MULTIPLIER
    }

    /// TTL of entries written by a group polling every `interval`.
    pub fn ttl_for(&self, interval: Duration) -> Duration {
        self.cache_time.max(interval * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ExporterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_interval_bounds() {
        let mut config = ExporterConfig {
            update_interval: Duration::ZERO,
            ..ExporterConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.update_interval = Duration::from_secs(61);
        config.cache_time = Duration::from_secs(120);
        assert!(config.validate().is_err());

        config.update_interval = Duration::from_secs(60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_time_bounds() {
        let mut config = ExporterConfig {
            update_interval: Duration::from_secs(10),
            cache_time: Duration::from_secs(5),
            ..ExporterConfig::default()
        };
        assert!(config.validate().is_err());

        config.cache_time = Duration::from_secs(3601);
        assert!(config.validate().is_err());

        config.cache_time = Duration::from_secs(10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_container_defaults() {
        let config = ContainerConfig::new(ContainerRuntime::Containerd, None, None);
        assert_eq!(
            config.cri_endpoint,
            PathBuf::from(ContainerRuntime::Containerd.default_cri_endpoint())
        );

        let config = ContainerConfig::new(
            ContainerRuntime::Docker,
            Some(PathBuf::from("/tmp/cri.sock")),
            None,
        );
        assert_eq!(config.cri_endpoint, PathBuf::from("/tmp/cri.sock"));
    }
}
