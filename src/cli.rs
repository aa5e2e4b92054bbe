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

use clap::{Args, Parser, Subcommand};

use crate::common::config::ContainerConfig;
use crate::common::{AppConfig, ExporterConfig};
use crate::container::ContainerRuntime;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve Prometheus metrics over HTTP. (default)
    Serve(ServeArgs),
    /// Write InfluxDB line protocol to stdout for Telegraf.
    Telegraf(TelegrafArgs),
    /// Print the detected NPUs as JSON and exit.
    List(CommonArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Seconds between device polls (1-60).
    #[arg(short = 'i', long, default_value_t = AppConfig::DEFAULT_UPDATE_INTERVAL_SECS)]
    pub update_interval: u64,
    /// Seconds a polled value stays valid. Defaults to 13 update intervals.
    #[arg(long)]
    pub cache_time: Option<u64>,
    /// Sampling window in milliseconds for HCCS and PCIe bandwidth.
    #[arg(long, default_value_t = AppConfig::DEFAULT_PROFILING_TIME_MS)]
    pub profiling_time: i32,
    /// Path or name of the hccn_tool binary.
    #[arg(long, default_value = AppConfig::HCCN_TOOL)]
    pub hccn_tool: PathBuf,
    /// Container runtime to attribute devices to. Omit to disable.
    #[arg(long, value_enum)]
    pub container_mode: Option<ContainerRuntime>,
    /// CRI socket, overriding the runtime's default.
    #[arg(long)]
    pub cri_endpoint: Option<PathBuf>,
    /// containerd socket, overriding the runtime's default.
    #[arg(long)]
    pub oci_endpoint: Option<PathBuf>,
    /// Do not collect per-process memory usage.
    #[arg(long)]
    pub no_processes: bool,
    /// Path of libdcmi.so. Searched in the driver directories by default.
    #[arg(long)]
    pub dcmi_library: Option<String>,
    /// Simulate N NPUs instead of loading the driver.
    #[arg(long, value_name = "N")]
    pub mock_devices: Option<usize>,
    /// Chip name reported by simulated NPUs.
    #[arg(long, default_value = "910B3", requires = "mock_devices")]
    pub mock_chip: String,
}

impl CommonArgs {
    pub fn to_config(&self) -> Result<ExporterConfig> {
        let update_interval = Duration::from_secs(self.update_interval);
        let config = ExporterConfig {
            update_interval,
            cache_time: self
                .cache_time
                .map(Duration::from_secs)
                .unwrap_or(update_interval * 13),
            profiling_time_ms: self.profiling_time,
            cache_capacity: AppConfig::CACHE_CAPACITY,
            hccn_tool: self.hccn_tool.clone(),
            container: self.container_mode.map(|runtime| {
                ContainerConfig::new(
                    runtime,
                    self.cri_endpoint.clone(),
                    self.oci_endpoint.clone(),
                )
            }),
            collect_processes: !self.no_processes,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// The port to listen on. Use 0 to disable the TCP listener.
    #[arg(short, long, default_value_t = AppConfig::DEFAULT_PORT)]
    pub port: u16,
    /// Unix domain socket path.
    /// When specified without a value, uses /var/run/npu-exporter.sock
    /// (/tmp/npu-exporter.sock if /var/run is not writable).
    #[cfg(unix)]
    #[arg(short, long, num_args = 0..=1, default_missing_value = "")]
    pub socket: Option<String>,
}

impl ServeArgs {
    pub fn listen_config(&self) -> crate::api::ListenConfig {
        crate::api::ListenConfig {
            port: self.port,
            #[cfg(unix)]
            socket: self.socket.as_ref().map(|s| {
                if s.is_empty() {
                    crate::api::server::default_socket_path()
                } else {
                    PathBuf::from(s)
                }
            }),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct TelegrafArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Emit a single batch and exit (Telegraf `exec` input).
    #[arg(long)]
    pub once: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["npu-exporter"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command.unwrap()
    }

    #[test]
    fn test_serve_defaults() {
        let Commands::Serve(args) = parse(&["serve"]) else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 8082);
        let config = args.common.to_config().unwrap();
        assert_eq!(config.update_interval, Duration::from_secs(5));
        assert_eq!(config.cache_time, Duration::from_secs(65));
        assert!(config.container.is_none());
        assert!(config.collect_processes);
    }

    #[test]
    fn test_serve_args_parse_alone() {
        let args = ServeArgs::parse_from(["serve"]);
        assert_eq!(args.port, AppConfig::DEFAULT_PORT);
        assert_eq!(args.common.hccn_tool, PathBuf::from("hccn_tool"));
    }

    #[test]
    fn test_container_endpoints() {
        let Commands::Serve(args) = parse(&[
            "serve",
            "--container-mode",
            "containerd",
            "--cri-endpoint",
            "/tmp/cri.sock",
        ]) else {
            panic!("expected serve");
        };
        let container = args.common.to_config().unwrap().container.unwrap();
        assert_eq!(container.runtime, ContainerRuntime::Containerd);
        assert_eq!(container.cri_endpoint, PathBuf::from("/tmp/cri.sock"));
        assert_eq!(
            container.oci_endpoint,
            PathBuf::from("/run/containerd/containerd.sock")
        );
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let Commands::Telegraf(args) = parse(&["telegraf", "-i", "0"]) else {
            panic!("expected telegraf");
        };
        assert!(matches!(args.common.to_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cache_time_below_interval_rejected() {
        let Commands::List(args) = parse(&["list", "-i", "10", "--cache-time", "5"]) else {
            panic!("expected list");
        };
        assert!(args.to_config().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_flag() {
        let Commands::Serve(args) = parse(&["serve", "--port", "0", "--socket", "/tmp/x.sock"])
        else {
            panic!("expected serve");
        };
        let listen = args.listen_config();
        assert_eq!(listen.port, 0);
        assert_eq!(listen.socket, Some(PathBuf::from("/tmp/x.sock")));

        let Commands::Serve(args) = parse(&["serve", "--socket"]) else {
            panic!("expected serve");
        };
        assert!(args.listen_config().socket.is_some());
    }

    #[test]
    fn test_mock_chip_requires_mock_devices() {
        assert!(Cli::try_parse_from(["npu-exporter", "list", "--mock-chip", "310P3"]).is_err());
        let Commands::List(args) = parse(&["list", "--mock-devices", "2", "--mock-chip", "310P3"])
        else {
            panic!("expected list");
        };
        assert_eq!(args.mock_devices, Some(2));
    }
}
