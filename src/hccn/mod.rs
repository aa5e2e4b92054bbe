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

//! Wrapper around the `hccn_tool` CLI.
//!
//! RoCE link and optical module data is only exposed through this tool,
//! addressed by the chip's physical id.

mod parser;

pub use parser::{
    parse_bandwidth, parse_key_values, parse_link_speed, parse_link_status, parse_network_stats,
    parse_number, parse_optical_info, Bandwidth, LinkStatus, NetworkStats, OpticalInfo,
    OPTICAL_LANES,
};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::common::AppConfig;
use crate::error::Result;
use crate::utils::run_for_stdout;

#[derive(Debug, Clone)]
pub struct HccnTool {
    path: PathBuf,
    timeout: Duration,
}

impl Default for HccnTool {
    fn default() -> Self {
        Self::new(AppConfig::HCCN_TOOL)
    }
}

impl HccnTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Duration::from_secs(AppConfig::COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tool at `path`, or found on `PATH` when `path` is a bare name.
    pub fn locate(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if path.components().count() > 1 {
            return path.is_file().then(|| Self::new(path));
        }
        std::env::var_os("PATH").and_then(|dirs| {
            std::env::split_paths(&dirs)
                .map(|dir| dir.join(path))
                .find(|candidate| candidate.is_file())
                .map(Self::new)
        })
    }

    /// Runs `hccn_tool -i <phy_id> <option> -g`.
    fn query(&self, phy_id: u32, option: &str) -> Result<String> {
        let id = phy_id.to_string();
        let output = run_for_stdout(
            self.path.as_os_str(),
            &["-i", &id, option, "-g"],
            self.timeout,
        )?;
        debug!("hccn_tool -i {phy_id} {option} -g returned {} bytes", output.len());
        Ok(output)
    }

    pub fn link_status(&self, phy_id: u32) -> Result<LinkStatus> {
        parse_link_status(&self.query(phy_id, "-link")?)
    }

    /// Negotiated speed in Mb/s.
    pub fn link_speed(&self, phy_id: u32) -> Result<u64> {
        parse_link_speed(&self.query(phy_id, "-speed")?)
    }

    pub fn network_stats(&self, phy_id: u32) -> Result<NetworkStats> {
        Ok(parse_network_stats(&self.query(phy_id, "-stat")?))
    }

    pub fn bandwidth(&self, phy_id: u32) -> Result<Bandwidth> {
        Ok(parse_bandwidth(&self.query(phy_id, "-bandwidth")?))
    }

    pub fn optical_info(&self, phy_id: u32) -> Result<OpticalInfo> {
        Ok(parse_optical_info(&self.query(phy_id, "-optical")?))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_missing_tool_is_command_failure() {
        let tool = HccnTool::new("/nonexistent/hccn_tool").with_timeout(Duration::from_secs(1));
        assert!(matches!(
            tool.link_status(0),
            Err(Error::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_locate() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("hccn_tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        assert_eq!(HccnTool::locate(&tool).unwrap().path(), tool.as_path());
        assert!(HccnTool::locate(dir.path().join("missing")).is_none());
        assert!(HccnTool::locate("definitely-not-an-hccn-tool").is_none());
    }
}
