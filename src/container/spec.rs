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

//! OCI runtime spec parsing and device id extraction.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::dcmi::constants::MAX_LOGIC_ID;
use crate::error::{Error, Result};

pub const VISIBLE_DEVICES_ENV: &str = "ASCEND_VISIBLE_DEVICES";

static DEVICE_NODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/dev/(v?)davinci(\d+)$").expect("valid device node regex"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OciSpec {
    #[serde(default)]
    pub process: Option<OciProcess>,
    #[serde(default)]
    pub linux: Option<OciLinux>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OciProcess {
    #[serde(default)]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OciLinux {
    #[serde(default)]
    pub devices: Vec<OciDevice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OciDevice {
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub major: i64,
    #[serde(default)]
    pub minor: i64,
}

impl OciSpec {
    pub fn env(&self, name: &str) -> Option<&str> {
        self.process.as_ref()?.env.iter().find_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            (key == name).then_some(value)
        })
    }

    pub fn devices(&self) -> &[OciDevice] {
        self.linux
            .as_ref()
            .map(|linux| linux.devices.as_slice())
            .unwrap_or(&[])
    }
}

/// Shape of the CRI verbose `info` entry; only the runtime spec is read.
#[derive(Debug, Deserialize)]
struct VerboseInfo {
    #[serde(rename = "runtimeSpec")]
    runtime_spec: Option<OciSpec>,
}

pub fn parse_oci_spec(json: &[u8]) -> Result<OciSpec> {
    Ok(serde_json::from_slice(json)?)
}

/// Extracts the runtime spec from a verbose `ContainerStatus` info map.
pub fn parse_verbose_info(info: &HashMap<String, String>) -> Result<OciSpec> {
    let raw = info
        .get("info")
        .ok_or_else(|| Error::ContainerRuntime("verbose status has no info".to_string()))?;
    let verbose: VerboseInfo = serde_json::from_str(raw)?;
    verbose
        .runtime_spec
        .ok_or_else(|| Error::ContainerRuntime("verbose info has no runtimeSpec".to_string()))
}

/// Parses an `ASCEND_VISIBLE_DEVICES` value.
///
/// Accepts ids (`0,1`), ranges (`0-3`) and device names (`Ascend910-2`).
/// Returns the sorted, de-duplicated physical ids. `all`, `none` and
/// `void` carry no attribution and yield an empty list. Ids outside
/// `0..MAX_LOGIC_ID` are rejected before any range is expanded.
pub fn parse_visible_devices(value: &str) -> Result<Vec<i32>> {
    let value = value.trim();
    if value.is_empty() || ["all", "none", "void"].contains(&value.to_ascii_lowercase().as_str()) {
        return Ok(Vec::new());
    }

    let mut ids = BTreeSet::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Ok(id) = part.parse::<i32>() {
            ids.insert(checked_device_id(id, part)?);
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<i32>(), end.trim().parse::<i32>()) {
                let start = checked_device_id(start, part)?;
                let end = checked_device_id(end, part)?;
                if start > end {
                    return Err(Error::Parse(format!("invalid device range {part}")));
                }
                ids.extend(start..=end);
                continue;
            }
        }
        if part.starts_with("Ascend") {
            let id = part
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<i32>().ok())
                .ok_or_else(|| Error::Parse(format!("invalid device name {part}")))?;
            ids.insert(checked_device_id(id, part)?);
            continue;
        }
        return Err(Error::Parse(format!("invalid device id {part}")));
    }
    Ok(ids.into_iter().collect())
}

fn checked_device_id(id: i32, part: &str) -> Result<i32> {
    if (0..MAX_LOGIC_ID).contains(&id) {
        Ok(id)
    } else {
        Err(Error::Parse(format!(
            "device id {id} in {part} is outside 0..{MAX_LOGIC_ID}"
        )))
    }
}

/// Device ids mounted as `/dev/davinciN` (physical) or `/dev/vdavinciN` (vNPU).
pub fn parse_device_nodes(devices: &[OciDevice]) -> (Vec<i32>, bool) {
    let mut ids = BTreeSet::new();
    let mut virtual_device = false;
    for device in devices {
        if let Some(captures) = DEVICE_NODE_REGEX.captures(&device.path) {
            if let Ok(id) = captures[2].parse::<i32>() {
                ids.insert(id);
                virtual_device |= !captures[1].is_empty();
            }
        }
    }
    (ids.into_iter().collect(), virtual_device)
}

/// Device ids used by the container described by `spec`, and whether they
/// are vNPUs. The environment variable wins over mounted device nodes.
pub fn extract_devices(spec: &OciSpec) -> Result<(Vec<i32>, bool)> {
    let (node_ids, virtual_device) = parse_device_nodes(spec.devices());
    if let Some(value) = spec.env(VISIBLE_DEVICES_ENV) {
        let ids = parse_visible_devices(value)?;
        if !ids.is_empty() {
            return Ok((ids, virtual_device));
        }
    }
    Ok((node_ids, virtual_device))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC_JSON: &str = r#"{
        "ociVersion": "1.0.2",
        "process": {
            "env": ["PATH=/usr/bin", "ASCEND_VISIBLE_DEVICES=0-1,3"]
        },
        "linux": {
            "devices": [
                {"path": "/dev/davinci0", "type": "c", "major": 236, "minor": 0},
                {"path": "/dev/davinci_manager", "type": "c", "major": 235, "minor": 0},
                {"path": "/dev/devmm_svm", "type": "c", "major": 234, "minor": 0}
            ]
        },
        "annotations": {"io.kubernetes.cri.container-name": "train"}
    }"#;

    #[test]
    fn test_parse_spec() {
        let spec = parse_oci_spec(SPEC_JSON.as_bytes()).unwrap();
        assert_eq!(spec.env(VISIBLE_DEVICES_ENV), Some("0-1,3"));
        assert_eq!(spec.env("HOME"), None);
        assert_eq!(spec.devices().len(), 3);
        assert_eq!(
            spec.annotations.get("io.kubernetes.cri.container-name").map(String::as_str),
            Some("train")
        );
    }

    #[test]
    fn test_env_wins_over_nodes() {
        let spec = parse_oci_spec(SPEC_JSON.as_bytes()).unwrap();
        assert_eq!(extract_devices(&spec).unwrap(), (vec![0, 1, 3], false));
    }

    #[test]
    fn test_nodes_when_no_env() {
        let spec = parse_oci_spec(
            br#"{"linux": {"devices": [{"path": "/dev/vdavinci100"}, {"path": "/dev/davinci_manager"}]}}"#,
        )
        .unwrap();
        assert_eq!(extract_devices(&spec).unwrap(), (vec![100], true));
    }

    #[test]
    fn test_visible_devices_formats() {
        assert_eq!(parse_visible_devices("0,1").unwrap(), vec![0, 1]);
        assert_eq!(parse_visible_devices("3-5, 1").unwrap(), vec![1, 3, 4, 5]);
        assert_eq!(
            parse_visible_devices("Ascend910-2,Ascend910-0").unwrap(),
            vec![0, 2]
        );
        assert_eq!(parse_visible_devices("1,1").unwrap(), vec![1]);
        assert!(parse_visible_devices("all").unwrap().is_empty());
        assert!(parse_visible_devices("").unwrap().is_empty());
        assert!(parse_visible_devices("5-2").is_err());
        assert!(parse_visible_devices("gpu0").is_err());
    }

    #[test]
    fn test_visible_devices_out_of_range() {
        let last = MAX_LOGIC_ID - 1;
        assert_eq!(
            parse_visible_devices(&format!("{}-{last}", last - 1)).unwrap(),
            vec![last - 1, last]
        );

        let started = std::time::Instant::now();
        assert!(matches!(
            parse_visible_devices("0-2147483646"),
            Err(Error::Parse(_))
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        assert!(parse_visible_devices(&MAX_LOGIC_ID.to_string()).is_err());
        assert!(parse_visible_devices("-1").is_err());
        assert!(parse_visible_devices("Ascend910-4096").is_err());
    }

    #[test]
    fn test_verbose_info() {
        let info = HashMap::from([(
            "info".to_string(),
            r#"{"pid": 42, "runtimeSpec": {"process": {"env": ["ASCEND_VISIBLE_DEVICES=2"]}}}"#
                .to_string(),
        )]);
        let spec = parse_verbose_info(&info).unwrap();
        assert_eq!(spec.env(VISIBLE_DEVICES_ENV), Some("2"));

        assert!(parse_verbose_info(&HashMap::new()).is_err());
    }
}
