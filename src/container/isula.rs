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

//! iSulad `ContainerService` client. isula keeps no containerd namespace,
//! so a container's environment and devices come from `Inspect`.

use serde::Deserialize;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

use super::spec::{OciDevice, OciLinux, OciProcess, OciSpec};
use crate::error::{Error, Result};

pub const INSPECT_PATH: &str = "/containers.ContainerService/Inspect";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InspectContainerRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(bool, tag = "2")]
    pub bformat: bool,
    #[prost(int32, tag = "3")]
    pub timeout: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InspectContainerResponse {
    #[prost(string, tag = "1")]
    pub container_json: String,
    /// Non-zero when the daemon failed the request.
    #[prost(uint32, tag = "2")]
    pub cc: u32,
    #[prost(string, tag = "3")]
    pub errmsg: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectJson {
    #[serde(default)]
    config: Option<InspectConfig>,
    #[serde(default)]
    host_config: Option<InspectHostConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    env: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostConfig {
    #[serde(default)]
    devices: Vec<InspectDevice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDevice {
    #[serde(default)]
    path_on_host: String,
    #[serde(default)]
    path_in_container: String,
}

/// Converts `isula inspect` JSON into the parts of an OCI spec used for
/// device extraction. Host device paths are preferred.
pub fn parse_inspect(json: &str) -> Result<OciSpec> {
    let inspect: InspectJson = serde_json::from_str(json)?;
    let env = inspect.config.map(|c| c.env).unwrap_or_default();
    let devices = inspect
        .host_config
        .map(|h| h.devices)
        .unwrap_or_default()
        .into_iter()
        .map(|d| OciDevice {
            path: if d.path_on_host.is_empty() {
                d.path_in_container
            } else {
                d.path_on_host
            },
            kind: "c".to_string(),
            ..OciDevice::default()
        })
        .collect();

    Ok(OciSpec {
        process: Some(OciProcess { env }),
        linux: Some(OciLinux { devices }),
        ..OciSpec::default()
    })
}

#[derive(Debug, Clone)]
pub struct IsulaClient {
    grpc: tonic::client::Grpc<Channel>,
}

impl IsulaClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(channel),
        }
    }

    /// Raw inspect JSON of container `id`.
    pub async fn inspect(&self, id: &str) -> Result<String> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Error::ContainerRuntime(format!("service was not ready: {e}")))?;

        let request = tonic::Request::new(InspectContainerRequest {
            id: id.to_string(),
            ..InspectContainerRequest::default()
        });
        let codec = tonic_prost::ProstCodec::default();
        let response: tonic::Response<InspectContainerResponse> = grpc
            .unary(request, PathAndQuery::from_static(INSPECT_PATH), codec)
            .await?;

        let response = response.into_inner();
        if response.cc != 0 {
            return Err(Error::ContainerRuntime(format!(
                "isulad inspect of {id} failed ({}): {}",
                response.cc, response.errmsg
            )));
        }
        if response.container_json.is_empty() {
            return Err(Error::ContainerRuntime(format!("container {id} not found")));
        }
        Ok(response.container_json)
    }

    pub async fn get_spec(&self, id: &str) -> Result<OciSpec> {
        parse_inspect(&self.inspect(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::extract_devices;

    #[test]
    fn test_parse_inspect() {
        let spec = parse_inspect(
            r#"{
                "Id": "3f2a",
                "Config": {"Env": ["PATH=/usr/bin", "ASCEND_VISIBLE_DEVICES=4"]},
                "HostConfig": {"Devices": [
                    {"PathOnHost": "/dev/davinci4", "PathInContainer": "/dev/davinci0", "CgroupPermissions": "rwm"},
                    {"PathOnHost": "", "PathInContainer": "/dev/davinci_manager"}
                ]}
            }"#,
        )
        .unwrap();
        assert_eq!(spec.env("ASCEND_VISIBLE_DEVICES"), Some("4"));
        let paths: Vec<&str> = spec.devices().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/dev/davinci4", "/dev/davinci_manager"]);
        assert_eq!(extract_devices(&spec).unwrap(), (vec![4], false));
    }

    #[test]
    fn test_parse_inspect_without_devices() {
        let spec = parse_inspect(r#"{"Config": {"Env": []}}"#).unwrap();
        assert!(spec.devices().is_empty());
        assert!(parse_inspect("not json").is_err());
    }
}
