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

//! Minimal CRI `RuntimeService` client.
//!
//! Only the messages needed to map containers to devices are modelled.
//! `runtime.v1` and `runtime.v1alpha2` share these wire layouts, so one set
//! of types serves both and only the method path changes.

use std::collections::HashMap;
use std::sync::OnceLock;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::Code;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerStateValue {
    #[prost(enumeration = "ContainerState", tag = "1")]
    pub state: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerFilter {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, optional, tag = "2")]
    pub state: Option<ContainerStateValue>,
    #[prost(string, tag = "3")]
    pub pod_sandbox_id: String,
    #[prost(map = "string, string", tag = "4")]
    pub label_selector: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListContainersRequest {
    #[prost(message, optional, tag = "1")]
    pub filter: Option<ContainerFilter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerMetadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub attempt: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageSpec {
    #[prost(string, tag = "1")]
    pub image: String,
    #[prost(map = "string, string", tag = "2")]
    pub annotations: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Container {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub pod_sandbox_id: String,
    #[prost(message, optional, tag = "3")]
    pub metadata: Option<ContainerMetadata>,
    #[prost(message, optional, tag = "4")]
    pub image: Option<ImageSpec>,
    #[prost(string, tag = "5")]
    pub image_ref: String,
    #[prost(enumeration = "ContainerState", tag = "6")]
    pub state: i32,
    #[prost(int64, tag = "7")]
    pub created_at: i64,
    #[prost(map = "string, string", tag = "8")]
    pub labels: HashMap<String, String>,
    #[prost(map = "string, string", tag = "9")]
    pub annotations: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListContainersResponse {
    #[prost(message, repeated, tag = "1")]
    pub containers: Vec<Container>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerStatusRequest {
    #[prost(string, tag = "1")]
    pub container_id: String,
    #[prost(bool, tag = "2")]
    pub verbose: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerStatus {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, optional, tag = "2")]
    pub metadata: Option<ContainerMetadata>,
    #[prost(enumeration = "ContainerState", tag = "3")]
    pub state: i32,
    #[prost(int64, tag = "4")]
    pub created_at: i64,
    #[prost(int64, tag = "5")]
    pub started_at: i64,
    #[prost(int64, tag = "6")]
    pub finished_at: i64,
    #[prost(int32, tag = "7")]
    pub exit_code: i32,
    #[prost(message, optional, tag = "8")]
    pub image: Option<ImageSpec>,
    #[prost(string, tag = "9")]
    pub image_ref: String,
    #[prost(string, tag = "10")]
    pub reason: String,
    #[prost(string, tag = "11")]
    pub message: String,
    #[prost(map = "string, string", tag = "12")]
    pub labels: HashMap<String, String>,
    #[prost(map = "string, string", tag = "13")]
    pub annotations: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerStatusResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<ContainerStatus>,
    /// Runtime specific details, present when `verbose` was requested.
    #[prost(map = "string, string", tag = "2")]
    pub info: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ContainerState {
    ContainerCreated = 0,
    ContainerRunning = 1,
    ContainerExited = 2,
    ContainerUnknown = 3,
}

/// CRI API revision spoken by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriVersion {
    V1,
    V1Alpha2,
}

impl CriVersion {
    pub fn package(&self) -> &'static str {
        match self {
            CriVersion::V1 => "runtime.v1",
            CriVersion::V1Alpha2 => "runtime.v1alpha2",
        }
    }

    fn method_path(&self, method: &str) -> Result<PathAndQuery> {
        PathAndQuery::try_from(format!("/{}.RuntimeService/{method}", self.package()))
            .map_err(|e| Error::ContainerRuntime(format!("invalid method path: {e}")))
    }
}

/// `RuntimeService` client that negotiates the API revision on first use.
#[derive(Debug)]
pub struct CriClient {
    grpc: tonic::client::Grpc<Channel>,
    version: OnceLock<CriVersion>,
}

impl CriClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(channel),
            version: OnceLock::new(),
        }
    }

    /// Negotiated revision, once a call has succeeded.
    pub fn version(&self) -> Option<CriVersion> {
        self.version.get().copied()
    }

    /// Lists running containers.
    pub async fn list_running_containers(&self) -> Result<Vec<Container>> {
        let request = ListContainersRequest {
            filter: Some(ContainerFilter {
                state: Some(ContainerStateValue {
                    state: ContainerState::ContainerRunning as i32,
                }),
                ..ContainerFilter::default()
            }),
        };
        let response: ListContainersResponse = self.unary("ListContainers", request).await?;
        Ok(response.containers)
    }

    pub async fn container_status(
        &self,
        container_id: &str,
        verbose: bool,
    ) -> Result<ContainerStatusResponse> {
        let request = ContainerStatusRequest {
            container_id: container_id.to_string(),
            verbose,
        };
        self.unary("ContainerStatus", request).await
    }

    async fn unary<Req, Resp>(&self, method: &str, request: Req) -> Result<Resp>
    where
        Req: prost::Message + Clone + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        if let Some(&version) = self.version.get() {
            return self.call(version, method, request).await;
        }

        match self.call(CriVersion::V1, method, request.clone()).await {
            Ok(response) => {
                let _ = self.version.set(CriVersion::V1);
                Ok(response)
            }
            Err(Error::Grpc(status)) if status.code() == Code::Unimplemented => {
                debug!("runtime.v1 unimplemented, falling back to runtime.v1alpha2");
                let response = self.call(CriVersion::V1Alpha2, method, request).await?;
                if self.version.set(CriVersion::V1Alpha2).is_ok() {
                    info!("Container runtime speaks CRI runtime.v1alpha2");
                }
                Ok(response)
            }
            Err(e) => Err(e),
        }
    }

    async fn call<Req, Resp>(&self, version: CriVersion, method: &str, request: Req) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Error::ContainerRuntime(format!("service was not ready: {e}")))?;
        let path = version.method_path(method)?;
        let codec = tonic_prost::ProstCodec::default();
        let response = grpc.unary(tonic::Request::new(request), path, codec).await?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_method_paths() {
        assert_eq!(
            CriVersion::V1.method_path("ListContainers").unwrap().as_str(),
            "/runtime.v1.RuntimeService/ListContainers"
        );
        assert_eq!(
            CriVersion::V1Alpha2
                .method_path("ContainerStatus")
                .unwrap()
                .as_str(),
            "/runtime.v1alpha2.RuntimeService/ContainerStatus"
        );
    }

    #[test]
    fn test_running_filter_encoding() {
        let request = ListContainersRequest {
            filter: Some(ContainerFilter {
                state: Some(ContainerStateValue {
                    state: ContainerState::ContainerRunning as i32,
                }),
                ..ContainerFilter::default()
            }),
        };
        // field 1 (filter) { field 2 (state) { field 1 = RUNNING } }
        assert_eq!(request.encode_to_vec(), vec![0x0a, 0x04, 0x12, 0x02, 0x08, 0x01]);
    }
}
