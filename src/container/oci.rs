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

//! containerd `Containers` service client, used to read a container's OCI
//! runtime spec.

use std::collections::HashMap;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;

use crate::error::{Error, Result};

const GET_CONTAINER_PATH: &str = "/containerd.services.containers.v1.Containers/Get";
const NAMESPACE_HEADER: &str = "containerd-namespace";

/// Namespace kubelet uses for CRI managed containers.
pub const K8S_NAMESPACE: &str = "k8s.io";
/// Namespace of the docker daemon's containerd.
pub const MOBY_NAMESPACE: &str = "moby";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetContainerRequest {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetContainerResponse {
    #[prost(message, optional, tag = "1")]
    pub container: Option<ContainerdContainer>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerRuntimeInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub options: Option<prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerdContainer {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(map = "string, string", tag = "2")]
    pub labels: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub image: String,
    #[prost(message, optional, tag = "4")]
    pub runtime: Option<ContainerRuntimeInfo>,
    /// OCI runtime spec, JSON encoded in `value`.
    #[prost(message, optional, tag = "5")]
    pub spec: Option<prost_types::Any>,
    #[prost(string, tag = "6")]
    pub snapshotter: String,
    #[prost(string, tag = "7")]
    pub snapshot_key: String,
    #[prost(message, optional, tag = "8")]
    pub created_at: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "9")]
    pub updated_at: Option<prost_types::Timestamp>,
}

#[derive(Debug, Clone)]
pub struct OciClient {
    grpc: tonic::client::Grpc<Channel>,
    namespace: String,
}

impl OciClient {
    pub fn new(channel: Channel, namespace: impl Into<String>) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(channel),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get_container(&self, id: &str) -> Result<ContainerdContainer> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Error::ContainerRuntime(format!("service was not ready: {e}")))?;

        let mut request = tonic::Request::new(GetContainerRequest { id: id.to_string() });
        let namespace = MetadataValue::try_from(self.namespace.as_str())
            .map_err(|e| Error::ContainerRuntime(format!("invalid namespace: {e}")))?;
        request.metadata_mut().insert(NAMESPACE_HEADER, namespace);

        let codec = tonic_prost::ProstCodec::default();
        let response: tonic::Response<GetContainerResponse> = grpc
            .unary(request, PathAndQuery::from_static(GET_CONTAINER_PATH), codec)
            .await?;
        response
            .into_inner()
            .container
            .ok_or_else(|| Error::ContainerRuntime(format!("container {id} not found")))
    }

    /// Raw OCI spec JSON of container `id`.
    pub async fn get_spec(&self, id: &str) -> Result<Vec<u8>> {
        let container = self.get_container(id).await?;
        container
            .spec
            .map(|any| any.value)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::ContainerRuntime(format!("container {id} has no spec")))
    }
}
