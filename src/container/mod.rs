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

//! Maps NPU devices to the containers and pods that use them.
//!
//! Running containers come from the CRI `RuntimeService`; each one's OCI
//! spec is read from containerd (or isulad's `ContainerService`), falling
//! back to the CRI verbose status, and the Ascend devices are extracted
//! from it.

mod connect;
pub mod cri;
pub mod isula;
pub mod oci;
pub mod spec;

pub use connect::{connect_unix, GrpcTimeouts};
pub use cri::{CriClient, CriVersion};
pub use isula::IsulaClient;
pub use oci::OciClient;
pub use spec::{extract_devices, parse_visible_devices, OciSpec};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::common::config::ContainerConfig;
use crate::common::{read_lock, write_lock};
use crate::error::Result;

pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
pub const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Containerd,
    Isula,
}

impl ContainerRuntime {
    pub fn default_cri_endpoint(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "/var/run/dockershim.sock",
            ContainerRuntime::Containerd => "/run/containerd/containerd.sock",
            ContainerRuntime::Isula => "/run/isulad.sock",
        }
    }

    pub fn default_oci_endpoint(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "/run/docker/containerd/containerd.sock",
            ContainerRuntime::Containerd => "/run/containerd/containerd.sock",
            ContainerRuntime::Isula => "/run/isulad.sock",
        }
    }

    /// containerd namespace holding this runtime's containers. isula has no
    /// containerd, its specs come from isulad's `ContainerService`.
    pub fn oci_namespace(&self) -> Option<&'static str> {
        match self {
            ContainerRuntime::Docker => Some(oci::MOBY_NAMESPACE),
            ContainerRuntime::Containerd => Some(oci::K8S_NAMESPACE),
            ContainerRuntime::Isula => None,
        }
    }
}

/// A running container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// NPU devices used by one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DevicesInfo {
    pub id: String,
    pub pod_namespace: String,
    pub pod_name: String,
    pub container_name: String,
    /// Physical ids, or vNPU ids when `is_vnpu`.
    pub devices: Vec<i32>,
    pub is_vnpu: bool,
}

impl DevicesInfo {
    fn from_record(record: &ContainerRecord, devices: Vec<i32>, is_vnpu: bool) -> Self {
        let label = |key: &str| record.labels.get(key).cloned().unwrap_or_default();
        let container_name = match label(CONTAINER_NAME_LABEL) {
            name if name.is_empty() => record.name.clone(),
            name => name,
        };
        Self {
            id: record.id.clone(),
            pod_namespace: label(POD_NAMESPACE_LABEL),
            pod_name: label(POD_NAME_LABEL),
            container_name,
            devices,
            is_vnpu,
        }
    }
}

/// Where container listings and specs come from.
#[async_trait]
pub trait ContainerSource: Send + Sync {
    async fn list_running(&self) -> Result<Vec<ContainerRecord>>;
    async fn runtime_spec(&self, id: &str) -> Result<OciSpec>;
}

/// Service answering with a container's OCI spec.
enum SpecService {
    Containerd(OciClient),
    Isula(IsulaClient),
}

impl SpecService {
    async fn connect(config: &ContainerConfig, timeouts: GrpcTimeouts) -> Result<Self> {
        let channel = connect_unix(&config.oci_endpoint, timeouts).await?;
        Ok(match config.runtime.oci_namespace() {
            Some(namespace) => SpecService::Containerd(OciClient::new(channel, namespace)),
            None => SpecService::Isula(IsulaClient::new(channel)),
        })
    }

    async fn get_spec(&self, id: &str) -> Result<OciSpec> {
        match self {
            SpecService::Containerd(client) => spec::parse_oci_spec(&client.get_spec(id).await?),
            SpecService::Isula(client) => client.get_spec(id).await,
        }
    }
}

/// [`ContainerSource`] backed by a live CRI runtime.
pub struct RuntimeSource {
    cri: CriClient,
    specs: Option<SpecService>,
}

impl RuntimeSource {
    pub async fn connect(config: &ContainerConfig, timeouts: GrpcTimeouts) -> Result<Self> {
        let cri = CriClient::new(connect_unix(&config.cri_endpoint, timeouts).await?);

        let specs = match SpecService::connect(config, timeouts).await {
            Ok(specs) => Some(specs),
            Err(e) => {
                warn!(
                    "OCI endpoint {} unavailable, using CRI verbose status: {e}",
                    config.oci_endpoint.display()
                );
                None
            }
        };

        info!(
            "Connected to {:?} runtime at {}",
            config.runtime,
            config.cri_endpoint.display()
        );
        Ok(Self { cri, specs })
    }
}

#[async_trait]
impl ContainerSource for RuntimeSource {
    async fn list_running(&self) -> Result<Vec<ContainerRecord>> {
        let containers = self.cri.list_running_containers().await?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerRecord {
                name: c.metadata.map(|m| m.name).unwrap_or_default(),
                id: c.id,
                labels: c.labels,
            })
            .collect())
    }

    async fn runtime_spec(&self, id: &str) -> Result<OciSpec> {
        if let Some(specs) = &self.specs {
            match specs.get_spec(id).await {
                Ok(spec) => return Ok(spec),
                Err(e) => debug!("runtime spec of {id} unavailable: {e}"),
            }
        }
        let status = self.cri.container_status(id, true).await?;
        spec::parse_verbose_info(&status.info)
    }
}

/// Builds and caches the container → devices mapping.
pub struct DevicesParser {
    source: Arc<dyn ContainerSource>,
    snapshot: RwLock<Arc<HashMap<String, DevicesInfo>>>,
}

impl DevicesParser {
    pub fn new(source: Arc<dyn ContainerSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Queries the runtime and replaces the snapshot. Containers without
    /// NPU devices are left out.
    pub async fn fetch_and_parse(&self) -> Result<HashMap<String, DevicesInfo>> {
        let mut result = HashMap::new();
        for record in self.source.list_running().await? {
            let spec = match self.source.runtime_spec(&record.id).await {
                Ok(spec) => spec,
                Err(e) => {
                    debug!("Skipping container {}: {e}", record.id);
                    continue;
                }
            };
            let (devices, is_vnpu) = match extract_devices(&spec) {
                Ok(found) => found,
                Err(e) => {
                    warn!("Container {} has unusable device settings: {e}", record.id);
                    continue;
                }
            };
            if devices.is_empty() {
                continue;
            }
            let info = DevicesInfo::from_record(&record, devices, is_vnpu);
            result.insert(info.id.clone(), info);
        }

        debug!("{} container(s) use NPU devices", result.len());
        *write_lock(&self.snapshot) = Arc::new(result.clone());
        Ok(result)
    }

    /// Last successfully fetched mapping.
    pub fn snapshot(&self) -> Arc<HashMap<String, DevicesInfo>> {
        read_lock(&self.snapshot).clone()
    }
}
