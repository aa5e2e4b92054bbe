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

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use crate::common::AppConfig;
use crate::error::{Error, Result};

/// Placeholder authority; the connector ignores it and dials the socket.
const UNIX_PLACEHOLDER_URI: &str = "http://[::]:50051";

#[derive(Debug, Clone, Copy)]
pub struct GrpcTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for GrpcTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(AppConfig::GRPC_CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(AppConfig::GRPC_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Opens a gRPC channel over the Unix socket at `path`.
///
/// `unix://` prefixes are accepted so endpoints can be passed the way
/// kubelet and crictl spell them.
pub async fn connect_unix(path: impl AsRef<Path>, timeouts: GrpcTimeouts) -> Result<Channel> {
    let path = strip_unix_scheme(path.as_ref());
    if !path.exists() {
        return Err(Error::ContainerRuntime(format!(
            "socket {} does not exist",
            path.display()
        )));
    }

    debug!("Connecting to container runtime at {}", path.display());
    let socket = path.clone();
    let channel = Endpoint::try_from(UNIX_PLACEHOLDER_URI)?
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket = socket.clone();
            async move {
                let stream = UnixStream::connect(socket).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await?;
    Ok(channel)
}

fn strip_unix_scheme(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("unix://")) {
        Some(rest) => PathBuf::from(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_unix_scheme() {
        assert_eq!(
            strip_unix_scheme(Path::new("unix:///run/containerd/containerd.sock")),
            PathBuf::from("/run/containerd/containerd.sock")
        );
        assert_eq!(
            strip_unix_scheme(Path::new("/var/run/dockershim.sock")),
            PathBuf::from("/var/run/dockershim.sock")
        );
    }

    #[tokio::test]
    async fn test_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let result = connect_unix(dir.path().join("cri.sock"), GrpcTimeouts::default()).await;
        assert!(matches!(result, Err(Error::ContainerRuntime(_))));
    }
}
