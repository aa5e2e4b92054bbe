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

//! Container runtime clients against an in-process gRPC server on a Unix
//! socket that speaks only CRI `runtime.v1alpha2` and isulad's
//! `ContainerService`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::net::UnixListener;
use tonic::body::Body;
use tonic::codegen::http;
use tonic::codegen::tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::Status;
use tonic_prost::ProstCodec;
use tower::service_fn;

use npu_exporter::common::config::ContainerConfig;
use npu_exporter::container::cri::{
    Container, ContainerMetadata, ContainerStatusRequest, ContainerStatusResponse,
    ListContainersRequest, ListContainersResponse,
};
use npu_exporter::container::isula::{
    InspectContainerRequest, InspectContainerResponse, INSPECT_PATH,
};
use npu_exporter::container::{
    connect_unix, ContainerRuntime, ContainerSource, CriClient, CriVersion, DevicesParser,
    GrpcTimeouts, RuntimeSource, POD_NAME_LABEL,
};

const LIST_V1ALPHA2: &str = "/runtime.v1alpha2.RuntimeService/ListContainers";
const STATUS_V1ALPHA2: &str = "/runtime.v1alpha2.RuntimeService/ContainerStatus";

type Calls = Arc<Mutex<Vec<String>>>;

fn list_response() -> ListContainersResponse {
    ListContainersResponse {
        containers: vec![Container {
            id: "isula-7f".to_string(),
            metadata: Some(ContainerMetadata {
                name: "worker".to_string(),
                attempt: 0,
            }),
            labels: HashMap::from([(POD_NAME_LABEL.to_string(), "trainer-0".to_string())]),
            ..Container::default()
        }],
    }
}

async fn route(path: &str, request: http::Request<Body>) -> http::Response<Body> {
    match path {
        LIST_V1ALPHA2 => {
            let handler = service_fn(|_: tonic::Request<ListContainersRequest>| async {
                Ok::<_, Status>(tonic::Response::new(list_response()))
            });
            let mut grpc = tonic::server::Grpc::new(ProstCodec::<
                ListContainersResponse,
                ListContainersRequest,
            >::default());
            grpc.unary(handler, request).await
        }
        STATUS_V1ALPHA2 => {
            let handler = service_fn(|request: tonic::Request<ContainerStatusRequest>| async move {
                let request = request.into_inner();
                let mut info = HashMap::new();
                if request.verbose {
                    info.insert(
                        "info".to_string(),
                        r#"{"runtimeSpec":{"process":{"env":["ASCEND_VISIBLE_DEVICES=1"]}}}"#
                            .to_string(),
                    );
                }
                Ok::<_, Status>(tonic::Response::new(ContainerStatusResponse {
                    status: None,
                    info,
                }))
            });
            let mut grpc = tonic::server::Grpc::new(ProstCodec::<
                ContainerStatusResponse,
                ContainerStatusRequest,
            >::default());
            grpc.unary(handler, request).await
        }
        INSPECT_PATH => {
            let handler = service_fn(|request: tonic::Request<InspectContainerRequest>| async move {
                let id = request.into_inner().id;
                let response = if id == "isula-7f" {
                    InspectContainerResponse {
                        container_json: r#"{"Config":{"Env":[]},"HostConfig":{"Devices":[{"PathOnHost":"/dev/davinci5","PathInContainer":"/dev/davinci0"}]}}"#
                            .to_string(),
                        ..InspectContainerResponse::default()
                    }
                } else {
                    InspectContainerResponse {
                        cc: 1,
                        errmsg: format!("No such container: {id}"),
                        ..InspectContainerResponse::default()
                    }
                };
                Ok::<_, Status>(tonic::Response::new(response))
            });
            let mut grpc = tonic::server::Grpc::new(ProstCodec::<
                InspectContainerResponse,
                InspectContainerRequest,
            >::default());
            grpc.unary(handler, request).await
        }
        _ => Status::unimplemented(format!("unknown method {path}")).into_http(),
    }
}

/// Serves the fake runtime on `socket` and records every method path called.
fn spawn_runtime(socket: &Path) -> Calls {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let listener = UnixListener::bind(socket).unwrap();

    let recorded = calls.clone();
    let service = service_fn(move |request: http::Request<Body>| {
        let recorded = recorded.clone();
        async move {
            let path = request.uri().path().to_string();
            recorded.lock().unwrap().push(path.clone());
            Ok::<_, Infallible>(route(&path, request).await)
        }
    });

    tokio::spawn(async move {
        Server::builder()
            .serve_with_incoming(service, UnixListenerStream::new(listener))
            .await
    });
    calls
}

#[tokio::test]
async fn test_cri_falls_back_to_v1alpha2_once() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("cri.sock");
    let calls = spawn_runtime(&socket);

    let client = CriClient::new(connect_unix(&socket, GrpcTimeouts::default()).await.unwrap());
    assert_eq!(client.version(), None);

    let containers = client.list_running_containers().await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].id, "isula-7f");
    assert_eq!(client.version(), Some(CriVersion::V1Alpha2));

    let status = client.container_status("isula-7f", true).await.unwrap();
    assert!(status.info.contains_key("info"));

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "/runtime.v1.RuntimeService/ListContainers".to_string(),
            LIST_V1ALPHA2.to_string(),
            STATUS_V1ALPHA2.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_isula_specs_come_from_container_service() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("isulad.sock");
    let calls = spawn_runtime(&socket);

    let config = ContainerConfig::new(
        ContainerRuntime::Isula,
        Some(socket.clone()),
        Some(socket.clone()),
    );
    let source = Arc::new(
        RuntimeSource::connect(&config, GrpcTimeouts::default())
            .await
            .unwrap(),
    );

    let parser = DevicesParser::new(source.clone());
    let found = parser.fetch_and_parse().await.unwrap();
    assert_eq!(found.len(), 1);
    let worker = &found["isula-7f"];
    assert_eq!(worker.devices, vec![5]);
    assert_eq!(worker.pod_name, "trainer-0");
    assert_eq!(worker.container_name, "worker");

    {
        let calls = calls.lock().unwrap();
        assert!(calls.iter().any(|c| c == INSPECT_PATH));
        assert!(!calls.iter().any(|c| c.ends_with("/ContainerStatus")));
    }

    // Unknown to isulad: answered from the CRI verbose status instead.
    let spec = source.runtime_spec("cri-only").await.unwrap();
    assert_eq!(spec.env("ASCEND_VISIBLE_DEVICES"), Some("1"));
    assert!(calls
        .lock()
        .unwrap()
        .iter()
        .any(|c| c == STATUS_V1ALPHA2));
}
