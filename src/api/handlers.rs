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

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::metrics::CONTENT_TYPE;
use crate::collector::NpuCollector;

pub type SharedState = Arc<NpuCollector>;

const INDEX_PAGE: &str = r#"<html>
<head><title>NPU-Exporter</title></head>
<body>
<h1 align="center">NPU-Exporter</h1>
<p align="center">Welcome to use NPU-Exporter, the Prometheus metrics url is http://ip:port/metrics</p>
<p align="center"><a href="./metrics">Metrics</a></p>
</body>
</html>
"#;

pub async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let body = tokio::task::spawn_blocking(move || state.gather_prometheus())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to render metrics: {e}");
            String::new()
        });
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// 200 while at least one NPU is visible.
pub async fn health_handler(State(state): State<SharedState>) -> (StatusCode, &'static str) {
    if state.chips().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no npu found")
    } else {
        (StatusCode::OK, "ok")
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ExporterConfig;
    use crate::dcmi::MockDcmi;
    use crate::device::{DeviceManager, RetryPolicy};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> SharedState {
        let manager = DeviceManager::new(Arc::new(MockDcmi::ascend_910b(2)), RetryPolicy::none())
            .unwrap();
        let collector =
            NpuCollector::new(Arc::new(manager), ExporterConfig::default(), None, None).unwrap();
        collector.collect_once();
        Arc::new(collector)
    }

    async fn get_path(path: &str) -> (StatusCode, Option<String>, String) {
        let response = router(state())
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (status, content_type, body) = get_path("/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(CONTENT_TYPE));
        assert!(body.contains("machine_npu_nums 2"));
        assert!(body.contains("# TYPE npu_chip_info_power gauge"));
    }

    #[tokio::test]
    async fn test_index_links_metrics() {
        let (status, _, body) = get_path("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("./metrics"));
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, _, body) = get_path("/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (status, _, _) = get_path("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
