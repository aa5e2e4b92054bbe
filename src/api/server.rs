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

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::watch;

use crate::api::handlers::router;
use crate::collector::NpuCollector;
use crate::error::{Error, Result};

/// Default Unix socket, with `/tmp` as fallback when `/var/run` is not
/// writable.
#[cfg(unix)]
pub fn default_socket_path() -> PathBuf {
    let var_run_path = PathBuf::from("/var/run/npu-exporter.sock");
    if let Ok(metadata) = std::fs::metadata("/var/run") {
        if metadata.is_dir() {
            let test_path = PathBuf::from("/var/run/.npu-exporter-test");
            if std::fs::write(&test_path, b"").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return var_run_path;
            }
        }
    }
    PathBuf::from("/tmp/npu-exporter.sock")
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    /// 0 disables TCP.
    pub port: u16,
    #[cfg(unix)]
    pub socket: Option<PathBuf>,
}

/// Remove stale socket file if it exists.
/// Uses atomic remove to avoid TOCTOU race conditions.
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed stale socket file: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Only the owner may connect.
#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(unix)]
fn cleanup_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!("Cleaned up socket file: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove socket file on shutdown: {e}"),
    }
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener> {
    if let Err(e) = remove_stale_socket(path) {
        tracing::warn!("Failed to remove stale socket file: {e}");
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let listener = UnixListener::bind(path)?;
    if let Err(e) = set_socket_permissions(path) {
        tracing::warn!("Failed to set socket permissions: {e}");
    }
    Ok(listener)
}

async fn bind_tcp(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(TcpListener::bind(addr).await?)
}

async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also means shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn serve_tcp(
    listener: TcpListener,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

#[cfg(unix)]
async fn serve_unix(
    listener: UnixListener,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

/// Serves `/metrics` on TCP, a Unix socket, or both, until `shutdown`
/// flips. Starts the collector's poll loops and stops them on return.
pub async fn run_api_mode(
    collector: Arc<NpuCollector>,
    listen: ListenConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = router(Arc::clone(&collector));

    #[cfg(unix)]
    let socket = listen.socket.clone();
    #[cfg(not(unix))]
    let socket: Option<std::path::PathBuf> = None;

    if listen.port == 0 && socket.is_none() {
        return Err(Error::Config(
            "no listeners configured, use --port or --socket".to_string(),
        ));
    }

    let tcp = match listen.port {
        0 => None,
        port => Some(bind_tcp(port).await?),
    };
    #[cfg(unix)]
    let unix = match &socket {
        Some(path) => Some(bind_unix(path)?),
        None => None,
    };

    if let Some(listener) = &tcp {
        tracing::info!("API server listening on {}", listener.local_addr()?);
    }
    if let Some(path) = &socket {
        tracing::info!("API server listening on Unix socket: {}", path.display());
    }

    let handles = collector.start(shutdown.clone());

    #[cfg(unix)]
    let result = match (tcp, unix) {
        (Some(tcp), Some(unix)) => {
            let (a, b) = tokio::join!(
                serve_tcp(tcp, app.clone(), shutdown.clone()),
                serve_unix(unix, app, shutdown.clone()),
            );
            a.and(b)
        }
        (Some(tcp), None) => serve_tcp(tcp, app, shutdown.clone()).await,
        (None, Some(unix)) => serve_unix(unix, app, shutdown.clone()).await,
        (None, None) => Ok(()),
    };
    #[cfg(not(unix))]
    let result = match tcp {
        Some(tcp) => serve_tcp(tcp, app, shutdown.clone()).await,
        None => Ok(()),
    };

    #[cfg(unix)]
    if let Some(path) = &socket {
        cleanup_socket(path);
    }
    for handle in handles {
        handle.abort();
    }
    result
}
