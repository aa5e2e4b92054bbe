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

//! Unified error types for the npu-exporter library.
//!
//! Driver failures carry the raw DCMI return code; its human readable
//! message comes from the static table in [`crate::dcmi::constants`].
//!
//! # Example
//!
//! ```rust,no_run
//! use npu_exporter::dcmi::LibDcmi;
//! use npu_exporter::device::{DeviceManager, RetryPolicy};
//! use npu_exporter::Result;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let driver = Arc::new(LibDcmi::load()?);
//!     let manager = DeviceManager::new(driver, RetryPolicy::default())?;
//!     let (count, _) = manager.get_device_list()?;
//!     println!("Found {count} NPU(s)");
//!     Ok(())
//! }
//! ```

use crate::dcmi::constants::error_message;
use thiserror::Error;

/// The main error type for npu-exporter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// `libdcmi.so` could not be found or opened.
    #[error("Failed to load DCMI library: {0}")]
    LibraryLoad(String),

    /// A mandatory symbol is missing from the loaded library.
    #[error("DCMI symbol not found: {0}")]
    SymbolMissing(&'static str),

    /// A DCMI call returned a non-zero code.
    #[error("{api} failed with code {code}: {}", error_message(*code))]
    Dcmi { api: &'static str, code: i32 },

    /// The logic id, card id or device id is out of range.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// The driver, chip or tool does not provide this information.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An external command (hccn_tool) failed or returned unusable output.
    #[error("Command failed: '{command}' (code: {code:?}) stderr: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Output of the driver or a tool could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Container runtime returned an unexpected answer.
    #[error("Container runtime error: {0}")]
    ContainerRuntime(String),

    /// A gRPC call failed.
    #[error("gRPC call failed: {0}")]
    Grpc(#[from] tonic::Status),

    /// A gRPC channel could not be established.
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Invalid exporter configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON decoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the driver reports the operation as unsupported, either
    /// through a missing symbol or the dedicated return codes.
    pub fn is_not_supported(&self) -> bool {
        match self {
            Error::NotSupported(_) | Error::SymbolMissing(_) => true,
            Error::Dcmi { code, .. } => crate::dcmi::constants::is_not_supported_code(*code),
            _ => false,
        }
    }
}

/// A specialized Result type for npu-exporter operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::LibraryLoad("libdcmi.so: cannot open".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to load DCMI library: libdcmi.so: cannot open"
        );

        let err = Error::Dcmi {
            api: "dcmi_get_device_health",
            code: -8001,
        };
        assert_eq!(
            err.to_string(),
            "dcmi_get_device_health failed with code -8001: The input parameter is incorrect"
        );

        let err = Error::InvalidDevice("logic id 99".to_string());
        assert_eq!(err.to_string(), "Invalid device: logic id 99");
    }

    #[test]
    fn test_not_supported_classification() {
        assert!(Error::NotSupported("hbm".to_string()).is_not_supported());
        assert!(Error::SymbolMissing("dcmi_get_hbm_info").is_not_supported());
        assert!(Error::Dcmi {
            api: "dcmi_get_hbm_info",
            code: -8255
        }
        .is_not_supported());
        assert!(!Error::Dcmi {
            api: "dcmi_get_hbm_info",
            code: -8005
        }
        .is_not_supported());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
