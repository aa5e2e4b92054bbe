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

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use npu_exporter::api::run_api_mode;
use npu_exporter::cli::{Cli, Commands, CommonArgs, ServeArgs};
use npu_exporter::collector::NpuCollector;
use npu_exporter::container::{DevicesParser, GrpcTimeouts, RuntimeSource};
use npu_exporter::dcmi::{DcmiDriver, LibDcmi, MockDcmi};
use npu_exporter::device::{DeviceManager, RetryPolicy};
use npu_exporter::hccn::HccnTool;
use npu_exporter::telegraf::run_telegraf_mode;
use npu_exporter::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Serve(ServeArgs::parse_from(["serve"])));

    // stdout carries the data in telegraf and list modes
    init_tracing(!matches!(command, Commands::Serve(_)));

    if let Err(e) = run(command).await {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "npu_exporter=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if to_stderr {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(command: Commands) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    match command {
        Commands::Serve(args) => {
            let collector = build_collector(&args.common).await?;
            let result =
                run_api_mode(Arc::clone(&collector), args.listen_config(), shutdown_rx).await;
            collector.shutdown();
            result
        }
        Commands::Telegraf(args) => {
            let collector = build_collector(&args.common).await?;
            let result = run_telegraf_mode(Arc::clone(&collector), args.once, shutdown_rx).await;
            collector.shutdown();
            result
        }
        Commands::List(args) => {
            let collector = build_collector(&args).await?;
            let json = serde_json::to_string_pretty(collector.chips().as_slice())?;
            println!("{json}");
            collector.shutdown();
            Ok(())
        }
    }
}

fn load_driver(args: &CommonArgs) -> Result<Arc<dyn DcmiDriver>> {
    if let Some(devices) = args.mock_devices {
        info!("Simulating {devices} NPU(s) of type {}", args.mock_chip);
        return Ok(Arc::new(MockDcmi::new(devices, 1, &args.mock_chip)));
    }
    let library = match &args.dcmi_library {
        Some(path) => LibDcmi::load_from(path)?,
        None => LibDcmi::load()?,
    };
    Ok(Arc::new(library))
}

async fn build_collector(args: &CommonArgs) -> Result<Arc<NpuCollector>> {
    let config = args.to_config()?;
    let manager = Arc::new(DeviceManager::new(load_driver(args)?, RetryPolicy::default())?);

    let hccn = if args.mock_devices.is_some() {
        None
    } else {
        let tool = HccnTool::locate(&config.hccn_tool);
        if tool.is_none() && manager.dev_type().has_roce() {
            warn!(
                "{} not found, RoCE link and optical metrics are disabled",
                config.hccn_tool.display()
            );
        }
        tool
    };

    let devices = match &config.container {
        Some(container) => match RuntimeSource::connect(container, GrpcTimeouts::default()).await {
            Ok(source) => {
                let parser = Arc::new(DevicesParser::new(Arc::new(source)));
                if let Err(e) = parser.fetch_and_parse().await {
                    warn!("Initial container query failed: {e}");
                }
                Some(parser)
            }
            Err(e) => {
                warn!("Container attribution disabled: {e}");
                None
            }
        },
        None => None,
    };

    Ok(Arc::new(NpuCollector::new(manager, config, hccn, devices)?))
}

fn spawn_signal_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutting down");
        let _ = shutdown.send(true);
    });
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
