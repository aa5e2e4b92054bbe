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

//! Telegraf `execd`/`exec` input: line protocol batches on stdout.

mod line;

pub use line::{FieldValue, LinePoint, TelegrafPoints, NPU_MEASUREMENT};

use std::io::Write;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::collector::NpuCollector;
use crate::error::Result;

fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Writes one batch of lines and flushes, so `execd` sees whole batches.
pub fn write_batch(out: &mut impl Write, lines: &[String]) -> std::io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

fn emit(collector: &NpuCollector) -> Result<()> {
    let lines = collector.gather_telegraf(now_ns());
    debug!("Writing {} line(s)", lines.len());
    write_batch(&mut std::io::stdout().lock(), &lines)?;
    Ok(())
}

async fn collect_all(collector: &Arc<NpuCollector>) {
    let worker = Arc::clone(collector);
    if let Err(e) = tokio::task::spawn_blocking(move || worker.collect_once()).await {
        error!("Initial collection panicked: {e}");
    }
}

/// Emits a batch right away, then one per update interval until `shutdown`
/// flips. With `once`, stops after the first batch.
pub async fn run_telegraf_mode(
    collector: Arc<NpuCollector>,
    once: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    collect_all(&collector).await;
    emit(&collector)?;
    if once {
        return Ok(());
    }

    let period = collector.config().update_interval;
    info!("Telegraf mode, emitting every {period:?}");
    let handles = collector.start(shutdown.clone());

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = emit(&collector) {
                    // stdout gone, telegraf has stopped reading
                    error!("Failed to write metrics: {e}");
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    for handle in handles {
        handle.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch() {
        let mut buf = Vec::new();
        write_batch(&mut buf, &["a x=1i 1".to_string(), "b y=2i 1".to_string()]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a x=1i 1\nb y=2i 1\n");
    }

    #[test]
    fn test_now_is_positive() {
        assert!(now_ns() > 0);
    }
}
