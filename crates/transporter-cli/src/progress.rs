use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::info;

use transporter_transfer::TransferProgress;

const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedAndEta {
    pub speed: String,
    pub eta: String,
}

/// Average throughput and time remaining after `elapsed_ms` of transfer.
pub fn format_speed_and_eta(bytes_sent: u64, total: u64, elapsed_ms: u64) -> SpeedAndEta {
    if bytes_sent == 0 || elapsed_ms == 0 {
        return SpeedAndEta {
            speed: "N/A".into(),
            eta: "N/A".into(),
        };
    }

    let per_second = (bytes_sent as f64 * 1000.0 / elapsed_ms as f64).round() as u64;
    let remaining = total.saturating_sub(bytes_sent);
    let eta_secs = (remaining as f64 * elapsed_ms as f64 / bytes_sent as f64 / 1000.0).round() as u64;

    SpeedAndEta {
        speed: format!("{}/s", format_bytes(per_second)),
        eta: format!("{}s", eta_secs),
    }
}

/// Decimal units, three significant digits, trailing zeros dropped.
pub fn format_bytes(bytes: u64) -> String {
    let mut exp = 0;
    let mut scale = 1u64;
    while bytes / scale >= 1000 && exp < UNITS.len() - 1 {
        scale *= 1000;
        exp += 1;
    }
    if exp == 0 {
        return format!("{} B", bytes);
    }

    let value = bytes as f64 / scale as f64;
    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };
    let mut text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{} {}", text, UNITS[exp])
}

/// Logs transfer progress on an interval until dropped.
pub struct ProgressReporter {
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(progress: Arc<TransferProgress>, interval: Duration) -> Self {
        let started = Instant::now();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (done, total) = progress.snapshot();
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let SpeedAndEta { speed, eta } = format_speed_and_eta(done, total, elapsed_ms);
                let percent = if total == 0 { 100 } else { done * 100 / total };
                info!("Uploading {}/{} bytes ({}%) | ETA: {} | Speed: {}", done, total, percent, eta, speed);
            }
        });
        Self { handle }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
