//! Link Monitor
//!
//! Emits a link-status line at a fixed interval from inside the receive
//! loop. It only reads [`LinkStatus`] snapshots and never touches actuation.

use gatelink_shared::LinkStatus;
use tokio::time::{Duration, Instant};
use tracing::info;

/// Rate-limited link-status reporter
#[derive(Debug)]
pub struct LinkMonitor {
    interval: Duration,
    last_report: Instant,
    reports: u64,
}

impl LinkMonitor {
    /// Create a monitor whose first report is due one interval from now
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: Instant::now(),
            reports: 0,
        }
    }

    /// Whether a report is due
    pub fn is_due(&self) -> bool {
        self.last_report.elapsed() >= self.interval
    }

    /// Number of reports emitted so far
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Log the status if the interval has elapsed; returns true when a report was emitted
    pub fn check(&mut self, status: &LinkStatus) -> bool {
        if !self.is_due() {
            return false;
        }

        info!("[DIAG] {}", status);
        self.last_report = Instant::now();
        self.reports += 1;
        true
    }
}
