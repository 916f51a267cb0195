// Clean Scheduler
// Periodic light_clean sweeps for one queue, run in the background

use crate::application::recovery::CleanReport;
use crate::application::worker::ShutdownToken;
use crate::application::WorkQueue;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Clean scheduler
///
/// Expired leases are only reclaimed when a sweep runs, so the interval is
/// the extra requeue latency on top of the visibility timeout.
pub struct CleanScheduler {
    queue: Arc<WorkQueue>,
    interval: Duration,
}

impl CleanScheduler {
    /// Create a new clean scheduler
    ///
    /// # Arguments
    /// * `queue` - Queue to sweep
    /// * `interval` - Time between sweeps (must be non-zero)
    pub fn new(queue: Arc<WorkQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Run the sweep loop until shutdown (background task)
    ///
    /// The first sweep happens one interval after start; call
    /// [`CleanScheduler::run_now`] first for a sweep at boot.
    ///
    /// Sweep errors are logged and the loop keeps going; a failed sweep is
    /// finished by the next one.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            queue = %self.queue.name(),
            interval_secs = self.interval.as_secs_f64(),
            "Clean scheduler started"
        );

        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {},
                _ = shutdown.wait() => break,
            }

            match self.queue.light_clean().await {
                Ok(report) => log_report(self.queue.name(), &report),
                Err(e) => {
                    error!(queue = %self.queue.name(), error = ?e, "Scheduled clean failed");
                }
            }
        }

        info!(queue = %self.queue.name(), "Clean scheduler stopped");
    }

    /// Run one sweep immediately (for manual trigger)
    pub async fn run_now(&self) -> Result<CleanReport> {
        let report = self.queue.light_clean().await?;
        log_report(self.queue.name(), &report);
        Ok(report)
    }
}

fn log_report(queue: &str, report: &CleanReport) {
    if report.repaired() > 0 || report.forgotten > 0 {
        info!(
            queue = %queue,
            scanned = report.scanned,
            requeued = report.requeued,
            already_removed = report.already_removed,
            forgotten = report.forgotten,
            recovered = report.recovered,
            "Clean repaired abandoned items"
        );
    } else {
        debug!(queue = %queue, scanned = report.scanned, "Clean found nothing to repair");
    }
}
