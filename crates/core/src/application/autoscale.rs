// Autoscale - worker counts from queue backlog
//
// Units of `target`, `spot_target`, `run` and `spinup` only need to agree
// with each other (seconds, ticks, ...).

use crate::application::worker::constants::{DEFAULT_MAX_FAST, DEFAULT_SLOWDOWN_WINDOW};
use crate::application::WorkQueue;
use crate::error::{AppError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Worker counts per pool.
///
/// `base` workers are always on, `fast` workers are added for backlog and
/// `spot` workers are cheaper but slower to trust.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounts {
    pub base: i32,
    pub fast: i32,
    pub spot: i32,
}

impl WorkerCounts {
    pub fn new(base: i32, fast: i32, spot: i32) -> Self {
        Self { base, fast, spot }
    }

    pub fn total(&self) -> i64 {
        i64::from(self.base) + i64::from(self.fast) + i64::from(self.spot)
    }
}

fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Decides how many workers a backlog needs
#[derive(Debug, Clone, Copy)]
pub struct Calculator {
    /// Time to drain the queue without spot workers
    target: i32,
    /// Time to drain the queue with spot workers
    spot_target: i32,
    /// Time one item takes on one worker
    run: i32,
    /// Time from a scale request until the new workers are ready
    spinup: i32,
}

impl Calculator {
    pub fn new(target: i32, spot_target: i32, run: i32, spinup: i32) -> Result<Self> {
        if target <= 0 || spot_target <= 0 || run <= 0 {
            return Err(AppError::Validation(format!(
                "target ({}), spot_target ({}) and run ({}) must be positive",
                target, spot_target, run
            )));
        }
        if spinup < 0 {
            return Err(AppError::Validation(format!(
                "spinup must not be negative, got {}",
                spinup
            )));
        }
        Ok(Self {
            target,
            spot_target,
            run,
            spinup,
        })
    }

    /// Time to drain `queue_len` items with base and fast workers.
    /// `i32::MAX` when there are none.
    pub fn will_take(&self, counts: WorkerCounts, queue_len: i32) -> i32 {
        self.drain_time(i64::from(counts.base) + i64::from(counts.fast), queue_len)
    }

    /// Time to drain `queue_len` items with every worker, spot included
    pub fn will_take_with_spot(&self, counts: WorkerCounts, queue_len: i32) -> i32 {
        self.drain_time(counts.total(), queue_len)
    }

    fn drain_time(&self, workers: i64, queue_len: i32) -> i32 {
        if workers <= 0 {
            return i32::MAX;
        }
        saturate(i64::from(queue_len) * i64::from(self.run) / workers)
    }

    /// Worker counts wanted for `queue_len` items, given the requested
    /// `counts` and the `ready` subset of them.
    ///
    /// An empty queue drops back to base workers. Otherwise fast workers
    /// are sized for `target`, spot workers for `spot_target`, and there is
    /// always at least one worker that can take items.
    pub fn calc(&self, counts: WorkerCounts, ready: WorkerCounts, queue_len: i32) -> WorkerCounts {
        if queue_len <= 0 {
            return WorkerCounts::new(counts.base, 0, 0);
        }

        let qlen = i64::from(queue_len);
        let run = i64::from(self.run);
        let spinup = i64::from(self.spinup);
        let target = i64::from(self.target);
        let spot_target = i64::from(self.spot_target);
        let base = i64::from(counts.base);

        // Backlog left once the ready workers have run for one spinup
        let shorter = qlen - (i64::from(ready.base) + i64::from(ready.fast)) * spinup / run;
        let shorter_spot = qlen - ready.total() * spinup / run;

        let will_take = i64::from(self.will_take(ready, queue_len));
        let will_take_when_ready = i64::from(self.will_take(counts, queue_len));

        let mut fast = i64::from(counts.fast);
        if will_take_when_ready > spinup && will_take_when_ready > target {
            // Size base + fast so the shorter backlog drains in `target`;
            // never shrink while new workers are still spinning up
            fast = fast.max(shorter * run / target - base);
        } else if will_take < target {
            fast = qlen * run / target - base;
        }
        fast = fast.max(0);
        if (counts.base == 0 || ready.base == 0) && fast == 0 {
            fast = 1;
        }

        let mut next = WorkerCounts::new(counts.base, saturate(fast), counts.spot);

        let will_take_spot = i64::from(self.will_take_with_spot(ready, queue_len));
        let will_take_spot_when_ready = i64::from(self.will_take_with_spot(next, queue_len));

        let mut spot = i64::from(counts.spot);
        if will_take_when_ready > spinup && will_take_spot_when_ready > spot_target {
            spot = spot.max(shorter_spot * run / spot_target - base - fast);
        } else if will_take_spot < spot_target {
            spot = qlen * run / spot_target - base - fast;
        }
        next.spot = saturate(spot.max(0));

        next
    }
}

/// Delays down-scaling without slowing up-scaling.
///
/// `push` a request on every tick, then apply `scale_to`. A pool that would
/// shrink is only shrunk to the largest of the last `window` requests.
#[derive(Debug, Clone)]
pub struct SlowDown {
    requests: VecDeque<WorkerCounts>,
    window: usize,
}

impl SlowDown {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            requests: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn push(&mut self, counts: WorkerCounts) {
        if self.requests.len() == self.window {
            self.requests.pop_front();
        }
        self.requests.push_back(counts);
    }

    /// Counts to actually apply, given what is running now
    pub fn scale_to(&self, current: WorkerCounts) -> WorkerCounts {
        let Some(&latest) = self.requests.back() else {
            return current;
        };

        let held = |pick: fn(&WorkerCounts) -> i32, requested: i32, running: i32| {
            if requested < running {
                self.requests.iter().map(pick).max().unwrap_or(requested)
            } else {
                requested
            }
        };

        WorkerCounts {
            base: held(|c| c.base, latest.base, current.base),
            fast: held(|c| c.fast, latest.fast, current.fast),
            spot: held(|c| c.spot, latest.spot, current.spot),
        }
    }
}

/// Turns the backlog of one queue into worker counts, one tick at a time.
///
/// Applying the counts (starting or stopping workers) is left to the
/// caller. Call `tick` on a fixed interval so the slow-down window spans a
/// known time.
pub struct AutoScaler {
    queue: Arc<WorkQueue>,
    calculator: Calculator,
    slowdown: SlowDown,
    max_fast: i32,
}

impl AutoScaler {
    pub fn new(queue: Arc<WorkQueue>, calculator: Calculator) -> Self {
        Self {
            queue,
            calculator,
            slowdown: SlowDown::new(DEFAULT_SLOWDOWN_WINDOW),
            max_fast: DEFAULT_MAX_FAST,
        }
    }

    pub fn with_slowdown_window(mut self, window: usize) -> Self {
        self.slowdown = SlowDown::new(window);
        self
    }

    pub fn with_max_fast(mut self, max_fast: i32) -> Self {
        self.max_fast = max_fast.max(0);
        self
    }

    /// Read the backlog and decide the next worker counts
    ///
    /// # Arguments
    /// * `current` - Counts currently requested
    /// * `ready` - Workers among `current` that are up and leasing
    pub async fn tick(&mut self, current: WorkerCounts, ready: WorkerCounts) -> Result<WorkerCounts> {
        let backlog = self.queue.queue_len().await?;
        let queue_len = i32::try_from(backlog).unwrap_or(i32::MAX);

        let wanted = self.calculator.calc(current, ready, queue_len);
        self.slowdown.push(wanted);
        let mut next = self.slowdown.scale_to(current);

        // Fast pool is capped after smoothing; the overflow goes to spot
        if next.fast > self.max_fast {
            next.spot = next.spot.saturating_add(next.fast - self.max_fast);
            next.fast = self.max_fast;
        }

        debug!(
            queue = %self.queue.name(),
            queue_len,
            wanted = ?wanted,
            "Autoscale tick"
        );
        if next != current {
            info!(
                queue = %self.queue.name(),
                queue_len,
                base = next.base,
                fast = next.fast,
                spot = next.spot,
                "Scaling workers"
            );
        }

        Ok(next)
    }
}
