//! # Cumulative Accumulator
//!
//! Per-stream running average with threshold latching.
//!
//! Each ingest pre-increments the sample count and applies
//!
//! ```text
//! avg = avg + (sample - avg) / count
//! ```
//!
//! which yields the arithmetic mean with O(1) state. A reset sets the count to
//! 1 and clears the average inside the same ingest, so the sample that caused
//! the reset becomes the new average exactly.

use tracing::debug;

/// One cumulative-average step
///
/// # Examples
///
/// ```
/// use irradiance_node::telemetry::accumulator::cumulative_update;
///
/// let mut avg = 0.0;
/// for (count, sample) in [10.0, 20.0, 30.0].into_iter().enumerate() {
///     cumulative_update(&mut avg, sample, count as u32 + 1);
/// }
/// assert!((avg - 20.0).abs() < 1e-6);
/// ```
pub fn cumulative_update(avg: &mut f32, sample: f32, count: u32) {
    debug_assert!(count > 0);
    *avg += (sample - *avg) / count as f32;
}

/// When a stream starts a new accumulation window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Restart on the ingest after the window completes, consumed or not
    EveryWindow,
    /// Hold the latched value until consumed; if `stale_after` is set, evict it
    /// once the count passes that bound without a consumer
    HoldUntilConsumed { stale_after: Option<u32> },
}

/// Why a window was restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// Previous value was consumed
    Consumed,
    /// Previous value sat unconsumed past the stale bound
    Stale,
    /// Window completed
    WindowComplete,
}

/// What one ingest did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Sample folded into the average; `count` is the divisor used
    Accumulated { count: u32 },
    /// Sample folded in and the window completed on it
    Latched { count: u32 },
    /// Sample ignored because a latched value awaits its consumer
    Holding,
}

impl StreamStatus {
    /// Divisor used for this sample, if it was accumulated
    pub fn divisor(&self) -> Option<u32> {
        match *self {
            StreamStatus::Accumulated { count } | StreamStatus::Latched { count } => Some(count),
            StreamStatus::Holding => None,
        }
    }
}

/// Result of [`AccumulatorState::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub reset: Option<ResetCause>,
    pub status: StreamStatus,
}

/// Running average for one destination stream
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorState {
    running_avg: f32,
    sample_count: u32,
    threshold: u32,
    ready: bool,
    policy: ResetPolicy,
}

impl AccumulatorState {
    /// New empty stream latching after `threshold` samples
    ///
    /// `threshold` is clamped to at least 1. A stale bound at or below the
    /// threshold would evict before the latch could be seen, so it is raised
    /// to `threshold + 1`.
    pub fn new(threshold: u32, policy: ResetPolicy) -> Self {
        let threshold = threshold.max(1);
        let policy = match policy {
            ResetPolicy::HoldUntilConsumed { stale_after: Some(stale) } => ResetPolicy::HoldUntilConsumed {
                stale_after: Some(stale.max(threshold.saturating_add(1))),
            },
            other => other,
        };

        Self {
            running_avg: 0.0,
            sample_count: 0,
            threshold,
            ready: false,
            policy,
        }
    }

    pub fn running_avg(&self) -> f32 {
        self.running_avg
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    /// True between the latching sample and consumption (or reset)
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Highest count the stream holds between ingests
    pub fn max_count(&self) -> u32 {
        match self.policy {
            ResetPolicy::EveryWindow => self.threshold,
            ResetPolicy::HoldUntilConsumed { stale_after: Some(stale) } => stale,
            ResetPolicy::HoldUntilConsumed { stale_after: None } => self.threshold.saturating_add(1),
        }
    }

    /// Count at which the reset check must fire
    fn count_ceiling(&self) -> u32 {
        match self.policy {
            ResetPolicy::HoldUntilConsumed { stale_after: Some(stale) } => stale.saturating_add(1),
            _ => self.threshold.saturating_add(1),
        }
    }

    /// Fold one sample in
    pub fn ingest(&mut self, sample: f32) -> Tick {
        self.sample_count = self.sample_count.saturating_add(1).min(self.count_ceiling());

        let reset = self.reset_cause();
        if let Some(cause) = reset {
            debug!(
                "Accumulator reset ({:?}) at count {}, threshold {}",
                cause, self.sample_count, self.threshold
            );
            self.reset();
        }

        let status = if self.ready {
            StreamStatus::Holding
        } else {
            cumulative_update(&mut self.running_avg, sample, self.sample_count);
            if self.sample_count >= self.threshold {
                self.ready = true;
                StreamStatus::Latched { count: self.sample_count }
            } else {
                StreamStatus::Accumulated { count: self.sample_count }
            }
        };

        Tick { reset, status }
    }

    /// Hand the latched average to its consumer
    ///
    /// Returns `None` if nothing is latched. The window restarts on the next ingest.
    pub fn consume(&mut self) -> Option<f32> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        Some(self.running_avg)
    }

    fn reset_cause(&self) -> Option<ResetCause> {
        let past_threshold = self.sample_count > self.threshold;

        match self.policy {
            ResetPolicy::EveryWindow if past_threshold => Some(ResetCause::WindowComplete),
            ResetPolicy::EveryWindow => None,
            ResetPolicy::HoldUntilConsumed { stale_after } => {
                if !self.ready && past_threshold {
                    Some(ResetCause::Consumed)
                } else if self.ready && stale_after.is_some_and(|stale| self.sample_count > stale) {
                    Some(ResetCause::Stale)
                } else {
                    None
                }
            }
        }
    }

    fn reset(&mut self) {
        self.running_avg = 0.0;
        self.sample_count = 1;
        self.ready = false;
    }
}
