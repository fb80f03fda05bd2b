//! Flood detection for SEP
//!
//! Each endpoint keeps a smoothed round-trip-time estimate. When it climbs
//! over a threshold the connection is considered *flooded*, which tells the
//! application to send less. Leaving flood mode requires the estimate to stay
//! under the threshold for a time period that doubles with repeated flooding
//! and halves again after sustained good conditions.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default RTT at or above which a connection floods
pub const DEFAULT_FLOOD_THRESHOLD: Duration = Duration::from_millis(250);

/// Time period a fresh endpoint must stay under the threshold to recover
pub const DEFAULT_FLOOD_PERIOD: Duration = Duration::from_secs(10);

/// Upper bound for the time period
pub const MAX_FLOOD_PERIOD: Duration = Duration::from_secs(60);

/// Lower bound for the time period
pub const MIN_FLOOD_PERIOD: Duration = Duration::from_secs(1);

/// Good behaviour needed before the time period is halved
pub const DEFAULT_REVIEW_WINDOW: Duration = Duration::from_secs(10);

/// Weight given to each new sample
const SMOOTHING_FACTOR: f64 = 0.1;

/// How a new RTT sample is folded into the running estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RttSmoothing {
    /// `old + (old - sample) * 0.1`, the rule deployed engines use
    #[default]
    Damped,
    /// `old + (sample - old) * 0.1`, a conventional moving average
    Exponential,
}

impl RttSmoothing {
    /// Combine the previous estimate with a sample
    ///
    /// A zero estimate means "no estimate yet" and the sample is taken as-is.
    /// The result never goes below zero.
    pub fn apply(self, estimate: Duration, sample: Duration) -> Duration {
        if estimate.is_zero() {
            return sample;
        }

        let old = estimate.as_secs_f64();
        let new = sample.as_secs_f64();
        let next = match self {
            RttSmoothing::Damped => old + (old - new) * SMOOTHING_FACTOR,
            RttSmoothing::Exponential => old + (new - old) * SMOOTHING_FACTOR,
        };
        Duration::from_secs_f64(next.max(0.0))
    }
}

/// Tuning shared by every endpoint of a protocol instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodConfig {
    /// RTT at or above which a connection floods
    pub threshold: Duration,
    /// Starting time period
    pub initial_period: Duration,
    /// Cap for the time period when flooding repeats
    pub max_period: Duration,
    /// Floor for the time period after good behaviour
    pub min_period: Duration,
    /// Good behaviour needed before the time period is halved
    pub review_window: Duration,
    /// Estimate update rule
    pub smoothing: RttSmoothing,
}

impl Default for FloodConfig {
    fn default() -> Self {
        FloodConfig {
            threshold: DEFAULT_FLOOD_THRESHOLD,
            initial_period: DEFAULT_FLOOD_PERIOD,
            max_period: MAX_FLOOD_PERIOD,
            min_period: MIN_FLOOD_PERIOD,
            review_window: DEFAULT_REVIEW_WINDOW,
            smoothing: RttSmoothing::Damped,
        }
    }
}

/// Flood state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodState {
    Normal,
    Flooded,
}

/// What a sample did to the flood state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodTransition {
    /// Nothing changed
    Steady,
    /// Normal → Flooded, or a fresh spike while recovering
    Entered,
    /// Still flooded, but the estimate dropped under the threshold and the
    /// recovery clock restarted
    Recovering,
    /// Flooded → Normal
    Exited,
}

/// Per-endpoint RTT estimate and flood state machine
#[derive(Debug, Clone)]
pub struct FloodController {
    rtt: Duration,
    flooded: bool,
    period: Duration,
    exit_time: Instant,
    review_time: Instant,
}

impl FloodController {
    /// Create a controller with no RTT estimate
    pub fn new(config: &FloodConfig, now: Instant) -> Self {
        FloodController {
            rtt: Duration::ZERO,
            flooded: false,
            period: config.initial_period,
            exit_time: now,
            review_time: now,
        }
    }

    /// Current smoothed RTT, zero before the first sample
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn is_flooded(&self) -> bool {
        self.flooded
    }

    pub fn state(&self) -> FloodState {
        if self.flooded {
            FloodState::Flooded
        } else {
            FloodState::Normal
        }
    }

    /// Time the estimate must stay under the threshold before flooding ends
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Feed one RTT sample taken at `now`
    pub fn on_rtt_sample(
        &mut self,
        sample: Duration,
        now: Instant,
        config: &FloodConfig,
    ) -> FloodTransition {
        let old = self.rtt;
        let new = config.smoothing.apply(old, sample);
        self.rtt = new;

        let threshold = config.threshold;

        // A crossing while still recovering counts as a new episode.
        if old < threshold && threshold <= new {
            self.flooded = true;
            // Flooding again soon after the last episode makes the next one stickier.
            if now.saturating_duration_since(self.exit_time) < self.period {
                self.period = (self.period * 2).min(config.max_period);
            }
            return FloodTransition::Entered;
        }

        let mut transition = FloodTransition::Steady;

        if self.flooded && old > threshold && threshold >= new {
            self.exit_time = now;
            self.review_time = now;
            transition = FloodTransition::Recovering;
        }

        if self.flooded
            && new < threshold
            && now.saturating_duration_since(self.exit_time) > self.period
        {
            self.flooded = false;
            if now.saturating_duration_since(self.review_time) > config.review_window {
                self.period = (self.period / 2).max(config.min_period);
                self.review_time = now;
            }
            transition = FloodTransition::Exited;
        }

        transition
    }

    /// Snapshot for statistics
    pub fn stats(&self) -> FloodStats {
        FloodStats {
            rtt: self.rtt,
            state: self.state(),
            period: self.period,
        }
    }
}

/// Flood controller statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodStats {
    /// Smoothed round-trip time
    pub rtt: Duration,
    /// Current state
    pub state: FloodState,
    /// Current recovery time period
    pub period: Duration,
}
