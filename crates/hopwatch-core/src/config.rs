use crate::types::{MaxRounds, ParallelRequests, PayloadSize, TimeToLive};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Default values for configuration.
pub mod defaults {
    use std::time::Duration;

    /// The default value for `max-ttl`.
    pub const DEFAULT_MAX_TTL: u8 = 12;

    /// The default value for `timeout`.
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

    /// The default value for `base-delay`.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

    /// The default value for `min-delay`.
    pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(250);

    /// The default value for `high-loss-threshold`.
    pub const DEFAULT_HIGH_LOSS_THRESHOLD: f64 = 50_f64;

    /// The default value for `low-loss-threshold`.
    pub const DEFAULT_LOW_LOSS_THRESHOLD: f64 = 10_f64;

    /// The default value for `payload-size`.
    pub const DEFAULT_PAYLOAD_SIZE: u16 = 32;

    /// The default value for `parallel-requests`.
    pub const DEFAULT_PARALLEL_REQUESTS: u8 = 1;

    /// The default value for `dont-fragment`.
    pub const DEFAULT_DONT_FRAGMENT: bool = false;

    /// The default value for `max-samples`.
    pub const DEFAULT_MAX_SAMPLES: usize = 1024;

    /// The default value for `count` when pinging.
    pub const DEFAULT_PING_COUNT: usize = 4;

    /// The time-to-live used for ping probes.
    pub const DEFAULT_PING_TTL: u8 = 128;
}

/// The lifecycle state of a trace.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum TraceState {
    /// No trace is running.
    #[default]
    Idle,
    /// A trace is running.
    Tracing,
    /// A trace has been asked to stop and will become `Idle` shortly.
    Stopping,
}

impl TraceState {
    /// Is a trace running or winding down?
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl Display for TraceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Tracing => write!(f, "tracing"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Configuration of a trace.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TraceConfig {
    pub max_ttl: TimeToLive,
    pub timeout: Duration,
    pub payload_size: PayloadSize,
    pub parallel_requests: ParallelRequests,
    pub dont_fragment: bool,
    pub max_samples: usize,
    pub max_rounds: Option<MaxRounds>,
    pub pacing: PacingConfig,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_ttl: TimeToLive(defaults::DEFAULT_MAX_TTL),
            timeout: defaults::DEFAULT_PROBE_TIMEOUT,
            payload_size: PayloadSize(defaults::DEFAULT_PAYLOAD_SIZE),
            parallel_requests: ParallelRequests(defaults::DEFAULT_PARALLEL_REQUESTS),
            dont_fragment: defaults::DEFAULT_DONT_FRAGMENT,
            max_samples: defaults::DEFAULT_MAX_SAMPLES,
            max_rounds: None,
            pacing: PacingConfig::default(),
        }
    }
}

/// Configuration of the delay between rounds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PacingConfig {
    /// The delay used when loss is between the thresholds.
    pub base_delay: Duration,
    /// The shortest delay used when loss is low.
    pub min_delay: Duration,
    /// The longest delay used when loss is high.
    pub max_delay: Duration,
    /// Loss percentage above which the delay is lengthened.
    pub high_loss_threshold: f64,
    /// Loss percentage below which the delay is shortened.
    pub low_loss_threshold: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: defaults::DEFAULT_BASE_DELAY,
            min_delay: defaults::DEFAULT_MIN_DELAY,
            max_delay: defaults::DEFAULT_PROBE_TIMEOUT,
            high_loss_threshold: defaults::DEFAULT_HIGH_LOSS_THRESHOLD,
            low_loss_threshold: defaults::DEFAULT_LOW_LOSS_THRESHOLD,
        }
    }
}
