use crate::config::{PacingConfig, TraceConfig};
use crate::constants::{MAX_PARALLEL_REQUESTS, MAX_PAYLOAD_SIZE, MAX_TTL};
use crate::error::{Error, Result};
use crate::net::IcmpProbeSender;
use crate::observer::{NoopObserver, TraceObserver};
use crate::probe::ProbeSender;
use crate::types::{MaxRounds, ParallelRequests, PayloadSize, TimeToLive};
use crate::TraceCoordinator;
use hopwatch_dns::DnsResolver;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Build a trace coordinator.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use hopwatch_core::Builder;
/// use std::time::Duration;
///
/// let coordinator = Builder::new()
///     .max_ttl(30)
///     .timeout(Duration::from_secs(2))
///     .parallel_requests(3)
///     .build()?;
/// coordinator.start("1.1.1.1")?;
/// # Ok(())
/// # }
/// ```
///
/// # See Also
///
/// - [`TraceCoordinator`] - Runs the trace.
pub struct Builder {
    max_ttl: TimeToLive,
    timeout: Duration,
    payload_size: PayloadSize,
    parallel_requests: ParallelRequests,
    dont_fragment: bool,
    max_samples: usize,
    max_rounds: Option<MaxRounds>,
    base_delay: Duration,
    min_delay: Duration,
    max_delay: Option<Duration>,
    high_loss_threshold: f64,
    low_loss_threshold: f64,
    dns_config: hopwatch_dns::Config,
    resolver: Option<DnsResolver>,
    sender: Option<Arc<dyn ProbeSender>>,
    observer: Arc<dyn TraceObserver>,
}

impl Default for Builder {
    fn default() -> Self {
        let config = TraceConfig::default();
        Self {
            max_ttl: config.max_ttl,
            timeout: config.timeout,
            payload_size: config.payload_size,
            parallel_requests: config.parallel_requests,
            dont_fragment: config.dont_fragment,
            max_samples: config.max_samples,
            max_rounds: config.max_rounds,
            base_delay: config.pacing.base_delay,
            min_delay: config.pacing.min_delay,
            max_delay: None,
            high_loss_threshold: config.pacing.high_loss_threshold,
            low_loss_threshold: config.pacing.low_loss_threshold,
            dns_config: hopwatch_dns::Config::default(),
            resolver: None,
            sender: None,
            observer: Arc::new(NoopObserver),
        }
    }
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest ttl probed in each round.
    #[must_use]
    pub fn max_ttl(self, max_ttl: u8) -> Self {
        Self {
            max_ttl: TimeToLive(max_ttl),
            ..self
        }
    }

    /// Set how long each probe waits for a reply.
    ///
    /// If no maximum delay has been set then this also caps the delay
    /// between rounds.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Set the size of the echo request payload.
    #[must_use]
    pub fn payload_size(self, payload_size: u16) -> Self {
        Self {
            payload_size: PayloadSize(payload_size),
            ..self
        }
    }

    /// Set the number of probes sent concurrently for each ttl.
    #[must_use]
    pub fn parallel_requests(self, parallel_requests: u8) -> Self {
        Self {
            parallel_requests: ParallelRequests(parallel_requests),
            ..self
        }
    }

    /// Set the IPv4 don't fragment flag on probes.
    #[must_use]
    pub fn dont_fragment(self, dont_fragment: bool) -> Self {
        Self {
            dont_fragment,
            ..self
        }
    }

    /// Set the number of round trip time samples retained per hop.
    #[must_use]
    pub fn max_samples(self, max_samples: usize) -> Self {
        Self {
            max_samples,
            ..self
        }
    }

    /// Set the number of rounds after which a trace ends on its own.
    ///
    /// `None` (or `Some(0)`) runs until stopped.
    #[must_use]
    pub fn max_rounds(self, max_rounds: Option<usize>) -> Self {
        Self {
            max_rounds: max_rounds.and_then(NonZeroUsize::new).map(MaxRounds),
            ..self
        }
    }

    /// Set the delay between rounds used when loss is moderate.
    #[must_use]
    pub fn base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }

    /// Set the shortest delay between rounds.
    #[must_use]
    pub fn min_delay(self, min_delay: Duration) -> Self {
        Self { min_delay, ..self }
    }

    /// Set the longest delay between rounds, which defaults to the probe
    /// timeout.
    #[must_use]
    pub fn max_delay(self, max_delay: Duration) -> Self {
        Self {
            max_delay: Some(max_delay),
            ..self
        }
    }

    /// Set the loss percentage above which the delay is lengthened.
    #[must_use]
    pub fn high_loss_threshold(self, high_loss_threshold: f64) -> Self {
        Self {
            high_loss_threshold,
            ..self
        }
    }

    /// Set the loss percentage below which the delay is shortened.
    #[must_use]
    pub fn low_loss_threshold(self, low_loss_threshold: f64) -> Self {
        Self {
            low_loss_threshold,
            ..self
        }
    }

    /// Set the configuration of the resolver started by [`Builder::build`].
    ///
    /// Ignored if a resolver is provided with [`Builder::resolver`].
    #[must_use]
    pub fn dns_config(self, dns_config: hopwatch_dns::Config) -> Self {
        Self { dns_config, ..self }
    }

    /// Use an existing resolver.
    #[must_use]
    pub fn resolver(self, resolver: DnsResolver) -> Self {
        Self {
            resolver: Some(resolver),
            ..self
        }
    }

    /// Send probes with a custom [`ProbeSender`] rather than raw ICMP
    /// sockets.
    #[must_use]
    pub fn probe_sender<S: ProbeSender + 'static>(self, sender: S) -> Self {
        Self {
            sender: Some(Arc::new(sender)),
            ..self
        }
    }

    /// Publish updates to `observer`.
    #[must_use]
    pub fn observer<O: TraceObserver + 'static>(self, observer: O) -> Self {
        Self {
            observer: Arc::new(observer),
            ..self
        }
    }

    /// As [`Builder::observer`] for a shared observer.
    #[must_use]
    pub fn observer_arc(self, observer: Arc<dyn TraceObserver>) -> Self {
        Self { observer, ..self }
    }

    /// Build the [`TraceCoordinator`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadConfig`] if the configuration is invalid and
    /// [`Error::DnsError`] if the resolver cannot be started.
    pub fn build(self) -> Result<TraceCoordinator> {
        let config = self.trace_config()?;
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => DnsResolver::start(self.dns_config)?,
        };
        let sender = self
            .sender
            .unwrap_or_else(|| Arc::new(IcmpProbeSender::new()));
        Ok(TraceCoordinator::new(config, sender, resolver, self.observer))
    }

    fn trace_config(&self) -> Result<TraceConfig> {
        if self.max_ttl.0 == 0 || self.max_ttl.0 > MAX_TTL {
            return Err(Error::BadConfig(format!(
                "max_ttl {} must be between 1 and {MAX_TTL}",
                self.max_ttl.0
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::BadConfig(String::from("timeout must be positive")));
        }
        if self.payload_size.0 > MAX_PAYLOAD_SIZE {
            return Err(Error::BadConfig(format!(
                "payload_size {} > {MAX_PAYLOAD_SIZE}",
                self.payload_size.0
            )));
        }
        if self.parallel_requests.0 == 0 || self.parallel_requests.0 > MAX_PARALLEL_REQUESTS {
            return Err(Error::BadConfig(format!(
                "parallel_requests {} must be between 1 and {MAX_PARALLEL_REQUESTS}",
                self.parallel_requests.0
            )));
        }
        if self.max_samples == 0 {
            return Err(Error::BadConfig(String::from("max_samples must be positive")));
        }
        let max_delay = self.max_delay.unwrap_or(self.timeout);
        if self.min_delay > max_delay {
            return Err(Error::BadConfig(format!(
                "min_delay {:?} > max_delay {max_delay:?}",
                self.min_delay
            )));
        }
        if self.base_delay < self.min_delay || self.base_delay > max_delay {
            return Err(Error::BadConfig(format!(
                "base_delay {:?} must be between min_delay {:?} and max_delay {max_delay:?}",
                self.base_delay, self.min_delay
            )));
        }
        for (name, value) in [
            ("high_loss_threshold", self.high_loss_threshold),
            ("low_loss_threshold", self.low_loss_threshold),
        ] {
            if !(0_f64..=100_f64).contains(&value) {
                return Err(Error::BadConfig(format!(
                    "{name} {value} must be between 0 and 100"
                )));
            }
        }
        if self.low_loss_threshold > self.high_loss_threshold {
            return Err(Error::BadConfig(format!(
                "low_loss_threshold {} > high_loss_threshold {}",
                self.low_loss_threshold, self.high_loss_threshold
            )));
        }
        Ok(TraceConfig {
            max_ttl: self.max_ttl,
            timeout: self.timeout,
            payload_size: self.payload_size,
            parallel_requests: self.parallel_requests,
            dont_fragment: self.dont_fragment,
            max_samples: self.max_samples,
            max_rounds: self.max_rounds,
            pacing: PacingConfig {
                base_delay: self.base_delay,
                min_delay: self.min_delay,
                max_delay,
                high_loss_threshold: self.high_loss_threshold,
                low_loss_threshold: self.low_loss_threshold,
            },
        })
    }
}
