use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Derived statistics for a single hop.
///
/// Round trip times are in milliseconds and are computed over the retained
/// samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HopStatistics {
    /// The number of probes attributed to the hop.
    pub sent: usize,
    /// The number of replies received from the hop.
    pub received: usize,
    /// The best round trip time.
    pub min: u64,
    /// The worst round trip time.
    pub max: u64,
    /// The mean round trip time.
    pub avg: f64,
    /// The most recent round trip time.
    pub last: u64,
    /// The percentage of probes which received no reply.
    pub loss_pct: f64,
    /// The mean absolute difference between consecutive round trip times.
    pub jitter: f64,
    /// The standard deviation of the round trip times.
    pub stddev: f64,
}

/// A concurrency-safe accumulator of probe outcomes for one responding address.
///
/// Statistics are computed lazily and cached until the next [`HopData::record`].
#[derive(Debug)]
pub struct HopData {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sent: usize,
    received: usize,
    samples: VecDeque<u64>,
    last: u64,
    max_samples: usize,
    cached: Option<HopStatistics>,
}

impl HopData {
    /// Create an empty `HopData` retaining at most `max_samples` samples.
    #[must_use]
    pub fn new(max_samples: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sent: 0,
                received: 0,
                samples: VecDeque::new(),
                last: 0,
                max_samples: max_samples.max(1),
                cached: None,
            }),
        }
    }

    /// Record the outcome of one probe.
    pub fn record(&self, responded: bool, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.sent += 1;
        if responded {
            let sample = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            inner.received += 1;
            if inner.samples.len() == inner.max_samples {
                inner.samples.pop_front();
            }
            inner.samples.push_back(sample);
            inner.last = sample;
        }
        inner.cached = None;
    }

    /// The current statistics, recomputed only if a probe has been recorded
    /// since the last call.
    #[must_use]
    pub fn statistics(&self) -> HopStatistics {
        let mut inner = self.inner.lock();
        if let Some(stats) = inner.cached {
            return stats;
        }
        let stats = inner.compute();
        inner.cached = Some(stats);
        stats
    }

    /// The number of probes attributed to this hop.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.inner.lock().sent
    }

    /// The number of replies received from this hop.
    #[must_use]
    pub fn received(&self) -> usize {
        self.inner.lock().received
    }

    /// Returns `(sent, received)` read under a single lock.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.sent, inner.received)
    }
}

impl Inner {
    fn compute(&self) -> HopStatistics {
        let loss_pct = loss_pct(self.sent, self.received);
        if self.samples.is_empty() {
            return HopStatistics {
                sent: self.sent,
                received: self.received,
                loss_pct,
                ..HopStatistics::default()
            };
        }
        let count = self.samples.len() as f64;
        let min = self.samples.iter().copied().min().unwrap_or_default();
        let max = self.samples.iter().copied().max().unwrap_or_default();
        let avg = self.samples.iter().sum::<u64>() as f64 / count;
        let variance = self
            .samples
            .iter()
            .map(|&s| (s as f64 - avg).powi(2))
            .sum::<f64>()
            / count;
        HopStatistics {
            sent: self.sent,
            received: self.received,
            min,
            max,
            avg,
            last: self.last,
            loss_pct,
            jitter: jitter(self.samples.iter().copied()),
            stddev: variance.sqrt(),
        }
    }
}

/// The loss percentage for `sent` probes of which `received` were answered.
#[must_use]
pub fn loss_pct(sent: usize, received: usize) -> f64 {
    if sent == 0 {
        0_f64
    } else {
        (sent.saturating_sub(received)) as f64 / sent as f64 * 100_f64
    }
}

/// The mean absolute difference between consecutive samples.
#[must_use]
pub fn jitter(samples: impl IntoIterator<Item = u64>) -> f64 {
    let mut iter = samples.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0_f64;
    };
    let (total, count) = iter.fold((0_u64, 0_usize), |(total, count), sample| {
        let diff = sample.abs_diff(prev);
        prev = sample;
        (total + diff, count + 1)
    });
    if count == 0 {
        0_f64
    } else {
        total as f64 / count as f64
    }
}
