use crate::cancel::Cancellation;
use crate::config::defaults;
use crate::error::{Error, Result};
use crate::hop::{HopData, HopStatistics};
use crate::probe::{ProbeReply, ProbeRequest, ProbeSender, ProbeStatus};
use crate::types::{PayloadSize, TimeToLive};
use chrono::{DateTime, Local};
use hopwatch_dns::DnsResolver;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Sends a fixed number of sequential probes to a single target.
pub struct Pinger {
    sender: Arc<dyn ProbeSender>,
    resolver: DnsResolver,
    payload_size: PayloadSize,
}

impl Pinger {
    #[must_use]
    pub fn new(sender: Arc<dyn ProbeSender>, resolver: DnsResolver) -> Self {
        Self {
            sender,
            resolver,
            payload_size: PayloadSize(defaults::DEFAULT_PAYLOAD_SIZE),
        }
    }

    #[must_use]
    pub fn with_payload_size(self, payload_size: u16) -> Self {
        Self {
            payload_size: PayloadSize(payload_size),
            ..self
        }
    }

    /// Send `count` probes to `host`, one after another.
    ///
    /// Each probe is followed by a wait of whatever remains of `timeout`, so
    /// that probes are sent roughly `timeout` apart.  If `cancel` is signalled
    /// the probes sent so far are returned in a report flagged as cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadConfig`] for an empty host, a zero count or a zero
    /// timeout and [`Error::UnknownHost`] if the host cannot be resolved.
    #[instrument(skip(self, cancel), level = "trace")]
    pub fn run(
        &self,
        host: &str,
        count: usize,
        timeout: Duration,
        dont_fragment: bool,
        cancel: &Cancellation,
    ) -> Result<PingReport> {
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::BadConfig(String::from("target host may not be empty")));
        }
        if count == 0 {
            return Err(Error::BadConfig(String::from("count must be positive")));
        }
        if timeout.is_zero() {
            return Err(Error::BadConfig(String::from("timeout must be positive")));
        }
        let addr = match IpAddr::from_str(host) {
            Ok(addr) => addr,
            Err(_) => self
                .resolver
                .lookup(host)
                .map_err(|err| Error::UnknownHost(host.to_string(), err))?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Other(format!("no address for {host}")))?,
        };
        let request = ProbeRequest {
            target: addr,
            ttl: TimeToLive(defaults::DEFAULT_PING_TTL),
            timeout,
            payload_size: self.payload_size,
            dont_fragment,
        };
        let started = Local::now();
        let hop = HopData::new(count);
        let mut replies = Vec::new();
        let mut cancelled = false;
        for seq in 1..=count {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let sent = Instant::now();
            let reply = self.sender.send(&request);
            tracing::debug!(seq, status = %reply.status, elapsed = ?reply.elapsed);
            hop.record(reply.status == ProbeStatus::Success, reply.elapsed);
            replies.push(reply);
            if seq < count && cancel.wait_timeout(timeout.saturating_sub(sent.elapsed())) {
                cancelled = true;
                break;
            }
        }
        Ok(PingReport {
            host: host.to_string(),
            addr,
            payload_size: self.payload_size.0,
            started,
            finished: Local::now(),
            replies,
            stats: hop.statistics(),
            cancelled,
        })
    }
}

/// The result of a [`Pinger::run`].
#[derive(Debug, Clone)]
pub struct PingReport {
    pub host: String,
    pub addr: IpAddr,
    pub payload_size: u16,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    /// The reply to each probe, in the order sent.
    pub replies: Vec<ProbeReply>,
    /// Statistics over replies from the target.
    pub stats: HopStatistics,
    /// Whether the run was cancelled before all probes were sent.
    pub cancelled: bool,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Display for PingReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Pinging {} [{}] with {} bytes of data:",
            self.host, self.addr, self.payload_size
        )?;
        writeln!(f, "Started at {}", self.started.format(TIMESTAMP_FORMAT))?;
        for (i, reply) in self.replies.iter().enumerate() {
            let seq = i + 1;
            match (reply.status, reply.addr) {
                (ProbeStatus::Success, Some(addr)) => writeln!(
                    f,
                    "Reply from {addr}: seq={seq} time={}ms",
                    reply.elapsed.as_millis()
                )?,
                (ProbeStatus::Success, None) => writeln!(
                    f,
                    "Reply: seq={seq} time={}ms",
                    reply.elapsed.as_millis()
                )?,
                (ProbeStatus::TtlExpired, Some(addr)) => {
                    writeln!(f, "Reply from {addr}: seq={seq} ttl expired in transit")?;
                }
                (ProbeStatus::TimedOut, _) => writeln!(f, "Request timed out: seq={seq}")?,
                _ => writeln!(f, "Request failed: seq={seq}")?,
            }
        }
        if self.cancelled {
            writeln!(f, "Cancelled at {}", self.finished.format(TIMESTAMP_FORMAT))?;
        } else {
            writeln!(f, "Finished at {}", self.finished.format(TIMESTAMP_FORMAT))?;
        }
        let stats = &self.stats;
        writeln!(
            f,
            "Packets: sent={}, received={}, lost={} ({:.1}% loss)",
            stats.sent,
            stats.received,
            stats.sent - stats.received,
            stats.loss_pct
        )?;
        if stats.received > 0 {
            writeln!(
                f,
                "Round trip times: min={}ms, max={}ms, avg={:.1}ms, jitter={:.1}ms",
                stats.min, stats.max, stats.avg, stats.jitter
            )?;
        }
        Ok(())
    }
}
