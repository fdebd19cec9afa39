use crate::types::{PayloadSize, TimeToLive};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::time::Duration;

/// A request to send a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    /// The address to probe.
    pub target: IpAddr,
    /// The time-to-live (hop limit) of the probe.
    pub ttl: TimeToLive,
    /// How long to wait for a reply.
    pub timeout: Duration,
    /// The size of the echo payload.
    pub payload_size: PayloadSize,
    /// Set the IPv4 don't fragment flag.
    pub dont_fragment: bool,
}

/// The status of a completed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The target replied.
    Success,
    /// An intermediate router replied that the ttl expired in transit.
    TtlExpired,
    /// No reply arrived before the timeout.
    TimedOut,
    /// The probe could not be sent or the reply was unusable.
    OtherFailure,
}

impl ProbeStatus {
    /// Did the probe receive a reply which should be recorded?
    #[must_use]
    pub const fn is_reply(self) -> bool {
        matches!(self, Self::Success | Self::TtlExpired)
    }
}

impl Display for ProbeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::TtlExpired => write!(f, "ttl expired"),
            Self::TimedOut => write!(f, "timed out"),
            Self::OtherFailure => write!(f, "failed"),
        }
    }
}

/// The outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    /// The address which replied, if any.
    ///
    /// An unspecified address (`0.0.0.0` or `::`) is never reported.
    pub addr: Option<IpAddr>,
    pub status: ProbeStatus,
    pub elapsed: Duration,
}

impl ProbeReply {
    /// A reply from `addr`, discarding unusable addresses.
    #[must_use]
    pub fn new(addr: Option<IpAddr>, status: ProbeStatus, elapsed: Duration) -> Self {
        Self {
            addr: addr.filter(|addr| !addr.is_unspecified()),
            status,
            elapsed,
        }
    }

    #[must_use]
    pub fn timed_out(elapsed: Duration) -> Self {
        Self::new(None, ProbeStatus::TimedOut, elapsed)
    }

    #[must_use]
    pub fn failed(elapsed: Duration) -> Self {
        Self::new(None, ProbeStatus::OtherFailure, elapsed)
    }
}

/// Sends a single timed probe.
///
/// Implementations must not panic or propagate errors: every failure mode is
/// reported as [`ProbeStatus::OtherFailure`] or [`ProbeStatus::TimedOut`].
#[cfg_attr(test, mockall::automock)]
pub trait ProbeSender: Send + Sync {
    fn send(&self, request: &ProbeRequest) -> ProbeReply;
}
