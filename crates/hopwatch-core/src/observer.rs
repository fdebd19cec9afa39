use crate::hop::HopStatistics;
use crate::types::{RoundId, TimeToLive};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

/// A change to the statistics or hostname shown for one hop.
#[derive(Debug, Clone, PartialEq)]
pub struct HopUpdate {
    pub addr: IpAddr,
    pub ttl: TimeToLive,
    pub hostname: String,
    pub stats: HopStatistics,
    /// The round in which the update was produced.
    pub round: RoundId,
}

/// The severity of a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A change in the status of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub severity: Severity,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Receives the updates published by a running trace.
///
/// Callbacks are invoked on the trace thread and, for hostname updates, on
/// DNS worker threads; implementations must marshal to their own thread if
/// required.
pub trait TraceObserver: Send + Sync {
    /// Called once per hop per round, and again when the hop's hostname
    /// resolves.
    fn on_hop_update(&self, update: &HopUpdate);

    /// Called when a trace starts, stops or fails.
    fn on_status(&self, status: &Status);
}

/// A [`TraceObserver`] which discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TraceObserver for NoopObserver {
    fn on_hop_update(&self, _update: &HopUpdate) {}
    fn on_status(&self, _status: &Status) {}
}
