use serde::Deserialize;
use std::net::IpAddr;

/// A simulated trace.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    pub name: String,
    pub target: IpAddr,
    pub rounds: Option<usize>,
    pub max_ttl: Option<u8>,
    pub parallel_requests: Option<u8>,
    /// The probe timeout in ms.
    pub timeout_ms: Option<u64>,
    pub hops: Vec<Hop>,
    /// Reverse DNS records served by the simulated resolver.
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// The rows expected once the trace completes.
    #[serde(default)]
    pub expected: Vec<ExpectedRow>,
    /// The statistics expected for each responding address.
    #[serde(default)]
    pub expected_hops: Vec<ExpectedHop>,
}

impl Simulation {
    #[must_use]
    pub fn latest_ttl(&self) -> u8 {
        self.hops.last().map_or(0, |hop| hop.ttl)
    }

    /// The hop configured for `ttl`.
    ///
    /// A ttl beyond the last configured hop behaves as the last hop.
    #[must_use]
    pub fn hop(&self, ttl: u8) -> Option<&Hop> {
        if ttl >= self.latest_ttl() {
            self.hops.last()
        } else {
            self.hops.iter().find(|hop| hop.ttl == ttl)
        }
    }
}

/// A simulated hop.
#[derive(Debug, Clone, Deserialize)]
pub struct Hop {
    /// The simulated time-to-live (TTL).
    pub ttl: u8,
    /// The simulated probe response.
    pub resp: Response,
}

/// A simulated probe response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tag")]
pub enum Response {
    /// Simulate a hop which does not respond to probes.
    NoResponse,
    /// Simulate a hop whose probes cannot be sent.
    Failure,
    /// Simulate a hop which responds to probes from a single host.
    SingleHost(SingleHost),
    /// Simulate a hop which responds to successive probes from each of
    /// several hosts in turn.
    MultipleHosts(MultipleHosts),
}

/// A simulated probe response with a single addr and fixed rtt.
#[derive(Debug, Clone, Deserialize)]
pub struct SingleHost {
    /// The simulated host responding to the probe.
    pub addr: IpAddr,
    /// The simulated round trip time (RTT) in ms.
    pub rtt_ms: u16,
    /// The probes (numbered from 1 for this ttl) which receive no response.
    #[serde(default)]
    pub drop: Vec<usize>,
}

/// A simulated probe response rotating over several addrs.
#[derive(Debug, Clone, Deserialize)]
pub struct MultipleHosts {
    pub addrs: Vec<IpAddr>,
    /// The simulated round trip time (RTT) in ms.
    pub rtt_ms: u16,
}

/// A simulated reverse DNS record.
#[derive(Debug, Clone, Deserialize)]
pub struct Host {
    pub addr: IpAddr,
    pub name: String,
}

/// A row expected in the final snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedRow {
    pub ttl: u8,
    pub addr: IpAddr,
    pub sent: usize,
    pub received: usize,
    pub hostname: Option<String>,
}

/// The statistics expected for a single responding address.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedHop {
    pub addr: IpAddr,
    pub sent: usize,
    pub received: usize,
}
