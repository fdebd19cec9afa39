use crate::simulation::{Host, Response, Simulation};
use hopwatch_core::{ProbeReply, ProbeRequest, ProbeSender, ProbeStatus};
use hopwatch_dns::Provider;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// A [`ProbeSender`] which answers probes from a [`Simulation`].
///
/// Clones share the probe counters.
#[derive(Clone)]
pub struct SimulatedNetwork {
    sim: Arc<Simulation>,
    probes: Arc<Mutex<BTreeMap<u8, usize>>>,
}

impl SimulatedNetwork {
    pub fn new(sim: Arc<Simulation>) -> Self {
        Self {
            sim,
            probes: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// The number of probes sent at each ttl.
    pub fn probes(&self) -> BTreeMap<u8, usize> {
        self.probes.lock().clone()
    }

    fn next_probe(&self, ttl: u8) -> usize {
        let mut probes = self.probes.lock();
        let count = probes.entry(ttl).or_default();
        *count += 1;
        *count
    }
}

impl ProbeSender for SimulatedNetwork {
    fn send(&self, request: &ProbeRequest) -> ProbeReply {
        let ttl = request.ttl.0;
        let probe = self.next_probe(ttl);
        let resp = self.sim.hop(ttl).map(|hop| &hop.resp);
        debug!(ttl, probe, ?resp, "simulating probe");
        match resp {
            Some(Response::SingleHost(host)) if !host.drop.contains(&probe) => {
                reply_from(host.addr, host.rtt_ms, request)
            }
            Some(Response::MultipleHosts(hosts)) if !hosts.addrs.is_empty() => {
                let addr = hosts.addrs[(probe - 1) % hosts.addrs.len()];
                reply_from(addr, hosts.rtt_ms, request)
            }
            Some(Response::Failure) => ProbeReply::failed(Duration::ZERO),
            _ => {
                thread::sleep(request.timeout);
                ProbeReply::timed_out(request.timeout)
            }
        }
    }
}

fn reply_from(addr: IpAddr, rtt_ms: u16, request: &ProbeRequest) -> ProbeReply {
    let rtt = Duration::from_millis(u64::from(rtt_ms));
    thread::sleep(rtt);
    let status = if addr == request.target {
        ProbeStatus::Success
    } else {
        ProbeStatus::TtlExpired
    };
    ProbeReply::new(Some(addr), status, rtt)
}

/// A [`Provider`] serving fixed records.
pub struct SimulatedDns {
    hosts: Vec<Host>,
}

impl SimulatedDns {
    pub const fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }
}

impl Provider for SimulatedDns {
    fn lookup(&self, hostname: &str) -> hopwatch_dns::Result<Vec<IpAddr>> {
        let addrs: Vec<_> = self
            .hosts
            .iter()
            .filter(|host| host.name == hostname)
            .map(|host| host.addr)
            .collect();
        if addrs.is_empty() {
            Err(hopwatch_dns::Error::NoAddresses(hostname.to_string()))
        } else {
            Ok(addrs)
        }
    }

    fn reverse_lookup(&self, addr: IpAddr) -> hopwatch_dns::Result<Option<String>> {
        Ok(self
            .hosts
            .iter()
            .find(|host| host.addr == addr)
            .map(|host| host.name.clone()))
    }
}
