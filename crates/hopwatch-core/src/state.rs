use crate::hop::{loss_pct, HopData, HopStatistics};
use crate::types::TimeToLive;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

/// A presentation-facing snapshot of one ttl.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub ttl: TimeToLive,
    /// The address which most recently responded at this ttl.
    pub addr: IpAddr,
    pub hostname: String,
    /// The statistics of `addr`, which may include replies received at
    /// other ttls.
    pub stats: HopStatistics,
}

#[derive(Debug, Clone)]
struct Row {
    addr: IpAddr,
    hostname: String,
}

/// The hop table and per-ttl rows of a trace.
///
/// Statistics are keyed by responding address; each row displays the latest
/// address seen at its ttl.
#[derive(Debug)]
pub struct TraceTable {
    max_samples: usize,
    hops: RwLock<HashMap<IpAddr, Arc<HopData>>>,
    rows: RwLock<BTreeMap<TimeToLive, Row>>,
}

impl TraceTable {
    #[must_use]
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples,
            hops: RwLock::new(HashMap::new()),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// The `HopData` for `addr`, created if this is the first time it has
    /// been seen.
    pub fn hop(&self, addr: IpAddr) -> Arc<HopData> {
        if let Some(hop) = self.hops.read().get(&addr) {
            return hop.clone();
        }
        self.hops
            .write()
            .entry(addr)
            .or_insert_with(|| Arc::new(HopData::new(self.max_samples)))
            .clone()
    }

    /// The address currently displayed at `ttl`.
    #[must_use]
    pub fn row_addr(&self, ttl: TimeToLive) -> Option<IpAddr> {
        self.rows.read().get(&ttl).map(|row| row.addr)
    }

    /// Display `addr` at `ttl`, replacing any previous address.
    pub fn set_row(&self, ttl: TimeToLive, addr: IpAddr, hostname: String) {
        self.rows.write().insert(ttl, Row { addr, hostname });
    }

    /// Update the hostname of every row displaying `addr`, returning the
    /// rows which changed.
    pub fn set_hostname(&self, addr: IpAddr, hostname: &str) -> Vec<TraceRow> {
        let changed = {
            let mut rows = self.rows.write();
            rows.iter_mut()
                .filter(|(_, row)| row.addr == addr && row.hostname != hostname)
                .map(|(ttl, row)| {
                    row.hostname = hostname.to_string();
                    *ttl
                })
                .collect::<Vec<_>>()
        };
        changed.into_iter().filter_map(|ttl| self.row(ttl)).collect()
    }

    /// A snapshot of the row at `ttl`.
    #[must_use]
    pub fn row(&self, ttl: TimeToLive) -> Option<TraceRow> {
        let row = self.rows.read().get(&ttl).cloned()?;
        Some(self.make_row(ttl, row))
    }

    /// A snapshot of every row, ordered by ttl.
    #[must_use]
    pub fn rows(&self) -> Vec<TraceRow> {
        let rows = self.rows.read().clone();
        rows.into_iter()
            .map(|(ttl, row)| self.make_row(ttl, row))
            .collect()
    }

    /// The loss percentage across all hops, or `None` if no probe has been
    /// attributed to any hop.
    #[must_use]
    pub fn aggregate_loss(&self) -> Option<f64> {
        let (sent, received) = self
            .hops
            .read()
            .values()
            .map(|hop| hop.counts())
            .fold((0, 0), |(sent, received), (s, r)| (sent + s, received + r));
        (sent > 0).then(|| loss_pct(sent, received))
    }

    /// The number of distinct responding addresses.
    #[must_use]
    pub fn hop_count(&self) -> usize {
        self.hops.read().len()
    }

    pub fn clear(&self) {
        self.hops.write().clear();
        self.rows.write().clear();
    }

    fn make_row(&self, ttl: TimeToLive, row: Row) -> TraceRow {
        let stats = self
            .hops
            .read()
            .get(&row.addr)
            .map(|hop| hop.statistics())
            .unwrap_or_default();
        TraceRow {
            ttl,
            addr: row.addr,
            hostname: row.hostname,
            stats,
        }
    }
}
