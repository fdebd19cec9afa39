//! hopwatch - a concurrent route probing engine.
//!
//! This crate discovers and continuously re-measures every hop between the
//! local host and a target, maintaining per-hop latency and loss statistics,
//! resolving hop addresses to host names without blocking the probing and
//! adapting the delay between rounds to the loss observed.
//!
//! # Example
//!
//! The following example traces a host for three rounds, printing each hop
//! update as it arrives, and then prints the final table:
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # use std::time::Duration;
//! use hopwatch_core::{Builder, HopUpdate, Status, TraceObserver};
//!
//! struct Printer;
//!
//! impl TraceObserver for Printer {
//!     fn on_hop_update(&self, update: &HopUpdate) {
//!         println!("{} {} {}", update.ttl.0, update.addr, update.hostname);
//!     }
//!     fn on_status(&self, status: &Status) {
//!         println!("[{}] {}", status.severity, status.message);
//!     }
//! }
//!
//! let coordinator = Builder::new()
//!     .max_rounds(Some(3))
//!     .observer(Printer)
//!     .build()?;
//! coordinator.start("example.com")?;
//! coordinator.wait_idle(Duration::from_secs(120));
//! print!("{}", coordinator.export_text());
//! # Ok(())
//! # }
//! ```
//!
//! # See Also
//!
//! - [`Builder`] - Build a [`TraceCoordinator`].
//! - [`Pinger`] - Send a fixed number of probes to a single target.
//! - [`hopwatch_dns::DnsResolver`] - The non-blocking reverse DNS resolver.
#![deny(unsafe_code)]

mod builder;
mod cancel;
mod config;
mod constants;
mod coordinator;
mod error;
pub mod export;
mod hop;
mod net;
mod observer;
mod pacing;
mod ping;
mod probe;
mod state;
mod types;

pub use builder::Builder;
pub use cancel::Cancellation;
pub use config::{defaults, PacingConfig, TraceConfig, TraceState};
pub use constants::{MAX_PARALLEL_REQUESTS, MAX_PAYLOAD_SIZE, MAX_TTL};
pub use coordinator::{TraceCoordinator, TraceStart};
pub use error::{Error, ErrorKind, IoError, IoOperation, IoResult, Result};
pub use hop::{jitter, loss_pct, HopData, HopStatistics};
pub use net::IcmpProbeSender;
pub use observer::{HopUpdate, NoopObserver, Severity, Status, TraceObserver};
pub use pacing::adaptive_delay;
pub use ping::{PingReport, Pinger};
pub use probe::{ProbeReply, ProbeRequest, ProbeSender, ProbeStatus};
pub use state::{TraceRow, TraceTable};
pub use types::{MaxRounds, ParallelRequests, PayloadSize, RoundId, TimeToLive};
