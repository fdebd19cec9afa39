//! This crate provides a cheaply cloneable, non-blocking, caching reverse DNS
//! resolver together with blocking forward lookups.
//!
//! A reverse lookup never blocks the caller: a cache miss returns a
//! placeholder immediately and the lookup is performed by a bounded pool of
//! worker threads.  The cache entry is refreshed when it expires:
//! - names which resolved successfully are kept for a long time-to-live
//! - failed, timed out or empty lookups are kept for a short time-to-live
//!
//! Concurrent requests for the same address never trigger more than one
//! lookup.
//!
//! # Example
//!
//! The following example performs a reverse DNS lookup using the Cloudflare
//! `1.1.1.1` public DNS service and waits for the name to be resolved.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # use std::net::IpAddr;
//! # use std::str::FromStr;
//! # use std::sync::mpsc;
//! # use std::time::Duration;
//! use hopwatch_dns::{Builder, DnsResolver, ResolveMethod};
//!
//! let config = Builder::new()
//!     .resolve_method(ResolveMethod::Cloudflare)
//!     .timeout(Duration::from_secs(2))
//!     .build();
//! let resolver = DnsResolver::start(config)?;
//! let (tx, rx) = mpsc::channel();
//! resolver.subscribe(move |addr, name| {
//!     let _ = tx.send((addr, name.to_string()));
//! });
//! let addr = IpAddr::from_str("1.1.1.1")?;
//! println!("lookup of {addr} pending: {}", resolver.resolve(addr));
//! let (addr, name) = rx.recv()?;
//! println!("lookup of {addr} resolved to {name}");
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod config;
mod lazy_resolver;
mod provider;
mod resolver;

pub use config::{defaults, Builder, Config, IpAddrFamily, ResolveMethod};
pub use lazy_resolver::{DnsResolver, Listener};
pub use provider::{HickoryProvider, SystemProvider};
pub use resolver::{Error, Provider, Result};
