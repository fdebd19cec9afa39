use std::net::IpAddr;
use thiserror::Error;

/// A source of forward and reverse DNS answers.
///
/// Implementations perform blocking lookups; the [`crate::DnsResolver`] is
/// responsible for caching, de-duplication and running them off the calling
/// thread.
#[cfg_attr(test, mockall::automock)]
pub trait Provider: Send + Sync {
    /// Perform a blocking hostname lookup and return the resolved addresses.
    fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>>;

    /// Perform a blocking reverse lookup of `addr`.
    ///
    /// Returns `Ok(None)` if the lookup succeeded but no records exist.
    fn reverse_lookup(&self, addr: IpAddr) -> Result<Option<String>>;
}

/// A DNS resolver error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A DNS resolver error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("DNS lookup failed: {0}")]
    LookupFailed(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("DNS lookup timed out")]
    Timeout,
    #[error("no addresses found for {0}")]
    NoAddresses(String),
    #[error("failed to start DNS resolver: {0}")]
    Startup(#[from] std::io::Error),
}
