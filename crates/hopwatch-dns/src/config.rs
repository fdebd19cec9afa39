use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Default values for configuration.
pub mod defaults {
    use crate::config::{IpAddrFamily, ResolveMethod};
    use std::time::Duration;

    /// The default value for `dns-resolve-method`.
    pub const DEFAULT_RESOLVE_METHOD: ResolveMethod = ResolveMethod::System;

    /// The default value for `addr-family`.
    pub const DEFAULT_ADDR_FAMILY: IpAddrFamily = IpAddrFamily::Ipv4thenIpv6;

    /// The default value for `dns-timeout`.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

    /// The default value for `dns-resolved-ttl`.
    pub const DEFAULT_RESOLVED_TTL: Duration = Duration::from_secs(30 * 60);

    /// The default value for `dns-unresolved-ttl`.
    pub const DEFAULT_UNRESOLVED_TTL: Duration = Duration::from_secs(60);

    /// The default value for `dns-max-concurrent`.
    pub const DEFAULT_MAX_CONCURRENT: usize = 4;

    /// The default value for `dns-resolve-private`.
    pub const DEFAULT_RESOLVE_PRIVATE: bool = true;

    /// The default value for `dns-placeholder`.
    pub const DEFAULT_PLACEHOLDER: &str = "-";
}

/// How DNS queries will be resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResolveMethod {
    /// Resolve using the OS resolver.
    System,
    /// Resolve using the `/etc/resolv.conf` DNS configuration.
    Resolv,
    /// Resolve using the Google `8.8.8.8` DNS service.
    Google,
    /// Resolve using the Cloudflare `1.1.1.1` DNS service.
    Cloudflare,
}

impl Display for ResolveMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Resolv => write!(f, "resolv"),
            Self::Google => write!(f, "google"),
            Self::Cloudflare => write!(f, "cloudflare"),
        }
    }
}

/// How to resolve IP addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IpAddrFamily {
    /// Lookup IPv4 only.
    Ipv4Only,
    /// Lookup IPv6 only.
    Ipv6Only,
    /// Lookup IPv6 with a fallback to IPv4.
    Ipv6thenIpv4,
    /// Lookup IPv4 with a fallback to IPv6.
    Ipv4thenIpv6,
    /// Use the first IP address returned by the OS resolver.
    System,
}

impl Display for IpAddrFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ipv4Only => write!(f, "Ipv4Only"),
            Self::Ipv6Only => write!(f, "Ipv6Only"),
            Self::Ipv6thenIpv4 => write!(f, "Ipv6thenIpv4"),
            Self::Ipv4thenIpv6 => write!(f, "Ipv4thenIpv6"),
            Self::System => write!(f, "System"),
        }
    }
}

/// A builder for DNS `Config`.
///
/// # Example
///
/// Build a DNS `Config` which caches failed lookups for 10 seconds.
///
/// ```no_run
/// use hopwatch_dns::Builder;
/// use std::time::Duration;
///
/// let config = Builder::new().unresolved_ttl(Duration::from_secs(10)).build();
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Create a new `Builder`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the method to use for DNS resolution.
    #[must_use]
    pub fn resolve_method(mut self, resolve_method: ResolveMethod) -> Self {
        self.config.resolve_method = resolve_method;
        self
    }

    /// Set the address family.
    #[must_use]
    pub fn addr_family(mut self, addr_family: IpAddrFamily) -> Self {
        self.config.addr_family = addr_family;
        self
    }

    /// Set the timeout for a single DNS lookup.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set how long a successfully resolved name is cached.
    #[must_use]
    pub fn resolved_ttl(mut self, ttl: Duration) -> Self {
        self.config.resolved_ttl = ttl;
        self
    }

    /// Set how long a failed or unresolved lookup is cached.
    #[must_use]
    pub fn unresolved_ttl(mut self, ttl: Duration) -> Self {
        self.config.unresolved_ttl = ttl;
        self
    }

    /// Set the maximum number of reverse lookups which may run at once.
    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent = max_concurrent;
        self
    }

    /// Set whether private, loopback and link-local addresses are resolved.
    #[must_use]
    pub fn resolve_private(mut self, resolve_private: bool) -> Self {
        self.config.resolve_private = resolve_private;
        self
    }

    /// Set the name returned for addresses which are not (yet) resolved.
    #[must_use]
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.config.placeholder = placeholder.into();
        self
    }

    /// Build the DNS `Config`.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the `DnsResolver`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// The method to use for DNS resolution.
    pub resolve_method: ResolveMethod,
    /// The IP address resolution family.
    pub addr_family: IpAddrFamily,
    /// The timeout for a single DNS lookup.
    pub timeout: Duration,
    /// How long a resolved name is cached.
    pub resolved_ttl: Duration,
    /// How long an unresolved or failed lookup is cached.
    pub unresolved_ttl: Duration,
    /// The number of lookup workers.
    pub max_concurrent: usize,
    /// Whether private, loopback and link-local addresses are resolved.
    pub resolve_private: bool,
    /// The name returned for addresses which are not (yet) resolved.
    pub placeholder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolve_method: defaults::DEFAULT_RESOLVE_METHOD,
            addr_family: defaults::DEFAULT_ADDR_FAMILY,
            timeout: defaults::DEFAULT_TIMEOUT,
            resolved_ttl: defaults::DEFAULT_RESOLVED_TTL,
            unresolved_ttl: defaults::DEFAULT_UNRESOLVED_TTL,
            max_concurrent: defaults::DEFAULT_MAX_CONCURRENT,
            resolve_private: defaults::DEFAULT_RESOLVE_PRIVATE,
            placeholder: String::from(defaults::DEFAULT_PLACEHOLDER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = Builder::new().build();
        assert_eq!(Config::default(), config);
        assert_eq!(Duration::from_secs(1800), config.resolved_ttl);
        assert_eq!(Duration::from_secs(60), config.unresolved_ttl);
        assert_eq!("-", config.placeholder);
    }

    #[test]
    fn test_builder_full() {
        let config = Builder::new()
            .resolve_method(ResolveMethod::Cloudflare)
            .addr_family(IpAddrFamily::Ipv6Only)
            .timeout(Duration::from_millis(250))
            .resolved_ttl(Duration::from_secs(5))
            .unresolved_ttl(Duration::from_secs(1))
            .max_concurrent(2)
            .resolve_private(false)
            .placeholder("?")
            .build();
        assert_eq!(ResolveMethod::Cloudflare, config.resolve_method);
        assert_eq!(IpAddrFamily::Ipv6Only, config.addr_family);
        assert_eq!(Duration::from_millis(250), config.timeout);
        assert_eq!(Duration::from_secs(5), config.resolved_ttl);
        assert_eq!(Duration::from_secs(1), config.unresolved_ttl);
        assert_eq!(2, config.max_concurrent);
        assert!(!config.resolve_private);
        assert_eq!("?", config.placeholder);
    }
}
