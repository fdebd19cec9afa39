use crate::config::{Config, IpAddrFamily, ResolveMethod};
use crate::resolver::{Error, Provider, Result};
use hickory_resolver::config::{LookupIpStrategy, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::Resolver;
use itertools::{Either, Itertools};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::instrument;

/// Create the `Provider` for the configured `ResolveMethod`.
pub fn for_config(config: &Config) -> Result<Arc<dyn Provider>> {
    Ok(match config.resolve_method {
        ResolveMethod::System => Arc::new(SystemProvider::new(config.addr_family)),
        method => Arc::new(HickoryProvider::new(method, config)?),
    })
}

/// Resolve using the OS resolver.
#[derive(Debug)]
pub struct SystemProvider {
    addr_family: IpAddrFamily,
}

impl SystemProvider {
    #[must_use]
    pub const fn new(addr_family: IpAddrFamily) -> Self {
        Self { addr_family }
    }
}

impl Provider for SystemProvider {
    #[instrument(skip(self), level = "trace")]
    fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        let all =
            dns_lookup::lookup_host(hostname).map_err(|err| Error::LookupFailed(Box::new(err)))?;
        Ok(filter_family(all, self.addr_family))
    }

    // we can't distinguish between a failed lookup or a genuine error, and so we just
    // assume all failures are "not found".
    #[instrument(skip(self), level = "trace")]
    fn reverse_lookup(&self, addr: IpAddr) -> Result<Option<String>> {
        Ok(dns_lookup::lookup_addr(&addr).ok())
    }
}

/// Resolve using a `hickory` stub resolver.
pub struct HickoryProvider {
    resolver: Resolver,
}

impl HickoryProvider {
    pub fn new(method: ResolveMethod, config: &Config) -> Result<Self> {
        let ip_strategy = match config.addr_family {
            IpAddrFamily::Ipv4Only => LookupIpStrategy::Ipv4Only,
            IpAddrFamily::Ipv6Only => LookupIpStrategy::Ipv6Only,
            IpAddrFamily::Ipv6thenIpv4 => LookupIpStrategy::Ipv6thenIpv4,
            IpAddrFamily::Ipv4thenIpv6 | IpAddrFamily::System => LookupIpStrategy::Ipv4thenIpv6,
        };
        let (resolver_cfg, mut options) = match method {
            ResolveMethod::Resolv => read_system_conf().map_err(resolve_error)?,
            ResolveMethod::Google => (ResolverConfig::google(), ResolverOpts::default()),
            ResolveMethod::Cloudflare | ResolveMethod::System => {
                (ResolverConfig::cloudflare(), ResolverOpts::default())
            }
        };
        options.timeout = config.timeout;
        options.ip_strategy = ip_strategy;
        Ok(Self {
            resolver: Resolver::new(resolver_cfg, options)?,
        })
    }
}

impl Provider for HickoryProvider {
    #[instrument(skip(self), level = "trace")]
    fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        Ok(self
            .resolver
            .lookup_ip(hostname)
            .map_err(resolve_error)?
            .iter()
            .collect())
    }

    #[instrument(skip(self), level = "trace")]
    fn reverse_lookup(&self, addr: IpAddr) -> Result<Option<String>> {
        match self.resolver.reverse_lookup(addr) {
            Ok(names) => Ok(names
                .into_iter()
                .map(|mut ptr| {
                    ptr.0.set_fqdn(false);
                    ptr.to_string()
                })
                .next()),
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
                ResolveErrorKind::Timeout => Err(Error::Timeout),
                _ => Err(resolve_error(err)),
            },
        }
    }
}

fn resolve_error(err: ResolveError) -> Error {
    Error::LookupFailed(Box::new(err))
}

/// Select the addresses to use for the given `IpAddrFamily`.
fn filter_family(all: Vec<IpAddr>, addr_family: IpAddrFamily) -> Vec<IpAddr> {
    fn partition(all: Vec<IpAddr>) -> (Vec<IpAddr>, Vec<IpAddr>) {
        all.into_iter().partition_map(|ip| match ip {
            IpAddr::V4(_) => Either::Left(ip),
            IpAddr::V6(_) => Either::Right(ip),
        })
    }
    match addr_family {
        IpAddrFamily::Ipv4Only => partition(all).0,
        IpAddrFamily::Ipv6Only => partition(all).1,
        IpAddrFamily::Ipv6thenIpv4 => {
            let (ipv4, ipv6) = partition(all);
            if ipv6.is_empty() {
                ipv4
            } else {
                ipv6
            }
        }
        IpAddrFamily::Ipv4thenIpv6 => {
            let (ipv4, ipv6) = partition(all);
            if ipv4.is_empty() {
                ipv6
            } else {
                ipv4
            }
        }
        IpAddrFamily::System => all,
    }
}
