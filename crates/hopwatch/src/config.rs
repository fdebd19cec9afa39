use anyhow::anyhow;
use clap::ValueEnum;
use file::ConfigFile;
use hopwatch_core::{defaults, MAX_PARALLEL_REQUESTS, MAX_PAYLOAD_SIZE, MAX_TTL};
use hopwatch_dns::{IpAddrFamily, ResolveMethod};
use serde::Deserialize;
use std::time::Duration;

mod cmd;
mod constants;
mod file;

pub use cmd::Args;
use cmd::{Command, PingArgs, TraceArgs};

/// How DNS queries will be resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DnsResolveMethodConfig {
    /// Resolve using the OS resolver.
    System,
    /// Resolve using the `/etc/resolv.conf` DNS configuration.
    Resolv,
    /// Resolve using the Google `8.8.8.8` DNS service.
    Google,
    /// Resolve using the Cloudflare `1.1.1.1` DNS service.
    Cloudflare,
}

impl From<DnsResolveMethodConfig> for ResolveMethod {
    fn from(value: DnsResolveMethodConfig) -> Self {
        match value {
            DnsResolveMethodConfig::System => Self::System,
            DnsResolveMethodConfig::Resolv => Self::Resolv,
            DnsResolveMethodConfig::Google => Self::Google,
            DnsResolveMethodConfig::Cloudflare => Self::Cloudflare,
        }
    }
}

/// The address family used when resolving the target.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressFamilyConfig {
    /// Lookup IPv4 only.
    Ipv4,
    /// Lookup IPv6 only.
    Ipv6,
    /// Lookup IPv6 with a fallback to IPv4.
    Ipv6ThenIpv4,
    /// Lookup IPv4 with a fallback to IPv6.
    Ipv4ThenIpv6,
    /// Use the first address returned by the OS resolver.
    System,
}

impl From<AddressFamilyConfig> for IpAddrFamily {
    fn from(value: AddressFamilyConfig) -> Self {
        match value {
            AddressFamilyConfig::Ipv4 => Self::Ipv4Only,
            AddressFamilyConfig::Ipv6 => Self::Ipv6Only,
            AddressFamilyConfig::Ipv6ThenIpv4 => Self::Ipv6thenIpv4,
            AddressFamilyConfig::Ipv4ThenIpv6 => Self::Ipv4thenIpv6,
            AddressFamilyConfig::System => Self::System,
        }
    }
}

/// How to format log data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Display log data in a compact format.
    Compact,
    /// Display log data in a pretty format.
    Pretty,
    /// Display log data in a json format.
    Json,
}

/// How to log event spans.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSpanEvents {
    /// Do not display event spans.
    Off,
    /// Display enter and exit event spans.
    Active,
    /// Display all event spans.
    Full,
}

/// The command to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Trace(TraceSettings),
    Ping(PingSettings),
}

/// Fully parsed and validated `trace` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSettings {
    pub target: String,
    pub max_ttl: u8,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Option<Duration>,
    pub high_loss_threshold: f64,
    pub low_loss_threshold: f64,
    pub payload_size: u16,
    pub parallel_requests: u8,
    pub max_samples: usize,
    pub dont_fragment: bool,
    pub rounds: Option<usize>,
}

/// Fully parsed and validated `ping` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingSettings {
    pub target: String,
    pub count: usize,
    pub timeout: Duration,
    pub payload_size: u16,
    pub dont_fragment: bool,
}

/// Fully parsed and validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HopwatchConfig {
    pub action: Action,
    pub dns: hopwatch_dns::Config,
    pub verbose: bool,
    pub log_format: LogFormat,
    pub log_filter: String,
    pub log_span_events: LogSpanEvents,
}

impl HopwatchConfig {
    pub fn from(args: Args) -> anyhow::Result<Self> {
        let cfg_file = if let Some(cfg) = &args.config_file {
            file::read_config_file(cfg)?
        } else {
            file::read_default_config_file()?.unwrap_or_default()
        };
        Self::build_config(args, cfg_file)
    }

    fn build_config(args: Args, cfg_file: ConfigFile) -> anyhow::Result<Self> {
        let cfg_file_log = cfg_file.log.unwrap_or_default();
        let cfg_file_dns = cfg_file.dns.unwrap_or_default();
        let log_format = cfg_layer(
            args.log_format,
            cfg_file_log.log_format,
            constants::DEFAULT_LOG_FORMAT,
        );
        let log_filter = cfg_layer(
            args.log_filter,
            cfg_file_log.log_filter,
            String::from(constants::DEFAULT_LOG_FILTER),
        );
        let log_span_events = cfg_layer(
            args.log_span_events,
            cfg_file_log.log_span_events,
            constants::DEFAULT_LOG_SPAN_EVENTS,
        );
        let dns_resolve_method = cfg_layer(
            args.dns_resolve_method,
            cfg_file_dns.dns_resolve_method,
            constants::DEFAULT_DNS_RESOLVE_METHOD,
        );
        let addr_family = cfg_layer(
            args.addr_family,
            cfg_file_dns.addr_family,
            constants::DEFAULT_ADDR_FAMILY,
        );
        let dns_timeout = cfg_layer(
            args.dns_timeout,
            cfg_file_dns.dns_timeout,
            hopwatch_dns::defaults::DEFAULT_TIMEOUT,
        );
        let dns_resolved_ttl = cfg_layer(
            args.dns_resolved_ttl,
            cfg_file_dns.dns_resolved_ttl,
            hopwatch_dns::defaults::DEFAULT_RESOLVED_TTL,
        );
        let dns_unresolved_ttl = cfg_layer(
            args.dns_unresolved_ttl,
            cfg_file_dns.dns_unresolved_ttl,
            hopwatch_dns::defaults::DEFAULT_UNRESOLVED_TTL,
        );
        let dns_max_concurrent = cfg_layer(
            args.dns_max_concurrent,
            cfg_file_dns.dns_max_concurrent,
            hopwatch_dns::defaults::DEFAULT_MAX_CONCURRENT,
        );
        let dns_skip_private = cfg_layer_bool_flag(
            args.dns_skip_private,
            cfg_file_dns.dns_skip_private,
            constants::DEFAULT_DNS_SKIP_PRIVATE,
        );
        validate_dns(dns_timeout, dns_max_concurrent)?;
        let dns = hopwatch_dns::Builder::new()
            .resolve_method(ResolveMethod::from(dns_resolve_method))
            .addr_family(IpAddrFamily::from(addr_family))
            .timeout(dns_timeout)
            .resolved_ttl(dns_resolved_ttl)
            .unresolved_ttl(dns_unresolved_ttl)
            .max_concurrent(dns_max_concurrent)
            .resolve_private(!dns_skip_private)
            .build();
        let action = match args.command {
            Command::Trace(trace) => Action::Trace(build_trace(trace, cfg_file.trace)?),
            Command::Ping(ping) => Action::Ping(build_ping(ping, cfg_file.ping)?),
        };
        Ok(Self {
            action,
            dns,
            verbose: args.verbose,
            log_format,
            log_filter,
            log_span_events,
        })
    }
}

fn build_trace(args: TraceArgs, cfg_file: Option<file::ConfigTrace>) -> anyhow::Result<TraceSettings> {
    let cfg_file = cfg_file.unwrap_or_default();
    let max_ttl = cfg_layer(args.max_ttl, cfg_file.max_ttl, defaults::DEFAULT_MAX_TTL);
    let timeout = cfg_layer(
        args.timeout,
        cfg_file.timeout,
        defaults::DEFAULT_PROBE_TIMEOUT,
    );
    let base_delay = cfg_layer(
        args.base_delay,
        cfg_file.base_delay,
        defaults::DEFAULT_BASE_DELAY,
    );
    let min_delay = cfg_layer(
        args.min_delay,
        cfg_file.min_delay,
        defaults::DEFAULT_MIN_DELAY,
    );
    let max_delay = cfg_layer_opt(args.max_delay, cfg_file.max_delay);
    let high_loss_threshold = cfg_layer(
        args.high_loss_threshold,
        cfg_file.high_loss_threshold,
        defaults::DEFAULT_HIGH_LOSS_THRESHOLD,
    );
    let low_loss_threshold = cfg_layer(
        args.low_loss_threshold,
        cfg_file.low_loss_threshold,
        defaults::DEFAULT_LOW_LOSS_THRESHOLD,
    );
    let payload_size = cfg_layer(
        args.payload_size,
        cfg_file.payload_size,
        defaults::DEFAULT_PAYLOAD_SIZE,
    );
    let parallel_requests = cfg_layer(
        args.parallel_requests,
        cfg_file.parallel_requests,
        defaults::DEFAULT_PARALLEL_REQUESTS,
    );
    let max_samples = cfg_layer(
        args.max_samples,
        cfg_file.max_samples,
        defaults::DEFAULT_MAX_SAMPLES,
    );
    let dont_fragment = cfg_layer_bool_flag(
        args.dont_fragment,
        cfg_file.dont_fragment,
        defaults::DEFAULT_DONT_FRAGMENT,
    );
    let rounds = cfg_layer_opt(args.rounds, cfg_file.rounds);
    validate_target(&args.target)?;
    validate_ttl(max_ttl)?;
    validate_timeout(timeout)?;
    validate_delays(base_delay, min_delay, max_delay.unwrap_or(timeout))?;
    validate_loss_thresholds(low_loss_threshold, high_loss_threshold)?;
    validate_payload_size(payload_size)?;
    validate_parallel_requests(parallel_requests)?;
    validate_max_samples(max_samples)?;
    validate_rounds(rounds)?;
    Ok(TraceSettings {
        target: args.target,
        max_ttl,
        timeout,
        base_delay,
        min_delay,
        max_delay,
        high_loss_threshold,
        low_loss_threshold,
        payload_size,
        parallel_requests,
        max_samples,
        dont_fragment,
        rounds,
    })
}

fn build_ping(args: PingArgs, cfg_file: Option<file::ConfigPing>) -> anyhow::Result<PingSettings> {
    let cfg_file = cfg_file.unwrap_or_default();
    let count = cfg_layer(args.count, cfg_file.count, defaults::DEFAULT_PING_COUNT);
    let timeout = cfg_layer(
        args.timeout,
        cfg_file.timeout,
        defaults::DEFAULT_PROBE_TIMEOUT,
    );
    let payload_size = cfg_layer(
        args.payload_size,
        cfg_file.payload_size,
        defaults::DEFAULT_PAYLOAD_SIZE,
    );
    let dont_fragment = cfg_layer_bool_flag(
        args.dont_fragment,
        cfg_file.dont_fragment,
        defaults::DEFAULT_DONT_FRAGMENT,
    );
    validate_target(&args.target)?;
    validate_count(count)?;
    validate_timeout(timeout)?;
    validate_payload_size(payload_size)?;
    Ok(PingSettings {
        target: args.target,
        count,
        timeout,
        payload_size,
        dont_fragment,
    })
}

fn cfg_layer<T>(fst: Option<T>, snd: Option<T>, def: T) -> T {
    match (fst, snd) {
        (Some(val), _) | (None, Some(val)) => val,
        (None, None) => def,
    }
}

fn cfg_layer_opt<T>(fst: Option<T>, snd: Option<T>) -> Option<T> {
    match (fst, snd) {
        (Some(val), _) | (None, Some(val)) => Some(val),
        (None, None) => None,
    }
}

const fn cfg_layer_bool_flag(fst: bool, snd: Option<bool>, default: bool) -> bool {
    match (fst, snd) {
        (true, _) => true,
        (false, Some(val)) => val,
        (false, None) => default,
    }
}

/// Validate the target host.
fn validate_target(target: &str) -> anyhow::Result<()> {
    if target.trim().is_empty() {
        Err(anyhow!("target must not be empty"))
    } else {
        Ok(())
    }
}

/// Validate `max_ttl`.
fn validate_ttl(max_ttl: u8) -> anyhow::Result<()> {
    if (1..=MAX_TTL).contains(&max_ttl) {
        Ok(())
    } else {
        Err(anyhow!("max-ttl ({max_ttl}) must be in the range 1..{MAX_TTL}"))
    }
}

/// Validate `timeout`.
fn validate_timeout(timeout: Duration) -> anyhow::Result<()> {
    if timeout.is_zero() {
        Err(anyhow!("timeout ({timeout:?}) must be greater than zero"))
    } else {
        Ok(())
    }
}

/// Validate `min_delay` and `base_delay` against the effective `max_delay`.
fn validate_delays(
    base_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
) -> anyhow::Result<()> {
    if min_delay > max_delay {
        Err(anyhow!(
            "min-delay ({min_delay:?}) must be less than or equal to max-delay ({max_delay:?})"
        ))
    } else if base_delay < min_delay || base_delay > max_delay {
        Err(anyhow!(
            "base-delay ({base_delay:?}) must be between min-delay ({min_delay:?}) and max-delay ({max_delay:?})"
        ))
    } else {
        Ok(())
    }
}

/// Validate `low_loss_threshold` and `high_loss_threshold`.
fn validate_loss_thresholds(low: f64, high: f64) -> anyhow::Result<()> {
    let range = 0_f64..=100_f64;
    if !range.contains(&low) {
        Err(anyhow!(
            "low-loss-threshold ({low}) must be in the range 0..100"
        ))
    } else if !range.contains(&high) {
        Err(anyhow!(
            "high-loss-threshold ({high}) must be in the range 0..100"
        ))
    } else if low > high {
        Err(anyhow!(
            "low-loss-threshold ({low}) must be less than or equal to high-loss-threshold ({high})"
        ))
    } else {
        Ok(())
    }
}

/// Validate `payload_size`.
fn validate_payload_size(payload_size: u16) -> anyhow::Result<()> {
    if payload_size > MAX_PAYLOAD_SIZE {
        Err(anyhow!(
            "payload-size ({payload_size}) must be less than or equal to {MAX_PAYLOAD_SIZE}"
        ))
    } else {
        Ok(())
    }
}

/// Validate `parallel_requests`.
fn validate_parallel_requests(parallel_requests: u8) -> anyhow::Result<()> {
    if (1..=MAX_PARALLEL_REQUESTS).contains(&parallel_requests) {
        Ok(())
    } else {
        Err(anyhow!(
            "parallel-requests ({parallel_requests}) must be in the range 1..{MAX_PARALLEL_REQUESTS}"
        ))
    }
}

fn validate_max_samples(max_samples: usize) -> anyhow::Result<()> {
    if max_samples == 0 {
        Err(anyhow!("max-samples ({max_samples}) must be greater than zero"))
    } else {
        Ok(())
    }
}

fn validate_rounds(rounds: Option<usize>) -> anyhow::Result<()> {
    match rounds {
        Some(0) => Err(anyhow!("rounds (0) must be greater than zero")),
        _ => Ok(()),
    }
}

fn validate_count(count: usize) -> anyhow::Result<()> {
    if count == 0 {
        Err(anyhow!("count ({count}) must be greater than zero"))
    } else {
        Ok(())
    }
}

/// Validate the DNS settings.
fn validate_dns(dns_timeout: Duration, dns_max_concurrent: usize) -> anyhow::Result<()> {
    if dns_timeout.is_zero() {
        Err(anyhow!("dns-timeout ({dns_timeout:?}) must be greater than zero"))
    } else if dns_max_concurrent == 0 {
        Err(anyhow!(
            "dns-max-concurrent ({dns_max_concurrent}) must be greater than zero"
        ))
    } else {
        Ok(())
    }
}
