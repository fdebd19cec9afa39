use crate::config::{AddressFamilyConfig, DnsResolveMethodConfig, LogFormat, LogSpanEvents};
use clap::{Parser, Subcommand};
use std::time::Duration;

/// Trace the route to a host and record per-hop statistics
#[derive(Parser, Debug)]
#[command(name = "hopwatch", author, version, about, long_about = None, arg_required_else_help(true))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file
    #[arg(short = 'c', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config_file: Option<String>,

    /// How to perform DNS queries [default: system]
    #[arg(value_enum, short = 'r', long, global = true)]
    pub dns_resolve_method: Option<DnsResolveMethodConfig>,

    /// The address family used when resolving the target [default: ipv4-then-ipv6]
    #[arg(value_enum, short = 'F', long, global = true)]
    pub addr_family: Option<AddressFamilyConfig>,

    /// The maximum time to wait to perform DNS queries [default: 5s]
    #[arg(long, global = true, value_parser = parse_duration)]
    pub dns_timeout: Option<Duration>,

    /// How long a resolved hostname is cached [default: 30m]
    #[arg(long, global = true, value_parser = parse_duration)]
    pub dns_resolved_ttl: Option<Duration>,

    /// How long a failed reverse lookup is cached [default: 60s]
    #[arg(long, global = true, value_parser = parse_duration)]
    pub dns_unresolved_ttl: Option<Duration>,

    /// The number of concurrent reverse lookups [default: 4]
    #[arg(long, global = true)]
    pub dns_max_concurrent: Option<usize>,

    /// Do not resolve private, loopback and link-local addresses [default: false]
    #[arg(long, global = true)]
    pub dns_skip_private: bool,

    /// The debug log format [default: pretty]
    #[arg(value_enum, long, global = true)]
    pub log_format: Option<LogFormat>,

    /// The debug log filter [default: hopwatch=debug]
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// The debug log span events [default: off]
    #[arg(value_enum, long, global = true)]
    pub log_span_events: Option<LogSpanEvents>,

    /// Enable verbose debug logging
    #[arg(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Trace the route to a host in repeated rounds
    Trace(TraceArgs),
    /// Send a sequence of echo requests to a host
    Ping(PingArgs),
}

#[derive(clap::Args, Debug)]
pub struct TraceArgs {
    /// The hostname or IP to trace
    pub target: String,

    /// The maximum time-to-live [default: 12]
    #[arg(short = 't', long)]
    pub max_ttl: Option<u8>,

    /// The time to wait for each probe reply [default: 5s]
    #[arg(short = 'T', long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// The delay between rounds when the loss is moderate [default: 1s]
    #[arg(short = 'i', long, value_parser = parse_duration)]
    pub base_delay: Option<Duration>,

    /// The shortest delay between rounds [default: 250ms]
    #[arg(long, value_parser = parse_duration)]
    pub min_delay: Option<Duration>,

    /// The longest delay between rounds [default: the probe timeout]
    #[arg(long, value_parser = parse_duration)]
    pub max_delay: Option<Duration>,

    /// The loss percentage above which rounds slow down [default: 50]
    #[arg(long)]
    pub high_loss_threshold: Option<f64>,

    /// The loss percentage below which rounds speed up [default: 10]
    #[arg(long)]
    pub low_loss_threshold: Option<f64>,

    /// The size of the echo request payload in bytes [default: 32]
    #[arg(short = 's', long)]
    pub payload_size: Option<u16>,

    /// The number of probes sent concurrently for each ttl [default: 1]
    #[arg(short = 'U', long)]
    pub parallel_requests: Option<u8>,

    /// The maximum number of round trip times recorded per hop [default: 1024]
    #[arg(long)]
    pub max_samples: Option<usize>,

    /// Set the IPv4 don't fragment flag [default: false]
    #[arg(short = 'D', long)]
    pub dont_fragment: bool,

    /// Stop after this many rounds [default: unbounded]
    #[arg(short = 'C', long)]
    pub rounds: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct PingArgs {
    /// The hostname or IP to ping
    pub target: String,

    /// The number of echo requests to send [default: 4]
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// The time to wait for each reply [default: 5s]
    #[arg(short = 'T', long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// The size of the echo request payload in bytes [default: 32]
    #[arg(short = 's', long)]
    pub payload_size: Option<u16>,

    /// Set the IPv4 don't fragment flag [default: false]
    #[arg(short = 'D', long)]
    pub dont_fragment: bool,
}

fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    Ok(humantime::parse_duration(value)?)
}
