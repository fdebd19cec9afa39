use crate::config::{Action, HopwatchConfig, LogFormat, LogSpanEvents, PingSettings, TraceSettings};
use anyhow::{anyhow, Context};
use hopwatch_core::export::format_row;
use hopwatch_core::{
    Builder, Cancellation, HopUpdate, IcmpProbeSender, Pinger, Severity, Status, TraceObserver,
    TraceRow, TraceStart,
};
use hopwatch_dns::DnsResolver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::fmt::format::FmtSpan;

/// How often the main thread checks whether the trace has finished.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run the hopwatch application.
pub fn run_hopwatch(cfg: &HopwatchConfig) -> anyhow::Result<()> {
    configure_logging(cfg);
    debug!(action = ?cfg.action, dns = ?cfg.dns, "starting");
    let resolver = start_dns_resolver(cfg)?;
    match &cfg.action {
        Action::Trace(trace) => run_trace(trace, resolver),
        Action::Ping(ping) => run_ping(ping, resolver),
    }
}

/// Trace until the configured number of rounds completes or Ctrl-C is pressed.
fn run_trace(cfg: &TraceSettings, resolver: DnsResolver) -> anyhow::Result<()> {
    let observer = Arc::new(StreamObserver::default());
    let mut builder = Builder::new()
        .max_ttl(cfg.max_ttl)
        .timeout(cfg.timeout)
        .base_delay(cfg.base_delay)
        .min_delay(cfg.min_delay)
        .high_loss_threshold(cfg.high_loss_threshold)
        .low_loss_threshold(cfg.low_loss_threshold)
        .payload_size(cfg.payload_size)
        .parallel_requests(cfg.parallel_requests)
        .max_samples(cfg.max_samples)
        .dont_fragment(cfg.dont_fragment)
        .max_rounds(cfg.rounds)
        .resolver(resolver)
        .observer_arc(observer.clone());
    if let Some(max_delay) = cfg.max_delay {
        builder = builder.max_delay(max_delay);
    }
    let coordinator = builder.build()?;
    let stopper = coordinator.clone();
    ctrlc::set_handler(move || stopper.stop()).context("failed to set Ctrl-C handler")?;
    if coordinator.start(&cfg.target)? == TraceStart::AlreadyRunning {
        return Err(anyhow!("a trace is already running"));
    }
    while !coordinator.wait_idle(IDLE_POLL_INTERVAL) {}
    println!();
    print!("{}", coordinator.export_text());
    match observer.last_error() {
        Some(err) => Err(anyhow!(err)),
        None => Ok(()),
    }
}

/// Ping until the configured count completes or Ctrl-C is pressed.
fn run_ping(cfg: &PingSettings, resolver: DnsResolver) -> anyhow::Result<()> {
    let pinger = Pinger::new(Arc::new(IcmpProbeSender::new()), resolver)
        .with_payload_size(cfg.payload_size);
    let cancel = Cancellation::new();
    let canceller = cancel.clone();
    ctrlc::set_handler(move || canceller.cancel()).context("failed to set Ctrl-C handler")?;
    let report = pinger.run(
        &cfg.target,
        cfg.count,
        cfg.timeout,
        cfg.dont_fragment,
        &cancel,
    )?;
    print!("{report}");
    Ok(())
}

/// Start the DNS resolver.
fn start_dns_resolver(cfg: &HopwatchConfig) -> anyhow::Result<DnsResolver> {
    Ok(DnsResolver::start(cfg.dns.clone())?)
}

fn configure_logging(cfg: &HopwatchConfig) {
    if cfg.verbose {
        let fmt_span = match cfg.log_span_events {
            LogSpanEvents::Off => FmtSpan::NONE,
            LogSpanEvents::Active => FmtSpan::ACTIVE,
            LogSpanEvents::Full => FmtSpan::FULL,
        };
        let subscriber = tracing_subscriber::fmt()
            .with_span_events(fmt_span)
            .with_env_filter(&cfg.log_filter)
            .with_writer(std::io::stderr);
        match cfg.log_format {
            LogFormat::Compact => subscriber.compact().init(),
            LogFormat::Pretty => subscriber.pretty().init(),
            LogFormat::Json => subscriber.json().init(),
        }
    }
}

/// Prints each hop update as it arrives.
#[derive(Default)]
struct StreamObserver {
    last_error: Mutex<Option<String>>,
}

impl StreamObserver {
    fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl TraceObserver for StreamObserver {
    fn on_hop_update(&self, update: &HopUpdate) {
        let row = TraceRow {
            ttl: update.ttl,
            addr: update.addr,
            hostname: update.hostname.clone(),
            stats: update.stats,
        };
        println!("[{:>4}] {}", update.round.0, format_row(&row));
    }

    fn on_status(&self, status: &Status) {
        eprintln!("{}: {}", status.severity, status.message);
        if status.severity == Severity::Error {
            *self.last_error.lock() = Some(status.message.clone());
        }
    }
}
