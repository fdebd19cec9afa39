use crate::network::{SimulatedDns, SimulatedNetwork};
use crate::simulation::{Host, Simulation};
use hopwatch_core::{
    Builder, Cancellation, Error, HopUpdate, Pinger, Severity, Status, TraceCoordinator,
    TraceObserver, TraceStart, TraceState,
};
use hopwatch_dns::DnsResolver;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};
use test_case::test_case;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

/// How long to wait for a trace to finish or for hostnames to settle.
const WAIT: Duration = Duration::from_secs(10);

const DEFAULT_TIMEOUT_MS: u64 = 20;

static LOGGING: Once = Once::new();

fn init_logging() {
    LOGGING.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::NONE)
            .with_env_filter("sim=debug,hopwatch_core=debug,hopwatch_dns=debug")
            .with_test_writer()
            .init();
    });
}

macro_rules! sim {
    ($path:expr) => {{
        let data = include_str!(concat!("../resources/simulation/", $path));
        toml::from_str(data)?
    }};
}

#[test_case(sim!("ipv4_target_at_ttl4.toml"))]
#[test_case(sim!("ipv4_routers.toml"))]
#[test_case(sim!("ipv4_gaps.toml"))]
#[test_case(sim!("ipv4_lossy.toml"))]
#[test_case(sim!("ipv4_unreachable_target.toml"))]
#[test_case(sim!("ipv4_send_failure.toml"))]
#[test_case(sim!("ipv4_hostnames.toml"))]
#[test_case(sim!("ipv4_multipath.toml"))]
#[test_case(sim!("ipv4_target_reply_lost.toml"))]
#[test_case(sim!("ipv6_routers.toml"))]
fn test_simulation(simulation: Simulation) -> anyhow::Result<()> {
    init_logging();
    let sim = Arc::new(simulation);
    info!("start simulating {}", sim.name);
    let network = SimulatedNetwork::new(sim.clone());
    let recorder = Arc::new(Recorder::default());
    let coordinator = coordinator(&sim, network.clone(), recorder.clone())?;
    assert_eq!(TraceStart::Started, coordinator.start(&sim.target.to_string())?);
    anyhow::ensure!(coordinator.wait_idle(WAIT), "{} did not complete", sim.name);
    wait_for_hostnames(&coordinator, &sim)?;
    let rows = coordinator.snapshot();
    let actual: Vec<_> = rows
        .iter()
        .map(|row| (row.ttl.0, row.addr, row.stats.sent, row.stats.received))
        .collect();
    let expected: Vec<_> = sim
        .expected
        .iter()
        .map(|row| (row.ttl, row.addr, row.sent, row.received))
        .collect();
    assert_eq!(expected, actual, "{}", sim.name);
    let updates = recorder.updates();
    for hop in &sim.expected_hops {
        let latest = updates
            .iter()
            .rev()
            .find(|update| update.addr == hop.addr)
            .map(|update| (update.stats.sent, update.stats.received));
        assert_eq!(Some((hop.sent, hop.received)), latest, "{} {}", sim.name, hop.addr);
    }
    assert_eq!(sim.rounds.unwrap_or(1), coordinator.round_count());
    assert_eq!(TraceState::Idle, coordinator.state());
    assert_eq!(
        Some(Severity::Info),
        recorder.statuses().last().map(|status| status.severity)
    );
    let probed_ttl = network.probes().keys().max().copied();
    let max_ttl = sim.max_ttl.unwrap_or(hopwatch_core::defaults::DEFAULT_MAX_TTL);
    assert!(probed_ttl.is_some_and(|ttl| ttl <= max_ttl));
    info!("end simulating {}", sim.name);
    Ok(())
}

#[test]
fn test_target_reached_stops_round() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_target_at_ttl4.toml");
    let sim = Arc::new(sim);
    let network = SimulatedNetwork::new(sim.clone());
    let coordinator = coordinator(&sim, network.clone(), Arc::new(Recorder::default()))?;
    coordinator.start("10.0.0.104")?;
    assert!(coordinator.wait_idle(WAIT));
    let probes: Vec<_> = network.probes().into_iter().collect();
    assert_eq!(vec![(1, 1), (2, 1), (3, 1), (4, 1)], probes);
    Ok(())
}

#[test]
fn test_round_ends_at_target_ttl_without_reply() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_target_reply_lost.toml");
    let sim = Arc::new(sim);
    let network = SimulatedNetwork::new(sim.clone());
    let coordinator = coordinator(&sim, network.clone(), Arc::new(Recorder::default()))?;
    coordinator.start(&sim.target.to_string())?;
    assert!(coordinator.wait_idle(WAIT));
    let probes: Vec<_> = network.probes().into_iter().collect();
    assert_eq!(vec![(1, 3), (2, 3), (3, 3)], probes);
    let target_rows = coordinator
        .snapshot()
        .iter()
        .filter(|row| row.addr == sim.target)
        .count();
    assert_eq!(1, target_rows);
    Ok(())
}

#[test]
fn test_updates_published_per_hop() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_routers.toml");
    let sim = Arc::new(sim);
    let recorder = Arc::new(Recorder::default());
    let coordinator = coordinator(&sim, SimulatedNetwork::new(sim.clone()), recorder.clone())?;
    coordinator.start(&sim.target.to_string())?;
    assert!(coordinator.wait_idle(WAIT));
    let updates = recorder.updates();
    for round in 0..3 {
        let ttls: Vec<_> = updates
            .iter()
            .filter(|update| update.round.0 == round && update.ttl.0 <= 3)
            .map(|update| update.ttl.0)
            .collect();
        assert_eq!(vec![1, 2, 3], ttls, "round {round}");
    }
    Ok(())
}

#[test]
fn test_stop_returns_to_idle() -> anyhow::Result<()> {
    init_logging();
    let sim = Arc::new(silent_network());
    let recorder = Arc::new(Recorder::default());
    let coordinator = coordinator(&sim, SimulatedNetwork::new(sim.clone()), recorder.clone())?;
    assert_eq!(TraceStart::Started, coordinator.start("10.0.0.200")?);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(TraceState::Tracing, coordinator.state());
    let stopped_at = Instant::now();
    coordinator.stop();
    assert!(coordinator.wait_idle(WAIT));
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(TraceState::Idle, coordinator.state());
    let statuses = recorder.statuses();
    assert_eq!(
        Some("trace to 10.0.0.200 stopped"),
        statuses.last().map(|status| status.message.as_str())
    );
    assert!(statuses
        .iter()
        .all(|status| status.severity == Severity::Info));
    Ok(())
}

#[test]
fn test_start_while_active_is_noop() -> anyhow::Result<()> {
    let sim = Arc::new(silent_network());
    let coordinator = coordinator(
        &sim,
        SimulatedNetwork::new(sim.clone()),
        Arc::new(Recorder::default()),
    )?;
    assert_eq!(TraceStart::Started, coordinator.start("10.0.0.200")?);
    assert_eq!(TraceStart::AlreadyRunning, coordinator.start("10.0.0.201")?);
    assert_eq!(Some(IpAddr::from([10, 0, 0, 200])), coordinator.target_addr());
    coordinator.stop();
    assert!(coordinator.wait_idle(WAIT));
    Ok(())
}

#[test]
fn test_clear_rejected_while_active() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_routers.toml");
    let sim = Arc::new(Simulation {
        rounds: None,
        ..sim
    });
    let coordinator = coordinator(
        &sim,
        SimulatedNetwork::new(sim.clone()),
        Arc::new(Recorder::default()),
    )?;
    coordinator.start(&sim.target.to_string())?;
    assert!(matches!(coordinator.clear(), Err(Error::TraceActive)));
    coordinator.stop();
    assert!(coordinator.wait_idle(WAIT));
    assert!(!coordinator.snapshot().is_empty());
    coordinator.clear()?;
    assert!(coordinator.snapshot().is_empty());
    assert_eq!(0, coordinator.round_count());
    Ok(())
}

#[test]
fn test_restart_same_target_accumulates() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_target_at_ttl4.toml");
    let sim = Arc::new(sim);
    let coordinator = coordinator(
        &sim,
        SimulatedNetwork::new(sim.clone()),
        Arc::new(Recorder::default()),
    )?;
    for _ in 0..2 {
        assert_eq!(TraceStart::Started, coordinator.start("10.0.0.104")?);
        assert!(coordinator.wait_idle(WAIT));
    }
    let rows = coordinator.snapshot();
    assert_eq!(1, rows.len());
    assert_eq!(2, rows[0].stats.sent);
    assert_eq!(2, coordinator.round_count());
    Ok(())
}

#[test]
fn test_start_by_hostname() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_hostnames.toml");
    let sim = Arc::new(sim);
    let coordinator = coordinator(
        &sim,
        SimulatedNetwork::new(sim.clone()),
        Arc::new(Recorder::default()),
    )?;
    assert_eq!(TraceStart::Started, coordinator.start("target.example")?);
    assert_eq!(Some(sim.target), coordinator.target_addr());
    assert!(coordinator.wait_idle(WAIT));
    assert!(matches!(
        coordinator.start("missing.example"),
        Err(Error::UnknownHost(..))
    ));
    Ok(())
}

#[test]
fn test_hostname_published_when_resolved() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_hostnames.toml");
    let sim = Arc::new(sim);
    let recorder = Arc::new(Recorder::default());
    let coordinator = coordinator(&sim, SimulatedNetwork::new(sim.clone()), recorder.clone())?;
    coordinator.start(&sim.target.to_string())?;
    assert!(coordinator.wait_idle(WAIT));
    wait_for_hostnames(&coordinator, &sim)?;
    let router = IpAddr::from([10, 0, 0, 1]);
    assert!(recorder
        .updates()
        .iter()
        .any(|update| update.addr == router && update.hostname == "router.example"));
    Ok(())
}

#[test]
fn test_ping() -> anyhow::Result<()> {
    let sim: Simulation = sim!("ipv4_routers.toml");
    let sim = Arc::new(sim);
    let pinger = Pinger::new(
        Arc::new(SimulatedNetwork::new(sim.clone())),
        resolver(sim.hosts.clone())?,
    );
    let report = pinger.run(
        &sim.target.to_string(),
        3,
        Duration::from_millis(20),
        false,
        &Cancellation::new(),
    )?;
    assert_eq!(3, report.replies.len());
    assert_eq!(3, report.stats.received);
    assert!(!report.cancelled);
    Ok(())
}

#[test]
fn test_ping_cancelled() -> anyhow::Result<()> {
    let sim = Arc::new(silent_network());
    let pinger = Pinger::new(Arc::new(SimulatedNetwork::new(sim.clone())), resolver(vec![])?);
    let cancel = Cancellation::new();
    let canceller = cancel.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });
    let report = pinger.run("10.0.0.200", 1000, Duration::from_millis(20), false, &cancel)?;
    handle.join().unwrap();
    assert!(report.cancelled);
    assert!(report.replies.len() < 1000);
    assert_eq!(0, report.stats.received);
    Ok(())
}

/// A network in which nothing ever responds.
fn silent_network() -> Simulation {
    toml::from_str(include_str!("../resources/simulation/ipv4_silent.toml"))
        .expect("valid simulation")
}

fn resolver(hosts: Vec<Host>) -> anyhow::Result<DnsResolver> {
    Ok(DnsResolver::with_provider(
        hopwatch_dns::Config::default(),
        Arc::new(SimulatedDns::new(hosts)),
    )?)
}

fn coordinator(
    sim: &Simulation,
    network: SimulatedNetwork,
    observer: Arc<dyn TraceObserver>,
) -> anyhow::Result<TraceCoordinator> {
    let mut builder = Builder::new()
        .timeout(Duration::from_millis(
            sim.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        ))
        .max_rounds(sim.rounds)
        .base_delay(Duration::from_millis(10))
        .min_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(50))
        .resolver(resolver(sim.hosts.clone())?)
        .probe_sender(network)
        .observer_arc(observer);
    if let Some(max_ttl) = sim.max_ttl {
        builder = builder.max_ttl(max_ttl);
    }
    if let Some(parallel_requests) = sim.parallel_requests {
        builder = builder.parallel_requests(parallel_requests);
    }
    Ok(builder.build()?)
}

/// Wait for the background reverse lookups to update the expected rows.
fn wait_for_hostnames(coordinator: &TraceCoordinator, sim: &Simulation) -> anyhow::Result<()> {
    let deadline = Instant::now() + WAIT;
    loop {
        let rows = coordinator.snapshot();
        let settled = sim.expected.iter().all(|expected| {
            expected.hostname.as_ref().map_or(true, |hostname| {
                rows.iter()
                    .any(|row| row.ttl.0 == expected.ttl && &row.hostname == hostname)
            })
        });
        if settled {
            return Ok(());
        }
        anyhow::ensure!(
            Instant::now() < deadline,
            "{} hostnames did not resolve",
            sim.name
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<HopUpdate>>,
    statuses: Mutex<Vec<Status>>,
}

impl Recorder {
    fn updates(&self) -> Vec<HopUpdate> {
        self.updates.lock().clone()
    }

    fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().clone()
    }
}

impl TraceObserver for Recorder {
    fn on_hop_update(&self, update: &HopUpdate) {
        self.updates.lock().push(update.clone());
    }

    fn on_status(&self, status: &Status) {
        self.statuses.lock().push(status.clone());
    }
}
