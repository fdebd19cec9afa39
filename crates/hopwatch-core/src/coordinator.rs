use crate::config::{TraceConfig, TraceState};
use crate::error::Result;
use crate::observer::TraceObserver;
use crate::probe::ProbeSender;
use crate::state::TraceRow;
use hopwatch_dns::DnsResolver;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// The outcome of [`TraceCoordinator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStart {
    /// A new trace was started.
    Started,
    /// A trace is already active; it was left untouched.
    AlreadyRunning,
}

/// Runs repeated rounds of probing towards a target and publishes the
/// results to a [`TraceObserver`].
///
/// Use the [`crate::Builder`] type to create a [`TraceCoordinator`].
///
/// Note that this type is cheaply cloneable; all clones control the same
/// trace.
///
/// # Example
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use hopwatch_core::{Builder, TraceStart};
/// use std::time::Duration;
///
/// let coordinator = Builder::new().max_rounds(Some(3)).build()?;
/// assert_eq!(TraceStart::Started, coordinator.start("example.com")?);
/// coordinator.wait_idle(Duration::from_secs(60));
/// print!("{}", coordinator.export_text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TraceCoordinator {
    inner: Arc<inner::CoordinatorInner>,
}

impl TraceCoordinator {
    pub(crate) fn new(
        config: TraceConfig,
        sender: Arc<dyn ProbeSender>,
        resolver: DnsResolver,
        observer: Arc<dyn TraceObserver>,
    ) -> Self {
        let inner = Arc::new(inner::CoordinatorInner::new(
            config, sender, resolver, observer,
        ));
        let weak = Arc::downgrade(&inner);
        inner.resolver().subscribe(move |addr, hostname| {
            if let Some(inner) = weak.upgrade() {
                inner.hostname_resolved(addr, hostname);
            }
        });
        Self { inner }
    }

    /// Start tracing `host`, a host name or literal address.
    ///
    /// Returns [`TraceStart::AlreadyRunning`] without side effects if a trace
    /// is active.  Starting a trace to a different address than the previous
    /// trace discards the previous results.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BadConfig`] for an empty host and
    /// [`crate::Error::UnknownHost`] if the host cannot be resolved.
    pub fn start(&self, host: &str) -> Result<TraceStart> {
        self.inner.start(host)
    }

    /// Request the active trace to stop.
    ///
    /// The trace stops at its next cancellation check, which is before each
    /// probe batch and during the delay between rounds.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Discard all hops and rows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TraceActive`] if a trace is active.
    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    /// Block until the trace is idle or `timeout` elapses.
    ///
    /// Returns `true` if the trace is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.wait_idle(timeout)
    }

    #[must_use]
    pub fn state(&self) -> TraceState {
        self.inner.state()
    }

    /// A snapshot of all rows, ordered by ttl.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TraceRow> {
        self.inner.snapshot()
    }

    /// The number of rounds completed since the results were last reset.
    #[must_use]
    pub fn round_count(&self) -> usize {
        self.inner.round_count()
    }

    /// The address of the current or most recent target.
    #[must_use]
    pub fn target_addr(&self) -> Option<IpAddr> {
        self.inner.target_addr()
    }

    #[must_use]
    pub fn config(&self) -> &TraceConfig {
        self.inner.config()
    }

    #[must_use]
    pub fn resolver(&self) -> &DnsResolver {
        self.inner.resolver()
    }

    /// Render all rows as plain text, one line per row.
    #[must_use]
    pub fn export_text(&self) -> String {
        crate::export::to_text(&self.snapshot())
    }
}

mod inner {
    use super::TraceStart;
    use crate::cancel::Cancellation;
    use crate::config::{TraceConfig, TraceState};
    use crate::error::{Error, Result};
    use crate::observer::{HopUpdate, Status, TraceObserver};
    use crate::pacing::adaptive_delay;
    use crate::probe::{ProbeReply, ProbeRequest, ProbeSender, ProbeStatus};
    use crate::state::{TraceRow, TraceTable};
    use crate::types::{RoundId, TimeToLive};
    use hopwatch_dns::DnsResolver;
    use parking_lot::{Condvar, Mutex};
    use std::net::IpAddr;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tracing::{debug, error, instrument, trace};

    #[derive(Debug, Default)]
    struct Session {
        state: TraceState,
        target: Option<IpAddr>,
        cancel: Cancellation,
    }

    pub(super) struct CoordinatorInner {
        config: TraceConfig,
        sender: Arc<dyn ProbeSender>,
        resolver: DnsResolver,
        observer: Arc<dyn TraceObserver>,
        table: TraceTable,
        session: Mutex<Session>,
        idle: Condvar,
        rounds: AtomicUsize,
    }

    /// Returns the session to `Idle` when the round loop ends, however it ends.
    struct IdleGuard<'a>(&'a CoordinatorInner);

    impl Drop for IdleGuard<'_> {
        fn drop(&mut self) {
            self.0.session.lock().state = TraceState::Idle;
            self.0.idle.notify_all();
        }
    }

    impl CoordinatorInner {
        pub(super) fn new(
            config: TraceConfig,
            sender: Arc<dyn ProbeSender>,
            resolver: DnsResolver,
            observer: Arc<dyn TraceObserver>,
        ) -> Self {
            Self {
                table: TraceTable::new(config.max_samples),
                config,
                sender,
                resolver,
                observer,
                session: Mutex::new(Session::default()),
                idle: Condvar::new(),
                rounds: AtomicUsize::new(0),
            }
        }

        pub(super) fn start(self: &Arc<Self>, host: &str) -> Result<TraceStart> {
            let host = host.trim();
            if host.is_empty() {
                return Err(Error::BadConfig(String::from("target host may not be empty")));
            }
            if self.state().is_active() {
                return Ok(TraceStart::AlreadyRunning);
            }
            let target = self.resolve_target(host)?;
            let cancel = Cancellation::new();
            {
                let mut session = self.session.lock();
                if session.state.is_active() {
                    return Ok(TraceStart::AlreadyRunning);
                }
                if session.target != Some(target) {
                    self.table.clear();
                    self.rounds.store(0, Ordering::SeqCst);
                }
                *session = Session {
                    state: TraceState::Tracing,
                    target: Some(target),
                    cancel: cancel.clone(),
                };
            }
            self.observer
                .on_status(&Status::info(format!("tracing {host} ({target})")));
            let inner = self.clone();
            let spawned = thread::Builder::new()
                .name(format!("trace-{target}"))
                .spawn(move || inner.run(target, &cancel));
            if let Err(err) = spawned {
                let _guard = IdleGuard(self);
                let err = Error::Other(format!("failed to spawn trace thread: {err}"));
                self.observer.on_status(&Status::error(err.to_string()));
                return Err(err);
            }
            Ok(TraceStart::Started)
        }

        pub(super) fn stop(&self) {
            let mut session = self.session.lock();
            if session.state == TraceState::Tracing {
                session.state = TraceState::Stopping;
                session.cancel.cancel();
            }
        }

        pub(super) fn clear(&self) -> Result<()> {
            let session = self.session.lock();
            if session.state.is_active() {
                return Err(Error::TraceActive);
            }
            self.table.clear();
            self.rounds.store(0, Ordering::SeqCst);
            Ok(())
        }

        pub(super) fn wait_idle(&self, timeout: Duration) -> bool {
            let deadline = Instant::now().checked_add(timeout);
            let mut session = self.session.lock();
            while session.state.is_active() {
                match deadline {
                    Some(deadline) => {
                        if self.idle.wait_until(&mut session, deadline).timed_out() {
                            return !session.state.is_active();
                        }
                    }
                    None => self.idle.wait(&mut session),
                }
            }
            true
        }

        pub(super) fn state(&self) -> TraceState {
            self.session.lock().state
        }

        pub(super) fn snapshot(&self) -> Vec<TraceRow> {
            self.table.rows()
        }

        pub(super) fn round_count(&self) -> usize {
            self.rounds.load(Ordering::SeqCst)
        }

        pub(super) fn target_addr(&self) -> Option<IpAddr> {
            self.session.lock().target
        }

        pub(super) const fn config(&self) -> &TraceConfig {
            &self.config
        }

        pub(super) const fn resolver(&self) -> &DnsResolver {
            &self.resolver
        }

        /// Republish every row displaying `addr` with its new hostname.
        pub(super) fn hostname_resolved(&self, addr: IpAddr, hostname: &str) {
            let round = RoundId(self.round_count());
            for row in self.table.set_hostname(addr, hostname) {
                self.publish(row, round);
            }
        }

        fn resolve_target(&self, host: &str) -> Result<IpAddr> {
            if let Ok(addr) = IpAddr::from_str(host) {
                return Ok(addr);
            }
            self.resolver
                .lookup(host)
                .map_err(|err| Error::UnknownHost(host.to_string(), err))?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Other(format!("no address for {host}")))
        }

        #[instrument(skip(self, cancel), level = "trace")]
        fn run(&self, target: IpAddr, cancel: &Cancellation) {
            let _guard = IdleGuard(self);
            match self.run_rounds(target, cancel) {
                Ok(()) if cancel.is_cancelled() => {
                    self.observer
                        .on_status(&Status::info(format!("trace to {target} stopped")));
                }
                Ok(()) => {
                    self.observer
                        .on_status(&Status::info(format!("trace to {target} complete")));
                }
                Err(err) => {
                    error!(%target, %err, "trace failed");
                    self.observer.on_status(&Status::error(err.to_string()));
                }
            }
        }

        fn run_rounds(&self, target: IpAddr, cancel: &Cancellation) -> Result<()> {
            let mut completed = 0_usize;
            let mut target_ttl = None;
            loop {
                let round = RoundId(self.round_count());
                if !self.run_round(target, round, &mut target_ttl, cancel)? {
                    return Ok(());
                }
                self.rounds.fetch_add(1, Ordering::SeqCst);
                completed += 1;
                if self
                    .config
                    .max_rounds
                    .is_some_and(|max_rounds| completed >= max_rounds.0.get())
                {
                    return Ok(());
                }
                let delay = adaptive_delay(self.table.aggregate_loss(), &self.config.pacing);
                debug!(round = round.0, ?delay, "round complete");
                if cancel.wait_timeout(delay) {
                    return Ok(());
                }
            }
        }

        /// Probe each ttl in turn until the target replies or the lowest ttl
        /// at which it has replied in an earlier round is probed.
        ///
        /// Returns `false` if the round was cancelled.
        #[instrument(skip(self, target_ttl, cancel), level = "trace")]
        fn run_round(
            &self,
            target: IpAddr,
            round: RoundId,
            target_ttl: &mut Option<TimeToLive>,
            cancel: &Cancellation,
        ) -> Result<bool> {
            for ttl in 1..=self.config.max_ttl.0 {
                if cancel.is_cancelled() {
                    return Ok(false);
                }
                let ttl = TimeToLive(ttl);
                let replies = self.probe_ttl(target, ttl, cancel)?;
                if self.update(ttl, round, &replies) {
                    trace!(ttl = ttl.0, "target reached");
                    *target_ttl = Some(target_ttl.map_or(ttl, |known| known.min(ttl)));
                    break;
                }
                if *target_ttl == Some(ttl) {
                    trace!(ttl = ttl.0, "no reply from target");
                    break;
                }
            }
            Ok(true)
        }

        /// Send `parallel_requests` concurrent probes at `ttl` and wait for
        /// them all.
        fn probe_ttl(
            &self,
            target: IpAddr,
            ttl: TimeToLive,
            cancel: &Cancellation,
        ) -> Result<Vec<ProbeReply>> {
            let request = ProbeRequest {
                target,
                ttl,
                timeout: self.config.timeout,
                payload_size: self.config.payload_size,
                dont_fragment: self.config.dont_fragment,
            };
            let sender = self.sender.as_ref();
            thread::scope(|scope| {
                let mut handles = Vec::with_capacity(usize::from(self.config.parallel_requests.0));
                for id in 0..self.config.parallel_requests.0 {
                    if cancel.is_cancelled() {
                        break;
                    }
                    handles.push(
                        thread::Builder::new()
                            .name(format!("probe-{}-{id}", ttl.0))
                            .spawn_scoped(scope, move || sender.send(&request)),
                    );
                }
                // join every worker before reporting the first failure
                let joined = handles
                    .into_iter()
                    .map(|handle| match handle {
                        Ok(handle) => handle.join().map_err(|_| Error::ProbePanicked(ttl.0)),
                        Err(err) => Err(Error::Other(format!("failed to spawn probe: {err}"))),
                    })
                    .collect::<Vec<_>>();
                joined.into_iter().collect()
            })
        }

        /// Record the replies for `ttl` and publish the row.
        ///
        /// Returns `true` if the target replied.
        fn update(&self, ttl: TimeToLive, round: RoundId, replies: &[ProbeReply]) -> bool {
            let mut reached = false;
            for reply in replies {
                reached |= reply.status == ProbeStatus::Success;
                match reply.addr.filter(|_| reply.status.is_reply()) {
                    Some(addr) => {
                        self.table.hop(addr).record(true, reply.elapsed);
                        self.table.set_row(ttl, addr, self.resolver.resolve(addr));
                        // a lookup completing before the row existed found nothing to upgrade
                        if let Some(hostname) = self.resolver.cached(addr) {
                            self.table.set_hostname(addr, &hostname);
                        }
                    }
                    None => match self.table.row_addr(ttl) {
                        Some(addr) => self.table.hop(addr).record(false, reply.elapsed),
                        None => trace!(ttl = ttl.0, status = %reply.status, "no responding address"),
                    },
                }
            }
            if let Some(row) = self.table.row(ttl) {
                self.publish(row, round);
            }
            reached
        }

        fn publish(&self, row: TraceRow, round: RoundId) {
            self.observer.on_hop_update(&HopUpdate {
                addr: row.addr,
                ttl: row.ttl,
                hostname: row.hostname,
                stats: row.stats,
                round,
            });
        }
    }
}
