use crate::config::Config;
use crate::provider;
use crate::resolver::{Error, Provider, Result};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// A callback invoked with `(addr, name)` each time a reverse lookup completes.
pub type Listener = Arc<dyn Fn(IpAddr, &str) + Send + Sync>;

/// A cheaply cloneable, non-blocking, caching reverse DNS resolver.
///
/// Reverse lookups are performed by a fixed pool of worker threads, which
/// bounds the number of lookups in progress at any one time.  Concurrent
/// requests for the same address never issue more than one lookup.
#[derive(Clone)]
pub struct DnsResolver {
    inner: Arc<inner::DnsResolver>,
}

impl DnsResolver {
    /// Create and start a new `DnsResolver` using the configured provider.
    pub fn start(config: Config) -> Result<Self> {
        let provider = provider::for_config(&config)?;
        Self::with_provider(config, provider)
    }

    /// Create and start a new `DnsResolver` backed by a custom `Provider`.
    pub fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(inner::DnsResolver::start(config, provider)?),
        })
    }

    /// Get the `Config`.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    /// Return the name for `addr` without blocking.
    ///
    /// If the address has a live cache entry it is returned immediately.
    /// Otherwise, the current (possibly stale) name or the placeholder is
    /// returned and a background lookup is scheduled, unless one is already
    /// in flight for the address.
    #[must_use]
    pub fn resolve(&self, addr: IpAddr) -> String {
        self.inner.resolve(addr)
    }

    /// As [`DnsResolver::resolve`] for an address in string form.
    ///
    /// An address which cannot be parsed resolves to the placeholder.
    #[must_use]
    pub fn resolve_str(&self, addr: &str) -> String {
        match IpAddr::from_str(addr.trim()) {
            Ok(addr) => self.inner.resolve(addr),
            Err(_) => self.config().placeholder.clone(),
        }
    }

    /// Return the cached name for `addr`, if any, without scheduling a lookup.
    #[must_use]
    pub fn cached(&self, addr: IpAddr) -> Option<String> {
        self.inner.cached(addr)
    }

    /// Perform a blocking forward lookup of `hostname`.
    pub fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        let addrs = self.inner.lookup(hostname)?;
        if addrs.is_empty() {
            Err(Error::NoAddresses(hostname.to_string()))
        } else {
            Ok(addrs)
        }
    }

    /// Register a listener to be notified when a reverse lookup completes.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(IpAddr, &str) + Send + Sync + 'static,
    {
        self.inner.subscribe(Arc::new(listener));
    }

    /// The number of reverse lookups queued or in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight()
    }

    /// Flush the cache of responses.
    pub fn flush(&self) {
        self.inner.flush();
    }
}

/// Private impl of resolver.
mod inner {
    use super::Listener;
    use crate::config::Config;
    use crate::resolver::{Error, Provider, Result};
    use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
    use parking_lot::{Mutex, RwLock};
    use std::collections::{HashMap, HashSet};
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tracing::{debug, instrument, trace};

    /// The maximum number of reverse DNS lookups that may be queued.
    const RESOLVER_MAX_QUEUE_SIZE: usize = 100;

    /// A cache entry for a reverse DNS lookup.
    #[derive(Debug, Clone)]
    struct CacheEntry {
        /// The name to return for the address.
        name: String,
        /// Whether `name` came from a successful lookup.
        resolved: bool,
        /// When the entry should next be refreshed.
        expires: Instant,
    }

    /// The outcome of a single reverse lookup.
    #[derive(Debug)]
    enum Outcome {
        Resolved(String),
        NotFound,
        Failed(Error),
    }

    /// State shared between the resolver handle and its workers.
    struct Shared {
        config: Config,
        provider: Arc<dyn Provider>,
        cache: RwLock<HashMap<IpAddr, CacheEntry>>,
        in_flight: Mutex<HashSet<IpAddr>>,
        listeners: RwLock<Vec<Listener>>,
    }

    impl Shared {
        /// Store the outcome of a lookup and return the name now cached.
        fn complete(&self, addr: IpAddr, outcome: Outcome) -> String {
            if let Outcome::Failed(err) = &outcome {
                debug!(%addr, %err, "reverse lookup failed");
            }
            let now = Instant::now();
            let mut cache = self.cache.write();
            let previous = cache.get(&addr).filter(|entry| entry.resolved).cloned();
            let entry = match (outcome, previous) {
                (Outcome::Resolved(name), _) => CacheEntry {
                    name,
                    resolved: true,
                    expires: now + self.config.resolved_ttl,
                },
                (Outcome::NotFound | Outcome::Failed(_), Some(previous)) => CacheEntry {
                    expires: now + self.config.unresolved_ttl,
                    ..previous
                },
                (Outcome::NotFound | Outcome::Failed(_), None) => CacheEntry {
                    name: self.config.placeholder.clone(),
                    resolved: false,
                    expires: now + self.config.unresolved_ttl,
                },
            };
            let name = entry.name.clone();
            cache.insert(addr, entry);
            name
        }

        fn notify(&self, addr: IpAddr, name: &str) {
            let listeners = self.listeners.read().clone();
            for listener in listeners {
                listener(addr, name);
            }
        }
    }

    /// Removes an address from the in-flight set when dropped.
    struct InFlightGuard<'a> {
        addr: IpAddr,
        in_flight: &'a Mutex<HashSet<IpAddr>>,
    }

    impl Drop for InFlightGuard<'_> {
        fn drop(&mut self) {
            self.in_flight.lock().remove(&self.addr);
        }
    }

    /// Resolver implementation.
    pub(super) struct DnsResolver {
        shared: Arc<Shared>,
        tx: Sender<IpAddr>,
    }

    impl DnsResolver {
        pub(super) fn start(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
            let (tx, rx) = bounded(RESOLVER_MAX_QUEUE_SIZE);
            let workers = config.max_concurrent.max(1);
            let shared = Arc::new(Shared {
                config,
                provider,
                cache: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                listeners: RwLock::new(Vec::new()),
            });
            // each worker runs until every `Sender` has been dropped.
            for id in 0..workers {
                let rx = rx.clone();
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("dns-worker-{id}"))
                    .spawn(move || resolver_queue_processor(&rx, &shared))?;
            }
            Ok(Self { shared, tx })
        }

        pub(super) fn config(&self) -> &Config {
            &self.shared.config
        }

        pub(super) fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>> {
            self.shared.provider.lookup(hostname)
        }

        pub(super) fn resolve(&self, addr: IpAddr) -> String {
            let config = &self.shared.config;
            if !config.resolve_private && is_private(addr) {
                return config.placeholder.clone();
            }
            let now = Instant::now();
            if let Some(entry) = self.shared.cache.read().get(&addr) {
                if entry.expires > now {
                    return entry.name.clone();
                }
            }
            // Seed the cache with the placeholder so that concurrent callers
            // see an entry rather than scheduling their own lookup.  An expired
            // entry keeps its stale name until the refresh completes.
            let name = {
                let mut cache = self.shared.cache.write();
                let mut seeded = false;
                let entry = cache.entry(addr).or_insert_with(|| {
                    seeded = true;
                    CacheEntry {
                        name: config.placeholder.clone(),
                        resolved: false,
                        expires: now + config.unresolved_ttl,
                    }
                });
                if !seeded && entry.expires > now {
                    return entry.name.clone();
                }
                entry.name.clone()
            };
            self.enqueue(addr);
            name
        }

        pub(super) fn cached(&self, addr: IpAddr) -> Option<String> {
            self.shared
                .cache
                .read()
                .get(&addr)
                .map(|entry| entry.name.clone())
        }

        pub(super) fn subscribe(&self, listener: Listener) {
            self.shared.listeners.write().push(listener);
        }

        pub(super) fn in_flight(&self) -> usize {
            self.shared.in_flight.lock().len()
        }

        pub(super) fn flush(&self) {
            self.shared.cache.write().clear();
        }

        /// Schedule a lookup of `addr` unless one is already in flight.
        ///
        /// If the queue is full the lookup is dropped and will be retried once
        /// the cached placeholder expires.
        fn enqueue(&self, addr: IpAddr) {
            if !self.shared.in_flight.lock().insert(addr) {
                trace!(%addr, "lookup already in flight");
                return;
            }
            match self.tx.try_send(addr) {
                Ok(()) => trace!(%addr, "lookup enqueued"),
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.shared.in_flight.lock().remove(&addr);
                    debug!(%addr, "lookup queue unavailable, dropping lookup");
                }
            }
        }
    }

    /// Process each `IpAddr` from the resolver queue and perform the reverse DNS lookup.
    fn resolver_queue_processor(rx: &Receiver<IpAddr>, shared: &Shared) {
        for addr in rx {
            let _guard = InFlightGuard {
                addr,
                in_flight: &shared.in_flight,
            };
            reverse_lookup(shared, addr);
        }
        trace!("resolver queue closed");
    }

    /// Perform a reverse lookup of `addr` bounded by the configured timeout.
    ///
    /// The provider call runs on a scoped thread so that a lookup which
    /// outlives the timeout is reported (and cached) as failed straight away,
    /// while the worker slot stays occupied until the call returns.
    #[instrument(skip(shared), level = "trace")]
    fn reverse_lookup(shared: &Shared, addr: IpAddr) {
        let provider = shared.provider.as_ref();
        let timeout = shared.config.timeout;
        thread::scope(|scope| {
            let (tx, rx) = bounded(1);
            let spawned = thread::Builder::new()
                .name(format!("dns-lookup-{addr}"))
                .spawn_scoped(scope, move || {
                    // the receiver may have given up waiting
                    let _ = tx.send(provider.reverse_lookup(addr));
                });
            let outcome = match spawned {
                Ok(_) => wait_for_outcome(&rx, timeout),
                Err(err) => Outcome::Failed(Error::from(err)),
            };
            debug!(%addr, ?outcome, "reverse lookup complete");
            let name = shared.complete(addr, outcome);
            shared.notify(addr, &name);
        });
    }

    fn wait_for_outcome(rx: &Receiver<Result<Option<String>>>, timeout: Duration) -> Outcome {
        match rx.recv_timeout(timeout) {
            Ok(Ok(Some(name))) => Outcome::Resolved(name),
            Ok(Ok(None)) => Outcome::NotFound,
            Ok(Err(err)) => Outcome::Failed(err),
            Err(RecvTimeoutError::Timeout) => Outcome::Failed(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Outcome::Failed(Error::LookupFailed(
                "lookup worker exited without a result".into(),
            )),
        }
    }

    /// Is `addr` a private, loopback or link-local address?
    pub(super) fn is_private(addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(addr) => addr.is_private() || addr.is_loopback() || addr.is_link_local(),
            IpAddr::V6(addr) => {
                let first = addr.segments()[0];
                addr.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Builder;
    use crate::resolver::MockProvider;
    use crossbeam::channel::{unbounded, Receiver, Sender};
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use test_case::test_case;

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
    const WAIT: Duration = Duration::from_secs(5);

    /// A provider which counts lookups and answers from a script.
    struct ScriptedProvider {
        calls: AtomicUsize,
        answers: Mutex<Vec<Result<Option<String>>>>,
        gate: Option<Receiver<()>>,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<Result<Option<String>>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answers: Mutex::new(answers.into_iter().rev().collect()),
                gate: None,
            }
        }

        fn gated(answers: Vec<Result<Option<String>>>) -> (Self, Sender<()>) {
            let (tx, rx) = unbounded();
            let provider = Self {
                gate: Some(rx),
                ..Self::new(answers)
            };
            (provider, tx)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for ScriptedProvider {
        fn lookup(&self, _hostname: &str) -> Result<Vec<IpAddr>> {
            Ok(vec![ADDR])
        }

        fn reverse_lookup(&self, _addr: IpAddr) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.recv_timeout(WAIT).unwrap();
            }
            self.answers.lock().pop().unwrap_or(Ok(None))
        }
    }

    fn resolver_with(
        config: Config,
        provider: Arc<ScriptedProvider>,
    ) -> (DnsResolver, Receiver<(IpAddr, String)>) {
        let resolver = DnsResolver::with_provider(config, provider).unwrap();
        let (tx, rx) = unbounded();
        resolver.subscribe(move |addr, name| {
            tx.send((addr, name.to_string())).unwrap();
        });
        (resolver, rx)
    }

    #[test]
    fn test_concurrent_resolve_issues_single_lookup() {
        let (provider, gate) = ScriptedProvider::gated(vec![Ok(Some(String::from("dns.google")))]);
        let provider = Arc::new(provider);
        let (resolver, completed) = resolver_with(Config::default(), provider.clone());
        assert_eq!("-", resolver.resolve(ADDR));
        assert_eq!("-", resolver.resolve(ADDR));
        assert_eq!(1, resolver.in_flight());
        gate.send(()).unwrap();
        let (addr, name) = completed.recv_timeout(WAIT).unwrap();
        assert_eq!(ADDR, addr);
        assert_eq!("dns.google", name);
        assert_eq!("dns.google", resolver.resolve(ADDR));
        assert_eq!(1, provider.calls());
    }

    #[test]
    fn test_resolved_name_is_cached_for_long_ttl() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(Some(String::from("first"))),
            Ok(Some(String::from("second"))),
        ]));
        let (resolver, completed) = resolver_with(Config::default(), provider.clone());
        let _ = resolver.resolve(ADDR);
        completed.recv_timeout(WAIT).unwrap();
        for _ in 0..10 {
            assert_eq!("first", resolver.resolve(ADDR));
        }
        assert_eq!(1, provider.calls());
    }

    #[test]
    fn test_unresolved_is_retried_after_short_ttl() {
        let config = Builder::new()
            .unresolved_ttl(Duration::from_millis(50))
            .build();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(Error::Timeout),
            Ok(Some(String::from("recovered"))),
        ]));
        let (resolver, completed) = resolver_with(config, provider.clone());
        assert_eq!("-", resolver.resolve(ADDR));
        assert_eq!((ADDR, String::from("-")), completed.recv_timeout(WAIT).unwrap());
        assert_eq!("-", resolver.resolve(ADDR));
        assert_eq!(1, provider.calls());
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!("-", resolver.resolve(ADDR));
        assert_eq!(
            (ADDR, String::from("recovered")),
            completed.recv_timeout(WAIT).unwrap()
        );
        assert_eq!("recovered", resolver.resolve(ADDR));
        assert_eq!(2, provider.calls());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_name() {
        let config = Builder::new()
            .resolved_ttl(Duration::from_millis(50))
            .build();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(Some(String::from("stable"))),
            Err(Error::Timeout),
        ]));
        let (resolver, completed) = resolver_with(config, provider.clone());
        let _ = resolver.resolve(ADDR);
        completed.recv_timeout(WAIT).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!("stable", resolver.resolve(ADDR));
        assert_eq!(
            (ADDR, String::from("stable")),
            completed.recv_timeout(WAIT).unwrap()
        );
        assert_eq!("stable", resolver.resolve(ADDR));
        assert_eq!(2, provider.calls());
    }

    #[test]
    fn test_lookup_timeout_caches_placeholder() {
        let config = Builder::new().timeout(Duration::from_millis(20)).build();
        let (provider, gate) = ScriptedProvider::gated(vec![Ok(Some(String::from("late")))]);
        let provider = Arc::new(provider);
        let (resolver, completed) = resolver_with(config, provider);
        let _ = resolver.resolve(ADDR);
        assert_eq!((ADDR, String::from("-")), completed.recv_timeout(WAIT).unwrap());
        assert_eq!(Some(String::from("-")), resolver.cached(ADDR));
        gate.send(()).unwrap();
    }

    #[test]
    fn test_private_addresses_skipped_when_disabled() {
        let config = Builder::new().resolve_private(false).build();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (resolver, _completed) = resolver_with(config, provider.clone());
        assert_eq!("-", resolver.resolve(IpAddr::from([192, 168, 1, 1])));
        assert_eq!(0, resolver.in_flight());
        assert_eq!(0, provider.calls());
    }

    #[test_case("not-an-ip"; "garbage")]
    #[test_case(""; "empty")]
    #[test_case("300.1.1.1"; "out of range")]
    fn test_resolve_str_unparsable_returns_placeholder(addr: &str) {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (resolver, _completed) = resolver_with(Config::default(), provider.clone());
        assert_eq!("-", resolver.resolve_str(addr));
        assert_eq!(0, provider.calls());
    }

    #[test]
    fn test_resolve_str_normalises_ipv6_case() {
        let (provider, gate) = ScriptedProvider::gated(vec![Ok(Some(String::from("v6")))]);
        let provider = Arc::new(provider);
        let (resolver, completed) = resolver_with(Config::default(), provider.clone());
        let _ = resolver.resolve_str("2001:DB8::1");
        let _ = resolver.resolve_str("2001:db8::1");
        gate.send(()).unwrap();
        completed.recv_timeout(WAIT).unwrap();
        assert_eq!(1, provider.calls());
    }

    #[test]
    fn test_flush_clears_cache() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Some(String::from("a")))]));
        let (resolver, completed) = resolver_with(Config::default(), provider);
        let _ = resolver.resolve(ADDR);
        completed.recv_timeout(WAIT).unwrap();
        assert!(resolver.cached(ADDR).is_some());
        resolver.flush();
        assert!(resolver.cached(ADDR).is_none());
    }

    #[test]
    fn test_lookup_delegates_to_provider() -> anyhow::Result<()> {
        let mut provider = MockProvider::new();
        provider
            .expect_lookup()
            .times(1)
            .returning(|_| Ok(vec![IpAddr::from([93, 184, 216, 34])]));
        let resolver = DnsResolver::with_provider(Config::default(), Arc::new(provider))?;
        assert_eq!(
            vec![IpAddr::from([93, 184, 216, 34])],
            resolver.lookup("example.com")?
        );
        Ok(())
    }

    #[test]
    fn test_lookup_without_addresses_is_an_error() -> anyhow::Result<()> {
        let mut provider = MockProvider::new();
        provider.expect_lookup().returning(|_| Ok(vec![]));
        let resolver = DnsResolver::with_provider(Config::default(), Arc::new(provider))?;
        assert!(matches!(
            resolver.lookup("nowhere.invalid"),
            Err(Error::NoAddresses(_))
        ));
        Ok(())
    }

    #[test_case("10.0.0.1", true)]
    #[test_case("172.16.5.4", true)]
    #[test_case("192.168.0.1", true)]
    #[test_case("127.0.0.1", true)]
    #[test_case("169.254.1.1", true)]
    #[test_case("8.8.8.8", false)]
    #[test_case("::1", true)]
    #[test_case("fd00::1", true)]
    #[test_case("fe80::1", true)]
    #[test_case("2001:4860:4860::8888", false)]
    fn test_is_private(addr: &str, expected: bool) {
        assert_eq!(expected, inner::is_private(IpAddr::from_str(addr).unwrap()));
    }
}
