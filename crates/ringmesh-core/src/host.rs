//! Peer descriptors and the per-node host registry.
//!
//! A [`Host`] is a cheap handle to a shared record describing one overlay
//! member: its address, its ring key and link-quality statistics. Every
//! routing structure that knows a peer holds a clone of the same handle, so
//! statistics updated by the transport are visible everywhere at once.
//! Equality is identity of the record, not of address or key.
//!
//! The [`HostCache`] hands out those handles, keyed by socket address, and
//! bounds how many records a node keeps once nothing else references them.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::key::{Key, KeyError};

/// Number of outcomes in the success window.
pub const SUCCESS_WINDOW: usize = 20;

/// Success average above which a link is considered healthy.
pub const GOOD_LINK: f32 = 0.8;

/// Success average below which a peer is evicted from routing state.
pub const BAD_LINK: f32 = 0.3;

/// Weight given to a new latency sample.
const LATENCY_WEIGHT: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("encoded host {0:?} is missing the '@' separator")]
    MissingSeparator(String),
    #[error("invalid key in encoded host: {0}")]
    Key(#[from] KeyError),
    #[error("invalid socket address in encoded host: {0}")]
    Addr(#[from] std::net::AddrParseError),
}

// ── Addresses ─────────────────────────────────────────────────────────────────

/// Network address of an overlay member together with its ring key.
///
/// This is what travels inside protocol messages. The text form is
/// `<40 hex digits>@<socket address>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub key: Key,
    pub addr: SocketAddr,
}

impl NodeAddr {
    pub fn new(key: Key, addr: SocketAddr) -> Self {
        Self { key, addr }
    }

    /// Address of a peer whose key is not known yet (e.g. a bootstrap host).
    pub fn unkeyed(addr: SocketAddr) -> Self {
        Self { key: Key::ZERO, addr }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.addr)
    }
}

impl FromStr for NodeAddr {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, addr) = s
            .split_once('@')
            .ok_or_else(|| HostError::MissingSeparator(s.to_string()))?;
        Ok(Self {
            key: key.parse()?,
            addr: addr.parse()?,
        })
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct HostStats {
    key: Key,
    failure_time: Option<Instant>,
    latency: f64,
    success_win: [u8; SUCCESS_WINDOW],
    success_win_index: usize,
    success_avg: f32,
}

impl HostStats {
    fn new(key: Key) -> Self {
        // Start neutral: half failures, half successes.
        let mut success_win = [0u8; SUCCESS_WINDOW];
        for slot in success_win.iter_mut().skip(SUCCESS_WINDOW / 2) {
            *slot = 1;
        }
        Self {
            key,
            failure_time: None,
            latency: 0.0,
            success_win,
            success_win_index: 0,
            success_avg: 0.5,
        }
    }
}

#[derive(Debug)]
struct HostInner {
    addr: SocketAddr,
    stats: Mutex<HostStats>,
}

/// Shared handle to one peer record.
#[derive(Clone)]
pub struct Host(Arc<HostInner>);

impl Host {
    /// Create a standalone record. Nodes obtain hosts through
    /// [`HostCache::get_host`] instead so that handles are shared.
    pub fn new(addr: NodeAddr) -> Self {
        Host(Arc::new(HostInner {
            addr: addr.addr,
            stats: Mutex::new(HostStats::new(addr.key)),
        }))
    }

    fn stats(&self) -> MutexGuard<'_, HostStats> {
        self.0.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn addr(&self) -> SocketAddr {
        self.0.addr
    }

    pub fn key(&self) -> Key {
        self.stats().key
    }

    pub fn set_key(&self, key: Key) {
        self.stats().key = key;
    }

    pub fn node_addr(&self) -> NodeAddr {
        NodeAddr::new(self.key(), self.addr())
    }

    /// Text form understood by [`HostCache::decode_host`].
    pub fn encode(&self) -> String {
        self.node_addr().to_string()
    }

    /// Record one send/ping outcome and recompute the windowed average.
    pub fn update_stat(&self, success: bool) {
        let mut s = self.stats();
        let idx = s.success_win_index % SUCCESS_WINDOW;
        s.success_win[idx] = success as u8;
        s.success_win_index = s.success_win_index.wrapping_add(1);
        let total: u32 = s.success_win.iter().map(|v| *v as u32).sum();
        s.success_avg = total as f32 / SUCCESS_WINDOW as f32;
    }

    pub fn success_avg(&self) -> f32 {
        self.stats().success_avg
    }

    /// Fold a round-trip sample (seconds) into the smoothed latency.
    /// Negative samples are ignored; the first sample is taken as is.
    pub fn update_latency(&self, sample: f64) {
        if sample < 0.0 {
            return;
        }
        let mut s = self.stats();
        if s.latency < 0.00001 {
            s.latency = sample;
        } else {
            s.latency = (1.0 - LATENCY_WEIGHT) * s.latency + LATENCY_WEIGHT * sample;
        }
    }

    /// Smoothed latency in seconds, 0.0 before the first sample.
    pub fn latency(&self) -> f64 {
        self.stats().latency
    }

    pub fn failure_time(&self) -> Option<Instant> {
        self.stats().failure_time
    }

    pub fn set_failure_time(&self, at: Instant) {
        self.stats().failure_time = Some(at);
    }

    /// True if the last detected failure happened less than `period` ago.
    pub fn failed_within(&self, period: Duration) -> bool {
        match self.failure_time() {
            Some(at) => at.elapsed() < period,
            None => false,
        }
    }

    pub fn is_bad_link(&self, threshold: f32) -> bool {
        self.success_avg() < threshold
    }

    /// Number of live handles on this record.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Host {}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stats();
        f.debug_struct("Host")
            .field("addr", &self.0.addr)
            .field("key", &s.key)
            .field("success_avg", &s.success_avg)
            .field("latency", &s.latency)
            .finish()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_addr())
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Bounded registry of peer records, keyed by socket address.
///
/// The cache may temporarily hold more than `max` records when every
/// candidate for eviction is still referenced elsewhere; those are trimmed
/// once released.
pub struct HostCache {
    hosts: Mutex<LruCache<SocketAddr, Host>>,
    max: usize,
}

impl HostCache {
    pub fn new(max: usize) -> Self {
        Self {
            hosts: Mutex::new(LruCache::unbounded()),
            max: max.max(1),
        }
    }

    fn hosts(&self) -> MutexGuard<'_, LruCache<SocketAddr, Host>> {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the record for `addr`, creating it if needed.
    ///
    /// A non-zero key in `addr` replaces the key stored on an existing
    /// record, so a peer that re-keys keeps a single record.
    pub fn get_host(&self, addr: NodeAddr) -> Host {
        let mut hosts = self.hosts();
        if let Some(host) = hosts.get(&addr.addr) {
            if !addr.key.is_zero() && host.key() != addr.key {
                tracing::debug!(addr = %addr.addr, key = %addr.key, "host re-keyed");
                host.set_key(addr.key);
            }
            return host.clone();
        }

        if hosts.len() >= self.max {
            Self::evict_unreferenced(&mut hosts, self.max - 1);
        }

        let host = Host::new(addr);
        hosts.put(addr.addr, host.clone());
        tracing::trace!(%addr, cached = hosts.len(), "host cached");
        host
    }

    /// Record for `addr` if one is cached. Does not create.
    pub fn lookup(&self, addr: &SocketAddr) -> Option<Host> {
        self.hosts().peek(addr).cloned()
    }

    /// Parse the output of [`Host::encode`] and return the matching record.
    pub fn decode_host(&self, encoded: &str) -> Result<Host, HostError> {
        let addr: NodeAddr = encoded.parse()?;
        Ok(self.get_host(addr))
    }

    /// Drop a handle. Records nothing else references become eligible for
    /// eviction; any over the bound are evicted now.
    pub fn release_host(&self, host: Host) {
        drop(host);
        let mut hosts = self.hosts();
        if hosts.len() > self.max {
            Self::evict_unreferenced(&mut hosts, self.max);
        }
    }

    pub fn len(&self) -> usize {
        self.hosts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Evict least-recently-used records held only by the cache until at
    /// most `target` remain or no candidate is left.
    fn evict_unreferenced(hosts: &mut LruCache<SocketAddr, Host>, target: usize) {
        while hosts.len() > target {
            let victim = hosts
                .iter()
                .rev()
                .find(|(_, h)| h.references() == 1)
                .map(|(addr, _)| *addr);
            match victim {
                Some(addr) => {
                    hosts.pop(&addr);
                    tracing::trace!(%addr, "host evicted");
                }
                None => break,
            }
        }
    }
}
