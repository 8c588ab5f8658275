//! Per-node overlay context.
//!
//! A [`Node`] owns everything one overlay member needs: its own host record,
//! the host registry, routing state, configuration and the transport. There
//! is no process-wide state, so several nodes can share one runtime (the
//! integration tests run whole rings in a single process).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use ringmesh_core::config::OverlayConfig;
use ringmesh_core::{Host, HostCache, Key, Message, MessageError, MessageKind, NodeAddr};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::check_leafset;
use crate::routing::Routing;
use crate::status::{NodeStatus, PeerStatus};
use crate::transport::Transport;

/// An application payload that reached the node responsible for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub source: Key,
    pub destination: Key,
    pub payload: String,
}

pub struct Node {
    me: Host,
    config: OverlayConfig,
    hosts: HostCache,
    routing: Routing,
    transport: Arc<dyn Transport>,
    weak_self: Weak<Node>,

    /// Host the node joins through, kept for JOIN retries.
    bootstrap: Mutex<Option<Host>>,
    check_job: Mutex<Option<JoinHandle<()>>>,
    join_retry: Mutex<Option<JoinHandle<()>>>,

    deliveries_tx: mpsc::UnboundedSender<Delivery>,
    deliveries_rx: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Node {
    pub fn new(me: NodeAddr, config: OverlayConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let hosts = HostCache::new(config.host_cache_size);
        let me = hosts.get_host(me);
        let routing = Routing::new(me.clone(), config.leafset_half_size);
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();

        tracing::info!(key = %me.key(), addr = %me.addr(), "overlay node created");

        Arc::new_cyclic(|weak_self| Node {
            me,
            config,
            hosts,
            routing,
            transport,
            weak_self: weak_self.clone(),
            bootstrap: Mutex::new(None),
            check_job: Mutex::new(None),
            join_retry: Mutex::new(None),
            deliveries_tx,
            deliveries_rx: Mutex::new(Some(deliveries_rx)),
        })
    }

    pub fn me(&self) -> &Host {
        &self.me
    }

    pub fn key(&self) -> Key {
        self.me.key()
    }

    pub fn me_addr(&self) -> NodeAddr {
        self.me.node_addr()
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    pub fn hosts(&self) -> &HostCache {
        &self.hosts
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Registry record for `addr`. A peer that came back under a new key is
    /// re-placed in routing state.
    pub(crate) fn peer(&self, addr: NodeAddr) -> Host {
        let host = self.hosts.get_host(addr);
        if self.routing.refresh(&host) {
            tracing::debug!(peer = %host, "peer re-keyed");
        }
        host
    }

    pub(crate) fn weak(&self) -> Weak<Node> {
        self.weak_self.clone()
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Send through the transport and record the outcome on `to`.
    pub async fn send(&self, to: &Host, message: Message) -> bool {
        let kind = message.kind;
        let ok = self.transport.send(to, message).await;
        to.update_stat(ok);
        if !ok {
            tracing::warn!(
                to = %to,
                kind = kind.name(),
                success_avg = to.success_avg(),
                "send failed"
            );
        }
        ok
    }

    pub async fn ping(&self, to: &Host) -> bool {
        let msg = Message::ping(self.key(), to.key(), self.me_addr());
        self.send(to, msg).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Join the ring through the member listening at `bootstrap`.
    ///
    /// Returns whether the bootstrap host acknowledged the JOIN. The node
    /// becomes a member once the JOIN_ACK arrives; a JOIN_NACK schedules a
    /// retry.
    pub async fn join(&self, bootstrap: SocketAddr) -> bool {
        let host = self.hosts.get_host(NodeAddr::unkeyed(bootstrap));
        *lock(&self.bootstrap) = Some(host.clone());
        tracing::info!(bootstrap = %bootstrap, key = %self.key(), "joining overlay");
        self.send_join(&host).await
    }

    pub(crate) async fn send_join(&self, bootstrap: &Host) -> bool {
        let msg = Message::join(self.key(), self.key(), self.me_addr());
        self.send(bootstrap, msg).await
    }

    pub(crate) fn bootstrap(&self) -> Option<Host> {
        lock(&self.bootstrap).clone()
    }

    /// Start periodic stabilization. Called directly by the first member of
    /// a ring and on the first JOIN_ACK otherwise; later calls are no-ops.
    pub fn start(&self) {
        let mut job = lock(&self.check_job);
        if job.is_some() {
            return;
        }
        *job = Some(check_leafset::spawn(self.weak(), self.config.check_interval()));
        tracing::info!(key = %self.key(), "stabilization started");
    }

    pub fn is_started(&self) -> bool {
        lock(&self.check_job).is_some()
    }

    /// Track the pending JOIN retry so shutdown can cancel it. An earlier
    /// retry is left to finish: it may be the task that got this NACK.
    pub(crate) fn set_join_retry(&self, handle: JoinHandle<()>) {
        *lock(&self.join_retry) = Some(handle);
    }

    /// Stop background tasks. In-flight sends run to completion.
    pub fn shutdown(&self) {
        if let Some(job) = lock(&self.check_job).take() {
            job.abort();
        }
        if let Some(retry) = lock(&self.join_retry).take() {
            retry.abort();
        }
        tracing::info!(key = %self.key(), "overlay node shut down");
    }

    // ── Routing ──────────────────────────────────────────────────────────────

    /// Route `payload` towards the node responsible for `destination`.
    /// Returns false if the first hop could not be reached.
    pub async fn route(&self, destination: Key, payload: String) -> bool {
        let msg = Message::route(self.key(), destination, payload);
        self.route_message(msg).await
    }

    /// Receiver for payloads delivered to this node. Only the first call
    /// gets it.
    pub fn take_deliveries(&self) -> Option<mpsc::UnboundedReceiver<Delivery>> {
        lock(&self.deliveries_rx).take()
    }

    pub(crate) fn deliver(&self, delivery: Delivery) {
        if self.deliveries_tx.send(delivery).is_err() {
            tracing::debug!(key = %self.key(), "delivery dropped, no receiver");
        }
    }

    /// Entry point for every received message.
    ///
    /// The message is validated against its schema first. Routed kinds are
    /// forwarded unless this node is the next hop; everything else is
    /// handled here.
    pub async fn handle(&self, message: Message) -> Result<(), MessageError> {
        message.validate()?;
        if message.spec().must_route() {
            self.route_message(message).await;
        } else {
            self.dispatch(message).await;
        }
        Ok(())
    }

    /// One routing step: deliver locally or pass to the next hop.
    async fn route_message(&self, message: Message) -> bool {
        let next = self.routing.route_lookup(&message.destination);
        let local = next == self.me
            // A JOIN never goes back to the joiner itself.
            || (message.kind == MessageKind::Join && next.key() == message.source);
        if local {
            self.dispatch(message).await;
            return true;
        }

        tracing::debug!(
            kind = message.kind.name(),
            destination = %message.destination,
            next = %next,
            "forwarding"
        );
        self.send(&next, message).await
    }

    /// Replace the local key and rebuild routing state around it.
    pub fn rekey(&self, key: Key) {
        self.me.set_key(key);
        self.routing.key_update(self.me.clone());
    }

    pub fn status(&self) -> NodeStatus {
        let grace = self.config.grace_period();
        let peers = |hosts: Vec<Host>| -> Vec<PeerStatus> {
            hosts.iter().map(|h| PeerStatus::of(h, grace)).collect()
        };
        NodeStatus {
            key: self.key(),
            addr: self.me.addr(),
            started: self.is_started(),
            leafset: peers(self.routing.leafset()),
            routing_table: peers(self.routing.routing_table()),
            cached_hosts: self.hosts.len(),
            cache_capacity: self.hosts.capacity(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(job) = lock(&self.check_job).take() {
            job.abort();
        }
        if let Some(retry) = lock(&self.join_retry).take() {
            retry.abort();
        }
    }
}
