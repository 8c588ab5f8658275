//! In-memory network shared by every node of a test ring.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ringmesh_core::config::OverlayConfig;
use ringmesh_core::{Host, Key, Message, NodeAddr};
use ringmesh_overlay::{Node, Transport};

/// Key with `top` as its most significant byte, zero elsewhere.
pub fn key(top: u8) -> Key {
    let mut bytes = [0u8; 20];
    bytes[0] = top;
    Key::from_bytes(bytes)
}

pub fn addr(top: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000 + top as u16))
}

pub fn node_addr(top: u8) -> NodeAddr {
    NodeAddr::new(key(top), addr(top))
}

pub fn keys(hosts: &[Host]) -> Vec<Key> {
    let mut keys: Vec<Key> = hosts.iter().map(Host::key).collect();
    keys.sort();
    keys
}

/// Let every in-flight message and the handlers it triggers run to
/// completion. Relies on the paused clock only advancing once all tasks
/// are idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[derive(Default)]
struct Registry {
    nodes: HashMap<SocketAddr, Weak<Node>>,
    down: HashSet<SocketAddr>,
}

/// Delivers messages between nodes registered on it. A node marked down
/// neither sends nor receives.
pub struct Network {
    config: OverlayConfig,
    registry: Mutex<Registry>,
}

impl Network {
    pub fn new(config: OverlayConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(OverlayConfig::default())
    }

    /// Create a node whose key and port derive from `top`.
    pub fn node(self: &Arc<Self>, top: u8) -> Arc<Node> {
        self.node_at(node_addr(top))
    }

    /// Create a node at an explicit key and address. A node already
    /// registered at that address is replaced.
    pub fn node_at(self: &Arc<Self>, me: NodeAddr) -> Arc<Node> {
        let transport = Arc::new(MemTransport {
            from: me.addr,
            network: self.clone(),
        });
        let node = Node::new(me, self.config.clone(), transport);
        self.registry
            .lock()
            .unwrap()
            .nodes
            .insert(me.addr, Arc::downgrade(&node));
        node
    }

    pub fn set_down(&self, addr: SocketAddr, down: bool) {
        let mut registry = self.registry.lock().unwrap();
        if down {
            registry.down.insert(addr);
        } else {
            registry.down.remove(&addr);
        }
    }

    fn reachable(&self, from: SocketAddr, to: SocketAddr) -> Option<Arc<Node>> {
        let registry = self.registry.lock().unwrap();
        if registry.down.contains(&from) || registry.down.contains(&to) {
            return None;
        }
        registry.nodes.get(&to).and_then(Weak::upgrade)
    }
}

/// Per-node view of the network. Behaves like the UDP listener: the
/// receiver registers the sender's address and handles the message on its
/// own task while the send is acknowledged immediately.
struct MemTransport {
    from: SocketAddr,
    network: Arc<Network>,
}

#[async_trait]
impl Transport for MemTransport {
    async fn send(&self, to: &Host, message: Message) -> bool {
        let Some(peer) = self.network.reachable(self.from, to.addr()) else {
            return false;
        };
        peer.hosts().get_host(NodeAddr::unkeyed(self.from));
        tokio::spawn(async move {
            peer.handle(message).await.expect("message should validate");
        });
        true
    }
}

/// Form a ring: the first node starts it, every other node joins through
/// the first one in order.
pub async fn ring(network: &Arc<Network>, tops: &[u8]) -> Vec<Arc<Node>> {
    let mut nodes = Vec::with_capacity(tops.len());
    for (i, top) in tops.iter().enumerate() {
        let node = network.node(*top);
        if i == 0 {
            node.start();
        } else {
            assert!(node.join(addr(tops[0])).await, "bootstrap should ack");
            settle().await;
        }
        nodes.push(node);
    }
    nodes
}
