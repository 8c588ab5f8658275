//! Per-kind message handlers.
//!
//! Messages reach these only after schema validation, and routed kinds only
//! once this node is their final hop. Every handler is idempotent: seeing
//! the same message twice leaves routing state unchanged.

use ringmesh_core::{Host, Message, MessageKind, NodeAddr};

use crate::node::{Delivery, Node};

impl Node {
    pub(crate) async fn dispatch(&self, message: Message) {
        tracing::trace!(
            kind = message.kind.name(),
            source = %message.source,
            "handling message"
        );
        match message.kind {
            MessageKind::Join => self.on_join(&message).await,
            MessageKind::JoinAck => self.on_join_ack(&message).await,
            MessageKind::JoinNack => self.on_join_nack(&message),
            MessageKind::Update => self.on_update(&message),
            MessageKind::Piggy => self.on_piggy(&message),
            MessageKind::Ping => self.on_ping(&message),
            MessageKind::Route => self.on_route(message),
        }
    }

    fn is_me(&self, addr: &NodeAddr) -> bool {
        addr.addr == self.me().addr() || addr.key == self.key()
    }

    /// This node is the closest to the joiner's key: hand it our leafset,
    /// unless the joiner failed too recently to be trusted again.
    async fn on_join(&self, message: &Message) {
        let Some(addr) = message.addr_arg(0) else {
            return;
        };
        if self.is_me(&addr) {
            return;
        }
        let joiner = self.peer(addr);

        if joiner.failed_within(self.config().grace_period()) {
            tracing::warn!(joiner = %joiner, "join refused, peer failed within grace period");
            let nack = Message::join_nack(self.key(), addr.key, addr);
            self.send(&joiner, nack).await;
            return;
        }

        let mut addrs: Vec<NodeAddr> = self.routing().leafset().iter().map(Host::node_addr).collect();
        addrs.push(self.me_addr());
        tracing::debug!(joiner = %joiner, peers = addrs.len(), "join accepted");
        let ack = Message::join_ack(self.key(), addr.key, addrs);
        self.send(&joiner, ack).await;
    }

    /// Adopt the responder's leafset, announce ourselves to everyone we now
    /// know and start stabilization.
    async fn on_join_ack(&self, message: &Message) {
        let Some(addrs) = message.addr_list_arg(0) else {
            return;
        };

        let mut peers: Vec<Host> = Vec::with_capacity(addrs.len());
        for addr in addrs.iter().filter(|a| !self.is_me(a)) {
            let host = self.peer(*addr);
            self.routing().add(&host);
            if !peers.contains(&host) {
                peers.push(host);
            }
        }
        for host in self.routing().routing_table() {
            if !peers.contains(&host) {
                peers.push(host);
            }
        }

        tracing::info!(key = %self.key(), peers = peers.len(), "joined overlay");
        let me = self.me_addr();
        for host in &peers {
            self.send(host, Message::update(self.key(), host.key(), me)).await;
        }

        self.start();
    }

    /// Retry the JOIN through the bootstrap host once the grace period the
    /// responder enforces has passed.
    fn on_join_nack(&self, message: &Message) {
        let grace = self.config().grace_period();
        tracing::warn!(
            source = %message.source,
            retry_in_secs = grace.as_secs(),
            "join rejected, will retry"
        );

        let weak = self.weak();
        let retry = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(node) = weak.upgrade() else {
                return;
            };
            match node.bootstrap() {
                Some(bootstrap) => {
                    node.send_join(&bootstrap).await;
                }
                None => tracing::warn!(key = %node.key(), "join rejected but no bootstrap host known"),
            }
        });
        self.set_join_retry(retry);
    }

    fn on_update(&self, message: &Message) {
        let Some(addr) = message.addr_arg(0) else {
            return;
        };
        if self.is_me(&addr) {
            return;
        }
        let host = self.peer(addr);
        self.routing().add(&host);
    }

    /// Merge a neighbour's leafset, skipping peers that failed recently.
    fn on_piggy(&self, message: &Message) {
        let Some(addrs) = message.addr_list_arg(0) else {
            return;
        };
        let grace = self.config().grace_period();
        for addr in addrs.iter().filter(|a| !self.is_me(a)) {
            let host = self.peer(*addr);
            if host.failed_within(grace) {
                tracing::warn!(host = %host, "piggy entry refused, peer failed within grace period");
                continue;
            }
            self.routing().add(&host);
        }
    }

    fn on_ping(&self, message: &Message) {
        if let Some(addr) = message.addr_arg(0) {
            let host = self.peer(addr);
            tracing::trace!(from = %host, "ping");
        }
    }

    fn on_route(&self, message: Message) {
        let Message {
            source,
            destination,
            mut args,
            ..
        } = message;
        let Some(ringmesh_core::Arg::Str(payload)) = args.pop() else {
            return;
        };
        tracing::debug!(%source, %destination, len = payload.len(), "payload delivered");
        self.deliver(Delivery {
            source,
            destination,
            payload,
        });
    }
}
