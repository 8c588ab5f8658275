//! Inbound datagram loop.
//!
//! ACK frames complete pending sends. DATA frames are acknowledged at once
//! when their kind asks for it, then handed to the node on their own task so a slow handler never stalls
//! the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use ringmesh_core::wire::{self, Frame, MAX_DATAGRAM};
use ringmesh_core::{Message, NodeAddr};
use ringmesh_overlay::Node;

use crate::udp::UdpTransport;

pub struct Listener {
    socket: Arc<UdpSocket>,
    transport: Arc<UdpTransport>,
    node: Arc<Node>,
    shutdown: broadcast::Receiver<()>,
}

impl Listener {
    pub fn new(
        socket: Arc<UdpSocket>,
        transport: Arc<UdpTransport>,
        node: Arc<Node>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            transport,
            node,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("listener shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, peer_addr) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };

                    match wire::decode_frame(&buf[..len]) {
                        Ok(Frame::Ack { seq }) => self.transport.resolve_ack(seq),
                        Ok(Frame::Data { seq, message }) => self.handle_data(seq, message, peer_addr).await,
                        Err(e) => {
                            tracing::warn!(error = %e, %peer_addr, len, "dropping malformed datagram");
                        }
                    }
                }
            }
        }
    }

    async fn handle_data(&self, seq: u64, message: Message, peer_addr: SocketAddr) {
        if message.spec().requests_ack() {
            if let Err(e) = self.socket.send_to(&wire::encode_ack(seq), peer_addr).await {
                tracing::warn!(error = %e, %peer_addr, "failed to send ack");
            }
        }

        // The source key may belong to a node further back on the route,
        // so the sender is registered by address only.
        self.node.hosts().get_host(NodeAddr::unkeyed(peer_addr));

        let node = self.node.clone();
        tokio::spawn(async move {
            let kind = message.kind.name();
            if let Err(e) = node.handle(message).await {
                tracing::warn!(error = %e, kind, %peer_addr, "message rejected");
            }
        });
    }
}
