//! UDP transport with per-message acknowledgement.
//!
//! Each outgoing message gets a sequence number. Kinds that request an ACK
//! also get a oneshot waiting in the pending table. The receive loop resolves it when the matching ACK
//! frame arrives; a send that sees no ACK within the timeout fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::Instant;

use ringmesh_core::wire;
use ringmesh_core::{Host, Message};
use ringmesh_overlay::Transport;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    pending: DashMap<u64, oneshot::Sender<()>>,
    next_seq: AtomicU64,
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            socket,
            pending: DashMap::new(),
            next_seq: AtomicU64::new(1),
            timeout,
        })
    }

    /// Complete the send waiting on `seq`. Late or duplicate ACKs are ignored.
    pub fn resolve_ack(&self, seq: u64) {
        match self.pending.remove(&seq) {
            Some((_, tx)) => {
                let _ = tx.send(());
            }
            None => tracing::trace!(seq, "ack for unknown sequence"),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: &Host, message: Message) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let kind = message.kind.name();
        let buf = match wire::encode_data(seq, &message) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, kind, "failed to encode message");
                return false;
            }
        };

        if !message.spec().requests_ack() {
            return match self.socket.send_to(&buf, to.addr()).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(error = %e, to = %to.addr(), kind, "send_to failed");
                    false
                }
            };
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        let started = Instant::now();

        if let Err(e) = self.socket.send_to(&buf, to.addr()).await {
            self.pending.remove(&seq);
            tracing::warn!(error = %e, to = %to.addr(), kind, "send_to failed");
            return false;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(())) => {
                to.update_latency(started.elapsed().as_secs_f64());
                true
            }
            _ => {
                self.pending.remove(&seq);
                tracing::debug!(to = %to.addr(), seq, kind, "no ack");
                false
            }
        }
    }
}
