//! Contract between the overlay and whatever moves its messages.
//!
//! The overlay never touches sockets. A [`Transport`] delivers one message
//! to one peer and reports whether the peer acknowledged it. Outcome
//! statistics are recorded by the node; a transport that can measure round
//! trips feeds them into [`Host::update_latency`].

use async_trait::async_trait;
use ringmesh_core::{Host, Message};

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver `message` to `to`. Returns true once the peer acknowledged
    /// it, false on timeout or local failure.
    async fn send(&self, to: &Host, message: Message) -> bool;
}
