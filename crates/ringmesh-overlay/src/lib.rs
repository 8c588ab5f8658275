//! Key-based routing overlay.
//!
//! Nodes sit on a 160-bit key ring. Each keeps a leafset of its nearest
//! neighbours and a prefix routing table, and forwards a message for any key
//! to a peer that is numerically closer or shares a longer prefix with it.
//! New nodes join through any existing member; membership is kept fresh by
//! a periodic ping/piggyback job.
//!
//! The overlay is transport-agnostic: plug in a [`Transport`] and feed
//! received messages to [`Node::handle`].

pub mod check_leafset;
mod handlers;
pub mod leafset;
pub mod node;
pub mod routing;
pub mod routing_table;
pub mod status;
pub mod transport;

pub use check_leafset::CheckLeafsetJob;
pub use leafset::{Admission, Leafset};
pub use node::{Delivery, Node};
pub use routing::{Lookup, Routing};
pub use routing_table::RoutingTable;
pub use status::{NodeStatus, PeerStatus};
pub use transport::Transport;
