//! Serializable snapshot of a node's overlay state.

use std::net::SocketAddr;
use std::time::Duration;

use ringmesh_core::{Host, Key, GOOD_LINK};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub key: Key,
    pub addr: SocketAddr,
    /// Whether periodic stabilization is running.
    pub started: bool,
    pub leafset: Vec<PeerStatus>,
    pub routing_table: Vec<PeerStatus>,
    pub cached_hosts: usize,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub key: Key,
    pub addr: SocketAddr,
    pub success_avg: f32,
    /// Success average above the healthy-link mark.
    pub healthy: bool,
    /// Smoothed round trip in seconds.
    pub latency: f64,
    /// Failed within the grace period.
    pub recently_failed: bool,
}

impl PeerStatus {
    pub fn of(host: &Host, grace: Duration) -> Self {
        Self {
            key: host.key(),
            addr: host.addr(),
            success_avg: host.success_avg(),
            healthy: host.success_avg() > GOOD_LINK,
            latency: host.latency(),
            recently_failed: host.failed_within(grace),
        }
    }
}
