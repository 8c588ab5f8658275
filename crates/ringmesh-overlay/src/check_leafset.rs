//! Periodic stabilization.
//!
//! Every check pings each leafset and routing-table member. A failed ping
//! stamps the peer's failure time; once its success average drops below the
//! bad-link threshold it is removed from routing state. Every few checks the
//! node also pushes its leafset to its leafset neighbours (PIGGY) so that
//! neighbours converge on the same view.

use std::sync::Weak;
use std::time::Duration;

use ringmesh_core::{Host, Message};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::node::Node;

#[derive(Debug, Default)]
pub struct CheckLeafsetJob {
    runs: u32,
}

impl CheckLeafsetJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// One check. Runs until every probe has completed.
    pub async fn run(&mut self, node: &Node) {
        let bad_link = node.config().bad_link;

        for host in peers(node) {
            if node.ping(&host).await {
                continue;
            }
            host.set_failure_time(Instant::now());
            if host.is_bad_link(bad_link) {
                node.routing().remove(&host);
                tracing::info!(host = %host, success_avg = host.success_avg(), "peer evicted");
            }
        }

        self.runs += 1;
        if self.runs >= node.config().piggy_every.max(1) {
            self.runs = 0;
            self.piggy(node).await;
        }
    }

    /// Send leafset + self to every leafset member.
    async fn piggy(&self, node: &Node) {
        let leafset = node.routing().leafset();
        let mut addrs: Vec<_> = leafset.iter().map(Host::node_addr).collect();
        addrs.push(node.me_addr());

        for host in leafset.iter().filter(|h| *h != node.me()) {
            let msg = Message::piggy(node.key(), host.key(), addrs.clone());
            if !node.send(host, msg).await && host.is_bad_link(node.config().bad_link) {
                node.routing().remove(host);
                tracing::info!(host = %host, "peer evicted after failed piggy");
            }
        }
    }
}

/// Leafset and routing-table members, each once.
fn peers(node: &Node) -> Vec<Host> {
    let mut hosts = node.routing().leafset();
    for host in node.routing().routing_table() {
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    hosts.retain(|h| h != node.me());
    hosts
}

/// Run the job every `period` until the node is dropped or the returned
/// handle is aborted. The first check happens one period from now.
pub(crate) fn spawn(node: Weak<Node>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut job = CheckLeafsetJob::new();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let Some(node) = node.upgrade() else {
                break;
            };
            job.run(&node).await;
        }
    })
}
