use std::time::Duration;

use ringmesh_core::config::OverlayConfig;
use ringmesh_core::SUCCESS_WINDOW;
use ringmesh_overlay::CheckLeafsetJob;
use tokio::time::Instant;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Failure detection & leafset maintenance
// ══════════════════════════════════════════════════════════════════════════════

/// A peer that failed every ping in the window is evicted by the next check.
#[tokio::test(start_paused = true)]
async fn test_dead_peer_is_evicted() {
    let network = Network::with_defaults();
    let nodes = ring(&network, &[0x10, 0x50]).await;
    let (a, b) = (&nodes[0], &nodes[1]);

    network.set_down(addr(0x50), true);
    let peer = a.routing().leafset()[0].clone();
    for _ in 0..SUCCESS_WINDOW {
        assert!(!a.ping(&peer).await);
    }
    assert_eq!(peer.success_avg(), 0.0);
    assert_eq!(keys(&a.routing().leafset()), vec![b.key()]);

    CheckLeafsetJob::new().run(a).await;
    assert!(a.routing().leafset().is_empty());
    assert!(peer.failure_time().is_some());
}

/// One missed ping only stamps the failure time.
#[tokio::test(start_paused = true)]
async fn test_single_failure_keeps_peer() {
    let network = Network::with_defaults();
    let nodes = ring(&network, &[0x10, 0x50]).await;
    let a = &nodes[0];

    network.set_down(addr(0x50), true);
    CheckLeafsetJob::new().run(a).await;

    let leafset = a.routing().leafset();
    assert_eq!(keys(&leafset), vec![key(0x50)]);
    assert!(leafset[0].failed_within(Duration::from_secs(1)));
}

/// Left running, the periodic job eventually evicts a peer that went away
/// and leaves healthy peers alone.
#[tokio::test(start_paused = true)]
async fn test_periodic_checks_evict_silent_peer() {
    let network = Network::new(OverlayConfig {
        check_interval_secs: 1,
        ..Default::default()
    });
    let nodes = ring(&network, &[0x10, 0x50, 0x90]).await;
    let a = &nodes[0];

    network.set_down(addr(0x90), true);
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(keys(&a.routing().leafset()), vec![key(0x50)]);
    assert_eq!(keys(&nodes[1].routing().leafset()), vec![key(0x10)]);
}

/// Every third check pushes the leafset to neighbours, which learn about
/// members they had not met.
#[tokio::test(start_paused = true)]
async fn test_piggy_spreads_membership() {
    let network = Network::with_defaults();
    let a = network.node(0x10);
    let b = network.node(0x50);
    let _c = network.node(0x90);
    a.routing().add(&a.hosts().get_host(node_addr(0x50)));
    a.routing().add(&a.hosts().get_host(node_addr(0x90)));
    b.routing().add(&b.hosts().get_host(node_addr(0x10)));

    let mut job = CheckLeafsetJob::new();
    job.run(&a).await;
    job.run(&a).await;
    settle().await;
    assert_eq!(keys(&b.routing().leafset()), vec![key(0x10)]);

    job.run(&a).await;
    settle().await;
    assert_eq!(keys(&b.routing().leafset()), vec![key(0x10), key(0x90)]);
}

/// Leafset entries that failed within the grace period are not adopted
/// from a neighbour's PIGGY.
#[tokio::test(start_paused = true)]
async fn test_piggy_skips_recently_failed() {
    let network = Network::with_defaults();
    let a = network.node(0x10);
    let b = network.node(0x50);
    let _c = network.node(0x90);
    a.routing().add(&a.hosts().get_host(node_addr(0x50)));
    a.routing().add(&a.hosts().get_host(node_addr(0x90)));
    b.hosts().get_host(node_addr(0x90)).set_failure_time(Instant::now());

    let mut job = CheckLeafsetJob::new();
    for _ in 0..3 {
        job.run(&a).await;
    }
    settle().await;
    assert_eq!(keys(&b.routing().leafset()), vec![key(0x10)]);
}
