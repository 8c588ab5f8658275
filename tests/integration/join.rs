use std::time::Duration;

use ringmesh_core::config::OverlayConfig;
use tokio::time::Instant;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Join protocol
// ══════════════════════════════════════════════════════════════════════════════

fn short_grace() -> OverlayConfig {
    OverlayConfig {
        grace_period_secs: 5,
        ..Default::default()
    }
}

/// A joiner the bootstrap saw fail recently is NACKed, retries on its own
/// after the grace period and is then accepted.
#[tokio::test(start_paused = true)]
async fn test_join_nacked_during_grace_then_accepted() {
    let network = Network::new(short_grace());
    let bootstrap = network.node(0x10);
    bootstrap.start();
    let joiner = network.node(0x50);

    bootstrap
        .hosts()
        .get_host(joiner.me_addr())
        .set_failure_time(Instant::now());

    assert!(joiner.join(addr(0x10)).await);
    settle().await;
    assert!(joiner.routing().leafset().is_empty(), "joiner should have been refused");
    assert!(bootstrap.routing().leafset().is_empty());
    assert!(!joiner.is_started());

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;

    assert_eq!(keys(&joiner.routing().leafset()), vec![key(0x10)]);
    assert_eq!(keys(&bootstrap.routing().leafset()), vec![key(0x50)]);
    assert!(joiner.is_started());
}

/// The retry keeps going while the joiner is still inside the grace period.
#[tokio::test(start_paused = true)]
async fn test_join_retries_until_grace_expires() {
    let network = Network::new(short_grace());
    let bootstrap = network.node(0x10);
    let joiner = network.node(0x50);

    let record = bootstrap.hosts().get_host(joiner.me_addr());
    record.set_failure_time(Instant::now());
    joiner.join(addr(0x10)).await;
    settle().await;

    // Refresh the failure just before the first retry: refused again.
    tokio::time::sleep(Duration::from_secs(4)).await;
    record.set_failure_time(Instant::now());
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert!(joiner.routing().leafset().is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(keys(&joiner.routing().leafset()), vec![key(0x10)]);
}

/// A JOIN is routed to the member closest to the joiner's key, which
/// answers with its own leafset.
#[tokio::test(start_paused = true)]
async fn test_join_is_answered_by_closest_member() {
    let network = Network::with_defaults();
    let nodes = ring(&network, &[0x10, 0x50, 0x90]).await;

    let joiner = network.node(0x58);
    assert!(joiner.join(addr(0x10)).await);
    settle().await;

    let known = keys(&joiner.routing().leafset());
    assert_eq!(known, vec![key(0x10), key(0x50), key(0x90)]);
    for node in &nodes {
        assert!(
            keys(&node.routing().leafset()).contains(&key(0x58)),
            "{} should have learned the joiner",
            node.key()
        );
    }
}

/// A bootstrap that cannot be reached fails the join without side effects.
#[tokio::test(start_paused = true)]
async fn test_join_through_unreachable_bootstrap() {
    let network = Network::with_defaults();
    let joiner = network.node(0x50);

    assert!(!joiner.join(addr(0x10)).await);
    settle().await;
    assert!(joiner.routing().leafset().is_empty());
    assert!(!joiner.is_started());
}

/// Shutdown cancels a pending retry.
#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_join_retry() {
    let network = Network::new(short_grace());
    let bootstrap = network.node(0x10);
    let joiner = network.node(0x50);
    bootstrap
        .hosts()
        .get_host(joiner.me_addr())
        .set_failure_time(Instant::now());

    joiner.join(addr(0x10)).await;
    settle().await;
    joiner.shutdown();

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert!(joiner.routing().leafset().is_empty());
    assert!(bootstrap.routing().leafset().is_empty());
}
