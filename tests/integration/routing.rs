use ringmesh_core::{Message, NodeAddr};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Routing over a joined ring
// ══════════════════════════════════════════════════════════════════════════════

/// Three members at 0x10, 0x50 and 0x90: a key just past 0x50 resolves to
/// 0x50 from the node at 0x10.
#[tokio::test(start_paused = true)]
async fn test_lookup_resolves_nearest_member() {
    let network = Network::with_defaults();
    let nodes = ring(&network, &[0x10, 0x50, 0x90]).await;

    let next = nodes[0].routing().route_lookup(&key(0x55));
    assert_eq!(next.key(), key(0x50));
    assert_eq!(next.addr(), addr(0x50));
}

/// After sequential joins every member knows every other member.
#[tokio::test(start_paused = true)]
async fn test_joins_converge_on_full_membership() {
    let network = Network::with_defaults();
    let tops = [0x10, 0x30, 0x50, 0x70, 0x90, 0xb0];
    let nodes = ring(&network, &tops).await;

    for node in &nodes {
        let mut known = keys(&node.routing().leafset());
        known.extend(keys(&node.routing().routing_table()));
        known.sort();
        let mut expected: Vec<_> = tops.iter().map(|t| key(*t)).filter(|k| *k != node.key()).collect();
        expected.sort();
        assert_eq!(known, expected, "membership seen by {}", node.key());
        assert!(node.is_started());
    }
}

/// Every member resolves every member's key to that member.
#[tokio::test(start_paused = true)]
async fn test_every_key_resolves_to_its_owner() {
    let network = Network::with_defaults();
    let tops = [0x10, 0x30, 0x50, 0x70, 0x90, 0xb0];
    let nodes = ring(&network, &tops).await;

    for from in &nodes {
        for to in &nodes {
            let next = from.routing().route_lookup(&to.key());
            assert_eq!(next.key(), to.key(), "from {} to {}", from.key(), to.key());
        }
    }
}

/// With a one-slot leafset side, distant members land in the prefix table
/// and are still reachable.
#[tokio::test(start_paused = true)]
async fn test_table_routes_beyond_leafset() {
    let network = Network::new(ringmesh_core::config::OverlayConfig {
        leafset_half_size: 1,
        ..Default::default()
    });
    let a = network.node(0x10);
    let far = network.node(0xc0);
    a.routing().add(&a.hosts().get_host(node_addr(0x20)));
    a.routing().add(&a.hosts().get_host(node_addr(0x08)));
    a.routing().add(&a.hosts().get_host(far.me_addr()));

    assert_eq!(keys(&a.routing().routing_table()), vec![key(0xc0)]);
    assert_eq!(a.routing().route_lookup(&key(0xc4)).key(), key(0xc0));
    assert_eq!(a.routing().row_lookup(&key(0xc4)).len(), 1);
}

/// A table member restarts at the same address under a new key. Its UPDATE
/// moves the record to the slot of the new key, and nothing is left routable
/// under the old one.
#[tokio::test(start_paused = true)]
async fn test_restarted_peer_is_re_placed_under_new_key() {
    let network = Network::new(ringmesh_core::config::OverlayConfig {
        leafset_half_size: 1,
        ..Default::default()
    });
    let a = network.node(0x10);
    a.routing().add(&a.hosts().get_host(node_addr(0x20)));
    a.routing().add(&a.hosts().get_host(node_addr(0x08)));
    let old = network.node(0x30);
    a.routing().add(&a.hosts().get_host(old.me_addr()));
    assert_eq!(keys(&a.routing().routing_table()), vec![key(0x30)]);
    drop(old);

    let restarted = network.node_at(NodeAddr::new(key(0x70), addr(0x30)));
    let to_a = restarted.hosts().get_host(NodeAddr::unkeyed(addr(0x10)));
    let update = Message::update(restarted.key(), a.key(), restarted.me_addr());
    assert!(restarted.send(&to_a, update).await);
    settle().await;

    assert_eq!(keys(&a.routing().routing_table()), vec![key(0x70)]);
    assert_eq!(a.routing().row_lookup(&key(0x70)).len(), 1);
    let next = a.routing().route_lookup(&key(0x71));
    assert_eq!((next.key(), next.addr()), (key(0x70), addr(0x30)));

    assert!(a.routing().remove(&next));
    assert!(a.routing().routing_table().is_empty());
}
