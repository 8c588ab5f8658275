use anyhow::{Context, Result};
use ringmesh_core::wire::{self, Frame};
use ringmesh_core::{Message, MessageError, MessageKind};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Host and message encoding
// ══════════════════════════════════════════════════════════════════════════════

/// A host encoded by one node decodes to an equivalent record in another
/// node's registry.
#[tokio::test(start_paused = true)]
async fn test_host_encoding_survives_between_nodes() -> Result<()> {
    let network = Network::with_defaults();
    let a = network.node(0x10);
    let b = network.node(0x50);

    let encoded = a.me().encode();
    let decoded = b.hosts().decode_host(&encoded).context("decode host")?;
    assert_eq!(decoded.addr(), a.me().addr());
    assert_eq!(decoded.key(), a.key());

    // Decoding again yields the same shared record.
    let again = b.hosts().decode_host(&encoded)?;
    assert_eq!(again, decoded);
    Ok(())
}

/// Every message kind survives the datagram framing used on the wire.
#[test]
fn test_messages_survive_framing() -> Result<()> {
    let (me, peer) = (node_addr(0x10), node_addr(0x50));
    let messages = [
        Message::join(me.key, me.key, me),
        Message::join_ack(peer.key, me.key, vec![me, peer]),
        Message::join_nack(peer.key, me.key, me),
        Message::update(me.key, peer.key, me),
        Message::piggy(me.key, peer.key, vec![peer, me]),
        Message::ping(me.key, peer.key, me),
        Message::route(me.key, key(0x77), "payload".to_string()),
    ];
    for (seq, msg) in messages.iter().enumerate() {
        let buf = wire::encode_data(seq as u64, msg)?;
        match wire::decode_frame(&buf)? {
            Frame::Data { seq: got, message } => {
                assert_eq!(got, seq as u64);
                assert_eq!(&message, msg, "{}", msg.kind.name());
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    Ok(())
}

/// A node refuses messages that do not match their schema and keeps
/// working afterwards.
#[tokio::test(start_paused = true)]
async fn test_node_rejects_malformed_message() {
    let network = Network::with_defaults();
    let a = network.node(0x10);

    let bad = Message::new(MessageKind::Piggy, key(0x50), a.key(), vec![]);
    assert!(matches!(a.handle(bad).await, Err(MessageError::ArgCount { .. })));

    let body = br#"{"kind":9,"source":"50","destination":"10","args":[]}"#;
    assert_eq!(Message::decode(body), Err(MessageError::UnknownKind(9)));

    let update = Message::update(key(0x50), a.key(), node_addr(0x50));
    a.handle(update).await.unwrap();
    assert_eq!(keys(&a.routing().leafset()), vec![key(0x50)]);
}

/// Status snapshots serialize with keys as hex.
#[tokio::test(start_paused = true)]
async fn test_status_snapshot_serializes() -> Result<()> {
    let network = Network::with_defaults();
    let nodes = ring(&network, &[0x10, 0x50]).await;

    let status = nodes[0].status();
    assert!(status.started);
    assert_eq!(status.leafset.len(), 1);

    let json = serde_json::to_value(&status)?;
    assert_eq!(json["key"], serde_json::json!(key(0x10).to_string()));
    assert_eq!(json["leafset"][0]["addr"], serde_json::json!("127.0.0.1:5080"));
    Ok(())
}
