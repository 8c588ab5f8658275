//! ringmeshd: overlay node daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use ringmesh_core::config::RingmeshConfig;
use ringmesh_core::{Key, NodeAddr};
use ringmesh_overlay::Node;

mod listener;
mod udp;

use listener::Listener;
use udp::UdpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RingmeshConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RingmeshConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RingmeshConfig::default()
    });

    let key = if config.node.key.is_empty() {
        Key::random()
    } else {
        config
            .node
            .key
            .parse::<Key>()
            .context("invalid node key in config")?
    };

    let socket = Arc::new(
        UdpSocket::bind(config.node.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.node.listen_addr))?,
    );
    let local_addr = socket.local_addr()?;
    if local_addr.ip().is_unspecified() {
        tracing::warn!(%local_addr, "listening on an unspecified address, peers will see this node under the address it sends from");
    }
    tracing::info!(%key, %local_addr, "ringmeshd starting");

    let transport = UdpTransport::new(socket.clone(), config.overlay.ping_timeout());
    let node = Node::new(
        NodeAddr::new(key, local_addr),
        config.overlay.clone(),
        transport.clone(),
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let listener_task = tokio::spawn(
        Listener::new(socket, transport.clone(), node.clone(), shutdown_tx.subscribe()).run(),
    );

    let status_printer = {
        let node = node.clone();
        let transport = transport.clone();
        let period = config.overlay.check_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let status = node.status();
                tracing::info!(
                    leafset = status.leafset.len(),
                    routing_table = status.routing_table.len(),
                    pending_acks = transport.pending(),
                    "overlay snapshot"
                );
                match serde_json::to_string(&status) {
                    Ok(json) => tracing::debug!(status = %json, "node status"),
                    Err(e) => tracing::warn!(error = %e, "failed to serialize status"),
                }
            }
        })
    };

    // ── Join or start a ring ─────────────────────────────────────────────────

    if config.node.bootstrap.is_empty() {
        tracing::info!("no bootstrap configured, starting a new ring");
        node.start();
    } else {
        let bootstrap: SocketAddr = config
            .node
            .bootstrap
            .parse()
            .with_context(|| format!("invalid bootstrap address {:?}", config.node.bootstrap))?;
        if !node.join(bootstrap).await {
            tracing::warn!(%bootstrap, "bootstrap host did not acknowledge join");
        }
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = listener_task       => tracing::error!("listener exited: {:?}", r),
        r = status_printer      => tracing::error!("status printer exited: {:?}", r),
    }

    node.shutdown();
    Ok(())
}
