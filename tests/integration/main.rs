//! ringmesh integration test harness.
//!
//! Whole rings run inside one process on an in-memory network (see
//! `infra.rs`). Every test uses tokio's paused clock, so grace periods and
//! check intervals elapse instantly and deterministically:
//!
//!   cargo test --test integration
//!
//! Nodes are addressed by the top byte of their key: `ring.node(0x50)`
//! listens on 127.0.0.1:5080 with key 0x50 00 .. 00.

mod infra;

mod join;
mod messages;
mod routing;
mod stabilization;

pub use infra::*;
