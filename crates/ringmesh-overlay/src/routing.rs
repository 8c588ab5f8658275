//! Routing facade: leafset plus prefix table behind one lock.
//!
//! All routing state of a node lives in a single [`Routing`] value. Every
//! operation takes the lock for its full duration, so a lookup never sees a
//! half-applied add or remove. The lock is never held across an `.await`.

use std::sync::{Mutex, MutexGuard};

use ringmesh_core::{Host, Key};

use crate::leafset::{Admission, Leafset};
use crate::routing_table::RoutingTable;

/// Result of one routing structure's lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The structure is authoritative for the key.
    Found(Host),
    /// Best-effort candidate, if the structure has one.
    Closest(Option<Host>),
}

impl Lookup {
    /// The host if the lookup was definite.
    pub fn found(self) -> Option<Host> {
        match self {
            Lookup::Found(h) => Some(h),
            Lookup::Closest(_) => None,
        }
    }
}

#[derive(Debug)]
struct RoutingState {
    me: Host,
    leafset: Leafset,
    table: RoutingTable,
}

impl RoutingState {
    /// Drop `host`'s record if it is held under a key it no longer has.
    fn forget_stale(&mut self, host: &Host) -> bool {
        if !self.leafset.is_stale(host) && !self.table.is_stale(host) {
            return false;
        }
        self.leafset.remove(host);
        self.table.remove(host);
        tracing::debug!(host = %host, "re-keyed peer dropped from its old position");
        true
    }

    fn insert(&mut self, host: &Host) -> bool {
        let key = host.key();
        if self.leafset.contains(&key) {
            return false;
        }
        match self.leafset.add(host) {
            Admission::Rejected => {
                let added = self.table.add(host);
                if added {
                    tracing::debug!(host = %host, "added to routing table");
                }
                added
            }
            admission => {
                tracing::debug!(host = %host, "added to leafset");
                // Never in both structures at once.
                self.table.remove(host);
                if let Admission::Displaced(out) = admission {
                    self.offer_to_table(&out);
                }
                true
            }
        }
    }

    fn offer_to_table(&mut self, host: &Host) {
        if self.table.add(host) {
            tracing::debug!(host = %host, "moved from leafset to routing table");
        }
    }
}

#[derive(Debug)]
pub struct Routing {
    state: Mutex<RoutingState>,
}

impl Routing {
    pub fn new(me: Host, leafset_half_size: usize) -> Self {
        Self {
            state: Mutex::new(RoutingState {
                leafset: Leafset::new(me.clone(), leafset_half_size),
                table: RoutingTable::new(me.clone()),
                me,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RoutingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer `host` to the leafset, then to the table if the leafset
    /// declined. Re-adding a known host changes nothing; a record known
    /// under an older key is re-placed. Hosts without a key yet are never
    /// routed to.
    pub fn add(&self, host: &Host) -> bool {
        if host.key().is_zero() {
            return false;
        }
        let mut state = self.state();
        let moved = state.forget_stale(host);
        state.insert(host) || moved
    }

    /// Re-place `host` if it re-keyed since it was added. Returns whether it
    /// had to move.
    pub fn refresh(&self, host: &Host) -> bool {
        let mut state = self.state();
        if !state.forget_stale(host) {
            return false;
        }
        if !host.key().is_zero() {
            state.insert(host);
        }
        true
    }

    /// Remove `host` from both structures, by key or by record.
    pub fn remove(&self, host: &Host) -> bool {
        let mut state = self.state();
        let from_leafset = state.leafset.remove(host);
        let from_table = state.table.remove(host);
        if from_leafset {
            tracing::debug!(host = %host, "removed from leafset");
        }
        if from_table {
            tracing::debug!(host = %host, "removed from routing table");
        }
        from_leafset || from_table
    }

    /// Next hop towards `key`. Returns the local host when it is the
    /// closest known node, including when no peer is known at all.
    pub fn route_lookup(&self, key: &Key) -> Host {
        let state = self.state();
        if state.me.key() == *key {
            return state.me.clone();
        }

        let leaf_best = match state.leafset.route_lookup(key) {
            Lookup::Found(h) => {
                tracing::trace!(%key, next = %h, "leafset hit");
                return h;
            }
            Lookup::Closest(h) => h.unwrap_or_else(|| state.me.clone()),
        };

        match state.table.route_lookup(key) {
            Lookup::Found(h) => {
                tracing::trace!(%key, next = %h, "routing table hit");
                h
            }
            Lookup::Closest(Some(table_best)) => nearer(&state.me, leaf_best, table_best, key),
            Lookup::Closest(None) => leaf_best,
        }
    }

    /// Routing table row for the prefix `key` shares with the local key.
    pub fn row_lookup(&self, key: &Key) -> Vec<Host> {
        let state = self.state();
        let i = state.me.key().key_index(key);
        state.table.row(i)
    }

    pub fn leafset(&self) -> Vec<Host> {
        self.state().leafset.hosts()
    }

    pub fn cw_leafset(&self) -> Vec<Host> {
        self.state().leafset.cw_side()
    }

    pub fn ccw_leafset(&self) -> Vec<Host> {
        self.state().leafset.ccw_side()
    }

    pub fn routing_table(&self) -> Vec<Host> {
        self.state().table.hosts()
    }

    pub fn me(&self) -> Host {
        self.state().me.clone()
    }

    /// Switch to a new local host and rebuild both structures around it.
    /// Former leafset members that no longer fit are offered to the table.
    pub fn key_update(&self, me: Host) {
        let mut state = self.state();
        tracing::debug!(key = %me.key(), "routing state re-keyed");
        let left_out = state.leafset.key_update(me.clone());
        state.table.key_update(me.clone());
        for host in &left_out {
            state.offer_to_table(host);
        }
        state.me = me;
    }
}

/// Fallback when neither structure is definite: the candidate with the
/// shorter clockwise distance to `key` wins. On a tie the leafset candidate
/// wins only if it is the local node.
fn nearer(me: &Host, leaf_best: Host, table_best: Host, key: &Key) -> Host {
    let leaf_dist = leaf_best.key().distance(key);
    let table_dist = table_best.key().distance(key);
    if leaf_dist < table_dist || (leaf_dist == table_dist && leaf_best == *me) {
        leaf_best
    } else {
        table_best
    }
}
