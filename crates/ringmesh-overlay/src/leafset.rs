//! Leafset: the peers numerically nearest to the local key.
//!
//! Up to `half_size` peers are kept on each side of the local key:
//! clockwise (successors) and counter-clockwise (predecessors). Each side is
//! sorted nearest first. The leafset is what makes final-hop delivery
//! correct: a key inside its span is always resolved to the closest known
//! member (or to the local node).

use ringmesh_core::{Host, Key};

use crate::routing::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Clockwise,
    CounterClockwise,
}

/// Outcome of offering a host to the leafset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Rejected,
    Inserted,
    /// Inserted, and the farthest member of that side was pushed out.
    Displaced(Host),
}

impl Admission {
    pub fn inserted(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }
}

/// A member and the key it was placed under. The two differ once the peer
/// re-keys, until routing re-places it.
#[derive(Debug, Clone)]
struct Member {
    key: Key,
    host: Host,
}

#[derive(Debug)]
pub struct Leafset {
    me: Host,
    half_size: usize,
    cw: Vec<Member>,
    ccw: Vec<Member>,
}

impl Leafset {
    pub fn new(me: Host, half_size: usize) -> Self {
        Self {
            me,
            half_size: half_size.max(1),
            cw: Vec::with_capacity(half_size + 1),
            ccw: Vec::with_capacity(half_size + 1),
        }
    }

    /// Side a key belongs to and its distance from the local key along that
    /// side. A key exactly opposite the local key goes clockwise.
    fn place(me: &Key, key: &Key) -> (Side, Key) {
        let cw = me.distance(key);
        let ccw = key.distance(me);
        if cw <= ccw {
            (Side::Clockwise, cw)
        } else {
            (Side::CounterClockwise, ccw)
        }
    }

    fn side_distance(me: &Key, key: &Key, side: Side) -> Key {
        match side {
            Side::Clockwise => me.distance(key),
            Side::CounterClockwise => key.distance(me),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.members().any(|m| m.key == *key)
    }

    /// True if `host`'s record sits here under a key it no longer has.
    pub fn is_stale(&self, host: &Host) -> bool {
        self.members().any(|m| m.host == *host && m.key != host.key())
    }

    /// Insert `host` if it is nearer than the farthest member on its side
    /// or that side has room.
    pub fn add(&mut self, host: &Host) -> Admission {
        let me = self.me.key();
        let key = host.key();
        if key == me || self.contains(&key) {
            return Admission::Rejected;
        }

        let (side, dist) = Self::place(&me, &key);
        let members = match side {
            Side::Clockwise => &mut self.cw,
            Side::CounterClockwise => &mut self.ccw,
        };

        let pos = members
            .iter()
            .position(|m| dist < Self::side_distance(&me, &m.key, side))
            .unwrap_or(members.len());
        if pos >= self.half_size {
            return Admission::Rejected;
        }

        members.insert(
            pos,
            Member {
                key,
                host: host.clone(),
            },
        );
        if members.len() > self.half_size {
            if let Some(evicted) = members.pop() {
                tracing::trace!(host = %evicted.host, ?side, "leafset evicted farthest member");
                return Admission::Displaced(evicted.host);
            }
        }
        Admission::Inserted
    }

    /// Remove the member with `host`'s key, or `host`'s record under any
    /// key. Returns whether something was removed.
    pub fn remove(&mut self, host: &Host) -> bool {
        let key = host.key();
        let before = self.len();
        for members in [&mut self.cw, &mut self.ccw] {
            members.retain(|m| m.key != key && m.host != *host);
        }
        self.len() != before
    }

    /// Resolve `key` against the leafset.
    ///
    /// `Found` when `key` lies within the span covered by the two sides;
    /// otherwise `Closest` with the nearest of the members and the local
    /// node, which callers use as a fallback candidate.
    pub fn route_lookup(&self, key: &Key) -> Lookup {
        if self.is_empty() {
            return Lookup::Closest(Some(self.me.clone()));
        }

        let me = self.me.key();
        let left = self.ccw.last().map(|m| m.key).unwrap_or(me);
        let right = self.cw.last().map(|m| m.key).unwrap_or(me);

        if let Some(exact) = self.members().find(|m| m.key == *key) {
            return Lookup::Found(exact.host.clone());
        }

        let best = self.closest(key);
        if key.between(&left, &right) {
            Lookup::Found(best)
        } else {
            Lookup::Closest(Some(best))
        }
    }

    /// Nearest of members ∪ {me} to `key` by ring distance. Ties go to the
    /// candidate lying clockwise of `key`, then to the smaller key.
    fn closest(&self, key: &Key) -> Host {
        let rank = |k: Key| {
            let clockwise_of_key = key.distance(&k) <= k.distance(key);
            (k.ring_distance(key), !clockwise_of_key, k)
        };
        self.members()
            .map(|m| (m.key, &m.host))
            .chain(std::iter::once((self.me.key(), &self.me)))
            .min_by_key(|(k, _)| rank(*k))
            .map(|(_, h)| h.clone())
            .unwrap_or_else(|| self.me.clone())
    }

    fn members(&self) -> impl Iterator<Item = &Member> {
        self.ccw.iter().chain(self.cw.iter())
    }

    /// Clockwise members, nearest first.
    pub fn cw_side(&self) -> Vec<Host> {
        self.cw.iter().map(|m| m.host.clone()).collect()
    }

    /// Counter-clockwise members, nearest first.
    pub fn ccw_side(&self) -> Vec<Host> {
        self.ccw.iter().map(|m| m.host.clone()).collect()
    }

    /// All members, counter-clockwise side first.
    pub fn hosts(&self) -> Vec<Host> {
        self.members().map(|m| m.host.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.cw.len() + self.ccw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cw.is_empty() && self.ccw.is_empty()
    }

    /// Rebuild against a new local host. Returns the former members that no
    /// longer fit.
    pub fn key_update(&mut self, me: Host) -> Vec<Host> {
        let members = self.hosts();
        self.me = me;
        self.cw.clear();
        self.ccw.clear();

        let mut left_out = Vec::new();
        for host in &members {
            match self.add(host) {
                Admission::Inserted => {}
                Admission::Displaced(out) => left_out.push(out),
                Admission::Rejected => left_out.push(host.clone()),
            }
        }
        left_out
    }
}
