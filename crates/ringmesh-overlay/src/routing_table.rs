//! Prefix routing table.
//!
//! One row per shared-prefix length with the local key, one column per
//! digit value. The entry at `(i, j)` shares exactly `i` leading digits with
//! the local key and has digit `j` at position `i`. Forwarding through the
//! table matches at least one more digit of the destination per hop.

use ringmesh_core::{Host, Key, DIGIT_VALUES, KEY_DIGITS};

use crate::routing::Lookup;

type Row = [Option<Host>; DIGIT_VALUES];

#[derive(Debug)]
pub struct RoutingTable {
    me: Host,
    rows: Vec<Row>,
}

impl RoutingTable {
    pub fn new(me: Host) -> Self {
        Self {
            me,
            rows: (0..KEY_DIGITS).map(|_| empty_row()).collect(),
        }
    }

    /// Row and column `key` belongs in, `None` for the local key itself.
    fn slot(&self, key: &Key) -> Option<(usize, usize)> {
        let i = self.me.key().key_index(key);
        if i >= KEY_DIGITS {
            return None;
        }
        Some((i, key.digit(i)))
    }

    /// Install `host` if its slot is empty or holds a peer with a worse
    /// success average. Re-adding the current occupant changes nothing.
    pub fn add(&mut self, host: &Host) -> bool {
        let key = host.key();
        let Some((i, j)) = self.slot(&key) else {
            return false;
        };

        let slot = &mut self.rows[i][j];
        match slot {
            None => {
                *slot = Some(host.clone());
                true
            }
            Some(current) if current.key() == key => false,
            Some(current) if current.success_avg() < host.success_avg() => {
                tracing::trace!(old = %current, new = %host, row = i, col = j, "routing table slot replaced");
                *slot = Some(host.clone());
                true
            }
            Some(_) => false,
        }
    }

    /// Clear the slot holding `host`'s key, and any slot holding `host`'s
    /// record under an older key.
    pub fn remove(&mut self, host: &Host) -> bool {
        let key = host.key();
        let mut removed = false;
        for slot in self.rows.iter_mut().flat_map(|row| row.iter_mut()) {
            let matches = slot
                .as_ref()
                .is_some_and(|h| h == host || h.key() == key);
            if matches {
                *slot = None;
                removed = true;
            }
        }
        removed
    }

    pub fn contains(&self, key: &Key) -> bool {
        match self.slot(key) {
            Some((i, j)) => self.rows[i][j].as_ref().is_some_and(|h| h.key() == *key),
            None => false,
        }
    }

    /// True if `host`'s record sits in a slot its current key does not map to.
    pub fn is_stale(&self, host: &Host) -> bool {
        let home = self.slot(&host.key());
        self.rows.iter().enumerate().any(|(i, row)| {
            row.iter()
                .enumerate()
                .any(|(j, h)| h.as_ref() == Some(host) && home != Some((i, j)))
        })
    }

    /// Prefix routing step.
    ///
    /// `Found` with an entry sharing strictly more digits with `key` than
    /// the local key does; otherwise `Closest` with the table entry nearest
    /// to `key` by ring distance (or `None` on an empty table).
    pub fn route_lookup(&self, key: &Key) -> Lookup {
        let i = self.me.key().key_index(key);
        if i >= KEY_DIGITS {
            return Lookup::Found(self.me.clone());
        }

        let better = self.rows[i]
            .iter()
            .flatten()
            .find(|h| h.key().key_index(key) > i);
        if let Some(host) = better {
            return Lookup::Found(host.clone());
        }

        let closest = self
            .entries()
            .min_by_key(|h| {
                let k = h.key();
                (k.ring_distance(key), k)
            })
            .cloned();
        Lookup::Closest(closest)
    }

    fn entries(&self) -> impl Iterator<Item = &Host> {
        self.rows.iter().flat_map(|row| row.iter().flatten())
    }

    /// Occupied entries of row `i`; empty for an out-of-range row.
    pub fn row(&self, i: usize) -> Vec<Host> {
        self.rows
            .get(i)
            .map(|row| row.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// All occupied entries, row by row.
    pub fn hosts(&self) -> Vec<Host> {
        self.entries().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Rebuild against a new local host from the current entries.
    pub fn key_update(&mut self, me: Host) {
        let entries = self.hosts();
        self.me = me;
        for row in self.rows.iter_mut() {
            *row = empty_row();
        }
        for host in &entries {
            self.add(host);
        }
    }
}

fn empty_row() -> Row {
    std::array::from_fn(|_| None)
}
