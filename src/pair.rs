//! Canonical ids and the unordered-pair codec.
//!
//! Every recipe is keyed on an unordered pair of ingredient ids. We pack
//! `(a, b)` with `a <= b` into a single integer with a Cantor-style pairing
//! function so the whole search can use plain integer maps and sets instead
//! of hashing pairs directly.

use rustc_hash::FxHashMap;

/// A confirmed "this pair makes nothing" result. Never overwritten once set.
pub const NOTHING: i64 = -1;
/// A provisional "nothing", written before the handler has fully verified
/// the answer. May be overwritten by a later confirmed result.
pub const UNCERTAIN_NOTHING: i64 = -2;

/// Packs an unordered pair of non-negative ids into a single non-negative
/// integer. `encode(a, b) == encode(b, a)`.
pub fn encode(a: i64, b: i64) -> i64 {
    let (i, j) = if a <= b { (a, b) } else { (b, a) };
    i + (j * (j + 1)) / 2
}

/// Inverse of [`encode`]. Returns `(-1, -1)` for negative input, mirroring
/// the convention that sentinel results never appear on the left of a pair.
pub fn decode(k: i64) -> (i64, i64) {
    if k < 0 {
        return (-1, -1);
    }
    let approx = (((8 * k + 1) as f64).sqrt() - 1.0) / 2.0;
    let mut j = approx.floor() as i64;
    // float sqrt can be off by one at the boundary; nudge to the exact triangular bracket.
    while j * (j + 1) / 2 > k {
        j -= 1;
    }
    while (j + 1) * (j + 2) / 2 <= k {
        j += 1;
    }
    let i = k - j * (j + 1) / 2;
    (i, j)
}

/// Bidirectional id<->name mapping. Ids are assigned densely starting at 0
/// in insertion order; the two sentinel results are never allocated through
/// this map (they are synthesized directly by [`IdBimap::sentinel_name`]).
#[derive(Debug, Default)]
pub struct IdBimap {
    names: Vec<String>,
    ids: FxHashMap<String, i64>,
}

impl IdBimap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, inserting a fresh one if this is the
    /// first time the name has been seen.
    pub fn get_or_insert(&mut self, name: &str) -> i64 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as i64;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        match id {
            NOTHING => Some("Nothing"),
            UNCERTAIN_NOTHING => Some("Nothing"),
            _ => self.names.get(id as usize).map(|s| s.as_str()),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as i64, n.as_str()))
    }
}
