//! The crafting search node: an ordered sequence of item ids built by a
//! strictly-increasing chain of pair-keys, represented as a cactus stack so
//! sibling expansions share their unmodified prefix. `items`/`used`/
//! `children` are backed by `im`'s persistent vector/hash-set, so spawning a
//! child only diverges the path actually touched rather than cloning the
//! whole structure.

use std::rc::Rc;

use im::{HashSet, Vector};

use crate::pair::{decode, encode};

struct Node {
    parent: Option<Rc<Node>>,
    item: i64,
    /// pair-key that produced `item`, or `None` for a seed.
    state_key: Option<i64>,
    depth: usize,
}

/// An immutable crafting state. Cloning is O(1): the parent chain, the item
/// sequence, the used-count vector, and the children set are all persistent
/// structures shared with every sibling spawned from the same parent.
#[derive(Clone)]
pub struct CraftState {
    head: Rc<Node>,
    items: Vector<i64>,
    used: Vector<u32>,
    children: HashSet<i64>,
    seed_count: usize,
}

impl CraftState {
    /// Builds the initial state from a seed item-id list.
    pub fn seed(seeds: &[i64]) -> Self {
        assert!(!seeds.is_empty(), "at least one seed item is required");
        let mut parent = None;
        let mut items = Vector::new();
        let mut used = Vector::new();
        let mut depth = 0;
        for &s in seeds {
            let node = Rc::new(Node {
                parent: parent.take(),
                item: s,
                state_key: None,
                depth,
            });
            items.push_back(s);
            used.push_back(0);
            parent = Some(node);
            depth += 1;
        }
        CraftState {
            head: parent.unwrap(),
            items,
            used,
            children: HashSet::new(),
            seed_count: seeds.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn seed_count(&self) -> usize {
        self.seed_count
    }

    /// Materializes the item sequence. Only used where a plain owned
    /// sequence is genuinely needed (tests); hot paths index `items`
    /// directly instead of calling this.
    pub fn items(&self) -> Vec<i64> {
        self.items.iter().cloned().collect()
    }

    pub fn last_state_key(&self) -> i64 {
        self.head.state_key.unwrap_or(-1)
    }

    pub fn max_pair_key(&self) -> i64 {
        let n = self.items.len();
        encode((n - 1) as i64, (n - 1) as i64)
    }

    /// Indexes `>= seed_count` whose item has not yet been consumed as an
    /// ingredient anywhere in the sequence. A nonempty result means the
    /// state is not yet minimal: every remaining craft must eventually use
    /// these up or the branch is pruned.
    pub fn unused_items(&self) -> Vec<usize> {
        (self.seed_count..self.items.len())
            .filter(|&i| self.used[i] == 0)
            .collect()
    }

    /// Attempts to craft the item at pair-key `key`. Returns `None` if the
    /// key violates the ordering invariant, is out of range, the ingredient
    /// indices are invalid, the candidate `result` is empty/"Nothing", or
    /// the result has already been produced along this path (and
    /// `allow_repeat_results` is false).
    pub fn child(&self, key: i64, result_id: i64, allow_repeat_results: bool) -> Option<CraftState> {
        if key <= self.last_state_key() {
            return None;
        }
        if key > self.max_pair_key() {
            return None;
        }
        if result_id < 0 {
            return None;
        }
        let (u, v) = decode(key);
        let n = self.items.len() as i64;
        if u < 0 || v < 0 || u >= n || v >= n {
            return None;
        }
        if self.children.contains(&result_id) {
            return None;
        }
        if !allow_repeat_results && self.items.iter().any(|&it| it == result_id) {
            return None;
        }

        // Cloning these is O(1) (an `Rc` bump on the shared spine); the
        // `push_back`/`insert`/index-assign below diverge only the path
        // actually touched, leaving every sibling's view untouched.
        let mut used = self.used.clone();
        used[u as usize] += 1;
        used[v as usize] += 1;
        used.push_back(0);

        let mut items = self.items.clone();
        items.push_back(result_id);

        let mut children = self.children.clone();
        children.insert(result_id);

        let node = Rc::new(Node {
            parent: Some(self.head.clone()),
            item: result_id,
            state_key: Some(key),
            depth: self.head.depth + 1,
        });

        Some(CraftState {
            head: node,
            items,
            used,
            children,
            seed_count: self.seed_count,
        })
    }

    /// The ordered `(u_id, v_id, result_id)` trace of crafts beyond the
    /// seeds, oldest first.
    pub fn trace(&self) -> Vec<(i64, i64, i64)> {
        let mut steps = Vec::new();
        let mut node = Some(self.head.clone());
        while let Some(n) = node {
            if let Some(key) = n.state_key {
                let (u, v) = decode(key);
                steps.push((self.items[u as usize], self.items[v as usize], n.item));
            }
            node = n.parent.clone();
        }
        steps.reverse();
        steps
    }

    /// The state-key sequence from the root to this state, oldest first.
    /// Used to resume a discovery run: a saved cursor is a state-key
    /// sequence, and a candidate state is skipped once its own sequence
    /// compares lexicographically less than the saved one.
    pub fn state_key_path(&self) -> Vec<i64> {
        let mut keys = Vec::new();
        let mut node = Some(self.head.clone());
        while let Some(n) = node {
            if let Some(key) = n.state_key {
                keys.push(key);
            }
            node = n.parent.clone();
        }
        keys.reverse();
        keys
    }
}

/// Compares a candidate path against a saved resume cursor over their common
/// prefix only. `Less` means the candidate diverges from the cursor at an
/// earlier branch and was already covered by the run being resumed, so it
/// should be skipped without expansion. A candidate that is a true prefix of
/// the cursor (or vice versa) compares `Equal`: it still leads toward, or
/// past, the checkpointed position and must keep being explored, unlike a
/// plain `Vec` comparison which would call the shorter one `Less`.
pub fn compare_state_key_path(candidate: &[i64], cursor: &[i64]) -> std::cmp::Ordering {
    for (c, r) in candidate.iter().zip(cursor.iter()) {
        match c.cmp(r) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_state_has_no_trace_and_all_unused() {
        let s = CraftState::seed(&[0, 1, 2, 3]);
        assert_eq!(s.len(), 4);
        assert!(s.trace().is_empty());
        assert_eq!(s.unused_items(), Vec::<usize>::new());
    }

    #[test]
    fn child_enforces_strictly_increasing_keys() {
        let s = CraftState::seed(&[0, 1]);
        let key = encode(0, 1);
        let child = s.child(key, 2, false).unwrap();
        assert!(child.child(key, 3, false).is_none());
        let lower = encode(0, 0);
        assert!(lower < key);
        assert!(child.child(lower, 3, false).is_none());
    }

    #[test]
    fn child_marks_ingredients_used() {
        // unused_items only tracks indices beyond the seeds, so the freshly
        // crafted item itself (index 2) is the sole unused entry here.
        let s = CraftState::seed(&[0, 1]);
        let key = encode(0, 1);
        let child = s.child(key, 2, false).unwrap();
        assert_eq!(child.unused_items(), vec![2usize]);
    }

    #[test]
    fn unused_items_excludes_seeds_even_when_never_consumed() {
        let s = CraftState::seed(&[0, 1, 2]);
        let child = s.child(encode(0, 1), 3, false).unwrap();
        // seeds 0-2 are never tracked by unused_items regardless of use;
        // only the crafted item at index 3 is in range.
        assert_eq!(child.unused_items(), vec![3usize]);
    }

    #[test]
    fn siblings_share_structure_without_mutating_each_other() {
        let s = CraftState::seed(&[0, 1, 2]);
        let a = s.child(encode(0, 1), 3, false).unwrap();
        let b = s.child(encode(0, 2), 4, false).unwrap();
        assert_eq!(a.items(), vec![0, 1, 2, 3]);
        assert_eq!(b.items(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn trace_reconstructs_crafts_in_order() {
        let s = CraftState::seed(&[0, 1]);
        let c1 = s.child(encode(0, 1), 2, false).unwrap();
        let c2 = c1.child(encode(1, 2), 3, false).unwrap();
        assert_eq!(c2.trace(), vec![(0, 1, 2), (1, 2, 3)]);
    }

    #[test]
    fn state_key_path_matches_trace_length() {
        let s = CraftState::seed(&[0, 1]);
        let c1 = s.child(encode(0, 1), 2, false).unwrap();
        let c2 = c1.child(encode(1, 2), 3, false).unwrap();
        assert_eq!(c2.state_key_path(), vec![encode(0, 1), encode(1, 2)]);
    }

    #[test]
    fn resume_cursor_orders_lexicographically() {
        let cursor = vec![encode(0, 1), encode(1, 2)];
        assert_eq!(compare_state_key_path(&[encode(0, 1), encode(0, 2)], &cursor), std::cmp::Ordering::Less);
        assert_eq!(compare_state_key_path(&[encode(0, 1), encode(1, 2)], &cursor), std::cmp::Ordering::Equal);
        assert_eq!(compare_state_key_path(&[encode(0, 1), encode(1, 3)], &cursor), std::cmp::Ordering::Greater);
    }

    #[test]
    fn resume_cursor_treats_a_shorter_matching_prefix_as_equal() {
        // A candidate that hasn't diverged from the cursor yet must not be
        // pruned just because it's shallower: the branch still leads toward
        // (or past) the checkpointed position.
        let cursor = vec![encode(0, 1), encode(1, 2)];
        assert_eq!(compare_state_key_path(&[encode(0, 1)], &cursor), std::cmp::Ordering::Equal);
        assert_eq!(compare_state_key_path(&[encode(0, 0)], &cursor), std::cmp::Ordering::Less);
    }
}
