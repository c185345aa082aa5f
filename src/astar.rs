//! Bottom-up A* search for a minimum-length craft sequence reaching a set
//! of target elements, subject to an optional deviation bound against a
//! baseline "free" item set.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::error::{CraftError, Result};
use crate::graph::RecipeGraph;

#[derive(Clone, Debug, Eq, PartialEq)]
struct SearchState {
    to_craft: BTreeSet<i64>,
    crafted: BTreeSet<i64>,
    trace: Vec<(i64, i64, i64)>,
}

struct QueueEntry {
    heuristic: u32,
    order: u64,
    state: SearchState,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.heuristic == other.heuristic && self.order == other.order
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.heuristic, self.order).cmp(&(other.heuristic, other.order))
    }
}

pub struct AstarConfig {
    pub deviation_bound: Option<u32>,
}

impl Default for AstarConfig {
    fn default() -> Self {
        AstarConfig { deviation_bound: None }
    }
}

/// Computes the adjusted-generation heuristic: sorts ascending, enforces
/// strict monotonicity, then returns the last (= maximum) element, since the
/// adjustment is monotonically non-decreasing by construction.
fn adjusted_generation_max(graph: &RecipeGraph, ids: &BTreeSet<i64>) -> u32 {
    if ids.is_empty() {
        return 0;
    }
    let mut gens: Vec<u32> = ids.iter().map(|&id| graph.lower_bound(id)).collect();
    gens.sort_unstable();
    for i in 1..gens.len() {
        gens[i] = gens[i].max(gens[i - 1] + 1);
    }
    *gens.last().unwrap()
}

fn heuristic(graph: &RecipeGraph, state: &SearchState) -> u32 {
    state.trace.len() as u32 + adjusted_generation_max(graph, &state.to_craft)
}

/// Walks the already-chosen recipes in `trace` to determine whether `start`
/// transitively depends on `target` (i.e. `target` is an ancestor ingredient
/// of `start`). Used to reject recipes that would close a cycle.
fn depends_on(trace: &[(i64, i64, i64)], start: i64, target: i64) -> bool {
    if start == target {
        return true;
    }
    let mut by_result: FxHashMap<i64, (i64, i64)> = FxHashMap::default();
    for &(u, v, r) in trace {
        by_result.insert(r, (u, v));
    }
    let mut stack = vec![start];
    let mut seen = BTreeSet::new();
    while let Some(cur) = stack.pop() {
        if cur == target {
            return true;
        }
        if !seen.insert(cur) {
            continue;
        }
        if let Some(&(u, v)) = by_result.get(&cur) {
            stack.push(u);
            stack.push(v);
        }
    }
    false
}

/// Finds all minimum-length craft traces producing every element of
/// `targets`, given `free` ids that cost nothing to use (typically the
/// seed set plus a baseline script's own crafts).
pub fn solve(
    graph: &RecipeGraph,
    targets: &[&str],
    free: &BTreeSet<i64>,
    config: &AstarConfig,
) -> Result<Vec<Vec<(i64, i64, i64)>>> {
    let mut target_ids = BTreeSet::new();
    for &t in targets {
        let id = graph
            .ids
            .id_of(t)
            .ok_or_else(|| CraftError::UnknownTarget(t.to_string()))?;
        if !free.contains(&id) {
            target_ids.insert(id);
        }
    }

    if target_ids.is_empty() {
        return Ok(vec![Vec::new()]);
    }

    let start = SearchState {
        to_craft: target_ids,
        crafted: BTreeSet::new(),
        trace: Vec::new(),
    };

    let mut heap = BinaryHeap::new();
    let mut order = 0u64;
    heap.push(Reverse(QueueEntry {
        heuristic: heuristic(graph, &start),
        order,
        state: start,
    }));

    let mut best_at: FxHashMap<BTreeSet<i64>, usize> = FxHashMap::default();
    let mut processed: std::collections::HashSet<BTreeSet<i64>> = std::collections::HashSet::new();
    let mut upper_bound: Option<u32> = None;
    let mut solutions = Vec::new();

    while let Some(Reverse(entry)) = heap.pop() {
        let state = entry.state;
        let h = entry.heuristic;

        if let Some(ub) = upper_bound {
            if h > ub {
                break;
            }
        }

        if state.to_craft.is_empty() {
            let ub = state.trace.len() as u32;
            upper_bound = Some(upper_bound.map_or(ub, |u| u.min(ub)));
            solutions.push(topo_sort(&state.trace, free));
            continue;
        }

        if !processed.insert(state.to_craft.clone()) {
            continue;
        }

        // expand the hardest-looking pending item first
        let current = *state
            .to_craft
            .iter()
            .max_by_key(|&&id| graph.lower_bound(id))
            .unwrap();

        let Some(recipes) = graph.backward.get(&current) else {
            continue;
        };

        for &(u, v) in recipes {
            if depends_on(&state.trace, u, current) || depends_on(&state.trace, v, current) {
                continue;
            }

            let mut to_craft = state.to_craft.clone();
            to_craft.remove(&current);
            let mut crafted = state.crafted.clone();
            crafted.insert(current);

            for &ing in &[u, v] {
                if !free.contains(&ing) && !crafted.contains(&ing) {
                    to_craft.insert(ing);
                }
            }

            if let Some(bound) = config.deviation_bound {
                let deviations = to_craft
                    .union(&crafted)
                    .filter(|id| !free.contains(*id))
                    .count() as u32;
                if deviations > bound {
                    continue;
                }
            }

            let mut trace = state.trace.clone();
            trace.push((u, v, current));

            // strictly-worse paths to the same `to_craft` frontier are
            // pruned, but ties are kept so tied-optimal solutions survive.
            let craft_count = trace.len();
            let key = to_craft.clone();
            if let Some(&best) = best_at.get(&key) {
                if best < craft_count {
                    continue;
                }
            }
            best_at.insert(key, craft_count);

            let next = SearchState { to_craft, crafted, trace };
            order += 1;
            heap.push(Reverse(QueueEntry {
                heuristic: heuristic(graph, &next),
                order,
                state: next,
            }));
        }
    }

    Ok(solutions)
}

/// Reorders a trace so each step's ingredients are already available
/// (a free id, or the output of an earlier step) before that step runs.
fn topo_sort(trace: &[(i64, i64, i64)], free: &BTreeSet<i64>) -> Vec<(i64, i64, i64)> {
    let mut available: BTreeSet<i64> = free.clone();
    let mut remaining: Vec<(i64, i64, i64)> = trace.to_vec();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let pos = remaining
            .iter()
            .position(|&(u, v, _)| available.contains(&u) && available.contains(&v))
            .expect("cycle-free trace must always have a ready step");
        let (u, v, r) = remaining.remove(pos);
        available.insert(r);
        ordered.push((u, v, r));
    }

    ordered
}
