//! In-memory recipe graph built from a [`crate::store::RecipeStore`]
//! snapshot: forward/backward recipe indexes plus BFS generation numbers,
//! consumed by the A* optimizer.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::pair::{encode, IdBimap};
use crate::store::RecipeStore;

pub struct RecipeGraph {
    pub ids: IdBimap,
    /// pair-key -> result id
    pub forward: FxHashMap<i64, i64>,
    /// result id -> list of (ingredient a, ingredient b)
    pub backward: FxHashMap<i64, Vec<(i64, i64)>>,
    pub generation: FxHashMap<i64, u32>,
    depth: FxHashMap<i64, u32>,
}

impl RecipeGraph {
    /// Builds a read-only snapshot of the store's recipes, then runs a
    /// multi-source BFS from `seeds` to compute generation numbers.
    pub fn build(store: &RecipeStore, seeds: &[&str]) -> Result<Self> {
        let mut ids = IdBimap::new();
        for (_, name) in store.all_items()? {
            ids.get_or_insert(&name);
        }

        let mut forward = FxHashMap::default();
        let mut backward: FxHashMap<i64, Vec<(i64, i64)>> = FxHashMap::default();
        for (a, b, result) in store.all_recipes()? {
            let a_id = ids.get_or_insert(&a);
            let b_id = ids.get_or_insert(&b);
            let result_id = ids.get_or_insert(&result);
            let key = encode(a_id, b_id);
            forward.insert(key, result_id);
            backward.entry(result_id).or_default().push((a_id, b_id));
        }

        let seed_ids: Vec<i64> = seeds.iter().map(|s| ids.get_or_insert(s)).collect();
        let generation = compute_generations(&seed_ids, &forward, &backward);

        Ok(RecipeGraph {
            ids,
            forward,
            backward,
            generation,
            depth: FxHashMap::default(),
        })
    }

    pub fn generation_of(&self, id: i64) -> Option<u32> {
        self.generation.get(&id).copied()
    }

    pub fn cached_depth(&self, id: i64) -> Option<u32> {
        self.depth.get(&id).copied()
    }

    pub fn cache_depth(&mut self, id: i64, depth: u32) {
        self.depth.insert(id, depth);
    }

    /// The tighter of `generation` and any cached `depth` lower bound.
    pub fn lower_bound(&self, id: i64) -> u32 {
        match (self.generation_of(id), self.cached_depth(id)) {
            (Some(g), Some(d)) => g.max(d),
            (Some(g), None) => g,
            (None, Some(d)) => d,
            (None, None) => 0,
        }
    }
}

/// Multi-source BFS over the recipe hypergraph: a result is assigned a
/// generation the first time any of its recipes has both ingredients
/// resolved, which FIFO processing order guarantees is the minimal one
/// (generation is non-decreasing as the queue drains, since every pair
/// considered at a given pop already has both operands known).
fn compute_generations(
    seed_ids: &[i64],
    forward: &FxHashMap<i64, i64>,
    _backward: &FxHashMap<i64, Vec<(i64, i64)>>,
) -> FxHashMap<i64, u32> {
    let mut generation: FxHashMap<i64, u32> = FxHashMap::default();
    let mut visited: Vec<i64> = Vec::new();
    let mut queue: VecDeque<i64> = VecDeque::new();

    for &s in seed_ids {
        generation.entry(s).or_insert(0);
        visited.push(s);
    }

    let enqueue = |u: i64, v: i64, generation: &mut FxHashMap<i64, u32>, queue: &mut VecDeque<i64>| {
        let (Some(&gu), Some(&gv)) = (generation.get(&u), generation.get(&v)) else {
            return;
        };
        let Some(&result) = forward.get(&encode(u, v)) else {
            return;
        };
        if result < 0 || generation.contains_key(&result) {
            return;
        }
        generation.insert(result, gu.max(gv) + 1);
        queue.push_back(result);
    };

    for i in 0..seed_ids.len() {
        for j in i..seed_ids.len() {
            enqueue(seed_ids[i], seed_ids[j], &mut generation, &mut queue);
        }
    }

    while let Some(cur) = queue.pop_front() {
        visited.push(cur);
        for i in 0..visited.len() {
            enqueue(cur, visited[i], &mut generation, &mut queue);
        }
    }

    generation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(recipes: &[(&str, &str, &str)], seeds: &[&str]) -> RecipeGraph {
        let mut store = RecipeStore::open_in_memory().unwrap();
        for (a, b, r) in recipes {
            store.upsert_recipe(a, b, r, true).unwrap();
        }
        RecipeGraph::build(&store, seeds).unwrap()
    }

    #[test]
    fn seeds_have_generation_zero() {
        let g = graph_with(&[("Water", "Fire", "Steam")], &["Water", "Fire"]);
        assert_eq!(g.generation_of(g.ids.id_of("Water").unwrap()), Some(0));
        assert_eq!(g.generation_of(g.ids.id_of("Fire").unwrap()), Some(0));
    }

    #[test]
    fn direct_combination_of_two_seeds_has_generation_one() {
        let g = graph_with(&[("Water", "Fire", "Steam")], &["Water", "Fire"]);
        assert_eq!(g.generation_of(g.ids.id_of("Steam").unwrap()), Some(1));
    }

    #[test]
    fn transitive_generation_takes_the_shortest_path() {
        let g = graph_with(
            &[
                ("Water", "Fire", "Steam"),
                ("Steam", "Earth", "Mud Cloud"),
                ("Water", "Earth", "Mud"),
                ("Mud", "Steam", "Mud Cloud"),
            ],
            &["Water", "Fire", "Earth"],
        );
        // Mud Cloud is reachable at generation 2 via Mud(1)+Steam(1), not 3.
        assert_eq!(g.generation_of(g.ids.id_of("Mud Cloud").unwrap()), Some(2));
    }

    #[test]
    fn lower_bound_prefers_cached_depth_when_tighter() {
        let mut g = graph_with(&[("Water", "Fire", "Steam")], &["Water", "Fire"]);
        let steam = g.ids.id_of("Steam").unwrap();
        g.cache_depth(steam, 5);
        assert_eq!(g.lower_bound(steam), 5);
    }
}
