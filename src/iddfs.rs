//! Iterative-deepening search over crafting states: enumerates every
//! element reachable within a depth bound, caching each craft it discovers
//! through a [`crate::handler::RecipeHandler`].

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::{debug, info};

use crate::error::Result;
use crate::handler::RecipeHandler;
use crate::pair::{decode, encode};
use crate::persist::PersistentState;
use crate::state::{compare_state_key_path, CraftState};

pub const AUTOSAVE_INTERVAL: u32 = 500;

pub struct SearchStats {
    pub new_elements: u32,
    pub visited_states: u64,
}

pub struct Iddfs<'a> {
    handler: &'a mut RecipeHandler,
    names: Vec<String>,
    allow_starting_elements_as_results: bool,
    autosave_counter: u32,
    resume_cursor: Option<Vec<i64>>,
    persist_path: Option<PathBuf>,
    persistent: PersistentState,
}

impl<'a> Iddfs<'a> {
    pub fn new(handler: &'a mut RecipeHandler, seed_names: Vec<String>, allow_starting_elements_as_results: bool) -> Self {
        Iddfs {
            handler,
            names: seed_names,
            allow_starting_elements_as_results,
            autosave_counter: 0,
            resume_cursor: None,
            persist_path: None,
            persistent: PersistentState::default(),
        }
    }

    /// Resumes from a previously-saved state-key cursor: any candidate whose
    /// own state-key path compares lexicographically less than `cursor` was
    /// already covered by the run being resumed and is skipped without a
    /// combine call.
    pub fn with_resume_cursor(mut self, cursor: Vec<i64>) -> Self {
        self.resume_cursor = Some(cursor);
        self
    }

    /// Enables autosave: every `AUTOSAVE_INTERVAL` newly-discovered elements,
    /// and once more when `run` finishes, the store is flushed and `initial`
    /// (updated with `best_depths` and the current resume cursor) is written
    /// to `path`.
    pub fn with_persistence(mut self, path: PathBuf, initial: PersistentState) -> Self {
        self.persist_path = Some(path);
        self.persistent = initial;
        self
    }

    fn name_at(&self, i: usize) -> &str {
        &self.names[i]
    }

    async fn resolve_child(&mut self, state: &CraftState, key: i64) -> Result<Option<(CraftState, String)>> {
        let (u, v) = decode(key);
        if u < 0 || v < 0 {
            return Ok(None);
        }
        let a = self.name_at(u as usize).to_string();
        let b = self.name_at(v as usize).to_string();
        let result = self.handler.combine(&a, &b).await?;
        if result == "Nothing" {
            return Ok(None);
        }
        let result_id = match self.names.iter().position(|n| n == &result) {
            Some(i) => i as i64,
            None => {
                self.names.push(result.clone());
                (self.names.len() - 1) as i64
            }
        };
        Ok(state
            .child(key, result_id, self.allow_starting_elements_as_results)
            .map(|c| (c, result)))
    }

    /// Checkpoints progress: flushes the store and, if persistence is
    /// enabled, records `cursor` as the resume point and saves
    /// `persistent.json`.
    fn checkpoint(&mut self, cursor: Vec<i64>) -> Result<()> {
        self.handler.store.flush()?;
        if let Some(path) = self.persist_path.clone() {
            self.persistent.game_state = cursor;
            self.persistent.save(&path)?;
        }
        Ok(())
    }

    /// Depth-limited search from `state`, stopping `depth_remaining` crafts
    /// from now. Returns the number of newly-discovered leaf elements.
    ///
    /// Boxed because the search recurses on itself through an `async fn`,
    /// which would otherwise require an infinitely-sized future.
    pub fn dls<'b>(
        &'b mut self,
        state: CraftState,
        depth_remaining: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + 'b>> {
        Box::pin(self.dls_inner(state, depth_remaining))
    }

    async fn dls_inner(&mut self, state: CraftState, depth_remaining: u32) -> Result<u32> {
        if depth_remaining == 0 {
            // A depth-0 call is already a leaf: the state itself was counted
            // by its parent. No further crafts are possible, so no candidate
            // pairs are generated and the oracle is never consulted here.
            return Ok(0);
        }

        let mut discovered = 0u32;
        let unused = state.unused_items();

        if unused.len() as u32 > depth_remaining + 1 {
            return Ok(0);
        }

        let candidate_keys: Vec<i64> = if unused.len() as u32 > depth_remaining {
            let mut keys = Vec::new();
            for (pi, &i) in unused.iter().enumerate() {
                for &j in &unused[pi + 1..] {
                    keys.push(encode(i as i64, j as i64));
                }
            }
            keys.sort_unstable();
            keys
        } else {
            let forces_last_use = depth_remaining == 1 && state.len() > state.seed_count();
            let lower = if forces_last_use {
                encode((state.len() as i64) - 1, (state.len() as i64) - 2) + 1
            } else {
                state.last_state_key() + 1
            };
            let upper = state.max_pair_key() + 1;
            (lower..upper).collect()
        };

        let state_path_so_far = state.state_key_path();

        for key in candidate_keys {
            if let Some(cursor) = &self.resume_cursor {
                let mut candidate_path = state_path_so_far.clone();
                candidate_path.push(key);
                if compare_state_key_path(&candidate_path, cursor) == std::cmp::Ordering::Less {
                    continue;
                }
            }

            let Some((child, result_name)) = self.resolve_child(&state, key).await? else {
                continue;
            };
            if depth_remaining == 1 {
                debug!(result = %result_name, "discovered element");
                discovered += 1;

                let depth_from_root = state.trace().len() as u32 + 1;
                let best = self.persistent.best_depths.entry(result_name.clone()).or_insert(depth_from_root);
                if depth_from_root < *best {
                    *best = depth_from_root;
                }

                self.autosave_counter += 1;
                if self.autosave_counter >= AUTOSAVE_INTERVAL {
                    self.autosave_counter = 0;
                    let cursor = child.state_key_path();
                    self.checkpoint(cursor)?;
                    info!(count = discovered, "autosave checkpoint reached");
                }
            } else {
                discovered += self.dls(child, depth_remaining - 1).await?;
            }
        }

        Ok(discovered)
    }

    /// Runs `dls` at increasing depths from 1 up to and including `max_depth`.
    pub async fn run(&mut self, seeds: Vec<i64>, max_depth: u32) -> Result<SearchStats> {
        let mut total_new = 0;
        for depth in 1..=max_depth {
            let state = CraftState::seed(&seeds);
            let found = self.dls(state, depth).await?;
            info!(depth, found, "iddfs depth complete");
            total_new += found;
        }
        // A completed run (as opposed to one interrupted mid-depth) has
        // nothing left to resume from; best_depths still accumulates across
        // runs, only the cursor resets.
        self.checkpoint(Vec::new())?;
        Ok(SearchStats {
            new_elements: total_new,
            visited_states: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::test_support::ScriptedOracle;
    use crate::oracle::OracleClient;
    use crate::store::RecipeStore;

    fn seed_names() -> Vec<String> {
        vec!["Water".into(), "Fire".into(), "Wind".into(), "Earth".into()]
    }

    #[tokio::test]
    async fn depth_zero_discovers_nothing() {
        let store = RecipeStore::open_in_memory().unwrap();
        let oracle = OracleClient::new(Some("http://127.0.0.1:9".to_string()));
        let mut handler = RecipeHandler::new(store, oracle, crate::handler::HandlerConfig::default());
        let mut search = Iddfs::new(&mut handler, seed_names(), false);
        let seeds: Vec<i64> = (0..4).collect();
        let state = CraftState::seed(&seeds);
        let found = search.dls(state, 0).await.unwrap();
        assert_eq!(found, 0);
    }

    #[tokio::test]
    async fn depth_one_uses_only_local_cache_in_local_only_mode() {
        let mut store = RecipeStore::open_in_memory().unwrap();
        store.upsert_recipe("Water", "Fire", "Steam", true).unwrap();
        let oracle = OracleClient::new(Some("http://127.0.0.1:9".to_string()));
        let mut handler = RecipeHandler::new(
            store,
            oracle,
            crate::handler::HandlerConfig {
                local_only: true,
                ..Default::default()
            },
        );
        let mut search = Iddfs::new(&mut handler, seed_names(), false);
        let seeds: Vec<i64> = (0..4).collect();
        let state = CraftState::seed(&seeds);
        let found = search.dls(state, 1).await.unwrap();
        assert_eq!(found, 1);
    }

    /// Four seeds give `encode(3, 3) + 1 == 10` distinct unordered pair-keys
    /// (including self-pairs), so a fully-answering oracle fixture of ten
    /// entries should yield exactly ten newly-discovered elements at depth 1.
    #[tokio::test]
    async fn ten_pair_depth_one_fixture_discovers_exactly_ten_elements() {
        let store = RecipeStore::open_in_memory().unwrap();
        let responses: Vec<_> = (0..10).map(|i| ScriptedOracle::ok(&format!("Result{i}"))).collect();
        let oracle = ScriptedOracle::new(responses);
        let mut handler = RecipeHandler::new(store, oracle, crate::handler::HandlerConfig::default());
        let mut search = Iddfs::new(&mut handler, seed_names(), false);
        let seeds: Vec<i64> = (0..4).collect();
        let state = CraftState::seed(&seeds);
        let found = search.dls(state, 1).await.unwrap();
        assert_eq!(found, 10);
    }

    #[tokio::test]
    async fn resume_cursor_skips_already_covered_branches() {
        let store = RecipeStore::open_in_memory().unwrap();
        // Only the key at index 9 (encode(3,3), the last candidate) should
        // survive the skip; everything before the cursor must never reach
        // the oracle, so a single scripted answer is enough.
        let oracle = ScriptedOracle::new(vec![ScriptedOracle::ok("Last")]);
        let mut handler = RecipeHandler::new(store, oracle, crate::handler::HandlerConfig::default());
        let mut search = Iddfs::new(&mut handler, seed_names(), false).with_resume_cursor(vec![encode(3, 3)]);
        let seeds: Vec<i64> = (0..4).collect();
        let state = CraftState::seed(&seeds);
        let found = search.dls(state, 1).await.unwrap();
        assert_eq!(found, 1);
    }

    #[tokio::test]
    async fn autosave_checkpoint_flushes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persistent.json");
        let store = RecipeStore::open_in_memory().unwrap();
        let responses: Vec<_> = (0..10).map(|i| ScriptedOracle::ok(&format!("Result{i}"))).collect();
        let oracle = ScriptedOracle::new(responses);
        let mut handler = RecipeHandler::new(store, oracle, crate::handler::HandlerConfig::default());
        let mut search = Iddfs::new(&mut handler, seed_names(), false).with_persistence(path.clone(), PersistentState::default());
        search.autosave_counter = AUTOSAVE_INTERVAL - 1;
        let seeds: Vec<i64> = (0..4).collect();
        let state = CraftState::seed(&seeds);
        search.dls(state, 1).await.unwrap();
        assert!(path.exists());
        let saved = PersistentState::load(&path).unwrap();
        assert!(!saved.best_depths.is_empty());
    }
}
