//! Persistent recipe cache, backed by an embedded SQLite database opened in
//! WAL mode. Single-writer, many-reader: callers are expected to hold one
//! `RecipeStore` per process and flush it on shutdown via [`RecipeStore::close`].

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::Result;
use crate::pair::{NOTHING, UNCERTAIN_NOTHING};
use crate::util::to_start_case;

/// Commits are batched; a transaction is left open across this many writes
/// before being flushed, trading a little crash-durability for throughput.
const COMMIT_BATCH: u32 = 1000;

pub struct RecipeStore {
    conn: Connection,
    pending_writes: u32,
    in_txn: bool,
}

impl RecipeStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                emoji TEXT NOT NULL DEFAULT '',
                first_discovery INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS recipes (
                ingredient1_id INTEGER NOT NULL,
                ingredient2_id INTEGER NOT NULL,
                result_id INTEGER NOT NULL,
                PRIMARY KEY (ingredient1_id, ingredient2_id)
            );",
        )?;
        let mut store = Self {
            conn,
            pending_writes: 0,
            in_txn: false,
        };
        store.ensure_sentinel(NOTHING, "Nothing")?;
        store.ensure_sentinel(UNCERTAIN_NOTHING, "Nothing")?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn ensure_sentinel(&mut self, id: i64, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO items (id, name, emoji, first_discovery) VALUES (?1, ?2, '', 0)",
            params![id, name],
        )?;
        Ok(())
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_txn {
            self.conn.execute_batch("BEGIN")?;
            self.in_txn = true;
        }
        Ok(())
    }

    fn note_write(&mut self) -> Result<()> {
        self.pending_writes += 1;
        if self.pending_writes >= COMMIT_BATCH {
            self.flush()?;
        }
        Ok(())
    }

    /// Commits any open transaction. Safe to call when nothing is pending.
    pub fn flush(&mut self) -> Result<()> {
        if self.in_txn {
            self.conn.execute_batch("COMMIT")?;
            self.in_txn = false;
            self.pending_writes = 0;
            debug!("recipe store flushed");
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        info!("recipe store closed");
        Ok(())
    }

    /// Adds or merges an item: `emoji` is only ever filled in from empty,
    /// and `first_discovery` is logically OR'd with the existing value.
    pub fn upsert_item(&mut self, name: &str, emoji: &str, first_discovery: bool) -> Result<i64> {
        let name = to_start_case(name);
        self.upsert_item_raw(&name, emoji, first_discovery)
    }

    /// Same as [`Self::upsert_item`] but skips start-case canonicalization,
    /// for result names, which are stored exactly as the oracle returned them.
    fn upsert_item_raw(&mut self, name: &str, emoji: &str, first_discovery: bool) -> Result<i64> {
        self.begin_if_needed()?;
        let existing: Option<(i64, String, bool)> = self
            .conn
            .query_row(
                "SELECT id, emoji, first_discovery FROM items WHERE name = ?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?, r.get::<_, i64>(2)? != 0)),
            )
            .optional()?;
        let id = if let Some((id, old_emoji, old_first)) = existing {
            let new_emoji = if old_emoji.is_empty() { emoji } else { &old_emoji };
            let new_first = old_first || first_discovery;
            self.conn.execute(
                "UPDATE items SET emoji = ?1, first_discovery = ?2 WHERE id = ?3",
                params![new_emoji, new_first as i64, id],
            )?;
            id
        } else {
            self.conn.execute(
                "INSERT INTO items (name, emoji, first_discovery) VALUES (?1, ?2, ?3)",
                params![name, emoji, first_discovery as i64],
            )?;
            self.conn.last_insert_rowid()
        };
        self.note_write()?;
        Ok(id)
    }

    pub fn get_item(&self, name: &str) -> Result<Option<(i64, String, bool)>> {
        let name = to_start_case(name);
        Ok(self
            .conn
            .query_row(
                "SELECT id, emoji, first_discovery FROM items WHERE name = ?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?, r.get::<_, i64>(2)? != 0)),
            )
            .optional()?)
    }

    fn item_name(&self, id: i64) -> Result<String> {
        match id {
            NOTHING | UNCERTAIN_NOTHING => Ok("Nothing".to_string()),
            _ => Ok(self
                .conn
                .query_row("SELECT name FROM items WHERE id = ?1", params![id], |r| r.get(0))?),
        }
    }

    /// Writes a confirmed or provisional recipe result. Ingredient names are
    /// canonicalized and alphabetically ordered before storage (the store's
    /// own on-disk canonical order, independent of the numeric pair-key
    /// ordering used by the in-memory graph). A prior `UNCERTAIN_NOTHING`
    /// result may be overwritten; any other prior result is left as-is.
    pub fn upsert_recipe(&mut self, a: &str, b: &str, result: &str, result_is_new: bool) -> Result<()> {
        let a = to_start_case(a);
        let b = to_start_case(b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let lo_id = self.upsert_item_raw(&lo, "", false)?;
        let hi_id = self.upsert_item_raw(&hi, "", false)?;

        let result_id = if result == "Nothing" {
            UNCERTAIN_NOTHING
        } else {
            self.upsert_item_raw(result, "", result_is_new)?
        };

        self.begin_if_needed()?;
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT result_id FROM recipes WHERE ingredient1_id = ?1 AND ingredient2_id = ?2",
                params![lo_id, hi_id],
                |r| r.get(0),
            )
            .optional()?;
        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO recipes (ingredient1_id, ingredient2_id, result_id) VALUES (?1, ?2, ?3)",
                    params![lo_id, hi_id, result_id],
                )?;
            }
            Some(prev) if prev == UNCERTAIN_NOTHING => {
                self.conn.execute(
                    "UPDATE recipes SET result_id = ?1 WHERE ingredient1_id = ?2 AND ingredient2_id = ?3",
                    params![result_id, lo_id, hi_id],
                )?;
            }
            Some(_) => {
                // confirmed result already on record: store is monotonic, leave it.
            }
        }
        self.note_write()?;
        Ok(())
    }

    /// Marks `(a, b)` as a confirmed nothing (the `NOTHING` sentinel rather
    /// than the overwritable `UNCERTAIN_NOTHING` one), after the handler has
    /// finished re-verifying it. A no-op if the pair was never recorded.
    pub fn confirm_nothing(&mut self, a: &str, b: &str) -> Result<()> {
        let a = to_start_case(a);
        let b = to_start_case(b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![lo], |r| r.get(0))
            .optional()?;
        let hi_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![hi], |r| r.get(0))
            .optional()?;
        if let (Some(lo_id), Some(hi_id)) = (lo_id, hi_id) {
            self.begin_if_needed()?;
            self.conn.execute(
                "UPDATE recipes SET result_id = ?1 WHERE ingredient1_id = ?2 AND ingredient2_id = ?3",
                params![NOTHING, lo_id, hi_id],
            )?;
            self.note_write()?;
        }
        Ok(())
    }

    /// Returns the stored result name for `(a, b)`, including sentinel
    /// strings, or `None` if the pair has never been recorded.
    pub fn lookup(&self, a: &str, b: &str) -> Result<Option<String>> {
        let a = to_start_case(a);
        let b = to_start_case(b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![lo], |r| r.get(0))
            .optional()?;
        let hi_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![hi], |r| r.get(0))
            .optional()?;
        let (lo_id, hi_id) = match (lo_id, hi_id) {
            (Some(l), Some(h)) => (l, h),
            _ => return Ok(None),
        };
        let result_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT result_id FROM recipes WHERE ingredient1_id = ?1 AND ingredient2_id = ?2",
                params![lo_id, hi_id],
                |r| r.get(0),
            )
            .optional()?;
        match result_id {
            None => Ok(None),
            Some(id) => Ok(Some(self.item_name(id)?)),
        }
    }

    /// Returns `true` when `lookup` would return a confirmed (non-uncertain)
    /// answer for `(a, b)`.
    pub fn is_confirmed(&self, a: &str, b: &str) -> Result<bool> {
        let a = to_start_case(a);
        let b = to_start_case(b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![lo], |r| r.get(0))
            .optional()?;
        let hi_id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![hi], |r| r.get(0))
            .optional()?;
        let (lo_id, hi_id) = match (lo_id, hi_id) {
            (Some(l), Some(h)) => (l, h),
            _ => return Ok(false),
        };
        let result_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT result_id FROM recipes WHERE ingredient1_id = ?1 AND ingredient2_id = ?2",
                params![lo_id, hi_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(matches!(result_id, Some(id) if id != UNCERTAIN_NOTHING))
    }

    /// All `(other_name, result_name)` pairs where `name` is an ingredient.
    pub fn uses_of(&self, name: &str) -> Result<Vec<(String, String)>> {
        let name = to_start_case(name);
        let id: Option<i64> = self
            .conn
            .query_row("SELECT id FROM items WHERE name = ?1", params![name], |r| r.get(0))
            .optional()?;
        let Some(id) = id else { return Ok(Vec::new()) };
        let mut stmt = self.conn.prepare(
            "SELECT ingredient1_id, ingredient2_id, result_id FROM recipes
             WHERE ingredient1_id = ?1 OR ingredient2_id = ?1",
        )?;
        let rows = stmt.query_map(params![id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (a, b, result) = row?;
            let other = if a == id { b } else { a };
            out.push((self.item_name(other)?, self.item_name(result)?));
        }
        Ok(out)
    }

    /// All `(a_name, b_name)` ingredient pairs that craft into `result`.
    pub fn crafts_of(&self, result: &str) -> Result<Vec<(String, String)>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM items WHERE name = ?1",
                params![result],
                |r| r.get(0),
            )
            .optional()?;
        let Some(id) = id else { return Ok(Vec::new()) };
        let mut stmt = self
            .conn
            .prepare("SELECT ingredient1_id, ingredient2_id FROM recipes WHERE result_id = ?1")?;
        let rows = stmt.query_map(params![id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            let (a, b) = row?;
            out.push((self.item_name(a)?, self.item_name(b)?));
        }
        Ok(out)
    }

    /// Iterates every `(a_name, b_name, result_name)` row with a non-negative
    /// result id, for building an in-memory [`crate::graph::RecipeGraph`].
    pub fn all_recipes(&self) -> Result<Vec<(String, String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT ingredient1_id, ingredient2_id, result_id FROM recipes WHERE result_id >= 0",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (a, b, result) = row?;
            out.push((self.item_name(a)?, self.item_name(b)?, self.item_name(result)?));
        }
        Ok(out)
    }

    pub fn all_items(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM items WHERE id >= 0")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
