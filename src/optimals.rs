//! Persistent cache of each target's best-known optimal craft trace
//! (`optimals.db`), a single-table companion to [`crate::store::RecipeStore`]
//! following the same embedded-SQLite discipline.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::Result;

pub struct OptimalsStore {
    conn: Connection,
}

impl OptimalsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS optimals (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                optimal TEXT NOT NULL
            );",
        )?;
        Ok(OptimalsStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Records (or overwrites) the optimal trace for `name`, rendered as a
    /// semicolon-joined sequence of `"a + b = result"` steps.
    pub fn upsert(&self, name: &str, optimal: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO optimals (name, optimal) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET optimal = excluded.optimal",
            params![name, optimal],
        )?;
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        self.conn
            .query_row("SELECT optimal FROM optimals WHERE name = ?1", params![name], |r| r.get(0))
            .optional()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_lookup_roundtrips() {
        let store = OptimalsStore::open_in_memory().unwrap();
        store.upsert("Steam", "Water + Fire = Steam").unwrap();
        assert_eq!(store.lookup("Steam").unwrap(), Some("Water + Fire = Steam".to_string()));
    }

    #[test]
    fn upsert_overwrites_the_existing_entry() {
        let store = OptimalsStore::open_in_memory().unwrap();
        store.upsert("Steam", "first").unwrap();
        store.upsert("Steam", "second").unwrap();
        assert_eq!(store.lookup("Steam").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn missing_name_looks_up_as_none() {
        let store = OptimalsStore::open_in_memory().unwrap();
        assert_eq!(store.lookup("Mystery").unwrap(), None);
    }
}
