//! Atomic read/write of `persistent.json`, the resumable search-state file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(rename = "GameState")]
    pub game_state: Vec<i64>,
    #[serde(rename = "BestDepths")]
    pub best_depths: HashMap<String, u32>,
}

impl PersistentState {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(PersistentState::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes to a temp file in the same directory then renames it into
    /// place, so a reader never observes a partially-written file and a
    /// crash mid-write leaves the previous version (or an ignorable orphan
    /// temp file) rather than a corrupt one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persistent.json");
        let mut state = PersistentState::default();
        state.game_state = vec![1, 2, 3];
        state.best_depths.insert("Steam".to_string(), 1);
        state.save(&path).unwrap();

        let loaded = PersistentState::load(&path).unwrap();
        assert_eq!(loaded.game_state, vec![1, 2, 3]);
        assert_eq!(loaded.best_depths.get("Steam"), Some(&1));
    }

    #[test]
    fn missing_file_loads_as_default() {
        let loaded = PersistentState::load(std::path::Path::new("/nonexistent/persistent.json")).unwrap();
        assert!(loaded.game_state.is_empty());
    }

    #[test]
    fn save_does_not_leave_a_stray_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persistent.json");
        PersistentState::default().save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.exists());
    }
}
