use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistentState {
    /// Id of the last channel that actually started playing live.
    #[serde(default)]
    pub last_channel_id: Option<String>,
}

/// JSON file holding [`PersistentState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield the default state.
    pub fn load(&self) -> PersistentState {
        if let Ok(content) = std::fs::read_to_string(&self.path) {
            if let Ok(state) = serde_json::from_str::<PersistentState>(&content) {
                return state;
            }
        }
        PersistentState::default()
    }

    pub async fn save(&self, state: &PersistentState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("state.json"));
        assert_eq!(store.load(), PersistentState::default());

        let state = PersistentState {
            last_channel_id: Some("arte".into()),
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(StateStore::new(path).load(), PersistentState::default());
    }
}
