use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use crate::models::Figure;

/// Persists each sub-site's previous listing set between runs so a restart
/// starts from the last baseline instead of re-discovering the whole
/// inventory.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn save(&self, key: &str, figures: &[Figure]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string(figures)?;
        fs::write(self.path_for(key), content)?;
        Ok(())
    }

    /// `None` on first run, before any snapshot exists.
    pub fn load(&self, key: &str) -> Result<Option<Vec<Figure>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Service;

    fn temp_store(test: &str) -> SnapshotStore {
        let dir = std::env::temp_dir()
            .join("figwatch-tests")
            .join(format!("{}-{}", test, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        SnapshotStore::new(dir)
    }

    #[test]
    fn test_load_missing_snapshot_is_none() {
        let store = temp_store("missing");
        assert!(store.load("jungle-0").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = temp_store("roundtrip");

        let mut figure = Figure::new(
            Service::Jungle,
            "Nendoroid Miku",
            "4,800 JPY".to_string(),
            "http://example.com/1".to_string(),
            "http://example.com/1.jpg".to_string(),
        );
        figure.set_condition("Sealed".to_string()).unwrap();

        store.save("jungle-0", &[figure.clone()]).unwrap();
        let loaded = store.load("jungle-0").unwrap().unwrap();
        assert_eq!(loaded, vec![figure]);
    }
}
