use std::path::PathBuf;

use anyhow::Context as _;

use super::{read_json, remove_if_exists, write_json_atomic};
use crate::formats::Checkpoint;

/// Single-document checkpoint, overwritten after every article.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> anyhow::Result<Option<Checkpoint>> {
        read_json(&self.path).with_context(|| format!("load checkpoint: {}", self.path.display()))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        write_json_atomic(&self.path, checkpoint)
            .with_context(|| format!("save checkpoint: {}", self.path.display()))
    }

    pub fn clear(&self) -> anyhow::Result<bool> {
        remove_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_overwrites_and_clear_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().unwrap().is_none());

        let mut checkpoint = Checkpoint {
            board_url: "https://gov.example/board/list".to_string(),
            listing_url: "https://gov.example/board/list".to_string(),
            current_page: 1,
            current_article_index: 3,
            total_downloaded: 2,
            last_updated: chrono::Utc::now(),
        };
        store.save(&checkpoint).unwrap();
        checkpoint.current_article_index = 4;
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load().unwrap(), Some(checkpoint));

        assert!(store.clear().unwrap());
        assert!(store.load().unwrap().is_none());
        assert!(!store.clear().unwrap());
    }
}
