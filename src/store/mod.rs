//! Durable state for a scrape: the download ledger, failure log, checkpoint,
//! processed-article markers and learned strategies.
//!
//! Every document is rewritten whole through [`write_json_atomic`], so a crash
//! mid-write leaves the previous version in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub mod checkpoint;
pub mod ledger;
pub mod processed;

pub use checkpoint::CheckpointStore;
pub use ledger::{DownloadLedger, FailureLog, JsonLedger, LedgerStats};
pub use processed::ProcessedStore;

/// File layout under the state directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger(&self) -> PathBuf {
        self.root.join("downloads.json")
    }

    pub fn failures(&self) -> PathBuf {
        self.root.join("failures.json")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join("processed_articles.json")
    }

    pub fn learning(&self) -> PathBuf {
        self.root.join("learned_strategies.json")
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse json: {}", path.display()))?;
    Ok(Some(value))
}

pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data).with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

/// Removes `path`, treating a missing file as already removed.
pub fn remove_if_exists(path: &Path) -> anyhow::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_missing_json_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<String>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn atomic_write_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        write_json_atomic(&path, &vec!["a"]).unwrap();
        write_json_atomic(&path, &vec!["b", "c"]).unwrap();

        let value: Vec<String> = read_json(&path).unwrap().unwrap();
        assert_eq!(value, vec!["b", "c"]);

        let leftovers = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
    }
}
