//! Duplicate detection against the download ledger and the download directory.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;
use sha2::{Digest as _, Sha256};

use crate::config::ScraperConfig;
use crate::formats::DownloadRecord;
use crate::store::DownloadLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    /// Same file already recorded for this article.
    UrlAndFilename,
    FilenameInLedger,
    FilenameExists,
    HashDuplicate,
}

impl DuplicateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UrlAndFilename => "url_filename_recorded",
            Self::FilenameInLedger => "filename_in_db",
            Self::FilenameExists => "filename_exists",
            Self::HashDuplicate => "hash_duplicate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuplicateCheck {
    pub reason: Option<DuplicateReason>,
    /// The ledger record the new file collides with, when there is one.
    pub info: Option<DownloadRecord>,
    /// Content hash, once a downloaded file was inspected.
    pub sha256: Option<String>,
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        self.reason.is_some()
    }

    fn duplicate(reason: DuplicateReason, info: Option<&DownloadRecord>) -> Self {
        Self {
            reason: Some(reason),
            info: info.cloned(),
            sha256: None,
        }
    }
}

pub struct DuplicateDetector {
    download_dir: PathBuf,
    remove_duplicates: bool,
}

impl DuplicateDetector {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            download_dir: config.download_dir.clone(),
            remove_duplicates: config.remove_duplicate_after_download,
        }
    }

    /// Layered check. Without `downloaded`, this is the pre-download gate
    /// (ledger, then disk). With it, the saved file's content hash is compared
    /// against the ledger and a duplicate copy is removed when configured.
    pub fn check(
        &self,
        ledger: &dyn DownloadLedger,
        filename: &str,
        downloaded: Option<&Path>,
        article_url: &str,
    ) -> anyhow::Result<DuplicateCheck> {
        let check = self.layers(ledger, filename, downloaded, article_url)?;
        if let (Some(path), Some(reason)) = (downloaded, check.reason) {
            tracing::info!(file = filename, reason = reason.as_str(), "duplicate download");
            if self.remove_duplicates {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %err, "remove duplicate failed");
                }
            }
        }
        Ok(check)
    }

    fn layers(
        &self,
        ledger: &dyn DownloadLedger,
        filename: &str,
        downloaded: Option<&Path>,
        article_url: &str,
    ) -> anyhow::Result<DuplicateCheck> {
        if let Some(record) = ledger
            .records()
            .iter()
            .find(|r| r.article_url == article_url && r.filename == filename)
        {
            return Ok(DuplicateCheck::duplicate(DuplicateReason::UrlAndFilename, Some(record)));
        }
        if let Some(record) = ledger.find_by_filename(filename) {
            return Ok(DuplicateCheck::duplicate(DuplicateReason::FilenameInLedger, Some(record)));
        }

        let Some(path) = downloaded else {
            if self.download_dir.join(filename).exists() {
                return Ok(DuplicateCheck::duplicate(DuplicateReason::FilenameExists, None));
            }
            return Ok(DuplicateCheck::default());
        };

        let sha256 = file_sha256(path)?;
        let mut check = match ledger.find_by_hash(&sha256) {
            Some(record) => DuplicateCheck::duplicate(DuplicateReason::HashDuplicate, Some(record)),
            None => DuplicateCheck::default(),
        };
        check.sha256 = Some(sha256);
        Ok(check)
    }
}

pub fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("open for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("hash file: {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::JsonLedger;
    use crate::strategy::StrategyType;

    fn setup() -> (tempfile::TempDir, DuplicateDetector, JsonLedger) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ScraperConfig::default();
        config.download_dir = dir.path().join("downloads");
        std::fs::create_dir_all(&config.download_dir).unwrap();
        let ledger = JsonLedger::open(dir.path().join("ledger.json")).unwrap();
        (dir, DuplicateDetector::new(&config), ledger)
    }

    fn record(article_url: &str, filename: &str, sha256: &str) -> DownloadRecord {
        DownloadRecord {
            article_title: "notice".to_string(),
            article_url: article_url.to_string(),
            filename: filename.to_string(),
            sha256: sha256.to_string(),
            size: 10,
            method: StrategyType::DirectLink,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn filename_in_ledger_is_duplicate_every_time() {
        let (_dir, detector, mut ledger) = setup();
        ledger
            .insert(record("https://a/view?no=1", "report.pdf", "h1"))
            .unwrap();
        for _ in 0..2 {
            let check = detector
                .check(&ledger, "report.pdf", None, "https://a/view?no=2")
                .unwrap();
            assert!(check.is_duplicate());
            assert_eq!(check.reason, Some(DuplicateReason::FilenameInLedger));
        }
        let check = detector
            .check(&ledger, "report.pdf", None, "https://a/view?no=1")
            .unwrap();
        assert_eq!(check.reason, Some(DuplicateReason::UrlAndFilename));
    }

    #[test]
    fn existing_file_on_disk_is_duplicate() {
        let (dir, detector, ledger) = setup();
        std::fs::write(dir.path().join("downloads/old.pdf"), b"%PDF").unwrap();
        let check = detector.check(&ledger, "old.pdf", None, "u").unwrap();
        assert_eq!(check.reason, Some(DuplicateReason::FilenameExists));
        assert!(!detector.check(&ledger, "new.pdf", None, "u").unwrap().is_duplicate());
    }

    #[test]
    fn hash_duplicate_removes_the_new_copy() {
        let (dir, detector, mut ledger) = setup();
        let path = dir.path().join("downloads/copy.pdf");
        std::fs::write(&path, b"%PDF-1.4 same bytes").unwrap();
        let hash = file_sha256(&path).unwrap();
        ledger.insert(record("https://a/1", "first.pdf", &hash)).unwrap();

        let check = detector
            .check(&ledger, "copy.pdf", Some(&path), "https://a/2")
            .unwrap();
        assert_eq!(check.reason, Some(DuplicateReason::HashDuplicate));
        assert_eq!(check.info.unwrap().filename, "first.pdf");
        assert!(!path.exists());
    }

    #[test]
    fn fresh_download_reports_its_hash() {
        let (dir, detector, ledger) = setup();
        let path = dir.path().join("downloads/new.pdf");
        std::fs::write(&path, b"%PDF-1.4 unique").unwrap();
        let check = detector
            .check(&ledger, "new.pdf", Some(&path), "https://a/3")
            .unwrap();
        assert!(!check.is_duplicate());
        assert_eq!(check.sha256.as_deref().map(str::len), Some(64));
        assert!(path.exists());
    }
}
