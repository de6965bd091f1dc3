use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;
use serde::Serialize;

use super::{read_json, remove_if_exists, write_json_atomic};
use crate::formats::{DownloadRecord, FailureRecord};

/// Durable record of completed downloads, queried by the duplicate detector.
pub trait DownloadLedger {
    fn records(&self) -> &[DownloadRecord];

    /// Inserts a record. Returns `false` when `(article_url, filename)` is
    /// already present; the existing record is kept.
    fn insert(&mut self, record: DownloadRecord) -> anyhow::Result<bool>;

    fn find_by_filename(&self, filename: &str) -> Option<&DownloadRecord> {
        self.records().iter().find(|r| r.filename == filename)
    }

    fn find_by_hash(&self, sha256: &str) -> Option<&DownloadRecord> {
        self.records().iter().find(|r| r.sha256 == sha256)
    }

    fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();
        for record in self.records() {
            stats.total_files += 1;
            stats.total_bytes += record.size;
            *stats
                .by_method
                .entry(record.method.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub by_method: BTreeMap<String, usize>,
}

/// Ledger kept as a single JSON document, rewritten on every insert.
#[derive(Debug)]
pub struct JsonLedger {
    path: PathBuf,
    records: Vec<DownloadRecord>,
}

impl JsonLedger {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = read_json(&path)
            .with_context(|| format!("load ledger: {}", path.display()))?
            .unwrap_or_default();
        Ok(Self { path, records })
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.records.clear();
        remove_if_exists(&self.path)?;
        Ok(())
    }
}

impl DownloadLedger for JsonLedger {
    fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    fn insert(&mut self, record: DownloadRecord) -> anyhow::Result<bool> {
        if self
            .records
            .iter()
            .any(|r| r.article_url == record.article_url && r.filename == record.filename)
        {
            return Ok(false);
        }
        self.records.push(record);
        write_json_atomic(&self.path, &self.records)
            .with_context(|| format!("write ledger: {}", self.path.display()))?;
        Ok(true)
    }
}

/// Append-only log of failed articles and strategy attempts.
#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    records: Vec<FailureRecord>,
}

impl FailureLog {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = read_json(&path)
            .with_context(|| format!("load failure log: {}", path.display()))?
            .unwrap_or_default();
        Ok(Self { path, records })
    }

    pub fn append(&mut self, record: FailureRecord) -> anyhow::Result<()> {
        self.records.push(record);
        write_json_atomic(&self.path, &self.records)
            .with_context(|| format!("write failure log: {}", self.path.display()))
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.records.clear();
        remove_if_exists(&self.path)?;
        Ok(())
    }
}
