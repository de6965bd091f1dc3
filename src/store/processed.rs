use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use super::{read_json, remove_if_exists, write_json_atomic};
use crate::formats::{ArticleStatus, ProcessedArticle};

/// Markers for article URLs already visited, keyed by URL.
#[derive(Debug)]
pub struct ProcessedStore {
    path: PathBuf,
    expire: chrono::Duration,
    entries: BTreeMap<String, ProcessedArticle>,
    dirty: bool,
}

impl ProcessedStore {
    pub fn open(path: impl Into<PathBuf>, expire_days: u32) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = read_json(&path)
            .with_context(|| format!("load processed markers: {}", path.display()))?
            .unwrap_or_default();
        Ok(Self {
            path,
            expire: chrono::Duration::days(i64::from(expire_days)),
            entries,
            dirty: false,
        })
    }

    /// True when `article_url` has a marker younger than the expiry window.
    /// A hit refreshes the marker's `last_accessed`.
    pub fn check(&mut self, article_url: &str, now: DateTime<Utc>) -> bool {
        let expire = self.expire;
        match self.entries.get_mut(article_url) {
            Some(entry) if now - entry.timestamp < expire => {
                entry.last_accessed = now;
                self.dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark(
        &mut self,
        article_url: &str,
        status: ArticleStatus,
        pdf_count: usize,
        now: DateTime<Utc>,
    ) {
        self.entries.insert(
            article_url.to_string(),
            ProcessedArticle {
                article_url: article_url.to_string(),
                status,
                pdf_count,
                timestamp: now,
                last_accessed: now,
            },
        );
        self.dirty = true;
    }

    /// Drops markers older than the expiry window. Returns how many were removed.
    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expire = self.expire;
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.timestamp < expire);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(&self.path, &self.entries)
            .with_context(|| format!("save processed markers: {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        self.dirty = false;
        remove_if_exists(&self.path)?;
        Ok(())
    }
}
