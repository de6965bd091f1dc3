use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategy::StrategyType;

/// One successfully saved file. Doubles as the duplicate-detection ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub article_title: String,
    pub article_url: String,
    pub filename: String,
    pub sha256: String,
    pub size: u64,
    pub method: StrategyType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub article_title: String,
    pub article_url: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyType>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub board_url: String,
    /// Listing URL of `current_page`, as reached through pagination.
    pub listing_url: String,
    pub current_page: u32,
    pub current_article_index: usize,
    pub total_downloaded: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub article_url: String,
    pub status: ArticleStatus,
    pub pdf_count: usize,
    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Success,
    Partial,
    NoPdf,
    AllSkipped,
    Error,
}

impl ArticleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::NoPdf => "no_pdf",
            Self::AllSkipped => "all_skipped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub filename: String,
    pub size: u64,
    pub method: StrategyType,
    pub confidence: f64,
    pub filepath: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub filename: String,
    pub reason: String,
    pub strategy: StrategyType,
}

/// Result of processing a single article page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleResult {
    pub status: ArticleStatus,
    pub downloads: Vec<DownloadEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub failed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_strategy: Option<StrategyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ArticleResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ArticleStatus::Error,
            downloads: Vec::new(),
            skipped: Vec::new(),
            failed_count: 0,
            successful_strategy: None,
            message: Some(message.into()),
        }
    }
}
