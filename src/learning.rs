//! Per-board strategy learning.
//!
//! Each board keeps success/failure counts per strategy type. The derived
//! score reorders candidates for later articles on the same board; it never
//! removes them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::store::{read_json, remove_if_exists, write_json_atomic};
use crate::strategy::{Candidate, StrategyType};

pub const NEUTRAL_SCORE: f64 = 0.5;
const STREAK_BONUS: f64 = 0.1;
const STREAK_MIN_SUCCESS: u32 = 3;
const SKIP_MIN_FAILURES: u32 = 5;
const LEARNED_WEIGHT: f64 = 0.7;
const CONFIDENCE_WEIGHT: f64 = 0.3;

/// Maps an article URL to the key its board's learning record is stored under.
pub trait BoardKey {
    fn board_key(&self, article_url: &str) -> String;
}

/// `scheme://host/path`, query and fragment dropped.
pub struct StripQuery;

impl BoardKey for StripQuery {
    fn board_key(&self, article_url: &str) -> String {
        match url::Url::parse(article_url) {
            Ok(parsed) => format!(
                "{}://{}{}",
                parsed.scheme(),
                parsed.host_str().map_or_else(String::new, |host| match parsed.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                }),
                parsed.path()
            ),
            Err(_) => article_url.to_string(),
        }
    }
}

/// Like [`StripQuery`], and a purely numeric last path segment is dropped too,
/// so `/notice/detail/456` and `/notice/detail/457` share a record.
pub struct StripQueryAndNumericTail;

impl BoardKey for StripQueryAndNumericTail {
    fn board_key(&self, article_url: &str) -> String {
        let base = StripQuery.board_key(article_url);
        match base.rsplit_once('/') {
            Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => {
                format!("{head}/")
            }
            _ => base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKeyMode {
    StripQuery,
    #[default]
    StripQueryAndNumericTail,
}

impl BoardKeyMode {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strip_query" => Ok(Self::StripQuery),
            "" | "strip_query_and_numeric_tail" => Ok(Self::StripQueryAndNumericTail),
            other => anyhow::bail!("unsupported board key mode: {other}"),
        }
    }

    pub fn build(self) -> Box<dyn BoardKey + Send> {
        match self {
            Self::StripQuery => Box::new(StripQuery),
            Self::StripQueryAndNumericTail => Box::new(StripQueryAndNumericTail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub success: u32,
    pub fail: u32,
    pub score: f64,
}

impl Default for StrategyStats {
    fn default() -> Self {
        Self {
            success: 0,
            fail: 0,
            score: NEUTRAL_SCORE,
        }
    }
}

pub type BoardRecord = BTreeMap<StrategyType, StrategyStats>;

/// `success / total`, plus a streak bonus at three or more clean successes,
/// capped at 1.0. Neutral when there is no data.
pub fn calculate_score(success: u32, fail: u32) -> f64 {
    let total = success + fail;
    if total == 0 {
        return NEUTRAL_SCORE;
    }
    let mut score = f64::from(success) / f64::from(total);
    if success >= STREAK_MIN_SUCCESS && fail == 0 {
        score += STREAK_BONUS;
    }
    score.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LearningStats {
    pub total_boards: usize,
    pub boards: Vec<BoardSummary>,
    pub by_strategy: BTreeMap<StrategyType, StrategyTotals>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSummary {
    pub board: String,
    pub strategies: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_strategy: Option<StrategyType>,
    pub top_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyTotals {
    pub success: u64,
    pub fail: u64,
    pub success_rate: f64,
}

pub struct LearningStore {
    path: Option<PathBuf>,
    boards: BTreeMap<String, BoardRecord>,
    key: Box<dyn BoardKey + Send>,
}

impl LearningStore {
    pub fn in_memory(mode: BoardKeyMode) -> Self {
        Self {
            path: None,
            boards: BTreeMap::new(),
            key: mode.build(),
        }
    }

    /// Loads the store from `path`. A missing file starts empty.
    pub fn load(path: impl Into<PathBuf>, mode: BoardKeyMode) -> anyhow::Result<Self> {
        let path = path.into();
        let boards = read_json(&path)
            .with_context(|| format!("load learned strategies: {}", path.display()))?
            .unwrap_or_default();
        Ok(Self {
            path: Some(path),
            boards,
            key: mode.build(),
        })
    }

    /// Like [`LearningStore::load`], but an unreadable file starts a fresh store.
    pub fn load_or_fresh(path: impl Into<PathBuf>, mode: BoardKeyMode) -> Self {
        let path = path.into();
        match Self::load(&path, mode) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "learned strategies unreadable; starting fresh");
                Self {
                    path: Some(path),
                    ..Self::in_memory(mode)
                }
            }
        }
    }

    pub fn board_key(&self, article_url: &str) -> String {
        self.key.board_key(article_url)
    }

    pub fn record(&self, board: &str) -> Option<&BoardRecord> {
        self.boards.get(board)
    }

    pub fn has_history(&self, board: &str) -> bool {
        self.boards.get(board).is_some_and(|r| !r.is_empty())
    }

    pub fn score(&self, board: &str, strategy: StrategyType) -> f64 {
        self.boards
            .get(board)
            .and_then(|r| r.get(&strategy))
            .map_or(NEUTRAL_SCORE, |s| s.score)
    }

    pub fn update(&mut self, board: &str, strategy: StrategyType, success: bool) {
        let stats = self
            .boards
            .entry(board.to_string())
            .or_default()
            .entry(strategy)
            .or_default();
        if success {
            stats.success += 1;
        } else {
            stats.fail += 1;
        }
        stats.score = calculate_score(stats.success, stats.fail);
        tracing::debug!(
            board,
            strategy = %strategy,
            success = stats.success,
            fail = stats.fail,
            score = stats.score,
            "strategy stats updated"
        );
    }

    /// Never succeeded and failed at least five times. Advisory only.
    pub fn is_skip_eligible(&self, board: &str, strategy: StrategyType) -> bool {
        self.boards
            .get(board)
            .and_then(|r| r.get(&strategy))
            .is_some_and(|s| s.success == 0 && s.fail >= SKIP_MIN_FAILURES)
    }

    /// Orders candidates for trying. With history for `board`, by
    /// `0.7 * learned + 0.3 * confidence`, with skip-eligible strategies moved
    /// to the back; otherwise by confidence. Ties keep detector order.
    pub fn rank(&self, board: &str, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        if !self.has_history(board) {
            candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            return candidates;
        }
        let priority = |c: &Candidate| {
            LEARNED_WEIGHT * self.score(board, c.strategy) + CONFIDENCE_WEIGHT * c.confidence
        };
        candidates.sort_by(|a, b| priority(b).total_cmp(&priority(a)));
        let (preferred, skipped): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !self.is_skip_eligible(board, c.strategy));
        preferred.into_iter().chain(skipped).collect()
    }

    pub fn stats(&self) -> LearningStats {
        let mut stats = LearningStats {
            total_boards: self.boards.len(),
            ..LearningStats::default()
        };
        for (board, record) in &self.boards {
            let top = record
                .iter()
                .max_by(|a, b| a.1.score.total_cmp(&b.1.score));
            stats.boards.push(BoardSummary {
                board: board.clone(),
                strategies: record.len(),
                top_strategy: top.map(|(t, _)| *t),
                top_score: top.map_or(0.0, |(_, s)| s.score),
            });
            for (strategy, s) in record {
                let totals = stats.by_strategy.entry(*strategy).or_default();
                totals.success += u64::from(s.success);
                totals.fail += u64::from(s.fail);
            }
        }
        for totals in stats.by_strategy.values_mut() {
            let total = totals.success + totals.fail;
            if total > 0 {
                totals.success_rate = totals.success as f64 / total as f64;
            }
        }
        stats
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json_atomic(path, &self.boards)
            .with_context(|| format!("save learned strategies: {}", path.display()))?;
        tracing::debug!(boards = self.boards.len(), "learned strategies saved");
        Ok(())
    }

    /// Forgets everything, in memory and on disk.
    pub fn reset(&mut self) -> anyhow::Result<()> {
        self.boards.clear();
        if let Some(path) = &self.path {
            remove_if_exists(path)?;
        }
        Ok(())
    }
}
