use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::learning::BoardKeyMode;
use crate::strategy::StrategyType;

const DEFAULT_USER_AGENT: &str = concat!("boardpdf/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub download_dir: PathBuf,
    pub state_dir: PathBuf,
    pub timeouts: Timeouts,
    pub max_consecutive_failures: u32,
    pub browser_restart_interval: u32,
    pub max_retries: u32,
    pub enabled_strategies: Vec<StrategyType>,
    /// Run the filename-link detector ahead of the others.
    pub prefer_filename_links: bool,
    pub strategy_learning: bool,
    pub fast_mode: bool,
    pub privacy_protection: bool,
    pub safe_mode: bool,
    pub allowed_extensions: Vec<String>,
    pub download_all_pdfs: bool,
    pub max_pdfs_per_article: usize,
    pub remove_duplicate_after_download: bool,
    /// Downloads must be strictly larger than this many bytes.
    pub min_pdf_size: u64,
    pub min_link_text: usize,
    pub max_link_text: usize,
    /// Shorter listing titles are not treated as articles.
    pub min_article_title_chars: usize,
    pub board_key: BoardKeyMode,
    pub track_processed_articles: bool,
    pub skip_processed_articles: bool,
    pub processed_expire_days: u32,
    pub unattended: bool,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            state_dir: PathBuf::from(".boardpdf"),
            timeouts: Timeouts::default(),
            max_consecutive_failures: 5,
            browser_restart_interval: 50,
            max_retries: 2,
            enabled_strategies: StrategyType::ALL
                .into_iter()
                .filter(|t| *t != StrategyType::PreviewDownloadPair)
                .collect(),
            prefer_filename_links: true,
            strategy_learning: true,
            fast_mode: true,
            privacy_protection: true,
            safe_mode: true,
            allowed_extensions: vec![".pdf".to_string()],
            download_all_pdfs: true,
            max_pdfs_per_article: 10,
            remove_duplicate_after_download: true,
            min_pdf_size: 100,
            min_link_text: 3,
            max_link_text: 200,
            min_article_title_chars: 8,
            board_key: BoardKeyMode::default(),
            track_processed_articles: false,
            skip_processed_articles: false,
            processed_expire_days: 90,
            unattended: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub page_load_ms: u64,
    pub element_wait_ms: u64,
    pub download_wait_ms: u64,
    pub page_stable_ms: u64,
    pub new_window_grace_ms: u64,
    pub background_open_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load_ms: 20_000,
            element_wait_ms: 10_000,
            download_wait_ms: 30_000,
            page_stable_ms: 5_000,
            new_window_grace_ms: 1_000,
            background_open_ms: 2_000,
            poll_interval_ms: 500,
        }
    }
}

impl Timeouts {
    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms)
    }

    pub fn download_wait(&self) -> Duration {
        Duration::from_millis(self.download_wait_ms)
    }

    pub fn page_stable(&self) -> Duration {
        Duration::from_millis(self.page_stable_ms)
    }

    pub fn new_window_grace(&self) -> Duration {
        Duration::from_millis(self.new_window_grace_ms)
    }

    pub fn background_open(&self) -> Duration {
        Duration::from_millis(self.background_open_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl ScraperConfig {
    /// Loads defaults, then the YAML file (if any), then `BOARDPDF_*` overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parse config yaml: {}", path.display()))?
            }
            None => Self::default(),
        };
        config
            .apply_env(|key| std::env::var(key).ok())
            .context("apply environment overrides")?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(dir) = lookup("BOARDPDF_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BOARDPDF_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("BOARDPDF_UNATTENDED") {
            self.unattended = parse_flag(&raw).context("BOARDPDF_UNATTENDED")?;
        }
        if let Some(raw) = lookup("BOARDPDF_FAST_MODE") {
            self.fast_mode = parse_flag(&raw).context("BOARDPDF_FAST_MODE")?;
        }
        if let Some(raw) = lookup("BOARDPDF_PRIVACY") {
            self.privacy_protection = parse_flag(&raw).context("BOARDPDF_PRIVACY")?;
        }
        if let Some(raw) = lookup("BOARDPDF_DOWNLOAD_WAIT_MS") {
            self.timeouts.download_wait_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("BOARDPDF_DOWNLOAD_WAIT_MS: invalid number: {raw}"))?;
        }
        if let Some(raw) = lookup("BOARDPDF_BOARD_KEY") {
            self.board_key = BoardKeyMode::parse(&raw).context("BOARDPDF_BOARD_KEY")?;
        }
        Ok(())
    }

    pub fn strategy_enabled(&self, strategy: StrategyType) -> bool {
        self.enabled_strategies.contains(&strategy)
    }

    /// Case-insensitive check of `filename` against `allowed_extensions`.
    pub fn extension_allowed(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("unsupported flag value: {other}"),
    }
}
