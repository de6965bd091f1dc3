//! Housekeeping commands: data statistics, reset, and page analysis.

use std::collections::BTreeMap;
use std::fs;

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::{AnalyzeArgs, ResetArgs, StatsArgs, parse_http_url};
use crate::config::ScraperConfig;
use crate::formats::Checkpoint;
use crate::learning::{LearningStats, LearningStore};
use crate::links::{FilterCounts, LinkClassifier};
use crate::logging::Redacted;
use crate::page::{DriverFactory as _, PageAutomation, Query, StaticDriverFactory, attr_or_empty};
use crate::scrape::{OperatorPrompt as _, StdinPrompt};
use crate::store::{
    CheckpointStore, DownloadLedger, FailureLog, JsonLedger, LedgerStats, ProcessedStore,
    StatePaths, remove_if_exists,
};
use crate::strategy::{DetectorSet, StrategyType};

#[derive(Debug, Clone, Serialize)]
pub struct DataStats {
    pub downloads: LedgerStats,
    pub failures: FailureStats,
    pub learning: LearningStats,
    pub checkpoint: Option<Checkpoint>,
    pub processed_articles: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureStats {
    pub total: usize,
    pub by_reason: BTreeMap<String, usize>,
}

pub fn stats(config: &ScraperConfig) -> anyhow::Result<DataStats> {
    let paths = StatePaths::new(&config.state_dir);
    let ledger = JsonLedger::open(paths.ledger())?;
    let failures = FailureLog::open(paths.failures())?;
    let learning = LearningStore::load(paths.learning(), config.board_key)?;
    let checkpoint = CheckpointStore::new(paths.checkpoint()).load()?;
    let processed = ProcessedStore::open(paths.processed(), config.processed_expire_days)?;

    let mut by_reason = BTreeMap::new();
    for record in failures.records() {
        *by_reason.entry(record.reason.clone()).or_insert(0) += 1;
    }
    Ok(DataStats {
        downloads: ledger.stats(),
        failures: FailureStats {
            total: failures.len(),
            by_reason,
        },
        learning: learning.stats(),
        checkpoint,
        processed_articles: processed.len(),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    pub learning_only: bool,
    pub keep_downloads: bool,
}

/// What a reset removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub learning: bool,
    pub downloads_ledger: bool,
    pub failures: bool,
    pub checkpoint: bool,
    pub processed: bool,
    pub files_removed: usize,
}

pub fn reset(config: &ScraperConfig, options: ResetOptions) -> anyhow::Result<ResetReport> {
    let paths = StatePaths::new(&config.state_dir);
    let mut report = ResetReport {
        learning: remove_if_exists(&paths.learning())?,
        ..ResetReport::default()
    };
    if options.learning_only {
        tracing::info!(removed = report.learning, "learned strategies reset");
        return Ok(report);
    }

    report.downloads_ledger = remove_if_exists(&paths.ledger())?;
    report.failures = remove_if_exists(&paths.failures())?;
    report.checkpoint = remove_if_exists(&paths.checkpoint())?;
    report.processed = remove_if_exists(&paths.processed())?;
    if !options.keep_downloads {
        report.files_removed = remove_downloads(config)?;
    }
    tracing::info!(?report, "scrape data reset");
    Ok(report)
}

/// Deletes downloaded files of allowed types, leaving anything else alone.
fn remove_downloads(config: &ScraperConfig) -> anyhow::Result<usize> {
    let dir = &config.download_dir;
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err).with_context(|| format!("read download dir: {}", dir.display()));
        }
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry.with_context(|| format!("read download dir: {}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() || !config.extension_allowed(&name) {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}

/// Element counts and detection results for the loaded page.
#[derive(Debug, Clone, Serialize)]
pub struct PageAnalysis {
    pub url: String,
    pub anchors: usize,
    pub pdf_hrefs: usize,
    pub onclick_elements: usize,
    pub tables: usize,
    pub iframes: usize,
    pub embeds: usize,
    pub forms: usize,
    pub article_links: Vec<String>,
    pub filtered: FilterCounts,
    pub candidates: BTreeMap<StrategyType, usize>,
}

pub fn analyze_page(
    page: &dyn PageAutomation,
    config: &ScraperConfig,
) -> anyhow::Result<PageAnalysis> {
    let count = |tags: &[&str]| -> anyhow::Result<usize> { Ok(page.find(&Query::tags(tags))?.len()) };

    let anchors = page.find(&Query::tags(&["a"]))?;
    let pdf_hrefs = anchors
        .iter()
        .filter(|a| attr_or_empty(page, a, "href").to_lowercase().contains(".pdf"))
        .count();

    let (links, filtered) = LinkClassifier::new(config).extract_with_counts(page)?;
    let article_links = links
        .iter()
        .map(|link| Redacted::new(&link.title, config.privacy_protection).to_string())
        .collect();

    let mut candidates = BTreeMap::new();
    for candidate in DetectorSet::from_config(config).detect_all(page) {
        *candidates.entry(candidate.strategy).or_insert(0) += 1;
    }

    Ok(PageAnalysis {
        url: page.current_url()?,
        anchors: anchors.len(),
        pdf_hrefs,
        onclick_elements: page.find(&Query::any().with_attr("onclick"))?.len(),
        tables: count(&["table"])?,
        iframes: count(&["iframe"])?,
        embeds: count(&["embed", "object"])?,
        forms: count(&["form"])?,
        article_links,
        filtered,
        candidates,
    })
}

pub fn run_stats(args: StatsArgs) -> anyhow::Result<()> {
    let config = args.common.resolve()?;
    let stats = stats(&config)?;
    println!("{}", serde_json::to_string_pretty(&stats).context("serialize stats")?);
    Ok(())
}

pub fn run_reset(args: ResetArgs) -> anyhow::Result<()> {
    let config = args.common.resolve()?;
    if !args.yes && !config.unattended {
        let question = if args.learning_only {
            "Delete learned strategies?".to_string()
        } else {
            format!(
                "Delete all records under {}{}?",
                config.state_dir.display(),
                if args.keep_downloads {
                    String::new()
                } else {
                    format!(" and downloaded files in {}", config.download_dir.display())
                }
            )
        };
        if !StdinPrompt.confirm(&question) {
            anyhow::bail!("reset cancelled");
        }
    }
    let report = reset(
        &config,
        ResetOptions {
            learning_only: args.learning_only,
            keep_downloads: args.keep_downloads,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&report).context("serialize reset report")?);
    Ok(())
}

pub fn run_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let url = parse_http_url(&args.url)?;
    let config = args.common.resolve()?;
    let mut page = StaticDriverFactory.launch(&config)?;
    page.navigate(url.as_str())
        .with_context(|| format!("open page: {url}"))?;
    page.wait_stable(config.timeouts.page_load())?;
    let analysis = analyze_page(page.as_ref(), &config)?;
    println!("{}", serde_json::to_string_pretty(&analysis).context("serialize analysis")?);
    Ok(())
}
