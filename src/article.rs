//! Per-article detect, rank and try pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;
use chrono::{Local, Utc};

use crate::cli::{ArticleArgs, parse_http_url};
use crate::config::ScraperConfig;
use crate::dedup::DuplicateDetector;
use crate::error::ScrapeError;
use crate::executor::{DownloadExecutor, ExecutionResult};
use crate::formats::{
    ArticleResult, ArticleStatus, DownloadEntry, DownloadRecord, FailureRecord, SkippedEntry,
};
use crate::learning::LearningStore;
use crate::links::ArticleLink;
use crate::logging::Redacted;
use crate::page::{DriverFactory as _, PageAutomation, StaticDriverFactory};
use crate::store::{DownloadLedger, FailureLog, JsonLedger, StatePaths};
use crate::strategy::filename::{self, FilenameOutcome};
use crate::strategy::{Candidate, DetectorSet, StrategyType, dedup_candidates};

/// Mutable state an article run reads and records into.
pub struct ArticleStores<'s> {
    pub learning: &'s mut LearningStore,
    pub ledger: &'s mut dyn DownloadLedger,
    pub failures: Option<&'s mut FailureLog>,
}

#[derive(Debug, Clone)]
pub struct ArticleTarget {
    pub title: String,
    pub url: String,
}

pub struct ArticlePipeline {
    config: ScraperConfig,
    detectors: DetectorSet,
    executor: DownloadExecutor,
    dedup: DuplicateDetector,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct Attempts {
    downloads: Vec<DownloadEntry>,
    skipped: Vec<SkippedEntry>,
    failed_count: usize,
    tried: HashSet<String>,
}

impl ArticlePipeline {
    pub fn new(config: &ScraperConfig) -> Self {
        Self::with_cancel(config, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_cancel(config: &ScraperConfig, cancel: Arc<AtomicBool>) -> Self {
        Self {
            config: config.clone(),
            detectors: DetectorSet::from_config(config),
            executor: DownloadExecutor::new(config).with_cancel(Arc::clone(&cancel)),
            dedup: DuplicateDetector::new(config),
            cancel,
        }
    }

    /// Opens `link` from the listing and processes the article it leads to.
    /// Navigation failures are returned as errors.
    pub fn process_link(
        &self,
        page: &mut dyn PageAutomation,
        stores: &mut ArticleStores<'_>,
        link: &ArticleLink,
        hint: Option<StrategyType>,
    ) -> anyhow::Result<(ArticleTarget, ArticleResult)> {
        let target = self.open(page, link)?;
        let result = self.process_loaded(page, stores, &target, hint);
        Ok((target, result))
    }

    fn open(
        &self,
        page: &mut dyn PageAutomation,
        link: &ArticleLink,
    ) -> anyhow::Result<ArticleTarget> {
        let settle = self.config.timeouts.page_load();
        match (&link.url, link.is_javascript) {
            (Some(url), false) => {
                tracing::debug!(url = %self.redact(url), "open article");
                page.navigate(url)?;
            }
            _ => {
                let before = page.current_url()?;
                if let Err(err) = page.click(&link.element) {
                    tracing::debug!(error = %format!("{err:#}"), "article click failed; forcing");
                    page.force_click(&link.element)?;
                }
                if page.current_url()? == before {
                    tracing::warn!(title = %self.redact(&link.title), "script link left the url unchanged");
                }
            }
        }
        if !page.wait_stable(settle)? {
            tracing::warn!("article page did not settle");
        }
        Ok(ArticleTarget {
            title: link.title.clone(),
            url: page.current_url()?,
        })
    }

    /// Loads `url` and processes it. A page that cannot be opened yields an
    /// `error` result and is written to the failure log.
    pub fn process_url(
        &self,
        page: &mut dyn PageAutomation,
        stores: &mut ArticleStores<'_>,
        url: &str,
        title: &str,
    ) -> ArticleResult {
        let opened = page
            .navigate(url)
            .and_then(|()| page.wait_stable(self.config.timeouts.page_load()))
            .and_then(|_| page.current_url());
        match opened {
            Ok(current) => {
                let target = ArticleTarget {
                    title: title.to_string(),
                    url: current,
                };
                self.process_loaded(page, stores, &target, None)
            }
            Err(err) => {
                let message = format!("open article: {err:#}");
                tracing::warn!(url = %self.redact(url), error = %message, "article failed to open");
                if let Some(log) = stores.failures.as_deref_mut() {
                    let record = FailureRecord {
                        article_title: title.to_string(),
                        article_url: url.to_string(),
                        reason: message.clone(),
                        strategy: None,
                        timestamp: Utc::now(),
                    };
                    if let Err(err) = log.append(record) {
                        tracing::warn!(error = %format!("{err:#}"), "failure log write failed");
                    }
                }
                ArticleResult::error(message)
            }
        }
    }

    /// Runs the pipeline on the article page currently loaded in `page`.
    ///
    /// With a `hint` and fast mode on, only that strategy's detector runs
    /// first; anything short of a download falls back to full detection.
    pub fn process_loaded(
        &self,
        page: &mut dyn PageAutomation,
        stores: &mut ArticleStores<'_>,
        target: &ArticleTarget,
        hint: Option<StrategyType>,
    ) -> ArticleResult {
        let board = stores.learning.board_key(&target.url);
        if stores.learning.has_history(&board) {
            tracing::debug!(board = %board, "learned board");
        } else {
            tracing::debug!(board = %board, "new board; trying every strategy");
        }

        let mut attempts = Attempts::default();
        if let Some(strategy) = hint.filter(|_| self.config.fast_mode) {
            let candidates = self.detectors.detect_only(page, strategy);
            if candidates.is_empty() {
                tracing::info!(strategy = %strategy, "fast mode found nothing; full detection");
            } else {
                tracing::info!(strategy = %strategy, count = candidates.len(), "fast mode");
                self.try_candidates(page, stores, target, &board, candidates, &mut attempts);
                if !attempts.downloads.is_empty() {
                    return finish(attempts);
                }
                tracing::info!(strategy = %strategy, "fast mode failed; full detection");
            }
        }

        if self.cancel.load(Ordering::SeqCst) {
            return finish(attempts);
        }
        let candidates = self.ranked(page, stores.learning, &board);
        self.try_candidates(page, stores, target, &board, candidates, &mut attempts);
        finish(attempts)
    }

    fn ranked(
        &self,
        page: &dyn PageAutomation,
        learning: &LearningStore,
        board: &str,
    ) -> Vec<Candidate> {
        let mut candidates = self.detectors.detect_all(page);
        if self.config.strategy_learning {
            candidates = learning.rank(board, candidates);
        } else {
            candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        }
        let found = candidates.len();
        let candidates = dedup_candidates(candidates);
        tracing::info!(found, unique = candidates.len(), "download candidates");
        candidates
    }

    fn cap(&self) -> usize {
        if self.config.download_all_pdfs {
            self.config.max_pdfs_per_article.max(1)
        } else {
            1
        }
    }

    fn try_candidates(
        &self,
        page: &mut dyn PageAutomation,
        stores: &mut ArticleStores<'_>,
        target: &ArticleTarget,
        board: &str,
        candidates: Vec<Candidate>,
        attempts: &mut Attempts,
    ) {
        let total = candidates.len();
        let mut refreshed: Option<Vec<Candidate>> = None;

        for (index, candidate) in candidates.into_iter().enumerate() {
            if attempts.downloads.len() >= self.cap() || self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let key = refresh_key(&candidate);
            if !attempts.tried.insert(key.clone()) {
                continue;
            }
            let strategy = candidate.strategy;
            tracing::debug!(strategy = %strategy, n = index + 1, total, "trying candidate");

            let expected = match filename::extract(&candidate, &target.title, Local::now()) {
                FilenameOutcome::Extracted(name) => name,
                FilenameOutcome::NotAPdf | FilenameOutcome::Ambiguous => {
                    tracing::debug!(strategy = %strategy, "no pdf filename; not counted");
                    continue;
                }
            };

            match self
                .dedup
                .check(&*stores.ledger, &expected, None, &target.url)
            {
                Ok(check) if check.is_duplicate() => {
                    let reason = check.reason.map(|r| r.as_str()).unwrap_or_default();
                    let skip = ScrapeError::DuplicateSkipped {
                        reason: reason.to_string(),
                    };
                    tracing::info!(file = %self.redact(&expected), "{skip}");
                    attempts.skipped.push(SkippedEntry {
                        filename: expected,
                        reason: reason.to_string(),
                        strategy,
                    });
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "duplicate check failed; proceeding");
                }
            }

            let candidate = match self.on_article(page, target, &mut refreshed) {
                Ok(fresh) => fresh
                    .and_then(|list| list.iter().find(|c| refresh_key(c) == key))
                    .cloned()
                    .unwrap_or(candidate),
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "could not return to article");
                    self.record_failure(stores, target, board, strategy, &format!("{err:#}"));
                    attempts.failed_count += 1;
                    continue;
                }
            };

            match self.executor.execute(page, &candidate) {
                Ok(ExecutionResult::Success {
                    filename,
                    filepath,
                    size,
                }) => {
                    let check = match self.dedup.check(
                        &*stores.ledger,
                        &filename,
                        Some(&filepath),
                        &target.url,
                    ) {
                        Ok(check) => check,
                        Err(err) => {
                            tracing::warn!(error = %format!("{err:#}"), "hashing failed");
                            Default::default()
                        }
                    };
                    if let Some(reason) = check.reason {
                        attempts.skipped.push(SkippedEntry {
                            filename,
                            reason: reason.as_str().to_string(),
                            strategy,
                        });
                        self.learn(stores.learning, board, strategy, false);
                        continue;
                    }

                    let sha256 = check.sha256.unwrap_or_default();
                    let record = DownloadRecord {
                        article_title: target.title.clone(),
                        article_url: target.url.clone(),
                        filename: filename.clone(),
                        sha256: sha256.clone(),
                        size,
                        method: strategy,
                        timestamp: Utc::now(),
                    };
                    if let Err(err) = stores.ledger.insert(record) {
                        let err = ScrapeError::Persistence {
                            what: "download ledger",
                            reason: format!("{err:#}"),
                        };
                        tracing::warn!(error = %err, "ledger write failed");
                    }
                    self.learn(stores.learning, board, strategy, true);
                    tracing::info!(file = %self.redact(&filename), bytes = size, strategy = %strategy, "downloaded");
                    attempts.downloads.push(DownloadEntry {
                        filename,
                        size,
                        method: strategy,
                        confidence: candidate.confidence,
                        filepath: filepath.display().to_string(),
                        sha256,
                    });
                }
                Ok(ExecutionResult::Cancelled) => {
                    tracing::info!(strategy = %strategy, "interrupted while waiting for download");
                    break;
                }
                Ok(failed) => {
                    tracing::info!(strategy = %strategy, reason = %failed.reason(), "candidate failed");
                    self.record_failure(stores, target, board, strategy, &failed.reason());
                    attempts.failed_count += 1;
                }
                Err(err) => {
                    tracing::warn!(strategy = %strategy, error = %format!("{err:#}"), "candidate errored");
                    self.record_failure(stores, target, board, strategy, &format!("{err:#}"));
                    attempts.failed_count += 1;
                }
            }
        }
    }

    /// Navigates back when an attempt drifted off the article. Returns the
    /// re-detected candidates whenever the page had to be reloaded.
    fn on_article<'r>(
        &self,
        page: &mut dyn PageAutomation,
        target: &ArticleTarget,
        refreshed: &'r mut Option<Vec<Candidate>>,
    ) -> anyhow::Result<Option<&'r Vec<Candidate>>> {
        if page.current_url()? != target.url {
            tracing::debug!("returning to article page");
            page.navigate(&target.url)?;
            page.wait_stable(self.config.timeouts.page_stable())?;
            *refreshed = Some(self.detectors.detect_all(page));
        }
        Ok(refreshed.as_ref())
    }

    fn learn(&self, learning: &mut LearningStore, board: &str, strategy: StrategyType, ok: bool) {
        if self.config.strategy_learning {
            learning.update(board, strategy, ok);
        }
    }

    fn record_failure(
        &self,
        stores: &mut ArticleStores<'_>,
        target: &ArticleTarget,
        board: &str,
        strategy: StrategyType,
        reason: &str,
    ) {
        self.learn(stores.learning, board, strategy, false);
        if let Some(log) = stores.failures.as_deref_mut() {
            let record = FailureRecord {
                article_title: target.title.clone(),
                article_url: target.url.clone(),
                reason: reason.to_string(),
                strategy: Some(strategy),
                timestamp: Utc::now(),
            };
            if let Err(err) = log.append(record) {
                tracing::warn!(error = %format!("{err:#}"), "failure log write failed");
            }
        }
    }

    fn redact<'a>(&self, value: &'a str) -> Redacted<'a> {
        Redacted::new(value, self.config.privacy_protection)
    }
}

/// Processes one article URL outside a board crawl and prints the result.
pub fn run(args: ArticleArgs) -> anyhow::Result<()> {
    let url = parse_http_url(&args.url)?;
    let config = args.common.resolve()?;
    let paths = StatePaths::new(&config.state_dir);
    std::fs::create_dir_all(paths.root())
        .with_context(|| format!("create state dir: {}", paths.root().display()))?;

    let mut ledger = JsonLedger::open(paths.ledger())?;
    let mut failures = FailureLog::open(paths.failures())?;
    let mut learning = LearningStore::load_or_fresh(paths.learning(), config.board_key);

    let mut page = StaticDriverFactory.launch(&config)?;
    let title = args.title.unwrap_or_else(|| url.to_string());
    let pipeline = ArticlePipeline::new(&config);
    let mut stores = ArticleStores {
        learning: &mut learning,
        ledger: &mut ledger,
        failures: Some(&mut failures),
    };
    let result = pipeline.process_url(page.as_mut(), &mut stores, url.as_str(), &title);
    if config.strategy_learning {
        if let Err(err) = learning.save() {
            tracing::warn!(error = %format!("{err:#}"), "learned strategies not saved");
        }
    }

    let json = serde_json::to_string_pretty(&result).context("serialize article result")?;
    println!("{json}");
    Ok(())
}

/// Identity that survives a page reload: the candidate identifier, with
/// element-only candidates keyed by document position.
fn refresh_key(candidate: &Candidate) -> String {
    match (&candidate.url, &candidate.text, &candidate.element) {
        (None, None, Some(element)) => format!("{}:node:{}", candidate.strategy, element.node),
        _ => format!("{}:{}", candidate.strategy, candidate.identifier()),
    }
}

fn finish(attempts: Attempts) -> ArticleResult {
    let Attempts {
        downloads,
        skipped,
        failed_count,
        ..
    } = attempts;
    let successful_strategy = downloads.first().map(|d| d.method);
    let (status, message) = if !downloads.is_empty() {
        let status = if failed_count == 0 {
            ArticleStatus::Success
        } else {
            ArticleStatus::Partial
        };
        (status, None)
    } else if !skipped.is_empty() {
        (ArticleStatus::AllSkipped, None)
    } else if failed_count == 0 {
        (ArticleStatus::NoPdf, Some(ScrapeError::NoCandidatesFound.to_string()))
    } else {
        (
            ArticleStatus::NoPdf,
            Some(
                ScrapeError::AllCandidatesFailed {
                    attempted: failed_count,
                }
                .to_string(),
            ),
        )
    };
    ArticleResult {
        status,
        downloads,
        skipped,
        failed_count,
        successful_strategy,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::BoardKeyMode;
    use crate::page::StaticHtmlDriver;
    use crate::page::static_driver::Fixture;
    use crate::store::JsonLedger;

    const ARTICLE: &str = "https://gov.example/board/view.do?no=1";

    fn pdf(tag: &str) -> Vec<u8> {
        let mut body = format!("%PDF-1.4 {tag}\n").into_bytes();
        body.extend(std::iter::repeat_n(b'.', 300));
        body
    }

    struct Harness {
        _dir: tempfile::TempDir,
        config: ScraperConfig,
        learning: LearningStore,
        ledger: JsonLedger,
        failures: FailureLog,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = ScraperConfig::default();
            config.download_dir = dir.path().join("downloads");
            config.timeouts.download_wait_ms = 20;
            config.timeouts.poll_interval_ms = 5;
            config.timeouts.new_window_grace_ms = 0;
            config.timeouts.background_open_ms = 0;
            let ledger = JsonLedger::open(dir.path().join("downloads.json")).unwrap();
            let failures = FailureLog::open(dir.path().join("failures.json")).unwrap();
            Self {
                _dir: dir,
                config,
                learning: LearningStore::in_memory(BoardKeyMode::default()),
                ledger,
                failures,
            }
        }

        fn driver(&self, html: &str) -> StaticHtmlDriver {
            StaticHtmlDriver::from_html(ARTICLE, html).with_download_dir(&self.config.download_dir)
        }

        fn run(
            &mut self,
            page: &mut StaticHtmlDriver,
            hint: Option<StrategyType>,
        ) -> ArticleResult {
            let pipeline = ArticlePipeline::new(&self.config);
            let mut stores = ArticleStores {
                learning: &mut self.learning,
                ledger: &mut self.ledger,
                failures: Some(&mut self.failures),
            };
            let target = ArticleTarget {
                title: "Housing notice".to_string(),
                url: ARTICLE.to_string(),
            };
            pipeline.process_loaded(page, &mut stores, &target, hint)
        }
    }

    #[test]
    fn direct_link_downloads_and_learns() {
        let mut h = Harness::new();
        let mut page = h
            .driver(r#"<a href="/files/report.pdf">Download</a>"#)
            .with_fixture(
                "https://gov.example/files/report.pdf",
                Fixture::bytes("application/pdf", pdf("a")),
            );
        let result = h.run(&mut page, None);
        assert_eq!(result.status, ArticleStatus::Success);
        assert_eq!(result.downloads.len(), 1);
        assert_eq!(result.downloads[0].filename, "report.pdf");
        assert_eq!(result.successful_strategy, Some(StrategyType::DirectLink));
        assert_eq!(h.ledger.records().len(), 1);

        let board = h.learning.board_key(ARTICLE);
        let stats = &h.learning.record(&board).unwrap()[&StrategyType::DirectLink];
        assert_eq!((stats.success, stats.fail), (1, 0));
        assert_eq!(stats.score, 1.0);
    }

    #[test]
    fn same_filename_on_next_article_is_skipped_before_download() {
        let mut h = Harness::new();
        let html = r#"<a href="/files/report.pdf">Download</a>"#;
        let mut page = h.driver(html).with_fixture(
            "https://gov.example/files/report.pdf",
            Fixture::bytes("application/pdf", pdf("first")),
        );
        assert_eq!(h.run(&mut page, None).status, ArticleStatus::Success);

        let mut page = h.driver(html).with_fixture(
            "https://gov.example/files/report.pdf",
            Fixture::bytes("application/pdf", pdf("second, different bytes")),
        );
        let result = h.run(&mut page, None);
        assert_eq!(result.status, ArticleStatus::AllSkipped);
        assert_eq!(result.skipped[0].filename, "report.pdf");
        assert_eq!(h.ledger.records().len(), 1);
        let board = h.learning.board_key(ARTICLE);
        assert_eq!(h.learning.record(&board).unwrap()[&StrategyType::DirectLink].fail, 0);
    }

    #[test]
    fn non_pdf_candidates_are_not_counted() {
        let mut h = Harness::new();
        let mut page = h.driver(
            r#"<div class="attach">첨부파일 <a href="/files/plan.pdf.hwp">plan.pdf.hwp</a></div>"#,
        );
        let result = h.run(&mut page, None);
        assert_eq!(result.status, ArticleStatus::NoPdf);
        assert_eq!(result.failed_count, 0);
        assert_eq!(
            result.message.as_deref(),
            Some(ScrapeError::NoCandidatesFound.to_string().as_str())
        );
        assert!(!h.learning.has_history(&h.learning.board_key(ARTICLE)));
    }

    #[test]
    fn interrupt_during_download_wait_is_not_learned() {
        let mut h = Harness::new();
        h.config.timeouts.download_wait_ms = 3_000;
        // An HTML response never produces a file, so the executor keeps polling.
        let mut page = h
            .driver(r#"<a href="/files/late.pdf">late.pdf</a>"#)
            .with_fixture(
                "https://gov.example/files/late.pdf",
                Fixture::html("<p>Preparing download</p>"),
            );
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(150));
            flag.store(true, Ordering::SeqCst);
        });

        let pipeline = ArticlePipeline::with_cancel(&h.config, cancel);
        let mut stores = ArticleStores {
            learning: &mut h.learning,
            ledger: &mut h.ledger,
            failures: Some(&mut h.failures),
        };
        let target = ArticleTarget {
            title: "Housing notice".to_string(),
            url: ARTICLE.to_string(),
        };
        let started = std::time::Instant::now();
        let result = pipeline.process_loaded(&mut page, &mut stores, &target, None);
        interrupter.join().unwrap();

        assert!(started.elapsed() < std::time::Duration::from_millis(2_500));
        assert_eq!(result.status, ArticleStatus::NoPdf);
        assert_eq!(result.failed_count, 0);
        assert!(!h.learning.has_history(&h.learning.board_key(ARTICLE)));
        assert!(h.failures.is_empty());
    }

    #[test]
    fn unreachable_article_yields_error_result() {
        let mut h = Harness::new();
        let mut page = h.driver("<p>listing</p>");
        let pipeline = ArticlePipeline::new(&h.config);
        let mut stores = ArticleStores {
            learning: &mut h.learning,
            ledger: &mut h.ledger,
            failures: Some(&mut h.failures),
        };
        let result = pipeline.process_url(
            &mut page,
            &mut stores,
            "http://127.0.0.1:9/board/view.do?no=7",
            "Closed notice",
        );
        assert_eq!(result.status, ArticleStatus::Error);
        assert!(result.message.as_deref().is_some_and(|m| m.starts_with("open article")));
        assert_eq!(h.failures.len(), 1);
        assert_eq!(h.failures.records()[0].article_title, "Closed notice");
    }

    #[test]
    fn empty_page_reports_no_candidates() {
        let mut h = Harness::new();
        let mut page = h.driver("<p>No attachments.</p>");
        let result = h.run(&mut page, None);
        assert_eq!(result.status, ArticleStatus::NoPdf);
        assert_eq!(
            result.message.as_deref(),
            Some(ScrapeError::NoCandidatesFound.to_string().as_str())
        );
    }

    #[test]
    fn failed_candidate_is_learned_and_logged_then_partial() {
        let mut h = Harness::new();
        let mut page = h
            .driver(
                r#"
                <a href="/files/good.pdf">good.pdf</a>
                <a href="/files/broken.pdf">broken.pdf</a>
                "#,
            )
            .with_fixture(
                "https://gov.example/files/good.pdf",
                Fixture::bytes("application/pdf", pdf("good")),
            )
            .with_fixture(
                "https://gov.example/files/broken.pdf",
                Fixture::bytes("application/pdf", b"not a pdf at all".repeat(20)),
            );
        let result = h.run(&mut page, None);
        assert_eq!(result.status, ArticleStatus::Partial);
        assert_eq!(result.downloads.len(), 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(h.failures.len(), 1);
    }

    #[test]
    fn fast_mode_uses_hinted_strategy_then_falls_back() {
        let mut h = Harness::new();
        let mut page = h
            .driver(r#"<iframe src="/viewer/doc.pdf"></iframe>"#)
            .with_fixture(
                "https://gov.example/viewer/doc.pdf",
                Fixture::bytes("application/pdf", pdf("iframe")),
            );
        let result = h.run(&mut page, Some(StrategyType::DirectLink));
        assert_eq!(result.status, ArticleStatus::Success);
        assert_eq!(result.successful_strategy, Some(StrategyType::EmbeddedObject));
    }

    #[test]
    fn single_pdf_mode_stops_after_first_download() {
        let mut h = Harness::new();
        h.config.download_all_pdfs = false;
        let mut page = h
            .driver(r#"<a href="/files/one.pdf">one.pdf</a><a href="/files/two.pdf">two.pdf</a>"#)
            .with_fixture(
                "https://gov.example/files/one.pdf",
                Fixture::bytes("application/pdf", pdf("one")),
            )
            .with_fixture(
                "https://gov.example/files/two.pdf",
                Fixture::bytes("application/pdf", pdf("two")),
            );
        let result = h.run(&mut page, None);
        assert_eq!(result.downloads.len(), 1);
    }
}
