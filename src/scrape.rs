//! Board scrape orchestration: listing pages, articles, pagination, recovery.

use std::io::{BufRead as _, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context as _;
use chrono::Utc;
use serde::Serialize;

use crate::article::{ArticlePipeline, ArticleStores};
use crate::cli::{ScrapeArgs, parse_http_url};
use crate::config::ScraperConfig;
use crate::error::is_navigation;
use crate::formats::{ArticleResult, ArticleStatus, Checkpoint, FailureRecord};
use crate::learning::LearningStore;
use crate::links::{ArticleLink, LinkClassifier};
use crate::logging::Redacted;
use crate::maintenance;
use crate::page::{DriverFactory, PageAutomation, StaticDriverFactory};
use crate::pagination::navigate_to_next_page;
use crate::store::{
    CheckpointStore, DownloadLedger, FailureLog, JsonLedger, ProcessedStore, StatePaths,
};
use crate::strategy::StrategyType;

/// Asks the operator whether to keep going after something looks wrong.
pub trait OperatorPrompt {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Reads `y`/`n` from stdin. End of input means no.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> bool {
        eprint!("{question} [y/n]: ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        }
    }
}

/// Always continues.
#[derive(Debug, Default)]
pub struct Unattended;

impl OperatorPrompt for Unattended {
    fn confirm(&mut self, question: &str) -> bool {
        tracing::info!(question, "unattended; continuing");
        true
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub board_url: String,
    pub resume: bool,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub pages: u32,
    pub articles_seen: u64,
    pub articles_processed: u64,
    pub downloaded: u64,
    pub skipped_duplicates: u64,
    pub no_pdf: u64,
    pub failed: u64,
    pub skipped_processed: u64,
    pub interrupted: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default)]
struct PageSummary {
    downloaded: u64,
    skipped: u64,
    no_pdf: u64,
    failed: u64,
}

impl PageSummary {
    fn tally(&mut self, result: &ArticleResult) {
        self.downloaded += result.downloads.len() as u64;
        self.skipped += result.skipped.len() as u64;
        match result.status {
            ArticleStatus::NoPdf => self.no_pdf += 1,
            ArticleStatus::Error => self.failed += 1,
            _ => {}
        }
    }

    fn add_to(&self, run: &mut RunSummary) {
        run.downloaded += self.downloaded;
        run.skipped_duplicates += self.skipped;
        run.no_pdf += self.no_pdf;
        run.failed += self.failed;
    }
}

/// How the crawl loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Completed,
    Stopped,
    Interrupted,
}

struct Stores {
    ledger: JsonLedger,
    failures: FailureLog,
    learning: LearningStore,
    checkpoint: CheckpointStore,
    processed: Option<ProcessedStore>,
}

/// Where the crawl currently is on the board.
struct Position {
    board_url: String,
    listing_url: String,
    page: u32,
    start_index: usize,
}

/// Counters that outlive a single listing page.
#[derive(Debug, Default)]
struct CrawlState {
    first_page: u32,
    consecutive_failures: u32,
    processed_since_restart: u32,
    /// Failed attempts at the current listing page.
    page_attempts: u32,
    previous_links: Vec<String>,
    /// The listing was reached by paging rather than by a reload.
    after_paging: bool,
}

pub struct Scraper<'a> {
    config: ScraperConfig,
    factory: &'a dyn DriverFactory,
    prompt: Box<dyn OperatorPrompt + 'a>,
    cancel: Arc<AtomicBool>,
    paths: StatePaths,
}

impl<'a> Scraper<'a> {
    pub fn new(
        config: ScraperConfig,
        factory: &'a dyn DriverFactory,
        prompt: Box<dyn OperatorPrompt + 'a>,
    ) -> Self {
        let paths = StatePaths::new(&config.state_dir);
        Self {
            config,
            factory,
            prompt,
            cancel: Arc::new(AtomicBool::new(false)),
            paths,
        }
    }

    /// Setting `flag` stops the run after the current article.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn redact<'v>(&self, value: &'v str) -> Redacted<'v> {
        Redacted::new(value, self.config.privacy_protection)
    }

    pub fn run(&mut self, options: &ScrapeOptions) -> anyhow::Result<RunSummary> {
        let started = Instant::now();
        let mut stores = self.open_stores()?;
        let mut position = self.start_position(&stores, options);
        let mut summary = RunSummary::default();

        let finish = match self.factory.launch(&self.config) {
            Ok(mut driver) => {
                match self.crawl(&mut driver, &mut stores, &mut position, options, &mut summary) {
                    Ok(finish) => finish,
                    Err(err) => {
                        tracing::error!(error = %format!("{err:#}"), "scrape aborted");
                        Finish::Stopped
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "automation driver failed to start");
                Finish::Stopped
            }
        };

        self.flush(&mut stores);
        match finish {
            Finish::Completed => {
                if let Err(err) = stores.checkpoint.clear() {
                    tracing::warn!(error = %format!("{err:#}"), "checkpoint clear failed");
                }
            }
            Finish::Interrupted => {
                summary.interrupted = true;
                tracing::info!("interrupted; checkpoint kept for --resume");
            }
            Finish::Stopped => tracing::info!("stopped; checkpoint kept for --resume"),
        }
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            pages = summary.pages,
            processed = summary.articles_processed,
            downloaded = summary.downloaded,
            skipped = summary.skipped_duplicates,
            no_pdf = summary.no_pdf,
            failed = summary.failed,
            skipped_processed = summary.skipped_processed,
            elapsed_secs = format!("{:.1}", summary.elapsed_secs),
            "scrape finished"
        );
        Ok(summary)
    }

    fn open_stores(&self) -> anyhow::Result<Stores> {
        std::fs::create_dir_all(self.paths.root())
            .with_context(|| format!("create state dir: {}", self.paths.root().display()))?;
        let ledger = JsonLedger::open(self.paths.ledger())?;
        let failures = FailureLog::open(self.paths.failures())?;
        let learning = LearningStore::load_or_fresh(self.paths.learning(), self.config.board_key);
        let checkpoint = CheckpointStore::new(self.paths.checkpoint());
        let processed = if self.config.track_processed_articles {
            let mut store =
                ProcessedStore::open(self.paths.processed(), self.config.processed_expire_days)?;
            let removed = store.cleanup_expired(Utc::now());
            if removed > 0 {
                tracing::info!(removed, "expired processed markers dropped");
            }
            Some(store)
        } else {
            None
        };
        Ok(Stores {
            ledger,
            failures,
            learning,
            checkpoint,
            processed,
        })
    }

    fn start_position(&self, stores: &Stores, options: &ScrapeOptions) -> Position {
        let fresh = Position {
            board_url: options.board_url.clone(),
            listing_url: options.board_url.clone(),
            page: 1,
            start_index: 0,
        };
        if !options.resume {
            return fresh;
        }
        match stores.checkpoint.load() {
            Ok(Some(cp)) if cp.board_url == options.board_url => {
                tracing::info!(
                    page = cp.current_page,
                    article = cp.current_article_index + 2,
                    "resuming from checkpoint"
                );
                Position {
                    board_url: cp.board_url,
                    listing_url: cp.listing_url,
                    page: cp.current_page,
                    start_index: cp.current_article_index + 1,
                }
            }
            Ok(Some(cp)) => {
                tracing::warn!(checkpoint_board = %cp.board_url, "checkpoint is for another board; starting over");
                fresh
            }
            Ok(None) => {
                tracing::info!("no checkpoint; starting from page 1");
                fresh
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "checkpoint unreadable; starting over");
                fresh
            }
        }
    }

    /// Persists learning and processed markers. Failures are logged only.
    fn flush(&self, stores: &mut Stores) {
        if self.config.strategy_learning {
            if let Err(err) = stores.learning.save() {
                tracing::warn!(error = %format!("{err:#}"), "learned strategies not saved");
            }
        }
        if let Some(processed) = stores.processed.as_mut() {
            if let Err(err) = processed.save() {
                tracing::warn!(error = %format!("{err:#}"), "processed markers not saved");
            }
        }
    }

    fn restart(&self, driver: &mut Box<dyn PageAutomation>) -> anyhow::Result<()> {
        tracing::info!("restarting automation driver");
        *driver = self.factory.launch(&self.config).context("relaunch driver")?;
        Ok(())
    }

    fn load_listing(
        &self,
        driver: &mut Box<dyn PageAutomation>,
        listing_url: &str,
    ) -> anyhow::Result<()> {
        let mut attempt = 0;
        loop {
            let loaded = driver
                .navigate(listing_url)
                .and_then(|()| driver.wait_stable(self.config.timeouts.page_load()));
            match loaded {
                Ok(_) => return Ok(()),
                Err(err) if is_navigation(&err) && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %format!("{err:#}"), attempt, "listing load failed; retrying");
                    self.restart(driver)?;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("load listing: {listing_url}"));
                }
            }
        }
    }

    /// Goes back to the listing, reloading once more if the page does not
    /// look like it.
    fn return_to_listing(
        &self,
        driver: &mut Box<dyn PageAutomation>,
        listing_url: &str,
    ) -> anyhow::Result<()> {
        if let Err(err) = self.load_listing(driver, listing_url) {
            tracing::warn!(error = %format!("{err:#}"), "return to listing failed; restarting");
            self.restart(driver)?;
            return self.load_listing(driver, listing_url);
        }
        let current = driver.current_url()?;
        if !looks_like_listing(&current, listing_url) {
            tracing::warn!(current = %self.redact(&current), "not back on the listing; reloading");
            self.load_listing(driver, listing_url)?;
        }
        Ok(())
    }

    fn crawl(
        &mut self,
        driver: &mut Box<dyn PageAutomation>,
        stores: &mut Stores,
        position: &mut Position,
        options: &ScrapeOptions,
        summary: &mut RunSummary,
    ) -> anyhow::Result<Finish> {
        let classifier = LinkClassifier::new(&self.config);
        let pipeline = ArticlePipeline::with_cancel(&self.config, Arc::clone(&self.cancel));
        let mut state = CrawlState {
            first_page: position.page,
            ..CrawlState::default()
        };

        loop {
            if self.cancelled() {
                return Ok(Finish::Interrupted);
            }
            let mut page_summary = PageSummary::default();
            let outcome = self.crawl_page(
                driver,
                stores,
                position,
                &classifier,
                &pipeline,
                &mut state,
                &mut page_summary,
                summary,
            );
            page_summary.add_to(summary);

            match outcome {
                Ok(Some(finish)) => return Ok(finish),
                Ok(None) => {
                    state.page_attempts = 0;
                }
                Err(err) => {
                    state.page_attempts += 1;
                    tracing::error!(
                        page = position.page,
                        error = %format!("{err:#}"),
                        attempt = state.page_attempts,
                        "listing page failed; restarting"
                    );
                    self.log_failure(stores, "", &position.listing_url, &format!("{err:#}"));
                    if !self.keep_going_after_failure(&mut state) {
                        self.save_position(stores, position);
                        return Ok(Finish::Stopped);
                    }
                    if state.page_attempts > self.config.max_retries {
                        tracing::error!(page = position.page, "listing page keeps failing; stopping");
                        self.save_position(stores, position);
                        return Ok(Finish::Stopped);
                    }
                    self.restart(driver)?;
                    state.after_paging = false;
                    continue;
                }
            }

            tracing::info!(
                page = position.page,
                downloaded = page_summary.downloaded,
                skipped = page_summary.skipped,
                no_pdf = page_summary.no_pdf,
                failed = page_summary.failed,
                total_downloaded = stores.ledger.records().len(),
                "page finished"
            );
            summary.pages += 1;
            self.flush(stores);

            if options.max_pages.is_some_and(|max| summary.pages >= max) {
                tracing::info!(pages = summary.pages, "page limit reached");
                return Ok(Finish::Completed);
            }
            match navigate_to_next_page(driver.as_mut(), position.page, self.config.timeouts.page_stable()) {
                Ok(Some(next)) => {
                    position.page = next;
                    position.start_index = 0;
                    position.listing_url = match driver.current_url() {
                        Ok(url) => url,
                        Err(err) => {
                            tracing::warn!(error = %format!("{err:#}"), "paged listing url unreadable; stopping");
                            return Ok(Finish::Stopped);
                        }
                    };
                    state.after_paging = true;
                }
                Ok(None) => {
                    tracing::info!("last page reached");
                    return Ok(Finish::Completed);
                }
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "paging failed; stopping");
                    return Ok(Finish::Completed);
                }
            }
        }
    }

    /// Works through the articles of the current listing page, starting at
    /// `position.start_index`. `Ok(None)` means the page is done.
    #[allow(clippy::too_many_arguments)]
    fn crawl_page(
        &mut self,
        driver: &mut Box<dyn PageAutomation>,
        stores: &mut Stores,
        position: &mut Position,
        classifier: &LinkClassifier,
        pipeline: &ArticlePipeline,
        state: &mut CrawlState,
        page_summary: &mut PageSummary,
        summary: &mut RunSummary,
    ) -> anyhow::Result<Option<Finish>> {
        tracing::info!(page = position.page, url = %position.listing_url, "processing listing page");
        self.load_listing(driver, &position.listing_url)?;

        let links = classifier.extract(driver.as_ref())?;
        if links.is_empty() {
            tracing::warn!(page = position.page, "no article links found");
            match maintenance::analyze_page(driver.as_ref(), &self.config) {
                Ok(analysis) => tracing::info!(?analysis, "page structure"),
                Err(err) => tracing::debug!(error = %format!("{err:#}"), "page analysis failed"),
            }
            if position.page == state.first_page
                && !self.prompt.confirm("No article links found on this page. Continue?")
            {
                return Ok(Some(Finish::Stopped));
            }
        }
        let keys: Vec<String> = links.iter().map(link_key).collect();
        if state.after_paging && !links.is_empty() && keys == state.previous_links {
            tracing::warn!(page = position.page, "listing did not change after paging; stopping");
            return Ok(Some(Finish::Completed));
        }
        state.previous_links = keys;

        let total = links.len();
        tracing::info!(page = position.page, articles = total, "article links found");
        let mut hint: Option<StrategyType> = None;

        while position.start_index < total {
            let index = position.start_index;
            if self.cancelled() {
                return Ok(Some(Finish::Interrupted));
            }

            let fresh = classifier.extract(driver.as_ref())?;
            let Some(link) = fresh.into_iter().nth(index) else {
                tracing::warn!(index, "article link disappeared from the listing");
                break;
            };
            summary.articles_seen += 1;
            let mode = if hint.is_some() { "fast" } else { "full" };
            tracing::info!(
                page = position.page,
                n = index + 1,
                total,
                title = %self.redact(&link.title),
                mode,
                "article"
            );

            if self.already_processed(stores, &link) {
                summary.skipped_processed += 1;
                self.save_checkpoint(stores, position, index);
                position.start_index = index + 1;
                continue;
            }

            let title = link.title.clone();
            let link_url = link.url.clone();
            match self.process_with_retry(driver, stores, pipeline, position, index, link, hint) {
                Ok((url, result)) => {
                    state.consecutive_failures = 0;
                    summary.articles_processed += 1;
                    page_summary.tally(&result);
                    hint = result.successful_strategy;
                    self.after_article(stores, &url, &result);
                }
                Err(err) => {
                    let result = ArticleResult::error(format!("{err:#}"));
                    summary.articles_processed += 1;
                    page_summary.tally(&result);
                    hint = None;
                    tracing::error!(
                        error = %format!("{err:#}"),
                        consecutive_failures = state.consecutive_failures + 1,
                        "article failed"
                    );
                    let url = link_url.as_deref().unwrap_or(&position.listing_url);
                    let reason = result.message.as_deref().unwrap_or(result.status.as_str());
                    self.log_failure(stores, &title, url, reason);
                    if !self.keep_going_after_failure(state) {
                        self.save_checkpoint(stores, position, index);
                        return Ok(Some(Finish::Stopped));
                    }
                }
            }

            self.save_checkpoint(stores, position, index);
            position.start_index = index + 1;
            self.return_to_listing(driver, &position.listing_url)?;

            state.processed_since_restart += 1;
            if self.config.browser_restart_interval > 0
                && state.processed_since_restart % self.config.browser_restart_interval == 0
            {
                self.restart(driver)?;
                self.load_listing(driver, &position.listing_url)?;
            }
        }
        Ok(None)
    }

    /// Counts one more failure in a row. Past the threshold the operator
    /// decides; `false` means stop.
    fn keep_going_after_failure(&mut self, state: &mut CrawlState) -> bool {
        state.consecutive_failures += 1;
        if state.consecutive_failures < self.config.max_consecutive_failures {
            return true;
        }
        let question = format!(
            "{} failures in a row; the board layout may have changed. Continue?",
            state.consecutive_failures
        );
        if self.prompt.confirm(&question) {
            state.consecutive_failures = 0;
            true
        } else {
            false
        }
    }

    /// Processes one article. Navigation failures restart the driver and retry
    /// the same index up to `max_retries` times.
    #[allow(clippy::too_many_arguments)]
    fn process_with_retry(
        &self,
        driver: &mut Box<dyn PageAutomation>,
        stores: &mut Stores,
        pipeline: &ArticlePipeline,
        position: &Position,
        index: usize,
        link: ArticleLink,
        hint: Option<StrategyType>,
    ) -> anyhow::Result<(String, ArticleResult)> {
        let mut link = link;
        let mut attempt = 0;
        loop {
            let mut article_stores = ArticleStores {
                learning: &mut stores.learning,
                ledger: &mut stores.ledger,
                failures: Some(&mut stores.failures),
            };
            match pipeline.process_link(driver.as_mut(), &mut article_stores, &link, hint) {
                Ok((target, result)) => {
                    if matches!(result.status, ArticleStatus::NoPdf | ArticleStatus::Error) {
                        let reason = result.message.as_deref().unwrap_or(result.status.as_str());
                        self.log_failure(stores, &target.title, &target.url, reason);
                    }
                    return Ok((target.url, result));
                }
                Err(err) if is_navigation(&err) && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %format!("{err:#}"), attempt, "navigation failed; restarting and retrying");
                    self.restart(driver)?;
                    self.load_listing(driver, &position.listing_url)?;
                    let classifier = LinkClassifier::new(&self.config);
                    link = classifier
                        .extract(driver.as_ref())?
                        .into_iter()
                        .nth(index)
                        .ok_or_else(|| anyhow::anyhow!("article {} missing after restart", index + 1))?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn already_processed(&self, stores: &mut Stores, link: &ArticleLink) -> bool {
        if !self.config.skip_processed_articles {
            return false;
        }
        match (stores.processed.as_mut(), link.url.as_deref()) {
            (Some(processed), Some(url)) => {
                let hit = processed.check(url, Utc::now());
                if hit {
                    tracing::info!(url = %self.redact(url), "already processed; skipped");
                }
                hit
            }
            _ => false,
        }
    }

    fn after_article(&self, stores: &mut Stores, url: &str, result: &ArticleResult) {
        for download in &result.downloads {
            tracing::info!(file = %self.redact(&download.filename), bytes = download.size, "saved");
        }
        if result.status == ArticleStatus::Partial {
            tracing::warn!(failed = result.failed_count, "some pdfs failed");
        }
        if let Some(processed) = stores.processed.as_mut() {
            processed.mark(url, result.status, result.downloads.len(), Utc::now());
        }
    }

    fn log_failure(&self, stores: &mut Stores, title: &str, url: &str, reason: &str) {
        let record = FailureRecord {
            article_title: title.to_string(),
            article_url: url.to_string(),
            reason: reason.to_string(),
            strategy: None,
            timestamp: Utc::now(),
        };
        if let Err(err) = stores.failures.append(record) {
            tracing::warn!(error = %format!("{err:#}"), "failure log write failed");
        }
    }

    /// Checkpoints the last article finished before `position.start_index`.
    fn save_position(&self, stores: &Stores, position: &Position) {
        if let Some(done) = position.start_index.checked_sub(1) {
            self.save_checkpoint(stores, position, done);
        }
    }

    fn save_checkpoint(&self, stores: &Stores, position: &Position, index: usize) {
        let checkpoint = Checkpoint {
            board_url: position.board_url.clone(),
            listing_url: position.listing_url.clone(),
            current_page: position.page,
            current_article_index: index,
            total_downloaded: stores.ledger.records().len() as u64,
            last_updated: Utc::now(),
        };
        if let Err(err) = stores.checkpoint.save(&checkpoint) {
            tracing::warn!(error = %format!("{err:#}"), "checkpoint not saved");
        }
    }
}

/// Runs a board scrape from the command line and prints the summary as JSON.
pub fn run(args: ScrapeArgs, cancel: Arc<AtomicBool>) -> anyhow::Result<RunSummary> {
    let url = parse_http_url(&args.url)?;
    let mut config = args.common.resolve()?;
    if args.unattended {
        config.unattended = true;
    }
    if args.no_fast_mode {
        config.fast_mode = false;
    }
    std::fs::create_dir_all(&config.download_dir)
        .with_context(|| format!("create download dir: {}", config.download_dir.display()))?;

    let prompt: Box<dyn OperatorPrompt> = if config.unattended {
        Box::new(Unattended)
    } else {
        Box::new(StdinPrompt)
    };
    let options = ScrapeOptions {
        board_url: url.to_string(),
        resume: args.resume,
        max_pages: args.max_pages,
    };
    let factory = StaticDriverFactory;
    let summary = Scraper::new(config, &factory, prompt)
        .with_cancel(cancel)
        .run(&options)?;

    let json = serde_json::to_string_pretty(&summary).context("serialize run summary")?;
    println!("{json}");
    Ok(summary)
}

fn link_key(link: &ArticleLink) -> String {
    match (&link.url, link.is_javascript) {
        (Some(url), false) => url.clone(),
        _ => link.title.clone(),
    }
}

/// Same scheme, host and path as the listing, or a URL that reads like one.
fn looks_like_listing(current: &str, listing: &str) -> bool {
    let same_path = match (url::Url::parse(current), url::Url::parse(listing)) {
        (Ok(a), Ok(b)) => a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.path() == b.path(),
        _ => current == listing,
    };
    let lower = current.to_lowercase();
    same_path || lower.contains("list") || lower.contains("board")
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::page::StaticHtmlDriver;
    use crate::page::static_driver::Fixture;

    const LISTING: &str = "https://gov.example/board/list.do";

    fn pdf(tag: &str) -> Vec<u8> {
        let mut body = format!("%PDF-1.7 {tag}\n").into_bytes();
        body.extend(std::iter::repeat_n(b'#', 256));
        body
    }

    fn row(no: u32, title: &str) -> String {
        format!(r#"<tr><td>{no}</td><td><a href="view.do?no={no}">{title}</a></td><td>2024-03-0{no}</td></tr>"#)
    }

    /// Serves a two-page board from fixtures. Page 1 links the articles in
    /// `first_page` order, page 2 links article 1.
    struct BoardFactory {
        launches: Cell<u32>,
        first_page: Vec<u32>,
    }

    impl BoardFactory {
        fn new() -> Self {
            Self::with_first_page(vec![3, 2])
        }

        fn with_first_page(first_page: Vec<u32>) -> Self {
            Self {
                launches: Cell::new(0),
                first_page,
            }
        }
    }

    impl DriverFactory for BoardFactory {
        fn launch(&self, config: &ScraperConfig) -> anyhow::Result<Box<dyn PageAutomation>> {
            self.launches.set(self.launches.get() + 1);
            let seasons = ["Spring", "Summer", "Autumn", "Winter"];
            let rows: String = self
                .first_page
                .iter()
                .map(|&no| {
                    let season = seasons[(no as usize - 1) % seasons.len()];
                    row(no, &format!("{season} rental housing notice {no}"))
                })
                .collect();
            let page_one = format!(
                r#"<table>{rows}</table><div class="paging"><strong>1</strong><a href="list.do?page=2">2</a></div>"#,
            );
            let page_two = format!(
                r#"<table>{}</table><div class="paging"><a href="list.do?page=1">1</a><strong>2</strong></div>"#,
                row(1, "Spring rental housing notice"),
            );
            let mut driver = StaticHtmlDriver::from_html("about:blank", "")
                .with_download_dir(&config.download_dir)
                .with_fixture(LISTING, Fixture::html(page_one.clone()))
                .with_fixture(&format!("{LISTING}?page=1"), Fixture::html(page_one))
                .with_fixture(&format!("{LISTING}?page=2"), Fixture::html(page_two));
            let last = self.first_page.iter().copied().max().unwrap_or(1).max(1);
            for no in 1..=last {
                let article = format!(
                    r#"<div class="file">첨부파일 <a href="/files/notice{no}.pdf">notice{no}.pdf</a></div>"#
                );
                driver = driver
                    .with_fixture(
                        &format!("https://gov.example/board/view.do?no={no}"),
                        Fixture::html(article),
                    )
                    .with_fixture(
                        &format!("https://gov.example/files/notice{no}.pdf"),
                        Fixture::bytes("application/pdf", pdf(&no.to_string())),
                    );
            }
            Ok(Box::new(driver))
        }
    }

    struct CountingPrompt<'c> {
        asked: &'c Cell<u32>,
        answer: bool,
    }

    impl OperatorPrompt for CountingPrompt<'_> {
        fn confirm(&mut self, _question: &str) -> bool {
            self.asked.set(self.asked.get() + 1);
            self.answer
        }
    }

    fn config(dir: &std::path::Path) -> ScraperConfig {
        let mut config = ScraperConfig::default();
        config.download_dir = dir.join("downloads");
        config.state_dir = dir.join("state");
        config.timeouts.download_wait_ms = 20;
        config.timeouts.poll_interval_ms = 5;
        config.timeouts.new_window_grace_ms = 0;
        config.timeouts.background_open_ms = 0;
        config
    }

    fn options() -> ScrapeOptions {
        ScrapeOptions {
            board_url: LISTING.to_string(),
            resume: false,
            max_pages: None,
        }
    }

    #[test]
    fn scrapes_every_page_and_clears_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let factory = BoardFactory::new();
        let mut scraper = Scraper::new(config(dir.path()), &factory, Box::new(Unattended));
        let summary = scraper.run(&options()).unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.articles_processed, 3);
        assert_eq!(summary.downloaded, 3);
        assert!(!summary.interrupted);
        assert_eq!(factory.launches.get(), 1);
        for no in 1..=3 {
            assert!(dir.path().join(format!("downloads/notice{no}.pdf")).exists());
        }
        let paths = StatePaths::new(dir.path().join("state"));
        assert!(!paths.checkpoint().exists());
        assert!(paths.learning().exists());
        assert_eq!(JsonLedger::open(paths.ledger()).unwrap().records().len(), 3);
    }

    #[test]
    fn second_run_skips_everything_as_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let factory = BoardFactory::new();
        Scraper::new(config(dir.path()), &factory, Box::new(Unattended))
            .run(&options())
            .unwrap();
        let summary = Scraper::new(config(dir.path()), &factory, Box::new(Unattended))
            .run(&options())
            .unwrap();
        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.skipped_duplicates, 3);
    }

    #[test]
    fn processed_markers_skip_articles_on_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let factory = BoardFactory::new();
        let mut cfg = config(dir.path());
        cfg.track_processed_articles = true;
        cfg.skip_processed_articles = true;
        let first = Scraper::new(cfg.clone(), &factory, Box::new(Unattended))
            .run(&options())
            .unwrap();
        assert_eq!(first.downloaded, 3);
        assert_eq!(first.skipped_processed, 0);

        let second = Scraper::new(cfg, &factory, Box::new(Unattended))
            .run(&options())
            .unwrap();
        assert_eq!(second.skipped_processed, 3);
        assert_eq!(second.articles_processed, 0);
        assert_eq!(second.skipped_duplicates, 0);
        assert_eq!(second.pages, 2);
    }

    #[test]
    fn cancellation_keeps_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let factory = BoardFactory::new();
        let flag = Arc::new(AtomicBool::new(true));
        let summary = Scraper::new(config(dir.path()), &factory, Box::new(Unattended))
            .with_cancel(flag)
            .run(&options())
            .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.articles_processed, 0);
    }

    #[test]
    fn page_limit_and_resume_continue_where_left_off() {
        let dir = tempfile::tempdir().unwrap();
        let factory = BoardFactory::new();
        let mut limited = options();
        limited.max_pages = Some(1);
        let first = Scraper::new(config(dir.path()), &factory, Box::new(Unattended))
            .run(&limited)
            .unwrap();
        assert_eq!(first.downloaded, 2);

        let paths = StatePaths::new(dir.path().join("state"));
        let checkpoint = CheckpointStore::new(paths.checkpoint());
        // A page limit is a clean finish.
        assert!(checkpoint.load().unwrap().is_none());

        checkpoint
            .save(&Checkpoint {
                board_url: LISTING.to_string(),
                listing_url: format!("{LISTING}?page=2"),
                current_page: 2,
                current_article_index: 0,
                total_downloaded: 2,
                last_updated: Utc::now(),
            })
            .unwrap();
        let mut resume = options();
        resume.resume = true;
        let second = Scraper::new(config(dir.path()), &factory, Box::new(Unattended))
            .run(&resume)
            .unwrap();
        // Index 0 on page 2 was already done.
        assert_eq!(second.articles_seen, 0);
        assert_eq!(second.pages, 1);
    }

    #[test]
    fn consecutive_failures_ask_the_operator() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.max_consecutive_failures = 2;
        cfg.max_retries = 0;
        let factory = FlakyBoard::failing_articles(BoardFactory::new());
        let asked = Cell::new(0);
        let prompt = CountingPrompt {
            asked: &asked,
            answer: false,
        };
        let summary = Scraper::new(cfg, &factory, Box::new(prompt))
            .run(&options())
            .unwrap();
        assert_eq!(asked.get(), 1);
        assert_eq!(summary.failed, 2);
        let paths = StatePaths::new(dir.path().join("state"));
        assert!(paths.checkpoint().exists());
        assert!(FailureLog::open(paths.failures()).unwrap().len() >= 2);
    }

    #[test]
    fn five_failures_in_a_row_stop_when_declined() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        assert_eq!(cfg.max_consecutive_failures, 5);
        let factory = FlakyBoard::failing_articles(BoardFactory::with_first_page(
            (2..=8).rev().collect(),
        ));
        let asked = Cell::new(0);
        let prompt = CountingPrompt {
            asked: &asked,
            answer: false,
        };
        let summary = Scraper::new(cfg, &factory, Box::new(prompt))
            .run(&options())
            .unwrap();

        assert_eq!(asked.get(), 1);
        assert_eq!(summary.articles_processed, 5);
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.downloaded, 0);
        let paths = StatePaths::new(dir.path().join("state"));
        let checkpoint = CheckpointStore::new(paths.checkpoint()).load().unwrap().unwrap();
        assert_eq!(checkpoint.current_page, 1);
        assert_eq!(checkpoint.current_article_index, 4);
        let failures = FailureLog::open(paths.failures()).unwrap();
        assert_eq!(failures.len(), 5);
        assert!(failures.records().iter().all(|r| r.article_url.contains("view.do")));
    }

    #[test]
    fn five_failures_in_a_row_continue_when_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FlakyBoard::failing_articles(BoardFactory::with_first_page(
            (2..=8).rev().collect(),
        ));
        let asked = Cell::new(0);
        let prompt = CountingPrompt {
            asked: &asked,
            answer: true,
        };
        let summary = Scraper::new(config(dir.path()), &factory, Box::new(prompt))
            .run(&options())
            .unwrap();

        // Seven failures on page 1 and one on page 2; the counter resets
        // after the operator's answer.
        assert_eq!(asked.get(), 1);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.failed, 8);
        let paths = StatePaths::new(dir.path().join("state"));
        assert!(!paths.checkpoint().exists());
    }

    #[test]
    fn listing_failure_restarts_and_keeps_the_tally() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        // The return to the listing after the first article fails twice,
        // once more than the in-place reload can absorb.
        let factory = FlakyBoard::failing_listing_loads(BoardFactory::new(), &[2, 3]);
        let asked = Cell::new(0);
        let prompt = CountingPrompt {
            asked: &asked,
            answer: false,
        };
        let summary = Scraper::new(cfg, &factory, Box::new(prompt))
            .run(&options())
            .unwrap();

        assert_eq!(asked.get(), 0);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.articles_processed, 3);
        assert_eq!(summary.downloaded, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(factory.board.launches.get(), 3);
        let paths = StatePaths::new(dir.path().join("state"));
        assert!(!paths.checkpoint().exists());
        let failures = FailureLog::open(paths.failures()).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.records()[0].article_url, LISTING);
    }

    #[test]
    fn listing_that_never_loads_stops_with_its_tally() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.max_retries = 1;
        let factory = FlakyBoard::failing_listing_loads(BoardFactory::new(), &[2, 3, 4]);
        let summary = Scraper::new(cfg, &factory, Box::new(Unattended))
            .run(&options())
            .unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.pages, 0);
        let paths = StatePaths::new(dir.path().join("state"));
        let checkpoint = CheckpointStore::new(paths.checkpoint()).load().unwrap().unwrap();
        assert_eq!(checkpoint.current_article_index, 0);
    }

    /// Board whose article pages or listing loads fail on demand.
    struct FlakyBoard {
        board: BoardFactory,
        fail_articles: bool,
        fail_listing_loads: Vec<u32>,
        listing_loads: Rc<Cell<u32>>,
    }

    impl FlakyBoard {
        fn failing_articles(board: BoardFactory) -> Self {
            Self {
                board,
                fail_articles: true,
                fail_listing_loads: Vec::new(),
                listing_loads: Rc::default(),
            }
        }

        /// Fails the listing navigations with these 1-based ordinals,
        /// counted across driver restarts.
        fn failing_listing_loads(board: BoardFactory, loads: &[u32]) -> Self {
            Self {
                board,
                fail_articles: false,
                fail_listing_loads: loads.to_vec(),
                listing_loads: Rc::default(),
            }
        }
    }

    impl DriverFactory for FlakyBoard {
        fn launch(&self, config: &ScraperConfig) -> anyhow::Result<Box<dyn PageAutomation>> {
            let inner = self.board.launch(config)?;
            Ok(Box::new(FlakyPage {
                inner,
                fail_articles: self.fail_articles,
                fail_listing_loads: self.fail_listing_loads.clone(),
                listing_loads: Rc::clone(&self.listing_loads),
            }))
        }
    }

    struct FlakyPage {
        inner: Box<dyn PageAutomation>,
        fail_articles: bool,
        fail_listing_loads: Vec<u32>,
        listing_loads: Rc<Cell<u32>>,
    }

    impl PageAutomation for FlakyPage {
        fn find(&self, query: &crate::page::Query) -> anyhow::Result<Vec<crate::page::ElementHandle>> {
            self.inner.find(query)
        }
        fn attr(&self, element: &crate::page::ElementHandle, name: &str) -> anyhow::Result<Option<String>> {
            self.inner.attr(element, name)
        }
        fn text(&self, element: &crate::page::ElementHandle) -> anyhow::Result<String> {
            self.inner.text(element)
        }
        fn own_text(&self, element: &crate::page::ElementHandle) -> anyhow::Result<String> {
            self.inner.own_text(element)
        }
        fn tag(&self, element: &crate::page::ElementHandle) -> anyhow::Result<String> {
            self.inner.tag(element)
        }
        fn parent(&self, element: &crate::page::ElementHandle) -> anyhow::Result<Option<crate::page::ElementHandle>> {
            self.inner.parent(element)
        }
        fn children(&self, element: &crate::page::ElementHandle) -> anyhow::Result<Vec<crate::page::ElementHandle>> {
            self.inner.children(element)
        }
        fn is_interactable(&self, element: &crate::page::ElementHandle) -> anyhow::Result<bool> {
            self.inner.is_interactable(element)
        }
        fn offset_top(&self, element: &crate::page::ElementHandle) -> anyhow::Result<Option<f64>> {
            self.inner.offset_top(element)
        }
        fn click(&mut self, element: &crate::page::ElementHandle) -> anyhow::Result<()> {
            self.inner.click(element)
        }
        fn force_click(&mut self, element: &crate::page::ElementHandle) -> anyhow::Result<()> {
            self.inner.force_click(element)
        }
        fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
            if self.fail_articles && url.contains("view.do") {
                anyhow::bail!("article page crashed");
            }
            if url.contains("list.do") {
                let n = self.listing_loads.get() + 1;
                self.listing_loads.set(n);
                if self.fail_listing_loads.contains(&n) {
                    anyhow::bail!("listing page crashed");
                }
            }
            self.inner.navigate(url)
        }
        fn current_url(&self) -> anyhow::Result<String> {
            self.inner.current_url()
        }
        fn wait_stable(&mut self, timeout: std::time::Duration) -> anyhow::Result<bool> {
            self.inner.wait_stable(timeout)
        }
        fn open_in_background(&mut self, url: &str) -> anyhow::Result<()> {
            self.inner.open_in_background(url)
        }
        fn windows(&self) -> anyhow::Result<Vec<crate::page::WindowHandle>> {
            self.inner.windows()
        }
        fn current_window(&self) -> anyhow::Result<crate::page::WindowHandle> {
            self.inner.current_window()
        }
        fn switch_to(&mut self, window: &crate::page::WindowHandle) -> anyhow::Result<()> {
            self.inner.switch_to(window)
        }
        fn close_window(&mut self, window: &crate::page::WindowHandle) -> anyhow::Result<()> {
            self.inner.close_window(window)
        }
    }

    #[test]
    fn listing_shape_check() {
        assert!(looks_like_listing("https://a.kr/bbs/index.do?page=2", "https://a.kr/bbs/index.do"));
        assert!(looks_like_listing("https://a.kr/notice/list", "https://a.kr/x"));
        assert!(!looks_like_listing("https://a.kr/view.do?no=1", "https://a.kr/index.do"));
    }
}
