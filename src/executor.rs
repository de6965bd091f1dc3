//! Performs a candidate's action and waits for the resulting file.

use std::collections::HashSet;
use std::ffi::OsString;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use anyhow::Context as _;

use crate::config::{ScraperConfig, Timeouts};
use crate::error::ScrapeError;
use crate::page::{PageAutomation, WindowHandle};
use crate::strategy::{Action, Candidate};

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".tmp", ".part"];

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success {
        filename: String,
        filepath: PathBuf,
        size: u64,
    },
    Failed {
        reason: String,
    },
    Timeout {
        waited_ms: u64,
    },
    /// The run was interrupted while waiting; says nothing about the strategy.
    Cancelled,
}

impl ExecutionResult {
    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short reason for logs and the failure ledger.
    pub fn reason(&self) -> String {
        match self {
            Self::Success { .. } => "success".to_string(),
            Self::Failed { reason } => reason.clone(),
            Self::Timeout { waited_ms } => ScrapeError::DownloadTimeout {
                waited_ms: *waited_ms,
            }
            .to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

pub struct DownloadExecutor {
    download_dir: PathBuf,
    timeouts: Timeouts,
    min_size: u64,
    allowed_extensions: Vec<String>,
    cancel: Arc<AtomicBool>,
}

impl DownloadExecutor {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            download_dir: config.download_dir.clone(),
            timeouts: config.timeouts.clone(),
            min_size: config.min_pdf_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Polling stops early once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn execute(
        &self,
        page: &mut dyn PageAutomation,
        candidate: &Candidate,
    ) -> anyhow::Result<ExecutionResult> {
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!("create download dir: {}", self.download_dir.display())
        })?;
        let before = snapshot(&self.download_dir)?;

        let outcome = match candidate.action {
            Action::Click => self.click(page, candidate)?,
            Action::FetchUrl => self.fetch(page, candidate)?,
        };
        if let Some(failed) = outcome {
            return Ok(failed);
        }
        self.wait_for_download(&before)
    }

    fn click(
        &self,
        page: &mut dyn PageAutomation,
        candidate: &Candidate,
    ) -> anyhow::Result<Option<ExecutionResult>> {
        let Some(element) = &candidate.element else {
            return Ok(Some(ExecutionResult::failed("no element to click")));
        };
        match page.is_interactable(element) {
            Ok(true) => {}
            Ok(false) => return Ok(Some(ExecutionResult::failed("element_not_valid"))),
            Err(err) => return Ok(Some(ExecutionResult::failed(format!("{err:#}")))),
        }

        let original = page.current_window()?;
        let windows_before = page.windows()?;

        if let Err(err) = page.click(element) {
            tracing::debug!(error = %format!("{err:#}"), "native click failed; forcing");
            if let Err(err) = page.force_click(element) {
                return Ok(Some(ExecutionResult::failed(format!("click failed: {err:#}"))));
            }
        }

        std::thread::sleep(self.timeouts.new_window_grace());
        if close_new_windows(page, &windows_before, &original)? > 0 {
            return Ok(Some(ExecutionResult::failed("new_window_opened")));
        }
        Ok(None)
    }

    fn fetch(
        &self,
        page: &mut dyn PageAutomation,
        candidate: &Candidate,
    ) -> anyhow::Result<Option<ExecutionResult>> {
        let Some(url) = &candidate.url else {
            return Ok(Some(ExecutionResult::failed("no url to fetch")));
        };
        let original = page.current_window()?;
        let windows_before = page.windows()?;

        let opened = page.open_in_background(url);
        std::thread::sleep(self.timeouts.background_open());
        close_new_windows(page, &windows_before, &original)?;
        if let Err(err) = opened {
            return Ok(Some(ExecutionResult::failed(format!("open failed: {err:#}"))));
        }
        Ok(None)
    }

    /// Polls for a new, complete file until the download wait elapses.
    fn wait_for_download(&self, before: &HashSet<OsString>) -> anyhow::Result<ExecutionResult> {
        let started = Instant::now();
        let deadline = started + self.timeouts.download_wait();
        let mut rejected: Vec<PathBuf> = Vec::new();
        loop {
            if let Some((name, path, size)) = self.newest_valid(before, &mut rejected)? {
                tracing::info!(file = %name, bytes = size, "download complete");
                return Ok(ExecutionResult::Success {
                    filename: name,
                    filepath: path,
                    size,
                });
            }
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(ExecutionResult::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.timeouts.poll_interval().min(deadline - now));
        }

        for path in rejected {
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %err, "could not remove rejected download");
            }
        }
        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(waited_ms, "download timed out");
        Ok(ExecutionResult::Timeout { waited_ms })
    }

    fn newest_valid(
        &self,
        before: &HashSet<OsString>,
        rejected: &mut Vec<PathBuf>,
    ) -> anyhow::Result<Option<(String, PathBuf, u64)>> {
        let mut fresh: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.download_dir)
            .with_context(|| format!("read download dir: {}", self.download_dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            if before.contains(&name) {
                continue;
            }
            let name = name.to_string_lossy().into_owned();
            let lower = name.to_lowercase();
            if PARTIAL_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            fresh.push((modified, name, entry.path()));
        }
        fresh.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, name, path) in fresh {
            match self.validate(&name, &path) {
                Ok(size) => return Ok(Some((name, path, size))),
                Err(reason) => {
                    tracing::debug!(file = %name, reason, "download rejected");
                    if !rejected.contains(&path) {
                        rejected.push(path);
                    }
                }
            }
        }
        Ok(None)
    }

    fn validate(&self, name: &str, path: &Path) -> Result<u64, &'static str> {
        let lower = name.to_lowercase();
        if !self.allowed_extensions.iter().any(|ext| lower.ends_with(ext)) {
            return Err("extension not allowed");
        }
        let size = std::fs::metadata(path).map_err(|_| "unreadable")?.len();
        if size <= self.min_size {
            return Err("too small");
        }
        if lower.ends_with(".pdf") && !has_pdf_magic(path) {
            return Err("missing pdf signature");
        }
        Ok(size)
    }
}

pub fn has_pdf_magic(path: &Path) -> bool {
    let mut header = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .is_ok()
        && &header == PDF_MAGIC
}

fn snapshot(dir: &Path) -> anyhow::Result<HashSet<OsString>> {
    let mut names = HashSet::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read download dir: {}", dir.display()))?
    {
        names.insert(entry?.file_name());
    }
    Ok(names)
}

/// Closes windows that were not open before the action and returns focus to
/// `original`. Returns how many were closed.
fn close_new_windows(
    page: &mut dyn PageAutomation,
    before: &[WindowHandle],
    original: &WindowHandle,
) -> anyhow::Result<usize> {
    let extra: Vec<WindowHandle> = page
        .windows()?
        .into_iter()
        .filter(|w| !before.contains(w))
        .collect();
    for window in &extra {
        if let Err(err) = page.close_window(window) {
            tracing::debug!(error = %format!("{err:#}"), "close window failed");
        }
    }
    if !extra.is_empty() {
        tracing::info!(closed = extra.len(), "closed unexpected windows");
    }
    page.switch_to(original)?;
    Ok(extra.len())
}
