use thiserror::Error;

/// Outcome categories surfaced by the scrape pipeline.
///
/// Most of these are carried inside `anyhow::Error` and recovered with
/// `downcast_ref` where the caller needs to branch on them.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("no download candidates found")]
    NoCandidatesFound,
    #[error("all {attempted} download candidates failed")]
    AllCandidatesFailed { attempted: usize },
    #[error("duplicate skipped: {reason}")]
    DuplicateSkipped { reason: String },
    #[error("unsafe element rejected")]
    UnsafeElementRejected,
    #[error("download did not complete within {waited_ms}ms")]
    DownloadTimeout { waited_ms: u64 },
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("persist {what}: {reason}")]
    Persistence { what: &'static str, reason: String },
    #[error("element handle is stale")]
    StaleElement,
    #[error("interaction failed: {0}")]
    Interaction(String),
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// True when `err` (or anything in its chain) is a navigation failure.
pub fn is_navigation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::Navigation { .. })
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn navigation_is_found_through_context() {
        let err: anyhow::Result<()> =
            Err(ScrapeError::navigation("https://example.com/list", "status 500").into());
        let err = err.context("load listing").unwrap_err();
        assert!(is_navigation(&err));

        let other = anyhow::anyhow!("boom");
        assert!(!is_navigation(&other));
    }
}
