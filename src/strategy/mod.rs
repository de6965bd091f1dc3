//! Download strategies: the closed set of strategy types, the candidates the
//! detectors propose, and the detector registry.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::config::ScraperConfig;
use crate::page::{ElementHandle, PageAutomation};
use crate::safety::SafetyFilter;

pub mod detectors;
pub mod filename;

pub use detectors::{
    AttachmentSectionDetector, DirectLinkDetector, DownloadButtonDetector,
    EmbeddedObjectDetector, FilenameLinkDetector, JavascriptHandlerDetector,
    PreviewPairDetector,
};
pub use filename::FilenameOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    DirectLink,
    DownloadButton,
    AttachmentSection,
    AttachmentButton,
    EmbeddedObject,
    PreviewDownloadPair,
    JavascriptHandler,
    FilenameLink,
}

impl StrategyType {
    pub const ALL: [StrategyType; 8] = [
        Self::DirectLink,
        Self::DownloadButton,
        Self::AttachmentSection,
        Self::AttachmentButton,
        Self::EmbeddedObject,
        Self::PreviewDownloadPair,
        Self::JavascriptHandler,
        Self::FilenameLink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectLink => "direct_link",
            Self::DownloadButton => "download_button",
            Self::AttachmentSection => "attachment_section",
            Self::AttachmentButton => "attachment_button",
            Self::EmbeddedObject => "embedded_object",
            Self::PreviewDownloadPair => "preview_download_pair",
            Self::JavascriptHandler => "javascript_handler",
            Self::FilenameLink => "filename_link",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("unknown strategy type: {raw}"))
    }

    /// Prior reliability of the strategy before any learning.
    pub fn base_confidence(self) -> f64 {
        match self {
            Self::DirectLink | Self::FilenameLink => 0.95,
            Self::AttachmentSection | Self::EmbeddedObject => 0.90,
            Self::AttachmentButton => 0.85,
            Self::JavascriptHandler => 0.75,
            Self::DownloadButton => 0.70,
            Self::PreviewDownloadPair => 0.60,
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Click,
    FetchUrl,
}

/// One concrete way to trigger a download on the current page.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: StrategyType,
    pub element: Option<ElementHandle>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub onclick: Option<String>,
    pub confidence: f64,
    pub action: Action,
}

impl Candidate {
    pub fn click(strategy: StrategyType, element: ElementHandle, confidence: f64) -> Self {
        Self {
            strategy,
            element: Some(element),
            url: None,
            text: None,
            onclick: None,
            confidence,
            action: Action::Click,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = (!text.trim().is_empty()).then(|| text.trim().to_string());
        self
    }

    pub fn with_onclick(mut self, onclick: Option<String>) -> Self {
        self.onclick = onclick.filter(|o| !o.is_empty());
        self
    }

    /// Identity used to drop the same target proposed by several detectors.
    pub fn identifier(&self) -> String {
        match (self.url.as_deref(), self.text.as_deref()) {
            (Some(url), Some(text)) => {
                let digest = Sha256::digest(format!("{url}:{text}").as_bytes());
                hex::encode(&digest[..16])
            }
            (None, Some(text)) => format!("text:{text}"),
            (Some(url), None) => format!("url:{url}"),
            (None, None) => match &self.element {
                Some(element) => format!("element:{}", element.id()),
                None => "element:none".to_string(),
            },
        }
    }
}

/// Keeps the first candidate for every identifier, preserving order.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.identifier()))
        .collect()
}

/// A heuristic that scans the loaded page for download candidates.
pub trait Detector {
    fn name(&self) -> &'static str;
    /// Strategy types this detector can emit.
    fn produces(&self) -> &'static [StrategyType];
    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>>;
}

/// The enabled detectors in run order.
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
    enabled: Vec<StrategyType>,
    safety: SafetyFilter,
}

impl DetectorSet {
    pub fn from_config(config: &ScraperConfig) -> Self {
        let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
        if config.prefer_filename_links {
            detectors.push(Box::new(FilenameLinkDetector));
        }
        detectors.push(Box::new(DirectLinkDetector));
        detectors.push(Box::new(EmbeddedObjectDetector));
        detectors.push(Box::new(AttachmentSectionDetector));
        detectors.push(Box::new(DownloadButtonDetector));
        detectors.push(Box::new(JavascriptHandlerDetector));
        detectors.push(Box::new(PreviewPairDetector));
        if !config.prefer_filename_links {
            detectors.push(Box::new(FilenameLinkDetector));
        }

        let enabled = config.enabled_strategies.clone();
        detectors.retain(|d| d.produces().iter().any(|t| enabled.contains(t)));
        Self {
            detectors,
            enabled,
            safety: SafetyFilter::new(config.safe_mode),
        }
    }

    pub fn detectors(&self) -> impl Iterator<Item = &dyn Detector> {
        self.detectors.iter().map(|d| d.as_ref())
    }

    /// Runs every detector. A failing detector contributes nothing.
    pub fn detect_all(&self, page: &dyn PageAutomation) -> Vec<Candidate> {
        self.detectors
            .iter()
            .flat_map(|detector| self.run(detector.as_ref(), page))
            .collect()
    }

    /// Runs only the detector responsible for `strategy`.
    pub fn detect_only(&self, page: &dyn PageAutomation, strategy: StrategyType) -> Vec<Candidate> {
        self.detectors
            .iter()
            .filter(|d| d.produces().contains(&strategy))
            .flat_map(|detector| self.run(detector.as_ref(), page))
            .filter(|c| c.strategy == strategy)
            .collect()
    }

    fn run(&self, detector: &dyn Detector, page: &dyn PageAutomation) -> Vec<Candidate> {
        match detector.detect(page, &self.safety) {
            Ok(found) => {
                let found: Vec<Candidate> = found
                    .into_iter()
                    .filter(|c| self.enabled.contains(&c.strategy))
                    .collect();
                tracing::debug!(detector = detector.name(), count = found.len(), "detector ran");
                found
            }
            Err(err) => {
                tracing::warn!(detector = detector.name(), error = %format!("{err:#}"), "detector failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticHtmlDriver;

    #[test]
    fn parse_round_trips_names() {
        for t in StrategyType::ALL {
            assert_eq!(StrategyType::parse(t.as_str()).unwrap(), t);
        }
        assert_eq!(
            StrategyType::parse(" Direct_Link ").unwrap(),
            StrategyType::DirectLink
        );
        assert!(StrategyType::parse("iframe").is_err());
    }

    #[test]
    fn base_priors_are_within_range() {
        for t in StrategyType::ALL {
            let c = t.base_confidence();
            assert!((0.6..=0.95).contains(&c), "{t}: {c}");
        }
    }

    #[test]
    fn identifier_prefers_url_and_text() {
        let page = StaticHtmlDriver::from_html("https://gov.example/v", "<a>x</a>");
        let el = page
            .find(&crate::page::Query::tags(&["a"]))
            .unwrap()
            .remove(0);
        let both = Candidate::click(StrategyType::DirectLink, el.clone(), 0.95)
            .with_url(Some("https://gov.example/a.pdf".to_string()))
            .with_text("a.pdf");
        assert_eq!(both.identifier().len(), 32);

        let text_only = Candidate::click(StrategyType::DownloadButton, el.clone(), 0.7)
            .with_text(" 다운로드 ");
        assert_eq!(text_only.identifier(), "text:다운로드");

        let bare = Candidate::click(StrategyType::JavascriptHandler, el.clone(), 0.75);
        assert_eq!(bare.identifier(), format!("element:{}", el.id()));

        let deduped = dedup_candidates(vec![text_only.clone(), both.clone(), text_only]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].strategy, StrategyType::DownloadButton);
    }

    #[test]
    fn disabled_strategies_have_no_detector() {
        let config = ScraperConfig::default();
        let set = DetectorSet::from_config(&config);
        let names: Vec<&str> = set.detectors().map(|d| d.name()).collect();
        assert_eq!(names.first(), Some(&"filename_link"));
        assert!(!names.contains(&"preview_download_pair"));

        let config = ScraperConfig {
            prefer_filename_links: false,
            enabled_strategies: StrategyType::ALL.to_vec(),
            ..ScraperConfig::default()
        };
        let set = DetectorSet::from_config(&config);
        let names: Vec<&str> = set.detectors().map(|d| d.name()).collect();
        assert_eq!(names.last(), Some(&"filename_link"));
        assert!(names.contains(&"preview_download_pair"));
    }
}
