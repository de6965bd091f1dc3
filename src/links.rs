//! Article-link extraction from a board listing page.

use serde::Serialize;

use crate::config::ScraperConfig;
use crate::keywords::{
    ARTICLE_ID_PARAMS, ARTICLE_VERBS, BOARD_LINK_PATTERNS, EXCLUDE_LINK_TEXTS, JS_LINK_VERBS,
    NAV_CLASSES, TAB_TEXTS, contains_any,
};
use crate::logging::Redacted;
use crate::page::{ElementHandle, PageAutomation, Query, attr_or_empty};
use crate::safety::{SafetyFilter, has_personal_info};
use crate::strategy::detectors::resolve_href;

const TOP_AREA_PX: f64 = 200.0;
const TOP_AREA_MAX_TEXT: usize = 15;
const NAV_ANCESTOR_DEPTH: usize = 3;
const BOARD_ROW_MIN_CELLS: usize = 3;

#[derive(Debug, Clone)]
pub struct ArticleLink {
    /// Absolute article URL; `None` for script-triggered rows and links.
    pub url: Option<String>,
    pub title: String,
    pub element: ElementHandle,
    pub is_javascript: bool,
}

impl ArticleLink {
    fn dedup_key(&self) -> &str {
        match (&self.url, self.is_javascript) {
            (Some(url), false) => url,
            _ => &self.title,
        }
    }
}

/// Why elements were dropped, for the extraction log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub unsafe_element: usize,
    pub navigation: usize,
    pub personal_info: usize,
    pub text_length: usize,
    pub excluded_text: usize,
    pub invalid: usize,
    pub unclassified: usize,
}

pub struct LinkClassifier {
    safety: SafetyFilter,
    privacy: bool,
    min_text: usize,
    max_text: usize,
    min_title: usize,
}

impl LinkClassifier {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            safety: SafetyFilter::new(config.safe_mode),
            privacy: config.privacy_protection,
            min_text: config.min_link_text,
            max_text: config.max_link_text,
            min_title: config.min_article_title_chars,
        }
    }

    pub fn extract(&self, page: &dyn PageAutomation) -> anyhow::Result<Vec<ArticleLink>> {
        Ok(self.extract_with_counts(page)?.0)
    }

    pub fn extract_with_counts(
        &self,
        page: &dyn PageAutomation,
    ) -> anyhow::Result<(Vec<ArticleLink>, FilterCounts)> {
        let mut elements = page.find(&Query::tags(&["a"]))?;
        elements.extend(page.find(&Query::any().with_attr("onclick"))?);

        let mut counts = FilterCounts::default();
        let mut links: Vec<ArticleLink> = Vec::new();
        for element in elements {
            match self.classify(page, &element, &mut counts) {
                Ok(Some(link)) => {
                    if !links.iter().any(|l| l.dedup_key() == link.dedup_key()) {
                        links.push(link);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(error = %format!("{err:#}"), "link analysis failed");
                }
            }
        }

        let scripted = links.iter().filter(|l| l.is_javascript).count();
        tracing::info!(
            total = links.len(),
            scripted,
            plain = links.len() - scripted,
            filtered = ?counts,
            "article links extracted"
        );
        Ok((links, counts))
    }

    fn classify(
        &self,
        page: &dyn PageAutomation,
        element: &ElementHandle,
        counts: &mut FilterCounts,
    ) -> anyhow::Result<Option<ArticleLink>> {
        let title = link_title(page, element).unwrap_or_else(|err| {
            tracing::debug!(error = %format!("{err:#}"), "link title unreadable; using element text");
            page.text(element)
                .map(|text| text.trim().to_string())
                .unwrap_or_default()
        });
        if title.is_empty() {
            return Ok(None);
        }
        if !self.safety.allows(page, element) {
            counts.unsafe_element += 1;
            return Ok(None);
        }
        let navigation = is_navigation(page, element, &title).unwrap_or_else(|err| {
            tracing::debug!(error = %format!("{err:#}"), "navigation check failed; keeping link");
            false
        });
        if navigation {
            counts.navigation += 1;
            return Ok(None);
        }
        if self.privacy && has_personal_info(&title) {
            tracing::warn!(title = %Redacted::new(&title, true), "link text carries personal info; skipped");
            counts.personal_info += 1;
            return Ok(None);
        }
        let chars = title.chars().count();
        if chars < self.min_text || chars > self.max_text {
            counts.text_length += 1;
            return Ok(None);
        }
        if contains_any(&title.to_lowercase(), EXCLUDE_LINK_TEXTS) {
            counts.excluded_text += 1;
            return Ok(None);
        }

        let href = attr_or_empty(page, element, "href").trim().to_string();
        let script = script_of(page, element, &href);
        if !self.is_article(page, element, &title, &href, script.as_deref()) {
            counts.invalid += 1;
            return Ok(None);
        }

        if script
            .as_deref()
            .is_some_and(|s| contains_any(&s.to_lowercase(), JS_LINK_VERBS))
        {
            return Ok(Some(ArticleLink {
                url: None,
                title,
                element: element.clone(),
                is_javascript: true,
            }));
        }
        match resolve_href(page, &href) {
            Some(url) if contains_any(&url.to_lowercase(), BOARD_LINK_PATTERNS) => {
                Ok(Some(ArticleLink {
                    url: Some(url),
                    title,
                    element: element.clone(),
                    is_javascript: false,
                }))
            }
            _ => {
                counts.unclassified += 1;
                Ok(None)
            }
        }
    }

    /// Article-id parameter or view-style script verb, else a board-row shape.
    /// Elements with no real href, or whose ancestry cannot be read, are
    /// given the benefit of the doubt.
    fn is_article(
        &self,
        page: &dyn PageAutomation,
        element: &ElementHandle,
        title: &str,
        href: &str,
        script: Option<&str>,
    ) -> bool {
        if title.chars().count() < self.min_title {
            return false;
        }
        let href_lower = href.to_lowercase();
        let has_article_id = !href_lower.starts_with("javascript:")
            && contains_any(&href_lower, ARTICLE_ID_PARAMS);
        let has_verb = script.is_some_and(|s| contains_any(&s.to_lowercase(), ARTICLE_VERBS));
        if has_article_id || has_verb {
            return true;
        }
        match in_board_row(page, element) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => {
                tracing::debug!(error = %format!("{err:#}"), "board row check failed; keeping link");
                return true;
            }
        }
        href.is_empty() || href == "#"
    }
}

pub fn extract_article_links(
    page: &dyn PageAutomation,
    config: &ScraperConfig,
) -> anyhow::Result<Vec<ArticleLink>> {
    LinkClassifier::new(config).extract(page)
}

/// Visible title: the second cell for table rows, the element text otherwise.
fn link_title(page: &dyn PageAutomation, element: &ElementHandle) -> anyhow::Result<String> {
    if page.tag(element)? == "tr" {
        let cells = page.find(&Query::tags(&["td"]).within(element))?;
        if cells.len() >= 2 {
            return Ok(page.text(&cells[1])?.trim().to_string());
        }
    }
    Ok(page.text(element)?.trim().to_string())
}

fn script_of(page: &dyn PageAutomation, element: &ElementHandle, href: &str) -> Option<String> {
    if let Some(onclick) = page.attr(element, "onclick").ok().flatten() {
        return Some(onclick);
    }
    href.get(..11)
        .filter(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
        .map(|_| href[11..].to_string())
}

fn is_navigation(
    page: &dyn PageAutomation,
    element: &ElementHandle,
    title: &str,
) -> anyhow::Result<bool> {
    let class = attr_or_empty(page, element, "class").to_lowercase();
    if contains_any(&class, NAV_CLASSES) {
        return Ok(true);
    }
    if contains_any(&title.to_lowercase(), TAB_TEXTS) {
        return Ok(true);
    }

    let mut current = page.parent(element)?;
    for _ in 0..NAV_ANCESTOR_DEPTH {
        let Some(ancestor) = current else { break };
        let tag = page.tag(&ancestor)?;
        let class = attr_or_empty(page, &ancestor, "class").to_lowercase();
        if tag == "nav" || contains_any(&class, NAV_CLASSES) {
            return Ok(true);
        }
        current = page.parent(&ancestor)?;
    }

    if let Some(top) = page.offset_top(element)? {
        if top < TOP_AREA_PX && title.chars().count() < TOP_AREA_MAX_TEXT {
            let href = attr_or_empty(page, element, "href").to_lowercase();
            if !contains_any(&href, BOARD_LINK_PATTERNS) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn in_board_row(page: &dyn PageAutomation, element: &ElementHandle) -> anyhow::Result<bool> {
    let mut current = Some(element.clone());
    while let Some(el) = current {
        if page.tag(&el)? == "tr" {
            let cells = page
                .children(&el)?
                .into_iter()
                .filter(|c| page.tag(c).is_ok_and(|t| t == "td"))
                .count();
            return Ok(cells >= BOARD_ROW_MIN_CELLS);
        }
        current = page.parent(&el)?;
    }
    Ok(false)
}
