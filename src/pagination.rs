//! Finding and activating the next page of a board listing.

use std::time::Duration;

use serde::Serialize;

use crate::keywords::{DISABLED_CLASSES, NEXT_PAGE, contains_any};
use crate::page::{ElementHandle, PageAutomation, Query, attr_or_empty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMethod {
    PageNumber,
    NextButton,
}

impl PageMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageNumber => "page_number",
            Self::NextButton => "next_button",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NextPage {
    pub available: bool,
    /// `current + 1` when available, `current` otherwise.
    pub target_page: u32,
    pub method: Option<PageMethod>,
    pub element: Option<ElementHandle>,
}

impl NextPage {
    fn unavailable(current: u32) -> Self {
        Self {
            available: false,
            target_page: current,
            method: None,
            element: None,
        }
    }

    fn found(target: u32, method: PageMethod, element: ElementHandle) -> Self {
        Self {
            available: true,
            target_page: target,
            method: Some(method),
            element: Some(element),
        }
    }
}

/// Looks for a `current + 1` page-number control, then a "next" control.
pub fn next_page(page: &dyn PageAutomation, current: u32) -> anyhow::Result<NextPage> {
    let target = current + 1;
    if let Some(element) = page_number_control(page, target)? {
        tracing::debug!(target, "page number control found");
        return Ok(NextPage::found(target, PageMethod::PageNumber, element));
    }
    if let Some(element) = next_control(page)? {
        tracing::debug!(target, "next control found");
        return Ok(NextPage::found(target, PageMethod::NextButton, element));
    }
    tracing::info!(current, "no next page control; last page");
    Ok(NextPage::unavailable(current))
}

/// Activates the next-page control. Returns the new page number, or `None`
/// at the end of the listing.
pub fn navigate_to_next_page(
    page: &mut dyn PageAutomation,
    current: u32,
    settle: Duration,
) -> anyhow::Result<Option<u32>> {
    let next = next_page(page, current)?;
    let Some(element) = next.element.filter(|_| next.available) else {
        return Ok(None);
    };
    if let Err(err) = page.click(&element) {
        tracing::debug!(error = %format!("{err:#}"), "pager click failed; forcing");
        page.force_click(&element)?;
    }
    if !page.wait_stable(settle)? {
        tracing::warn!(page = next.target_page, "listing did not settle after paging");
    }
    tracing::info!(
        page = next.target_page,
        method = next.method.map(PageMethod::as_str).unwrap_or_default(),
        "moved to next page"
    );
    Ok(Some(next.target_page))
}

fn page_number_control(
    page: &dyn PageAutomation,
    target: u32,
) -> anyhow::Result<Option<ElementHandle>> {
    let wanted = target.to_string();
    let anchors = page.find(&Query::tags(&["a"]))?;

    let by_text = |el: &ElementHandle| page.text(el).is_ok_and(|t| t.trim() == wanted);
    let by_href = |el: &ElementHandle| href_has_page(&attr_or_empty(page, el, "href"), &wanted);
    let by_data = |el: &ElementHandle| attr_or_empty(page, el, "data-page").trim() == wanted;

    let mut ordered: Vec<ElementHandle> = Vec::new();
    ordered.extend(anchors.iter().filter(|el| by_text(el)).cloned());
    ordered.extend(anchors.iter().filter(|el| by_href(el)).cloned());
    ordered.extend(anchors.iter().filter(|el| by_data(el)).cloned());
    ordered.extend(
        page.find(&Query::tags(&["button"]))?
            .into_iter()
            .filter(|el| by_text(el)),
    );
    ordered.extend(page.find(&Query::tags(&["div"]))?.into_iter().filter(|el| {
        by_text(el)
            && (page.attr(el, "onclick").ok().flatten().is_some()
                || page.attr(el, "data-page").ok().flatten().is_some())
    }));

    for element in ordered {
        if usable(page, &element)? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// `page=<n>` as a whole parameter value, so `page=1` does not match `page=12`.
fn href_has_page(href: &str, wanted: &str) -> bool {
    let needle = format!("page={wanted}");
    href.match_indices(&needle).any(|(at, _)| {
        let after = &href[at + needle.len()..];
        !after.starts_with(|c: char| c.is_ascii_digit())
    })
}

fn next_control(page: &dyn PageAutomation) -> anyhow::Result<Option<ElementHandle>> {
    let controls = page.find(&Query::tags(&["a", "button"]))?;
    let spans = page.find(&Query::tags(&["span"]))?;

    for keyword in NEXT_PAGE {
        let mut matches: Vec<ElementHandle> = controls
            .iter()
            .filter(|el| own_text_has(page, el, keyword))
            .cloned()
            .collect();
        for span in spans.iter().filter(|el| own_text_has(page, el, keyword)) {
            if let Some(parent) = page.parent(span)? {
                if matches!(page.tag(&parent)?.as_str(), "a" | "button") {
                    matches.push(parent);
                }
            }
        }

        for element in matches {
            if usable(page, &element)? {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}

/// Interactable and not styled as disabled.
fn usable(page: &dyn PageAutomation, element: &ElementHandle) -> anyhow::Result<bool> {
    let class = attr_or_empty(page, element, "class").to_lowercase();
    if contains_any(&class, DISABLED_CLASSES) {
        return Ok(false);
    }
    page.is_interactable(element)
}

fn own_text_has(page: &dyn PageAutomation, element: &ElementHandle, keyword: &str) -> bool {
    page.own_text(element)
        .is_ok_and(|t| t.to_lowercase().contains(keyword))
}
