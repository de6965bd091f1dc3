//! The seven candidate detectors. Each one scans the page on its own and
//! never interacts with it.

use std::collections::HashSet;

use super::filename::{has_non_pdf_marker, quoted_pdf_path};
use super::{Action, Candidate, Detector, StrategyType};
use crate::keywords::{self, contains_any};
use crate::page::{ElementHandle, PageAutomation, Query, attr_or_empty};
use crate::safety::SafetyFilter;

/// `<a>` elements whose href ends in `.pdf`.
pub struct DirectLinkDetector;

impl Detector for DirectLinkDetector {
    fn name(&self) -> &'static str {
        "direct_link"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::DirectLink]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for link in page.find(&Query::tags(&["a"]).with_attr("href"))? {
            let href = attr_or_empty(page, &link, "href");
            if !href.trim().to_lowercase().ends_with(".pdf") || !safety.allows(page, &link) {
                continue;
            }
            let text = page.text(&link)?;
            out.push(
                Candidate::click(
                    StrategyType::DirectLink,
                    link,
                    StrategyType::DirectLink.base_confidence(),
                )
                .with_url(resolve_href(page, &href))
                .with_text(text),
            );
        }
        Ok(out)
    }
}

/// Clickable elements labelled with a download keyword.
pub struct DownloadButtonDetector;

impl Detector for DownloadButtonDetector {
    fn name(&self) -> &'static str {
        "download_button"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::DownloadButton]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for element in clickables(page)? {
            let text = page.text(&element)?;
            let title = attr_or_empty(page, &element, "title");
            let aria = attr_or_empty(page, &element, "aria-label");
            let value = attr_or_empty(page, &element, "value");
            let combined = format!("{text} {title} {aria} {value}").to_lowercase();

            if !contains_any(&combined, keywords::DOWNLOAD) || !safety.allows(page, &element) {
                continue;
            }

            let mut confidence = StrategyType::DownloadButton.base_confidence();
            if combined.contains(".pdf") {
                confidence = 0.90;
            }
            if keywords::DOWNLOAD_EXACT.contains(&text.trim().to_lowercase().as_str()) {
                confidence = 0.85;
            }

            let label = [&text, &title, &aria, &value]
                .into_iter()
                .find(|s| !s.trim().is_empty())
                .cloned()
                .unwrap_or_default();
            let url = link_url(page, &element);
            let onclick = page.attr(&element, "onclick")?;
            out.push(
                Candidate::click(StrategyType::DownloadButton, element, confidence)
                    .with_url(url)
                    .with_text(label)
                    .with_onclick(onclick),
            );
        }
        Ok(out)
    }
}

/// PDF links and download buttons inside an attachment block.
pub struct AttachmentSectionDetector;

impl AttachmentSectionDetector {
    fn sections(&self, page: &dyn PageAutomation) -> anyhow::Result<Vec<ElementHandle>> {
        let mut sections = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |el: ElementHandle| {
            if seen.insert(el.clone()) {
                sections.push(el);
            }
        };

        for element in page.find(&Query::any())? {
            let own = page.own_text(&element)?.to_lowercase();
            if !own.is_empty() && contains_any(&own, keywords::ATTACHMENT) {
                if let Some(div) = nearest_ancestor(page, &element, "div")? {
                    push(div);
                }
                if let Some(div) = following_sibling(page, &element, "div")? {
                    push(div);
                }
            }
            let class = attr_or_empty(page, &element, "class").to_lowercase();
            if class.contains("attach") || class.contains("file") {
                push(element);
            }
        }
        Ok(sections)
    }
}

impl Detector for AttachmentSectionDetector {
    fn name(&self) -> &'static str {
        "attachment_section"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::AttachmentSection, StrategyType::AttachmentButton]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for section in self.sections(page)? {
            for link in page.find(&Query::tags(&["a"]).within(&section))? {
                let href = attr_or_empty(page, &link, "href");
                let text = page.text(&link)?;
                let mentions_pdf =
                    href.to_lowercase().contains(".pdf") || text.to_lowercase().contains(".pdf");
                if !mentions_pdf || !safety.allows(page, &link) {
                    continue;
                }
                if has_non_pdf_marker(&text) || has_non_pdf_marker(&href) {
                    tracing::debug!("attachment link names another document type; skipped");
                    continue;
                }
                out.push(
                    Candidate::click(
                        StrategyType::AttachmentSection,
                        link.clone(),
                        StrategyType::AttachmentSection.base_confidence(),
                    )
                    .with_url(resolve_href(page, &href))
                    .with_text(text),
                );
            }

            for button in page.find(&Query::any().within(&section))? {
                let tag = page.tag(&button)?;
                let onclick = page.attr(&button, "onclick")?;
                if tag != "button" && tag != "a" && onclick.is_none() {
                    continue;
                }
                let text = page.text(&button)?;
                if !contains_any(&text.to_lowercase(), keywords::DOWNLOAD_EXACT)
                    || !safety.allows(page, &button)
                {
                    continue;
                }
                let url = link_url(page, &button);
                out.push(
                    Candidate::click(
                        StrategyType::AttachmentButton,
                        button,
                        StrategyType::AttachmentButton.base_confidence(),
                    )
                    .with_url(url)
                    .with_text(text)
                    .with_onclick(onclick),
                );
            }
        }
        Ok(out)
    }
}

/// `<iframe>`, `<embed>` and `<object>` elements pointing at a PDF.
pub struct EmbeddedObjectDetector;

impl Detector for EmbeddedObjectDetector {
    fn name(&self) -> &'static str {
        "embedded_object"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::EmbeddedObject]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for element in page.find(&Query::tags(&["iframe", "embed", "object"]))? {
            let source_attr = if page.tag(&element)? == "object" {
                "data"
            } else {
                "src"
            };
            let source = attr_or_empty(page, &element, source_attr);
            if !source.to_lowercase().contains(".pdf") || !safety.allows(page, &element) {
                continue;
            }
            let Some(url) = resolve_href(page, &source) else {
                continue;
            };
            out.push(Candidate {
                strategy: StrategyType::EmbeddedObject,
                element: Some(element),
                url: Some(url),
                text: None,
                onclick: None,
                confidence: StrategyType::EmbeddedObject.base_confidence(),
                action: Action::FetchUrl,
            });
        }
        Ok(out)
    }
}

/// A download control next to a preview control.
pub struct PreviewPairDetector;

impl Detector for PreviewPairDetector {
    fn name(&self) -> &'static str {
        "preview_download_pair"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::PreviewDownloadPair]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for preview in clickables(page)? {
            let text = page.text(&preview)?.to_lowercase();
            if !contains_any(&text, keywords::PREVIEW) {
                continue;
            }
            let Some(parent) = page.parent(&preview)? else {
                continue;
            };
            for sibling in page.find(&Query::any().within(&parent))? {
                let own = page.own_text(&sibling)?.to_lowercase();
                if !contains_any(&own, keywords::DOWNLOAD_EXACT) || !safety.allows(page, &sibling)
                {
                    continue;
                }
                let label = page.text(&sibling)?;
                let url = link_url(page, &sibling);
                let onclick = page.attr(&sibling, "onclick")?;
                out.push(
                    Candidate::click(
                        StrategyType::PreviewDownloadPair,
                        sibling,
                        StrategyType::PreviewDownloadPair.base_confidence(),
                    )
                    .with_url(url)
                    .with_text(label)
                    .with_onclick(onclick),
                );
            }
        }
        Ok(out)
    }
}

/// Script handlers whose payload mentions a `.pdf`.
pub struct JavascriptHandlerDetector;

impl Detector for JavascriptHandlerDetector {
    fn name(&self) -> &'static str {
        "javascript_handler"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::JavascriptHandler]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for element in page.find(&Query::any())? {
            let Some(script) = script_payload(page, &element)? else {
                continue;
            };
            if !script.to_lowercase().contains(".pdf") || !safety.allows(page, &element) {
                continue;
            }
            let text = page.text(&element)?;
            let url = quoted_pdf_path(&script).and_then(|path| resolve_href(page, path));
            out.push(
                Candidate::click(
                    StrategyType::JavascriptHandler,
                    element,
                    StrategyType::JavascriptHandler.base_confidence(),
                )
                .with_url(url)
                .with_text(text)
                .with_onclick(Some(script)),
            );
        }
        Ok(out)
    }
}

/// Clickable elements whose own text is the PDF's filename.
pub struct FilenameLinkDetector;

impl Detector for FilenameLinkDetector {
    fn name(&self) -> &'static str {
        "filename_link"
    }

    fn produces(&self) -> &'static [StrategyType] {
        &[StrategyType::FilenameLink]
    }

    fn detect(
        &self,
        page: &dyn PageAutomation,
        safety: &SafetyFilter,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for element in page.find(&Query::any())? {
            let own = page.own_text(&element)?.to_lowercase();
            if !own.contains(".pdf") || contains_any(&own, keywords::PREVIEW_FILTER) {
                continue;
            }
            let onclick = page.attr(&element, "onclick")?;
            let href = page.attr(&element, "href")?;
            if onclick.is_none() && href.is_none() {
                continue;
            }
            let text = page.text(&element)?;
            let chars = text.chars().count();
            if !text.to_lowercase().contains(".pdf") || chars <= 3 || chars >= 200 {
                continue;
            }
            if !safety.allows(page, &element) {
                continue;
            }
            let url = link_url(page, &element);
            out.push(
                Candidate::click(
                    StrategyType::FilenameLink,
                    element,
                    StrategyType::FilenameLink.base_confidence(),
                )
                .with_url(url)
                .with_text(text)
                .with_onclick(onclick),
            );
        }
        Ok(out)
    }
}

/// Buttons, links, button inputs and script-bearing `div`/`span` elements.
fn clickables(page: &dyn PageAutomation) -> anyhow::Result<Vec<ElementHandle>> {
    let mut out = Vec::new();
    for element in page.find(&Query::tags(&["a", "button", "input", "div", "span"]))? {
        let keep = match page.tag(&element)?.as_str() {
            "a" | "button" => true,
            "input" => matches!(
                attr_or_empty(page, &element, "type").to_lowercase().as_str(),
                "button" | "submit"
            ),
            _ => page.attr(&element, "onclick")?.is_some(),
        };
        if keep {
            out.push(element);
        }
    }
    Ok(out)
}

/// The element's `onclick`, or the body of a `javascript:` href.
fn script_payload(
    page: &dyn PageAutomation,
    element: &ElementHandle,
) -> anyhow::Result<Option<String>> {
    if let Some(onclick) = page.attr(element, "onclick")? {
        return Ok(Some(onclick));
    }
    Ok(page.attr(element, "href")?.and_then(|href| {
        let trimmed = href.trim();
        trimmed
            .get(..11)
            .filter(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
            .map(|_| trimmed[11..].to_string())
    }))
}

/// Absolute URL for a navigable href; `#` and script hrefs have none.
pub(crate) fn resolve_href(page: &dyn PageAutomation, href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
    {
        return None;
    }
    let base = page.current_url().ok()?;
    let base = url::Url::parse(&base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

fn link_url(page: &dyn PageAutomation, element: &ElementHandle) -> Option<String> {
    let href = page.attr(element, "href").ok().flatten()?;
    resolve_href(page, &href)
}

fn nearest_ancestor(
    page: &dyn PageAutomation,
    element: &ElementHandle,
    tag: &str,
) -> anyhow::Result<Option<ElementHandle>> {
    let mut current = page.parent(element)?;
    while let Some(el) = current {
        if page.tag(&el)? == tag {
            return Ok(Some(el));
        }
        current = page.parent(&el)?;
    }
    Ok(None)
}

fn following_sibling(
    page: &dyn PageAutomation,
    element: &ElementHandle,
    tag: &str,
) -> anyhow::Result<Option<ElementHandle>> {
    let Some(parent) = page.parent(element)? else {
        return Ok(None);
    };
    let siblings = page.children(&parent)?;
    let Some(position) = siblings.iter().position(|s| s == element) else {
        return Ok(None);
    };
    for sibling in &siblings[position + 1..] {
        if page.tag(sibling)? == tag {
            return Ok(Some(sibling.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticHtmlDriver;

    const URL: &str = "https://gov.example/board/view?no=10";

    fn run(detector: &dyn Detector, html: &str) -> Vec<Candidate> {
        let page = StaticHtmlDriver::from_html(URL, html);
        detector.detect(&page, &SafetyFilter::new(true)).unwrap()
    }

    #[test]
    fn direct_link_yields_resolved_pdf_url() {
        let found = run(&DirectLinkDetector, r#"<a href="report.pdf">Download</a>"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strategy, StrategyType::DirectLink);
        assert_eq!(found[0].confidence, 0.95);
        assert_eq!(
            found[0].url.as_deref(),
            Some("https://gov.example/board/report.pdf")
        );
        assert_eq!(found[0].action, Action::Click);
    }

    #[test]
    fn direct_link_respects_safety_gate() {
        let found = run(
            &DirectLinkDetector,
            r#"<a href="/cert/guide.pdf" class="btn-login">guide.pdf</a>"#,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn download_button_confidence_tiers() {
        let found = run(
            &DownloadButtonDetector,
            r#"<button>다운로드</button>
               <a href="/down.do?id=1">안내문.pdf 내려받기</a>
               <span onclick="fnSave(3)">저장</span>
               <span>다운로드</span>"#,
        );
        let confidences: Vec<f64> = found.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.85, 0.90, 0.70]);
        assert_eq!(
            found[1].url.as_deref(),
            Some("https://gov.example/down.do?id=1")
        );
        assert_eq!(found[2].onclick.as_deref(), Some("fnSave(3)"));
    }

    #[test]
    fn attachment_section_links_and_buttons() {
        let found = run(
            &AttachmentSectionDetector,
            r#"<div class="view-body"><p>본문</p></div>
               <div class="attach-box">
                 <a href="/files/notice.pdf">notice.pdf</a>
                 <a href="/files/apply.hwp">신청서.pdf.hwp</a>
                 <button onclick="fnDown(9)">다운로드</button>
               </div>"#,
        );
        let kinds: Vec<StrategyType> = found.iter().map(|c| c.strategy).collect();
        assert!(kinds.contains(&StrategyType::AttachmentSection));
        assert!(kinds.contains(&StrategyType::AttachmentButton));
        assert!(found.iter().all(|c| !c.text.as_deref().unwrap_or("").contains(".hwp")));
        let link = found
            .iter()
            .find(|c| c.strategy == StrategyType::AttachmentSection)
            .unwrap();
        assert_eq!(link.confidence, 0.90);
        assert_eq!(link.url.as_deref(), Some("https://gov.example/files/notice.pdf"));
    }

    #[test]
    fn attachment_section_found_by_label_text() {
        let found = run(
            &AttachmentSectionDetector,
            r#"<div><strong>첨부파일</strong><ul><li><a href="/dl?f=1">계획서.pdf</a></li></ul></div>"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text.as_deref(), Some("계획서.pdf"));
    }

    #[test]
    fn embedded_objects_fetch_their_source() {
        let found = run(
            &EmbeddedObjectDetector,
            r#"<iframe src="/viewer/doc.pdf"></iframe>
               <object data="https://cdn.example/a.PDF"></object>
               <embed src="/movie.mp4">"#,
        );
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.action == Action::FetchUrl));
        assert_eq!(found[1].url.as_deref(), Some("https://cdn.example/a.PDF"));
    }

    #[test]
    fn preview_pair_finds_download_sibling() {
        let found = run(
            &PreviewPairDetector,
            r#"<div class="btns"><a href="/preview?id=1">미리보기</a><a href="/down?id=1">다운로드</a></div>"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence, 0.60);
        assert_eq!(found[0].url.as_deref(), Some("https://gov.example/down?id=1"));
    }

    #[test]
    fn javascript_handlers_include_script_hrefs() {
        let found = run(
            &JavascriptHandlerDetector,
            r#"<span onclick="fnDownload('/upload/plan.pdf')">첨부</span>
               <a href="javascript:fnFile('/upload/b.pdf')">b</a>
               <span onclick="fnView(3)">보기</span>"#,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].onclick.as_deref(), Some("fnFile('/upload/b.pdf')"));
        assert_eq!(found[0].confidence, 0.75);
        assert_eq!(
            found[0].url.as_deref(),
            Some("https://gov.example/upload/plan.pdf")
        );
        assert_eq!(
            found[1].url.as_deref(),
            Some("https://gov.example/upload/b.pdf")
        );
    }

    #[test]
    fn javascript_handler_without_quoted_path_has_no_url() {
        let found = run(
            &JavascriptHandlerDetector,
            r#"<button onclick="viewer.pdf.open(4)">첨부</button>"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, None);
    }

    #[test]
    fn embedded_objects_respect_safety_gate() {
        let found = run(
            &EmbeddedObjectDetector,
            r#"<iframe src="/auth/viewer/doc.pdf"></iframe>
               <iframe class="doc-view" src="/viewer/ok.pdf"></iframe>"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].url.as_deref(),
            Some("https://gov.example/viewer/ok.pdf")
        );
    }

    #[test]
    fn filename_links_skip_preview_labels() {
        let found = run(
            &FilenameLinkDetector,
            r##"<a href="#" onclick="fnDown(1)">2025 공고문.pdf</a>
                <a href="#" onclick="fnPreview(1)">공고문.pdf 미리보기</a>
                <span>plain.pdf</span>"##,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text.as_deref(), Some("2025 공고문.pdf"));
        assert_eq!(found[0].url, None);
        assert_eq!(found[0].confidence, 0.95);
    }
}
