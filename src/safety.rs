//! Safety and privacy gates applied before any element is surfaced or touched.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScrapeError;
use crate::page::{ElementHandle, PageAutomation};

/// Substrings that mark an element as never clickable.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "certificate",
    "인증서",
    "공동인증서",
    "login",
    "로그인",
    "auth",
    "sign",
    "logout",
    "로그아웃",
    "delete",
    "삭제",
    "remove",
    "modify",
    "수정",
    "edit",
];

const LOG_MAX_CHARS: usize = 200;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});
static MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"01[0-9][-.\s]?\d{3,4}[-.\s]?\d{4}").expect("mobile regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2,3}[-.\s]?\d{3,4}[-.\s]?\d{4}").expect("phone regex"));
static NATIONAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{6}[-\s]?[1-4]\d{6}").expect("national id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalInfoKind {
    Email,
    Phone,
    Mobile,
    NationalId,
}

impl PersonalInfoKind {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::Email => &EMAIL,
            Self::Phone => &PHONE,
            Self::Mobile => &MOBILE,
            Self::NationalId => &NATIONAL_ID,
        }
    }

    fn placeholder(self) -> &'static str {
        match self {
            Self::Email => "[email removed]",
            Self::Phone | Self::Mobile => "[phone removed]",
            Self::NationalId => "[id removed]",
        }
    }
}

/// The attribute bundle the dangerous-pattern gate inspects.
#[derive(Debug, Clone, Default)]
pub struct ElementAttrs {
    pub href: String,
    pub title: String,
    pub text: String,
    pub onclick: String,
    pub class: String,
}

impl ElementAttrs {
    pub fn read(page: &dyn PageAutomation, element: &ElementHandle) -> anyhow::Result<Self> {
        let attr = |name: &str| -> anyhow::Result<String> {
            Ok(page.attr(element, name)?.unwrap_or_default())
        };
        Ok(Self {
            href: attr("href")?,
            title: attr("title")?,
            text: page.text(element)?,
            onclick: attr("onclick")?,
            class: attr("class")?,
        })
    }
}

/// False when any of the element's attributes contains a dangerous pattern.
pub fn is_safe(attrs: &ElementAttrs) -> bool {
    let combined = format!(
        "{} {} {} {} {}",
        attrs.href, attrs.title, attrs.text, attrs.onclick, attrs.class
    )
    .to_lowercase();
    match DANGEROUS_PATTERNS.iter().find(|p| combined.contains(*p)) {
        Some(pattern) => {
            tracing::debug!(pattern, "{}", ScrapeError::UnsafeElementRejected);
            false
        }
        None => true,
    }
}

/// Element-level gate used by every detector and the link classifier.
#[derive(Debug, Clone, Copy)]
pub struct SafetyFilter {
    enabled: bool,
}

impl SafetyFilter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Attribute access failures reject the element.
    pub fn allows(&self, page: &dyn PageAutomation, element: &ElementHandle) -> bool {
        if !self.enabled {
            return true;
        }
        match ElementAttrs::read(page, element) {
            Ok(attrs) => is_safe(&attrs),
            Err(err) => {
                tracing::debug!(error = %err, "element attributes unreadable; treating as unsafe");
                false
            }
        }
    }
}

/// Kinds of personal information found in `text`, in a fixed order.
pub fn contains_personal_info(text: &str) -> Vec<PersonalInfoKind> {
    if text.is_empty() {
        return Vec::new();
    }
    [
        PersonalInfoKind::Email,
        PersonalInfoKind::Phone,
        PersonalInfoKind::Mobile,
        PersonalInfoKind::NationalId,
    ]
    .into_iter()
    .filter(|kind| kind.pattern().is_match(text))
    .collect()
}

pub fn has_personal_info(text: &str) -> bool {
    !contains_personal_info(text).is_empty()
}

/// Masks personal information for display. Never used on decision data.
pub fn redact(text: &str) -> String {
    // National IDs first: the phone pattern would otherwise eat part of them.
    let mut out = text.to_string();
    for kind in [
        PersonalInfoKind::NationalId,
        PersonalInfoKind::Email,
        PersonalInfoKind::Mobile,
        PersonalInfoKind::Phone,
    ] {
        out = kind
            .pattern()
            .replace_all(&out, kind.placeholder())
            .into_owned();
    }
    out
}

pub fn sanitize_for_logging(text: &str) -> String {
    let cleaned = redact(text);
    if cleaned.chars().count() > LOG_MAX_CHARS {
        let mut cut: String = cleaned.chars().take(LOG_MAX_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Query, StaticHtmlDriver};

    #[test]
    fn javascript_login_href_is_unsafe() {
        let attrs = ElementAttrs {
            href: "javascript:login()".to_string(),
            text: "보고서.pdf".to_string(),
            ..ElementAttrs::default()
        };
        assert!(!is_safe(&attrs));
    }

    #[test]
    fn dangerous_patterns_match_case_insensitively_across_fields() {
        let attrs = ElementAttrs {
            class: "btn BTN-Delete".to_string(),
            ..ElementAttrs::default()
        };
        assert!(!is_safe(&attrs));

        let attrs = ElementAttrs {
            href: "/files/report.pdf".to_string(),
            text: "다운로드".to_string(),
            ..ElementAttrs::default()
        };
        assert!(is_safe(&attrs));
    }

    #[test]
    fn filter_reads_attributes_from_page() {
        let page = StaticHtmlDriver::from_html(
            "https://gov.example/board/view?no=1",
            r#"<a href="/cert/공동인증서.pdf">인증서</a><a href="/files/a.pdf">a.pdf</a>"#,
        );
        let anchors = page.find(&Query::tags(&["a"])).unwrap();
        let filter = SafetyFilter::new(true);
        assert!(!filter.allows(&page, &anchors[0]));
        assert!(filter.allows(&page, &anchors[1]));
        assert!(SafetyFilter::new(false).allows(&page, &anchors[0]));
    }

    #[test]
    fn personal_info_kinds_are_reported() {
        assert_eq!(
            contains_personal_info("담당 hong@korea.kr"),
            vec![PersonalInfoKind::Email]
        );
        let kinds = contains_personal_info("연락처 010-1234-5678");
        assert!(kinds.contains(&PersonalInfoKind::Mobile));
        assert!(contains_personal_info("900101-1234567").contains(&PersonalInfoKind::NationalId));
        assert!(contains_personal_info("2024년 주거급여 안내").is_empty());
    }

    #[test]
    fn redact_masks_spans_and_truncates_for_logs() {
        let out = redact("문의: hong@korea.kr / 02-123-4567 / 900101-1234567");
        assert!(!out.contains("hong@korea.kr"));
        assert!(!out.contains("123-4567"));
        assert!(out.contains("[email removed]"));
        assert!(out.contains("[id removed]"));

        let long = "가".repeat(300);
        let logged = sanitize_for_logging(&long);
        assert_eq!(logged.chars().count(), 203);
        assert!(logged.ends_with("..."));
    }
}
