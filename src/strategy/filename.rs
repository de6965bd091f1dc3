//! Filename extraction for download candidates.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

use super::Candidate;

/// Extensions that mark a candidate as some other kind of document.
pub const NON_PDF_MARKERS: &[&str] = &[
    ".xlsx", ".xls", ".xlsm", ".doc", ".docx", ".hwp", ".zip", ".egg", ".txt", ".ppt", ".pptx",
];

const MAX_FILENAME_CHARS: usize = 100;
const FALLBACK_TITLE_CHARS: usize = 50;

static TEXT_PDF_NAMES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)([\w\s\-.()\[\]]+\.pdf)").expect("pdf name regex"),
        Regex::new(r"(?i)(\S+\.pdf)").expect("pdf token regex"),
    ]
});
static ONCLICK_PDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)["']([^"']*\.pdf)["']"#).expect("onclick pdf regex"));
static DISPOSITION: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)filename\*\s*=\s*UTF-8''([^;]+)").expect("rfc5987 regex"),
        Regex::new(r#"(?i)filename\s*=\s*"([^"]+)""#).expect("quoted filename regex"),
        Regex::new(r"(?i)filename\s*=\s*([^;\s]+)").expect("bare filename regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameOutcome {
    Extracted(String),
    /// The candidate points at another document type; skip it without
    /// counting a strategy failure.
    NotAPdf,
    /// Nothing to name the file after.
    Ambiguous,
}

/// First quoted `.pdf` path inside a script payload.
pub fn quoted_pdf_path(script: &str) -> Option<&str> {
    ONCLICK_PDF
        .captures(script)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn has_non_pdf_marker(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    NON_PDF_MARKERS.iter().any(|ext| lower.contains(ext))
}

/// Tries the candidate's URL, then its text, then its onclick payload, then
/// falls back to `<article title>_<timestamp>.pdf`.
pub fn extract(candidate: &Candidate, article_title: &str, now: DateTime<Local>) -> FilenameOutcome {
    if let Some(url) = candidate.url.as_deref().filter(|u| !u.is_empty()) {
        if has_non_pdf_marker(url) {
            return FilenameOutcome::NotAPdf;
        }
        if let Some(name) = pdf_name_from_url(url) {
            return FilenameOutcome::Extracted(normalize_filename(&name, MAX_FILENAME_CHARS));
        }
    }

    if let Some(text) = candidate.text.as_deref().filter(|t| !t.is_empty()) {
        if has_non_pdf_marker(text) {
            return FilenameOutcome::NotAPdf;
        }
        if let Some(name) = pdf_name_from_text(text) {
            return FilenameOutcome::Extracted(normalize_filename(&name, MAX_FILENAME_CHARS));
        }
    }

    if let Some(onclick) = candidate.onclick.as_deref().filter(|o| !o.is_empty()) {
        if has_non_pdf_marker(onclick) {
            return FilenameOutcome::NotAPdf;
        }
        if let Some(path) = quoted_pdf_path(onclick) {
            let name = path.rsplit('/').next().unwrap_or(path);
            if !name.is_empty() {
                return FilenameOutcome::Extracted(normalize_filename(name, MAX_FILENAME_CHARS));
            }
        }
    }

    if !article_title.trim().is_empty() {
        return FilenameOutcome::Extracted(fallback_filename(article_title, now));
    }
    FilenameOutcome::Ambiguous
}

/// Last path segment when it names a PDF; query and fragment are ignored.
pub fn pdf_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query.rsplit('/').next()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    decoded.to_lowercase().contains(".pdf").then_some(decoded)
}

fn pdf_name_from_text(text: &str) -> Option<String> {
    TEXT_PDF_NAMES.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|name| name.len() > ".pdf".len())
    })
}

/// Replaces characters that are invalid in filenames, collapses whitespace and
/// caps the length (extension included) at `max_chars`.
pub fn normalize_filename(filename: &str, max_chars: usize) -> String {
    let (name, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => (&filename[..dot], &filename[dot..]),
        _ => (filename, ""),
    };
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let budget = max_chars.saturating_sub(ext.chars().count());
    let truncated: String = collapsed.chars().take(budget).collect();
    format!("{}{ext}", truncated.trim_end())
}

pub fn fallback_filename(article_title: &str, now: DateTime<Local>) -> String {
    let title = normalize_filename(article_title, FALLBACK_TITLE_CHARS);
    format!("{title}_{}.pdf", now.format("%Y%m%d_%H%M%S"))
}

/// Filename from a `Content-Disposition` header value, percent-decoded.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    DISPOSITION.iter().find_map(|pattern| {
        let caps = pattern.captures(header)?;
        let raw = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
        let decoded = urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        (!decoded.is_empty()).then_some(decoded)
    })
}
