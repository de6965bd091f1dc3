//! Multilingual keyword tables (Korean, English, Chinese, Japanese).
//!
//! Matching is substring-based on lowercased text, so every entry is lowercase.

pub const DOWNLOAD: &[&str] = &[
    "다운로드", "내려받기", "저장", "pdf", "파일받기", "받기", "download", "get", "save", "file",
    "下载", "下載", "ダウンロード",
];

/// Labels that mean exactly "download" on a button.
pub const DOWNLOAD_EXACT: &[&str] = &["다운로드", "download"];

pub const ATTACHMENT: &[&str] = &[
    "첨부파일", "첨부", "파일", "자료", "attachment", "file", "document", "附件", "添付ファイル",
    "添付",
];

pub const PREVIEW: &[&str] = &[
    "미리보기", "미리 보기", "보기", "열기", "preview", "view", "open", "预览", "預覽", "プレビュー",
];

/// Preview labels that disqualify a filename link.
pub const PREVIEW_FILTER: &[&str] = &["미리보기", "미리 보기", "preview", "view", "보기"];

pub const NEXT_PAGE: &[&str] = &[
    "다음", "다음페이지", "다음 페이지", "next", "next page", "下一页", "下一頁", "次へ",
    "次のページ", ">", "›", "»",
];

/// URL fragments typical of article links on board listings.
pub const BOARD_LINK_PATTERNS: &[&str] = &[
    "view", "detail", "read", "show", "article", "no=", "id=", "num=", "seq=", "idx=", "board",
    "post", "notice", "bbs",
];

/// Query parameters that identify an article.
pub const ARTICLE_ID_PARAMS: &[&str] = &[
    "no=", "idx=", "seq=", "id=", "num=", "board_id=", "article",
];

/// Script verbs that open an article.
pub const ARTICLE_VERBS: &[&str] = &["view", "detail", "show"];

/// Script verbs accepted on `javascript:` article links.
pub const JS_LINK_VERBS: &[&str] = &["view", "detail", "show", "read", "open", "go", "move"];

/// Generic link labels that are never articles.
pub const EXCLUDE_LINK_TEXTS: &[&str] = &[
    "더보기", "상세보기", "more", "detail", "이전", "다음", "prev", "next", "목록", "list", "처음",
    "first", "마지막", "last", "수정", "삭제", "edit", "delete", "답글", "댓글", "reply",
    "comment",
];

/// Class fragments of navigation containers.
pub const NAV_CLASSES: &[&str] = &[
    "tab", "nav", "menu", "header", "gnb", "lnb", "breadcrumb", "pagination", "paging",
    "pageindexer",
];

/// Tab and pager labels seen on board pages.
pub const TAB_TEXTS: &[&str] = &[
    "공고문", "임대가이드", "청약연습", "가이드", "연습", "tab", "guide", "practice", "manual",
    "tutorial", "이전", "다음", "처음", "마지막", "prev", "next", "first", "last",
];

pub const DISABLED_CLASSES: &[&str] = &["disabled", "inactive"];

pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub fn matching<'a>(haystack: &str, needles: &[&'a str]) -> Vec<&'a str> {
    needles
        .iter()
        .copied()
        .filter(|needle| haystack.contains(needle))
        .collect()
}
