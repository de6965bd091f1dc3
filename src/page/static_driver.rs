//! HTTP-backed automation backend.
//!
//! Pages are fetched with a blocking reqwest client and parsed into an arena
//! DOM. Script handlers are not executed; the driver follows the URL literals
//! they carry, which covers the `location.href='…'` and `window.open('…')`
//! shapes common on board sites.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context as _;
use regex::Regex;

use super::dom::{Document, Node};
use super::{ElementHandle, PageAutomation, Query, WindowHandle};
use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::strategy::filename::{content_disposition_filename, normalize_filename};

const PARTIAL_SUFFIX: &str = ".crdownload";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

static WINDOW_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.open\(\s*["']([^"']+)["']"#).expect("window.open regex")
});
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("quoted literal regex"));

/// Canned response served instead of the network.
#[derive(Debug, Clone)]
pub struct Fixture {
    content_type: String,
    content_disposition: Option<String>,
    body: Vec<u8>,
}

impl Fixture {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/html; charset=utf-8".to_string(),
            content_disposition: None,
            body: body.into().into_bytes(),
        }
    }

    pub fn bytes(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.to_string(),
            content_disposition: None,
            body: body.into(),
        }
    }

    pub fn with_disposition(mut self, value: &str) -> Self {
        self.content_disposition = Some(value.to_string());
        self
    }
}

struct Fetched {
    url: String,
    content_type: String,
    content_disposition: Option<String>,
    body: Vec<u8>,
}

impl Fetched {
    fn is_html(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        if ct.contains("html") {
            return true;
        }
        ct.is_empty() && self.body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<')
    }
}

struct Window {
    handle: WindowHandle,
    url: String,
    doc: Document,
    generation: u64,
}

enum ScriptTarget {
    SameWindow(String),
    NewWindow(String),
}

pub struct StaticHtmlDriver {
    client: Option<reqwest::blocking::Client>,
    user_agent: String,
    timeout: Duration,
    download_dir: PathBuf,
    fixtures: HashMap<String, Fixture>,
    windows: Vec<Window>,
    current: usize,
    next_window: u64,
    next_generation: u64,
}

impl StaticHtmlDriver {
    pub fn new(config: &ScraperConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.download_dir).with_context(|| {
            format!("create download dir: {}", config.download_dir.display())
        })?;
        let mut driver = Self::blank(config.download_dir.clone());
        driver.user_agent = config.user_agent.clone();
        driver.timeout = config.timeouts.page_load();
        driver.client = Some(build_client(&driver.user_agent, driver.timeout)?);
        Ok(driver)
    }

    /// In-memory page, for fixtures. Network access is set up on first use.
    pub fn from_html(url: &str, html: &str) -> Self {
        let mut driver = Self::blank(std::env::temp_dir());
        let generation = driver.bump_generation();
        driver.windows[0].url = url.to_string();
        driver.windows[0].doc = Document::parse(html);
        driver.windows[0].generation = generation;
        driver
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_fixture(mut self, url: &str, fixture: Fixture) -> Self {
        self.fixtures.insert(fixture_key(url), fixture);
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn blank(download_dir: PathBuf) -> Self {
        Self {
            client: None,
            user_agent: concat!("boardpdf/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: DEFAULT_TIMEOUT,
            download_dir,
            fixtures: HashMap::new(),
            windows: vec![Window {
                handle: WindowHandle(0),
                url: "about:blank".to_string(),
                doc: Document::default(),
                generation: 0,
            }],
            current: 0,
            next_window: 1,
            next_generation: 1,
        }
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn window(&self) -> &Window {
        &self.windows[self.current]
    }

    fn node(&self, element: &ElementHandle) -> anyhow::Result<&Node> {
        let window = self.window();
        if element.generation != window.generation {
            return Err(ScrapeError::StaleElement.into());
        }
        window
            .doc
            .node(element.node)
            .ok_or_else(|| ScrapeError::StaleElement.into())
    }

    fn handle(&self, node: usize) -> ElementHandle {
        ElementHandle {
            generation: self.window().generation,
            node,
        }
    }

    fn resolve(&self, href: &str) -> anyhow::Result<String> {
        let base = url::Url::parse(&self.window().url)
            .with_context(|| format!("current url is not absolute: {}", self.window().url))?;
        let joined = base
            .join(href.trim())
            .with_context(|| format!("resolve {href} against {base}"))?;
        Ok(joined.to_string())
    }

    fn fetch(&mut self, url: &str) -> anyhow::Result<Fetched> {
        if let Some(fixture) = self.fixtures.get(&fixture_key(url)) {
            return Ok(Fetched {
                url: url.to_string(),
                content_type: fixture.content_type.clone(),
                content_disposition: fixture.content_disposition.clone(),
                body: fixture.body.clone(),
            });
        }

        if self.client.is_none() {
            self.client = Some(build_client(&self.user_agent, self.timeout)?);
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("http client unavailable"))?;

        tracing::debug!(url, "fetch");
        let response = client
            .get(url)
            .send()
            .map_err(|err| ScrapeError::navigation(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::navigation(url, format!("http status {status}")).into());
        }
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE).unwrap_or_default();
        let content_disposition = header(reqwest::header::CONTENT_DISPOSITION);
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .map_err(|err| ScrapeError::navigation(url, err))?
            .to_vec();
        Ok(Fetched {
            url: final_url,
            content_type,
            content_disposition,
            body,
        })
    }

    fn load(&mut self, window: usize, fetched: Fetched) {
        let generation = self.bump_generation();
        let html = String::from_utf8_lossy(&fetched.body);
        let target = &mut self.windows[window];
        target.doc = Document::parse(&html);
        target.url = fetched.url;
        target.generation = generation;
    }

    fn open_window(&mut self, fetched: Fetched) -> WindowHandle {
        let handle = WindowHandle(self.next_window);
        self.next_window += 1;
        self.windows.push(Window {
            handle,
            url: String::new(),
            doc: Document::default(),
            generation: 0,
        });
        let index = self.windows.len() - 1;
        self.load(index, fetched);
        handle
    }

    /// Saves a non-HTML response the way a browser download would: a partial
    /// file first, renamed once complete.
    fn save_download(&self, fetched: &Fetched) -> anyhow::Result<PathBuf> {
        let name = fetched
            .content_disposition
            .as_deref()
            .and_then(content_disposition_filename)
            .or_else(|| filename_from_url(&fetched.url))
            .unwrap_or_else(|| "download".to_string());
        let name = normalize_filename(&name, 150);

        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!("create download dir: {}", self.download_dir.display())
        })?;
        let target = unique_path(&self.download_dir, &name);
        let mut partial = target.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        std::fs::write(&partial, &fetched.body)
            .with_context(|| format!("write download: {}", partial.display()))?;
        std::fs::rename(&partial, &target)
            .with_context(|| format!("finish download: {}", target.display()))?;
        tracing::debug!(path = %target.display(), bytes = fetched.body.len(), "saved download");
        Ok(target)
    }

    fn follow(&mut self, url: &str, new_window: bool) -> anyhow::Result<()> {
        let fetched = self.fetch(url)?;
        if !fetched.is_html() {
            self.save_download(&fetched)?;
            return Ok(());
        }
        if new_window {
            self.open_window(fetched);
        } else {
            self.load(self.current, fetched);
        }
        Ok(())
    }

    fn activate(&mut self, element: &ElementHandle, force: bool) -> anyhow::Result<()> {
        if !force && !self.is_interactable(element)? {
            return Err(ScrapeError::Interaction("element is not interactable".to_string()).into());
        }
        let node = self.node(element)?;
        let href = node.attr("href").map(str::trim).map(str::to_string);
        let onclick = node.attr("onclick").map(str::to_string);
        let blank_target = node
            .attr("target")
            .is_some_and(|t| t.eq_ignore_ascii_case("_blank"));

        let target = match href.as_deref() {
            Some(h) if h.to_ascii_lowercase().starts_with("javascript:") => {
                script_target(&h["javascript:".len()..])
            }
            Some(h) if !h.is_empty() && !h.starts_with('#') => Some(if blank_target {
                ScriptTarget::NewWindow(h.to_string())
            } else {
                ScriptTarget::SameWindow(h.to_string())
            }),
            _ => None,
        }
        .or_else(|| onclick.as_deref().and_then(script_target));

        let (raw, new_window) = match target {
            Some(ScriptTarget::SameWindow(raw)) => (raw, false),
            Some(ScriptTarget::NewWindow(raw)) => (raw, true),
            None => return Ok(()),
        };
        let url = self.resolve(&raw)?;
        self.follow(&url, new_window)
            .map_err(|err| ScrapeError::Interaction(format!("{err:#}")).into())
    }

    fn hidden(node: &Node) -> bool {
        let style = node
            .attr("style")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .replace(' ', "");
        node.attr("hidden").is_some()
            || style.contains("display:none")
            || style.contains("visibility:hidden")
            || (node.tag == "input"
                && node
                    .attr("type")
                    .is_some_and(|t| t.eq_ignore_ascii_case("hidden")))
    }
}

impl PageAutomation for StaticHtmlDriver {
    fn find(&self, query: &Query) -> anyhow::Result<Vec<ElementHandle>> {
        let scope = match &query.scope {
            Some(scope) => {
                self.node(scope)?;
                Some(scope.node)
            }
            None => None,
        };
        let doc = &self.window().doc;
        let found = doc
            .descendants(scope)
            .filter(|&id| {
                doc.node(id).is_some_and(|node| {
                    (query.tags.is_empty() || query.tags.iter().any(|t| *t == node.tag))
                        && query
                            .with_attr
                            .as_deref()
                            .is_none_or(|name| node.attr(name).is_some())
                })
            })
            .map(|id| self.handle(id))
            .collect();
        Ok(found)
    }

    fn attr(&self, element: &ElementHandle, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.node(element)?.attr(name).map(str::to_string))
    }

    fn text(&self, element: &ElementHandle) -> anyhow::Result<String> {
        Ok(self.node(element)?.text.clone())
    }

    fn own_text(&self, element: &ElementHandle) -> anyhow::Result<String> {
        Ok(self.node(element)?.own_text.clone())
    }

    fn tag(&self, element: &ElementHandle) -> anyhow::Result<String> {
        Ok(self.node(element)?.tag.clone())
    }

    fn parent(&self, element: &ElementHandle) -> anyhow::Result<Option<ElementHandle>> {
        Ok(self.node(element)?.parent.map(|id| self.handle(id)))
    }

    fn children(&self, element: &ElementHandle) -> anyhow::Result<Vec<ElementHandle>> {
        Ok(self
            .node(element)?
            .children
            .iter()
            .map(|&id| self.handle(id))
            .collect())
    }

    fn is_interactable(&self, element: &ElementHandle) -> anyhow::Result<bool> {
        let node = self.node(element)?;
        if node.attr("disabled").is_some() || Self::hidden(node) {
            return Ok(false);
        }
        let doc = &self.window().doc;
        Ok(!doc
            .ancestors(element.node)
            .filter_map(|id| doc.node(id))
            .any(Self::hidden))
    }

    fn offset_top(&self, element: &ElementHandle) -> anyhow::Result<Option<f64>> {
        self.node(element)?;
        Ok(None)
    }

    fn click(&mut self, element: &ElementHandle) -> anyhow::Result<()> {
        self.activate(element, false)
    }

    fn force_click(&mut self, element: &ElementHandle) -> anyhow::Result<()> {
        self.activate(element, true)
    }

    fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        let fetched = self.fetch(url)?;
        if fetched.is_html() {
            self.load(self.current, fetched);
        } else {
            self.save_download(&fetched)?;
        }
        Ok(())
    }

    fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.window().url.clone())
    }

    fn wait_stable(&mut self, _timeout: Duration) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn open_in_background(&mut self, url: &str) -> anyhow::Result<()> {
        let url = self.resolve(url)?;
        self.follow(&url, true)
    }

    fn windows(&self) -> anyhow::Result<Vec<WindowHandle>> {
        Ok(self.windows.iter().map(|w| w.handle).collect())
    }

    fn current_window(&self) -> anyhow::Result<WindowHandle> {
        Ok(self.window().handle)
    }

    fn switch_to(&mut self, window: &WindowHandle) -> anyhow::Result<()> {
        self.current = self
            .windows
            .iter()
            .position(|w| w.handle == *window)
            .ok_or_else(|| anyhow::anyhow!("no such window: {}", window.0))?;
        Ok(())
    }

    fn close_window(&mut self, window: &WindowHandle) -> anyhow::Result<()> {
        let index = self
            .windows
            .iter()
            .position(|w| w.handle == *window)
            .ok_or_else(|| anyhow::anyhow!("no such window: {}", window.0))?;
        if self.windows.len() == 1 {
            anyhow::bail!("refusing to close the last window");
        }
        self.windows.remove(index);
        if index == self.current {
            self.current = 0;
        } else if index < self.current {
            self.current -= 1;
        }
        Ok(())
    }
}

fn build_client(user_agent: &str, timeout: Duration) -> anyhow::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .context("build http client")
}

fn fixture_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn script_target(script: &str) -> Option<ScriptTarget> {
    if let Some(caps) = WINDOW_OPEN.captures(script) {
        return Some(ScriptTarget::NewWindow(caps[1].to_string()));
    }
    QUOTED
        .captures_iter(script)
        .map(|caps| caps[1].to_string())
        .find(|literal| looks_like_url(literal))
        .map(ScriptTarget::SameWindow)
}

fn looks_like_url(literal: &str) -> bool {
    !literal.chars().any(char::is_whitespace)
        && literal.contains(['/', '.', '?'])
        && !literal.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn filename_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string()),
    )
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
