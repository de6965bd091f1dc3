//! Page automation capability the scraper core drives.
//!
//! The core only talks to [`PageAutomation`]; [`StaticHtmlDriver`] is the
//! bundled backend.

use std::time::Duration;

use crate::config::ScraperConfig;

pub mod dom;
pub mod static_driver;

pub use static_driver::StaticHtmlDriver;

/// Reference to an element of the page that was loaded when it was found.
///
/// Handles go stale once the window they came from navigates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub(crate) generation: u64,
    pub(crate) node: usize,
}

impl ElementHandle {
    /// Identifier stable for the lifetime of the page.
    pub fn id(&self) -> String {
        format!("{}:{}", self.generation, self.node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub(crate) u64);

/// Element lookup criteria. Results come back in document order.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Restrict the search to descendants of this element.
    pub scope: Option<ElementHandle>,
    /// Lowercase tag names; empty matches any tag.
    pub tags: Vec<String>,
    /// Only elements carrying this attribute.
    pub with_attr: Option<String>,
}

impl Query {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tags(tags: &[&str]) -> Self {
        Self {
            tags: tags.iter().map(|t| t.to_ascii_lowercase()).collect(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str) -> Self {
        self.with_attr = Some(name.to_ascii_lowercase());
        self
    }

    pub fn within(mut self, scope: &ElementHandle) -> Self {
        self.scope = Some(scope.clone());
        self
    }
}

pub trait PageAutomation {
    fn find(&self, query: &Query) -> anyhow::Result<Vec<ElementHandle>>;
    fn attr(&self, element: &ElementHandle, name: &str) -> anyhow::Result<Option<String>>;
    /// Rendered text of the element and its descendants, whitespace collapsed.
    fn text(&self, element: &ElementHandle) -> anyhow::Result<String>;
    /// Text of the element's direct text nodes only.
    fn own_text(&self, element: &ElementHandle) -> anyhow::Result<String>;
    fn tag(&self, element: &ElementHandle) -> anyhow::Result<String>;
    fn parent(&self, element: &ElementHandle) -> anyhow::Result<Option<ElementHandle>>;
    fn children(&self, element: &ElementHandle) -> anyhow::Result<Vec<ElementHandle>>;
    /// Displayed and enabled.
    fn is_interactable(&self, element: &ElementHandle) -> anyhow::Result<bool>;
    /// Distance from the top of the document, when the backend knows layout.
    fn offset_top(&self, element: &ElementHandle) -> anyhow::Result<Option<f64>>;

    fn click(&mut self, element: &ElementHandle) -> anyhow::Result<()>;
    /// Scripted click that bypasses interactability checks.
    fn force_click(&mut self, element: &ElementHandle) -> anyhow::Result<()>;
    fn navigate(&mut self, url: &str) -> anyhow::Result<()>;
    fn current_url(&self) -> anyhow::Result<String>;
    /// Waits until the page stops changing. Returns `false` on timeout.
    fn wait_stable(&mut self, timeout: Duration) -> anyhow::Result<bool>;
    /// Opens `url` in a new window without focusing it.
    fn open_in_background(&mut self, url: &str) -> anyhow::Result<()>;

    fn windows(&self) -> anyhow::Result<Vec<WindowHandle>>;
    fn current_window(&self) -> anyhow::Result<WindowHandle>;
    fn switch_to(&mut self, window: &WindowHandle) -> anyhow::Result<()>;
    fn close_window(&mut self, window: &WindowHandle) -> anyhow::Result<()>;

    fn window_count(&self) -> anyhow::Result<usize> {
        Ok(self.windows()?.len())
    }
}

/// Creates automation sessions; the orchestrator restarts through this.
pub trait DriverFactory {
    fn launch(&self, config: &ScraperConfig) -> anyhow::Result<Box<dyn PageAutomation>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDriverFactory;

impl DriverFactory for StaticDriverFactory {
    fn launch(&self, config: &ScraperConfig) -> anyhow::Result<Box<dyn PageAutomation>> {
        Ok(Box::new(StaticHtmlDriver::new(config)?))
    }
}

/// Attribute value or the empty string.
pub fn attr_or_empty(page: &dyn PageAutomation, element: &ElementHandle, name: &str) -> String {
    page.attr(element, name).ok().flatten().unwrap_or_default()
}
