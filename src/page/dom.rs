//! Arena DOM built from a parsed HTML document.
//!
//! Nodes are stored in document (pre-)order, so the descendants of node `i`
//! are exactly the ids in `i + 1..nodes[i].end`.

use scraper::{ElementRef, Html};

/// Elements whose text is separated from their neighbours when rendered.
const BLOCK_TAGS: &[&str] = &[
    "br", "div", "dd", "dt", "h1", "h2", "h3", "h4", "h5", "h6", "li", "p", "section", "table",
    "tbody", "td", "th", "thead", "tr", "ul", "ol",
];

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Exclusive end of this node's subtree.
    pub end: usize,
    pub text: String,
    pub own_text: String,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Self::default();
        doc.push(parsed.root_element(), None);
        doc
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids under `scope` (or the whole document), in document order.
    pub fn descendants(&self, scope: Option<usize>) -> std::ops::Range<usize> {
        match scope.and_then(|id| self.nodes.get(id).map(|n| (id, n))) {
            Some((id, node)) => id + 1..node.end,
            None => 0..self.nodes.len(),
        }
    }

    pub fn ancestors(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes.get(id).and_then(|n| n.parent), move |p| {
            self.nodes.get(*p).and_then(|n| n.parent)
        })
    }

    /// Appends `element` and its subtree; returns the element's rendered text.
    fn push(&mut self, element: ElementRef<'_>, parent: Option<usize>) -> String {
        let id = self.nodes.len();
        let tag = element.value().name().to_ascii_lowercase();
        let attrs = element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        self.nodes.push(Node {
            tag: tag.clone(),
            attrs,
            parent,
            children: Vec::new(),
            end: id + 1,
            text: String::new(),
            own_text: String::new(),
        });

        let mut text = String::new();
        let mut own_text = String::new();
        for child in element.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                let child_id = self.nodes.len();
                self.nodes[id].children.push(child_id);
                let block = BLOCK_TAGS.contains(&child_el.value().name());
                let child_text = self.push(child_el, Some(id));
                if block {
                    text.push(' ');
                }
                text.push_str(&child_text);
                if block {
                    text.push(' ');
                }
            } else if let Some(t) = child.value().as_text() {
                text.push_str(t);
                own_text.push_str(t);
            }
        }

        let end = self.nodes.len();
        let node = &mut self.nodes[id];
        node.end = end;
        if matches!(tag.as_str(), "script" | "style" | "noscript" | "template") {
            return String::new();
        }
        node.text = collapse_whitespace(&text);
        node.own_text = collapse_whitespace(&own_text);
        node.text.clone()
    }
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
