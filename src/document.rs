//! Mutable HTML document model.
//!
//! A thin layer over `kuchikikiki`, which parses with the HTML5 tree builder:
//! unbalanced tags, stray end tags and missing `<html>`/`<head>`/`<body>` are
//! repaired the way a browser would, so crawled pages never fail to parse.
//! The only inputs rejected here are ones that are not text at all.
//!
//! Node handles are reference counted and not `Send`; a [`Document`] lives
//! and dies on the worker thread that parsed it.

use kuchikikiki::traits::*;
use kuchikikiki::{ElementData, NodeDataRef, NodeRef};

use crate::datasets::strip_extension;
use crate::error::{MalformedMarkupError, StageError};

/// Element handle returned by selections.
pub type Element = NodeDataRef<ElementData>;

/// One parsed HTML file.
pub struct Document {
    path: String,
    root: NodeRef,
}

impl Document {
    /// Parse raw bytes of a crawled page.
    pub fn parse(path: &str, raw: &[u8]) -> Result<Self, MalformedMarkupError> {
        let text = std::str::from_utf8(raw).map_err(|e| MalformedMarkupError::NotUtf8 {
            offset: e.valid_up_to(),
        })?;
        Self::parse_str(path, text)
    }

    pub fn parse_str(path: &str, text: &str) -> Result<Self, MalformedMarkupError> {
        if text.trim().is_empty() {
            return Err(MalformedMarkupError::Empty);
        }
        Ok(Self {
            path: path.to_string(),
            root: kuchikikiki::parse_html().one(text),
        })
    }

    /// Relative path inside the mirror, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Page identifier used to join against datasets: the file stem.
    pub fn page_id(&self) -> &str {
        let file = self.path.rsplit('/').next().unwrap_or(&self.path);
        strip_extension(file)
    }

    /// Prefix that turns a mirror-root-relative path into one relative to
    /// this page (`works/7.html` → `../`).
    pub fn root_prefix(&self) -> String {
        "../".repeat(self.path.matches('/').count())
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// All elements matching a CSS selector, in document order.
    pub fn select(&self, selector: &str) -> Result<Vec<Element>, StageError> {
        select_in(&self.root, selector)
    }

    pub fn select_first(&self, selector: &str) -> Result<Option<Element>, StageError> {
        Ok(self.select(selector)?.into_iter().next())
    }

    pub fn exists(&self, selector: &str) -> Result<bool, StageError> {
        Ok(self.select_first(selector)?.is_some())
    }

    /// Detach every element matching `selector`; returns how many.
    pub fn remove(&self, selector: &str) -> Result<usize, StageError> {
        let matches = self.select(selector)?;
        for el in &matches {
            el.as_node().detach();
        }
        Ok(matches.len())
    }

    pub fn head(&self) -> Result<NodeRef, StageError> {
        self.select_first("head")?
            .map(|h| h.as_node().clone())
            .ok_or_else(|| StageError::fatal("document has no <head>"))
    }

    pub fn body(&self) -> Result<NodeRef, StageError> {
        self.select_first("body")?
            .map(|b| b.as_node().clone())
            .ok_or_else(|| StageError::fatal("document has no <body>"))
    }

    /// Contents of `<title>`, whitespace-normalized.
    pub fn title(&self) -> Option<String> {
        let title = self.root.select_first("title").ok()?;
        let text = normalize_whitespace(&title.as_node().text_contents());
        (!text.is_empty()).then_some(text)
    }

    /// Visible body text, whitespace-normalized. Script and style content
    /// is skipped, as is chrome inserted by the stages (theme toggle,
    /// archive note, age annotation).
    pub fn text(&self) -> String {
        let Ok(body) = self.body() else {
            return String::new();
        };
        let mut out = String::new();
        for text in body.inclusive_descendants().text_nodes() {
            if text.as_node().ancestors().any(|a| is_non_text_element(&a)) {
                continue;
            }
            out.push_str(&text.borrow());
            out.push(' ');
        }
        normalize_whitespace(&out)
    }

    /// Serialize back to HTML.
    pub fn serialize(&self) -> Result<String, MalformedMarkupError> {
        let mut buf = Vec::new();
        self.root
            .serialize(&mut buf)
            .map_err(|e| MalformedMarkupError::Serialize(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| MalformedMarkupError::Serialize(e.to_string()))
    }

    /// Replace the tree with a previously serialized state of this document.
    pub fn restore(&mut self, snapshot: &str) {
        self.root = kuchikikiki::parse_html().one(snapshot);
    }
}

/// Selection relative to any node.
pub fn select_in(node: &NodeRef, selector: &str) -> Result<Vec<Element>, StageError> {
    node.select(selector)
        .map(|matches| matches.collect())
        .map_err(|()| StageError::recoverable(format!("invalid selector `{}`", selector)))
}

/// Parse an HTML snippet into detached top-level nodes. `<script>` elements
/// are dropped.
pub fn fragment(html: &str) -> Vec<NodeRef> {
    let doc = kuchikikiki::parse_html().one(format!("<body>{}</body>", html));
    if let Ok(scripts) = doc.select("script") {
        let scripts: Vec<Element> = scripts.collect();
        for script in scripts {
            script.as_node().detach();
        }
    }
    let Ok(body) = doc.select_first("body") else {
        return Vec::new();
    };
    let children: Vec<NodeRef> = body.as_node().children().collect();
    for child in &children {
        child.detach();
    }
    children
}

/// Parse `html` as the content of a `<context>` element inside `<body>` and
/// return the resulting top-level nodes, detached. Content the parser pushes
/// out of the context element is returned after it.
pub fn fragment_in(context: &str, html: &str) -> Vec<NodeRef> {
    let doc = kuchikikiki::parse_html().one(format!(
        "<body><{0} data-mirror-context>{1}</{0}></body>",
        context, html
    ));
    let Ok(ctx) = doc.select_first("[data-mirror-context]") else {
        return Vec::new();
    };
    let mut nodes: Vec<NodeRef> = ctx.as_node().children().collect();
    nodes.extend(ctx.as_node().following_siblings());
    for node in &nodes {
        node.detach();
    }
    nodes
}

/// Serialize a node together with its own tag.
pub fn outer_html(node: &NodeRef) -> Result<String, StageError> {
    let mut buf = Vec::new();
    node.serialize(&mut buf)
        .map_err(|e| StageError::recoverable(format!("failed to serialize node: {}", e)))?;
    String::from_utf8(buf).map_err(|e| StageError::recoverable(e.to_string()))
}

/// Parse a snippet expected to contain exactly one element.
pub fn element(html: &str) -> Result<NodeRef, StageError> {
    fragment(html)
        .into_iter()
        .find(|n| n.as_element().is_some())
        .ok_or_else(|| StageError::recoverable(format!("snippet has no element: {}", html)))
}

/// Append a sequence of nodes to `parent`.
pub fn append_all(parent: &NodeRef, nodes: Vec<NodeRef>) {
    for node in nodes {
        parent.append(node);
    }
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get(name).map(str::to_string))
}

pub fn has_attr(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .map(|el| el.attributes.borrow().contains(name))
        .unwrap_or(false)
}

pub fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert(name, value.to_string());
    }
}

pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|el| el.name.local.to_string())
}

/// Replace all children of `node` with a single text node.
pub fn set_text(node: &NodeRef, text: &str) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        child.detach();
    }
    node.append(NodeRef::new_text(text));
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Markers of inserted page chrome that is not part of the page's content.
const CHROME_MARKERS: [&str; 3] = [
    "data-mirror-theme-toggle",
    "data-mirror-archive-note",
    "data-mirror-age",
];

fn is_non_text_element(node: &NodeRef) -> bool {
    let Some(el) = node.as_element() else {
        return false;
    };
    if matches!(&*el.name.local, "script" | "style" | "noscript" | "template") {
        return true;
    }
    let attrs = el.attributes.borrow();
    CHROME_MARKERS.iter().any(|marker| attrs.contains(*marker))
}
