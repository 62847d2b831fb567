//! Live document model.
//!
//! A [`Page`] owns the parsed HTML tree plus the bits of browser state the
//! assistant touches: the page URL and per-element inline outline styles.
//! Elements are addressed by [`ElementHandle`], a non-owning node id. A handle
//! outlives the node it points at: after [`Page::remove`] the node is detached
//! from the tree but the id stays valid, so every accessor checks attachment
//! and refuses to act on a detached node.

use std::collections::HashMap;
use std::sync::LazyLock;

use ego_tree::{NodeId, NodeMut, NodeRef};
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use url::Url;

pub(crate) static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
pub(crate) static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));

/// Non-owning reference to a document element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(NodeId);

impl ElementHandle {
    pub(crate) fn of(element: ElementRef<'_>) -> Self {
        Self(element.id())
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("element is no longer attached to the document")]
    Detached,
    #[error("element handle does not belong to this document")]
    Unknown,
}

/// The three inline style properties the highlighter saves and restores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineStyle {
    pub outline: String,
    pub outline_offset: String,
    pub transition: String,
}

impl OutlineStyle {
    /// Pull the outline properties out of an inline `style` attribute.
    fn from_inline(style: &str) -> Self {
        let mut parsed = Self::default();
        for declaration in style.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match property.trim().to_ascii_lowercase().as_str() {
                "outline" => parsed.outline = value,
                "outline-offset" => parsed.outline_offset = value,
                "transition" => parsed.transition = value,
                _ => {}
            }
        }
        parsed
    }
}

#[derive(Debug)]
pub struct Page {
    html: Html,
    url: Url,
    styles: HashMap<NodeId, OutlineStyle>,
}

impl Page {
    #[must_use]
    pub fn parse(html: &str, url: Url) -> Self {
        let html = html.strip_prefix('\u{FEFF}').unwrap_or(html);
        Self {
            html: Html::parse_document(html),
            url,
            styles: HashMap::new(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `document.title`: the first `<title>`, whitespace-collapsed.
    #[must_use]
    pub fn title(&self) -> String {
        self.select(&TITLE)
            .next()
            .map(|title| collapse_whitespace(&title.text().collect::<String>()))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn meta_description(&self) -> String {
        self.select(&META_DESCRIPTION)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .unwrap_or_default()
            .to_string()
    }

    /// All attached elements matching `selector`, in document order.
    ///
    /// Walks the tree from the root rather than the node arena, so detached
    /// nodes are skipped and appended nodes appear where they were inserted.
    pub fn select<'a, 'b>(
        &'a self,
        selector: &'b Selector,
    ) -> impl Iterator<Item = ElementRef<'a>> + use<'a, 'b> {
        self.html.root_element().select(selector)
    }

    #[must_use]
    pub fn count(&self, selector: &Selector) -> usize {
        self.select(selector).count()
    }

    #[must_use]
    pub fn count_css(&self, css: &str) -> usize {
        match Selector::parse(css) {
            Ok(selector) => self.count(&selector),
            Err(e) => {
                tracing::warn!(css, "Invalid selector: {e}");
                0
            }
        }
    }

    /// First element matching `selector`, in document order.
    #[must_use]
    pub fn first(&self, selector: &Selector) -> Option<ElementHandle> {
        self.select(selector).next().map(ElementHandle::of)
    }

    /// First anchor, in document order, whose visible text contains `fragment`
    /// (case-insensitive).
    #[must_use]
    pub fn find_link(&self, fragment: &str) -> Option<ElementHandle> {
        let needle = fragment.to_lowercase();
        self.select(&ANCHORS)
            .find(|anchor| element_text(*anchor).to_lowercase().contains(&needle))
            .map(ElementHandle::of)
    }

    #[must_use]
    pub fn is_attached(&self, handle: ElementHandle) -> bool {
        let root = self.html.tree.root().id();
        match self.html.tree.get(handle.0) {
            Some(node) => node.id() == root || node.ancestors().any(|a| a.id() == root),
            None => false,
        }
    }

    /// Resolve a handle to a live element.
    pub fn element(&self, handle: ElementHandle) -> Result<ElementRef<'_>, DocumentError> {
        let node = self.html.tree.get(handle.0).ok_or(DocumentError::Unknown)?;
        if !self.is_attached(handle) {
            return Err(DocumentError::Detached);
        }
        ElementRef::wrap(node).ok_or(DocumentError::Unknown)
    }

    /// Current inline outline style of an element.
    pub fn outline_style(&self, handle: ElementHandle) -> Result<OutlineStyle, DocumentError> {
        let element = self.element(handle)?;
        if let Some(style) = self.styles.get(&handle.0) {
            return Ok(style.clone());
        }
        Ok(element
            .value()
            .attr("style")
            .map(OutlineStyle::from_inline)
            .unwrap_or_default())
    }

    pub fn set_outline_style(
        &mut self,
        handle: ElementHandle,
        style: OutlineStyle,
    ) -> Result<(), DocumentError> {
        self.element(handle)?;
        self.styles.insert(handle.0, style);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Detach an element (and its subtree) from the document.
    pub fn remove(&mut self, handle: ElementHandle) -> Result<(), DocumentError> {
        self.element(handle)?;
        if handle.0 == self.html.tree.root().id() {
            return Err(DocumentError::Unknown);
        }
        let subtree: Vec<NodeId> = self
            .html
            .tree
            .get(handle.0)
            .map(|node| node.descendants().map(|d| d.id()).collect())
            .unwrap_or_default();
        if let Some(mut node) = self.html.tree.get_mut(handle.0) {
            node.detach();
        }
        for id in subtree {
            self.styles.remove(&id);
        }
        Ok(())
    }

    /// Parse `fragment` and append its nodes as the last children of `parent`.
    pub fn append_html(
        &mut self,
        parent: ElementHandle,
        fragment: &str,
    ) -> Result<(), DocumentError> {
        self.element(parent)?;
        let parsed = Html::parse_fragment(fragment);
        let root = parsed.tree.root();
        // Fragments parse under a synthetic <html> element.
        let source = root
            .children()
            .find(|child| matches!(child.value(), Node::Element(el) if el.name() == "html"))
            .unwrap_or(root);

        let Some(mut target) = self.html.tree.get_mut(parent.0) else {
            return Err(DocumentError::Unknown);
        };
        copy_children(&mut target, source);
        Ok(())
    }

    /// Body element, if the document has one.
    #[must_use]
    pub fn body(&self) -> Option<ElementHandle> {
        static BODY: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("body").expect("valid selector"));
        self.select(&BODY).next().map(ElementHandle::of)
    }
}

fn copy_children(target: &mut NodeMut<'_, Node>, source: NodeRef<'_, Node>) {
    for child in source.children() {
        let mut copied = target.append(child.value().clone());
        copy_children(&mut copied, child);
    }
}

/// `textContent` of an element, trimmed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
