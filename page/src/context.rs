//! Page context sent alongside a question.
//!
//! [`PageContext::extract`] pulls the readable main content out of the page,
//! plus a few structural hints, for both the local responder and the remote
//! prompt.

use std::sync::LazyLock;

use ego_tree::NodeRef;
use scraper::{ElementRef, Node, Selector};
use serde::Serialize;

use crate::document::{Page, collapse_whitespace, element_text};

/// Upper bound on extracted main content, in characters.
pub const MAX_MAIN_CONTENT_CHARS: usize = 5000;

/// Upper bound on the excerpt embedded in a remote prompt, in characters.
pub const MAX_EXCERPT_CHARS: usize = 1000;

const SAMPLE_ROWS: usize = 5;

/// Tried in order; the first selector with a match is the content root.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    r#"[role="main"]"#,
    ".content",
    "#content",
    ".main",
    "#main",
    ".post",
    ".entry",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

static MAIN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("main").expect("valid selector"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));
static MAJOR_HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid selector"));
static TABLES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static CAPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("caption").expect("valid selector"));
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static FORMS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid selector"));
static PRODUCTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("product").expect("valid selector"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingOutline {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSample {
    pub caption: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub title: String,
    pub url: String,
    pub meta_description: String,
    pub headings: Vec<HeadingOutline>,
    pub main_content: String,
    /// Present only when the query mentions tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableSample>>,
}

impl PageContext {
    #[must_use]
    pub fn extract(page: &Page, query: &str) -> Self {
        let headings = page
            .select(&MAJOR_HEADINGS)
            .map(|heading| HeadingOutline {
                level: heading
                    .value()
                    .name()
                    .strip_prefix('h')
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(1),
                text: element_text(heading),
            })
            .collect();

        let main_content = content_root(page)
            .map(|root| {
                let mut raw = String::new();
                collect_text(*root, &mut raw);
                truncate_chars(&collapse_whitespace(&raw), MAX_MAIN_CONTENT_CHARS)
            })
            .unwrap_or_default();

        let tables = query
            .to_lowercase()
            .contains("table")
            .then(|| sample_tables(page));

        Self {
            title: page.title(),
            url: page.url().to_string(),
            meta_description: page.meta_description(),
            headings,
            main_content,
            tables,
        }
    }

    /// Leading slice of the main content used in the remote prompt.
    #[must_use]
    pub fn excerpt(&self) -> String {
        truncate_chars(&self.main_content, MAX_EXCERPT_CHARS)
    }
}

fn content_root(page: &Page) -> Option<ElementRef<'_>> {
    for css in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(found) = page.select(&selector).next() {
            return Some(found);
        }
    }
    page.select(&MAIN)
        .next()
        .or_else(|| page.select(&BODY).next())
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if SKIPPED_TAGS.contains(&element.name()) => {}
            Node::Element(_) => collect_text(child, out),
            _ => {}
        }
    }
}

fn sample_tables(page: &Page) -> Vec<TableSample> {
    page.select(&TABLES)
        .enumerate()
        .map(|(index, table)| TableSample {
            caption: table
                .select(&CAPTION)
                .next()
                .map(element_text)
                .filter(|caption| !caption.is_empty())
                .unwrap_or_else(|| format!("Table {}", index + 1)),
            headers: table.select(&TH).map(element_text).collect(),
            rows: table
                .select(&TR)
                .take(SAMPLE_ROWS)
                .map(|row| row.select(&TD).map(element_text).collect())
                .collect(),
        })
        .collect()
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Coarse page category used in the page-identity answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Wikipedia,
    News,
    Blog,
    Form,
    Shopping,
    Informational,
}

impl PageType {
    /// Checks, in order: encyclopedia host, news, blog, forms, shopping
    /// markers; anything else is informational.
    #[must_use]
    pub fn detect(page: &Page) -> Self {
        let title = page.title().to_lowercase();
        let url = page.url().as_str().to_lowercase();

        if url.contains("wikipedia.org") {
            Self::Wikipedia
        } else if title.contains("news") || url.contains("news") {
            Self::News
        } else if url.contains("blog") || title.contains("blog") {
            Self::Blog
        } else if page.count(&FORMS) > 0 {
            Self::Form
        } else if page.count(&PRODUCTS) > 0 || url.contains("shop") || url.contains("store") {
            Self::Shopping
        } else {
            Self::Informational
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Wikipedia => "Wikipedia article",
            Self::News => "news",
            Self::Blog => "blog",
            Self::Form => "form or application",
            Self::Shopping => "shopping or product",
            Self::Informational => "informational",
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
