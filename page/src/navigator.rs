//! Spoken navigation commands.
//!
//! Resolution is a two-step affair: [`NavigationQuery::parse`] turns the raw
//! utterance into a category plus target, then [`Navigator::resolve`] matches
//! it against the current [`PageSummary`] (links are matched against the live
//! document, the summary does not index them). [`Navigator::navigate`] adds the
//! side effects: scroll, temporary highlight, spoken confirmation.

use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use scraper::Selector;
use thiserror::Error;

use crate::document::{DocumentError, ElementHandle, Page, element_text};
use crate::highlight::Highlighter;
use crate::index::PageSummary;

/// Spoken when nothing on the page matches.
pub const NOT_FOUND_MESSAGE: &str = "I couldn't find what you're looking for on this page.";

const START_KEYWORDS: &[&str] = &["to", "the"];

static HEADING_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"h([0-9])|heading ([0-9])|section ([0-9])").expect("valid regex"));
static TABLE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)table\s*([0-9]+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Heading,
    Table,
    Link,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `h2`, `heading 2`, `section 2`.
    Level(u8),
    /// 0-based position converted from a spoken 1-based number.
    Index(usize),
    /// A spoken number that cannot name any element ("table 0").
    InvalidIndex,
    /// Free text to match against element text.
    Text(String),
    /// Category only; resolves to the category default where one exists.
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationQuery {
    pub category: Category,
    pub target: Target,
}

impl NavigationQuery {
    /// Parse an utterance. Domain keywords are checked in a fixed order
    /// (heading/section, table, link, image/picture) and only the first
    /// matching domain is considered.
    #[must_use]
    pub fn parse(utterance: &str) -> Option<Self> {
        let query = utterance.to_lowercase();

        if query.contains("heading") || query.contains("section") {
            let target = match HEADING_LEVEL.captures(&query) {
                Some(caps) => caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .and_then(|digit| digit.as_str().parse().ok())
                    .map_or(Target::Unspecified, Target::Level),
                None => free_text(&query, &["heading", "section"]),
            };
            return Some(Self {
                category: Category::Heading,
                target,
            });
        }

        if query.contains("table") {
            let target = match TABLE_NUMBER.captures(&query) {
                Some(caps) => caps
                    .get(1)
                    .and_then(|n| n.as_str().parse::<usize>().ok())
                    .and_then(|n| n.checked_sub(1))
                    .map_or(Target::InvalidIndex, Target::Index),
                None => free_text(&query, &["table"]),
            };
            return Some(Self {
                category: Category::Table,
                target,
            });
        }

        if query.contains("link") {
            return Some(Self {
                category: Category::Link,
                target: free_text(&query, &["link"]),
            });
        }

        if query.contains("image") || query.contains("picture") {
            return Some(Self {
                category: Category::Image,
                target: free_text(&query, &["image", "picture"]),
            });
        }

        None
    }
}

fn free_text(query: &str, end_keywords: &[&str]) -> Target {
    extract_text_between(query, START_KEYWORDS, end_keywords).map_or(Target::Unspecified, Target::Text)
}

/// Text between the rightmost start keyword and the leftmost end keyword.
///
/// Each keyword contributes its first occurrence. The start boundary is the
/// largest end offset among the start keywords (0 if none occur); the end
/// boundary is the smallest start offset among the end keywords (text length
/// if none occur). Boundaries that cross are swapped. Returns `None` when the
/// trimmed result is empty.
#[must_use]
pub fn extract_text_between(text: &str, starts: &[&str], ends: &[&str]) -> Option<String> {
    let text = text.to_lowercase();

    let start = starts
        .iter()
        .filter_map(|keyword| text.find(keyword).map(|at| at + keyword.len()))
        .max()
        .unwrap_or(0);
    let end = ends
        .iter()
        .filter_map(|keyword| text.find(keyword))
        .min()
        .unwrap_or(text.len());

    let (from, to) = if start <= end { (start, end) } else { (end, start) };
    let extracted = text[from..to].trim();
    (!extracted.is_empty()).then(|| extracted.to_string())
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("not a navigation command")]
    NotACommand,
    #[error("no matching element on the page")]
    NotFound,
    #[error("the matching element was removed from the page")]
    Detached,
}

impl From<DocumentError> for NavigationError {
    fn from(_: DocumentError) -> Self {
        NavigationError::Detached
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub category: Category,
    pub element: ElementHandle,
}

/// Host viewport seam.
pub trait Viewport {
    /// Scroll `element` into view, centered vertically, with smooth behavior.
    fn scroll_to_center(&mut self, page: &Page, element: ElementHandle);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Navigator;

impl Navigator {
    pub fn resolve(
        &self,
        query: &NavigationQuery,
        summary: &PageSummary,
        page: &Page,
    ) -> Result<Resolved, NavigationError> {
        let element = match (query.category, &query.target) {
            (Category::Heading, Target::Level(level)) => summary
                .headings
                .iter()
                .find(|heading| heading.level == *level)
                .map(|heading| heading.element),
            (Category::Heading, Target::Text(fragment)) => summary
                .headings
                .iter()
                .find(|heading| contains_ci(&heading.text, fragment))
                .map(|heading| heading.element),
            (Category::Heading, _) => None,

            (Category::Table, Target::Index(index)) => {
                summary.tables.get(*index).map(|table| table.element)
            }
            (Category::Table, Target::Text(fragment)) => summary
                .tables
                .iter()
                .find(|table| {
                    table
                        .caption
                        .as_deref()
                        .is_some_and(|caption| contains_ci(caption, fragment))
                        || table
                            .header_labels
                            .iter()
                            .any(|label| contains_ci(label, fragment))
                })
                .map(|table| table.element),
            (Category::Table, Target::Unspecified) => {
                summary.tables.first().map(|table| table.element)
            }
            (Category::Table, _) => None,

            (Category::Link, Target::Text(fragment)) => page.find_link(fragment),
            (Category::Link, _) => None,

            (Category::Image, Target::Text(fragment)) => summary
                .images
                .iter()
                .find(|image| {
                    image
                        .alt_text
                        .as_deref()
                        .is_some_and(|alt| contains_ci(alt, fragment))
                })
                .map(|image| image.element),
            (Category::Image, Target::Unspecified) => {
                summary.images.first().map(|image| image.element)
            }
            (Category::Image, _) => None,
        };

        let element = element.ok_or(NavigationError::NotFound)?;
        if !page.is_attached(element) {
            tracing::debug!(category = ?query.category, "Resolved element is stale");
            return Err(NavigationError::Detached);
        }

        Ok(Resolved {
            category: query.category,
            element,
        })
    }

    /// Resolve an utterance, scroll to and highlight the target, and return the
    /// spoken confirmation.
    pub fn navigate(
        &self,
        utterance: &str,
        summary: &PageSummary,
        page: &mut Page,
        viewport: &mut dyn Viewport,
        highlighter: &mut Highlighter,
        now: Instant,
    ) -> Result<String, NavigationError> {
        let query = NavigationQuery::parse(utterance).ok_or(NavigationError::NotACommand)?;
        let resolved = self.resolve(&query, summary, page)?;

        let description = describe(page, resolved.element)?;
        viewport.scroll_to_center(page, resolved.element);
        highlighter.highlight(page, resolved.element, now)?;

        tracing::info!(category = ?resolved.category, %description, "Navigated");
        Ok(format!("Navigated to {description}"))
    }
}

/// Spoken description of an element, keyed by its tag.
pub fn describe(page: &Page, element: ElementHandle) -> Result<String, NavigationError> {
    static CAPTION: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("caption").expect("valid selector"));
    static ROWS: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tr").expect("valid selector"));

    let element = page.element(element)?;
    let tag = element.value().name();
    let description = match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => format!("heading \"{}\"", element_text(element)),
        "table" => match element.select(&CAPTION).next() {
            Some(caption) => format!("table \"{}\"", element_text(caption)),
            None => format!("table with {} rows", element.select(&ROWS).count()),
        },
        "a" => format!("link \"{}\"", element_text(element)),
        "img" => match element.value().attr("alt").filter(|alt| !alt.is_empty()) {
            Some(alt) => format!("image with description \"{alt}\""),
            None => "image".to_string(),
        },
        other => other.to_string(),
    };
    Ok(description)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
