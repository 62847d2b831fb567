//! Document model, structural index and spoken navigation.
//!
//! # Architecture
//!
//! - [`Page`] - the live document: parsed HTML, URL, inline outline styles
//! - [`PageIndex`] / [`PageSummary`] - structural digest rebuilt on mutation
//! - [`PageContext`] / [`PageType`] - readable content for answering questions
//! - [`Navigator`] - resolves navigation commands to elements
//! - [`Highlighter`] - temporary outline with scheduled restore
//! - [`Debouncer`] - coalesces mutation bursts into a single rebuild
//!
//! Nothing here spawns tasks or reads the clock; callers pass `now` in. That
//! keeps the whole crate synchronous and deterministic under test.

mod context;
mod debounce;
mod document;
mod highlight;
mod index;
mod navigator;

pub use context::{
    HeadingOutline, MAX_EXCERPT_CHARS, MAX_MAIN_CONTENT_CHARS, PageContext, PageType, TableSample,
};
pub use debounce::Debouncer;
pub use document::{DocumentError, ElementHandle, OutlineStyle, Page};
pub use highlight::{
    HIGHLIGHT_OUTLINE, HIGHLIGHT_OUTLINE_OFFSET, HIGHLIGHT_TRANSITION, Highlighter,
};
pub use index::{FormEntry, HeadingEntry, ImageEntry, PageIndex, PageSummary, TableEntry};
pub use navigator::{
    Category, NOT_FOUND_MESSAGE, NavigationError, NavigationQuery, Navigator, Resolved, Target,
    Viewport, describe, extract_text_between,
};

pub use scraper::Selector;
pub use url::Url;
