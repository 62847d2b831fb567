//! Utterance routing.
//!
//! Three outcomes, decided in a fixed order: navigation keywords win outright,
//! then the first matching local rule, then remote delegation.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use voxpage_page::{Page, PageContext};

use crate::responder::Responder;

/// Substrings that mark an utterance as a navigation command.
pub const NAVIGATION_KEYWORDS: &[&str] = &[
    "go to",
    "navigate to",
    "find",
    "scroll to",
    "skip to",
    "show me",
    "take me to",
    "where is",
];

static NAVIGATION: LazyLock<AhoCorasick> =
    LazyLock::new(|| AhoCorasick::new(NAVIGATION_KEYWORDS).expect("valid keyword set"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Navigation,
    LocalAnswer(String),
    Remote,
}

#[must_use]
pub fn is_navigation(utterance: &str) -> bool {
    NAVIGATION.is_match(&utterance.to_lowercase())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Classifier {
    responder: Responder,
}

impl Classifier {
    #[must_use]
    pub fn classify(&self, utterance: &str, context: &PageContext, page: &Page) -> Route {
        if is_navigation(utterance) {
            return Route::Navigation;
        }
        match self.responder.answer(utterance, context, page) {
            Some(answer) => Route::LocalAnswer(answer),
            None => Route::Remote,
        }
    }
}
