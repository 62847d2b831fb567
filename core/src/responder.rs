//! Canned answers for questions the page itself can answer.

use std::sync::LazyLock;

use voxpage_page::{Page, PageContext, PageType, Selector};

/// Spoken in answer to help requests.
pub const HELP_MESSAGE: &str = "I can help you navigate this page and understand its content. \
Try asking things like \"What is this page about?\", \"Go to the section about X\", or \
\"Summarize this page.\"";

pub const GREETING_MESSAGE: &str =
    "Hello! I'm your voxpage assistant. How can I help you with this page?";

pub const NO_SECTIONS_MESSAGE: &str =
    "This page doesn't have clearly defined sections with headings.";

pub const NO_TABLES_MESSAGE: &str = "I don't see any tables on this page.";

const HEADING_PREVIEW: usize = 5;

static TABLES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static IMAGES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("valid selector"));

type Rule = fn(&str, &PageContext, &Page) -> Option<String>;

/// Evaluated top to bottom; the first rule that answers wins.
const RULES: &[(&str, Rule)] = &[
    ("page-identity", page_identity),
    ("headings", headings),
    ("tables", tables),
    ("images", images),
    ("help", help),
    ("greeting", greeting),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct Responder;

impl Responder {
    /// Local answer for `query`, or `None` when the remote model should answer.
    #[must_use]
    pub fn answer(&self, query: &str, context: &PageContext, page: &Page) -> Option<String> {
        let query = query.to_lowercase();
        RULES.iter().find_map(|(name, rule)| {
            let answer = rule(&query, context, page)?;
            tracing::debug!(rule = name, "Answered locally");
            Some(answer)
        })
    }
}

fn contains_any(query: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| query.contains(needle))
}

fn page_identity(query: &str, context: &PageContext, page: &Page) -> Option<String> {
    contains_any(
        query,
        &[
            "what is this page",
            "what's this page",
            "about this page",
            "tell me about this page",
        ],
    )
    .then(|| {
        format!(
            "This page is about {}. It appears to be a {} page.",
            context.title,
            PageType::detect(page)
        )
    })
}

fn headings(query: &str, context: &PageContext, _page: &Page) -> Option<String> {
    if !contains_any(query, &["headings", "sections"]) {
        return None;
    }
    let count = context.headings.len();
    let preview = |n: usize| {
        context
            .headings
            .iter()
            .take(n)
            .map(|heading| heading.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Some(match count {
        0 => NO_SECTIONS_MESSAGE.to_string(),
        1..=HEADING_PREVIEW => format!("This page has {count} main sections: {}.", preview(count)),
        _ => format!(
            "This page has {count} sections. The first few are: {}, and more.",
            preview(HEADING_PREVIEW)
        ),
    })
}

fn tables(query: &str, _context: &PageContext, page: &Page) -> Option<String> {
    if !query.contains("table") {
        return None;
    }
    Some(match page.count(&TABLES) {
        0 => NO_TABLES_MESSAGE.to_string(),
        1 => "I found 1 table on this page.".to_string(),
        n => format!("I found {n} tables on this page."),
    })
}

fn images(query: &str, _context: &PageContext, page: &Page) -> Option<String> {
    if !contains_any(query, &["image", "picture", "photo"]) {
        return None;
    }
    let count = page.count(&IMAGES);
    let plural = if count == 1 { "" } else { "s" };
    Some(format!("This page contains {count} image{plural}."))
}

fn help(query: &str, _context: &PageContext, _page: &Page) -> Option<String> {
    contains_any(query, &["help", "what can you do", "how do you work"])
        .then(|| HELP_MESSAGE.to_string())
}

fn greeting(query: &str, _context: &PageContext, _page: &Page) -> Option<String> {
    contains_any(query, &["hello", "hi "]).then(|| GREETING_MESSAGE.to_string())
}
