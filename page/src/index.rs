//! Structural page index.
//!
//! [`PageIndex::build`] walks the document once and records headings, tables,
//! forms and images in document order. Each rebuild replaces the previous
//! [`PageSummary`] wholesale; `index` fields are positions at build time, not
//! stable identifiers, and the element handles they carry may go stale.

use std::sync::LazyLock;

use scraper::Selector;
use serde::Serialize;

use crate::document::{ElementHandle, Page, element_text};

static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector"));
static TABLES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static CAPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("caption").expect("valid selector"));
static HEADER_CELLS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static FORMS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid selector"));
static FORM_INPUTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, select, textarea").expect("valid selector"));
static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("valid selector"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingEntry {
    pub index: usize,
    pub level: u8,
    pub text: String,
    #[serde(skip)]
    pub element: ElementHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEntry {
    pub index: usize,
    pub caption: Option<String>,
    pub header_labels: Vec<String>,
    pub row_count: usize,
    #[serde(skip)]
    pub element: ElementHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormEntry {
    pub index: usize,
    pub input_count: usize,
    #[serde(skip)]
    pub element: ElementHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub index: usize,
    pub alt_text: Option<String>,
    pub source_url: String,
    #[serde(skip)]
    pub element: ElementHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub title: String,
    pub headings: Vec<HeadingEntry>,
    pub tables: Vec<TableEntry>,
    pub forms: Vec<FormEntry>,
    pub images: Vec<ImageEntry>,
}

impl PageSummary {
    #[must_use]
    pub fn build(page: &Page) -> Self {
        let headings = page
            .select(&HEADINGS)
            .enumerate()
            .map(|(index, heading)| HeadingEntry {
                index,
                level: heading_level(heading.value().name()),
                text: element_text(heading),
                element: ElementHandle::of(heading),
            })
            .collect();

        let tables = page
            .select(&TABLES)
            .enumerate()
            .map(|(index, table)| TableEntry {
                index,
                caption: table
                    .select(&CAPTION)
                    .next()
                    .map(element_text)
                    .filter(|caption| !caption.is_empty()),
                header_labels: table.select(&HEADER_CELLS).map(element_text).collect(),
                row_count: table.select(&ROWS).count(),
                element: ElementHandle::of(table),
            })
            .collect();

        let forms = page
            .select(&FORMS)
            .enumerate()
            .map(|(index, form)| FormEntry {
                index,
                input_count: form.select(&FORM_INPUTS).count(),
                element: ElementHandle::of(form),
            })
            .collect();

        let images = page
            .select(&IMAGES)
            .enumerate()
            .map(|(index, image)| {
                let attrs = image.value();
                ImageEntry {
                    index,
                    alt_text: attrs
                        .attr("alt")
                        .map(str::to_string)
                        .filter(|alt| !alt.is_empty()),
                    source_url: attrs
                        .attr("src")
                        .map(|src| resolve_url(page, src))
                        .unwrap_or_default(),
                    element: ElementHandle::of(image),
                }
            })
            .collect();

        Self {
            title: page.title(),
            headings,
            tables,
            forms,
            images,
        }
    }
}

/// Owner of the current summary. Counts builds so callers can observe how
/// often the debounced rebuild actually ran.
#[derive(Debug)]
pub struct PageIndex {
    summary: PageSummary,
    builds: u64,
}

impl PageIndex {
    #[must_use]
    pub fn build(page: &Page) -> Self {
        let mut index = Self {
            summary: PageSummary::default(),
            builds: 0,
        };
        index.rebuild(page);
        index
    }

    pub fn rebuild(&mut self, page: &Page) {
        self.summary = PageSummary::build(page);
        self.builds += 1;
        tracing::debug!(
            builds = self.builds,
            headings = self.summary.headings.len(),
            tables = self.summary.tables.len(),
            forms = self.summary.forms.len(),
            images = self.summary.images.len(),
            "Page index rebuilt"
        );
    }

    #[must_use]
    pub fn summary(&self) -> &PageSummary {
        &self.summary
    }

    #[must_use]
    pub fn builds(&self) -> u64 {
        self.builds
    }
}

fn heading_level(tag: &str) -> u8 {
    tag.strip_prefix('h')
        .and_then(|digit| digit.parse::<u8>().ok())
        .unwrap_or(1)
}

fn resolve_url(page: &Page, src: &str) -> String {
    page.url()
        .join(src.trim())
        .map(|url| url.to_string())
        .unwrap_or_else(|_| src.to_string())
}
