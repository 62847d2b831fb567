//! Temporary outline around a navigation target.
//!
//! Applying a highlight saves the element's inline outline properties and
//! schedules their restoration. Restorations are driven by the owner calling
//! [`Highlighter::restore_due`] once [`Highlighter::next_due`] has passed; a
//! restoration whose element has since been detached is dropped.

use std::time::{Duration, Instant};

use crate::document::{DocumentError, ElementHandle, OutlineStyle, Page};

pub const HIGHLIGHT_OUTLINE: &str = "3px solid #4285f4";
pub const HIGHLIGHT_OUTLINE_OFFSET: &str = "2px";
pub const HIGHLIGHT_TRANSITION: &str = "outline 0.3s ease-in-out";

#[derive(Debug)]
struct PendingRestore {
    element: ElementHandle,
    previous: OutlineStyle,
    due: Instant,
}

#[derive(Debug)]
pub struct Highlighter {
    duration: Duration,
    pending: Vec<PendingRestore>,
}

impl Highlighter {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            pending: Vec::new(),
        }
    }

    /// Outline `element` until `now + duration`.
    ///
    /// Re-highlighting an element that is still outlined extends the deadline
    /// and keeps the originally saved style.
    pub fn highlight(
        &mut self,
        page: &mut Page,
        element: ElementHandle,
        now: Instant,
    ) -> Result<(), DocumentError> {
        let due = now + self.duration;
        match self.pending.iter_mut().find(|p| p.element == element) {
            Some(existing) => existing.due = due,
            None => {
                let previous = page.outline_style(element)?;
                self.pending.push(PendingRestore {
                    element,
                    previous,
                    due,
                });
            }
        }

        page.set_outline_style(
            element,
            OutlineStyle {
                outline: HIGHLIGHT_OUTLINE.to_string(),
                outline_offset: HIGHLIGHT_OUTLINE_OFFSET.to_string(),
                transition: HIGHLIGHT_TRANSITION.to_string(),
            },
        )
    }

    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    /// Restore every highlight whose deadline is at or before `now`.
    /// Returns the number of elements restored.
    pub fn restore_due(&mut self, page: &mut Page, now: Instant) -> usize {
        let mut restored = 0;
        self.pending.retain(|pending| {
            if pending.due > now {
                return true;
            }
            match page.set_outline_style(pending.element, pending.previous.clone()) {
                Ok(()) => restored += 1,
                Err(e) => tracing::debug!("Dropping highlight restore: {e}"),
            }
            false
        });
        restored
    }
}
