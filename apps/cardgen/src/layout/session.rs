//! The previewed page set and which page is showing.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::layout::paginator::{CardExtension, Page, Pagination};

/// Pages of the current card plus the index on display.
///
/// `current_index` is always a valid index into `pages`, which is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationSession {
    pages: Vec<Page>,
    current_index: usize,
    extension: Option<CardExtension>,
}

impl PaginationSession {
    pub fn from_pagination(pagination: Pagination) -> Self {
        let mut pages = pagination.pages;
        if pages.is_empty() {
            pages.push(Page { blocks: Vec::new() });
        }
        Self {
            pages,
            current_index: 0,
            extension: pagination.extension,
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn current_page(&self) -> &Page {
        &self.pages[self.current_index]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn extension(&self) -> Option<CardExtension> {
        self.extension
    }

    pub fn has_multiple_pages(&self) -> bool {
        self.pages.len() > 1
    }

    /// Jumps to `index`. Out-of-range requests leave the session unchanged.
    pub fn show(&mut self, index: usize) -> bool {
        if index >= self.pages.len() {
            warn!(index, page_count = self.pages.len(), "ignoring request for missing page");
            return false;
        }
        self.current_index = index;
        true
    }

    pub fn next(&mut self) -> bool {
        if self.current_index + 1 < self.pages.len() {
            self.current_index += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.current_index > 0 {
            self.current_index -= 1;
            true
        } else {
            false
        }
    }

    /// One-based position label such as "2/3".
    pub fn page_label(&self) -> String {
        format!("{}/{}", self.current_index + 1, self.pages.len())
    }
}
