//! Measurement-driven page packing.
//!
//! Content is split into blocks, each block is measured in the card's text
//! column, and blocks are packed greedily onto fixed-size pages in document
//! order. Content that only slightly overflows one card stays on a single,
//! taller card instead of being split.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::{parse_blocks, BlockKind, ContentBlock};
use crate::layout::geometry::{CardGeometry, PaginationConfig};
use crate::layout::measure::TextMeasurer;

/// Shown when there is nothing to paginate.
pub const PLACEHOLDER_HTML: &str = "<p>Share your insights and experience here...</p>";

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredBlock {
    pub block: ContentBlock,
    pub rendered_height: f32,
    /// `rendered_height` plus the inter-block margin.
    pub with_margin: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub blocks: Vec<ContentBlock>,
}

impl Page {
    fn placeholder() -> Self {
        Self {
            blocks: vec![ContentBlock {
                kind: BlockKind::Paragraph,
                html: PLACEHOLDER_HTML.to_string(),
                original_index: 0,
            }],
        }
    }

    /// The page's blocks concatenated in order.
    pub fn html(&self) -> String {
        self.blocks.iter().map(|b| b.html.as_str()).collect()
    }
}

/// Request to render the single card taller than the base design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardExtension {
    /// Target card height in pixels.
    pub height: f32,
    /// Content height over available height, always > 1.
    pub ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    /// Never empty.
    pub pages: Vec<Page>,
    pub extension: Option<CardExtension>,
    /// Sum of measured block heights including margins.
    pub total_height: f32,
    pub available_height: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Core functions
// ────────────────────────────────────────────────────────────────────────────

/// Splits `content` into card pages. Never fails and always returns at least one page.
pub fn paginate(
    content: &str,
    geometry: &CardGeometry,
    measurer: &dyn TextMeasurer,
    config: &PaginationConfig,
) -> Pagination {
    let available_height = geometry.available_height();
    let mut blocks = parse_blocks(content);
    blocks.sort_by_key(|b| b.original_index);

    if blocks.is_empty() {
        debug!("no content blocks, using placeholder page");
        return Pagination {
            pages: vec![Page::placeholder()],
            extension: None,
            total_height: 0.0,
            available_height,
        };
    }

    let measured = measure_blocks(blocks, geometry, measurer, config);
    let total_height: f32 = measured.iter().map(|m| m.with_margin).sum();

    if total_height <= available_height * config.extension_allowance {
        let extension = (total_height > available_height && available_height > 0.0).then(|| {
            let ratio = total_height / available_height;
            CardExtension {
                height: geometry.card_height * ratio,
                ratio,
            }
        });
        debug!(
            total_height,
            available_height,
            extended = extension.is_some(),
            "content fits on a single card"
        );
        return Pagination {
            pages: vec![Page {
                blocks: measured.into_iter().map(|m| m.block).collect(),
            }],
            extension,
            total_height,
            available_height,
        };
    }

    let pages = pack_pages(measured, available_height - config.safety_margin);
    debug!(pages = pages.len(), total_height, available_height, "content paginated");
    Pagination {
        pages,
        extension: None,
        total_height,
        available_height,
    }
}

pub fn measure_blocks(
    blocks: Vec<ContentBlock>,
    geometry: &CardGeometry,
    measurer: &dyn TextMeasurer,
    config: &PaginationConfig,
) -> Vec<MeasuredBlock> {
    blocks
        .into_iter()
        .map(|block| {
            let rendered_height = measurer
                .measure(&block.html, geometry.content_width, &geometry.font)
                .max(0.0);
            MeasuredBlock {
                with_margin: rendered_height + config.block_margin,
                rendered_height,
                block,
            }
        })
        .collect()
}

/// Greedy first-fit in order. A block taller than `page_limit` gets a page to itself.
pub fn pack_pages(measured: Vec<MeasuredBlock>, page_limit: f32) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut current: Vec<ContentBlock> = Vec::new();
    let mut current_height = 0.0_f32;

    for item in measured {
        if item.with_margin > page_limit {
            warn!(
                index = item.block.original_index,
                height = item.with_margin,
                page_limit,
                "block taller than a page, placing it alone"
            );
            if !current.is_empty() {
                pages.push(Page {
                    blocks: std::mem::take(&mut current),
                });
                current_height = 0.0;
            }
            pages.push(Page {
                blocks: vec![item.block],
            });
            continue;
        }

        if !current.is_empty() && current_height + item.with_margin > page_limit {
            pages.push(Page {
                blocks: std::mem::take(&mut current),
            });
            current_height = 0.0;
        }
        current_height += item.with_margin;
        current.push(item.block);
    }

    if !current.is_empty() {
        pages.push(Page { blocks: current });
    }
    pages
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
