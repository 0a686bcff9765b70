//! Fixed card geometry and pagination tuning.

use serde::{Deserialize, Serialize};

/// Font used for card body text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub size_px: f32,
    /// Line height as a multiple of `size_px`.
    pub line_height: f32,
}

impl FontSpec {
    pub fn line_px(&self) -> f32 {
        self.size_px * self.line_height
    }
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            size_px: 17.0,
            line_height: 1.7,
        }
    }
}

/// Card dimensions in CSS pixels. These are constants of the card design, not
/// measured at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardGeometry {
    pub card_width: f32,
    pub card_height: f32,
    pub card_padding: f32,
    pub wrapper_padding: f32,
    pub header_height: f32,
    pub footer_height: f32,
    /// Width of the text column blocks are measured against.
    pub content_width: f32,
    /// Fraction of the computed body height that content may use.
    pub capacity_factor: f32,
    pub font: FontSpec,
}

impl Default for CardGeometry {
    fn default() -> Self {
        Self {
            card_width: 420.0,
            card_height: 560.0,
            card_padding: 30.0,
            wrapper_padding: 20.0,
            header_height: 60.0,
            footer_height: 50.0,
            content_width: 360.0,
            capacity_factor: 0.95,
            font: FontSpec::default(),
        }
    }
}

impl CardGeometry {
    /// Body height available to content blocks on one card.
    pub fn available_height(&self) -> f32 {
        let body = self.card_height
            - 2.0 * self.card_padding
            - 2.0 * self.wrapper_padding
            - self.header_height
            - self.footer_height;
        body.max(0.0) * self.capacity_factor
    }
}

/// Knobs for the page packer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Vertical gap added below every block.
    pub block_margin: f32,
    /// Subtracted from the available height when packing multiple pages.
    pub safety_margin: f32,
    /// Content up to `available_height * extension_allowance` stays on one taller card.
    pub extension_allowance: f32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            block_margin: 15.0,
            safety_margin: 10.0,
            extension_allowance: 1.2,
        }
    }
}
