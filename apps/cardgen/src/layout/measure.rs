//! Block height measurement.
//!
//! Pagination only needs "how tall is this fragment in a column this wide".
//! The default implementation answers from static font metrics so layout runs
//! anywhere; a host with a real layout engine can plug in its own.

use crate::content::{html, LIST_ITEM_CLASS};
use crate::layout::font_metrics::{FontMetricTable, CARD_SANS};
use crate::layout::geometry::FontSpec;

/// Left indent of a list item, in em.
pub const LIST_ITEM_INDENT_EM: f32 = 1.6;
/// Space below a list item, in em.
pub const LIST_ITEM_GAP_EM: f32 = 0.3;

pub trait TextMeasurer: Send + Sync {
    /// Rendered height in pixels of `html` laid out in a column `width` pixels wide.
    fn measure(&self, html: &str, width: f32, font: &FontSpec) -> f32;
}

/// Measures by greedy word-wrap over a static width table.
#[derive(Clone, Copy)]
pub struct MetricMeasurer {
    table: &'static FontMetricTable,
}

impl MetricMeasurer {
    pub fn new(table: &'static FontMetricTable) -> Self {
        Self { table }
    }
}

impl Default for MetricMeasurer {
    fn default() -> Self {
        Self::new(&CARD_SANS)
    }
}

impl TextMeasurer for MetricMeasurer {
    fn measure(&self, html: &str, width: f32, font: &FontSpec) -> f32 {
        if font.size_px <= 0.0 {
            return 0.0;
        }
        let list_item = is_list_item(html);
        let indent = if list_item {
            LIST_ITEM_INDENT_EM * font.size_px
        } else {
            0.0
        };

        let text = decode_entities(&html::strip_tags(html));
        let width_em = (width - indent) / font.size_px;
        let lines = self.table.count_lines(&text, width_em);

        let mut height = lines as f32 * font.line_px();
        if list_item && lines > 0 {
            height += LIST_ITEM_GAP_EM * font.size_px;
        }
        height
    }
}

fn is_list_item(html: &str) -> bool {
    html.trim_start()
        .strip_prefix("<div")
        .and_then(|rest| rest.split('>').next())
        .is_some_and(|attrs| attrs.contains(LIST_ITEM_CLASS))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font() -> FontSpec {
        FontSpec::default()
    }

    #[test]
    fn test_single_line_paragraph_is_one_line_tall() {
        let height = MetricMeasurer::default().measure("<p>Short line</p>", 360.0, &font());
        assert!((height - font().line_px()).abs() < 1e-3, "got {height}");
    }

    #[test]
    fn test_empty_block_measures_zero() {
        assert_eq!(MetricMeasurer::default().measure("<p></p>", 360.0, &font()), 0.0);
    }

    #[test]
    fn test_long_paragraph_wraps() {
        // 360px / 17px ≈ 21.2em; 60 ideographs need 3 lines.
        let html = format!("<p>{}</p>", "字".repeat(60));
        let height = MetricMeasurer::default().measure(&html, 360.0, &font());
        assert!((height - 3.0 * font().line_px()).abs() < 1e-3, "got {height}");
    }

    #[test]
    fn test_list_item_is_indented_and_spaced() {
        let measurer = MetricMeasurer::default();
        // 21 ideographs fit a full-width line but not an indented one.
        let text = "字".repeat(21);
        let para = measurer.measure(&format!("<p>{text}</p>"), 360.0, &font());
        let item = measurer.measure(
            &format!("<div class=\"custom-list-item\">{text}</div>"),
            360.0,
            &font(),
        );
        assert!((para - font().line_px()).abs() < 1e-3);
        let expected = 2.0 * font().line_px() + LIST_ITEM_GAP_EM * font().size_px;
        assert!((item - expected).abs() < 1e-3, "got {item}");
    }

    #[test]
    fn test_markup_does_not_count_toward_width() {
        let measurer = MetricMeasurer::default();
        let plain = measurer.measure("<p>Bold words</p>", 360.0, &font());
        let marked = measurer.measure(
            "<p><strong>Bold</strong> <span class=\"highlight\">words</span></p>",
            360.0,
            &font(),
        );
        assert_eq!(plain, marked);
    }
}
