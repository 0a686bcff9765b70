//! Static font-metric table for the card's sans-serif body font.
//!
//! Character widths are in em units (relative to font size). This is an
//! approximation of what a browser would lay out: it ignores kerning and
//! ligatures, which is well inside the capacity factor the paginator keeps in
//! reserve. ASCII uses a per-glyph table; CJK ideographs, fullwidth forms and
//! emoji are one em wide and may break anywhere; other characters fall back to
//! an average width.
//!
//! Index = (char as usize) - 32.

use crate::content::is_emoji;

// ────────────────────────────────────────────────────────────────────────────
// Font metric table
// ────────────────────────────────────────────────────────────────────────────

/// Static character-width table.
///
/// `widths[i]` = width of ASCII character `(i + 32)`, covering 0x20 (space)
/// through 0x7E (~).
pub struct FontMetricTable {
    widths: [f32; 95],
    /// Width of a CJK ideograph or emoji.
    pub wide_char_width: f32,
    /// Fallback for other non-ASCII characters.
    pub average_char_width: f32,
    pub space_width: f32,
}

/// Characters laid out on a full em and breakable on either side.
pub fn is_wide(c: char) -> bool {
    matches!(
        c as u32,
        0x1100..=0x115F
            | 0x2E80..=0x303E
            | 0x3041..=0x33FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xA000..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x20000..=0x3FFFD
    ) || is_emoji(c)
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{FE0E}' | '\u{FE0F}' | '\u{20E3}' | '\u{FEFF}')
}

impl FontMetricTable {
    pub fn char_width(&self, c: char) -> f32 {
        let code = c as usize;
        if (32..=126).contains(&code) {
            self.widths[code - 32]
        } else if is_zero_width(c) {
            0.0
        } else if is_wide(c) {
            self.wide_char_width
        } else if c.is_whitespace() {
            self.space_width
        } else {
            self.average_char_width
        }
    }

    /// Measures the rendered width of a string in em units.
    pub fn measure_str(&self, s: &str) -> f32 {
        s.chars().map(|c| self.char_width(c)).sum()
    }

    /// Number of lines `text` occupies when wrapped greedily at `max_width_em`.
    ///
    /// Whitespace runs collapse to a single space, as in HTML. Wide characters
    /// are their own break opportunities; a Latin word wider than the line is
    /// split across as many lines as it needs.
    pub fn count_lines(&self, text: &str, max_width_em: f32) -> u32 {
        if max_width_em <= 0.0 {
            return 0;
        }
        let mut lines = 0u32;
        let mut line_width = 0.0_f32;
        let mut has_content = false;
        let mut pending_space = false;

        for unit in units(text) {
            let Unit::Word(word) = unit else {
                pending_space = has_content;
                continue;
            };
            let word_width = self.measure_str(word);
            if word_width == 0.0 {
                continue;
            }
            let space = if pending_space { self.space_width } else { 0.0 };
            pending_space = false;

            if has_content && line_width + space + word_width > max_width_em {
                lines += 1;
                line_width = 0.0;
            } else {
                line_width += space;
            }

            if word_width > max_width_em {
                // Overlong word: whole lines of it, remainder continues the last line.
                let full = (word_width / max_width_em).floor();
                let rest = word_width - full * max_width_em;
                if line_width > 0.0 {
                    lines += 1;
                }
                lines += full as u32;
                line_width = rest;
                has_content = rest > 0.0;
                if !has_content {
                    continue;
                }
            } else {
                line_width += word_width;
                has_content = true;
            }
        }

        if has_content {
            lines += 1;
        }
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit<'a> {
    Space,
    Word(&'a str),
}

/// Splits text into break units: whitespace runs, Latin words, single wide characters.
fn units(text: &str) -> Vec<Unit<'_>> {
    let mut out = Vec::new();
    let mut word_start: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                out.push(Unit::Word(&text[start..idx]));
            }
            if out.last() != Some(&Unit::Space) {
                out.push(Unit::Space);
            }
        } else if is_wide(c) {
            if let Some(start) = word_start.take() {
                out.push(Unit::Word(&text[start..idx]));
            }
            out.push(Unit::Word(&text[idx..idx + c.len_utf8()]));
        } else if word_start.is_none() {
            word_start = Some(idx);
        }
    }
    if let Some(start) = word_start {
        out.push(Unit::Word(&text[start..]));
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Static width table  (95 ASCII printable characters)
// ────────────────────────────────────────────────────────────────────────────

/// Neo-grotesque system sans-serif, the card's body font.
pub static CARD_SANS: FontMetricTable = FontMetricTable {
    #[rustfmt::skip]
    widths: [
        // sp    !     "     #     $     %     &     '     (     )     *     +     ,     -     .     /
        0.278, 0.278, 0.355, 0.556, 0.556, 0.889, 0.667, 0.191, 0.333, 0.333, 0.389, 0.584, 0.278, 0.333, 0.278, 0.278,
        // 0     1     2     3     4     5     6     7     8     9
        0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556,
        // :     ;     <     =     >     ?     @
        0.278, 0.278, 0.584, 0.584, 0.584, 0.556, 1.015,
        // A     B     C     D     E     F     G     H     I     J     K     L     M
        0.667, 0.667, 0.722, 0.722, 0.667, 0.611, 0.778, 0.722, 0.278, 0.500, 0.667, 0.556, 0.833,
        // N     O     P     Q     R     S     T     U     V     W     X     Y     Z
        0.722, 0.778, 0.667, 0.778, 0.722, 0.667, 0.611, 0.722, 0.667, 0.944, 0.667, 0.667, 0.611,
        // [     \     ]     ^     _     `
        0.278, 0.278, 0.278, 0.469, 0.556, 0.333,
        // a     b     c     d     e     f     g     h     i     j     k     l     m
        0.556, 0.556, 0.500, 0.556, 0.556, 0.278, 0.556, 0.556, 0.222, 0.222, 0.500, 0.222, 0.833,
        // n     o     p     q     r     s     t     u     v     w     x     y     z
        0.556, 0.556, 0.556, 0.556, 0.333, 0.500, 0.278, 0.556, 0.500, 0.722, 0.500, 0.500, 0.500,
        // {     |     }     ~
        0.334, 0.260, 0.334, 0.584,
    ],
    wide_char_width: 1.0,
    average_char_width: 0.556,
    space_width: 0.278,
};

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_str_empty_returns_zero() {
        assert_eq!(CARD_SANS.measure_str(""), 0.0);
    }

    #[test]
    fn test_measure_str_ascii_characters() {
        // "Card" = C(0.722) + a(0.556) + r(0.333) + d(0.556) = 2.167
        let width = CARD_SANS.measure_str("Card");
        assert!((width - 2.167).abs() < 1e-3, "got {width}");
    }

    #[test]
    fn test_wide_and_zero_width_characters() {
        assert!((CARD_SANS.measure_str("中文") - 2.0).abs() < 1e-4);
        assert!((CARD_SANS.measure_str("🔥") - 1.0).abs() < 1e-4);
        assert_eq!(CARD_SANS.measure_str("\u{200B}\u{FE0F}"), 0.0);
        assert!((CARD_SANS.measure_str("é") - CARD_SANS.average_char_width).abs() < 1e-4);
    }

    #[test]
    fn test_count_lines_empty_is_zero() {
        assert_eq!(CARD_SANS.count_lines("", 20.0), 0);
        assert_eq!(CARD_SANS.count_lines("   ", 20.0), 0);
    }

    #[test]
    fn test_count_lines_short_text_one_line() {
        assert_eq!(CARD_SANS.count_lines("Hello world", 20.0), 1);
    }

    #[test]
    fn test_count_lines_wraps_latin_at_word_boundaries() {
        // "words" is ~2.67em; six of them plus spaces fit in 20em.
        let text = "words ".repeat(10);
        assert_eq!(CARD_SANS.count_lines(&text, 20.0), 2);
    }

    #[test]
    fn test_count_lines_breaks_cjk_anywhere() {
        // 50 ideographs at 1em each in a 21em column → 3 lines.
        let text = "字".repeat(50);
        assert_eq!(CARD_SANS.count_lines(&text, 21.0), 3);
    }

    #[test]
    fn test_count_lines_overlong_word_splits() {
        // 40 'm' = 33.32em in a 10em column → 4 lines.
        let text = "m".repeat(40);
        assert_eq!(CARD_SANS.count_lines(&text, 10.0), 4);
    }

    #[test]
    fn test_count_lines_whitespace_collapses() {
        assert_eq!(
            CARD_SANS.count_lines("a\n\n   b", 20.0),
            CARD_SANS.count_lines("a b", 20.0)
        );
    }
}
