//! Completeness checks for generated card content.
//!
//! The model regularly stops mid-sentence or mid-tag when it runs out of
//! output budget. These checks tell a truncated payload apart from a short but
//! finished one so the orchestrator knows when to ask again. Hard failures
//! reject; everything else is a `warn!` and does not change the verdict.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use super::html;

pub const MIN_CHARS: usize = 150;
/// Below this length a card needs at least two complete paragraphs.
const SHORT_CONTENT_CHARS: usize = 300;
const EMPTY_PARAGRAPHS_CHARS: usize = 200;
const SHORT_TAIL_CHARS: usize = 20;
const MAX_TAG_IMBALANCE: usize = 2;

/// Why content was judged incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncompleteReason {
    #[error("content is empty")]
    Empty,

    #[error("content too short ({chars} chars, need at least {min})", min = MIN_CHARS)]
    TooShort { chars: usize },

    #[error("content ends mid-tag")]
    EndsMidTag,

    #[error("severely mismatched <{tag}> tags ({opens} open, {closes} closed)")]
    MismatchedTags {
        tag: &'static str,
        opens: usize,
        closes: usize,
    },

    #[error("likely truncated: only {paragraphs} complete paragraph(s) in {chars} chars")]
    LikelyTruncated { paragraphs: usize, chars: usize },

    #[error("unterminated attribute quote")]
    UnterminatedQuote,

    #[error("no block structure found")]
    NoStructure,

    #[error("every paragraph is empty")]
    EmptyParagraphs,
}

// ────────────────────────────────────────────────────────────────────────────
// Patterns
// ────────────────────────────────────────────────────────────────────────────

struct TagPair {
    name: &'static str,
    open: Regex,
    close: &'static str,
}

static TAG_PAIRS: LazyLock<Vec<TagPair>> = LazyLock::new(|| {
    ["p", "strong", "span", "ul", "li", "div"]
        .into_iter()
        .map(|name| TagPair {
            name,
            open: Regex::new(&format!(r"(?i)<{name}[\s>]"))
                .expect("TAG_PAIRS: hardcoded regex is valid"),
            close: match name {
                "p" => "</p>",
                "strong" => "</strong>",
                "span" => "</span>",
                "ul" => "</ul>",
                "li" => "</li>",
                _ => "</div>",
            },
        })
        .collect()
});

static OPEN_TAG_AT_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<[a-z]+[^>]*$").expect("OPEN_TAG_AT_END: hardcoded regex is valid")
});

static PARTIAL_TAG_AT_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(</?|</?(p|span|div|strong|li|ul)|class=)$")
        .expect("PARTIAL_TAG_AT_END: hardcoded regex is valid")
});

static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("PARAGRAPH: hardcoded regex is valid")
});

static STRUCTURE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(p|ul|li|div)[\s>]").expect("STRUCTURE_TAG: hardcoded regex is valid")
});

static TAG_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>?").expect("TAG_MARKUP: hardcoded regex is valid"));

static UNQUOTED_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)class=[^"']"#).expect("UNQUOTED_CLASS: hardcoded regex is valid")
});

static INLINE_WRAPS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(strong|span)[^>]*>\s*<(p|div|ul|li)[\s>]")
        .expect("INLINE_WRAPS_BLOCK: hardcoded regex is valid")
});

static SPLIT_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&[\x{200B}-\x{200F}\x{FEFF}]+([A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);|&([A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+)[\x{200B}-\x{200F}\x{FEFF}]+;")
        .expect("SPLIT_ENTITY: hardcoded regex is valid")
});

/// `<em>` in any case, raw or entity-escaped (once or twice).
static DEPRECATED_EM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?em[\s/>]|&(?:amp;)?lt;/?em(?:[\s/]|&(?:amp;)?gt;)")
        .expect("DEPRECATED_EM: hardcoded regex is valid")
});

// ────────────────────────────────────────────────────────────────────────────
// Checks
// ────────────────────────────────────────────────────────────────────────────

/// Convenience wrapper over [`check_completeness`].
pub fn is_complete(content: &str) -> bool {
    match check_completeness(content) {
        Ok(()) => true,
        Err(reason) => {
            debug!(%reason, "content rejected");
            false
        }
    }
}

/// Runs every completeness rule, stopping at the first hard failure.
pub fn check_completeness(content: &str) -> Result<(), IncompleteReason> {
    if content.trim().is_empty() {
        return Err(IncompleteReason::Empty);
    }
    let chars = content.chars().count();
    if chars < MIN_CHARS {
        return Err(IncompleteReason::TooShort { chars });
    }

    if ends_mid_tag(content) {
        return Err(IncompleteReason::EndsMidTag);
    }

    check_tag_balance(content)?;

    let paragraphs: Vec<&str> = PARAGRAPH
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    if paragraphs.len() < 2 && chars < SHORT_CONTENT_CHARS {
        return Err(IncompleteReason::LikelyTruncated {
            paragraphs: paragraphs.len(),
            chars,
        });
    }

    check_class_quotes(content)?;

    if let Some(last) = paragraphs.last() {
        let tail = html::strip_tags(last);
        let tail_chars = tail.trim().chars().count();
        if tail_chars < SHORT_TAIL_CHARS {
            warn!(tail_chars, "last paragraph is unusually short");
        }
    }

    if uses_deprecated_em(content) {
        warn!("content uses deprecated <em> tags");
    }

    if !STRUCTURE_TAG.is_match(content) && chars <= SHORT_CONTENT_CHARS {
        return Err(IncompleteReason::NoStructure);
    }

    let all_empty = !paragraphs.is_empty()
        && paragraphs
            .iter()
            .all(|p| !html::is_visible(&html::strip_tags(p)));
    if all_empty && chars < EMPTY_PARAGRAPHS_CHARS {
        return Err(IncompleteReason::EmptyParagraphs);
    }

    soft_diagnostics(content, &paragraphs);
    Ok(())
}

/// True if the content stops in the middle of tag markup.
pub fn ends_mid_tag(content: &str) -> bool {
    let trimmed = content.trim_end();
    trimmed.ends_with('<')
        || PARTIAL_TAG_AT_END.is_match(trimmed)
        || trimmed.contains(r#"<span class="</div"#)
        || OPEN_TAG_AT_END.is_match(trimmed)
}

fn check_tag_balance(content: &str) -> Result<(), IncompleteReason> {
    for pair in TAG_PAIRS.iter() {
        let opens = pair.open.find_iter(content).count();
        let closes = content.matches(pair.close).count();
        if opens.abs_diff(closes) > MAX_TAG_IMBALANCE {
            return Err(IncompleteReason::MismatchedTags {
                tag: pair.name,
                opens,
                closes,
            });
        }
        if opens != closes {
            warn!(tag = pair.name, opens, closes, "minor tag imbalance");
        }
    }
    Ok(())
}

/// Every `class="` must have its closing quote.
///
/// Only quotes inside tag markup count, so prose quoting does not trip it.
fn check_class_quotes(content: &str) -> Result<(), IncompleteReason> {
    if !content.contains("class=\"") || content.contains("class=\"\"") {
        return Ok(());
    }
    let class_attrs = content.matches("class=\"").count();
    let quotes: usize = TAG_MARKUP
        .find_iter(content)
        .map(|m| m.as_str().matches('"').count())
        .sum();
    if class_attrs * 2 != quotes {
        return Err(IncompleteReason::UnterminatedQuote);
    }
    Ok(())
}

fn uses_deprecated_em(content: &str) -> bool {
    DEPRECATED_EM.is_match(content)
}

fn soft_diagnostics(content: &str, paragraphs: &[&str]) {
    if UNQUOTED_CLASS.is_match(content) {
        warn!("class attribute without quotes");
    }
    if INLINE_WRAPS_BLOCK.is_match(content) {
        warn!("inline tag wraps a block tag");
    }
    if paragraphs.iter().any(|p| p.contains("<ul")) {
        warn!("list nested inside a paragraph");
    }
    if SPLIT_ENTITY.is_match(content) {
        warn!("entity split by zero-width characters");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-formed paragraphs totalling exactly `total` chars.
    fn two_paragraphs(total: usize) -> String {
        let body = total - "<p></p><p></p>".len();
        let first = body / 2;
        format!("<p>{}</p><p>{}</p>", "a".repeat(first), "b".repeat(body - first))
    }

    #[test]
    fn test_boundary_149_rejected_150_accepted() {
        let short = two_paragraphs(149);
        assert_eq!(short.chars().count(), 149);
        assert!(!is_complete(&short));
        assert_eq!(
            check_completeness(&short),
            Err(IncompleteReason::TooShort { chars: 149 })
        );

        let ok = two_paragraphs(150);
        assert_eq!(ok.chars().count(), 150);
        assert!(is_complete(&ok));
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // 68 CJK chars per paragraph: 150 chars but far more bytes.
        let text = "字".repeat(68);
        let content = format!("<p>{text}</p><p>{text}</p>");
        assert_eq!(content.chars().count(), 150);
        assert!(is_complete(&content));
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(check_completeness("   "), Err(IncompleteReason::Empty));
    }

    #[test]
    fn test_ends_mid_tag_variants() {
        assert!(ends_mid_tag("<p>text</p><"));
        assert!(ends_mid_tag("<p>text</p><span"));
        assert!(ends_mid_tag("<p>text</p></p"));
        assert!(ends_mid_tag("<p>text <span class="));
        assert!(ends_mid_tag(r#"<p>text <span class="highl"#));
        assert!(ends_mid_tag(r#"<p><span class="</div>"#));
        assert!(!ends_mid_tag("<p>text</p>"));
        assert!(!ends_mid_tag("<p>hello</p><p>wor"));
    }

    #[test]
    fn test_mid_tag_content_rejected() {
        let content = format!("{}<span class=\"high", two_paragraphs(200));
        assert_eq!(check_completeness(&content), Err(IncompleteReason::EndsMidTag));
    }

    #[test]
    fn test_severe_mismatch_rejected_minor_tolerated() {
        let filler = "x".repeat(160);
        let severe = format!("<p><p><p><p>{filler}</p>");
        assert!(matches!(
            check_completeness(&severe),
            Err(IncompleteReason::MismatchedTags { tag: "p", .. })
        ));

        let minor = format!("<p>{filler}</p><p>{filler}</p><strong>tail");
        assert!(is_complete(&minor));
    }

    #[test]
    fn test_single_short_paragraph_likely_truncated() {
        let content = format!("<p>{}</p>", "z".repeat(200));
        assert!(matches!(
            check_completeness(&content),
            Err(IncompleteReason::LikelyTruncated { paragraphs: 1, .. })
        ));

        // Long enough content passes with a single paragraph.
        let long = format!("<p>{}</p>", "z".repeat(320));
        assert!(is_complete(&long));
    }

    #[test]
    fn test_unterminated_class_quote_rejected() {
        let filler = "q".repeat(80);
        let content = format!(
            "<p>{filler}</p><p>{filler} <span class=\"highlight>word</span></p>"
        );
        assert_eq!(
            check_completeness(&content),
            Err(IncompleteReason::UnterminatedQuote)
        );
    }

    #[test]
    fn test_prose_quotes_do_not_trip_quote_check() {
        let filler = "w".repeat(80);
        let content = format!(
            "<p>He said \"{filler}\"</p><p><span class=\"highlight\">{filler}</span> end</p>"
        );
        assert!(is_complete(&content));
    }

    #[test]
    fn test_no_structure_rejected() {
        // Below 300 chars the truncation rule fires first.
        assert_eq!(
            check_completeness(&"n".repeat(250)),
            Err(IncompleteReason::LikelyTruncated {
                paragraphs: 0,
                chars: 250
            })
        );

        assert_eq!(
            check_completeness(&"n".repeat(300)),
            Err(IncompleteReason::NoStructure)
        );
        assert_eq!(check_completeness(&"n".repeat(301)), Ok(()));
    }

    #[test]
    fn test_all_empty_paragraphs_rejected() {
        let blank = "<p> </p>".repeat(19);
        assert_eq!(blank.chars().count(), 152);
        assert_eq!(
            check_completeness(&blank),
            Err(IncompleteReason::EmptyParagraphs)
        );

        let zero_width = "<p>\u{200B}</p>".repeat(20);
        assert_eq!(
            check_completeness(&zero_width),
            Err(IncompleteReason::EmptyParagraphs)
        );

        // From 200 chars on the rule no longer applies.
        assert_eq!(check_completeness(&"<p> </p>".repeat(25)), Ok(()));
    }

    #[test]
    fn test_deprecated_em_detected_in_any_form() {
        for content in [
            "<p>a <em>b</em></p>",
            "<p>a <EM>b</EM></p>",
            "<p>a <em class=\"x\">b</p>",
            "<p>a </Em></p>",
            "&lt;em&gt;soft&lt;/em&gt;",
            "&amp;lt;EM&amp;gt;soft",
        ] {
            assert!(uses_deprecated_em(content), "{content:?}");
        }
        for content in ["<p>embers</p>", "<p>emphasis <strong>em</strong></p>", "<emoji>", "&lt;ember&gt;"] {
            assert!(!uses_deprecated_em(content), "{content:?}");
        }
    }

    #[test]
    fn test_list_only_content_needs_length() {
        let item = format!("<div class=\"custom-list-item\">{}</div>", "i".repeat(60));
        let short_list = item.repeat(3);
        assert!(!is_complete(&short_list));
        let long_list = item.repeat(4);
        assert!(is_complete(&long_list));
    }
}
