//! Copy-paste friendly text version of a card.

use super::html::is_zero_width;
use super::normalizer::{parse_blocks, BlockKind};

const BULLET: &str = "• ";

/// Title, then every block in document order.
///
/// Paragraphs are separated by a blank line; consecutive list items sit on
/// adjacent lines with a bullet. Entities are decoded and the zero-width
/// spaces added for rendering are removed.
pub fn extract_plain_text(title: &str, content: &str) -> String {
    let mut out = String::new();
    let title = title.trim();
    if !title.is_empty() {
        out.push_str(title);
    }

    let mut previous: Option<BlockKind> = None;
    for block in parse_blocks(content) {
        let text = decode_entities(&block.text());
        let text: String = text.chars().filter(|c| !is_zero_width(*c)).collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        if !out.is_empty() {
            let list_run = previous == Some(BlockKind::ListItem) && block.kind == BlockKind::ListItem;
            out.push_str(if list_run { "\n" } else { "\n\n" });
        }
        if block.kind == BlockKind::ListItem {
            out.push_str(BULLET);
        }
        out.push_str(text);
        previous = Some(block.kind);
    }
    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_list_in_document_order() {
        let content = "<p>Intro</p><div class=\"custom-list-item\">one</div>\
                       <div class=\"custom-list-item\">two</div><p>Outro</p>";
        assert_eq!(
            extract_plain_text("Title", content),
            "Title\n\nIntro\n\n• one\n• two\n\nOutro"
        );
    }

    #[test]
    fn test_markup_and_zero_width_removed() {
        let content = "<p>Hot!\u{200B}🔥 <strong>take</strong> &amp; 1 &lt; 2</p>";
        assert_eq!(extract_plain_text("", content), "Hot!🔥 take & 1 < 2");
    }

    #[test]
    fn test_empty_title_and_content() {
        assert_eq!(extract_plain_text("  ", ""), "");
        assert_eq!(extract_plain_text("Only title", ""), "Only title");
    }
}
