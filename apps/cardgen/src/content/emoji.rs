//! Emoji recognition and the text-level spacing rules applied around emoji.

use std::sync::LazyLock;

use regex::Regex;

use super::html::is_zero_width;

pub(crate) const ZWSP: char = '\u{200B}';

static CHAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);")
        .expect("CHAR_REF: hardcoded regex is valid")
});

/// Pictographic code points the card renderer treats as emoji.
pub fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1F02F
            | 0x1F0A0..=0x1F0FF
            | 0x1F100..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F300..=0x1F9FF
            | 0x1FA70..=0x1FAFF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
    )
}

/// Characters that extend an emoji sequence without starting one:
/// variation selectors, the zero-width joiner and the keycap mark.
fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{FE0E}' | '\u{FE0F}' | '\u{200D}' | '\u{20E3}')
}

fn is_emoji_part(c: char) -> bool {
    is_emoji(c) || is_emoji_modifier(c)
}

/// Byte length of the emoji run at the start of `text`, if it starts with one.
pub fn leading_emoji_run(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !is_emoji(first) {
        return None;
    }
    let end = chars
        .find(|(_, c)| !is_emoji_part(*c))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    Some(end)
}

/// True if the last visible character of `text` belongs to an emoji sequence.
pub fn ends_with_emoji(text: &str) -> bool {
    text.chars()
        .rev()
        .find(|c| !is_emoji_modifier(*c))
        .is_some_and(is_emoji)
}

/// Splits escaped text into spacing units: a whole character reference such
/// as `&amp;` or `&#128293;`, or a single char.
fn units(text: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let len = match c {
            '&' => CHAR_REF.find(rest).map_or(1, |m| m.end()),
            _ => c.len_utf8(),
        };
        out.push(&rest[..len]);
        rest = &rest[len..];
    }
    out
}

fn single_char(unit: &str) -> Option<char> {
    let mut chars = unit.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Character references count as punctuation.
fn needs_separator(unit: &str) -> bool {
    match single_char(unit) {
        Some(c) => {
            !c.is_alphanumeric() && !c.is_whitespace() && !is_emoji_part(c) && !is_zero_width(c)
        }
        None => true,
    }
}

/// Applies the emoji spacing rules to a single, already escaped text run.
///
/// Punctuation touching an emoji gets a zero-width space after it so the
/// renderer can break there, and a run that ends in an emoji gets a trailing
/// space because markup always follows a text run. Character references are
/// never split. Running it twice changes nothing.
pub fn repair_text(text: &str) -> String {
    let units = units(text);
    let mut out = String::with_capacity(text.len() + 4);

    for (i, unit) in units.iter().enumerate() {
        out.push_str(unit);
        if !needs_separator(unit) {
            continue;
        }
        let next = units.get(i + 1).and_then(|u| single_char(u));
        if next == Some(ZWSP) {
            continue;
        }
        let after_emoji = i > 0 && single_char(units[i - 1]).is_some_and(is_emoji_part);
        let before_emoji = next.is_some_and(is_emoji);
        if after_emoji || before_emoji {
            out.push(ZWSP);
        }
    }

    if ends_with_emoji(text) {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_emoji_ranges() {
        for c in ['🔥', '💡', '✨', '❤', '🚀', '☀', '🎉'] {
            assert!(is_emoji(c), "{c} should be emoji");
        }
        for c in ['a', '中', '!', '1', '，'] {
            assert!(!is_emoji(c), "{c} should not be emoji");
        }
    }

    #[test]
    fn test_leading_emoji_run_includes_modifiers() {
        let text = "❤\u{FE0F}love";
        let len = leading_emoji_run(text).unwrap();
        assert_eq!(&text[len..], "love");
        assert_eq!(leading_emoji_run("hi🔥"), None);
    }

    #[test]
    fn test_zwj_sequence_is_one_run() {
        let family = "👨\u{200D}👩\u{200D}👧 ok";
        let len = leading_emoji_run(family).unwrap();
        assert_eq!(&family[len..], " ok");
    }

    #[test]
    fn test_repair_inserts_zwsp_next_to_punctuation() {
        assert_eq!(repair_text("Nice!🔥 go"), "Nice!\u{200B}🔥 go");
        assert_eq!(repair_text("🔥!go"), "🔥!\u{200B}go");
    }

    #[test]
    fn test_repair_appends_space_after_trailing_emoji() {
        assert_eq!(repair_text("done 🎉"), "done 🎉 ");
        assert_eq!(repair_text("wow ❤\u{FE0F}"), "wow ❤\u{FE0F} ");
    }

    #[test]
    fn test_repair_leaves_plain_text_alone() {
        assert_eq!(repair_text("Hello, world."), "Hello, world.");
        assert_eq!(repair_text("中文内容"), "中文内容");
    }

    #[test]
    fn test_repair_keeps_character_references_whole() {
        assert_eq!(repair_text("🔥&lt;3"), "🔥&lt;\u{200B}3");
        assert_eq!(repair_text("Tom🍎&amp;Jerry"), "Tom🍎&amp;\u{200B}Jerry");
        assert_eq!(repair_text("go&#33;🎉"), "go&#33;\u{200B}🎉 ");
        assert_eq!(repair_text("a&#x21;b🔥"), "a&#x21;b🔥 ");
        // A bare ampersand is ordinary punctuation.
        assert_eq!(repair_text("🔥& co"), "🔥&\u{200B} co");
    }

    #[test]
    fn test_repair_is_idempotent() {
        for input in ["a!🔥!b", "🔥", "x,💡", "🚀🚀 launch!", "end.✨", "🔥&lt;3", "🍎&amp;&gt;x"] {
            let once = repair_text(input);
            assert_eq!(repair_text(&once), once, "input {input:?}");
        }
    }
}
