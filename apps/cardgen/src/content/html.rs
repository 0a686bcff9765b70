//! Tokenizer and lenient tree builder for the card's tag vocabulary.
//!
//! Only a handful of tags are meaningful on a card: `p`, `strong`/`b`, `span`,
//! `ul`/`ol`/`li`, `div` and `h1`–`h6`. Everything else (including the
//! deprecated `em`) is dropped at tokenization time while its text is kept.
//!
//! The tree builder never fails. A close tag without a matching open tag is
//! ignored, a close tag that matches a deeper element implicitly closes the
//! elements above it, and whatever is still open at end of input is closed
//! there, innermost first.

use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Tokens
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tag {
    P,
    Strong,
    Span,
    Ul,
    Ol,
    Li,
    Div,
    Heading(u8),
}

impl Tag {
    fn from_name(name: &str) -> Option<Tag> {
        match name {
            "p" => Some(Tag::P),
            "strong" | "b" => Some(Tag::Strong),
            "span" => Some(Tag::Span),
            "ul" => Some(Tag::Ul),
            "ol" => Some(Tag::Ol),
            "li" => Some(Tag::Li),
            "div" => Some(Tag::Div),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                name[1..].parse::<u8>().ok().map(Tag::Heading)
            }
            _ => None,
        }
    }

    /// Block-level tags may not live inside inline ones.
    pub(crate) fn is_block(self) -> bool {
        !matches!(self, Tag::Strong | Tag::Span)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Text(String),
    Open { tag: Tag, class: Option<String> },
    Close(Tag),
}

/// Splits `input` into text runs and vocabulary tags.
///
/// A `<` that does not start a well-formed tag stays literal text. A tag-like
/// fragment with no terminating `>` (truncated model output) is discarded.
pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'<' {
            if let Some((token, end)) = read_markup(input, pos) {
                if text_start < pos {
                    tokens.push(Token::Text(input[text_start..pos].to_string()));
                }
                if let Some(token) = token {
                    tokens.push(token);
                }
                pos = end;
                text_start = end;
                continue;
            }
        }
        pos += 1;
    }

    if text_start < bytes.len() {
        tokens.push(Token::Text(input[text_start..].to_string()));
    }
    tokens
}

/// Reads the markup starting at `start` (which holds `<`).
///
/// Returns `None` when the `<` is literal text, otherwise the recognized token
/// (or `None` for dropped markup) and the byte offset just past the markup.
fn read_markup(input: &str, start: usize) -> Option<(Option<Token>, usize)> {
    let rest = &input[start + 1..];

    if rest.starts_with("!--") {
        return match rest.find("-->") {
            Some(end) => Some((None, start + 1 + end + 3)),
            None => Some((None, input.len())),
        };
    }

    let closing = rest.starts_with('/');
    let name_start = if closing { 1 } else { 0 };
    let name_len = rest[name_start..]
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 || !rest.as_bytes()[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name = rest[name_start..name_start + name_len].to_ascii_lowercase();
    let body_start = name_start + name_len;

    // The markup ends at the first '>'; a '<' before it means the tag was cut off.
    let body = &rest[body_start..];
    let gt = body.find('>');
    let lt = body.find('<');
    let body_end = match (gt, lt) {
        (Some(g), Some(l)) if l < g => {
            trace!(tag = %name, "dropping tag fragment interrupted by '<'");
            return Some((None, start + 1 + body_start + l));
        }
        (Some(g), _) => g,
        (None, _) => {
            trace!(tag = %name, "dropping unterminated tag fragment at end of input");
            return Some((None, input.len()));
        }
    };
    let attrs = &body[..body_end];
    let end = start + 1 + body_start + body_end + 1;

    let Some(tag) = Tag::from_name(&name) else {
        return Some((None, end));
    };

    if closing {
        return Some((Some(Token::Close(tag)), end));
    }
    if attrs.trim_end().ends_with('/') {
        // `<p/>` and friends carry no content.
        return Some((None, end));
    }

    let class = match tag {
        Tag::Span | Tag::Div => parse_class(attrs),
        _ => None,
    };
    Some((Some(Token::Open { tag, class }), end))
}

/// Extracts a sanitized `class` attribute value from a tag's attribute text.
pub(crate) fn parse_class(attrs: &str) -> Option<String> {
    let lower = attrs.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("class") {
        let idx = search_from + found;
        search_from = idx + "class".len();

        // Must be a whole attribute name, not e.g. `data-class`.
        let preceded_ok = idx == 0
            || lower.as_bytes()[idx - 1].is_ascii_whitespace();
        if !preceded_ok {
            continue;
        }

        let after = attrs[search_from..].trim_start();
        let Some(after_eq) = after.strip_prefix('=') else {
            continue;
        };
        let after_eq = after_eq.trim_start();

        let raw = match after_eq.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let inner = &after_eq[1..];
                match inner.find(q) {
                    Some(close) => &inner[..close],
                    None => inner,
                }
            }
            Some(_) => after_eq
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or(""),
            None => "",
        };

        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
            .collect();
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        return if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        };
    }
    None
}

// ────────────────────────────────────────────────────────────────────────────
// Tree
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    pub tag: Tag,
    pub class: Option<String>,
    pub children: Vec<Node>,
}

impl Element {
    pub(crate) fn has_class(&self, wanted: &str) -> bool {
        self.class
            .as_deref()
            .is_some_and(|c| c.split_whitespace().any(|part| part == wanted))
    }

    /// True if any descendant is block-level.
    pub(crate) fn contains_block(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Element(el) => el.tag.is_block() || el.contains_block(),
            Node::Text(_) => false,
        })
    }
}

/// Builds the element tree as written, including illegal nesting.
///
/// Re-nesting is the normalizer's job; this only balances the structure.
pub(crate) fn build_tree(tokens: Vec<Token>) -> Vec<Node> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => attach(&mut stack, &mut root, Node::Text(text)),
            Token::Open { tag, class } => stack.push(Element {
                tag,
                class,
                children: Vec::new(),
            }),
            Token::Close(tag) => {
                let Some(idx) = stack.iter().rposition(|el| el.tag == tag) else {
                    trace!(?tag, "ignoring stray close tag");
                    continue;
                };
                while let Some(el) = stack.pop() {
                    let reached = stack.len() == idx;
                    attach(&mut stack, &mut root, Node::Element(el));
                    if reached {
                        break;
                    }
                }
            }
        }
    }

    // Unclosed elements end at end of input.
    while let Some(el) = stack.pop() {
        attach(&mut stack, &mut root, Node::Element(el));
    }
    root
}

fn attach(stack: &mut [Element], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

pub(crate) fn parse(input: &str) -> Vec<Node> {
    build_tree(tokenize(input))
}

// ────────────────────────────────────────────────────────────────────────────
// Text helpers
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{FEFF}')
}

/// True if the text has something a reader would see.
pub(crate) fn is_visible(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace() && !is_zero_width(c))
}

/// Escapes the characters that would otherwise be read back as markup.
pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Drops every tag, keeping text. Used for measurement and plain-text export.
pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
