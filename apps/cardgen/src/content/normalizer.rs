//! HTML normalizer and repairer.
//!
//! Turns whatever the model produced into the card's canonical form: a flat
//! sequence of `<p>` paragraphs and `<div class="custom-list-item">` list
//! items, inline markup limited to `<strong>` and classed `<span>`, all tags
//! balanced. `normalize(normalize(x)) == normalize(x)` for every input.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::emoji;
use super::html::{self, Element, Node, Tag};

/// Class marking a list item container in canonical output.
pub const LIST_ITEM_CLASS: &str = "custom-list-item";

const MAX_UNESCAPE_PASSES: usize = 20;
const MAX_SETTLE_PASSES: usize = 4;

// ────────────────────────────────────────────────────────────────────────────
// Patterns
// ────────────────────────────────────────────────────────────────────────────

static ZW_IN_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"&[\x{200B}-\x{200F}\x{FEFF}]*([A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+)[\x{200B}-\x{200F}\x{FEFF}]*;",
    )
    .expect("ZW_IN_ENTITY: hardcoded regex is valid")
});

static ZW_IN_TAG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<[\x{200B}-\x{200F}\x{FEFF}]*(/?)[\x{200B}-\x{200F}\x{FEFF}]*([A-Za-z][A-Za-z0-9]*)[\x{200B}-\x{200F}\x{FEFF}]*",
    )
    .expect("ZW_IN_TAG_NAME: hardcoded regex is valid")
});

/// Escaped form: only vocabulary names ending in a tag delimiter, so prose
/// after a literal `&lt;` keeps its zero-width characters.
static ZW_IN_ESCAPED_TAG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)&lt;[\x{200B}-\x{200F}\x{FEFF}]*(/?)[\x{200B}-\x{200F}\x{FEFF}]*(p|strong|b|em|span|ul|ol|li|div|h[1-6]|br)[\x{200B}-\x{200F}\x{FEFF}]*(\s|/|&gt;)",
    )
    .expect("ZW_IN_ESCAPED_TAG_NAME: hardcoded regex is valid")
});

static ZW_IN_ATTR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\s)[\x{200B}-\x{200F}\x{FEFF}]*(class|style|id)[\x{200B}-\x{200F}\x{FEFF}]*=")
        .expect("ZW_IN_ATTR_NAME: hardcoded regex is valid")
});

static DOUBLE_ESCAPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&amp;(lt|gt);").expect("DOUBLE_ESCAPED: hardcoded regex is valid")
});

static ESCAPED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&lt;(/?(?:p|strong|b|em|span|ul|ol|li|div|h[1-6]|br)\b[^<>]*?)&gt;")
        .expect("ESCAPED_TAG: hardcoded regex is valid")
});

static BALANCE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?)(p|strong|span|div|li|ul|ol)\b[^>]*>")
        .expect("BALANCE_TAG: hardcoded regex is valid")
});

// ────────────────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    ListItem,
}

/// A top-level unit of normalized content, the atom of pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub html: String,
    /// Position in the content's block sequence.
    pub original_index: usize,
}

impl ContentBlock {
    /// Text content with markup removed.
    pub fn text(&self) -> String {
        html::strip_tags(&self.html)
    }
}

/// Canonicalizes raw model HTML. Never fails; arbitrarily broken input yields
/// the best well-formed content that can be recovered from it.
pub fn normalize(raw: &str) -> String {
    let mut out = normalize_once(raw);
    // Dropped markup can splice literal text into something that reads as a
    // tag on the next pass.
    for _ in 1..MAX_SETTLE_PASSES {
        let next = normalize_once(&out);
        if next == out {
            break;
        }
        out = next;
    }
    debug!(
        input_len = raw.len(),
        output_len = out.len(),
        "normalized card content"
    );
    out
}

fn normalize_once(raw: &str) -> String {
    let blocks = flatten(raw);
    let joined: String = blocks.iter().map(render_block).collect();
    balance_tags(&joined)
}

/// Splits content into its top-level blocks, normalizing on the way.
///
/// For already-normalized content the blocks' HTML concatenates back to the
/// input exactly.
pub fn parse_blocks(content: &str) -> Vec<ContentBlock> {
    flatten(content)
        .iter()
        .enumerate()
        .map(|(original_index, block)| ContentBlock {
            kind: match block.shape {
                Shape::ListItem => BlockKind::ListItem,
                Shape::Paragraph | Shape::Bare => BlockKind::Paragraph,
            },
            html: render_block(block),
            original_index,
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Text-level preparation
// ────────────────────────────────────────────────────────────────────────────

fn strip_zero_width_in_markup(input: &str) -> String {
    let s = ZW_IN_ENTITY.replace_all(input, "&$1;");
    let s = ZW_IN_TAG_NAME.replace_all(&s, "<$1$2");
    let s = ZW_IN_ESCAPED_TAG_NAME.replace_all(&s, "&lt;$1$2$3");
    ZW_IN_ATTR_NAME.replace_all(&s, "$1$2=").into_owned()
}

/// Decodes entity-escaped vocabulary tags until nothing changes.
fn unescape_tags(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_UNESCAPE_PASSES {
        let next = DOUBLE_ESCAPED.replace_all(&current, "&$1;");
        let next = ESCAPED_TAG.replace_all(&next, |caps: &Captures| {
            format!("<{}>", caps[1].replace("&quot;", "\""))
        });
        let next = strip_zero_width_in_markup(&next);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Closes any tag still open at the end, innermost first.
///
/// Content produced by the tree walk is already balanced; this only matters
/// for hand-built strings.
pub(crate) fn balance_tags(input: &str) -> String {
    let mut open: Vec<String> = Vec::new();
    for caps in BALANCE_TAG.captures_iter(input) {
        let name = caps[2].to_ascii_lowercase();
        if caps[1].is_empty() {
            if !caps[0].ends_with("/>") {
                open.push(name);
            }
        } else if let Some(pos) = open.iter().rposition(|n| *n == name) {
            open.truncate(pos);
        }
    }

    let mut out = input.to_string();
    for name in open.iter().rev() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tree flattening
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Inline {
    Text(String),
    Strong(Vec<Inline>),
    Span { class: String, children: Vec<Inline> },
}

impl Inline {
    fn children_mut(&mut self) -> Option<&mut Vec<Inline>> {
        match self {
            Inline::Text(_) => None,
            Inline::Strong(children) | Inline::Span { children, .. } => Some(children),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Inline::Text(t) => t.is_empty(),
            Inline::Strong(children) | Inline::Span { children, .. } => {
                children.iter().all(Inline::is_empty)
            }
        }
    }

    fn is_visible(&self) -> bool {
        match self {
            Inline::Text(t) => html::is_visible(t),
            Inline::Strong(children) | Inline::Span { children, .. } => {
                children.iter().any(Inline::is_visible)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Paragraph,
    ListItem,
    /// Top-level inline markup that was never inside a block.
    Bare,
}

#[derive(Debug, Clone)]
struct Block {
    shape: Shape,
    inlines: Vec<Inline>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Top,
    Paragraph,
    ListItem,
}

struct Flattener {
    blocks: Vec<Block>,
    pending: Vec<Inline>,
    context: Context,
}

fn flatten(raw: &str) -> Vec<Block> {
    let prepared = unescape_tags(&strip_zero_width_in_markup(raw));
    let mut flattener = Flattener {
        blocks: Vec::new(),
        pending: Vec::new(),
        context: Context::Top,
    };
    flattener.walk(html::parse(&prepared));
    flattener.flush();
    flattener.blocks
}

impl Flattener {
    fn walk(&mut self, nodes: Vec<Node>) {
        for node in nodes {
            match node {
                Node::Text(text) => self.pending.push(Inline::Text(text)),
                Node::Element(el) => self.element(el),
            }
        }
    }

    fn element(&mut self, el: Element) {
        match el.tag {
            Tag::Strong | Tag::Span => {
                if el.contains_block() {
                    // Inline wrappers around blocks are dissolved.
                    self.walk(el.children);
                } else {
                    let inlines = inline_element(el);
                    self.pending.extend(inlines);
                }
            }
            Tag::P => self.enter(Context::Paragraph, el.children),
            Tag::Heading(_) => {
                if el.contains_block() {
                    self.enter(Context::Paragraph, el.children);
                } else {
                    // Headings become an emphasized paragraph.
                    let strong = hoist_leading_emoji(Inline::Strong(inline_nodes(el.children)));
                    self.flush();
                    let outer = std::mem::replace(&mut self.context, Context::Paragraph);
                    self.pending.extend(strong);
                    self.flush();
                    self.context = outer;
                }
            }
            Tag::Li => self.enter(Context::ListItem, el.children),
            Tag::Div if el.has_class(LIST_ITEM_CLASS) => self.enter(Context::ListItem, el.children),
            Tag::Ul | Tag::Ol => {
                self.flush();
                for child in el.children {
                    match child {
                        Node::Element(li) if li.tag == Tag::Li => {
                            self.enter(Context::ListItem, li.children)
                        }
                        Node::Text(text) if !html::is_visible(&text) => {}
                        other => self.enter(Context::ListItem, vec![other]),
                    }
                }
            }
            Tag::Div => {
                self.flush();
                self.walk(el.children);
                self.flush();
            }
        }
    }

    fn enter(&mut self, context: Context, children: Vec<Node>) {
        self.flush();
        let outer = std::mem::replace(&mut self.context, context);
        self.walk(children);
        self.flush();
        self.context = outer;
    }

    fn flush(&mut self) {
        let pending = merge_text(std::mem::take(&mut self.pending));
        match self.context {
            Context::Paragraph => self.push_block(Shape::Paragraph, pending),
            Context::ListItem => self.push_block(Shape::ListItem, pending),
            Context::Top => self.flush_top(pending),
        }
    }

    /// Bare top-level text becomes its own paragraph; bare inline markup stays as written.
    fn flush_top(&mut self, pending: Vec<Inline>) {
        let mut text_run: Vec<Inline> = Vec::new();
        let mut markup_run: Vec<Inline> = Vec::new();

        for inline in pending {
            match inline {
                Inline::Text(text) if !markup_run.is_empty() && !html::is_visible(&text) => {
                    markup_run.push(Inline::Text(text));
                }
                Inline::Text(text) => {
                    if !markup_run.is_empty() {
                        self.push_block(Shape::Bare, std::mem::take(&mut markup_run));
                    }
                    text_run.push(Inline::Text(text));
                }
                markup => {
                    if !text_run.is_empty() {
                        self.push_block(Shape::Paragraph, std::mem::take(&mut text_run));
                    }
                    markup_run.push(markup);
                }
            }
        }
        self.push_block(Shape::Paragraph, text_run);
        self.push_block(Shape::Bare, markup_run);
    }

    fn push_block(&mut self, shape: Shape, inlines: Vec<Inline>) {
        let inlines = trim_edges(merge_text(inlines));
        if inlines.iter().any(Inline::is_visible) {
            self.blocks.push(Block { shape, inlines });
        }
    }
}

fn inline_nodes(nodes: Vec<Node>) -> Vec<Inline> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push(Inline::Text(text)),
            Node::Element(el) => out.extend(inline_element(el)),
        }
    }
    merge_text(out)
}

fn inline_element(el: Element) -> Vec<Inline> {
    let children = inline_nodes(el.children);
    let wrapped = match (el.tag, el.class) {
        (Tag::Strong, _) => Inline::Strong(children),
        (Tag::Span, Some(class)) => Inline::Span { class, children },
        // Unclassed spans and stray block tags contribute only their content.
        _ => return children,
    };
    hoist_leading_emoji(wrapped)
}

/// Moves the emoji at the start of an inline element in front of it, every
/// run up to the first non-emoji text.
fn hoist_leading_emoji(mut inline: Inline) -> Vec<Inline> {
    let mut hoisted = String::new();
    if let Some(children) = inline.children_mut() {
        if let Some(Inline::Text(first)) = children.first_mut() {
            let mut taken = 0;
            loop {
                let rest = &first[taken..];
                let indent = rest.len() - rest.trim_start().len();
                match emoji::leading_emoji_run(&rest[indent..]) {
                    Some(run) => taken += indent + run,
                    None => break,
                }
            }
            if taken > 0 {
                hoisted = first[..taken].to_string();
                *first = first[taken..].trim_start().to_string();
                if first.is_empty() {
                    children.remove(0);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(2);
    if !hoisted.is_empty() {
        out.push(Inline::Text(hoisted));
    }
    if !inline.is_empty() {
        out.push(inline);
    }
    out
}

fn merge_text(inlines: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(inlines.len());
    for inline in inlines {
        match inline {
            Inline::Text(text) if text.is_empty() => {}
            Inline::Text(text) => match out.last_mut() {
                Some(Inline::Text(prev)) => prev.push_str(&text),
                _ => out.push(Inline::Text(text)),
            },
            other => out.push(other),
        }
    }
    out
}

fn trim_edges(mut inlines: Vec<Inline>) -> Vec<Inline> {
    if let Some(Inline::Text(first)) = inlines.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Inline::Text(last)) = inlines.last_mut() {
        *last = last.trim_end().to_string();
    }
    inlines.retain(|inline| !matches!(inline, Inline::Text(t) if t.is_empty()));
    inlines
}

// ────────────────────────────────────────────────────────────────────────────
// Serialization
// ────────────────────────────────────────────────────────────────────────────

fn render_block(block: &Block) -> String {
    let mut out = String::new();
    match block.shape {
        Shape::Paragraph => {
            out.push_str("<p>");
            render_inlines(&block.inlines, &mut out);
            out.push_str("</p>");
        }
        Shape::ListItem => {
            out.push_str("<div class=\"");
            out.push_str(LIST_ITEM_CLASS);
            out.push_str("\">");
            render_inlines(&block.inlines, &mut out);
            out.push_str("</div>");
        }
        Shape::Bare => render_inlines(&block.inlines, &mut out),
    }
    out
}

fn render_inlines(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => out.push_str(&emoji::repair_text(&html::escape_text(text))),
            Inline::Strong(children) => {
                out.push_str("<strong>");
                render_inlines(children, out);
                out.push_str("</strong>");
            }
            Inline::Span { class, children } => {
                out.push_str("<span class=\"");
                out.push_str(class);
                out.push_str("\">");
                render_inlines(children, out);
                out.push_str("</span>");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
