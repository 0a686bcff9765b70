//! Recovers `{title, content}` from raw model output.
//!
//! Models wrap the JSON in fences, surround it with chatter, forget to escape
//! newlines, or get cut off halfway through the content string. Extraction
//! runs a cascade of progressively looser strategies. The first strategy that
//! yields a content candidate decides the outcome: the candidate is validated
//! and a failure is reported as incomplete content, never retried with a
//! looser strategy.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::normalizer::normalize;
use super::validator::{check_completeness, ends_mid_tag, IncompleteReason};
use crate::errors::CardError;
use crate::llm_client::strip_json_fences;

/// Used when the model's title cannot be recovered.
pub const FALLBACK_TITLE: &str = "Generated title";
/// Longer titles are accepted but logged.
pub const TITLE_SOFT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub title: String,
    /// Normalized HTML.
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    WholeJson,
    EmbeddedJson,
    FieldPattern,
    LineHeuristic,
}

static TITLE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("TITLE_FIELD: hardcoded regex is valid")
});

static CONTENT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""content"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("CONTENT_FIELD: hardcoded regex is valid")
});

// ────────────────────────────────────────────────────────────────────────────
// Entry point
// ────────────────────────────────────────────────────────────────────────────

pub fn parse(raw: &str) -> Result<GenerationResult, CardError> {
    let text = strip_json_fences(raw);
    if text.is_empty() {
        return Err(CardError::unparseable("empty response"));
    }

    let (stage, title, content) = extract(text).ok_or_else(|| {
        CardError::unparseable(format!(
            "no title/content found in {} chars of output",
            text.chars().count()
        ))
    })?;
    debug!(?stage, "extracted content candidate");

    finish(title, content)
}

fn extract(text: &str) -> Option<(Stage, Option<String>, String)> {
    if let Some((title, content)) = from_json(text) {
        return Some((Stage::WholeJson, title, content));
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some((title, content)) = from_json(&text[start..=end]) {
                return Some((Stage::EmbeddedJson, title, content));
            }
        }
    }

    if let Some(caps) = CONTENT_FIELD.captures(text) {
        let content = unescape_json_fragment(&caps[1]);
        let title = TITLE_FIELD
            .captures(text)
            .map(|c| unescape_json_fragment(&c[1]));
        return Some((Stage::FieldPattern, title, content));
    }

    from_lines(text).map(|(title, content)| (Stage::LineHeuristic, title, content))
}

/// Validates and canonicalizes one extracted candidate.
fn finish(title: Option<String>, content: String) -> Result<GenerationResult, CardError> {
    // Checked before normalizing, which would close the dangling tag and hide the cut.
    if ends_mid_tag(&content) {
        return Err(CardError::incomplete(IncompleteReason::EndsMidTag.to_string()));
    }

    let unescaped = content
        .replace("&amp;lt;", "<")
        .replace("&amp;gt;", ">")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let content = normalize(&unescaped);

    check_completeness(&content).map_err(|reason| CardError::incomplete(reason.to_string()))?;

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());
    let title_chars = title.chars().count();
    if title_chars > TITLE_SOFT_LIMIT {
        warn!(title_chars, limit = TITLE_SOFT_LIMIT, "generated title is longer than expected");
    }

    Ok(GenerationResult { title, content })
}

// ────────────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────────────

fn from_json(text: &str) -> Option<(Option<String>, String)> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let content = coerce_string(object.get("content")?)?;
    let title = object.get("title").and_then(coerce_string);
    Some((title, content))
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Last resort: scan for the keys by line and take whatever follows them.
fn from_lines(text: &str) -> Option<(Option<String>, String)> {
    let title = text
        .lines()
        .find(|line| line.contains("title"))
        .and_then(|line| value_after_key(line, "title"));

    let content_line_start = text
        .lines()
        .find(|line| line.contains("content"))
        .map(|line| line.as_ptr() as usize - text.as_ptr() as usize)?;
    let content = value_after_key(&text[content_line_start..], "content")?;

    Some((title, content))
}

/// Value following `key:`, optionally quoted. A missing closing quote takes
/// everything to the end of the text.
fn value_after_key(text: &str, key: &str) -> Option<String> {
    let quoted_key = format!("\"{key}\"");
    let key_end = match text.find(&quoted_key) {
        Some(idx) => idx + quoted_key.len(),
        None => text.find(key)? + key.len(),
    };
    let after_key = &text[key_end..];
    let colon = after_key.find([':', '：'])?;
    let sep_len = after_key[colon..].chars().next().map_or(1, char::len_utf8);
    let rest = after_key[colon + sep_len..].trim_start();

    let value = match rest.strip_prefix('"') {
        Some(body) => {
            let mut end = None;
            let mut escaped = false;
            for (idx, c) in body.char_indices() {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => {
                        end = Some(idx);
                        break;
                    }
                    _ => {}
                }
            }
            match end {
                Some(end) => &body[..end],
                None => body.trim_end().trim_end_matches('}').trim_end(),
            }
        }
        None => rest.lines().next().unwrap_or("").trim().trim_end_matches(',').trim(),
    };

    let value = unescape_json_fragment(value);
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Decodes JSON string escapes in a fragment that never went through a JSON parser.
fn unescape_json_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
