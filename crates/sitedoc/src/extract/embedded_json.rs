//! JSON embedded in prose
//!
//! Attempts, in order:
//!
//! 1. the whole text (after removing a markdown code fence)
//! 2. the largest `[...]` / `{...}` span
//! 3. both of the above again with full-width and smart punctuation
//!    replaced by ASCII

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z]*[ \t]*\r?\n?([\s\S]*?)```").expect("Invalid regex"));

/// Expected top-level JSON type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
    Any,
}

impl Shape {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
            Shape::Any => value.is_object() || value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
            Shape::Any => "object or array",
        }
    }

    fn delimiters(self) -> &'static [(char, char)] {
        match self {
            Shape::Object => &[('{', '}')],
            Shape::Array => &[('[', ']')],
            Shape::Any => &[('{', '}'), ('[', ']')],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbeddedJsonError {
    #[error("no JSON found in empty text")]
    Empty,

    #[error("no parsable JSON {expected} in text: {detail}")]
    Unparsable { expected: &'static str, detail: String },
}

/// Contents of the first fenced code block, or the text unchanged
pub fn strip_code_fences(text: &str) -> Cow<'_, str> {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => Cow::Owned(inner.as_str().to_string()),
        None => Cow::Borrowed(text),
    }
}

/// Replace full-width and typographic punctuation with ASCII
pub fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '：' => ':',
            '，' => ',',
            '“' | '”' | '＂' | '„' => '"',
            '‘' | '’' | '＇' => '\'',
            '【' | '［' => '[',
            '】' | '］' => ']',
            '｛' => '{',
            '｝' => '}',
            other => other,
        })
        .collect()
}

/// Largest delimited spans, earliest opener first
fn candidates(text: &str, shape: Shape) -> Vec<&str> {
    let mut spans: Vec<(usize, &str)> = shape
        .delimiters()
        .iter()
        .filter_map(|&(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (start < end).then(|| (start, &text[start..end + close.len_utf8()]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().map(|(_, span)| span).collect()
}

fn attempt(text: &str, shape: Shape) -> std::result::Result<Value, String> {
    let mut detail = String::new();
    let whole = std::iter::once(text);
    for candidate in whole.chain(candidates(text, shape)) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if shape.accepts(&value) => return Ok(value),
            Ok(_) => detail = format!("found JSON that is not an {}", shape.name()),
            Err(e) => detail = e.to_string(),
        }
    }
    Err(detail)
}

/// Parse the JSON value of `shape` embedded in `text`
pub fn parse_embedded_json(text: &str, shape: Shape) -> std::result::Result<Value, EmbeddedJsonError> {
    let unfenced = strip_code_fences(text);
    let text = unfenced.trim();
    if text.is_empty() {
        return Err(EmbeddedJsonError::Empty);
    }

    let first = match attempt(text, shape) {
        Ok(value) => return Ok(value),
        Err(detail) => detail,
    };

    let normalized = normalize_punctuation(text);
    if normalized != text {
        if let Ok(value) = attempt(&normalized, shape) {
            return Ok(value);
        }
    }

    Err(EmbeddedJsonError::Unparsable {
        expected: shape.name(),
        detail: first,
    })
}
