//! Content normalization for upstream research results.
//!
//! Upstream result envelopes come in several shapes: a bare string, an object
//! with `content` or `text`, an array of segments, or an object nesting one of
//! those. [`normalize`] folds any of them into one text plus a deduplicated
//! citation list. It is total: shapes it does not recognize degrade to their
//! JSON rendering instead of failing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How deep `Nested` objects are followed before falling back to JSON text.
const MAX_NESTED_DEPTH: usize = 1;

/// Keys probed on array segments, in order.
const SEGMENT_KEYS: [&str; 3] = ["text", "content", "value"];

/// A source attribution attached to a research result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
}

/// Canonical text plus citations, deduplicated by url in first-seen order.
///
/// `basis` is the upstream attribution array, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<Value>,
}

/// Decoded shape of an upstream output value.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputShape<'a> {
    Text(&'a str),
    Segments(&'a [Value]),
    Nested(&'a Map<String, Value>),
    Unknown(&'a Value),
}

impl<'a> OutputShape<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Segments(items),
            Value::Object(map) => Self::Nested(map),
            other => Self::Unknown(other),
        }
    }
}

/// Normalize an upstream `output` value.
pub fn normalize(output: &Value) -> NormalizedResult {
    let basis = output.get("basis").filter(|b| !b.is_null());
    NormalizedResult {
        text: render(OutputShape::classify(output), 0),
        citations: extract_citations(basis),
        basis: basis.cloned(),
    }
}

/// Normalize either a full result envelope (`{ "output": ... }`) or a bare output.
pub fn normalize_envelope(body: &Value) -> NormalizedResult {
    match body.get("output") {
        Some(output) if !output.is_null() => {
            let mut result = normalize(output);
            if result.basis.is_none() {
                let basis = body.get("basis").filter(|b| !b.is_null());
                result.citations = extract_citations(basis);
                result.basis = basis.cloned();
            }
            result
        }
        _ => normalize(body),
    }
}

fn render(shape: OutputShape<'_>, depth: usize) -> String {
    match shape {
        OutputShape::Text(text) => text.to_string(),
        OutputShape::Segments(items) => items
            .iter()
            .filter_map(|item| segment_text(item, depth))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputShape::Nested(map) => render_object(map, depth),
        OutputShape::Unknown(Value::Null) => String::new(),
        OutputShape::Unknown(other) => other.to_string(),
    }
}

fn render_object(map: &Map<String, Value>, depth: usize) -> String {
    for key in ["content", "text"] {
        if let Some(Value::String(text)) = map.get(key) {
            return text.clone();
        }
    }

    if depth < MAX_NESTED_DEPTH {
        for key in ["content", "text"] {
            if let Some(inner) = map.get(key).filter(|v| v.is_array() || v.is_object()) {
                return render(OutputShape::classify(inner), depth + 1);
            }
        }
    }

    Value::Object(map.clone()).to_string()
}

fn segment_text(item: &Value, depth: usize) -> Option<String> {
    match item {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => {
            let direct = SEGMENT_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str));
            match direct {
                Some(text) => Some(text.to_string()),
                None => Some(render_object(map, depth)),
            }
        }
        other => Some(other.to_string()),
    }
}

/// Collect `{title?, url}` pairs from `basis[].citations[]`.
fn extract_citations(basis: Option<&Value>) -> Vec<Citation> {
    let Some(entries) = basis.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut citations = Vec::new();

    let raw = entries
        .iter()
        .filter_map(|entry| entry.get("citations").and_then(Value::as_array))
        .flatten();

    for citation in raw {
        let Some(url) = citation.get("url").and_then(Value::as_str) else {
            continue;
        };
        if url.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        let title = citation
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        citations.push(Citation {
            title,
            url: url.to_string(),
        });
    }

    citations
}
