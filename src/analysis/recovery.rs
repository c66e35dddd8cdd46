//! Recovery of JSON from the analysis service's free-form replies.
//!
//! The service may answer with a plain JSON document, a list of
//! `{"output": "<fenced JSON>"}` envelopes, escaped JSON text, or JSON that
//! was encoded as a string one or more times. Recovery runs an ordered list of
//! pure strategies and stops at the first one that yields JSON; string results
//! are fed back through the same procedure.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;

/// Limit on string-inside-JSON nesting
pub const MAX_NESTING: usize = 5;

/// Keys that wrap the real payload in envelope replies
const ENVELOPE_KEYS: &[&str] = &["output", "result", "response"];

/// A reply after its first successful parse
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    RawObject(Map<String, Value>),
    RawArray(Vec<Value>),
    NeedsUnwrap(String),
}

impl RawResponse {
    pub fn classify(value: Value) -> Result<Self, ParseError> {
        match value {
            Value::Object(map) => Ok(Self::RawObject(map)),
            Value::Array(items) => Ok(Self::RawArray(items)),
            Value::String(text) => Ok(Self::NeedsUnwrap(text)),
            _ => Err(ParseError::Exhausted {
                attempts: STRATEGIES.len(),
            }),
        }
    }
}

type Strategy = fn(&str) -> Result<Value, ParseError>;

/// Tried in order after code fences are stripped
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("embedded", parse_embedded),
    ("labelled", parse_labelled),
    ("unescaped", parse_unescaped),
    ("quoted", parse_quoted),
];

/// Recover a JSON object or array from a reply body
pub fn recover(body: &str) -> Result<Value, ParseError> {
    recover_at(body, 0)
}

fn recover_at(text: &str, depth: usize) -> Result<Value, ParseError> {
    if depth > MAX_NESTING {
        return Err(ParseError::RecursionLimit { depth: MAX_NESTING });
    }

    // Valid JSON goes straight to envelope handling; fences inside its
    // strings belong to the individual envelopes
    if let Ok(value @ (Value::Object(_) | Value::Array(_) | Value::String(_))) =
        parse_direct(text.trim())
    {
        debug!(strategy = "direct", depth, "Recovered analysis response");
        return resolve(value, depth);
    }

    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    for (name, strategy) in STRATEGIES {
        if let Ok(value) = strategy(&cleaned) {
            debug!(strategy = name, depth, "Recovered analysis response");
            return resolve(value, depth);
        }
    }

    Err(ParseError::Exhausted {
        attempts: STRATEGIES.len(),
    })
}

fn resolve(value: Value, depth: usize) -> Result<Value, ParseError> {
    match RawResponse::classify(value)? {
        RawResponse::NeedsUnwrap(text) => recover_at(&text, depth + 1),
        RawResponse::RawObject(map) => match envelope_payload(&map) {
            Some(inner) => resolve(inner.clone(), depth + 1),
            None => Ok(Value::Object(map)),
        },
        RawResponse::RawArray(items) => {
            let envelopes: Vec<&Value> = items
                .iter()
                .filter_map(|item| item.as_object().and_then(envelope_payload))
                .collect();

            if envelopes.is_empty() || envelopes.len() != items.len() {
                return Ok(Value::Array(items));
            }

            let mut recovered = Vec::with_capacity(envelopes.len());
            for inner in envelopes {
                recovered.push(resolve(inner.clone(), depth + 1)?);
            }
            Ok(merge_recovered(recovered))
        }
    }
}

/// The wrapped payload of `{"output": ...}`-style objects with no other keys
fn envelope_payload(map: &Map<String, Value>) -> Option<&Value> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;
    if !ENVELOPE_KEYS.contains(&key.as_str()) {
        return None;
    }
    match value {
        Value::String(_) | Value::Object(_) | Value::Array(_) => Some(value),
        _ => None,
    }
}

/// Several envelopes: keep a single payload as is, otherwise concatenate
/// keyword arrays into one object
fn merge_recovered(mut recovered: Vec<Value>) -> Value {
    if recovered.len() == 1 {
        return recovered.remove(0);
    }

    let mut merged = Map::new();
    for value in recovered {
        match value {
            Value::Object(map) => {
                for (key, value) in map {
                    match merged.get_mut(&key) {
                        Some(Value::Array(existing)) => {
                            if let Value::Array(more) = value {
                                existing.extend(more);
                            }
                        }
                        Some(_) => {}
                        None => {
                            merged.insert(key, value);
                        }
                    }
                }
            }
            Value::Array(items) => {
                let keywords = merged
                    .entry("keywords")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(existing) = keywords {
                    existing.extend(items);
                }
            }
            _ => {}
        }
    }
    Value::Object(merged)
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("static regex is valid")
    })
}

fn label_pattern() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(r#"^\s*["']?(?i:output|result|response|data|json)["']?\s*[:=]\s*"#)
            .expect("static regex is valid")
    })
}

/// Remove markdown code fences and stray backticks
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    let inner = match fence_pattern().captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(block) => block.as_str().to_string(),
        None => trimmed
            .replace("```json", "")
            .replace("```JSON", "")
            .replace("```", ""),
    };

    inner.trim().trim_matches('`').trim().to_string()
}

fn parse_direct(text: &str) -> Result<Value, ParseError> {
    serde_json::from_str(text).map_err(|_| ParseError::Exhausted { attempts: 1 })
}

/// Parse the first `{...}` or `[...]` span found in the text
fn parse_embedded(text: &str) -> Result<Value, ParseError> {
    let object = span(text, '{', '}');
    let array = span(text, '[', ']');

    let ordered = match (object, array) {
        (Some(o), Some(a)) if a.0 < o.0 => [Some(a), Some(o)],
        (o, a) => [o, a],
    };

    ordered
        .into_iter()
        .flatten()
        .find_map(|(start, end)| serde_json::from_str(&text[start..=end]).ok())
        .ok_or(ParseError::Exhausted { attempts: 2 })
}

fn span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then_some((start, end))
}

/// Strip a leading `output:` / `result:` style label
fn parse_labelled(text: &str) -> Result<Value, ParseError> {
    let stripped = label_pattern().replace(text, "");
    if stripped.len() == text.len() {
        return Err(ParseError::Exhausted { attempts: 3 });
    }
    let stripped = stripped.trim().trim_end_matches(',').trim();
    parse_direct(stripped).or_else(|_| parse_embedded(stripped))
}

/// Undo one level of backslash escaping
fn parse_unescaped(text: &str) -> Result<Value, ParseError> {
    if !text.contains('\\') {
        return Err(ParseError::Exhausted { attempts: 4 });
    }

    let unescaped = text
        .replace("\\\\", "\u{0}")
        .replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace('\u{0}', "\\");

    let unescaped = unescaped.trim();
    let unquoted = unescaped
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(unescaped);

    parse_direct(unquoted).or_else(|_| parse_embedded(unquoted))
}

/// Decode the outermost quoted string and hand it back as a string value
fn parse_quoted(text: &str) -> Result<Value, ParseError> {
    let (start, end) = span(text, '"', '"').ok_or(ParseError::Exhausted { attempts: 5 })?;
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::String(inner)) if inner.trim() != text.trim() => Ok(Value::String(inner)),
        _ => Err(ParseError::Exhausted { attempts: 5 }),
    }
}
