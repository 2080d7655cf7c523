//! Recovery of structured JSON from free-form model output.
//!
//! Strategies, cheapest first; the first value that parses wins:
//! 1. fenced code blocks (```` ``` ```` or ```` ```json ````), in order of appearance
//! 2. the span from the first `{` to the last `}`
//! 3. every `{ ... }` span inside that range, outermost-first, over a bounded prefix
//!
//! When looking for a recommendation, every fenced block is checked against the
//! acceptance rule before strategies 2 and 3 run.
//!
//! Nothing here panics or errors; unrecoverable input yields `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use advisor_common::truncate_utf8;

use crate::model::{RecommendationResult, Source};

/// Text beyond this many bytes is not considered by the brute-force pass.
pub const MAX_EXTRACT_BYTES: usize = 8 * 1024;

/// Upper bound on substring parse attempts in the brute-force pass.
pub const MAX_BRUTE_FORCE_ATTEMPTS: usize = 20_000;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?i:json)?(.*?)```").expect("valid regex"));

/// Best-effort extraction of the first JSON value embedded in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    fenced_values(text).next().or_else(|| unfenced_value(text))
}

/// Extract a recommendation from model text. Every fenced block is offered to
/// [`accept`] before the unfenced strategies run, so a block holding some
/// other JSON does not hide a later recommendation block. A value that parses
/// but lacks a `recommended_ids` array counts as "nothing found".
pub fn extract_recommendation(text: &str) -> Option<RecommendationResult> {
    fenced_values(text)
        .find_map(|value| accept(&value))
        .or_else(|| unfenced_value(text).as_ref().and_then(accept))
}

fn fenced_values(text: &str) -> impl Iterator<Item = Value> + '_ {
    FENCED_BLOCK.captures_iter(text).filter_map(|caps| {
        let block = caps.get(1).map_or("", |m| m.as_str()).trim();
        serde_json::from_str::<Value>(block).ok()
    })
}

fn unfenced_value(text: &str) -> Option<Value> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if first >= last {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(&text[first..=last]) {
        return Some(value);
    }

    brute_force(truncate_utf8(text, MAX_EXTRACT_BYTES), first)
}

/// Acceptance rule for a parsed value: it must be an object whose
/// `recommended_ids` is an array. The remaining fields are normalised:
/// ids keep strings and stringified numbers, `reason` defaults to empty,
/// `sources` keeps well-formed entries only.
pub fn accept(value: &Value) -> Option<RecommendationResult> {
    let object = value.as_object()?;
    let ids = object.get("recommended_ids")?.as_array()?;

    let recommended_ids = ids
        .iter()
        .filter_map(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let sources = object
        .get("sources")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(source_from).collect())
        .unwrap_or_default();

    Some(RecommendationResult {
        recommended_ids,
        reason,
        sources,
        debug: None,
    })
}

fn source_from(entry: &Value) -> Option<Source> {
    match entry {
        Value::String(s) => Some(Source {
            title: s.clone(),
            link: s.clone(),
        }),
        Value::Object(fields) => {
            let text = |key: &str| match fields.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Some(Source {
                title: text("title"),
                link: text("link"),
            })
        }
        _ => None,
    }
}

fn brute_force(text: &str, first_open: usize) -> Option<Value> {
    let opens: Vec<usize> = text
        .match_indices('{')
        .map(|(i, _)| i)
        .filter(|&i| i >= first_open)
        .collect();
    let closes: Vec<usize> = text.rmatch_indices('}').map(|(i, _)| i).collect();

    let mut attempts = 0;
    for &open in &opens {
        for &close in &closes {
            if close <= open {
                break;
            }
            attempts += 1;
            if attempts > MAX_BRUTE_FORCE_ATTEMPTS {
                return None;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&text[open..=close]) {
                return Some(value);
            }
        }
    }
    None
}
