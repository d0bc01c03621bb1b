// src/scoring/extract.rs

//! Lenient reading of model replies: strict JSON, then a repaired JSON
//! object, then per-key pattern matching.

use regex::Regex;
use serde_json::Value;

pub const RUBRIC_KEYS: [&str; 4] = ["semantic_depth", "collocation", "grammar", "image_relevance"];

/// Rubric values as found in the reply, before clamping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRubric {
    pub semantic_depth: Option<f64>,
    pub collocation: Option<f64>,
    pub grammar: Option<f64>,
    pub image_relevance: Option<f64>,
    pub comment: Option<String>,
}

impl RawRubric {
    fn set(&mut self, key: &str, value: f64) {
        match key {
            "semantic_depth" => self.semantic_depth = Some(value),
            "collocation" => self.collocation = Some(value),
            "grammar" => self.grammar = Some(value),
            "image_relevance" => self.image_relevance = Some(value),
            _ => {}
        }
    }

    fn has_any_score(&self) -> bool {
        self.semantic_depth.is_some()
            || self.collocation.is_some()
            || self.grammar.is_some()
            || self.image_relevance.is_some()
    }

    fn from_object(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut rubric = RawRubric::default();
        for key in RUBRIC_KEYS {
            let number = match object.get(key) {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            };
            if let Some(n) = number {
                rubric.set(key, n);
            }
        }
        rubric.comment = object
            .get("comment")
            .and_then(Value::as_str)
            .map(str::to_string);
        rubric.has_any_score().then_some(rubric)
    }
}

/// Reads a rubric out of `text`, or `None` when no score can be found.
pub fn extract_rubric(text: &str) -> Option<RawRubric> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(r) = RawRubric::from_object(&value) {
            return Some(r);
        }
    }

    if let Some(candidate) = repaired_object(text) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if let Some(r) = RawRubric::from_object(&value) {
                return Some(r);
            }
        }
    }

    by_pattern(text)
}

/// The span from the first `{` to the last `}`, with trailing commas removed.
fn repaired_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let trailing_comma = Regex::new(r",\s*([}\]])").ok()?;
    Some(trailing_comma.replace_all(&text[start..=end], "$1").into_owned())
}

fn by_pattern(text: &str) -> Option<RawRubric> {
    let mut rubric = RawRubric::default();
    for key in RUBRIC_KEYS {
        let Ok(re) = Regex::new(&format!(r#"(?i)"?{}"?\s*:\s*"?(-?[\d.]+)"#, key)) else {
            continue;
        };
        if let Some(value) = re
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        {
            rubric.set(key, value);
        }
    }
    if !rubric.has_any_score() {
        return None;
    }
    rubric.comment = comment_by_pattern(text);
    Some(rubric)
}

fn comment_by_pattern(text: &str) -> Option<String> {
    let quoted = [
        r#"(?is)["']?comment["']?\s*:\s*"(.*?)""#,
        r#"(?is)["']?comment["']?\s*:\s*'(.*?)'"#,
    ];
    for pattern in quoted {
        let Ok(re) = Regex::new(pattern) else { continue };
        if let Some(m) = re.captures(text).and_then(|c| c.get(1)) {
            return Some(m.as_str().replace("\\\"", "\"").replace('\n', " "));
        }
    }
    None
}
