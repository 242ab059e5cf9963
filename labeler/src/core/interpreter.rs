//! Model reply interpretation
//!
//! Turns the generator's raw reply into a label drawn from the schema's
//! declared label set. Anything that cannot be matched yields `None`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use shared::{component_debug, AnnotationSchema, Component};

/// Confidence assumed when the reply omits a usable value
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// A reply that resolved to declared labels
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Accepted labels, in reply order; exactly one for single-label schemas
    pub labels: Vec<String>,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

impl Interpretation {
    /// Stored label text; multi-select labels are joined with ", "
    pub fn predicted_label(&self) -> String {
        self.labels.join(", ")
    }
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern compiles"))
}

/// Parse the raw reply text into a JSON object, looking inside prose or code fences if needed
fn parse_reply(raw: &str) -> Option<serde_json::Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(map);
    }

    let block = object_pattern().find(raw)?;
    match serde_json::from_str::<Value>(block.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn normalize(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Resolve one candidate against the declared labels: exact first, then case/whitespace-insensitive
pub fn match_label(candidate: &str, declared: &[String]) -> Option<String> {
    if let Some(exact) = declared.iter().find(|l| l.as_str() == candidate) {
        return Some(exact.clone());
    }

    let wanted = normalize(candidate);
    declared.iter().find(|l| normalize(l) == wanted).cloned()
}

/// Read a confidence value from a number or numeric string, clamped into [0, 1]
fn read_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(c) if !c.is_nan() => c.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

fn candidate_labels(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Interpret a raw reply against a schema
pub fn interpret(schema: &AnnotationSchema, raw: &str) -> Option<Interpretation> {
    let Some(reply) = parse_reply(raw) else {
        component_debug!(Component::Interpreter, "Reply for schema '{}' is not structured data", schema.name);
        return None;
    };

    let candidates = candidate_labels(reply.get("label").or_else(|| reply.get("labels")));

    let labels = if schema.is_multi() {
        let mut accepted: Vec<String> = Vec::new();
        for candidate in &candidates {
            match match_label(candidate, &schema.labels) {
                Some(label) if !accepted.contains(&label) => accepted.push(label),
                Some(_) => {}
                None => component_debug!(
                    Component::Interpreter,
                    "Dropping undeclared label '{}' for schema '{}'",
                    candidate,
                    schema.name
                ),
            }
        }
        accepted
    } else {
        candidates
            .first()
            .and_then(|candidate| match_label(candidate, &schema.labels))
            .into_iter()
            .collect()
    };

    if labels.is_empty() {
        component_debug!(Component::Interpreter, "No usable label in reply for schema '{}'", schema.name);
        return None;
    }

    Some(Interpretation {
        labels,
        confidence: read_confidence(reply.get("confidence")),
        reasoning: reply.get("reasoning").and_then(Value::as_str).map(str::to_string),
    })
}
