//! `{{path}}` placeholder rendering for step input templates.
//!
//! A placeholder that is the whole string is replaced by the referenced value
//! with its JSON type intact. Placeholders embedded in longer strings are
//! interpolated as text. Paths are dotted key lookups into the shared
//! context; right after a step id an `output` segment may be used
//! (`{{scoring.output.ranked_leads}}`).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::context::SharedContext;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid regex"));

/// Every placeholder path referenced anywhere inside `value`, in document order.
pub fn references(value: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    collect_refs(value, &mut refs);
    refs
}

fn collect_refs(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for cap in PLACEHOLDER_RE.captures_iter(s) {
                refs.push(cap[1].to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, refs)),
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, refs)),
        _ => {}
    }
}

/// Render `template` against `context`.
///
/// Returns the rendered value, or every unresolved placeholder path.
pub fn render(template: &Value, context: &SharedContext) -> Result<Value, Vec<String>> {
    let mut unresolved = Vec::new();
    let rendered = render_value(template, context, &mut unresolved);
    if unresolved.is_empty() {
        Ok(rendered)
    } else {
        Err(unresolved)
    }
}

fn render_value(value: &Value, context: &SharedContext, unresolved: &mut Vec<String>) -> Value {
    match value {
        Value::String(s) => render_string(s, context, unresolved),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, context, unresolved))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, context, unresolved)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(s: &str, context: &SharedContext, unresolved: &mut Vec<String>) -> Value {
    // Whole-string placeholder keeps the referenced type.
    if let Some(cap) = PLACEHOLDER_RE.captures(s) {
        if cap.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len()) {
            let path = &cap[1];
            return match lookup(context, path) {
                Some(v) => v.clone(),
                None => {
                    unresolved.push(path.to_string());
                    Value::Null
                }
            };
        }
    }

    let text = PLACEHOLDER_RE.replace_all(s, |cap: &regex::Captures<'_>| {
        let path = &cap[1];
        match lookup(context, path) {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => {
                unresolved.push(path.to_string());
                String::new()
            }
        }
    });
    Value::String(text.into_owned())
}

/// Resolve a dotted path against the context.
pub fn lookup<'a>(context: &'a SharedContext, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').map(str::trim);
    let head = segments.next()?;
    let root = context.get(head)?;
    let rest: Vec<&str> = segments.collect();

    let is_step = context.is_step(head);
    let skip_output =
        is_step && rest.first() == Some(&"output") && root.get("output").is_none();
    let rest = if skip_output { &rest[1..] } else { &rest[..] };

    walk(root, rest)
}

/// Follow `segments` into `value` (object keys or array indices).
pub fn walk<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
