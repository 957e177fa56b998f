//! Output schema descriptors and structural checks.
//!
//! A descriptor is JSON:
//! - a type name: `"string"`, `"number"`, `"integer"`, `"boolean"`,
//!   `"array"`, `"object"` or `"any"`;
//! - an object whose keys are required and whose values are descriptors;
//! - a one-element array whose element describes every item (`[]` for any items).

use std::collections::BTreeMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Array(Option<Box<Schema>>),
    Object(BTreeMap<String, Schema>),
}

impl Schema {
    /// A schema that accepts any object.
    pub fn empty() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Parse a descriptor, collecting every malformed part.
    pub fn parse(descriptor: &Value) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();
        let schema = parse_at(descriptor, "$", &mut problems);
        if problems.is_empty() {
            Ok(schema)
        } else {
            Err(problems)
        }
    }

    /// Every mismatch between `value` and this schema. Empty when valid.
    pub fn check(&self, value: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        check_at(self, value, "$", &mut problems);
        problems
    }

    /// Whether a dotted path below a value of this schema can resolve.
    ///
    /// Objects are open: a key the descriptor does not list is accepted.
    pub fn check_path(&self, segments: &[&str]) -> Result<(), String> {
        let Some((segment, rest)) = segments.split_first() else {
            return Ok(());
        };
        match self {
            Self::Any => Ok(()),
            Self::Object(fields) => fields
                .get(*segment)
                .map_or(Ok(()), |field| field.check_path(rest)),
            Self::Array(item) => {
                if segment.parse::<usize>().is_err() {
                    return Err(format!("`{segment}` is not an array index"));
                }
                item.as_deref().map_or(Ok(()), |item| item.check_path(rest))
            }
            scalar => Err(format!(
                "cannot look up `{segment}` in a value of type {}",
                expected_name(scalar)
            )),
        }
    }
}

fn parse_at(descriptor: &Value, at: &str, problems: &mut Vec<String>) -> Schema {
    match descriptor {
        Value::String(name) => match name.as_str() {
            "any" => Schema::Any,
            "string" => Schema::String,
            "number" => Schema::Number,
            "integer" => Schema::Integer,
            "boolean" => Schema::Boolean,
            "array" => Schema::Array(None),
            "object" => Schema::empty(),
            other => {
                problems.push(format!("{at}: unknown type `{other}`"));
                Schema::Any
            }
        },
        Value::Object(fields) => Schema::Object(
            fields
                .iter()
                .map(|(key, sub)| (key.clone(), parse_at(sub, &format!("{at}.{key}"), problems)))
                .collect(),
        ),
        Value::Array(items) => match items.as_slice() {
            [] => Schema::Array(None),
            [item] => Schema::Array(Some(Box::new(parse_at(item, &format!("{at}[]"), problems)))),
            _ => {
                problems.push(format!(
                    "{at}: array descriptors take exactly one item descriptor, got {}",
                    items.len()
                ));
                Schema::Array(None)
            }
        },
        other => {
            problems.push(format!("{at}: `{other}` is not a type descriptor"));
            Schema::Any
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_at(schema: &Schema, value: &Value, at: &str, problems: &mut Vec<String>) {
    let ok = match schema {
        Schema::Any => true,
        Schema::String => value.is_string(),
        Schema::Number => value.is_number(),
        Schema::Integer => value.is_i64() || value.is_u64(),
        Schema::Boolean => value.is_boolean(),
        Schema::Array(item) => match value.as_array() {
            Some(items) => {
                if let Some(item) = item {
                    for (i, v) in items.iter().enumerate() {
                        check_at(item, v, &format!("{at}[{i}]"), problems);
                    }
                }
                true
            }
            None => false,
        },
        Schema::Object(fields) => match value.as_object() {
            Some(map) => {
                for (key, sub) in fields {
                    match map.get(key) {
                        Some(v) => check_at(sub, v, &format!("{at}.{key}"), problems),
                        None => problems.push(format!("{at}: missing required key `{key}`")),
                    }
                }
                true
            }
            None => false,
        },
    };
    if !ok {
        problems.push(format!(
            "{at}: expected {}, found {}",
            expected_name(schema),
            type_name(value)
        ));
    }
}

fn expected_name(schema: &Schema) -> &'static str {
    match schema {
        Schema::Any => "any",
        Schema::String => "string",
        Schema::Number => "number",
        Schema::Integer => "integer",
        Schema::Boolean => "boolean",
        Schema::Array(_) => "array",
        Schema::Object(_) => "object",
    }
}
