//! Reply parsing: model text → field map.
//!
//! The reply is expected to be a JSON object keyed by the requested fields.
//! An outer markdown code fence is tolerated; anything else that fails
//! `serde_json` is a parse failure. Requested keys the model leaves out are
//! filled with `null` and reported; keys nobody asked for are dropped.

use crate::config::FieldList;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// A reply that parsed into a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// One entry per distinct requested field.
    pub values: Map<String, Value>,
    /// Requested fields absent from the reply, in request order.
    pub missing_fields: Vec<String>,
}

/// Why a reply could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// Not JSON at all.
    Syntax(String),
    /// Valid JSON of the wrong kind (`found` names it).
    NotAnObject { found: &'static str },
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)(?:\r?\n)?```$").unwrap());

/// Remove a single outer ```` ``` ```` / ```` ```json ```` fence, if present.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(body) => body.as_str(),
        None => trimmed,
    }
}

/// Parse a model reply against the requested fields.
pub fn parse_reply(reply: &str, fields: &FieldList) -> Result<ParsedReply, ReplyError> {
    let body = strip_code_fence(reply);
    let value: Value =
        serde_json::from_str(body).map_err(|e| ReplyError::Syntax(e.to_string()))?;

    let mut object = match value {
        Value::Object(map) => map,
        other => {
            return Err(ReplyError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let mut values = Map::new();
    let mut missing_fields = Vec::new();
    for field in fields.iter() {
        if values.contains_key(field) {
            continue;
        }
        match object.remove(field) {
            Some(v) => {
                values.insert(field.to_string(), v);
            }
            None => {
                missing_fields.push(field.to_string());
                values.insert(field.to_string(), Value::Null);
            }
        }
    }

    if !object.is_empty() {
        let extra: Vec<&str> = object.keys().map(String::as_str).collect();
        debug!("Ignoring unrequested keys in reply: {:?}", extra);
    }

    Ok(ParsedReply {
        values,
        missing_fields,
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
