//! Variable-reference token decoding.
//!
//! A reference is a brace-delimited object literal with an integer `id` and an
//! optional `name`. Stored expressions use strict JSON
//! (`{ "id": 1, "name": "base_price" }`); hand-written ones often use bare keys
//! and single quotes (`{id: 1, name: 'base_price'}`), so both are accepted.

use super::ast::VariableRef;
use crate::model::variable::VariableId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static BARE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").expect("valid bare key regex")
});
static SINGLE_QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^'\\]*)'").expect("valid single quote regex"));

/// Decodes one brace-delimited snippet into a reference.
///
/// Returns a human-readable reason on failure; the caller attaches the span.
pub(crate) fn parse_reference(snippet: &str) -> Result<VariableRef, String> {
    let object = parse_object(snippet)?;

    let id = match object.get("id") {
        None => return Err("reference is missing the `id` field".to_string()),
        Some(value) => parse_id(value)?,
    };
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(VariableRef { id, name })
}

fn parse_object(snippet: &str) -> Result<Map<String, Value>, String> {
    let value = match serde_json::from_str::<Value>(snippet) {
        Ok(value) => value,
        Err(strict_err) => {
            let relaxed = relax(snippet);
            serde_json::from_str::<Value>(&relaxed)
                .map_err(|_| format!("not a valid object literal: {strict_err}"))?
        }
    };

    match value {
        Value::Object(object) => Ok(object),
        other => Err(format!("expected an object literal, got `{other}`")),
    }
}

fn relax(snippet: &str) -> String {
    let quoted_values = SINGLE_QUOTED_RE.replace_all(snippet, "\"$1\"");
    BARE_KEY_RE
        .replace_all(&quoted_values, "$1\"$2\"$3")
        .into_owned()
}

fn parse_id(value: &Value) -> Result<VariableId, String> {
    if let Some(id) = value.as_i64() {
        return Ok(id);
    }
    match value.as_f64() {
        Some(number) if number.fract() == 0.0 && number.abs() < i64::MAX as f64 => {
            Ok(number as VariableId)
        }
        _ => Err(format!("reference `id` must be an integer, got `{value}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_reference;

    #[test]
    fn parses_strict_json_reference() {
        let reference =
            parse_reference(r#"{ "id": 1, "name": "base_price" }"#).expect("strict json");
        assert_eq!(reference.id, 1);
        assert_eq!(reference.name.as_deref(), Some("base_price"));
    }

    #[test]
    fn parses_bare_key_reference() {
        let reference = parse_reference("{id:2}").expect("bare key");
        assert_eq!(reference.id, 2);
        assert_eq!(reference.name, None);

        let reference = parse_reference("{ id: 3, name: 'discount' }").expect("single quotes");
        assert_eq!(reference.id, 3);
        assert_eq!(reference.name.as_deref(), Some("discount"));
    }

    #[test]
    fn accepts_integral_float_id() {
        assert_eq!(parse_reference(r#"{"id": 4.0}"#).expect("integral float").id, 4);
    }

    #[test]
    fn rejects_missing_or_non_integer_id() {
        let missing = parse_reference(r#"{"name": "x"}"#).expect_err("missing id");
        assert!(missing.contains("missing"));

        let fractional = parse_reference(r#"{"id": 1.5}"#).expect_err("fractional id");
        assert!(fractional.contains("integer"));

        let text = parse_reference(r#"{"id": "one"}"#).expect_err("string id");
        assert!(text.contains("integer"));
    }

    #[test]
    fn rejects_non_object_literal() {
        assert!(parse_reference("{not json at all}").is_err());
        assert!(parse_reference("{}").expect_err("empty").contains("missing"));
    }
}
