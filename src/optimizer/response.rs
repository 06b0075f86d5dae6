//! Validation of the service's reply.
//!
//! The reply is untrusted. Any structural problem rejects the whole
//! response; nothing is partially accepted.

use serde_json::{Map, Value};
use tracing::{debug, error};

use super::types::OptimizationResponse;
use crate::changes::{ChangeScope, ChangeType, ProposedChange};
use crate::error::{PlateTuneError, Result};
use crate::project::ObjectTarget;

/// Strip Markdown code fences from a model reply.
///
/// Models sometimes wrap JSON in ```json ... ``` even when told not to.
pub fn strip_markdown_json(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    // Opening fence, with optional language tag
    let after_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed.trim_start_matches('`'),
    };
    let cleaned = after_open.trim_end();
    cleaned.strip_suffix("```").unwrap_or(cleaned).trim()
}

/// Parse and validate a raw reply into an [`OptimizationResponse`].
pub fn parse_response(text: &str) -> Result<OptimizationResponse> {
    let cleaned = strip_markdown_json(text);
    let json: Value = serde_json::from_str(cleaned).map_err(|e| {
        error!("Failed to parse optimization response as JSON: {}", e);
        invalid(format!("response is not valid JSON: {}", e))
    })?;
    let root = json
        .as_object()
        .ok_or_else(|| invalid("response root is not an object"))?;

    let changes = root
        .get("changes")
        .ok_or_else(|| invalid("response has no 'changes' field"))?
        .as_array()
        .ok_or_else(|| invalid("'changes' is not an array"))?
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_change(index, entry))
        .collect::<Result<Vec<_>>>()?;

    let version = match root.get("version") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid("'version' is not a non-negative integer"))?,
        ),
    };

    let global_rationale = field(root, "globalRationale", "global_rationale")
        .and_then(Value::as_str)
        .map(str::to_string);

    let warnings = match root.get("warnings") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|w| {
                w.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("'warnings' must contain only strings"))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("'warnings' is not an array")),
    };

    debug!(
        "Validated optimization response: {} changes, {} warnings",
        changes.len(),
        warnings.len()
    );

    Ok(OptimizationResponse {
        version,
        changes,
        global_rationale,
        warnings,
    })
}

fn parse_change(index: usize, entry: &Value) -> Result<ProposedChange> {
    let obj = entry
        .as_object()
        .ok_or_else(|| invalid(format!("change #{} is not an object", index)))?;

    let parameter = obj
        .get("parameter")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("change #{} has no string 'parameter'", index)))?
        .to_string();

    let new_value = field(obj, "newValue", "new_value")
        .cloned()
        .ok_or_else(|| invalid(format!("change #{} ({}) has no 'newValue'", index, parameter)))?;

    let scope = match obj.get("scope") {
        None | Some(Value::Null) => ChangeScope::Global,
        Some(Value::String(s)) if s == "global" => ChangeScope::Global,
        Some(Value::String(s)) if s == "object" => ChangeScope::Object,
        Some(other) => {
            return Err(invalid(format!(
                "change #{} ({}) has unrecognized scope {}",
                index, parameter, other
            )))
        }
    };

    let change_type = match field(obj, "changeType", "change_type") {
        None | Some(Value::Null) => ChangeType::Absolute,
        Some(Value::String(s)) if s == "absolute" => ChangeType::Absolute,
        Some(Value::String(s)) if s == "relative" => ChangeType::Relative,
        Some(other) => {
            return Err(invalid(format!(
                "change #{} ({}) has unrecognized changeType {}",
                index, parameter, other
            )))
        }
    };

    let target = match obj.get("target") {
        None | Some(Value::Null) => None,
        Some(Value::Object(t)) => Some(parse_target(index, &parameter, t)?),
        Some(_) => {
            return Err(invalid(format!(
                "change #{} ({}) has a non-object 'target'",
                index, parameter
            )))
        }
    };

    let reason = obj.get("reason").and_then(Value::as_str).map(str::to_string);

    Ok(ProposedChange {
        scope,
        target,
        parameter,
        new_value,
        change_type,
        reason,
    })
}

fn parse_target(index: usize, parameter: &str, t: &Map<String, Value>) -> Result<ObjectTarget> {
    let object_name = match field(t, "objectName", "object_name") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(invalid(format!(
                "change #{} ({}) has a non-string target objectName",
                index, parameter
            )))
        }
    };
    let plate_index = match field(t, "plateIndex", "plate_index") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(|| {
            invalid(format!(
                "change #{} ({}) has an invalid target plateIndex",
                index, parameter
            ))
        })?),
    };
    Ok(ObjectTarget {
        object_name,
        plate_index,
    })
}

/// Look up a field by its camelCase name, falling back to snake_case.
fn field<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

fn invalid(message: impl Into<String>) -> PlateTuneError {
    PlateTuneError::InvalidResponse(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_markdown_json() {
        assert_eq!(strip_markdown_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_json("```\n{}\n```  "), "{}");
        assert_eq!(strip_markdown_json("  {\"changes\":[]} "), "{\"changes\":[]}");
    }

    #[test]
    fn test_parse_full_response() {
        let text = r#"```json
{
  "version": 1,
  "changes": [
    {"scope": "global", "parameter": "layer_height_mm", "newValue": 0.16, "reason": "finer layers"},
    {"scope": "object", "target": {"objectName": "Bracket", "plateIndex": 0},
     "parameter": "wall_line_count", "newValue": 4},
    {"parameter": "speeds.outer_wall", "new_value": -0.2, "change_type": "relative"}
  ],
  "globalRationale": "Stronger part",
  "warnings": ["check bed adhesion"]
}
```"#;
        let resp = parse_response(text).unwrap();
        assert_eq!(resp.version, Some(1));
        assert_eq!(resp.changes.len(), 3);
        assert_eq!(resp.changes[0].reason.as_deref(), Some("finer layers"));
        assert_eq!(resp.changes[1].scope, ChangeScope::Object);
        assert_eq!(
            resp.changes[1].target,
            Some(ObjectTarget::new("Bracket", Some(0)))
        );
        assert_eq!(resp.changes[2].scope, ChangeScope::Global);
        assert_eq!(resp.changes[2].change_type, ChangeType::Relative);
        assert_eq!(resp.changes[2].new_value, json!(-0.2));
        assert_eq!(resp.global_rationale.as_deref(), Some("Stronger part"));
        assert_eq!(resp.warnings, vec!["check bed adhesion".to_string()]);
    }

    #[test]
    fn test_minimal_response() {
        let resp = parse_response(r#"{"changes": []}"#).unwrap();
        assert!(resp.changes.is_empty());
        assert_eq!(resp.version, None);
        assert!(resp.warnings.is_empty());
    }

    #[test]
    fn test_null_new_value_is_present() {
        let resp = parse_response(r#"{"changes": [{"parameter": "x", "newValue": null}]}"#).unwrap();
        assert_eq!(resp.changes[0].new_value, Value::Null);
    }

    #[test]
    fn test_rejects_structural_problems() {
        let cases = [
            "not json",
            "[1, 2]",
            r#"{"warnings": []}"#,
            r#"{"changes": {}}"#,
            r#"{"changes": [42]}"#,
            r#"{"changes": [{"newValue": 1}]}"#,
            r#"{"changes": [{"parameter": 5, "newValue": 1}]}"#,
            r#"{"changes": [{"parameter": "x"}]}"#,
            r#"{"changes": [{"parameter": "x", "newValue": 1, "scope": "plate"}]}"#,
            r#"{"changes": [{"parameter": "x", "newValue": 1, "changeType": "multiply"}]}"#,
            r#"{"changes": [{"parameter": "x", "newValue": 1, "target": "Cube"}]}"#,
            r#"{"changes": [{"parameter": "x", "newValue": 1, "target": {"plateIndex": -1}}]}"#,
            r#"{"changes": [], "warnings": "careful"}"#,
        ];
        for case in cases {
            let err = parse_response(case).unwrap_err();
            assert!(
                matches!(err, PlateTuneError::InvalidResponse(_)),
                "expected InvalidResponse for {}",
                case
            );
        }
    }

    #[test]
    fn test_one_bad_change_rejects_all() {
        let text = r#"{"changes": [
            {"parameter": "layer_height_mm", "newValue": 0.2},
            {"parameter": "wall_line_count"}
        ]}"#;
        assert!(parse_response(text).is_err());
    }
}
