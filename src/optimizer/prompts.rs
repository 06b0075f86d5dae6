//! Prompts and schemas for optimization requests.

use serde_json::Value;

use super::types::RequestPayload;

pub const SYSTEM_PROMPT: &str = "You are a 3D printing process-settings optimizer for Bambu Studio projects. \
Always respond with valid JSON only, no markdown formatting or code blocks.";

/// JSON schema for the optimization response.
///
/// `newValue` is left untyped: numbers, booleans, strings and
/// percentage strings are all legal depending on the parameter.
pub fn optimization_response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "version": { "type": "integer" },
            "changes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "scope": { "type": "string", "enum": ["global", "object"] },
                        "target": {
                            "type": "object",
                            "properties": {
                                "objectName": { "type": "string" },
                                "plateIndex": { "type": ["integer", "null"] }
                            },
                            "required": ["objectName"]
                        },
                        "parameter": {
                            "type": "string",
                            "description": "Canonical setting key from currentSettings, or speeds.<role> for a role already in speeds"
                        },
                        "newValue": {
                            "description": "Absolute value, or a fractional delta when changeType is relative"
                        },
                        "changeType": { "type": "string", "enum": ["absolute", "relative"] },
                        "reason": { "type": "string" }
                    },
                    "required": ["scope", "parameter", "newValue"]
                }
            },
            "globalRationale": { "type": "string" },
            "warnings": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["changes"]
    })
}

fn schema_text() -> String {
    serde_json::to_string_pretty(&optimization_response_schema()).unwrap_or_else(|_| "{}".to_string())
}

/// Payload JSON for embedding in the prompt. Image data goes out as
/// separate content blocks, so `dataUrl` is dropped here.
pub fn payload_for_prompt(payload: &RequestPayload) -> Value {
    let mut json = serde_json::to_value(payload).unwrap_or(Value::Null);
    if let Some(images) = json.get_mut("plateImages").and_then(Value::as_array_mut) {
        for image in images {
            if let Some(obj) = image.as_object_mut() {
                obj.remove("dataUrl");
            }
        }
    }
    json
}

/// Build the user prompt for one optimize round.
pub fn build_user_prompt(payload: &RequestPayload) -> String {
    let schema = schema_text();
    let project = serde_json::to_string_pretty(&payload_for_prompt(payload)).unwrap_or_else(|_| "{}".to_string());
    let lock_rule = if payload.allow_user_setting_overrides {
        "- Settings listed in userModifiedSettings may be changed if it clearly helps the goal."
    } else {
        "- Do NOT change any setting listed in userModifiedSettings; the user tuned those deliberately."
    };

    format!(
        r#"Suggest process-setting changes for the Bambu Studio project described below.

RULES:
- Only use parameter names that appear in currentSettings.global, currentSettings.objects[].settings, or speeds.<role> for a role already listed under speeds.
- Use scope "object" with a target {{objectName, plateIndex}} only for objects listed in projectSummary.plates.
- Absolute changes give the new value. Relative changes give a fractional delta (-0.2 means 20% lower).
- Keep values physically plausible for the printer, nozzle and filament.
- Suggest nothing when the current settings already fit the intent.
{lock_rule}
- Write every reason, the globalRationale and the warnings in language "{language}".
- Attached images, if any, are plate previews in plateImages order.

Return a JSON object matching this schema:
{schema}

PROJECT:
{project}"#,
        language = payload.target_language,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::payload::build_request_payload;
    use crate::optimizer::types::{IntentDetails, PayloadFlags};
    use crate::project::{NormalizedProject, PlateImage};

    fn payload(allow: bool) -> RequestPayload {
        let images = vec![PlateImage {
            plate_index: Some(0),
            name: "plate_1.png".to_string(),
            data_url: "data:image/png;base64,SECRETBYTES".to_string(),
        }];
        let flags = PayloadFlags {
            allow_user_setting_overrides: allow,
            language: "fr-CA".to_string(),
        };
        build_request_payload(&NormalizedProject::default(), &IntentDetails::default(), &images, &flags)
    }

    #[test]
    fn test_prompt_omits_image_data() {
        let prompt = build_user_prompt(&payload(false));
        assert!(!prompt.contains("SECRETBYTES"));
        assert!(prompt.contains("plate_1.png"));
        assert!(prompt.contains("language \"fr\""));
    }

    #[test]
    fn test_lock_rule_follows_flag() {
        assert!(build_user_prompt(&payload(false)).contains("Do NOT change"));
        assert!(!build_user_prompt(&payload(true)).contains("Do NOT change"));
    }

    #[test]
    fn test_schema_requires_changes() {
        let schema = optimization_response_schema();
        assert_eq!(schema["required"], serde_json::json!(["changes"]));
        assert_eq!(
            schema["properties"]["changes"]["items"]["properties"]["changeType"]["enum"],
            serde_json::json!(["absolute", "relative"])
        );
    }
}
