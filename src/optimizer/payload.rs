//! Outbound request payload.

use tracing::debug;

use super::types::{CurrentSettings, IntentDetails, ObjectSettings, PayloadFlags, RequestPayload, PAYLOAD_VERSION};
use crate::project::{NormalizedProject, PlateImage};

const FALLBACK_LANGUAGE: &str = "en";

/// Reduce a language tag to a lower-case two-letter code.
///
/// `"de-DE"` and `"de_DE"` become `"de"`; anything that does not start
/// with a two-letter primary subtag falls back to `"en"`.
pub fn normalize_language(tag: &str) -> String {
    let primary = tag
        .trim()
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if primary.len() == 2 && primary.chars().all(|c| c.is_ascii_alphabetic()) {
        primary
    } else {
        FALLBACK_LANGUAGE.to_string()
    }
}

/// Build the request payload for one optimize round.
pub fn build_request_payload(
    project: &NormalizedProject,
    intent: &IntentDetails,
    images: &[PlateImage],
    flags: &PayloadFlags,
) -> RequestPayload {
    let objects = project
        .object_overrides
        .records()
        .map(|record| ObjectSettings {
            object_name: record.object_name.clone(),
            plate_index: record.plate_index,
            settings: record.settings.clone(),
        })
        .collect();

    let payload = RequestPayload {
        version: PAYLOAD_VERSION,
        project_summary: project.summary.clone(),
        current_settings: CurrentSettings {
            global: project.settings.clone(),
            objects,
        },
        user_modified_settings: project.user_modified_settings.clone(),
        intent_details: intent.clone(),
        plate_images: images.to_vec(),
        allow_user_setting_overrides: flags.allow_user_setting_overrides,
        target_language: normalize_language(&flags.language),
    };

    debug!(
        "Built request payload: {} global settings, {} object overrides, {} images",
        payload.current_settings.global.len(),
        payload.current_settings.objects.len(),
        payload.plate_images.len()
    );
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SettingValue;
    use crate::optimizer::types::Priority;
    use crate::project::ObjectTarget;

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("de-DE"), "de");
        assert_eq!(normalize_language("PT_br"), "pt");
        assert_eq!(normalize_language("fr"), "fr");
        assert_eq!(normalize_language(""), "en");
        assert_eq!(normalize_language("deu"), "en");
        assert_eq!(normalize_language("1x"), "en");
    }

    #[test]
    fn test_payload_shape() {
        let mut project = NormalizedProject::default();
        project
            .settings
            .insert("layer_height_mm".to_string(), SettingValue::Number(0.2));
        project
            .object_overrides
            .ensure(&ObjectTarget::new("Cube", Some(0)))
            .settings
            .insert("wall_line_count".to_string(), SettingValue::Number(4.0));
        project.user_modified_settings = vec!["layer_height".to_string()];

        let intent = IntentDetails {
            priority: Some(Priority::Strength),
            ..Default::default()
        };
        let images = vec![PlateImage {
            plate_index: Some(0),
            name: "plate_1.png".to_string(),
            data_url: "data:image/png;base64,AAAA".to_string(),
        }];
        let flags = PayloadFlags {
            allow_user_setting_overrides: true,
            language: "de-AT".to_string(),
        };

        let payload = build_request_payload(&project, &intent, &images, &flags);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["targetLanguage"], "de");
        assert_eq!(json["allowUserSettingOverrides"], true);
        assert_eq!(json["currentSettings"]["global"]["layer_height_mm"], 0.2);
        assert_eq!(json["currentSettings"]["objects"][0]["objectName"], "Cube");
        assert_eq!(json["currentSettings"]["objects"][0]["plateIndex"], 0);
        assert_eq!(json["intentDetails"], serde_json::json!({"priority": "strength"}));
        assert_eq!(json["plateImages"][0]["plateIndex"], 0);
        assert_eq!(json["userModifiedSettings"][0], "layer_height");
    }
}
