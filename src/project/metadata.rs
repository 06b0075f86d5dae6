//! Vendor metadata outside the main config: `model_settings.config` (XML)
//! and the per-plate `plate_<n>.json` files.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use tracing::debug;

use super::archive::MODEL_SETTINGS_PATH;
use super::types::BoundingBox;
use crate::error::{PlateTuneError, Result};

/// One `<object>` of `model_settings.config`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Object-level `<metadata key value>` pairs, document order.
    pub metadata: Vec<(String, String)>,
}

/// One `<plate>` of `model_settings.config`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlateEntry {
    /// One-based, as stored.
    pub plater_id: Option<u32>,
    pub name: Option<String>,
    pub object_ids: Vec<String>,
}

impl PlateEntry {
    pub fn index(&self) -> Option<u32> {
        self.plater_id.and_then(|id| id.checked_sub(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSettings {
    /// `<metadata>` children of the root element.
    pub metadata: Vec<(String, String)>,
    pub objects: Vec<ObjectEntry>,
    pub plates: Vec<PlateEntry>,
}

impl ModelSettings {
    /// Zero-based index of the first plate that instances `object_id`.
    pub fn plate_index_of(&self, object_id: &str) -> Option<u32> {
        self.plates
            .iter()
            .find(|p| p.object_ids.iter().any(|id| id == object_id))
            .and_then(PlateEntry::index)
    }

    /// Object id for an object name on a (possibly unknown) plate.
    pub fn object_id_for(&self, name: &str, plate_index: Option<u32>) -> Option<&str> {
        self.objects
            .iter()
            .filter(|o| o.name.as_deref() == Some(name))
            .filter_map(|o| o.id.as_deref())
            .find(|id| self.plate_index_of(id) == plate_index)
    }
}

fn xml_error(message: impl ToString) -> PlateTuneError {
    PlateTuneError::Xml {
        entry: MODEL_SETTINGS_PATH.to_string(),
        message: message.to_string(),
    }
}

fn attributes(e: &BytesStart) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(xml_error)?;
        let value = attr.unescape_value().map_err(xml_error)?;
        attrs.insert(key.to_string(), value.into_owned());
    }
    Ok(attrs)
}

fn metadata_pair(e: &BytesStart) -> Result<Option<(String, String)>> {
    let mut attrs = attributes(e)?;
    Ok(attrs
        .remove("key")
        .map(|key| (key, attrs.remove("value").unwrap_or_default())))
}

fn local_name(e: &BytesStart) -> Result<String> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(xml_error)
}

/// Parse `Metadata/model_settings.config`.
pub fn parse_model_settings(xml: &str) -> Result<ModelSettings> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut settings = ModelSettings::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current_object: Option<ObjectEntry> = None;
    let mut current_plate: Option<PlateEntry> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        let (e, is_empty) = match &event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                match stack.pop().as_deref() {
                    Some("object") if stack.len() == 1 => {
                        settings.objects.extend(current_object.take());
                    }
                    Some("plate") if stack.len() == 1 => {
                        settings.plates.extend(current_plate.take());
                    }
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = local_name(e)?;
        let parent = stack.last().map(String::as_str);
        let depth = stack.len();

        match (name.as_str(), parent) {
            ("object", Some(_)) if depth == 1 => {
                let attrs = attributes(e)?;
                current_object = Some(ObjectEntry {
                    id: attrs.get("id").cloned(),
                    ..Default::default()
                });
            }
            ("plate", Some(_)) if depth == 1 => {
                current_plate = Some(PlateEntry::default());
            }
            ("metadata", Some(_)) if depth == 1 => {
                settings.metadata.extend(metadata_pair(e)?);
            }
            ("metadata", Some("object")) if depth == 2 => {
                if let (Some(object), Some((key, value))) = (current_object.as_mut(), metadata_pair(e)?) {
                    if key == "name" {
                        object.name = Some(value.clone());
                    }
                    object.metadata.push((key, value));
                }
            }
            ("metadata", Some("plate")) if depth == 2 => {
                if let (Some(plate), Some((key, value))) = (current_plate.as_mut(), metadata_pair(e)?) {
                    match key.as_str() {
                        "plater_id" => plate.plater_id = value.trim().parse().ok(),
                        "plater_name" if !value.trim().is_empty() => plate.name = Some(value),
                        _ => {}
                    }
                }
            }
            ("metadata", Some("model_instance")) if depth == 3 => {
                if let (Some(plate), Some((key, value))) = (current_plate.as_mut(), metadata_pair(e)?) {
                    if key == "object_id" && !plate.object_ids.contains(&value) {
                        plate.object_ids.push(value);
                    }
                }
            }
            _ => {}
        }

        if is_empty {
            match name.as_str() {
                "object" if depth == 1 => settings.objects.extend(current_object.take()),
                "plate" if depth == 1 => settings.plates.extend(current_plate.take()),
                _ => {}
            }
        } else {
            stack.push(name);
        }
    }

    debug!(
        "Parsed model settings: {} objects, {} plates, {} metadata keys",
        settings.objects.len(),
        settings.plates.len(),
        settings.metadata.len()
    );
    Ok(settings)
}

/// Rewrite object-level `<metadata>` values in `model_settings.config`.
///
/// `updates` maps object id to `(key, value)` pairs. Existing entries are
/// updated in place and missing ones are appended before `</object>`.
/// A rewritten entry is always written self-closing, whether the original
/// was `<metadata .../>` or a `<metadata ...></metadata>` pair. Everything
/// else passes through untouched.
pub fn rewrite_object_metadata(
    xml: &str,
    updates: &HashMap<String, Vec<(String, String)>>,
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut depth = 0usize;
    // (pending updates for the open object, keys already rewritten)
    let mut active: Option<(&Vec<(String, String)>, Vec<String>)> = None;
    // Depth to return to before output resumes (body of a replaced pair).
    let mut skip_to: Option<usize> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        if let Some(level) = skip_to {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == level {
                        skip_to = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) => {
                if depth == 1 && local_name(e)? == "object" {
                    active = attributes(e)?
                        .get("id")
                        .and_then(|id| updates.get(id))
                        .map(|pairs| (pairs, Vec::new()));
                }
                let replacement = if depth == 2 && local_name(e)? == "metadata" {
                    replace_metadata(e, active.as_mut())?
                } else {
                    None
                };
                match replacement {
                    Some(elem) => {
                        writer.write_event(Event::Empty(elem)).map_err(xml_error)?;
                        skip_to = Some(depth);
                    }
                    None => writer.write_event(event.borrow()).map_err(xml_error)?,
                }
                depth += 1;
            }
            Event::Empty(ref e) if depth == 2 && active.is_some() && local_name(e)? == "metadata" => {
                match replace_metadata(e, active.as_mut())? {
                    Some(elem) => writer.write_event(Event::Empty(elem)).map_err(xml_error)?,
                    None => writer.write_event(event.borrow()).map_err(xml_error)?,
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some((pairs, written)) = active.take() {
                        for (key, value) in pairs.iter().filter(|(k, _)| !written.contains(k)) {
                            writer
                                .write_event(Event::Text(BytesText::new("  ")))
                                .map_err(xml_error)?;
                            writer
                                .write_event(Event::Empty(metadata_element(key, value)))
                                .map_err(xml_error)?;
                            writer
                                .write_event(Event::Text(BytesText::new("\n  ")))
                                .map_err(xml_error)?;
                        }
                    }
                }
                writer.write_event(event.borrow()).map_err(xml_error)?;
            }
            other => writer.write_event(other.borrow()).map_err(xml_error)?,
        }
    }

    String::from_utf8(writer.into_inner().into_inner()).map_err(xml_error)
}

/// The updated element for an object `<metadata>` whose key has a pending
/// update, recording the key as written.
fn replace_metadata<'a>(
    e: &BytesStart,
    active: Option<&mut (&'a Vec<(String, String)>, Vec<String>)>,
) -> Result<Option<BytesStart<'a>>> {
    let Some((pairs, written)) = active else {
        return Ok(None);
    };
    let pairs: &'a Vec<(String, String)> = *pairs;
    let Some((key, _)) = metadata_pair(e)? else {
        return Ok(None);
    };
    Ok(pairs.iter().find(|(k, _)| *k == key).map(|(k, v)| {
        written.push(k.clone());
        metadata_element(k, v)
    }))
}

fn metadata_element<'a>(key: &'a str, value: &'a str) -> BytesStart<'a> {
    let mut elem = BytesStart::new("metadata");
    elem.push_attribute(("key", key));
    elem.push_attribute(("value", value));
    elem
}

// =============================================================================
// PLATE JSON
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlateInfo {
    #[serde(default)]
    pub bbox_objects: Vec<BboxObject>,
    pub bed_type: Option<String>,
    pub nozzle_diameter: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BboxObject {
    pub name: Option<String>,
    #[serde(default)]
    pub bbox: Vec<f64>,
}

impl BboxObject {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_values(&self.bbox)
    }
}

pub fn parse_plate_info(json: &str, entry: &str) -> Result<PlateInfo> {
    serde_json::from_str(json).map_err(|source| PlateTuneError::Format {
        entry: entry.to_string(),
        source,
    })
}

/// Zero-based plate index from an entry path like `Metadata/plate_3.json`
/// or `Metadata/plate_no_light_2.png`: the trailing digits of the file
/// stem, minus one.
pub fn plate_index_from_path(path: &str) -> Option<u32> {
    let file_name = path.rsplit('/').next()?;
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse::<u32>().ok()?.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <metadata key="sparse_infill_density" value="20%"/>
  <object id="2">
    <metadata key="name" value="Cube"/>
    <metadata key="wall_loops" value="4"/>
    <part id="1" subtype="normal_part">
      <metadata key="name" value="Cube part"/>
      <metadata key="wall_loops" value="9"/>
    </part>
  </object>
  <object id="5">
    <metadata key="name" value="Tower &amp; Base"/>
  </object>
  <plate>
    <metadata key="plater_id" value="1"/>
    <metadata key="plater_name" value="Main"/>
    <model_instance>
      <metadata key="object_id" value="2"/>
      <metadata key="instance_id" value="0"/>
    </model_instance>
  </plate>
  <plate>
    <metadata key="plater_id" value="2"/>
    <metadata key="plater_name" value=""/>
    <model_instance>
      <metadata key="object_id" value="5"/>
    </model_instance>
  </plate>
</config>
"#;

    #[test]
    fn test_parse_objects_plates_and_root_metadata() {
        let parsed = parse_model_settings(MODEL_SETTINGS).unwrap();

        assert_eq!(
            parsed.metadata,
            vec![("sparse_infill_density".to_string(), "20%".to_string())]
        );
        assert_eq!(parsed.objects.len(), 2);
        assert_eq!(parsed.objects[0].name.as_deref(), Some("Cube"));
        // part-level metadata is not object metadata
        assert_eq!(parsed.objects[0].metadata.len(), 2);
        assert_eq!(parsed.objects[1].name.as_deref(), Some("Tower & Base"));

        assert_eq!(parsed.plates.len(), 2);
        assert_eq!(parsed.plates[0].index(), Some(0));
        assert_eq!(parsed.plates[0].name.as_deref(), Some("Main"));
        assert_eq!(parsed.plates[1].name, None);
        assert_eq!(parsed.plate_index_of("5"), Some(1));
        assert_eq!(parsed.object_id_for("Cube", Some(0)), Some("2"));
        assert_eq!(parsed.object_id_for("Cube", Some(1)), None);
    }

    #[test]
    fn test_malformed_xml_names_entry() {
        let err = parse_model_settings("<config><object></config>").unwrap_err();
        match err {
            PlateTuneError::Xml { entry, .. } => assert_eq!(entry, MODEL_SETTINGS_PATH),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rewrite_updates_in_place_and_appends() {
        let mut updates = HashMap::new();
        updates.insert(
            "2".to_string(),
            vec![
                ("wall_loops".to_string(), "6".to_string()),
                ("sparse_infill_density".to_string(), "40%".to_string()),
            ],
        );

        let rewritten = rewrite_object_metadata(MODEL_SETTINGS, &updates).unwrap();
        let parsed = parse_model_settings(&rewritten).unwrap();

        let cube = &parsed.objects[0].metadata;
        assert!(cube.contains(&("wall_loops".to_string(), "6".to_string())));
        assert!(cube.contains(&("sparse_infill_density".to_string(), "40%".to_string())));
        assert_eq!(cube.len(), 3);
        // the part keeps its own value
        assert!(rewritten.contains(r#"<metadata key="wall_loops" value="9"/>"#));
        // other objects and plates untouched
        assert_eq!(parsed.objects[1].metadata.len(), 1);
        assert_eq!(parsed.plates.len(), 2);
    }

    #[test]
    fn test_rewrite_replaces_open_close_metadata() {
        let xml = r#"<config>
  <object id="3">
    <metadata key="name" value="Clip"></metadata>
    <metadata key="wall_loops" value="2"></metadata>
  </object>
</config>
"#;
        let mut updates = HashMap::new();
        updates.insert("3".to_string(), vec![("wall_loops".to_string(), "5".to_string())]);

        let rewritten = rewrite_object_metadata(xml, &updates).unwrap();
        assert_eq!(rewritten.matches("wall_loops").count(), 1);
        assert!(rewritten.contains(r#"<metadata key="wall_loops" value="5"/>"#));
        assert!(rewritten.contains(r#"<metadata key="name" value="Clip"></metadata>"#));

        let parsed = parse_model_settings(&rewritten).unwrap();
        assert_eq!(
            parsed.objects[0].metadata,
            vec![
                ("name".to_string(), "Clip".to_string()),
                ("wall_loops".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_rewrite_without_updates_is_identity() {
        let rewritten = rewrite_object_metadata(MODEL_SETTINGS, &HashMap::new()).unwrap();
        assert_eq!(rewritten, MODEL_SETTINGS);
    }

    #[test]
    fn test_plate_index_from_path() {
        assert_eq!(plate_index_from_path("Metadata/plate_1.png"), Some(0));
        assert_eq!(plate_index_from_path("Metadata/plate_no_light_12.png"), Some(11));
        assert_eq!(plate_index_from_path("Metadata/plate_3.json"), Some(2));
        assert_eq!(plate_index_from_path("Metadata/plate_top.png"), None);
        assert_eq!(plate_index_from_path("Metadata/plate_0.png"), None);
    }

    #[test]
    fn test_plate_info_bboxes() {
        let info = parse_plate_info(
            r#"{"bed_type": "textured_plate", "nozzle_diameter": 0.4,
                "bbox_objects": [{"id": 75, "name": "Cube", "bbox": [10, 10, 30, 20]}]}"#,
            "Metadata/plate_1.json",
        )
        .unwrap();
        assert_eq!(info.bed_type.as_deref(), Some("textured_plate"));
        let bbox = info.bbox_objects[0].bounding_box().unwrap();
        assert_eq!(bbox.extents(), [20.0, 10.0, 0.0]);
    }
}
