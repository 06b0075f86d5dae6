//! Change application engine.
//!
//! Applies proposed changes strictly in order onto a copy of the project.
//! A change that cannot be applied becomes a warning and the rest still
//! run; nothing here returns an error.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::types::*;
use crate::mapping::table::vendor_keys_for;
use crate::mapping::{accepts_value, ProcessSettings, SettingValue, SPEEDS_KEY};
use crate::project::bookkeeping::is_user_modified;
use crate::project::{NormalizedProject, ObjectTarget};

/// Where a parameter path points inside a settings map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamPath<'a> {
    Top(&'a str),
    Speed(&'a str),
}

impl<'a> ParamPath<'a> {
    /// Nested speed paths (`speeds.a.b`) stay whole as a top-level key,
    /// which no settings map contains.
    fn parse(parameter: &'a str) -> Self {
        match parameter.strip_prefix("speeds.") {
            Some(role) if !role.is_empty() && !role.contains('.') => ParamPath::Speed(role),
            _ => ParamPath::Top(parameter),
        }
    }

    fn read(self, settings: &ProcessSettings) -> Option<SettingValue> {
        match self {
            ParamPath::Top(key) => settings.get(key).cloned(),
            ParamPath::Speed(role) => settings
                .get(SPEEDS_KEY)
                .and_then(SettingValue::as_speeds)
                .and_then(|speeds| speeds.get(role))
                .map(|v| SettingValue::Number(*v)),
        }
    }

    /// Speed slots only hold numbers; callers check that in [`prepare`].
    fn write(self, settings: &mut ProcessSettings, value: SettingValue) {
        match self {
            ParamPath::Top(key) => {
                settings.insert(key.to_string(), value);
            }
            ParamPath::Speed(role) => {
                let Some(speed) = value.as_f64() else {
                    return;
                };
                let slot = settings
                    .entry(SPEEDS_KEY.to_string())
                    .or_insert_with(|| SettingValue::Speeds(Default::default()));
                match slot {
                    SettingValue::Speeds(map) => {
                        map.insert(role.to_string(), speed);
                    }
                    other => {
                        *other = SettingValue::Speeds([(role.to_string(), speed)].into_iter().collect());
                    }
                }
            }
        }
    }
}

/// Applies validated changes to a normalized project.
pub struct ChangeEngine {
    options: ApplyOptions,
}

struct Applied {
    diffs: Vec<DiffRecord>,
    warnings: Vec<ChangeWarning>,
}

impl Applied {
    fn warn(&mut self, kind: WarningKind, change: &ProposedChange, message: String) {
        warn!("Skipping change to {}: {}", change.parameter, message);
        self.warnings.push(ChangeWarning {
            kind,
            parameter: change.parameter.clone(),
            message,
        });
    }
}

impl ChangeEngine {
    pub fn new(options: ApplyOptions) -> Self {
        Self { options }
    }

    /// Apply `changes` in order to a copy of `project`.
    pub fn apply(&self, project: &NormalizedProject, changes: &[ProposedChange]) -> ApplyOutcome {
        let mut project = project.clone();
        let mut applied = Applied {
            diffs: Vec::new(),
            warnings: Vec::new(),
        };

        for change in changes {
            if self.options.enforce_locks && is_locked(&project.user_modified_settings, &change.parameter) {
                applied.warn(
                    WarningKind::LockedSetting,
                    change,
                    format!("'{}' was modified by the user and is locked", change.parameter),
                );
                continue;
            }

            match change.scope {
                ChangeScope::Global => apply_global(&mut project, change, &mut applied),
                ChangeScope::Object => apply_object(&mut project, change, &mut applied),
            }
        }

        info!(
            "Applied {} of {} changes ({} warnings)",
            applied.diffs.len(),
            changes.len(),
            applied.warnings.len()
        );

        ApplyOutcome {
            project,
            diffs: applied.diffs,
            warnings: applied.warnings,
        }
    }
}

/// Convenience wrapper around [`ChangeEngine::apply`].
pub fn apply_changes(
    project: &NormalizedProject,
    changes: &[ProposedChange],
    options: ApplyOptions,
) -> ApplyOutcome {
    ChangeEngine::new(options).apply(project, changes)
}

/// A parameter is locked when it, or any vendor key it maps to, is in the
/// user-modified set.
fn is_locked(user_modified: &[String], parameter: &str) -> bool {
    if user_modified.is_empty() {
        return false;
    }
    is_user_modified(user_modified, parameter)
        || vendor_keys_for(parameter)
            .into_iter()
            .any(|key| is_user_modified(user_modified, key))
}

/// Compute the value a change asks for, or the warning explaining why not.
fn compute_value(
    change: &ProposedChange,
    current: Option<&SettingValue>,
) -> Result<SettingValue, (WarningKind, String)> {
    match change.change_type {
        ChangeType::Relative => {
            let base = current.and_then(SettingValue::as_f64);
            let delta = change.new_value.as_f64();
            match (base, delta) {
                (Some(base), Some(delta)) => {
                    let result = base + base * delta;
                    if result.is_finite() {
                        Ok(SettingValue::Number(result))
                    } else {
                        Err((
                            WarningKind::UnsupportedValue,
                            format!(
                                "relative change to '{}' by {} overflows",
                                change.parameter, change.new_value
                            ),
                        ))
                    }
                }
                _ => Err((
                    WarningKind::NonNumericRelative,
                    format!(
                        "relative change to '{}' requires numeric values (current: {}, delta: {})",
                        change.parameter,
                        current.map_or_else(|| "none".to_string(), ToString::to_string),
                        change.new_value
                    ),
                )),
            }
        }
        ChangeType::Absolute => SettingValue::from_json(&change.new_value).ok_or_else(|| {
            (
                WarningKind::UnsupportedValue,
                format!("'{}' cannot be set to {}", change.parameter, describe(&change.new_value)),
            )
        }),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object with non-numeric values".to_string(),
        other => other.to_string(),
    }
}

/// Shared tail of both scopes: compute, suppress no-ops, write.
///
/// Returns the `(from, to)` pair when a write is due; warnings are
/// recorded here.
fn prepare(
    change: &ProposedChange,
    path: ParamPath<'_>,
    current: Option<SettingValue>,
    applied: &mut Applied,
) -> Option<(Option<SettingValue>, SettingValue)> {
    let new_value = match compute_value(change, current.as_ref()) {
        Ok(v) => v,
        Err((kind, message)) => {
            applied.warn(kind, change, message);
            return None;
        }
    };

    let fits = match path {
        ParamPath::Speed(_) => new_value.as_f64().is_some_and(f64::is_finite),
        ParamPath::Top(key) => accepts_value(key, &new_value),
    };
    if !fits {
        applied.warn(
            WarningKind::UnsupportedValue,
            change,
            format!("'{}' cannot hold {}", change.parameter, describe(&change.new_value)),
        );
        return None;
    }

    if current.as_ref() == Some(&new_value) {
        debug!("No-op change to {} ({})", change.parameter, new_value);
        return None;
    }

    Some((current, new_value))
}

fn apply_global(project: &mut NormalizedProject, change: &ProposedChange, applied: &mut Applied) {
    let path = ParamPath::parse(&change.parameter);
    let current = path.read(&project.settings);
    let known = match path {
        ParamPath::Top(key) => project.settings.contains_key(key),
        ParamPath::Speed(_) => current.is_some(),
    };
    if !known {
        applied.warn(
            WarningKind::UnknownParameter,
            change,
            format!("unknown parameter '{}'", change.parameter),
        );
        return;
    }

    let Some((from, to)) = prepare(change, path, current, applied) else {
        return;
    };
    path.write(&mut project.settings, to.clone());
    applied.diffs.push(DiffRecord {
        scope: ChangeScope::Global,
        target: None,
        parameter: change.parameter.clone(),
        from,
        to,
        reason: change.reason.clone(),
    });
}

fn apply_object(project: &mut NormalizedProject, change: &ProposedChange, applied: &mut Applied) {
    let requested = change.target.as_ref();
    let object_name = requested.and_then(|t| t.object_name.clone());
    let plate_index = requested.and_then(|t| t.plate_index);

    let resolved = object_name
        .as_deref()
        .and_then(|name| project.resolve_plate(name, plate_index));
    let (Some(object_name), Some(plate)) = (object_name, resolved) else {
        applied.warn(
            WarningKind::ObjectNotFound,
            change,
            format!(
                "object {:?} not found on plate {:?}",
                requested.and_then(|t| t.object_name.as_deref()).unwrap_or("<unnamed>"),
                plate_index
            ),
        );
        return;
    };

    let target = ObjectTarget::new(object_name.clone(), Some(plate));
    let path = ParamPath::parse(&change.parameter);

    let current = project
        .object_overrides
        .read(&target)
        .and_then(|record| path.read(&record.settings))
        .or_else(|| path.read(&project.settings));
    if current.is_none() {
        applied.warn(
            WarningKind::UnknownObjectParameter,
            change,
            format!("unknown parameter '{}' for object '{}'", change.parameter, object_name),
        );
        return;
    }

    let Some((from, to)) = prepare(change, path, current, applied) else {
        return;
    };
    path.write(&mut project.object_overrides.ensure(&target).settings, to.clone());
    if let Some(object) = project.plate_object_mut(plate, &object_name) {
        path.write(&mut object.settings, to.clone());
    }

    applied.diffs.push(DiffRecord {
        scope: ChangeScope::Object,
        target: Some(target),
        parameter: change.parameter.clone(),
        from,
        to,
        reason: change.reason.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Plate, PlateObject, ProjectSummary};
    use serde_json::json;

    fn project() -> NormalizedProject {
        let mut settings = crate::project::normalize::default_settings();
        settings.insert("wall_line_count".to_string(), SettingValue::Number(4.0));
        let cube = |idx: u32| Plate {
            index: idx,
            name: None,
            objects: vec![PlateObject {
                name: "Cube".to_string(),
                ..Default::default()
            }],
        };
        NormalizedProject {
            summary: ProjectSummary {
                plates: Some(vec![cube(0), cube(1)]),
                ..Default::default()
            },
            settings,
            user_modified_settings: vec!["sparse_infill_density".to_string()],
            ..Default::default()
        }
    }

    fn enforce() -> ApplyOptions {
        ApplyOptions { enforce_locks: true }
    }

    #[test]
    fn test_relative_math() {
        let changes = [ProposedChange::global("wall_line_count", json!(-0.5)).relative()];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert_eq!(outcome.project.settings.get("wall_line_count"), Some(&SettingValue::Number(2.0)));
        assert_eq!(outcome.diffs[0].from, Some(SettingValue::Number(4.0)));
        assert_eq!(outcome.diffs[0].to, SettingValue::Number(2.0));
    }

    #[test]
    fn test_relative_requires_numbers() {
        let changes = [
            ProposedChange::global("infill_pattern", json!(0.1)).relative(),
            ProposedChange::global("wall_line_count", json!("more")).relative(),
        ];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert!(outcome.diffs.is_empty());
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome
            .warnings
            .iter()
            .all(|w| w.kind == WarningKind::NonNumericRelative));
        assert_eq!(outcome.project.settings.get("wall_line_count"), Some(&SettingValue::Number(4.0)));
    }

    #[test]
    fn test_no_op_is_silent() {
        let changes = [ProposedChange::global("wall_line_count", json!(4))];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert!(outcome.diffs.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_unknown_global_parameter() {
        let changes = [ProposedChange::global("not_a_real_key", json!(1))];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert!(outcome.diffs.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].message.contains("not_a_real_key"));
        assert!(!outcome.project.settings.contains_key("not_a_real_key"));
    }

    #[test]
    fn test_lock_enforcement_toggle() {
        // infill_density_percent maps to the user-modified vendor key
        let changes = [ProposedChange::global("infill_density_percent", json!(25))];

        let locked = apply_changes(&project(), &changes, enforce());
        assert!(locked.diffs.is_empty());
        assert_eq!(locked.warnings[0].kind, WarningKind::LockedSetting);

        let unlocked = apply_changes(&project(), &changes, ApplyOptions::default());
        assert_eq!(unlocked.diffs.len(), 1);
    }

    #[test]
    fn test_lock_normalized_match() {
        let mut p = project();
        p.user_modified_settings = vec!["Wall-Line-Count".to_string()];
        let changes = [ProposedChange::global("wall_line_count", json!(3))];
        let outcome = apply_changes(&p, &changes, enforce());
        assert_eq!(outcome.warnings[0].kind, WarningKind::LockedSetting);
    }

    #[test]
    fn test_object_fallback_to_global() {
        let changes = [ProposedChange::object(ObjectTarget::new("Cube", Some(1)), "wall_line_count", json!(6))];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());

        assert_eq!(outcome.diffs.len(), 1);
        assert_eq!(outcome.diffs[0].from, Some(SettingValue::Number(4.0)));
        assert_eq!(outcome.diffs[0].to, SettingValue::Number(6.0));
        assert_eq!(outcome.project.settings.get("wall_line_count"), Some(&SettingValue::Number(4.0)));

        let plate_view = &outcome.project.plates()[1].objects[0].settings;
        assert_eq!(plate_view.get("wall_line_count"), Some(&SettingValue::Number(6.0)));
        // the same-named object on plate 0 is untouched
        assert!(outcome.project.plates()[0].objects[0].settings.is_empty());
        assert!(outcome
            .project
            .object_overrides
            .read(&ObjectTarget::new("Cube", Some(0)))
            .is_none());
    }

    #[test]
    fn test_object_without_plate_index_uses_first_match() {
        let target = ObjectTarget {
            object_name: Some("Cube".to_string()),
            plate_index: None,
        };
        let changes = [ProposedChange::object(target, "top_layers", json!(7))];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert_eq!(outcome.diffs[0].target, Some(ObjectTarget::new("Cube", Some(0))));
    }

    #[test]
    fn test_object_not_found_and_unknown_object_parameter() {
        let changes = [
            ProposedChange::object(ObjectTarget::new("Sphere", None), "top_layers", json!(7)),
            ProposedChange::object(ObjectTarget::new("Cube", Some(5)), "top_layers", json!(7)),
            ProposedChange::object(ObjectTarget::new("Cube", Some(0)), "mystery", json!(7)),
        ];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        let kinds: Vec<_> = outcome.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WarningKind::ObjectNotFound,
                WarningKind::ObjectNotFound,
                WarningKind::UnknownObjectParameter
            ]
        );
    }

    #[test]
    fn test_speed_paths() {
        let mut p = project();
        p.settings.insert(
            SPEEDS_KEY.to_string(),
            SettingValue::Speeds([("wall_outer".to_string(), 120.0)].into_iter().collect()),
        );
        let changes = [
            ProposedChange::global("speeds.wall_outer.extra", json!(120)),
            ProposedChange::global("speeds.wall_outer", json!(-0.25)).relative(),
            ProposedChange::global("speeds.bridge", json!(50)),
            ProposedChange::global("speeds.warp_drive", json!(1)),
            ProposedChange::global("speeds.wall_outer", json!("fast")),
        ];
        let outcome = apply_changes(&p, &changes, ApplyOptions::default());

        assert_eq!(outcome.diffs.len(), 1);
        assert_eq!(outcome.diffs[0].from, Some(SettingValue::Number(120.0)));
        let speeds = outcome.project.settings.get(SPEEDS_KEY).and_then(|s| s.as_speeds()).unwrap();
        assert_eq!(speeds.get("wall_outer"), Some(&90.0));
        assert_eq!(speeds.get("bridge"), None);
        assert_eq!(speeds.len(), 1);

        let kinds: Vec<_> = outcome.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WarningKind::UnknownParameter,
                WarningKind::UnknownParameter,
                WarningKind::UnknownParameter,
                WarningKind::UnsupportedValue
            ]
        );
    }

    #[test]
    fn test_object_speed_needs_existing_role() {
        let changes = [ProposedChange::object(ObjectTarget::new("Cube", Some(0)), "speeds.bridge", json!(40))];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert!(outcome.diffs.is_empty());
        assert_eq!(outcome.warnings[0].kind, WarningKind::UnknownObjectParameter);
    }

    #[test]
    fn test_overflowing_relative_is_unsupported() {
        let changes = [ProposedChange::global("layer_height_mm", json!(1e308)).relative()];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert!(outcome.diffs.is_empty());
        assert_eq!(outcome.warnings[0].kind, WarningKind::UnsupportedValue);
        assert_eq!(outcome.project.settings.get("layer_height_mm"), Some(&SettingValue::Number(0.2)));
    }

    #[test]
    fn test_value_must_fit_mapping_kind() {
        let changes = [
            ProposedChange::global("wall_line_count", json!("4")),
            ProposedChange::global("supports_enabled", json!(1)),
            ProposedChange::global("infill_pattern", json!(3)),
            ProposedChange::global("supports_enabled", json!(true)),
        ];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());

        assert_eq!(outcome.diffs.len(), 1);
        assert_eq!(outcome.diffs[0].parameter, "supports_enabled");
        assert_eq!(outcome.warnings.len(), 3);
        assert!(outcome.warnings.iter().all(|w| w.kind == WarningKind::UnsupportedValue));
        assert_eq!(outcome.project.settings.get("wall_line_count"), Some(&SettingValue::Number(4.0)));
    }

    #[test]
    fn test_ordering_later_changes_see_earlier() {
        let changes = [
            ProposedChange::global("top_layers", json!(6)),
            ProposedChange::global("top_layers", json!(6)),
            ProposedChange::global("top_layers", json!(0.5)).relative(),
        ];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert_eq!(outcome.diffs.len(), 2);
        assert_eq!(outcome.diffs[1].from, Some(SettingValue::Number(6.0)));
        assert_eq!(outcome.project.settings.get("top_layers"), Some(&SettingValue::Number(9.0)));
    }

    #[test]
    fn test_absolute_null_is_unsupported() {
        let changes = [ProposedChange::global("wall_line_count", Value::Null)];
        let outcome = apply_changes(&project(), &changes, ApplyOptions::default());
        assert_eq!(outcome.warnings[0].kind, WarningKind::UnsupportedValue);
    }
}
