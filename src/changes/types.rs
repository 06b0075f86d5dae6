//! Type definitions for proposed changes and their application results.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mapping::SettingValue;
use crate::project::{NormalizedProject, ObjectTarget};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeScope {
    #[default]
    Global,
    Object,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Replace the current value.
    #[default]
    Absolute,
    /// `new = current + current * delta`.
    Relative,
}

/// One suggested mutation, as validated from the service response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChange {
    #[serde(default)]
    pub scope: ChangeScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectTarget>,
    /// Dot path; `speeds.<role>` addresses the speed map.
    pub parameter: String,
    /// Untrusted value, interpreted by the engine.
    pub new_value: Value,
    #[serde(default)]
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProposedChange {
    pub fn global(parameter: impl Into<String>, new_value: Value) -> Self {
        Self {
            scope: ChangeScope::Global,
            target: None,
            parameter: parameter.into(),
            new_value,
            change_type: ChangeType::Absolute,
            reason: None,
        }
    }

    pub fn object(target: ObjectTarget, parameter: impl Into<String>, new_value: Value) -> Self {
        Self {
            scope: ChangeScope::Object,
            target: Some(target),
            ..Self::global(parameter, new_value)
        }
    }

    pub fn relative(mut self) -> Self {
        self.change_type = ChangeType::Relative;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One successfully applied change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    pub scope: ChangeScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectTarget>,
    pub parameter: String,
    /// `None` for a speed role that had no value yet.
    pub from: Option<SettingValue>,
    pub to: SettingValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    LockedSetting,
    ObjectNotFound,
    UnknownParameter,
    UnknownObjectParameter,
    NonNumericRelative,
    UnsupportedValue,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::LockedSetting => "locked setting",
            WarningKind::ObjectNotFound => "object not found",
            WarningKind::UnknownParameter => "unknown parameter",
            WarningKind::UnknownObjectParameter => "unknown parameter for object",
            WarningKind::NonNumericRelative => "relative change requires numeric value",
            WarningKind::UnsupportedValue => "unsupported value",
        };
        f.write_str(s)
    }
}

/// A change that was skipped. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeWarning {
    pub kind: WarningKind,
    pub parameter: String,
    pub message: String,
}

/// Options for one apply run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Skip changes to settings the user already tuned.
    pub enforce_locks: bool,
}

/// Updated model plus what happened to each change.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub project: NormalizedProject,
    pub diffs: Vec<DiffRecord>,
    pub warnings: Vec<ChangeWarning>,
}
