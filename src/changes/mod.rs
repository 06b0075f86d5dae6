//! Applying proposed setting changes to a normalized project.
//!
//! # Architecture
//!
//! - **Types**: `ProposedChange` in, `DiffRecord`/`ChangeWarning` out
//! - **Engine**: `ChangeEngine` applies changes in order, per-change
//!   problems become warnings
//!
//! Range checks are not done here. Values are accepted as long as their
//! type fits the slot they are written to.

pub mod engine;
pub mod types;

pub use engine::{apply_changes, ChangeEngine};
pub use types::{
    ApplyOptions, ApplyOutcome, ChangeScope, ChangeType, ChangeWarning, DiffRecord, ProposedChange, WarningKind,
};
