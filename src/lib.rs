//! Settings optimizer for Bambu Studio 3MF projects.
//!
//! The pipeline is: [`project::parse`] an archive into a
//! [`NormalizedProject`], [`optimizer::build_request_payload`] and send it,
//! [`changes::apply_changes`] from the validated reply, then
//! [`project::build_updated_archive_entries`] and write the result.

pub mod changes;
pub mod config;
pub mod error;
pub mod mapping;
pub mod optimizer;
pub mod project;
pub mod report;

pub use changes::{apply_changes, ApplyOptions, ApplyOutcome, ChangeWarning, DiffRecord, ProposedChange};
pub use error::{PlateTuneError, Result};
pub use project::{build_updated_archive_entries, parse, ArchiveEntries, NormalizedProject};

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
