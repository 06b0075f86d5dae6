//! Bambu Studio project archives: reading, normalizing and writing back.

pub mod archive;
pub mod bookkeeping;
pub mod metadata;
pub mod normalize;
pub mod overrides;
pub mod previews;
pub mod reader;
pub mod types;
pub mod writer;

pub use archive::{write_archive_atomic, ArchiveEntries};
pub use overrides::{ObjectOverride, ObjectOverrideStore, ObjectTarget};
pub use reader::{parse, parse_entries};
pub use types::{
    BoundingBox, FilamentInfo, GeometryHints, NormalizedProject, Plate, PlateImage, PlateObject, PrinterInfo,
    ProjectSummary,
};
pub use writer::build_updated_archive_entries;
