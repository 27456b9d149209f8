pub mod expiry;
pub mod metadata;
pub mod workspace;

pub use expiry::{epoch_seconds, read_expiry, SweepReport, EXPIRY_MARKER};
pub use metadata::{read_metadata, write_metadata, WorkspaceMetadata, METADATA_FILE};
pub use workspace::{remove_path, WorkspaceStore};
