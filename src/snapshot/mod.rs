//! Local snapshot: merge, change detection, and the committed file pair.

pub mod fingerprint;
pub mod manifest;
pub mod merge;
pub mod npy;
pub mod reader;
pub mod store;

pub use fingerprint::{ChangeDecision, detect_change, fingerprint};
pub use manifest::{MANIFEST_SCHEMA_VERSION, SnapshotFileRef, SnapshotManifest};
pub use merge::{MergeOutcome, merge};
pub use reader::{Snapshot, SnapshotReader};
pub use store::{
   LOCK_FILE, LocalSnapshot, MANIFEST_FILE, MATRIX_FILE, METADATA_FILE, SnapshotStore,
   StagedSnapshot, WATERMARK_FILE,
};
