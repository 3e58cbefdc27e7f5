//! CLI command implementations for kbsync.

pub mod status;
pub mod sync;
