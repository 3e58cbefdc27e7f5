//! Offline knowledge snapshot synchronizer.
//!
//! Pulls verified knowledge records from a hosted table and keeps a local
//! metadata file and embedding matrix in step with it, committing only when
//! the content actually changed.

pub mod cmd;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod matrix;
pub mod remote;
pub mod snapshot;
pub mod sync;
pub mod types;
pub mod util;

pub use error::{Error, Result};
