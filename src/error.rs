use std::{io, path::PathBuf};

use thiserror::Error;

/// Main error type for kbsync.
///
/// Each top-level variant corresponds to one phase of a sync run, so the
/// driver and the CLI can tell an operator which step failed and whether an
/// immediate retry is worthwhile.
#[derive(Debug, Error)]
pub enum Error {
   /// Required configuration is missing or invalid. Never retried.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// The remote store could not be reached or read.
   #[error("fetch error: {0}")]
   Fetch(#[from] FetchError),

   /// An embedding had a different length than the rest of the snapshot.
   #[error("dimension mismatch for record {id}: expected {expected}, found {found}")]
   DimensionMismatch { id: String, expected: usize, found: usize },

   /// An embedding had no components at all.
   #[error("empty embedding for record {id}")]
   EmptyEmbedding { id: String },

   /// Writing or reading the local snapshot failed.
   #[error("persistence error: {0}")]
   Persistence(#[from] PersistenceError),

   /// Another sync run holds the writer lock.
   #[error("sync busy: writer lock {} is held by another run", .path.display())]
   Busy { path: PathBuf },
}

impl Error {
   /// Name of the sync phase the error belongs to.
   pub const fn phase(&self) -> &'static str {
      match self {
         Self::Config(_) => "config",
         Self::Fetch(_) => "fetch",
         Self::DimensionMismatch { .. } | Self::EmptyEmbedding { .. } => "build",
         Self::Persistence(_) => "commit",
         Self::Busy { .. } => "lock",
      }
   }

   /// Whether re-running the sync without operator action can succeed.
   pub const fn is_retryable(&self) -> bool {
      matches!(self, Self::Fetch(_) | Self::Persistence(_) | Self::Busy { .. })
   }

   pub const fn exit_code(&self) -> i32 {
      match self {
         Self::Config(_) => 2,
         Self::Fetch(_) => 3,
         Self::DimensionMismatch { .. } | Self::EmptyEmbedding { .. } => 4,
         Self::Persistence(_) => 5,
         Self::Busy { .. } => 10,
      }
   }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// The remote endpoint was not configured.
   #[error("missing remote endpoint; set KBSYNC_REMOTE_URL or remote_url in config.toml")]
   MissingEndpoint,

   /// The service credential was not configured.
   #[error("missing service credential; set KBSYNC_SERVICE_KEY or service_key in config.toml")]
   MissingCredential,

   /// A configured value is out of range.
   #[error("invalid config value for {field}: {reason}")]
   Invalid { field: &'static str, reason: String },

   /// The config file or environment could not be parsed.
   #[error("failed to parse config: {0}")]
   Parse(#[source] Box<figment::Error>),

   /// Failed to resolve the user's home directory.
   #[error("failed to get user directories")]
   GetUserDirectories,
}

/// Errors raised while pulling pages from the remote store.
#[derive(Debug, Error)]
pub enum FetchError {
   /// The HTTP request failed (connect, TLS, timeout, body read).
   #[error("request failed: {0}")]
   Request(#[from] reqwest::Error),

   /// The remote answered with a non-success status.
   #[error("remote returned HTTP {status}: {body}")]
   Status { status: u16, body: String },

   /// The response body was not the expected row array.
   #[error("failed to decode response: {0}")]
   Decode(String),

   /// Transport failure reported by a non-HTTP remote.
   #[error("transport error: {0}")]
   Transport(String),

   /// The whole fetch exceeded its deadline.
   #[error("fetch timed out after {after_ms} ms")]
   Timeout { after_ms: u64 },

   /// A page failed; wraps the underlying cause with its position.
   #[error("page {page} (offset {offset}) failed: {source}")]
   Page {
      page:   usize,
      offset: usize,
      #[source]
      source: Box<FetchError>,
   },
}

/// Errors raised while writing or reading snapshot files.
#[derive(Debug, Error)]
pub enum PersistenceError {
   /// Failed to create the snapshot directory.
   #[error("failed to create snapshot dir {}: {source}", .path.display())]
   CreateDir {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// Failed to write a temporary file.
   #[error("failed to write {}: {source}", .path.display())]
   Write {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// Failed to rename a temporary file into place.
   #[error("failed to rename {} -> {}: {source}", .from.display(), .to.display())]
   Rename {
      from:   PathBuf,
      to:     PathBuf,
      #[source]
      source: io::Error,
   },

   /// Failed to read a committed file.
   #[error("failed to read {}: {source}", .path.display())]
   Read {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// A committed file is present but cannot be decoded.
   #[error("failed to decode {}: {reason}", .path.display())]
   Decode { path: PathBuf, reason: String },

   /// Failed to serialize snapshot content.
   #[error("failed to encode snapshot: {0}")]
   Encode(#[from] serde_json::Error),

   /// Metadata and matrix disagree after every re-read attempt.
   #[error("snapshot misaligned: {metadata_rows} metadata rows vs {matrix_rows} matrix rows")]
   Misaligned { metadata_rows: usize, matrix_rows: usize },

   /// Failed to open the writer lock file.
   #[error("failed to open lock {}: {source}", .path.display())]
   Lock {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// Injected failure (crash-injection tests).
   #[error("failpoint {0} triggered")]
   Failpoint(String),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
