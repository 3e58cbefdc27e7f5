//! Snapshot manifest schema (v1).
//!
//! Written after both data files are renamed into place, the manifest is
//! the commit record for the pair: it names the row count, dimension,
//! content fingerprint, and each file's size and checksum.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
   error::PersistenceError,
   util::{read_optional, sha256_hex, write_atomic},
};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFileRef {
   pub file:       String,
   pub size_bytes: u64,
   pub sha256:     String,
}

impl SnapshotFileRef {
   pub fn describe(file: &str, data: &[u8]) -> Self {
      Self { file: file.to_string(), size_bytes: data.len() as u64, sha256: sha256_hex(data) }
   }

   /// Whether `data` is exactly the content this ref was written for.
   pub fn matches(&self, data: &[u8]) -> bool {
      self.size_bytes == data.len() as u64 && self.sha256 == sha256_hex(data)
   }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
   pub schema_version: u32,
   pub created_at:     String,
   pub fingerprint:    String,
   pub records:        u64,
   pub dimension:      u64,
   pub metadata:       SnapshotFileRef,
   pub matrix:         SnapshotFileRef,
}

impl SnapshotManifest {
   pub fn load(path: &Path) -> Result<Option<Self>, PersistenceError> {
      let Some(raw) = read_optional(path)? else {
         return Ok(None);
      };
      let manifest = serde_json::from_slice(&raw).map_err(|e| PersistenceError::Decode {
         path:   path.to_path_buf(),
         reason: e.to_string(),
      })?;
      Ok(Some(manifest))
   }

   pub fn write_atomic(&self, path: &Path) -> Result<(), PersistenceError> {
      let data = serde_json::to_vec_pretty(self)?;
      write_atomic(path, &data)
   }

   /// Checks the committed bytes against this manifest.
   pub fn verify(&self, metadata: &[u8], matrix: &[u8]) -> Result<(), String> {
      if self.schema_version != MANIFEST_SCHEMA_VERSION {
         return Err(format!("unsupported manifest schema version {}", self.schema_version));
      }
      if !self.metadata.matches(metadata) {
         return Err(format!("metadata checksum mismatch for {}", self.metadata.file));
      }
      if !self.matrix.matches(matrix) {
         return Err(format!("matrix checksum mismatch for {}", self.matrix.file));
      }
      Ok(())
   }
}
