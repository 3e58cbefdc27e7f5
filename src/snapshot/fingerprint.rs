//! Content fingerprint used to skip no-op commits.

use sha2::{Digest, Sha256};

use crate::{error::PersistenceError, types::KnowledgeRecord};

const FINGERPRINT_VERSION: &str = "kbsync-snapshot-fingerprint-v1";

/// SHA-256 over the canonical form of the set.
///
/// Records are hashed in id order. Each contributes its metadata as JSON with
/// sorted keys, then its embedding as little-endian `f32` bytes, so the digest
/// does not depend on in-memory ordering.
pub fn fingerprint(records: &[KnowledgeRecord]) -> Result<String, PersistenceError> {
   let mut ordered: Vec<&KnowledgeRecord> = records.iter().collect();
   ordered.sort_by(|a, b| a.id.cmp(&b.id));

   let mut hasher = Sha256::new();
   hasher.update(FINGERPRINT_VERSION.as_bytes());
   hasher.update([0u8]);
   for record in ordered {
      // Value maps are BTreeMaps, so keys serialize sorted.
      let canonical = serde_json::to_value(record.meta())?;
      hasher.update(serde_json::to_vec(&canonical)?);
      hasher.update([0u8]);
      for value in &record.embedding {
         hasher.update(value.to_le_bytes());
      }
      hasher.update([0xffu8]);
   }
   Ok(hex::encode(hasher.finalize()))
}

/// Outcome of comparing the merged set against the committed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
   Unchanged { fingerprint: String },
   Changed { previous: String, current: String },
}

impl ChangeDecision {
   pub const fn is_changed(&self) -> bool {
      matches!(self, Self::Changed { .. })
   }

   pub fn fingerprint(&self) -> &str {
      match self {
         Self::Unchanged { fingerprint } => fingerprint,
         Self::Changed { current, .. } => current,
      }
   }
}

/// Compares `merged` against the fingerprint of the last committed set.
pub fn detect_change(
   previous: &str,
   merged: &[KnowledgeRecord],
) -> Result<ChangeDecision, PersistenceError> {
   let current = fingerprint(merged)?;
   if current == previous {
      Ok(ChangeDecision::Unchanged { fingerprint: current })
   } else {
      Ok(ChangeDecision::Changed { previous: previous.to_string(), current })
   }
}
