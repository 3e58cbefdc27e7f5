//! Merges a fetched batch into the existing snapshot set.

use std::collections::BTreeMap;

use crate::types::KnowledgeRecord;

/// Merged set plus what the batch did to it.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
   /// Records sorted by id; this is the matrix row order.
   pub records:  Vec<KnowledgeRecord>,
   pub inserted: usize,
   pub updated:  usize,
   pub retained: usize,
}

/// Last-write-wins by batch membership.
///
/// Every batch record replaces the existing record with the same id, and
/// existing records absent from the batch are kept unchanged. `updated_at`
/// is not compared. When a batch repeats an id the later occurrence wins.
pub fn merge(existing: Vec<KnowledgeRecord>, batch: Vec<KnowledgeRecord>) -> MergeOutcome {
   let mut by_id: BTreeMap<String, KnowledgeRecord> =
      existing.into_iter().map(|r| (r.id.clone(), r)).collect();
   let before = by_id.len();

   let mut touched: BTreeMap<String, bool> = BTreeMap::new();
   for record in batch {
      let id = record.id.clone();
      let was_present = by_id.insert(id.clone(), record).is_some();
      touched.entry(id).or_insert(was_present);
   }

   let updated = touched.values().filter(|existed| **existed).count();
   let inserted = touched.len() - updated;
   MergeOutcome {
      retained: before - updated,
      inserted,
      updated,
      records: by_id.into_values().collect(),
   }
}
