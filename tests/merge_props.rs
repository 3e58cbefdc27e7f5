use std::collections::{BTreeMap, BTreeSet};

use kbsync::{
   snapshot::{fingerprint, merge},
   types::KnowledgeRecord,
};
use proptest::prelude::*;

fn record_strategy() -> impl Strategy<Value = KnowledgeRecord> {
   ("[a-f]{1,2}", "[a-z ]{0,8}", prop::collection::vec(-10.0f32..10.0, 3)).prop_map(
      |(id, title, embedding)| KnowledgeRecord {
         id,
         title,
         content: String::new(),
         embedding,
         content_type: None,
         category: None,
         updated_at: None,
      },
   )
}

/// Existing sets never repeat an id; batches may.
fn unique(records: Vec<KnowledgeRecord>) -> Vec<KnowledgeRecord> {
   let by_id: BTreeMap<String, KnowledgeRecord> =
      records.into_iter().map(|r| (r.id.clone(), r)).collect();
   by_id.into_values().collect()
}

proptest! {
   #[test]
   fn merge_keeps_batch_values_and_untouched_existing(
      existing in prop::collection::vec(record_strategy(), 0..12).prop_map(unique),
      batch in prop::collection::vec(record_strategy(), 0..12),
   ) {
      let out = merge(existing.clone(), batch.clone());

      let mut last_in_batch: BTreeMap<&str, &KnowledgeRecord> = BTreeMap::new();
      for r in &batch {
         last_in_batch.insert(&r.id, r);
      }
      let merged: BTreeMap<&str, &KnowledgeRecord> =
         out.records.iter().map(|r| (r.id.as_str(), r)).collect();

      for (id, r) in &last_in_batch {
         prop_assert_eq!(merged.get(id).copied(), Some(*r));
      }
      for r in &existing {
         if !last_in_batch.contains_key(r.id.as_str()) {
            prop_assert_eq!(merged.get(r.id.as_str()).copied(), Some(r));
         }
      }

      let union: BTreeSet<&str> = existing
         .iter()
         .chain(batch.iter())
         .map(|r| r.id.as_str())
         .collect();
      prop_assert_eq!(out.records.len(), union.len());
      prop_assert_eq!(out.inserted + out.updated + out.retained, union.len());
   }

   #[test]
   fn merge_output_is_sorted_by_id(
      existing in prop::collection::vec(record_strategy(), 0..12).prop_map(unique),
      batch in prop::collection::vec(record_strategy(), 0..12),
   ) {
      let out = merge(existing, batch);
      prop_assert!(out.records.windows(2).all(|w| w[0].id < w[1].id));
   }

   #[test]
   fn merging_own_records_does_not_change_fingerprint(
      existing in prop::collection::vec(record_strategy(), 0..12).prop_map(unique),
      picks in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
   ) {
      let before = fingerprint(&existing).unwrap();
      let batch: Vec<KnowledgeRecord> = if existing.is_empty() {
         Vec::new()
      } else {
         picks.iter().map(|i| existing[i.index(existing.len())].clone()).collect()
      };
      let out = merge(existing, batch);
      prop_assert_eq!(fingerprint(&out.records).unwrap(), before);
   }
}
