mod support;

use std::fs;

use kbsync::{
   matrix::build_matrix,
   snapshot::{SnapshotStore, fingerprint},
   types::KnowledgeRecord,
   util::temp_path,
};
use support::{FakeRemote, committed_bytes, driver, options, row};
use tempfile::TempDir;

fn record(id: &str, embedding: Vec<f32>) -> KnowledgeRecord {
   KnowledgeRecord {
      id: id.to_string(),
      title: format!("title {id}"),
      content: "text".to_string(),
      embedding,
      content_type: None,
      category: None,
      updated_at: None,
   }
}

#[test]
fn crash_between_stage_and_rename_keeps_prior_commit() {
   let dir = TempDir::new().expect("temp dir");
   let store = SnapshotStore::new(dir.path());
   let v1 = vec![record("a", vec![1.0, 2.0])];
   store
      .commit(&v1, &build_matrix(&v1, None).expect("matrix"), &fingerprint(&v1).expect("fp"))
      .expect("commit v1");
   let before = committed_bytes(dir.path());

   let v2 = vec![record("a", vec![9.0, 9.0]), record("b", vec![3.0, 4.0])];
   let matrix = build_matrix(&v2, None).expect("matrix");
   let staged = store.stage(&v2, &matrix, &fingerprint(&v2).expect("fp")).expect("stage");
   // Simulates the process dying: no publish, no drop cleanup.
   std::mem::forget(staged);

   assert!(temp_path(&store.matrix_path()).exists());
   assert_eq!(committed_bytes(dir.path()), before);

   let local = store.load().expect("load");
   assert!(!local.is_torn());
   assert_eq!(local.records, v1);
}

#[tokio::test]
async fn next_run_clears_leftover_temps() {
   let dir = TempDir::new().expect("temp dir");
   let store = SnapshotStore::new(dir.path());
   fs::write(temp_path(&store.matrix_path()), b"half written").expect("stray temp");
   fs::write(temp_path(&store.metadata_path()), b"[").expect("stray temp");

   let remote = FakeRemote::with_rows(vec![row("a", "A", vec![1.0], "2024-01-01T00:00:00Z")]);
   driver(&remote, dir.path(), options(100)).run().await.expect("sync");

   let leftovers: Vec<_> = fs::read_dir(dir.path())
      .expect("read dir")
      .filter_map(Result::ok)
      .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
      .collect();
   assert!(leftovers.is_empty());
}

#[tokio::test]
async fn committed_rows_always_match_metadata() {
   let dir = TempDir::new().expect("temp dir");
   let remote = FakeRemote::new();
   for i in 0..25 {
      let id = format!("rec-{i:02}");
      remote.upsert(row(&id, &id, vec![i as f32, 1.0, 2.0], "2024-01-01T00:00:00Z"));
   }
   driver(&remote, dir.path(), options(7)).run().await.expect("sync");

   let store = SnapshotStore::new(dir.path());
   let local = store.load().expect("load");
   assert_eq!(local.records.len(), 25);
   assert!(local.records.iter().all(|r| r.embedding.len() == 3));
   assert_eq!(local.dimension, 3);
}
