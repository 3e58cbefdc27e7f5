#![allow(dead_code)]

use std::{
   fs,
   path::Path,
   sync::{Arc, Mutex},
   time::Duration,
};

use chrono::{DateTime, Utc};
use kbsync::{
   error::FetchError,
   remote::{PageQuery, RemoteStore},
   snapshot::SnapshotStore,
   sync::{SyncDriver, SyncOptions},
   types::{DecodedRow, EmbeddingValue, RemoteRow},
};

#[derive(Default)]
struct FakeState {
   rows:         Vec<(RemoteRow, bool)>,
   fail_on_page: Option<usize>,
   delay:        Option<Duration>,
   calls:        Vec<PageQuery>,
   after_page:   Option<(usize, RemoteRow)>,
}

/// In-memory knowledge table with the same filter and order as the hosted one.
///
/// Clones share state, so a test can keep a handle while the driver owns another.
#[derive(Clone, Default)]
pub struct FakeRemote {
   state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_rows(rows: Vec<RemoteRow>) -> Self {
      let remote = Self::new();
      for row in rows {
         remote.upsert(row);
      }
      remote
   }

   /// Inserts or replaces a verified row.
   pub fn upsert(&self, row: RemoteRow) {
      let mut state = self.state.lock().unwrap();
      state.rows.retain(|(r, _)| r.id != row.id);
      state.rows.push((row, true));
   }

   pub fn upsert_unverified(&self, row: RemoteRow) {
      let mut state = self.state.lock().unwrap();
      state.rows.retain(|(r, _)| r.id != row.id);
      state.rows.push((row, false));
   }

   pub fn remove(&self, id: &str) {
      self.state.lock().unwrap().rows.retain(|(r, _)| r.id.as_deref() != Some(id));
   }

   /// Fails the given 1-based page with a transport error.
   pub fn fail_on_page(&self, page: Option<usize>) {
      self.state.lock().unwrap().fail_on_page = page;
   }

   /// Upserts `row` right after the given 1-based page is served, as a
   /// concurrent writer editing the table mid-fetch would.
   pub fn update_after_page(&self, page: usize, row: RemoteRow) {
      self.state.lock().unwrap().after_page = Some((page, row));
   }

   pub fn set_delay(&self, delay: Option<Duration>) {
      self.state.lock().unwrap().delay = delay;
   }

   pub fn calls(&self) -> Vec<PageQuery> {
      self.state.lock().unwrap().calls.clone()
   }

   pub fn clear_calls(&self) {
      self.state.lock().unwrap().calls.clear();
   }
}

#[async_trait::async_trait]
impl RemoteStore for FakeRemote {
   async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<DecodedRow>, FetchError> {
      let delay = self.state.lock().unwrap().delay;
      if let Some(delay) = delay {
         tokio::time::sleep(delay).await;
      }

      let mut state = self.state.lock().unwrap();
      state.calls.push(query.clone());
      let page = query.offset / query.limit.max(1) + 1;
      if state.fail_on_page == Some(page) {
         return Err(FetchError::Transport(format!("injected failure on page {page}")));
      }

      let mut matching: Vec<RemoteRow> = state
         .rows
         .iter()
         .filter(|(_, verified)| *verified)
         .filter(|(row, _)| match query.since {
            Some(since) => row.updated_at.is_some_and(|ts| ts >= since),
            None => true,
         })
         .map(|(row, _)| row.clone())
         .collect();
      // updated_at asc (nulls last), then id asc
      matching.sort_by(|a, b| {
         let key = |r: &RemoteRow| (r.updated_at.is_none(), r.updated_at, r.id.clone());
         key(a).cmp(&key(b))
      });
      let served: Vec<DecodedRow> =
         matching.into_iter().skip(query.offset).take(query.limit).map(Ok).collect();

      if let Some((_, row)) = state.after_page.take_if(|(after, _)| *after == page) {
         state.rows.retain(|(r, _)| r.id != row.id);
         state.rows.push((row, true));
      }
      Ok(served)
   }
}

pub fn ts(raw: &str) -> DateTime<Utc> {
   DateTime::parse_from_rfc3339(raw).expect("timestamp").with_timezone(&Utc)
}

pub fn row(id: &str, title: &str, embedding: Vec<f32>, updated_at: &str) -> RemoteRow {
   RemoteRow {
      id:           Some(id.to_string()),
      title:        Some(title.to_string()),
      content:      Some(format!("content of {title}")),
      embedding:    Some(EmbeddingValue::Vector(embedding)),
      content_type: Some("article".to_string()),
      category:     Some("crops".to_string()),
      updated_at:   Some(ts(updated_at)),
   }
}

pub fn options(page_size: usize) -> SyncOptions {
   SyncOptions { page_size, fetch_deadline: None, ..SyncOptions::default() }
}

pub fn driver(remote: &FakeRemote, dir: &Path, options: SyncOptions) -> SyncDriver<FakeRemote> {
   SyncDriver::new(remote.clone(), SnapshotStore::new(dir), options)
}

/// Bytes of every committed file, for byte-identity checks.
pub fn committed_bytes(dir: &Path) -> Vec<Option<Vec<u8>>> {
   ["knowledge_metadata.json", "knowledge_embeddings.npy", "snapshot_manifest.json", "LAST_SYNC"]
      .iter()
      .map(|name| fs::read(dir.join(name)).ok())
      .collect()
}
