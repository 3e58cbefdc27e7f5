//! Sync driver: one run from mode selection to commit.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
   Result,
   config::Config,
   fetch::{FetchOptions, fetch_changes},
   matrix::build_matrix,
   remote::RemoteStore,
   snapshot::{SnapshotStore, detect_change, merge},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
   Full,
   Incremental,
}

impl std::fmt::Display for SyncMode {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      match self {
         Self::Full => f.write_str("full"),
         Self::Incremental => f.write_str("incremental"),
      }
   }
}

/// Run lifecycle. `Done`, `NoOpDone` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
   Idle,
   Fetching,
   Merging,
   DetectingChange,
   Committing,
   Done,
   NoOpDone,
   Failed,
}

impl SyncState {
   pub const fn is_terminal(self) -> bool {
      matches!(self, Self::Done | Self::NoOpDone | Self::Failed)
   }

   const fn can_advance_to(self, next: Self) -> bool {
      matches!(
         (self, next),
         (Self::Idle, Self::Fetching)
            | (Self::Fetching, Self::Merging | Self::Failed)
            | (Self::Merging, Self::DetectingChange)
            | (Self::DetectingChange, Self::NoOpDone | Self::Committing)
            | (Self::Committing, Self::Done)
      )
   }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
   pub full:           bool,
   pub page_size:      usize,
   pub safety_margin:  Duration,
   pub fetch_deadline: Option<Duration>,
   pub embedding_dim:  Option<usize>,
}

impl SyncOptions {
   pub fn from_config(config: &Config, full: bool) -> Self {
      Self {
         full,
         page_size: config.page_size,
         safety_margin: config.safety_margin(),
         fetch_deadline: config.fetch_deadline(),
         embedding_dim: config.embedding_dim,
      }
   }
}

impl Default for SyncOptions {
   fn default() -> Self {
      Self::from_config(&Config::default(), false)
   }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
   pub mode:          SyncMode,
   pub fetched:       usize,
   pub quarantined:   usize,
   pub inserted:      usize,
   pub updated:       usize,
   pub total_records: usize,
   pub dimension:     usize,
   pub committed:     bool,
   pub fingerprint:   String,
   pub watermark:     DateTime<Utc>,
   pub state:         SyncState,
   pub duration_ms:   u64,
}

/// Drives one sync run against a remote store and a local snapshot directory.
///
/// The driver takes no lock of its own; callers that may overlap must hold
/// the writer lock (see [`crate::lock::SyncLock`]) for the whole run.
pub struct SyncDriver<R: RemoteStore> {
   remote:  R,
   store:   SnapshotStore,
   options: SyncOptions,
   state:   SyncState,
}

impl<R: RemoteStore> SyncDriver<R> {
   pub const fn new(remote: R, store: SnapshotStore, options: SyncOptions) -> Self {
      Self { remote, store, options, state: SyncState::Idle }
   }

   pub const fn state(&self) -> SyncState {
      self.state
   }

   pub const fn store(&self) -> &SnapshotStore {
      &self.store
   }

   pub const fn remote(&self) -> &R {
      &self.remote
   }

   fn advance(&mut self, next: SyncState) {
      debug_assert!(
         self.state.can_advance_to(next),
         "invalid transition {:?} -> {next:?}",
         self.state
      );
      debug!(from = ?self.state, to = ?next, "sync state");
      self.state = next;
   }

   pub async fn run(&mut self) -> Result<SyncReport> {
      let started = Instant::now();
      self.state = SyncState::Idle;

      let cleared = self.store.clear_stale_temps()?;
      if cleared > 0 {
         info!(cleared, "removed temp files from an interrupted run");
      }
      let local = self.store.load()?;
      let previous_watermark = self.store.read_watermark()?;

      let mode = if self.options.full {
         SyncMode::Full
      } else if local.is_torn() {
         warn!("local snapshot is torn, forcing a full rebuild");
         SyncMode::Full
      } else if previous_watermark.is_none() {
         SyncMode::Full
      } else {
         SyncMode::Incremental
      };
      let since = match mode {
         SyncMode::Full => None,
         SyncMode::Incremental => {
            previous_watermark.map(|w| lower_bound(w, self.options.safety_margin))
         },
      };
      info!(%mode, local_records = local.records.len(), since = ?since, "starting sync");

      self.advance(SyncState::Fetching);
      let fetch_opts = FetchOptions {
         since,
         page_size: self.options.page_size,
         deadline: self.options.fetch_deadline,
      };
      let batch = match fetch_changes(&self.remote, &fetch_opts).await {
         Ok(batch) => batch,
         Err(e) => {
            self.advance(SyncState::Failed);
            warn!("fetch failed, watermark left at {previous_watermark:?}: {e}");
            return Err(e);
         },
      };
      info!(
         fetched = batch.records.len(),
         quarantined = batch.quarantined,
         pages = batch.pages,
         "fetch complete"
      );

      self.advance(SyncState::Merging);
      let fetched = batch.records.len();
      let quarantined = batch.quarantined;
      let watermark = next_watermark(previous_watermark, batch.max_updated_at(), batch.started_at);
      let existing = match mode {
         SyncMode::Full => Vec::new(),
         SyncMode::Incremental => local.records,
      };
      let merged = merge(existing, batch.records);

      self.advance(SyncState::DetectingChange);
      let decision = detect_change(&local.fingerprint, &merged.records)?;

      let (committed, dimension) = if decision.is_changed() {
         self.advance(SyncState::Committing);
         let matrix = build_matrix(&merged.records, self.options.embedding_dim)?;
         self.store.commit(&merged.records, &matrix, decision.fingerprint())?;
         self.store.write_watermark(watermark)?;
         self.advance(SyncState::Done);
         (true, matrix.ncols())
      } else {
         self.store.write_watermark(watermark)?;
         self.advance(SyncState::NoOpDone);
         (false, local.dimension)
      };

      let report = SyncReport {
         mode,
         fetched,
         quarantined,
         inserted: merged.inserted,
         updated: merged.updated,
         total_records: merged.records.len(),
         dimension,
         committed,
         fingerprint: decision.fingerprint().to_string(),
         watermark,
         state: self.state,
         duration_ms: started.elapsed().as_millis() as u64,
      };
      info!(
         committed,
         total = report.total_records,
         inserted = report.inserted,
         updated = report.updated,
         "sync finished"
      );
      Ok(report)
   }
}

fn lower_bound(watermark: DateTime<Utc>, margin: Duration) -> DateTime<Utc> {
   chrono::Duration::from_std(margin)
      .ok()
      .and_then(|margin| watermark.checked_sub_signed(margin))
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Never moves backwards. With no prior watermark and no timestamps in the
/// batch, the fetch start time is used.
fn next_watermark(
   previous: Option<DateTime<Utc>>,
   batch_max: Option<DateTime<Utc>>,
   started_at: DateTime<Utc>,
) -> DateTime<Utc> {
   match (previous, batch_max) {
      (Some(prev), Some(max)) => prev.max(max),
      (Some(ts), None) | (None, Some(ts)) => ts,
      (None, None) => started_at,
   }
}
