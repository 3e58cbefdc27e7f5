//! Consumer-side snapshot loading.
//!
//! A reader can race the writer's two renames and see a new matrix beside
//! old metadata. It checks the pair against itself and the manifest, and
//! re-reads after a short backoff until the pair agrees.

use std::{thread, time::Duration};

use ndarray::Array2;
use tracing::debug;

use super::{
   manifest::SnapshotManifest,
   store::{SnapshotStore, decode_matrix, decode_metadata},
};
use crate::{error::PersistenceError, types::RecordMeta};

/// An aligned metadata/matrix pair: row `i` of `matrix` belongs to `metadata[i]`.
#[derive(Debug, Clone)]
pub struct Snapshot {
   pub metadata: Vec<RecordMeta>,
   pub matrix:   Array2<f32>,
   /// The manifest this pair was verified against, from the same read pass.
   pub manifest: Option<SnapshotManifest>,
}

impl Snapshot {
   pub fn len(&self) -> usize {
      self.metadata.len()
   }

   pub fn is_empty(&self) -> bool {
      self.metadata.is_empty()
   }

   pub fn dimension(&self) -> usize {
      self.matrix.ncols()
   }
}

#[derive(Debug, Clone)]
pub struct SnapshotReader {
   store:    SnapshotStore,
   attempts: usize,
   backoff:  Duration,
}

impl SnapshotReader {
   pub fn new(store: SnapshotStore, attempts: usize, backoff: Duration) -> Self {
      Self { store, attempts: attempts.max(1), backoff }
   }

   pub fn read(&self) -> Result<Snapshot, PersistenceError> {
      let mut last = (0, 0);
      for attempt in 1..=self.attempts {
         match self.try_read()? {
            Ok(snapshot) => return Ok(snapshot),
            Err(rows) => {
               debug!(
                  attempt,
                  metadata_rows = rows.0,
                  matrix_rows = rows.1,
                  "snapshot pair not aligned, re-reading"
               );
               last = rows;
            },
         }
         if attempt < self.attempts {
            thread::sleep(self.backoff);
         }
      }
      Err(PersistenceError::Misaligned { metadata_rows: last.0, matrix_rows: last.1 })
   }

   /// One pass. The inner `Err` carries the observed row counts of a pair
   /// that did not line up.
   fn try_read(&self) -> Result<Result<Snapshot, (usize, usize)>, PersistenceError> {
      let raw = self.store.read_raw()?;

      let metadata = match &raw.metadata {
         Some(bytes) => decode_metadata(&self.store.metadata_path(), bytes)?,
         None => Vec::new(),
      };
      let matrix = match &raw.matrix {
         Some(bytes) => decode_matrix(&self.store.matrix_path(), bytes)?,
         None => Array2::zeros((0, 0)),
      };
      let rows = (metadata.len(), matrix.nrows());
      if rows.0 != rows.1 {
         return Ok(Err(rows));
      }

      if let Some(manifest) = &raw.manifest {
         let metadata_bytes = raw.metadata.as_deref().unwrap_or_default();
         let matrix_bytes = raw.matrix.as_deref().unwrap_or_default();
         if manifest.verify(metadata_bytes, matrix_bytes).is_err() {
            return Ok(Err(rows));
         }
      }
      Ok(Ok(Snapshot { metadata, matrix, manifest: raw.manifest }))
   }
}
