//! Snapshot store (load, stage, publish, watermark).
//!
//! The committed pair lives under a single data directory. Nothing is written
//! under a final name directly: each file is staged as `<name>.tmp`, synced,
//! and renamed into place. The manifest is written last and lets a loader or
//! reader tell a complete pair from one caught between renames.

use std::{
   fs,
   path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat, Utc};
use ndarray::Array2;
use tracing::{debug, warn};

use super::{
   fingerprint::fingerprint,
   manifest::{MANIFEST_SCHEMA_VERSION, SnapshotFileRef, SnapshotManifest},
   npy,
};
use crate::{
   error::PersistenceError,
   matrix::matrix_rows,
   types::{KnowledgeRecord, RecordMeta},
   util::{fail_point, fsync_dir, read_optional, rename, temp_path, write_atomic, write_synced},
};

pub const METADATA_FILE: &str = "knowledge_metadata.json";
pub const MATRIX_FILE: &str = "knowledge_embeddings.npy";
pub const MANIFEST_FILE: &str = "snapshot_manifest.json";
pub const WATERMARK_FILE: &str = "LAST_SYNC";
pub const LOCK_FILE: &str = "sync.lock";

/// The committed snapshot as seen at startup.
#[derive(Debug, Clone)]
pub struct LocalSnapshot {
   /// Records in matrix row order. Empty when the snapshot is torn.
   pub records:     Vec<KnowledgeRecord>,
   pub dimension:   usize,
   /// Empty when torn, so no merged set ever compares equal to it.
   pub fingerprint: String,
   pub torn:        Option<String>,
}

impl LocalSnapshot {
   pub const fn is_torn(&self) -> bool {
      self.torn.is_some()
   }

   fn torn(reason: String) -> Self {
      Self { records: Vec::new(), dimension: 0, fingerprint: String::new(), torn: Some(reason) }
   }
}

/// Raw committed bytes, read without interpretation.
pub(crate) struct RawPair {
   pub metadata: Option<Vec<u8>>,
   pub matrix:   Option<Vec<u8>>,
   pub manifest: Option<SnapshotManifest>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
   dir: PathBuf,
}

impl SnapshotStore {
   pub fn new(dir: impl Into<PathBuf>) -> Self {
      Self { dir: dir.into() }
   }

   pub fn dir(&self) -> &Path {
      &self.dir
   }

   pub fn metadata_path(&self) -> PathBuf {
      self.dir.join(METADATA_FILE)
   }

   pub fn matrix_path(&self) -> PathBuf {
      self.dir.join(MATRIX_FILE)
   }

   pub fn manifest_path(&self) -> PathBuf {
      self.dir.join(MANIFEST_FILE)
   }

   pub fn watermark_path(&self) -> PathBuf {
      self.dir.join(WATERMARK_FILE)
   }

   pub fn lock_path(&self) -> PathBuf {
      self.dir.join(LOCK_FILE)
   }

   pub fn ensure_dir(&self) -> Result<(), PersistenceError> {
      fs::create_dir_all(&self.dir)
         .map_err(|source| PersistenceError::CreateDir { path: self.dir.clone(), source })
   }

   /// Removes temp files left behind by a run that died mid-commit.
   ///
   /// Callers must hold the writer lock; a live writer's temps look the same.
   pub fn clear_stale_temps(&self) -> Result<usize, PersistenceError> {
      let mut removed = 0;
      let finals =
         [self.metadata_path(), self.matrix_path(), self.manifest_path(), self.watermark_path()];
      for path in finals {
         let tmp = temp_path(&path);
         match fs::remove_file(&tmp) {
            Ok(()) => {
               debug!("removed stale temp {}", tmp.display());
               removed += 1;
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(source) => return Err(PersistenceError::Write { path: tmp, source }),
         }
      }
      Ok(removed)
   }

   pub(crate) fn read_raw(&self) -> Result<RawPair, PersistenceError> {
      let metadata = read_optional(&self.metadata_path())?;
      let matrix = read_optional(&self.matrix_path())?;
      let manifest = SnapshotManifest::load(&self.manifest_path())?;
      Ok(RawPair { metadata, matrix, manifest })
   }

   /// Loads the committed pair and recomputes its fingerprint.
   ///
   /// Missing files mean an empty snapshot. A pair that disagrees with its
   /// manifest, or with itself on row count, is reported as torn instead of
   /// failing the run.
   pub fn load(&self) -> Result<LocalSnapshot, PersistenceError> {
      let manifest_path = self.manifest_path();
      let manifest = match SnapshotManifest::load(&manifest_path) {
         Ok(manifest) => manifest,
         Err(PersistenceError::Decode { reason, .. }) => {
            return Ok(self.report_torn(format!("unreadable manifest: {reason}")));
         },
         Err(e) => return Err(e),
      };
      let metadata = read_optional(&self.metadata_path())?;
      let matrix = read_optional(&self.matrix_path())?;

      let (metadata, matrix) = match (metadata, matrix) {
         (None, None) if manifest.is_none() => {
            return Ok(LocalSnapshot {
               records:     Vec::new(),
               dimension:   0,
               fingerprint: fingerprint(&[])?,
               torn:        None,
            });
         },
         (Some(metadata), Some(matrix)) => (metadata, matrix),
         (metadata, matrix) => {
            return Ok(self.report_torn(format!(
               "incomplete pair (metadata present: {}, matrix present: {})",
               metadata.is_some(),
               matrix.is_some()
            )));
         },
      };

      if let Some(manifest) = &manifest
         && let Err(reason) = manifest.verify(&metadata, &matrix)
      {
         return Ok(self.report_torn(reason));
      }

      let metas = match decode_metadata(&self.metadata_path(), &metadata) {
         Ok(metas) => metas,
         Err(e) => return Ok(self.report_torn(e.to_string())),
      };
      let matrix = match decode_matrix(&self.matrix_path(), &matrix) {
         Ok(matrix) => matrix,
         Err(e) => return Ok(self.report_torn(e.to_string())),
      };
      if metas.len() != matrix.nrows() {
         return Ok(self.report_torn(format!(
            "{} metadata rows vs {} matrix rows",
            metas.len(),
            matrix.nrows()
         )));
      }

      let dimension = matrix.ncols();
      let records: Vec<KnowledgeRecord> = metas
         .into_iter()
         .zip(matrix_rows(&matrix))
         .map(|(meta, row)| KnowledgeRecord::from_parts(meta, row))
         .collect();
      let fingerprint = fingerprint(&records)?;
      debug!(records = records.len(), dimension, "loaded local snapshot");
      Ok(LocalSnapshot { records, dimension, fingerprint, torn: None })
   }

   fn report_torn(&self, reason: String) -> LocalSnapshot {
      warn!("local snapshot in {} is torn: {reason}", self.dir.display());
      LocalSnapshot::torn(reason)
   }

   /// Reads the watermark marker. An unparseable marker counts as absent.
   pub fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, PersistenceError> {
      let path = self.watermark_path();
      let Some(raw) = read_optional(&path)? else {
         return Ok(None);
      };
      let text = String::from_utf8_lossy(&raw);
      let line = text.lines().next().unwrap_or("").trim();
      if line.is_empty() {
         return Ok(None);
      }
      match DateTime::parse_from_rfc3339(line) {
         Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
         Err(e) => {
            warn!("ignoring unparseable watermark {line:?} in {}: {e}", path.display());
            Ok(None)
         },
      }
   }

   pub fn write_watermark(&self, watermark: DateTime<Utc>) -> Result<(), PersistenceError> {
      let line = format!("{}\n", watermark.to_rfc3339_opts(SecondsFormat::AutoSi, true));
      write_atomic(&self.watermark_path(), line.as_bytes())
   }

   /// Writes both temp files and prepares the manifest, without touching any
   /// final name.
   pub fn stage(
      &self,
      records: &[KnowledgeRecord],
      matrix: &Array2<f32>,
      fingerprint: &str,
   ) -> Result<StagedSnapshot<'_>, PersistenceError> {
      self.ensure_dir()?;
      let metas: Vec<RecordMeta> = records.iter().map(KnowledgeRecord::meta).collect();
      let metadata_bytes = serde_json::to_vec_pretty(&metas)?;
      let matrix_bytes = npy::encode(matrix);

      let staged = StagedSnapshot {
         store:     self,
         manifest:  SnapshotManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            created_at:     Utc::now().to_rfc3339(),
            fingerprint:    fingerprint.to_string(),
            records:        records.len() as u64,
            dimension:      matrix.ncols() as u64,
            metadata:       SnapshotFileRef::describe(METADATA_FILE, &metadata_bytes),
            matrix:         SnapshotFileRef::describe(MATRIX_FILE, &matrix_bytes),
         },
         published: false,
      };
      write_synced(&temp_path(&self.matrix_path()), &matrix_bytes)?;
      write_synced(&temp_path(&self.metadata_path()), &metadata_bytes)?;
      Ok(staged)
   }

   /// Stages and publishes in one step.
   pub fn commit(
      &self,
      records: &[KnowledgeRecord],
      matrix: &Array2<f32>,
      fingerprint: &str,
   ) -> Result<SnapshotManifest, PersistenceError> {
      self.stage(records, matrix, fingerprint)?.publish()
   }
}

/// Temp files written and synced, waiting to be renamed into place.
///
/// Dropping an unpublished stage removes its temp files.
pub struct StagedSnapshot<'a> {
   store:     &'a SnapshotStore,
   manifest:  SnapshotManifest,
   published: bool,
}

impl StagedSnapshot<'_> {
   pub const fn manifest(&self) -> &SnapshotManifest {
      &self.manifest
   }

   /// Renames matrix then metadata into place, then writes the manifest.
   pub fn publish(mut self) -> Result<SnapshotManifest, PersistenceError> {
      let store = self.store;
      fail_point("commit.after_stage")?;

      let matrix_path = store.matrix_path();
      rename(&temp_path(&matrix_path), &matrix_path)?;
      fail_point("commit.after_matrix_rename")?;

      let metadata_path = store.metadata_path();
      rename(&temp_path(&metadata_path), &metadata_path)?;
      self.published = true;
      fail_point("commit.before_manifest")?;

      self.manifest.write_atomic(&store.manifest_path())?;
      fsync_dir(store.dir())?;
      debug!(
         records = self.manifest.records,
         dimension = self.manifest.dimension,
         "published snapshot"
      );
      Ok(self.manifest.clone())
   }
}

impl Drop for StagedSnapshot<'_> {
   fn drop(&mut self) {
      if self.published {
         return;
      }
      for path in [self.store.matrix_path(), self.store.metadata_path()] {
         let _ = fs::remove_file(temp_path(&path));
      }
   }
}

pub(crate) fn decode_metadata(path: &Path, data: &[u8]) -> Result<Vec<RecordMeta>, PersistenceError> {
   serde_json::from_slice(data)
      .map_err(|e| PersistenceError::Decode { path: path.to_path_buf(), reason: e.to_string() })
}

pub(crate) fn decode_matrix(path: &Path, data: &[u8]) -> Result<Array2<f32>, PersistenceError> {
   npy::decode(data).map_err(|reason| PersistenceError::Decode { path: path.to_path_buf(), reason })
}
