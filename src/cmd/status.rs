//! Snapshot status command.
//!
//! Reads the committed pair the way a consumer would and summarizes it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;

use crate::{
   Result,
   config::Config,
   error::PersistenceError,
   snapshot::{SnapshotReader, SnapshotStore},
   util::format_size,
};

#[derive(Debug, Serialize)]
struct StatusReport {
   dir:            PathBuf,
   records:        usize,
   dimension:      usize,
   watermark:      Option<DateTime<Utc>>,
   fingerprint:    Option<String>,
   metadata_bytes: Option<u64>,
   matrix_bytes:   Option<u64>,
}

pub fn execute(config_path: Option<PathBuf>, data_dir: Option<PathBuf>, json: bool) -> Result<()> {
   let mut config = Config::load(config_path.as_deref())?;
   if let Some(dir) = data_dir {
      config.data_dir = Some(dir);
   }
   config.validate()?;

   let store = SnapshotStore::new(config.snapshot_dir()?);
   let reader =
      SnapshotReader::new(store.clone(), config.reader_attempts, config.reader_backoff());
   let snapshot = reader.read()?;
   let manifest = snapshot.manifest.as_ref();

   let report = StatusReport {
      dir:            store.dir().to_path_buf(),
      records:        snapshot.len(),
      dimension:      snapshot.dimension(),
      watermark:      store.read_watermark()?,
      fingerprint:    manifest.map(|m| m.fingerprint.clone()),
      metadata_bytes: manifest.map(|m| m.metadata.size_bytes),
      matrix_bytes:   manifest.map(|m| m.matrix.size_bytes),
   };

   if json {
      let out = serde_json::to_string_pretty(&report).map_err(PersistenceError::from)?;
      println!("{out}");
      return Ok(());
   }

   println!("{}", style(report.dir.display()).bold());
   println!("  records    {}", report.records);
   println!("  dimension  {}", report.dimension);
   match report.watermark {
      Some(ts) => println!("  watermark  {}", ts.to_rfc3339()),
      None => println!("  watermark  {}", style("never synced").dim()),
   }
   if let (Some(meta), Some(matrix)) = (report.metadata_bytes, report.matrix_bytes) {
      println!("  files      {} metadata, {} matrix", format_size(meta), format_size(matrix));
   }
   if let Some(fp) = &report.fingerprint {
      println!("  content    {}", &fp[..fp.len().min(16)]);
   }
   Ok(())
}
