//! Sync command.
//!
//! Runs one synchronization under the writer lock and prints the report.

use std::path::PathBuf;

use console::style;

use crate::{
   Result,
   config::Config,
   error::PersistenceError,
   lock::SyncLock,
   remote::RestStore,
   snapshot::SnapshotStore,
   sync::{SyncDriver, SyncOptions, SyncReport},
};

#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
   pub full:      bool,
   pub config:    Option<PathBuf>,
   pub data_dir:  Option<PathBuf>,
   pub page_size: Option<usize>,
   pub json:      bool,
}

pub async fn execute(args: SyncArgs) -> Result<()> {
   let mut config = Config::load(args.config.as_deref())?;
   if let Some(dir) = args.data_dir {
      config.data_dir = Some(dir);
   }
   if let Some(page_size) = args.page_size {
      config.page_size = page_size;
   }
   config.validate()?;

   let remote = RestStore::new(&config.remote_settings()?)?;
   let store = SnapshotStore::new(config.snapshot_dir()?);
   store.ensure_dir()?;
   let _lock = SyncLock::try_acquire(&store.lock_path())?;

   let mut driver = SyncDriver::new(remote, store, SyncOptions::from_config(&config, args.full));
   let report = driver.run().await?;

   if args.json {
      let out = serde_json::to_string_pretty(&report).map_err(PersistenceError::from)?;
      println!("{out}");
   } else {
      print_report(&report);
   }
   Ok(())
}

fn print_report(report: &SyncReport) {
   if report.committed {
      println!(
         "{} committed {} records (dim {}) [{}]",
         style("✓").green(),
         report.total_records,
         report.dimension,
         report.mode
      );
   } else {
      println!(
         "{} no changes, {} records unchanged [{}]",
         style("•").dim(),
         report.total_records,
         report.mode
      );
   }
   println!(
      "  {} fetched, {} inserted, {} updated, {} quarantined",
      report.fetched, report.inserted, report.updated, report.quarantined
   );
   println!(
      "  {} {}  {} {}ms",
      style("watermark").dim(),
      report.watermark.to_rfc3339(),
      style("took").dim(),
      report.duration_ms
   );
}
