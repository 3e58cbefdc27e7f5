//! Filesystem helpers shared by the snapshot writer and the lock.

use std::{
   fs::{self, File},
   io::Write,
   path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

use crate::error::PersistenceError;

/// Flushes directory entries (renames) to disk.
#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> Result<(), PersistenceError> {
   File::open(dir)
      .and_then(|f| f.sync_all())
      .map_err(|source| PersistenceError::Write { path: dir.to_path_buf(), source })
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir: &Path) -> Result<(), PersistenceError> {
   Ok(())
}

/// Named crash-injection point. A no-op unless built with `failpoints`.
#[cfg(feature = "failpoints")]
pub fn fail_point(name: &str) -> Result<(), PersistenceError> {
   fail::fail_point!(name, |_| Err(PersistenceError::Failpoint(name.to_string())));
   Ok(())
}

#[cfg(not(feature = "failpoints"))]
#[allow(clippy::unnecessary_wraps, reason = "mirrors the failpoints signature")]
pub const fn fail_point(_name: &str) -> Result<(), PersistenceError> {
   Ok(())
}

/// Sibling temp name used for write-then-rename.
pub fn temp_path(path: &Path) -> PathBuf {
   let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
   path.with_file_name(format!("{name}.tmp"))
}

/// Writes `data` to `path` and syncs it. Callers pass a temp path.
pub fn write_synced(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
   let write = || -> std::io::Result<()> {
      let mut file = File::create(path)?;
      file.write_all(data)?;
      file.sync_all()
   };
   write().map_err(|source| PersistenceError::Write { path: path.to_path_buf(), source })
}

pub fn rename(from: &Path, to: &Path) -> Result<(), PersistenceError> {
   fs::rename(from, to).map_err(|source| PersistenceError::Rename {
      from: from.to_path_buf(),
      to: to.to_path_buf(),
      source,
   })
}

/// Writes `data` under `path` via a synced temp file and a rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)
         .map_err(|source| PersistenceError::CreateDir { path: parent.to_path_buf(), source })?;
   }
   let tmp_path = temp_path(path);
   write_synced(&tmp_path, data)?;
   rename(&tmp_path, path)?;
   if let Some(parent) = path.parent() {
      fsync_dir(parent)?;
   }
   Ok(())
}

/// Reads a file, mapping `NotFound` to `None`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PersistenceError> {
   match fs::read(path) {
      Ok(data) => Ok(Some(data)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(PersistenceError::Read { path: path.to_path_buf(), source }),
   }
}

pub fn sha256_hex(data: &[u8]) -> String {
   hex::encode(Sha256::digest(data))
}

/// Formats a byte count as a human-readable size string
pub fn format_size(bytes: u64) -> String {
   const KB: u64 = 1024;
   const MB: u64 = KB * 1024;
   const GB: u64 = MB * 1024;

   if bytes < KB {
      format!("{bytes} B")
   } else if bytes < MB {
      format!("{:.1} KB", bytes as f64 / KB as f64)
   } else if bytes < GB {
      format!("{:.1} MB", bytes as f64 / MB as f64)
   } else {
      format!("{:.1} GB", bytes as f64 / GB as f64)
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn write_atomic_replaces_and_leaves_no_temp() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("nested").join("file.json");
      write_atomic(&path, b"one").unwrap();
      write_atomic(&path, b"two").unwrap();
      assert_eq!(fs::read(&path).unwrap(), b"two");
      assert!(!temp_path(&path).exists());
   }

   #[test]
   fn read_optional_missing_is_none() {
      let dir = TempDir::new().unwrap();
      assert!(read_optional(&dir.path().join("absent")).unwrap().is_none());
   }

   #[test]
   fn temp_path_is_sibling() {
      let path = Path::new("/data/knowledge_embeddings.npy");
      assert_eq!(temp_path(path), PathBuf::from("/data/knowledge_embeddings.npy.tmp"));
   }

   #[test]
   fn format_size_units() {
      assert_eq!(format_size(512), "512 B");
      assert_eq!(format_size(2048), "2.0 KB");
   }
}
