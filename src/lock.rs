use std::{
   fs::{self, File, OpenOptions},
   path::{Path, PathBuf},
};

use fs4::FileExt;

use crate::{Error, Result, error::PersistenceError};

/// Exclusive writer lock on `sync.lock` in the snapshot directory.
///
/// Held for the whole run. A second run fails fast with [`Error::Busy`]
/// instead of waiting.
pub struct SyncLock {
   file: File,
   path: PathBuf,
}

impl SyncLock {
   pub fn try_acquire(path: &Path) -> Result<Self> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
            path: parent.to_path_buf(),
            source,
         })?;
      }
      let file = OpenOptions::new()
         .create(true)
         .truncate(false)
         .read(true)
         .write(true)
         .open(path)
         .map_err(|source| PersistenceError::Lock { path: path.to_path_buf(), source })?;

      match FileExt::try_lock_exclusive(&file) {
         Ok(()) => Ok(Self { file, path: path.to_path_buf() }),
         Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            Err(Error::Busy { path: path.to_path_buf() })
         },
         Err(source) => Err(PersistenceError::Lock { path: path.to_path_buf(), source }.into()),
      }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }
}

impl Drop for SyncLock {
   fn drop(&mut self) {
      let _ = FileExt::unlock(&self.file);
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn second_holder_is_busy() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("sync.lock");
      let first = SyncLock::try_acquire(&path).unwrap();
      let err = SyncLock::try_acquire(&path).err().unwrap();
      assert!(matches!(err, Error::Busy { .. }));
      assert_eq!(err.exit_code(), 10);

      drop(first);
      assert!(SyncLock::try_acquire(&path).is_ok());
   }
}
