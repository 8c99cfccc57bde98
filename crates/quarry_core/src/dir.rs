//! Database directory management for the `file` engine.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK        # Advisory lock, one live engine per directory
//! ├─ DATA        # Snapshot of all relations (backup format)
//! └─ .tmpXXXXXX  # Uniquely named, written then renamed over DATA
//! ```

use crate::backup;
use crate::error::{CoreError, CoreResult};
use crate::eval::Relations;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const DATA_FILE: &str = "DATA";

/// Holds an exclusive lock on a database directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    sync_on_write: bool,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - Another handle holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool, sync_on_write: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_options(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_options(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write,
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }

    /// Loads the stored relations. A missing snapshot means a new database.
    pub fn load(&self) -> CoreResult<Relations> {
        let data_path = self.data_path();
        if !data_path.exists() {
            return Ok(Relations::new());
        }
        let (_, relations) = backup::read_file(&data_path)?;
        Ok(relations)
    }

    /// Persists the relations atomically.
    pub fn save(&self, relations: &Relations) -> CoreResult<()> {
        let data = backup::encode(relations)?;
        backup::write_atomic(&self.data_path(), &data, self.sync_on_write)?;
        if self.sync_on_write {
            self.sync_directory()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}
