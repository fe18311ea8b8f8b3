//! Cooperative file lock.
//!
//! The lock is a file created with `create_new` (atomic create-if-absent)
//! holding the owner's key. A second acquisition with the same key is a
//! no-op, so a process that crashed and restarted with a stable key can
//! resume. There is no timeout and no staleness detection.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Default poll interval while another owner holds the lock.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// A held file lock. Released on [`FileLock::release`] or drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    key: String,
    released: bool,
}

impl FileLock {
    /// Acquire the lock at `path`, polling every `wait_interval` while it is
    /// held under a different key.
    ///
    /// Without a `unique_key` a random key is generated, which means no other
    /// process can ever re-enter this lock.
    pub fn acquire(
        path: impl AsRef<Path>,
        unique_key: Option<&str>,
        wait_interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let key = unique_key.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        let mut waited = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(key.as_bytes())?;
                    file.sync_all()?;
                    debug!(path = %path.display(), "acquired file lock");
                    break;
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    match fs::read_to_string(&path) {
                        Ok(holder) if holder == key => {
                            debug!(path = %path.display(), "file lock already held under our key");
                            break;
                        }
                        Ok(_) => {}
                        // Removed between our create attempt and the read; retry at once.
                        Err(err) if err.kind() == ErrorKind::NotFound => continue,
                        Err(err) => return Err(err.into()),
                    }
                    if !waited {
                        debug!(path = %path.display(), "waiting for file lock");
                        waited = true;
                    }
                    std::thread::sleep(wait_interval);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self {
            path,
            key,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Delete the lock file. Releasing twice is a no-op; a lock file removed
    /// out-of-band makes the first release fail.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "released file lock");
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            debug!("Failed to release lock: {}", e);
        }
    }
}

/// Acquire a lock at `path`. See [`FileLock::acquire`].
pub fn lock_file(
    path: impl AsRef<Path>,
    unique_key: Option<&str>,
    wait_interval: Duration,
) -> Result<FileLock> {
    FileLock::acquire(path, unique_key, wait_interval)
}
