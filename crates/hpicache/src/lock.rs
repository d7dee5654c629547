//! # Concurrency Guard
//!
//! A process-exclusive lock over one cache root. The lock file holds the PID
//! of the owning process; a lock left behind by a dead process is detected
//! and cleared on the next acquisition.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::store::CacheStore;

/// Exclusive lock on a cache root, released on drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    released: bool,
}

impl PidLock {
    /// Acquire the lock for the current process.
    ///
    /// Fails with [`CacheError::AlreadyRunning`] if the lock file names a
    /// live process. A stale lock (dead PID, or unreadable content) is
    /// removed with a warning and acquisition proceeds.
    pub fn acquire(store: &CacheStore) -> Result<Self, CacheError> {
        let path = store.lock_path();
        // Two rounds: create, or clear a stale lock and create again. A
        // second AlreadyExists means a live contender won the race.
        for round in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())?;
                    debug!(path = %path.display(), "acquired cache lock");
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let holder = read_holder(&path)?;
                    match holder {
                        Some(pid) if process_alive(pid) => {
                            return Err(CacheError::AlreadyRunning(pid));
                        }
                        Some(pid) => {
                            if round > 0 {
                                return Err(CacheError::AlreadyRunning(pid));
                            }
                            warn!(pid, "removing stale lock left by dead process");
                            remove_if_present(&path)?;
                        }
                        None => {
                            if round > 0 {
                                return Err(CacheError::Config(
                                    "lock file is unreadable and cannot be cleared".into(),
                                ));
                            }
                            warn!(path = %path.display(), "removing unparseable lock file");
                            remove_if_present(&path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("lock acquisition exits within two rounds")
    }

    /// Remove the lock file. Safe to call more than once; also runs on drop.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
        self.released = true;
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_holder(path: &Path) -> Result<Option<u32>, CacheError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        // Lost a race with the holder's own release.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_and_release() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let mut lock = PidLock::acquire(&store).unwrap();
        assert!(store.lock_path().exists());
        let written = fs::read_to_string(store.lock_path()).unwrap();
        assert_eq!(written, std::process::id().to_string());
        lock.release();
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn live_holder_blocks_acquisition() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        // Our own PID is definitely alive.
        fs::write(store.lock_path(), std::process::id().to_string()).unwrap();
        match PidLock::acquire(&store) {
            Err(CacheError::AlreadyRunning(pid)) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        // The foreign lock file must be left in place.
        assert!(store.lock_path().exists());
    }

    #[test]
    fn stale_lock_is_cleared() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        // A PID near u32::MAX cannot refer to a live process.
        fs::write(store.lock_path(), u32::MAX.to_string()).unwrap();
        let lock = PidLock::acquire(&store).unwrap();
        let written = fs::read_to_string(store.lock_path()).unwrap();
        assert_eq!(written, std::process::id().to_string());
        drop(lock);
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn garbage_lock_is_cleared() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        fs::write(store.lock_path(), "not-a-pid").unwrap();
        let _lock = PidLock::acquire(&store).unwrap();
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        {
            let _lock = PidLock::acquire(&store).unwrap();
            assert!(store.lock_path().exists());
        }
        assert!(!store.lock_path().exists());
    }
}
