use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::error::DispatchError;

/// Maximum number of acquisition attempts before giving up.
pub const MAX_ATTEMPTS: u32 = 1000;

/// Fixed pause between two acquisition attempts. No backoff, no jitter.
pub const TIME_BETWEEN_ATTEMPTS: Duration = Duration::from_secs(1);

/// Retry policy of a lock acquisition: a hard attempt ceiling polled at a
/// fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: MAX_ATTEMPTS,
            interval: TIME_BETWEEN_ATTEMPTS,
        }
    }
}

/// Exclusive ownership of a path among cooperating processes.
///
/// Ownership is claimed by atomically creating a marker directory next to
/// the target path and released by removing it when the guard is dropped.
/// A process that dies while holding the marker leaves it behind; such
/// orphans require manual cleanup. Processes that bypass the marker
/// convention are not locked out.
pub struct FileLock {
    marker: PathBuf,
}

impl FileLock {
    /// The marker guarding `path`: a hidden `.<file-name>.lock` sibling.
    pub fn marker_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{file_name}.lock"))
    }

    /// Claim the marker for `path`, polling until it could be created or the
    /// retry budget runs out.
    pub fn acquire(path: &Path, policy: RetryPolicy) -> crate::Result<FileLock> {
        let marker = Self::marker_path(path);

        for _ in 0..policy.attempts {
            // create_dir fails if the marker already exists, atomically
            match std::fs::create_dir(&marker) {
                Ok(()) => return Ok(FileLock { marker }),
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::debug!(
                        "Cannot immediately lock {path:?}, retrying in {:?}",
                        policy.interval
                    );
                    std::thread::sleep(policy.interval);
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(DispatchError::LockTimeout {
            path: path.to_path_buf(),
            attempts: policy.attempts,
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir(&self.marker) {
            log::warn!("Could not remove lock marker {:?}: {}", self.marker, error);
        }
    }
}

/// A file opened while holding the lock marker of its path.
///
/// Dereferences to the underlying [`File`]; the marker is released when the
/// value is dropped, on success and failure paths alike.
pub struct LockedFile {
    file: File,
    _lock: FileLock,
}

impl Deref for LockedFile {
    type Target = File;

    fn deref(&self) -> &File {
        &self.file
    }
}

impl DerefMut for LockedFile {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

/// Open `path` with `options` under the lock marker.
///
/// Callers must handle [`DispatchError::LockTimeout`]: the marker being held
/// for the whole retry budget means the operation did not happen.
pub fn open_with_lock(
    path: &Path,
    options: &OpenOptions,
    policy: RetryPolicy,
) -> crate::Result<LockedFile> {
    let lock = FileLock::acquire(path, policy)?;
    let file = options.open(path)?;
    Ok(LockedFile { file, _lock: lock })
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::Error;
    use crate::common::lockfile::{FileLock, RetryPolicy, open_with_lock};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            interval: Duration::from_millis(10),
        }
    }

    fn registry_path(dir: &TempDir) -> PathBuf {
        dir.path().join("registry.json")
    }

    #[test]
    fn test_marker_path_is_hidden_sibling() {
        let marker = FileLock::marker_path(&PathBuf::from("/tmp/dir/registry.json"));
        assert_eq!(marker, PathBuf::from("/tmp/dir/.registry.json.lock"));
    }

    #[test]
    fn test_sequential_acquisitions_leave_no_marker() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let marker = FileLock::marker_path(&path);

        for _ in 0..2 {
            let lock = FileLock::acquire(&path, fast_policy()).unwrap();
            assert!(marker.is_dir());
            drop(lock);
            assert!(!marker.exists());
        }
    }

    #[test]
    fn test_held_marker_times_out_and_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let marker = FileLock::marker_path(&path);
        std::fs::create_dir(&marker).unwrap();

        match FileLock::acquire(&path, fast_policy()) {
            Err(Error::LockTimeout { attempts, .. }) => assert_eq!(attempts, 3),
            Err(other) => panic!("Expected lock timeout, got {other:?}"),
            Ok(_) => panic!("Expected lock timeout, got a lock"),
        }
        // The foreign marker is not ours to remove
        assert!(marker.is_dir());
    }

    #[test]
    fn test_acquisition_succeeds_after_release() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let marker = FileLock::marker_path(&path);
        std::fs::create_dir(&marker).unwrap();

        assert!(FileLock::acquire(&path, fast_policy()).is_err());
        std::fs::remove_dir(&marker).unwrap();
        assert!(FileLock::acquire(&path, fast_policy()).is_ok());
        assert!(!marker.exists());
    }

    #[test]
    fn test_open_with_lock_releases_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let marker = FileLock::marker_path(&path);

        let mut options = OpenOptions::new();
        options.write(true).create(true);

        let mut file = open_with_lock(&path, &options, fast_policy()).unwrap();
        assert!(marker.is_dir());
        file.write_all(b"{}").unwrap();
        drop(file);

        assert!(!marker.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
