//! Lock file management for daemon exclusivity
//!
//! `run` and `backup` both take the lock, so at most one process drives
//! backup cycles for a state directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "daemon.lock";
const LOCK_ATTEMPTS: usize = 3;

/// Exclusive lock on `<state_dir>/daemon.lock`
pub struct DaemonLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl DaemonLock {
    /// Acquire exclusive daemon lock
    ///
    /// Fails while any process holds the flock, whatever the file says.
    /// A file left behind by a dead process carries no flock and is taken over.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
        let lock_path = state_dir.join(LOCK_FILE);

        for _ in 0..LOCK_ATTEMPTS {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&lock_path)
                .context("Failed to open lock file")?;

            if !try_flock_exclusive(&file)? {
                match read_lock_content(&mut file) {
                    Ok(holder) => anyhow::bail!("Daemon already running (pid {})", holder.pid),
                    Err(_) => anyhow::bail!(
                        "Daemon lock {} is held by another process",
                        lock_path.display()
                    ),
                }
            }

            // A releasing holder may have unlinked the path between our open and flock
            if !is_same_file(&file, &lock_path) {
                continue;
            }

            if let Ok(previous) = read_lock_content(&mut file) {
                if previous.pid != std::process::id() {
                    tracing::warn!(
                        path = %lock_path.display(),
                        stale_pid = previous.pid,
                        "Taking over stale daemon lock"
                    );
                }
            }
            write_lock_content(&mut file)?;

            return Ok(Self {
                path: lock_path,
                file,
            });
        }

        anyhow::bail!("Daemon lock {} keeps changing hands", lock_path.display())
    }

    /// Live process holding the lock in `state_dir`, if any
    pub fn holder(state_dir: &Path) -> Option<LockHolder> {
        let mut file = File::open(state_dir.join(LOCK_FILE)).ok()?;
        let holder = read_lock_content(&mut file).ok()?;
        is_process_alive(holder.pid).then_some(holder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the daemon lock
    pub fn release(self) -> Result<()> {
        std::fs::remove_file(&self.path).context("Failed to remove lock file")?;
        Ok(())
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn write_lock_content(file: &mut File) -> Result<()> {
    let content = LockHolder {
        pid: std::process::id(),
        started_at: Utc::now(),
    };

    let serialized =
        serde_json::to_string(&content).context("Failed to serialize lock content")?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn read_lock_content(file: &mut File) -> Result<LockHolder> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).context("Failed to deserialize lock content")
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

/// Whether `file` is still the inode linked at `path`
#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(linked)) => held.dev() == linked.dev() && held.ino() == linked.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Null signal: existence check only
    match kill(Pid::from_raw(raw), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquisition() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path();

        let lock1 = DaemonLock::acquire(state_dir);
        assert!(lock1.is_ok());

        // Same process, separate open file: the flock is still held
        let lock2 = DaemonLock::acquire(state_dir);
        assert!(lock2.is_err());

        drop(lock1);

        let lock3 = DaemonLock::acquire(state_dir);
        assert!(lock3.is_ok());
    }

    #[test]
    fn test_lock_release() {
        let temp_dir = TempDir::new().unwrap();

        let lock = DaemonLock::acquire(temp_dir.path()).unwrap();
        let lock_path = lock.path().to_path_buf();
        assert_eq!(lock_path, temp_dir.path().join("daemon.lock"));
        assert!(lock_path.exists());

        lock.release().unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_creates_state_dir() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join("nested/state");

        let _lock = DaemonLock::acquire(&state_dir).unwrap();
        assert!(state_dir.join("daemon.lock").exists());
    }

    #[test]
    fn test_lock_content() {
        let temp_dir = TempDir::new().unwrap();
        let lock_file = temp_dir.path().join("test.lock");

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_file)
            .unwrap();

        write_lock_content(&mut file).unwrap();
        let content = read_lock_content(&mut file).unwrap();

        assert_eq!(content.pid, std::process::id());
        assert!(content.started_at <= Utc::now());
    }

    #[test]
    fn test_holder() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(DaemonLock::holder(temp_dir.path()), None);

        let lock = DaemonLock::acquire(temp_dir.path()).unwrap();
        let holder = DaemonLock::holder(temp_dir.path()).unwrap();
        assert_eq!(holder.pid, std::process::id());

        drop(lock);
        assert_eq!(DaemonLock::holder(temp_dir.path()), None);
    }

    #[test]
    fn test_dead_holder_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("daemon.lock"),
            r#"{"pid":999999,"started_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(DaemonLock::holder(temp_dir.path()), None);
        // Unlocked leftover file is simply taken over
        assert!(DaemonLock::acquire(temp_dir.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_flock_without_content_blocks_acquire() {
        use nix::fcntl::{flock, FlockArg};
        use std::os::unix::io::AsRawFd;

        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("daemon.lock");

        // Another process between its flock and writing its pid
        let held = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .unwrap();
        flock(held.as_raw_fd(), FlockArg::LockExclusiveNonblock).unwrap();

        let err = DaemonLock::acquire(temp_dir.path()).err().unwrap();
        assert!(err.to_string().contains("held by another process"));
        assert!(lock_path.exists());
        assert_eq!(fs::read_to_string(&lock_path).unwrap(), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_flock_with_unknown_pid_blocks_acquire() {
        use nix::fcntl::{flock, FlockArg};
        use std::os::unix::io::AsRawFd;

        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("daemon.lock");
        // Holder whose pid is not visible here (another PID namespace)
        fs::write(&lock_path, r#"{"pid":999999,"started_at":"2024-01-01T00:00:00Z"}"#).unwrap();
        let held = File::open(&lock_path).unwrap();
        flock(held.as_raw_fd(), FlockArg::LockExclusiveNonblock).unwrap();

        let err = DaemonLock::acquire(temp_dir.path()).err().unwrap();
        assert!(err.to_string().contains("pid 999999"));
        assert!(fs::read_to_string(&lock_path).unwrap().contains("999999"));
    }

    #[test]
    fn test_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_process_alive_nonexistent() {
        // PID 999999 is unlikely to exist
        assert!(!is_process_alive(999999));
    }
}
