//! Client runs and their serialization.

use crate::error::{ClientError, Result};

use parking_lot::{const_mutex, Mutex, MutexGuard};
use tracing::{debug, info};

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    process::Command,
};

/// Runs the native client on a configuration file.
pub trait ClientRunner {
    /// Runs the client and returns its exit code.
    fn run(&self, config_file: &Path, args: &[String]) -> Result<i32>;
}

/// Runs the client executable as a child process:
/// `<executable> --config-file=<config> <args...>`.
#[derive(Clone, Debug)]
pub struct ProcessClientRunner {
    pub executable: PathBuf,
    /// Working directory of the client, the current one if unset.
    pub cwd: Option<PathBuf>,
}

impl ProcessClientRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            cwd: None,
        }
    }
}

impl ClientRunner for ProcessClientRunner {
    fn run(&self, config_file: &Path, args: &[String]) -> Result<i32> {
        let mut command = Command::new(&self.executable);
        command
            .arg(format!("--config-file={}", config_file.display()))
            .args(args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        info!("Running {} on {}", self.executable.display(), config_file.display());

        let status = command.status().map_err(|source| ClientError::Spawn {
            program: self.executable.display().to_string(),
            source,
        })?;
        Ok(status.code().unwrap_or(-1))
    }
}

static CLIENT_MUTEX: Mutex<()> = const_mutex(());

/// Serializes client runs so that two of them never share a device.
///
/// Runs of the same process are serialized by a global mutex; when a lock file is configured,
/// runs of different processes are serialized by an exclusive `flock` on it as well.
#[derive(Clone, Debug, Default)]
pub struct ClientExecutionLock {
    lock_file: Option<PathBuf>,
}

/// Held for the duration of a client run.
#[must_use = "the lock is released when the guard is dropped"]
pub struct ExecutionGuard {
    // Released before the mutex.
    _file: Option<FileLock>,
    _guard: MutexGuard<'static, ()>,
}

impl ClientExecutionLock {
    pub fn new(lock_file: Option<PathBuf>) -> Self {
        Self { lock_file }
    }

    /// Blocks until no other client run holds the lock.
    pub fn acquire(&self) -> Result<ExecutionGuard> {
        let guard = CLIENT_MUTEX.lock();
        let file = match &self.lock_file {
            Some(path) => Some(FileLock::acquire(path)?),
            None => None,
        };
        debug!("Acquired client execution lock");
        Ok(ExecutionGuard {
            _file: file,
            _guard: guard,
        })
    }
}

struct FileLock {
    file: File,
}

impl FileLock {
    #[cfg(unix)]
    fn acquire(path: &Path) -> Result<Self> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| ClientError::file(path, e))?;
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(ClientError::file(path, std::io::Error::last_os_error()));
        }
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| ClientError::file(path, e))?;
        Ok(Self { file })
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;

        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Arc::new(ClientExecutionLock::new(Some(dir.path().join("client.lock"))));
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (lock, running, overlaps) = (lock.clone(), running.clone(), overlaps.clone());
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _guard = lock.acquire().unwrap();
                        if running.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(1));
                        running.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(dir.path().join("client.lock").is_file());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let lock = ClientExecutionLock::default();
        drop(lock.acquire().unwrap());
        let _again = lock.acquire().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn runner_returns_exit_codes() {
        let args = ["--best-solution".to_string(), "1".to_string()];
        let ok = ProcessClientRunner::new("true");
        assert_eq!(ok.run(Path::new("params.ini"), &args).unwrap(), 0);

        let failing = ProcessClientRunner::new("false");
        assert_eq!(failing.run(Path::new("params.ini"), &args).unwrap(), 1);

        let missing = ProcessClientRunner::new("/nonexistent/tensile_client");
        assert!(matches!(
            missing.run(Path::new("params.ini"), &args),
            Err(ClientError::Spawn { .. })
        ));
    }
}
