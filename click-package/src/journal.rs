// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The install root log and lock.

Every install root has a single `.log` file recording install and removal
events, one per line. The same file carries the advisory lock serializing
commits to the root.

Events are written through the descriptor holding the lock. Some platforms
enforce file locks against every other descriptor, so writing the log through
a second handle would fail while the lock is held.
*/

use {
    crate::error::{ClickError, Result},
    fs2::FileExt,
    log::{debug, warn},
    std::{
        fs::{File, OpenOptions},
        io::Write,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Filename of the install root log.
pub const LOG_FILENAME: &str = ".log";

/// An event recorded in the install log.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LogOperation {
    Install,
    Remove,
}

/// A line in the install log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::FixedOffset>,
    pub operation: LogOperation,
    pub package: String,
    pub version: String,
}

impl LogEntry {
    /// Parse a log line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();

        let timestamp = chrono::DateTime::parse_from_rfc3339(parts.next()?).ok()?;
        let operation = parts.next()?.parse().ok()?;
        let package = parts.next()?.to_string();
        let version = parts.next()?.to_string();

        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            timestamp,
            operation,
            package,
            version,
        })
    }
}

/// Append-only event log of an install root.
#[derive(Clone, Debug)]
pub struct InstallLog {
    path: PathBuf,
}

impl InstallLog {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(LOG_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event while holding the root lock.
    ///
    /// The line is written with a single `write` call on the lock's `O_APPEND`
    /// descriptor.
    pub fn append(
        &self,
        lock: &RootLock,
        operation: LogOperation,
        package: &str,
        version: &str,
    ) -> Result<()> {
        if lock.path != self.path {
            return Err(ClickError::filesystem(
                "writing install log",
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "lock is held on a different install root",
                ),
            ));
        }

        let line = format!(
            "{} {} {} {}\n",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            operation,
            package,
            version
        );

        (&lock.file)
            .write_all(line.as_bytes())
            .map_err(|e| ClickError::filesystem("writing install log", &self.path, e))?;

        Ok(())
    }

    /// Read all well-formed entries. Malformed lines are skipped.
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(ClickError::filesystem("reading install log", &self.path, e)),
        };

        Ok(data
            .lines()
            .filter_map(|line| {
                let entry = LogEntry::parse(line);
                if entry.is_none() {
                    warn!("ignoring malformed log line: {}", line);
                }
                entry
            })
            .collect())
    }
}

/// Exclusive advisory lock on an install root.
///
/// The lock is released when the instance is dropped.
#[derive(Debug)]
pub struct RootLock {
    file: File,
    path: PathBuf,
}

impl RootLock {
    /// Acquire the lock, retrying up to `retries` times `delay` apart.
    ///
    /// Fails with [ClickError::LockContention] when the retry budget is spent.
    pub fn acquire(root: impl AsRef<Path>, retries: u32, delay: Duration) -> Result<Self> {
        let path = root.as_ref().join(LOG_FILENAME);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ClickError::filesystem("opening install root lock", &path, e))?;

        let mut attempt = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("acquired lock on {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if attempt >= retries {
                        return Err(ClickError::LockContention(path));
                    }

                    attempt += 1;
                    debug!(
                        "{} is locked; retrying ({}/{})",
                        path.display(),
                        attempt,
                        retries
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    return Err(ClickError::filesystem("locking install root", &path, e));
                }
            }
        }
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("unable to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::error::ErrorKind};

    #[test]
    fn log_lines() -> Result<()> {
        let td = tempfile::tempdir()?;
        let log = InstallLog::new(td.path());

        assert!(log.entries()?.is_empty());

        let lock = RootLock::acquire(td.path(), 0, Duration::from_millis(1))?;
        log.append(&lock, LogOperation::Install, "test-package", "1.0")?;
        log.append(&lock, LogOperation::Remove, "test-package", "1.0")?;
        drop(lock);

        let data = std::fs::read_to_string(log.path())?;
        let lines = data.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" install test-package 1.0"));
        assert!(lines[1].ends_with(" remove test-package 1.0"));

        let entries = log.entries()?;
        assert_eq!(entries[0].operation, LogOperation::Install);
        assert_eq!(entries[1].operation, LogOperation::Remove);
        assert_eq!(entries[1].package, "test-package");

        Ok(())
    }

    #[test]
    fn append_requires_lock_on_same_root() -> Result<()> {
        let td = tempfile::tempdir()?;
        let other = tempfile::tempdir()?;

        let lock = RootLock::acquire(other.path(), 0, Duration::from_millis(1))?;
        let err = InstallLog::new(td.path())
            .append(&lock, LogOperation::Install, "test-package", "1.0")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilesystemError);
        assert!(!td.path().join(LOG_FILENAME).exists());

        Ok(())
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(LogEntry::parse("2013-05-01T10:00:00Z install foo 1.0").is_some());
        assert!(LogEntry::parse("yesterday install foo 1.0").is_none());
        assert!(LogEntry::parse("2013-05-01T10:00:00Z upgrade foo 1.0").is_none());
        assert!(LogEntry::parse("2013-05-01T10:00:00Z install foo").is_none());
        assert!(LogEntry::parse("2013-05-01T10:00:00Z install foo 1.0 extra").is_none());
    }

    #[test]
    fn lock_contention() -> Result<()> {
        let td = tempfile::tempdir()?;

        let held = RootLock::acquire(td.path(), 0, Duration::from_millis(1))?;

        let err = RootLock::acquire(td.path(), 2, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockContention);

        drop(held);
        RootLock::acquire(td.path(), 0, Duration::from_millis(1))?;

        Ok(())
    }

    #[test]
    fn lock_waits_for_release() -> Result<()> {
        let td = tempfile::tempdir()?;
        let root = td.path().to_path_buf();

        let held = RootLock::acquire(&root, 0, Duration::from_millis(1))?;
        let waiter = std::thread::spawn(move || {
            RootLock::acquire(&root, 200, Duration::from_millis(10)).map(|_| ())
        });

        std::thread::sleep(Duration::from_millis(50));
        drop(held);

        waiter.join().expect("thread should not panic")?;

        Ok(())
    }
}
