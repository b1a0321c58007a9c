// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem primitives used by the installer. */

use {
    crate::error::{ClickError, Result},
    log::{debug, warn},
    simple_file_manifest::FileEntry,
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
};

/// Ensure a directory exists, creating it and its parents if needed.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| ClickError::filesystem("creating directory", path, e))
}

/// Write a [FileEntry] to a filesystem path, creating parent directories.
pub fn write_file_entry(dest_path: &Path, entry: &FileEntry) -> std::io::Result<()> {
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut fh = std::fs::File::create(dest_path)?;
    fh.write_all(&entry.resolve_content()?)?;

    #[cfg(unix)]
    if entry.is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fh.metadata()?.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        fh.set_permissions(permissions)?;
    }

    Ok(())
}

/// Publish a staged directory at its final location.
///
/// `staging` is moved to `dest`. If `dest` already exists it is replaced as a
/// unit: observers see either the previous tree or the new one. On success the
/// previous tree, if any, is left at `staging` for the caller to dispose of.
///
/// Callers must serialize publishes to the same `dest`.
///
/// Once the replacement has happened there is no way back: the previous tree is
/// only recoverable until the caller removes it.
pub fn publish_dir(staging: &Path, dest: &Path) -> Result<()> {
    if std::fs::symlink_metadata(dest).is_err() {
        debug!("renaming {} to {}", staging.display(), dest.display());
        return std::fs::rename(staging, dest)
            .map_err(|e| ClickError::filesystem("publishing package directory", dest, e));
    }

    #[cfg(target_os = "linux")]
    match exchange_paths(staging, dest) {
        Ok(()) => {
            debug!("exchanged {} with {}", staging.display(), dest.display());
            return Ok(());
        }
        // Filesystems without RENAME_EXCHANGE support report EINVAL; old kernels ENOSYS.
        Err(e) if matches!(e.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOSYS)) => {
            debug!("atomic exchange unavailable ({}); replacing via rename", e);
        }
        Err(e) => {
            return Err(ClickError::filesystem(
                "publishing package directory",
                dest,
                e,
            ))
        }
    }

    replace_via_rename(staging, dest)
}

/// Swap two paths atomically.
#[cfg(target_os = "linux")]
fn exchange_paths(a: &Path, b: &Path) -> std::io::Result<()> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let a = CString::new(a.as_os_str().as_bytes())?;
    let b = CString::new(b.as_os_str().as_bytes())?;

    // SAFETY: both pointers reference NUL-terminated strings that outlive the call.
    let res = unsafe {
        libc::syscall(
            libc::SYS_renameat2,
            libc::AT_FDCWD,
            a.as_ptr(),
            libc::AT_FDCWD,
            b.as_ptr(),
            libc::RENAME_EXCHANGE,
        )
    };

    if res == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Replace `dest` with `staging` using plain renames.
///
/// `dest` is first moved aside. There is a window where `dest` does not exist,
/// which is why callers must hold the install root lock.
fn replace_via_rename(staging: &Path, dest: &Path) -> Result<()> {
    let aside = aside_path(dest);

    if std::fs::symlink_metadata(&aside).is_ok() {
        std::fs::remove_dir_all(&aside)
            .map_err(|e| ClickError::filesystem("removing stale directory", &aside, e))?;
    }

    std::fs::rename(dest, &aside)
        .map_err(|e| ClickError::filesystem("moving previous package aside", dest, e))?;

    if let Err(e) = std::fs::rename(staging, dest) {
        if let Err(restore) = std::fs::rename(&aside, dest) {
            warn!(
                "unable to restore {} after failed publish: {}",
                dest.display(),
                restore
            );
        }

        return Err(ClickError::filesystem(
            "publishing package directory",
            dest,
            e,
        ));
    }

    // Hand the previous tree back to the caller at the staging location.
    if let Err(e) = std::fs::rename(&aside, staging) {
        warn!(
            "unable to move previous tree {} to {}: {}; removing it",
            aside.display(),
            staging.display(),
            e
        );
        if let Err(e) = std::fs::remove_dir_all(&aside) {
            warn!("unable to remove {}: {}", aside.display(), e);
        }
    }

    Ok(())
}

fn aside_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    dest.with_file_name(format!(".{}.old-{}", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tree(root: &Path, name: &str, files: &[(&str, &str)]) -> std::io::Result<PathBuf> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)?;
        for (path, content) in files {
            let path = dir.join(path);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(path, content)?;
        }

        Ok(dir)
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn publish_fresh() -> Result<()> {
        let td = tempfile::tempdir()?;
        let staging = make_tree(td.path(), ".pkg.tmp", &[("a", "new")])?;
        let dest = td.path().join("pkg");

        publish_dir(&staging, &dest)?;

        assert_eq!(std::fs::read_to_string(dest.join("a"))?, "new");
        assert!(!staging.exists());

        Ok(())
    }

    #[test]
    fn publish_replaces_existing() -> Result<()> {
        let td = tempfile::tempdir()?;
        make_tree(td.path(), "pkg", &[("old-only", "x"), ("shared", "old")])?;
        let staging = make_tree(td.path(), ".pkg.tmp", &[("new-only", "y"), ("shared", "new")])?;
        let dest = td.path().join("pkg");

        publish_dir(&staging, &dest)?;

        assert_eq!(listing(&dest), vec!["new-only", "shared"]);
        assert_eq!(std::fs::read_to_string(dest.join("shared"))?, "new");

        // The previous tree is handed back at the staging path.
        assert_eq!(listing(&staging), vec!["old-only", "shared"]);
        assert_eq!(listing(td.path()), vec![".pkg.tmp", "pkg"]);

        Ok(())
    }

    #[test]
    fn replace_via_rename_fallback() -> Result<()> {
        let td = tempfile::tempdir()?;
        make_tree(td.path(), "pkg", &[("old", "x")])?;
        let staging = make_tree(td.path(), ".pkg.tmp", &[("new", "y")])?;
        let dest = td.path().join("pkg");

        replace_via_rename(&staging, &dest)?;

        assert_eq!(listing(&dest), vec!["new"]);
        assert_eq!(listing(&staging), vec!["old"]);
        assert_eq!(listing(td.path()), vec![".pkg.tmp", "pkg"]);

        Ok(())
    }

    #[test]
    fn replace_via_rename_restores_on_failure() -> Result<()> {
        let td = tempfile::tempdir()?;
        make_tree(td.path(), "pkg", &[("old", "x")])?;
        let dest = td.path().join("pkg");

        // Staging does not exist, so the second rename fails.
        let err = replace_via_rename(&td.path().join(".missing"), &dest).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FilesystemError);
        assert_eq!(listing(&dest), vec!["old"]);
        assert_eq!(listing(td.path()), vec!["pkg"]);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn write_executable_entry() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let td = tempfile::tempdir()?;
        let path = td.path().join("bin/tool");
        write_file_entry(&path, &FileEntry::new_from_data(b"#!/bin/sh\n".to_vec(), true))?;

        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        Ok(())
    }
}
