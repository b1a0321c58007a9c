// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading `.click` files. */

use {
    crate::{
        archive::{ArchiveReader, ControlMetadata, META_DIR},
        click_control::MaintainerScripts,
        deb::{split_tar_member_name, DebCompression, DEB_FORMAT_VERSION},
        error::{ClickError, Result},
    },
    log::debug,
    std::{
        io::Read,
        path::{Component, Path, PathBuf},
    },
};

/// Reads a `.click` (`.deb` format) file from the filesystem.
///
/// Each operation re-reads the `ar` container from the start, so operations
/// can be called in any order.
#[derive(Clone, Debug)]
pub struct DebArchiveReader {
    path: PathBuf,
}

impl DebArchiveReader {
    /// Open a package file.
    ///
    /// This validates the `debian-binary` member so obviously non-package
    /// files are rejected before anything else happens.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let reader = Self {
            path: path.as_ref().to_path_buf(),
        };

        let mut archive = reader.ar_archive()?;
        let mut entry = archive
            .next_entry()
            .ok_or_else(|| ClickError::Archive("package archive is empty".to_string()))?
            .map_err(archive_error)?;

        if entry.header().identifier() != b"debian-binary" {
            return Err(ClickError::Archive(
                "first archive member is not debian-binary".to_string(),
            ));
        }

        let mut version = vec![];
        entry.read_to_end(&mut version).map_err(archive_error)?;
        if !version.starts_with(b"2.") {
            return Err(ClickError::Archive(format!(
                "unsupported package format version: {:?}",
                String::from_utf8_lossy(&version).trim()
            )));
        }
        if version != DEB_FORMAT_VERSION {
            debug!(
                "{} declares format {:?}",
                reader.path.display(),
                String::from_utf8_lossy(&version).trim()
            );
        }

        Ok(reader)
    }

    /// Path of the package file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ar_archive(&self) -> Result<ar::Archive<std::fs::File>> {
        let fh = std::fs::File::open(&self.path).map_err(|e| {
            ClickError::Archive(format!("unable to open {}: {}", self.path.display(), e))
        })?;

        Ok(ar::Archive::new(fh))
    }

    /// Locate a tar member by stem (`control` or `data`) and hand a decompressed
    /// [tar::Archive] over it to a callback.
    fn with_tar_member<T>(
        &self,
        stem: &str,
        f: impl FnOnce(&mut tar::Archive<Box<dyn Read + '_>>) -> Result<T>,
    ) -> Result<T> {
        let mut archive = self.ar_archive()?;

        while let Some(entry) = archive.next_entry() {
            let entry = entry.map_err(archive_error)?;

            let name = std::str::from_utf8(entry.header().identifier())
                .map_err(|_| ClickError::Archive("non UTF-8 archive member name".to_string()))?
                .to_string();

            if let Some((member_stem, extension)) = split_tar_member_name(&name) {
                if member_stem == stem {
                    let compression = DebCompression::from_extension(extension)?;
                    let mut tar = tar::Archive::new(compression.decompress(entry)?);
                    return f(&mut tar);
                }
            }
        }

        Err(ClickError::Archive(format!(
            "package has no {}.tar member",
            stem
        )))
    }
}

impl ArchiveReader for DebArchiveReader {
    fn read_control(&mut self) -> Result<ControlMetadata> {
        let (control_data, scripts) = self.with_tar_member("control", |tar| {
            let mut control_data = None;
            let mut scripts = MaintainerScripts::default();

            for entry in tar.entries().map_err(archive_error)? {
                let mut entry = entry.map_err(archive_error)?;

                let path = entry.path().map_err(archive_error)?;
                let name = match normalize_member_path(&path)? {
                    Some(p) => p.display().to_string(),
                    None => continue,
                };

                // A script is a script whatever its entry type. Links and
                // other special members are recorded without content so
                // they can never match the static preinst.
                if !entry.header().entry_type().is_file() {
                    if MaintainerScripts::is_script_name(&name) {
                        scripts.insert(name, vec![]);
                    } else {
                        debug!("ignoring non-file control member {}", name);
                    }
                    continue;
                }

                let mut data = vec![];
                entry.read_to_end(&mut data).map_err(archive_error)?;

                if name == "control" {
                    control_data = Some(data);
                } else if MaintainerScripts::is_script_name(&name) {
                    scripts.insert(name, data);
                } else {
                    debug!("ignoring control member {}", name);
                }
            }

            Ok((control_data, scripts))
        })?;

        let control_data = control_data
            .ok_or_else(|| ClickError::Archive("control archive has no control file".to_string()))?;

        ControlMetadata::from_control_data(control_data, scripts)
    }

    fn extract_data_to(&mut self, dest_dir: &Path) -> Result<()> {
        self.with_tar_member("data", |tar| {
            for entry in tar.entries().map_err(archive_error)? {
                let mut entry = entry.map_err(archive_error)?;
                let path = entry.path().map_err(archive_error)?.to_path_buf();

                let rel_path = match normalize_member_path(&path)? {
                    Some(p) => p,
                    // The archive root.
                    None => continue,
                };

                if rel_path.starts_with(META_DIR) {
                    return Err(ClickError::Archive(format!(
                        "data member uses reserved path: {}",
                        rel_path.display()
                    )));
                }

                match entry.header().entry_type() {
                    tar::EntryType::Regular
                    | tar::EntryType::Continuous
                    | tar::EntryType::Directory
                    | tar::EntryType::Symlink
                    | tar::EntryType::Link => {}
                    other => {
                        return Err(ClickError::Archive(format!(
                            "unsupported data member type {:?}: {}",
                            other,
                            rel_path.display()
                        )));
                    }
                }

                let unpacked = entry
                    .unpack_in(dest_dir)
                    .map_err(|e| ClickError::filesystem("extracting package data", dest_dir, e))?;

                if !unpacked {
                    return Err(ClickError::Archive(format!(
                        "data member escapes package directory: {}",
                        rel_path.display()
                    )));
                }
            }

            Ok(())
        })
    }
}

/// Normalize a tar member path to a relative path.
///
/// Leading `./` is stripped. Returns `None` for the archive root. Absolute
/// paths and `..` components are rejected.
fn normalize_member_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ClickError::Archive(format!(
                    "illegal path in package archive: {}",
                    path.display()
                )));
            }
        }
    }

    Ok(if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    })
}

fn archive_error(e: std::io::Error) -> ClickError {
    ClickError::Archive(e.to_string())
}
