// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create `.click` package files. */

use {
    crate::{
        click_control::{MaintainerScripts, STATIC_PREINST},
        control::{ControlFile, ControlParagraph},
        deb::{DebCompression, DEB_FORMAT_VERSION},
        error::{ClickError, Result},
    },
    log::{debug, warn},
    md5::{Digest, Md5},
    os_str_bytes::OsStrBytes,
    simple_file_manifest::{FileEntry, FileManifest},
    std::{
        collections::BTreeMap,
        io::{Read, Write},
        path::Path,
        time::SystemTime,
    },
};

/// Directory names holding package metadata in a source tree.
///
/// The first one present wins.
pub const CONTROL_DIR_NAMES: &[&str] = &[".click", "DEBIAN"];

/// A builder for a `.click` package file.
///
/// The static `preinst` is always embedded in the control archive.
pub struct ClickBuilder<'control> {
    control: ControlParagraph<'control>,

    /// Maintainer scripts for `control.tar`, keyed by script name.
    control_scripts: BTreeMap<String, FileEntry>,

    /// `md5sums` lines, in insertion order.
    md5sums: Vec<Vec<u8>>,

    compression: DebCompression,

    /// Files to install as part of the package.
    install_files: FileManifest,

    mtime: Option<SystemTime>,
}

impl<'control> ClickBuilder<'control> {
    /// Construct a new instance from a control paragraph.
    pub fn new(control: ControlParagraph<'control>) -> Self {
        let mut control_scripts = BTreeMap::new();
        control_scripts.insert(
            "preinst".to_string(),
            FileEntry::new_from_data(STATIC_PREINST.as_bytes().to_vec(), true),
        );

        Self {
            control,
            control_scripts,
            md5sums: vec![],
            compression: DebCompression::Gzip,
            install_files: FileManifest::default(),
            mtime: None,
        }
    }

    /// The control paragraph of the package.
    pub fn control(&self) -> &ControlParagraph<'control> {
        &self.control
    }

    /// The maintainer scripts the package will carry.
    pub fn maintainer_scripts(&self) -> Result<MaintainerScripts> {
        let mut scripts = MaintainerScripts::default();
        for (name, entry) in &self.control_scripts {
            scripts.insert(name, entry.resolve_content()?);
        }

        Ok(scripts)
    }

    /// Set the compression format to use for the tar members.
    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the modified time to use on archive members.
    ///
    /// If not called, the current time is used.
    pub fn set_mtime(mut self, time: Option<SystemTime>) -> Self {
        self.mtime = time;
        self
    }

    fn mtime(&self) -> u64 {
        self.mtime
            .unwrap_or_else(SystemTime::now)
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Add a maintainer script to the control archive.
    ///
    /// Packages carrying scripts other than the static `preinst` will fail
    /// the install audit. This exists to build such packages, and to replace
    /// the static `preinst`.
    pub fn control_script(mut self, name: &str, entry: impl Into<FileEntry>) -> Result<Self> {
        if !MaintainerScripts::is_script_name(name) {
            return Err(ClickError::Archive(format!(
                "{} is not a maintainer script name",
                name
            )));
        }

        self.control_scripts.insert(name.to_string(), entry.into());

        Ok(self)
    }

    /// Register a file as to be installed by this package.
    ///
    /// Paths are relative to the package directory. e.g. `bin/myapp`.
    pub fn install_file(
        mut self,
        path: impl AsRef<Path>,
        entry: impl Into<FileEntry>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let entry = entry.into();

        let data = entry.resolve_content()?;
        self.md5sums
            .push(md5sums_line(path, &mut std::io::Cursor::new(&data))?);

        self.install_files.add_file_entry(path, entry)?;

        Ok(self)
    }

    /// Construct an instance from a source tree on the filesystem.
    ///
    /// The tree holds a control directory (see [CONTROL_DIR_NAMES]) with a
    /// `control` file and optional maintainer scripts. Everything else is
    /// package data. Symlinks are not followed.
    pub fn from_directory(source_dir: &Path) -> Result<ClickBuilder<'static>> {
        let control_dir_name = CONTROL_DIR_NAMES
            .iter()
            .find(|name| source_dir.join(name).join("control").is_file())
            .ok_or_else(|| {
                ClickError::Archive(format!(
                    "{} has no {} control file",
                    source_dir.display(),
                    CONTROL_DIR_NAMES.join(" or ")
                ))
            })?;
        let control_dir = source_dir.join(control_dir_name);

        let control_data = std::fs::read_to_string(control_dir.join("control"))
            .map_err(|e| ClickError::filesystem("reading control file", &control_dir, e))?;
        let control = ControlFile::parse_str(&control_data)?
            .into_paragraphs()
            .next()
            .ok_or_else(|| {
                ClickError::ControlParse("control file lacks a paragraph".to_string())
            })?;

        let mut builder = ClickBuilder::new(control);

        for entry in std::fs::read_dir(&control_dir)
            .map_err(|e| ClickError::filesystem("reading control directory", &control_dir, e))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if MaintainerScripts::is_script_name(&name) {
                debug!("adding maintainer script {}", name);
                builder = builder.control_script(&name, read_file_entry(&entry.path())?)?;
            } else if name != "control" {
                warn!("ignoring unknown control file {}", name);
            }
        }

        for entry in walkdir::WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ClickError::Archive(e.to_string()))?;
            let rel_path = entry
                .path()
                .strip_prefix(source_dir)
                .map_err(|e| ClickError::Archive(e.to_string()))?;

            if rel_path.starts_with(control_dir_name) {
                continue;
            }

            if entry.file_type().is_symlink() {
                warn!("skipping symlink {}", rel_path.display());
            } else if entry.file_type().is_file() {
                builder = builder.install_file(rel_path, read_file_entry(entry.path())?)?;
            }
        }

        Ok(builder)
    }

    /// Write `.click` file content to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut ar_builder = ar::Builder::new(writer);
        let mtime = self.mtime();

        let mut append = |name: String, data: &[u8]| -> Result<()> {
            let mut header = ar::Header::new(name.into_bytes(), data.len() as _);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_uid(0);
            header.set_gid(0);
            ar_builder.append(&header, data)?;

            Ok(())
        };

        append("debian-binary".to_string(), DEB_FORMAT_VERSION)?;

        let mut control_tar = vec![];
        self.write_control_tar(&mut control_tar)?;
        let control_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(control_tar))?;
        append(
            format!("control.tar{}", self.compression.extension()),
            &control_tar,
        )?;

        let mut data_tar = vec![];
        write_deb_tar(&mut data_tar, &self.install_files, mtime)?;
        let data_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(data_tar))?;
        append(format!("data.tar{}", self.compression.extension()), &data_tar)?;

        Ok(())
    }

    fn write_control_tar<W: Write>(&self, writer: W) -> Result<()> {
        let mut control_data = vec![];
        self.control.write(&mut control_data)?;

        let mut manifest = FileManifest::default();
        for (name, entry) in &self.control_scripts {
            manifest.add_file_entry(name, entry.clone())?;
        }
        manifest.add_file_entry("control", control_data)?;
        manifest.add_file_entry("md5sums", self.md5sums.concat())?;

        write_deb_tar(writer, &manifest, self.mtime())
    }
}

fn read_file_entry(path: &Path) -> Result<FileEntry> {
    let data = std::fs::read(path).map_err(|e| ClickError::filesystem("reading file", path, e))?;
    let metadata =
        std::fs::metadata(path).map_err(|e| ClickError::filesystem("reading file", path, e))?;

    #[cfg(unix)]
    let executable = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    };
    #[cfg(not(unix))]
    let executable = {
        let _ = metadata;
        false
    };

    Ok(FileEntry::new_from_data(data, executable))
}

/// Compute an `md5sums` line for a file.
fn md5sums_line(path: &Path, reader: &mut impl Read) -> Result<Vec<u8>> {
    let mut context = Md5::new();

    let mut buffer = [0; 32768];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }

        context.update(&buffer[0..read]);
    }

    let mut line = Vec::new();
    line.write_all(hex::encode(context.finalize()).as_bytes())?;
    line.write_all(b"  ")?;
    line.write_all(path.to_raw_bytes().as_ref())?;
    line.write_all(b"\n")?;

    Ok(line)
}

fn new_tar_header(mtime: u64) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);

    Ok(header)
}

/// Set the `./`-prefixed member name on a GNU header.
///
/// `header.set_path()` normalizes away the leading `./`, so the name field is
/// written directly. Names too long for the field get a `././@LongLink` entry.
fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &Path,
    is_directory: bool,
) -> Result<()> {
    let value = format!(
        "./{}{}",
        path.display(),
        if is_directory { "/" } else { "" }
    );
    let value_bytes = value.as_bytes();

    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        let mut long_header = tar::Header::new_gnu();
        let name = b"././@LongLink";
        long_header.as_old_mut().name[..name.len()].clone_from_slice(&name[..]);
        long_header.set_mode(0o644);
        long_header.set_uid(0);
        long_header.set_gid(0);
        long_header.set_mtime(0);
        long_header.set_size(value_bytes.len() as u64 + 1);
        long_header.set_entry_type(tar::EntryType::new(b'L'));
        long_header.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&long_header, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer[0..truncated_bytes.len()].copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Write a tar archive suitable for inclusion in a `.click` archive.
pub fn write_deb_tar<W: Write>(writer: W, files: &FileManifest, mtime: u64) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    let mut header = new_tar_header(mtime)?;
    header.set_path(Path::new("./"))?;
    header.set_mode(0o755);
    header.set_size(0);
    header.set_cksum();
    builder.append(&header, std::io::empty())?;

    for directory in files.relative_directories() {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, &directory, true)?;
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, std::io::empty())?;
    }

    // FileManifest is backed by a BTreeMap, so iteration is deterministic.
    for (rel_path, content) in files.iter_entries() {
        let data = content.resolve_content()?;

        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, rel_path, false)?;
        header.set_mode(if content.is_executable() {
            0o755
        } else {
            0o644
        });
        header.set_size(data.len() as _);
        header.set_cksum();
        builder.append(&header, &*data)?;
    }

    builder.finish()?;

    Ok(())
}
