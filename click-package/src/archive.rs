// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Abstract access to package archives.

The installer only needs two things from a package archive: its control
metadata and the ability to materialize its data members somewhere. The
[ArchiveReader] trait captures that. [crate::deb::reader::DebArchiveReader]
implements it for `.click` files on disk and [MemoryArchive] implements it
in memory.
*/

use {
    crate::{
        click_control::{ClickControl, MaintainerScripts},
        control::{ControlFile, ControlParagraph},
        error::{ClickError, Result},
        fs::write_file_entry,
    },
    simple_file_manifest::{FileEntry, FileManifest},
    std::path::Path,
};

/// Name of the reserved per-package metadata directory.
///
/// Archives may not ship data under this name.
pub const META_DIR: &str = ".meta";

/// Control metadata read from a package archive.
#[derive(Clone, Debug)]
pub struct ControlMetadata {
    /// Raw bytes of the `control` member.
    pub control_data: Vec<u8>,
    /// The parsed `control` member.
    pub paragraph: ControlParagraph<'static>,
    /// Maintainer scripts present in the control archive.
    pub scripts: MaintainerScripts,
}

impl ControlMetadata {
    /// Construct an instance by parsing raw `control` member content.
    pub fn from_control_data(control_data: Vec<u8>, scripts: MaintainerScripts) -> Result<Self> {
        let text = std::str::from_utf8(&control_data)
            .map_err(|e| ClickError::ControlParse(format!("control file is not UTF-8: {}", e)))?;

        let paragraph = ControlFile::parse_str(text)?
            .into_paragraphs()
            .next()
            .ok_or_else(|| ClickError::Archive("control file lacks a paragraph".to_string()))?;

        Ok(Self {
            control_data,
            paragraph,
            scripts,
        })
    }

    /// Obtain the [ClickControl] view of the control paragraph.
    pub fn click_control(&self) -> ClickControl<'static> {
        ClickControl::from(self.paragraph.clone())
    }
}

/// Read access to a package archive.
pub trait ArchiveReader {
    /// Read the control metadata and maintainer scripts.
    fn read_control(&mut self) -> Result<ControlMetadata>;

    /// Extract all data members into `dest_dir`, which already exists.
    ///
    /// On error, the content of `dest_dir` is unspecified. Callers are expected
    /// to extract into a disposable directory.
    fn extract_data_to(&mut self, dest_dir: &Path) -> Result<()>;
}

/// An in-memory [ArchiveReader].
///
/// Extraction can be made to fail after a number of files have been written,
/// simulating an interrupted or corrupt archive.
#[derive(Clone, Debug, Default)]
pub struct MemoryArchive {
    control_data: Vec<u8>,
    scripts: MaintainerScripts,
    files: FileManifest,
    fail_after: Option<usize>,
}

impl MemoryArchive {
    /// Construct an instance from a control paragraph.
    pub fn new(control: &ControlParagraph<'_>) -> Result<Self> {
        let mut control_data = vec![];
        control.write(&mut control_data)?;

        Ok(Self {
            control_data,
            ..Default::default()
        })
    }

    /// Add a maintainer script to the control archive.
    pub fn with_script(mut self, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.scripts.insert(name, content);
        self
    }

    /// Add a data file.
    pub fn with_file(mut self, path: impl AsRef<Path>, entry: impl Into<FileEntry>) -> Result<Self> {
        self.files.add_file_entry(path, entry)?;
        Ok(self)
    }

    /// Fail extraction after `count` files have been written.
    pub fn fail_extraction_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

impl ArchiveReader for MemoryArchive {
    fn read_control(&mut self) -> Result<ControlMetadata> {
        ControlMetadata::from_control_data(self.control_data.clone(), self.scripts.clone())
    }

    fn extract_data_to(&mut self, dest_dir: &Path) -> Result<()> {
        for (i, (path, entry)) in self.files.iter_entries().enumerate() {
            if self.fail_after == Some(i) {
                return Err(ClickError::Archive("simulated extraction failure".to_string()));
            }

            if path.starts_with(META_DIR) {
                return Err(ClickError::Archive(format!(
                    "data member uses reserved path: {}",
                    path.display()
                )));
            }

            let dest_path = dest_dir.join(path);
            write_file_entry(&dest_path, entry)
                .map_err(|e| ClickError::filesystem("extracting package data", &dest_path, e))?;
        }

        Ok(())
    }
}
