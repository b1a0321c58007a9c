// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installed package records.

The status database of an install root is distributed: each package directory
carries its own stanza at `<package>/.meta/status`. Listing the database means
scanning the package directories of the root. This keeps the record of a
package inside the directory that is atomically published, so a package
directory and its record can never disagree about which version is present.
*/

use {
    crate::{
        archive::META_DIR,
        click_control::ClickControl,
        control::{ControlFile, ControlParagraph},
        error::{ClickError, Result},
        fs::ensure_dir,
    },
    log::debug,
    std::{
        borrow::Cow,
        io::Write,
        path::{Path, PathBuf},
    },
};

/// `Status` value of a completely installed package.
pub const STATUS_INSTALLED: &str = "install ok installed";

/// `Status` value of a package whose files are in place but whose
/// bookkeeping has not completed.
pub const STATUS_UNPACKED: &str = "install ok unpacked";

/// Filename of the status fragment inside the metadata directory.
pub const STATUS_FILENAME: &str = "status";

/// Control fields copied from a package's control metadata, in record order.
const CARRIED_FIELDS: &[&str] = &[
    "Version",
    "Architecture",
    "Maintainer",
    "Description",
    "Click-Version",
    "Click-Base-System",
];

/// A record of an installed package.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstallRecord {
    pub package: String,
    pub status: String,
    pub version: Option<String>,
    pub architecture: Option<String>,
    pub maintainer: Option<String>,
    pub description: Option<String>,
    pub click_version: Option<String>,
    pub click_base_system: Option<String>,
}

impl InstallRecord {
    /// Construct a record from audited control metadata.
    pub fn from_control(package: &str, control: &ClickControl, status: &str) -> Self {
        let carried = |name: &str| control.field_str(name).map(|s| s.to_string());

        Self {
            package: package.to_string(),
            status: status.to_string(),
            version: carried("Version"),
            architecture: carried("Architecture"),
            maintainer: carried("Maintainer"),
            description: carried("Description"),
            click_version: carried("Click-Version"),
            click_base_system: carried("Click-Base-System"),
        }
    }

    /// Obtain a copy of this record with a different status.
    pub fn with_status(&self, status: &str) -> Self {
        Self {
            status: status.to_string(),
            ..self.clone()
        }
    }

    /// Whether the install of this package completed.
    pub fn is_installed(&self) -> bool {
        self.status == STATUS_INSTALLED
    }

    fn carried(&self) -> [&Option<String>; 6] {
        [
            &self.version,
            &self.architecture,
            &self.maintainer,
            &self.description,
            &self.click_version,
            &self.click_base_system,
        ]
    }

    /// Convert to a control paragraph with fields in record order.
    ///
    /// Absent fields are omitted.
    pub fn to_paragraph(&self) -> ControlParagraph<'static> {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Package".into(), Cow::Owned(self.package.clone()));
        p.set_field_from_string("Status".into(), Cow::Owned(self.status.clone()));

        for (name, value) in CARRIED_FIELDS.iter().zip(self.carried()) {
            if let Some(value) = value {
                p.set_field_from_string(Cow::Borrowed(*name), Cow::Owned(value.clone()));
            }
        }

        p
    }

    /// Construct an instance from a status stanza.
    pub fn from_paragraph(p: &ControlParagraph) -> Result<Self> {
        let get = |name: &str| p.field_str(name).map(|s| s.to_string());
        let required = |name: &str| {
            get(name).ok_or_else(|| ClickError::CorruptStatus(format!("no {} field", name)))
        };

        Ok(Self {
            package: required("Package")?,
            status: required("Status")?,
            version: get("Version"),
            architecture: get("Architecture"),
            maintainer: get("Maintainer"),
            description: get("Description"),
            click_version: get("Click-Version"),
            click_base_system: get("Click-Base-System"),
        })
    }
}

/// Read all records from a status file.
///
/// An absent file holds zero records.
pub fn read_records(path: &Path) -> Result<Vec<InstallRecord>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(ClickError::filesystem("reading status file", path, e)),
    };

    ControlFile::parse_str(&data)
        .map_err(|e| match e {
            ClickError::ControlParse(msg) => ClickError::CorruptStatus(msg),
            e => e,
        })?
        .paragraphs()
        .map(InstallRecord::from_paragraph)
        .collect()
}

/// Write records to a status file, replacing it atomically.
fn write_records(path: &Path, records: &[InstallRecord]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| ClickError::Config(format!("{} has no parent", path.display())))?;
    ensure_dir(parent)?;

    let mut control = ControlFile::default();
    for record in records {
        control.add_paragraph(record.to_paragraph());
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ClickError::filesystem("creating status file", parent, e))?;
    control
        .write(temp.as_file_mut())
        .and_then(|_| temp.as_file_mut().flush())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| ClickError::filesystem("writing status file", path, e))?;
    temp.persist(path)
        .map_err(|e| ClickError::filesystem("replacing status file", path, e.error))?;

    Ok(())
}

/// Upsert a record into a status file.
///
/// A stanza for the same package is replaced in place. Otherwise the record is
/// appended.
pub fn upsert_file(path: &Path, record: &InstallRecord) -> Result<()> {
    let mut records = read_records(path)?;

    if let Some(existing) = records.iter_mut().find(|r| r.package == record.package) {
        *existing = record.clone();
    } else {
        records.push(record.clone());
    }

    write_records(path, &records)
}

/// The status database of an install root.
#[derive(Clone, Debug)]
pub struct StatusStore {
    root: PathBuf,
}

impl StatusStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the status fragment of a package.
    pub fn status_path(&self, package: &str) -> PathBuf {
        self.root.join(package).join(META_DIR).join(STATUS_FILENAME)
    }

    /// Record a package, replacing any existing record for it.
    pub fn upsert(&self, record: &InstallRecord) -> Result<()> {
        debug!("recording {} as {:?}", record.package, record.status);
        upsert_file(&self.status_path(&record.package), record)
    }

    /// Obtain the record of a package, if any.
    pub fn get(&self, package: &str) -> Result<Option<InstallRecord>> {
        Ok(read_records(&self.status_path(package))?
            .into_iter()
            .find(|r| r.package == package))
    }

    /// Remove the record of a package.
    ///
    /// Returns whether a record existed.
    pub fn remove(&self, package: &str) -> Result<bool> {
        let path = self.status_path(package);
        let mut records = read_records(&path)?;
        let before = records.len();
        records.retain(|r| r.package != package);

        if records.len() == before {
            return Ok(false);
        }

        if records.is_empty() {
            std::fs::remove_file(&path)
                .map_err(|e| ClickError::filesystem("removing status file", &path, e))?;
        } else {
            write_records(&path, &records)?;
        }

        Ok(true)
    }

    /// List all records in the install root, sorted by package name.
    ///
    /// An absent root has no records. Hidden entries (temporary directories
    /// and the log) are skipped.
    pub fn list_installed(&self) -> Result<Vec<InstallRecord>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(ClickError::filesystem("listing install root", &self.root, e)),
        };

        let mut records = vec![];
        for entry in entries {
            let entry =
                entry.map_err(|e| ClickError::filesystem("listing install root", &self.root, e))?;
            let name = entry.file_name().to_string_lossy().to_string();

            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }

            records.extend(
                read_records(&self.status_path(&name))?
                    .into_iter()
                    .filter(|r| r.package == name),
            );
        }

        records.sort_by(|a, b| a.package.cmp(&b.package));

        Ok(records)
    }
}
