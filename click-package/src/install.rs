// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installing click packages into an install root.

An install proceeds in three phases:

1. Reading and auditing the package. Nothing is written.
2. Staging. Package data and metadata are materialized in a uniquely named
   hidden directory inside the install root.
3. Committing. Under the install root lock, the staged directory is published
   at `<root>/<package>` in a single atomic step and the status record and
   log are updated.

A failure before the commit leaves the install root as it was (apart from the
root directory itself and its log being created). Once the commit happened it
is never rolled back.

Signatures are not checked here. Callers must pass the archive through a
[crate::signature::SignatureGate] first.
*/

use {
    crate::{
        archive::{ArchiveReader, META_DIR},
        audit::Auditor,
        config::InstallerConfig,
        deb::reader::DebArchiveReader,
        error::{ClickError, Result},
        fs::{ensure_dir, publish_dir},
        journal::{InstallLog, LogOperation, RootLock},
        status::{
            upsert_file, InstallRecord, StatusStore, STATUS_FILENAME, STATUS_INSTALLED,
            STATUS_UNPACKED,
        },
    },
    log::{debug, info, warn},
    std::{
        path::Path,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
};

/// Filename of the control file copy inside the metadata directory.
pub const CONTROL_FILENAME: &str = "control";

/// A cloneable flag to request cancellation of in-flight installs.
///
/// Cancellation is honored until the commit begins.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Installs click packages.
#[derive(Clone, Debug)]
pub struct Installer {
    config: InstallerConfig,
    auditor: Auditor,
    cancellation: Option<CancellationToken>,
}

impl Installer {
    /// Construct an instance from a config.
    ///
    /// Fails if the config's version limits do not parse.
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let auditor = Auditor::new(config.audit_policy()?);

        Ok(Self {
            config,
            auditor,
            cancellation: None,
        })
    }

    /// Attach a [CancellationToken].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(ClickError::Aborted),
            _ => Ok(()),
        }
    }

    /// Install the `.click` file at `archive_path` into `root`.
    ///
    /// The archive must already have passed signature verification.
    pub fn install(
        &self,
        archive_path: impl AsRef<Path>,
        root: impl AsRef<Path>,
    ) -> Result<InstallRecord> {
        let mut archive = DebArchiveReader::open(archive_path.as_ref())?;

        self.install_archive(&mut archive, root.as_ref())
    }

    /// Install a package from an [ArchiveReader] into `root`.
    ///
    /// Returns the status record of the installed package.
    pub fn install_archive(
        &self,
        archive: &mut impl ArchiveReader,
        root: &Path,
    ) -> Result<InstallRecord> {
        let metadata = archive.read_control()?;
        let control = metadata.click_control();
        let package = self.auditor.audit(&control, &metadata.scripts)?;
        let version = control.version().unwrap_or("-");
        info!("installing {} {} into {}", package, version, root.display());

        self.check_cancelled()?;

        ensure_dir(root)?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.", package))
            .tempdir_in(root)
            .map_err(|e| ClickError::filesystem("creating staging directory", root, e))?;
        debug!("staging {} in {}", package, staging.path().display());

        archive.extract_data_to(staging.path())?;
        self.check_cancelled()?;

        let meta_dir = staging.path().join(META_DIR);
        ensure_dir(&meta_dir)?;
        let control_path = meta_dir.join(CONTROL_FILENAME);
        std::fs::write(&control_path, &metadata.control_data)
            .map_err(|e| ClickError::filesystem("writing control file", &control_path, e))?;

        let record = InstallRecord::from_control(package, &control, STATUS_INSTALLED);
        upsert_file(
            &meta_dir.join(STATUS_FILENAME),
            &record.with_status(STATUS_UNPACKED),
        )?;

        // tempdir() creates 0700 directories.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(|e| ClickError::filesystem("setting permissions", staging.path(), e))?;
        }

        self.check_cancelled()?;

        let lock = RootLock::acquire(
            root,
            self.config.lock_retries,
            self.config.lock_retry_delay(),
        )?;
        self.check_cancelled()?;

        let dest = root.join(package);
        publish_dir(staging.path(), &dest)?;
        info!("published {} {}", package, version);

        let bookkeeping = InstallLog::new(root)
            .append(&lock, LogOperation::Install, package, version)
            .and_then(|_| StatusStore::new(root).upsert(&record));
        drop(lock);

        // The staging path now holds the previous version, if there was one.
        if let Err(e) = staging.close() {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("unable to clean up previous version of {}: {}", package, e);
            }
        }

        if let Err(e) = bookkeeping {
            warn!(
                "{} {} is installed but its bookkeeping did not complete: {}",
                package, version, e
            );
            return Err(e);
        }

        Ok(record)
    }
}
