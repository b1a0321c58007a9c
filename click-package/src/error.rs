// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{signature::SignatureError, version::VersionError},
    simple_file_manifest::FileManifestError,
    std::path::{Path, PathBuf},
    thiserror::Error,
};

/// Coarse classification of a [ClickError].
///
/// Callers dispatching on the failure category (exit codes, retry decisions)
/// should use this instead of matching on error payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::AsRefStr)]
pub enum ErrorKind {
    MissingField,
    InvalidCharacter,
    MalformedVersion,
    UnsupportedVersion,
    ForbiddenField,
    ForbiddenMaintainerScripts,
    ArchiveError,
    FilesystemError,
    LockContention,
    Aborted,
    SignatureFailure,
    ConfigError,
}

impl ErrorKind {
    /// Whether this kind indicates the package itself is unacceptable.
    ///
    /// Audit rejections are terminal and must never be retried.
    pub fn is_audit_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingField
                | Self::InvalidCharacter
                | Self::MalformedVersion
                | Self::UnsupportedVersion
                | Self::ForbiddenField
                | Self::ForbiddenMaintainerScripts
        )
    }
}

/// Primary crate error type.
///
/// Display implementations are single line and never include paths of
/// temporary install state.
#[derive(Debug, Error)]
pub enum ClickError {
    #[error("No {0} field")]
    MissingField(&'static str),

    #[error("Invalid character '{character}' in Package: {package}")]
    InvalidCharacter { character: char, package: String },

    #[error("{field}: invalid version {value:?}: {source}")]
    MalformedVersion {
        field: &'static str,
        value: String,
        #[source]
        source: VersionError,
    },

    #[error("{field}: {value} newer than {} {maximum}", version_limit_name(.field))]
    UnsupportedVersion {
        field: &'static str,
        value: String,
        maximum: String,
    },

    #[error("{0} field is forbidden in Click packages")]
    ForbiddenField(&'static str),

    #[error("Maintainer scripts are forbidden in Click packages (found: {})", .0.join(" "))]
    ForbiddenMaintainerScripts(Vec<String>),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("corrupt status record: {0}")]
    CorruptStatus(String),

    #[error("filesystem error while {action}: {source}")]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file manifest error: {0}")]
    FileManifest(#[from] FileManifestError),

    #[error("install root is locked by another operation")]
    LockContention(PathBuf),

    #[error("operation aborted")]
    Aborted,

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClickError {
    /// Construct a [ClickError::Filesystem] from an I/O error.
    pub fn filesystem(action: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Obtain the [ErrorKind] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::InvalidCharacter { .. } => ErrorKind::InvalidCharacter,
            Self::MalformedVersion { .. } => ErrorKind::MalformedVersion,
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::ForbiddenField(_) => ErrorKind::ForbiddenField,
            Self::ForbiddenMaintainerScripts(_) => ErrorKind::ForbiddenMaintainerScripts,
            Self::Archive(_) | Self::ControlParse(_) => ErrorKind::ArchiveError,
            Self::Filesystem { .. }
            | Self::Io(_)
            | Self::FileManifest(_)
            | Self::CorruptStatus(_) => ErrorKind::FilesystemError,
            Self::LockContention(_) => ErrorKind::LockContention,
            Self::Aborted => ErrorKind::Aborted,
            Self::Signature(_) => ErrorKind::SignatureFailure,
            Self::Config(_) => ErrorKind::ConfigError,
        }
    }
}

/// How the upper bound on a versioned control field is described.
fn version_limit_name(field: &str) -> &'static str {
    if field == "Click-Base-System" {
        "current version"
    } else {
        "maximum supported version"
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, ClickError>;
