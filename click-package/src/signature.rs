// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package signature verification.

Verification happens before [crate::install::Installer] is invoked. The
installer itself assumes its input has passed a [SignatureGate].
*/

use {
    log::{debug, warn},
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
    },
    thiserror::Error,
};

/// Exit status of `debsig-verify` when a package carries no signatures.
pub const DEBSIG_NO_SIGNATURES: i32 = 10;

/// Errors from signature verification.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("debsig: Origin Signature check failed. This deb might not be signed.")]
    NotSigned,

    #[error("Signature verification failed: {0}")]
    Invalid(String),

    #[error("Signature verification failed: unable to run {tool}: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Establishes the authenticity of a package archive.
pub trait SignatureGate {
    /// Verify the archive at `path`.
    fn verify(&self, path: &Path) -> Result<(), SignatureError>;
}

/// Verifies signatures with the external `debsig-verify` tool.
#[derive(Clone, Debug)]
pub struct DebsigVerify {
    program: PathBuf,
}

impl Default for DebsigVerify {
    fn default() -> Self {
        Self {
            program: PathBuf::from("debsig-verify"),
        }
    }
}

impl DebsigVerify {
    /// Use a different verification program.
    pub fn with_program(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl SignatureGate for DebsigVerify {
    fn verify(&self, path: &Path) -> Result<(), SignatureError> {
        let args: Vec<OsString> = vec![path.as_os_str().to_os_string()];
        debug!("running {} {}", self.program.display(), path.display());

        let output = duct::cmd(&self.program, args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()
            .map_err(|source| SignatureError::ToolUnavailable {
                tool: self.program.display().to_string(),
                source,
            })?;

        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            debug!("{}: {}", self.program.display(), line);
        }

        match output.status.code() {
            Some(0) => Ok(()),
            Some(DEBSIG_NO_SIGNATURES) => Err(SignatureError::NotSigned),
            _ => {
                let detail = text
                    .lines()
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ");

                Err(SignatureError::Invalid(if detail.is_empty() {
                    format!("{} exited with {}", self.program.display(), output.status)
                } else {
                    detail
                }))
            }
        }
    }
}

/// A gate that accepts every package.
///
/// Only ever used when explicitly requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowUnauthenticated;

impl SignatureGate for AllowUnauthenticated {
    fn verify(&self, path: &Path) -> Result<(), SignatureError> {
        warn!(
            "skipping signature verification of {} (--allow-unauthenticated)",
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_verifier(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;

        Ok(path)
    }

    #[cfg(unix)]
    #[test]
    fn debsig_outcomes() -> std::io::Result<()> {
        let td = tempfile::tempdir()?;
        let package = td.path().join("foo.click");

        let gate = DebsigVerify::with_program(fake_verifier(td.path(), "valid", "exit 0")?);
        assert!(gate.verify(&package).is_ok());

        let gate = DebsigVerify::with_program(fake_verifier(td.path(), "unsigned", "exit 10")?);
        assert_eq!(
            gate.verify(&package).unwrap_err().to_string(),
            "debsig: Origin Signature check failed. This deb might not be signed."
        );

        let gate = DebsigVerify::with_program(fake_verifier(
            td.path(),
            "invalid",
            "echo 'debsig: Signature verification of foo failed' >&2\nexit 13",
        )?);
        let message = gate.verify(&package).unwrap_err().to_string();
        assert_eq!(
            message,
            "Signature verification failed: debsig: Signature verification of foo failed"
        );

        Ok(())
    }

    #[test]
    fn missing_tool() {
        let gate = DebsigVerify::with_program("/nonexistent/debsig-verify");
        let err = gate.verify(Path::new("foo.click")).unwrap_err();
        assert!(matches!(err, SignatureError::ToolUnavailable { .. }));
        assert!(err.to_string().starts_with("Signature verification failed: "));
    }

    #[test]
    fn allow_unauthenticated() {
        assert!(AllowUnauthenticated.verify(Path::new("foo.click")).is_ok());
    }
}
