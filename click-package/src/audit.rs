// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Static validation of click package metadata.

Auditing happens before anything touches the filesystem. A package that
passes the audit can be installed without running any code it ships.
*/

use {
    crate::{
        click_control::{ClickControl, MaintainerScripts},
        error::{ClickError, Result},
        version::DottedVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
};

/// Newest package format version this implementation understands.
pub const CURRENT_FORMAT_VERSION: &str = "0.1";

/// Newest base system packages may target.
pub const CURRENT_BASE_SYSTEM_VERSION: &str = "13.04";

static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9+.-]*$").expect("static regex is valid"));

/// Version ceilings enforced by an [Auditor].
#[derive(Clone, Debug)]
pub struct AuditPolicy {
    max_format_version: DottedVersion,
    max_base_system: DottedVersion,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            max_format_version: DottedVersion::parse(CURRENT_FORMAT_VERSION)
                .expect("format version constant is valid"),
            max_base_system: DottedVersion::parse(CURRENT_BASE_SYSTEM_VERSION)
                .expect("base system constant is valid"),
        }
    }
}

impl AuditPolicy {
    /// Construct an instance from explicit version ceilings.
    pub fn new(max_format_version: DottedVersion, max_base_system: DottedVersion) -> Self {
        Self {
            max_format_version,
            max_base_system,
        }
    }

    /// Maximum accepted `Click-Version`.
    pub fn max_format_version(&self) -> &DottedVersion {
        &self.max_format_version
    }

    /// Maximum accepted `Click-Base-System`.
    pub fn max_base_system(&self) -> &DottedVersion {
        &self.max_base_system
    }
}

/// Validates package control metadata.
#[derive(Clone, Debug, Default)]
pub struct Auditor {
    policy: AuditPolicy,
}

impl Auditor {
    pub fn new(policy: AuditPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AuditPolicy {
        &self.policy
    }

    /// Audit control metadata and maintainer scripts.
    ///
    /// Returns the package name on success. Checks run in a fixed order and the
    /// first failure is returned: structural problems (missing or malformed
    /// fields) are reported before forbidden content.
    pub fn audit<'c>(
        &self,
        control: &'c ClickControl<'_>,
        scripts: &MaintainerScripts,
    ) -> Result<&'c str> {
        let package = audit_package_name(control)?;

        check_version(
            "Click-Version",
            control.click_version(),
            &self.policy.max_format_version,
        )?;
        check_version(
            "Click-Base-System",
            control.click_base_system(),
            &self.policy.max_base_system,
        )?;

        if control.has_depends() {
            return Err(ClickError::ForbiddenField("Depends"));
        }

        let forbidden = scripts.forbidden_names();
        if !forbidden.is_empty() {
            return Err(ClickError::ForbiddenMaintainerScripts(forbidden));
        }

        Ok(package)
    }
}

fn audit_package_name<'c>(control: &'c ClickControl<'_>) -> Result<&'c str> {
    let package = match control.package() {
        Some(package) if !package.is_empty() => package,
        _ => return Err(ClickError::MissingField("Package")),
    };

    if PACKAGE_NAME_RE.is_match(package) {
        return Ok(package);
    }

    // `/` is reported ahead of anything else since it is the path traversal vector.
    let character = if package.contains('/') {
        '/'
    } else {
        package
            .char_indices()
            .find(|(i, c)| {
                !(c.is_ascii_alphanumeric() || (*i > 0 && matches!(c, '+' | '.' | '-')))
            })
            .map(|(_, c)| c)
            .unwrap_or('?')
    };

    Err(ClickError::InvalidCharacter {
        character,
        package: package.to_string(),
    })
}

fn check_version(field: &'static str, value: Option<&str>, maximum: &DottedVersion) -> Result<()> {
    let value = value.ok_or(ClickError::MissingField(field))?;

    let version = DottedVersion::parse(value).map_err(|source| ClickError::MalformedVersion {
        field,
        value: value.to_string(),
        source,
    })?;

    if &version > maximum {
        Err(ClickError::UnsupportedVersion {
            field,
            value: value.to_string(),
            maximum: maximum.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{click_control::STATIC_PREINST, control::ControlParagraph, error::ErrorKind},
    };

    fn control(fields: &[(&str, &str)]) -> ClickControl<'static> {
        let mut p = ControlParagraph::default();
        for (k, v) in fields {
            p.set_field_from_string(k.to_string().into(), v.to_string().into());
        }

        p.into()
    }

    fn valid_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Package", "test-package"),
            ("Click-Version", "0.1"),
            ("Click-Base-System", "13.04"),
        ]
    }

    fn audit(fields: &[(&str, &str)]) -> Result<String> {
        Auditor::default()
            .audit(&control(fields), &MaintainerScripts::default())
            .map(|s| s.to_string())
    }

    #[test]
    fn no_package() {
        let err = audit(&[]).unwrap_err();
        assert!(matches!(err, ClickError::MissingField("Package")));
        assert_eq!(err.to_string(), "No Package field");

        // Missing Package wins even when other fields are also broken.
        let err = audit(&[("Click-Version", "|"), ("Depends", "libc6")]).unwrap_err();
        assert!(matches!(err, ClickError::MissingField("Package")));

        assert!(matches!(
            audit(&[("Package", "")]).unwrap_err(),
            ClickError::MissingField("Package")
        ));
    }

    #[test]
    fn package_bad_character() {
        let err = audit(&[("Package", "../evil")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid character '/' in Package: ../evil");

        for name in ["foo/bar", "/abs", "a/"] {
            match audit(&[("Package", name)]).unwrap_err() {
                ClickError::InvalidCharacter { character, .. } => assert_eq!(character, '/'),
                e => panic!("unexpected error: {:?}", e),
            }
        }

        for (name, expected) in [("foo_bar", '_'), ("-foo", '-'), (".hidden", '.'), ("a b", ' ')]
        {
            match audit(&[("Package", name)]).unwrap_err() {
                ClickError::InvalidCharacter { character, .. } => {
                    assert_eq!(character, expected, "{}", name)
                }
                e => panic!("unexpected error: {:?}", e),
            }
        }
    }

    #[test]
    fn no_click_version() {
        let err = audit(&[("Package", "test-package")]).unwrap_err();
        assert!(matches!(err, ClickError::MissingField("Click-Version")));
        assert_eq!(err.to_string(), "No Click-Version field");
    }

    #[test]
    fn bad_click_version() {
        for value in ["|", "`", "abc", "0.1~beta", "1..0"] {
            let err = audit(&[("Package", "test-package"), ("Click-Version", value)]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedVersion, "{}", value);
        }
    }

    #[test]
    fn new_click_version() {
        let err = audit(&[("Package", "test-package"), ("Click-Version", "999")]).unwrap_err();
        assert!(matches!(
            err,
            ClickError::UnsupportedVersion {
                field: "Click-Version",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Click-Version: 999 newer than maximum supported version 0.1"
        );
    }

    #[test]
    fn no_click_base_system() {
        let err = audit(&[("Package", "test-package"), ("Click-Version", "0.1")]).unwrap_err();
        assert!(matches!(err, ClickError::MissingField("Click-Base-System")));
    }

    #[test]
    fn bad_click_base_system() {
        let err = audit(&[
            ("Package", "test-package"),
            ("Click-Version", "0.1"),
            ("Click-Base-System", "`"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ClickError::MalformedVersion {
                field: "Click-Base-System",
                ..
            }
        ));
    }

    #[test]
    fn new_click_base_system() {
        let err = audit(&[
            ("Package", "test-package"),
            ("Click-Version", "0.1"),
            ("Click-Base-System", "999"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ClickError::UnsupportedVersion {
                field: "Click-Base-System",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Click-Base-System: 999 newer than current version 13.04"
        );
    }

    #[test]
    fn accepts_versions_at_or_below_maximum() -> Result<()> {
        for click_version in ["0", "0.0.9", "0.1", "0.1.0"] {
            for base in ["1", "12.10", "13.04", "13.4.0"] {
                let name = audit(&[
                    ("Package", "test-package"),
                    ("Click-Version", click_version),
                    ("Click-Base-System", base),
                ])?;
                assert_eq!(name, "test-package");
            }
        }

        Ok(())
    }

    #[test]
    fn policy_boundaries_are_configurable() -> Result<()> {
        let policy = AuditPolicy::new(
            DottedVersion::parse("0.4").unwrap(),
            DottedVersion::parse("14.04").unwrap(),
        );
        let auditor = Auditor::new(policy);
        let scripts = MaintainerScripts::default();

        let c = control(&[
            ("Package", "test-package"),
            ("Click-Version", "0.4"),
            ("Click-Base-System", "14.04"),
        ]);
        assert_eq!(auditor.audit(&c, &scripts)?, "test-package");

        let c = control(&[
            ("Package", "test-package"),
            ("Click-Version", "0.4.1"),
            ("Click-Base-System", "14.04"),
        ]);
        assert_eq!(
            auditor.audit(&c, &scripts).unwrap_err().kind(),
            ErrorKind::UnsupportedVersion
        );

        Ok(())
    }

    #[test]
    fn forbids_depends() {
        let mut fields = valid_fields();
        fields.push(("Depends", "libc6"));
        let err = audit(&fields).unwrap_err();
        assert_eq!(err.to_string(), "Depends field is forbidden in Click packages");

        // Case of the field name does not matter.
        let mut fields = valid_fields();
        fields.push(("depends", ""));
        assert!(matches!(
            audit(&fields).unwrap_err(),
            ClickError::ForbiddenField("Depends")
        ));
    }

    #[test]
    fn forbids_maintscript() {
        let scripts = MaintainerScripts::from_iter([
            ("preinst", "#! /bin/sh\n"),
            ("postinst", "#! /bin/sh\n"),
        ]);
        let err = Auditor::default()
            .audit(&control(&valid_fields()), &scripts)
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Maintainer scripts are forbidden in Click packages (found: postinst preinst)"
        );
    }

    #[test]
    fn forbids_static_preinst_alongside_other_scripts() {
        let scripts =
            MaintainerScripts::from_iter([("preinst", STATIC_PREINST), ("prerm", "exit 0\n")]);
        match Auditor::default()
            .audit(&control(&valid_fields()), &scripts)
            .unwrap_err()
        {
            ClickError::ForbiddenMaintainerScripts(names) => {
                assert_eq!(names, vec!["preinst", "prerm"])
            }
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[test]
    fn passes_correct_package() -> Result<()> {
        let scripts = MaintainerScripts::from_iter([("preinst", STATIC_PREINST)]);
        let c = control(&valid_fields());
        assert_eq!(Auditor::default().audit(&c, &scripts)?, "test-package");

        assert_eq!(
            Auditor::default().audit(&c, &MaintainerScripts::default())?,
            "test-package"
        );

        Ok(())
    }

    #[test]
    fn structural_errors_precede_forbidden_content() {
        let scripts = MaintainerScripts::from_iter([("postinst", "evil")]);
        let c = control(&[
            ("Package", "test-package"),
            ("Click-Version", "|"),
            ("Depends", "libc6"),
        ]);
        assert_eq!(
            Auditor::default().audit(&c, &scripts).unwrap_err().kind(),
            ErrorKind::MalformedVersion
        );
    }
}
