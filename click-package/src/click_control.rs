// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Click package control metadata. */

use {
    crate::control::ControlParagraph,
    std::{collections::BTreeMap, ops::Deref},
};

/// Body of the only maintainer script a click package may carry.
///
/// Packages embed this as their `preinst` so that an accidental `dpkg -i`
/// refuses to install them. It performs no package-defined logic.
pub const STATIC_PREINST: &str = "#! /bin/sh
echo \"Click packages may not be installed directly using dpkg.\"
echo \"Use 'click install' instead.\"
exit 1
";

/// Names of control archive members that are maintainer scripts.
pub const MAINTAINER_SCRIPT_NAMES: &[&str] = &["config", "postinst", "postrm", "preinst", "prerm"];

/// Control metadata of a click package.
///
/// This is a read-only view over a [ControlParagraph] with accessors for the
/// fields click assigns meaning to. Instances are immutable once constructed:
/// [Deref] exposes the paragraph but there is no mutable access.
///
/// Accessors return [Option] since the presence of fields is enforced by
/// [crate::audit::Auditor], not at construction time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClickControl<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> Deref for ClickControl<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> From<ControlParagraph<'a>> for ClickControl<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> From<ClickControl<'a>> for ControlParagraph<'a> {
    fn from(cf: ClickControl<'a>) -> Self {
        cf.paragraph
    }
}

impl<'a> ClickControl<'a> {
    /// The `Package` field.
    pub fn package(&self) -> Option<&str> {
        self.field_str("Package")
    }

    /// The `Version` field.
    pub fn version(&self) -> Option<&str> {
        self.field_str("Version")
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> Option<&str> {
        self.field_str("Architecture")
    }

    /// The `Maintainer` field.
    pub fn maintainer(&self) -> Option<&str> {
        self.field_str("Maintainer")
    }

    /// The `Description` field.
    pub fn description(&self) -> Option<&str> {
        self.field_str("Description")
    }

    /// The `Click-Version` field: the package format version.
    pub fn click_version(&self) -> Option<&str> {
        self.field_str("Click-Version")
    }

    /// The `Click-Base-System` field: the minimum base system version.
    pub fn click_base_system(&self) -> Option<&str> {
        self.field_str("Click-Base-System")
    }

    /// Whether the package declares dependencies.
    pub fn has_depends(&self) -> bool {
        self.has_field("Depends")
    }
}

/// Maintainer scripts found in a package's control archive.
///
/// Keyed by script name; iteration is in lexicographic name order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MaintainerScripts {
    scripts: BTreeMap<String, Vec<u8>>,
}

impl MaintainerScripts {
    /// Whether a control archive member name denotes a maintainer script.
    pub fn is_script_name(name: &str) -> bool {
        MAINTAINER_SCRIPT_NAMES.contains(&name)
    }

    /// Record a script.
    pub fn insert(&mut self, name: impl ToString, content: impl Into<Vec<u8>>) {
        self.scripts.insert(name.to_string(), content.into());
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.scripts.get(name).map(|v| v.as_slice())
    }

    /// Iterate over script names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(|k| k.as_str())
    }

    /// Whether the set is exactly the allow-listed static `preinst`.
    pub fn is_static_preinst_only(&self) -> bool {
        self.scripts.len() == 1 && self.get("preinst") == Some(STATIC_PREINST.as_bytes())
    }

    /// Names of the scripts that make this set unacceptable, sorted.
    ///
    /// Empty if there are no scripts or only the static `preinst`. Otherwise
    /// every script is named, including a static `preinst`.
    pub fn forbidden_names(&self) -> Vec<String> {
        if self.is_static_preinst_only() {
            vec![]
        } else {
            self.scripts.keys().cloned().collect()
        }
    }
}

impl<K: ToString, V: Into<Vec<u8>>> FromIterator<(K, V)> for MaintainerScripts {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut scripts = Self::default();
        for (name, content) in iter {
            scripts.insert(name, content);
        }

        scripts
    }
}
