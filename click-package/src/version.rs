// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Dotted-decimal version strings.

The `Click-Version` and `Click-Base-System` control fields carry versions of the
form `13.04` or `0.1`. Unlike Debian package versions, these are purely numeric:
each dot-separated component is an unsigned integer and comparison walks the
components left to right. Missing trailing components compare as `0`, so
`0.1` and `0.1.0` are equal.
*/

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("component {0:?} is not a decimal integer")]
    NonNumericComponent(String),

    #[error("error parsing component to integer: {0}")]
    ParseInt(#[from] ParseIntError),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A parsed dotted-decimal version.
///
/// The original string is retained so it can be reported verbatim.
#[derive(Clone, Debug)]
pub struct DottedVersion {
    original: String,
    components: Vec<u64>,
}

impl DottedVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let components = s
            .split('.')
            .map(|component| {
                // Reject empty components (`1..2`) and anything u64::from_str would
                // otherwise accept, such as a leading `+`.
                if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
                    Err(VersionError::NonNumericComponent(component.to_string()))
                } else {
                    Ok(u64::from_str(component)?)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            original: s.to_string(),
            components,
        })
    }

    /// The version string as it was parsed.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Numeric components of this version.
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl FromStr for DottedVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for DottedVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());

        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);

            match a.cmp(&b) {
                Ordering::Equal => {}
                res => return res,
            }
        }

        Ordering::Equal
    }
}
