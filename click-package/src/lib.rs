// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Click package auditing and installation.

Click packages are self-contained application archives. They use the `.deb`
file format but, unlike Debian packages, are installed without running any
code shipped in the package: no maintainer scripts, no dependency resolution.
Each package is installed into its own directory below an *install root*.

# Goals

## No Partial Installs

An install either fully happens or leaves no trace. Package content is staged
in a private directory inside the install root and published with a single
atomic rename. Reinstalling a package replaces the previous version as a unit:
observers see the old files or the new files, never a mix.

## Packages Cannot Run Code at Install Time

Control metadata is audited before anything touches the filesystem. Packages
declaring dependencies or carrying maintainer scripts (other than a fixed
`preinst` stub refusing installation through `dpkg`) are rejected.

## Safe Concurrent Use

Installs of different packages into one install root may run concurrently,
from threads or processes. Commits to an install root are serialized with an
advisory lock.

# A Tour of Functionality

Control files are parsed and written with the primitives in [control].
[click_control::ClickControl] is a view over a control paragraph exposing the
fields click assigns meaning to, and [click_control::MaintainerScripts] holds
the scripts found in a package.

[audit::Auditor] validates control metadata against an [audit::AuditPolicy].
Dotted-decimal versions used in the policy are implemented in [version].

Package archives are accessed through the [archive::ArchiveReader] trait.
[deb::reader::DebArchiveReader] reads `.click` files and
[archive::MemoryArchive] is an in-memory implementation. New `.click` files
are created with [deb::builder::ClickBuilder].

[install::Installer] drives an install. The installed package database is
managed by [status::StatusStore] and install events are recorded by
[journal::InstallLog]. Installer behavior is configured via
[config::InstallerConfig].

Package signatures are checked by a [signature::SignatureGate] before an
install begins.

# Install Root Layout

```text
<root>/.log                    install log, also the install root lock
<root>/<package>/              package data
<root>/<package>/.meta/control copy of the package's control file
<root>/<package>/.meta/status  the package's status record
```
*/

pub mod archive;
pub mod audit;
pub mod click_control;
pub mod config;
pub mod control;
pub mod deb;
pub mod error;
pub mod fs;
pub mod install;
pub mod journal;
pub mod signature;
pub mod status;
#[cfg(test)]
mod testutil;
pub mod version;
