// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{control::ControlParagraph, deb::builder::ClickBuilder, error::Result},
    std::path::{Path, PathBuf},
};

/// A control paragraph for a package that passes the audit.
pub fn test_control(package: &str) -> ControlParagraph<'static> {
    let mut p = ControlParagraph::default();

    for (name, value) in [
        ("Package", package),
        ("Version", "1.0"),
        ("Architecture", "all"),
        ("Maintainer", "Foo Bar <foo@example.org>"),
        ("Description", "test package"),
        ("Click-Version", "0.1"),
        ("Click-Base-System", "13.04"),
    ] {
        p.set_field_from_string(name.into(), value.to_string().into());
    }

    p
}

/// Write the package produced by a builder to `dir/filename`.
pub fn write_package(dir: &Path, filename: &str, builder: &ClickBuilder) -> Result<PathBuf> {
    let path = dir.join(filename);
    let mut fh = std::fs::File::create(&path)?;
    builder.write(&mut fh)?;

    Ok(path)
}

/// Sorted names of the entries of a directory.
pub fn root_listing(dir: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    names.sort();

    names
}
