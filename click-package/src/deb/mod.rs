// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interfaces for `.click` files.

Click packages are `.deb` files: an `ar` archive holding a `debian-binary`
member with the format version, a `control.tar` with package metadata and a
`data.tar` with the files to install. The tar members may be compressed.
*/

pub mod builder;
pub mod reader;

use {
    crate::error::{ClickError, Result},
    std::io::Read,
};

/// Content of the `debian-binary` member.
pub const DEB_FORMAT_VERSION: &[u8] = b"2.0\n";

/// Compression format of tar members in a `.deb` file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebCompression {
    /// No compression (no extension).
    Uncompressed,

    /// Gzip compression (`.gz`).
    Gzip,

    /// XZ compression (`.xz`) at the given level.
    Xz(u32),

    /// Zstandard compression (`.zst`) at the given level.
    Zstandard(i32),
}

impl DebCompression {
    /// Filename extension for tar members using this compression.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Uncompressed => "",
            Self::Gzip => ".gz",
            Self::Xz(_) => ".xz",
            Self::Zstandard(_) => ".zst",
        }
    }

    /// Resolve the compression of a tar member from its filename extension.
    ///
    /// `extension` is everything after `.tar` in the member name.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension {
            "" => Ok(Self::Uncompressed),
            ".gz" => Ok(Self::Gzip),
            ".xz" => Ok(Self::Xz(6)),
            ".zst" => Ok(Self::Zstandard(3)),
            _ => Err(ClickError::Archive(format!(
                "unknown compression in deb archive member: {}",
                extension
            ))),
        }
    }

    /// Compress data from a reader.
    pub fn compress(&self, reader: &mut impl Read) -> Result<Vec<u8>> {
        let mut buffer = vec![];

        match self {
            Self::Uncompressed => {
                std::io::copy(reader, &mut buffer)?;
            }
            Self::Gzip => {
                let mut encoder = libflate::gzip::Encoder::new(&mut buffer)?;
                std::io::copy(reader, &mut encoder)?;
                encoder.finish().into_result()?;
            }
            Self::Xz(level) => {
                let mut encoder = xz2::write::XzEncoder::new(buffer, *level);
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
            Self::Zstandard(level) => {
                let mut encoder = zstd::Encoder::new(buffer, *level)?;
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
        }

        Ok(buffer)
    }

    /// Wrap a reader in a decompressing reader.
    pub fn decompress<'a>(&self, reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::Uncompressed => Box::new(reader),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(reader)?),
            Self::Xz(_) => Box::new(xz2::read::XzDecoder::new(reader)),
            Self::Zstandard(_) => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }
}

/// Split a `.deb` member name like `data.tar.xz` into its stem and compression.
///
/// Returns `None` if the member is not a tar archive.
pub fn split_tar_member_name(name: &str) -> Option<(&str, &str)> {
    let pos = name.find(".tar")?;
    let (stem, rest) = name.split_at(pos);

    Some((stem, &rest[".tar".len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_member_names() {
        assert_eq!(split_tar_member_name("control.tar.gz"), Some(("control", ".gz")));
        assert_eq!(split_tar_member_name("data.tar"), Some(("data", "")));
        assert_eq!(split_tar_member_name("data.tar.zst"), Some(("data", ".zst")));
        assert_eq!(split_tar_member_name("debian-binary"), None);
    }

    #[test]
    fn compression_roundtrip() -> Result<()> {
        let data = b"hello, click".repeat(100);

        for compression in [
            DebCompression::Uncompressed,
            DebCompression::Gzip,
            DebCompression::Xz(6),
            DebCompression::Zstandard(3),
        ] {
            let compressed = compression.compress(&mut std::io::Cursor::new(&data))?;
            let resolved = DebCompression::from_extension(compression.extension())?;

            let mut decompressed = vec![];
            resolved
                .decompress(std::io::Cursor::new(compressed))?
                .read_to_end(&mut decompressed)?;

            assert_eq!(decompressed, data, "{:?}", compression);
        }

        Ok(())
    }

    #[test]
    fn unknown_extension() {
        assert!(DebCompression::from_extension(".bz2").is_err());
    }
}
