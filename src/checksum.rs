//! Checksum engine (component B): a fixed algorithm set, a streaming
//! context usable from both whole-file hashing and the content-statistics
//! sink in [`crate::compress`], and the `(type, value)` pair that shows up
//! all over the wire formats as `<checksum type="sha256">...</checksum>`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::error::{ErrorKind, MetadataError};

/// The closed set of checksum algorithms this crate understands. `Unknown`
/// is a sentinel for "present in the data but unrecognized" and is never
/// written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChecksumType {
    Md5,
    /// Also spelled `sha` in older repodata (RPM/yum historical alias).
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    #[default]
    Unknown,
}

impl ChecksumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha224 => "sha224",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha384 => "sha384",
            ChecksumType::Sha512 => "sha512",
            ChecksumType::Unknown => "unknown",
        }
    }

    /// Hex-digest width in characters for this algorithm.
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumType::Md5 => 32,
            ChecksumType::Sha1 => 40,
            ChecksumType::Sha224 => 56,
            ChecksumType::Sha256 => 64,
            ChecksumType::Sha384 => 96,
            ChecksumType::Sha512 => 128,
            ChecksumType::Unknown => 0,
        }
    }
}

impl std::str::FromStr for ChecksumType {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "md5" => ChecksumType::Md5,
            "sha" | "sha1" => ChecksumType::Sha1,
            "sha224" => ChecksumType::Sha224,
            "sha256" => ChecksumType::Sha256,
            "sha384" => ChecksumType::Sha384,
            "sha512" => ChecksumType::Sha512,
            other => {
                log::warn!("unrecognized checksum type `{other}`, treating as Unknown");
                ChecksumType::Unknown
            }
        })
    }
}

/// A `(type, hex value)` pair, as it appears in a `<checksum>` element, an
/// RPM `pkgId`, or a `RepomdRecord`'s checksum slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Checksum {
    pub checksum_type: ChecksumType,
    pub value: String,
}

impl Checksum {
    pub fn new(checksum_type: ChecksumType, value: impl Into<String>) -> Self {
        Checksum {
            checksum_type,
            value: value.into(),
        }
    }

    pub fn try_create(
        checksum_type: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Result<Self, MetadataError> {
        let checksum_type: ChecksumType = checksum_type.as_ref().parse()?;
        let value = value.into();
        if checksum_type != ChecksumType::Unknown && value.len() != checksum_type.digest_len() {
            return Err(MetadataError::new(
                ErrorKind::UnknownChecksumType,
                format!(
                    "\"{value}\" is not a valid checksum of type \"{checksum_type:?}\""
                ),
            ));
        }
        Ok(Checksum {
            checksum_type,
            value,
        })
    }
}

/// Streaming hash context over one of the five real algorithms. Used both
/// for whole-file checksumming and, via [`crate::compress::StatisticsSink`],
/// for hashing the uncompressed side of a stream as bytes flow through it.
pub enum ChecksumContext {
    Md5(Md5),
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl ChecksumContext {
    pub fn new(checksum_type: ChecksumType) -> Result<Self, MetadataError> {
        Ok(match checksum_type {
            ChecksumType::Md5 => ChecksumContext::Md5(Md5::new()),
            ChecksumType::Sha1 => ChecksumContext::Sha1(Sha1::new()),
            ChecksumType::Sha224 => ChecksumContext::Sha224(Sha224::new()),
            ChecksumType::Sha256 => ChecksumContext::Sha256(Sha256::new()),
            ChecksumType::Sha384 => ChecksumContext::Sha384(Sha384::new()),
            ChecksumType::Sha512 => ChecksumContext::Sha512(Sha512::new()),
            ChecksumType::Unknown => {
                return Err(MetadataError::new(
                    ErrorKind::UnknownChecksumType,
                    "cannot create a digest context for ChecksumType::Unknown",
                ))
            }
        })
    }

    pub fn checksum_type(&self) -> ChecksumType {
        match self {
            ChecksumContext::Md5(_) => ChecksumType::Md5,
            ChecksumContext::Sha1(_) => ChecksumType::Sha1,
            ChecksumContext::Sha224(_) => ChecksumType::Sha224,
            ChecksumContext::Sha256(_) => ChecksumType::Sha256,
            ChecksumContext::Sha384(_) => ChecksumType::Sha384,
            ChecksumContext::Sha512(_) => ChecksumType::Sha512,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            ChecksumContext::Md5(c) => Digest::update(c, data),
            ChecksumContext::Sha1(c) => Digest::update(c, data),
            ChecksumContext::Sha224(c) => Digest::update(c, data),
            ChecksumContext::Sha256(c) => Digest::update(c, data),
            ChecksumContext::Sha384(c) => Digest::update(c, data),
            ChecksumContext::Sha512(c) => Digest::update(c, data),
        }
    }

    pub fn finish(self) -> Checksum {
        let checksum_type = self.checksum_type();
        let value = match self {
            ChecksumContext::Md5(c) => hex::encode(c.finalize()),
            ChecksumContext::Sha1(c) => hex::encode(c.finalize()),
            ChecksumContext::Sha224(c) => hex::encode(c.finalize()),
            ChecksumContext::Sha256(c) => hex::encode(c.finalize()),
            ChecksumContext::Sha384(c) => hex::encode(c.finalize()),
            ChecksumContext::Sha512(c) => hex::encode(c.finalize()),
        };
        Checksum { checksum_type, value }
    }
}

/// Hash the full contents of a buffer with the given algorithm.
pub fn hash_bytes(data: &[u8], checksum_type: ChecksumType) -> Result<Checksum, MetadataError> {
    let mut ctx = ChecksumContext::new(checksum_type)?;
    ctx.update(data);
    Ok(ctx.finish())
}

/// Hash the raw on-disk bytes of a file (whatever its compression state).
pub fn checksum_file(path: &Path, checksum_type: ChecksumType) -> Result<Checksum, MetadataError> {
    let file = File::open(path).map_err(|e| {
        MetadataError::with_cause(ErrorKind::Io, format!("opening {}", path.display()), e)
    })?;
    let mut reader = BufReader::new(file);
    let mut ctx = ChecksumContext::new(checksum_type)?;
    let mut buffer = [0u8; 8192];
    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        ctx.update(&buffer[..count]);
    }
    Ok(ctx.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_type_roundtrip() {
        for (s, t) in [
            ("md5", ChecksumType::Md5),
            ("sha1", ChecksumType::Sha1),
            ("sha", ChecksumType::Sha1),
            ("sha224", ChecksumType::Sha224),
            ("sha256", ChecksumType::Sha256),
            ("sha384", ChecksumType::Sha384),
            ("sha512", ChecksumType::Sha512),
        ] {
            assert_eq!(s.parse::<ChecksumType>().unwrap(), t);
        }
    }

    #[test]
    fn hash_bytes_known_vector() {
        // echo -n "abc" | sha256sum
        let checksum = hash_bytes(b"abc", ChecksumType::Sha256).unwrap();
        assert_eq!(
            checksum.value,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn invalid_length_rejected() {
        let err = Checksum::try_create("sha256", "deadbeef").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownChecksumType);
    }
}
