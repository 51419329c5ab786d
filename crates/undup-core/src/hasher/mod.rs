use md5::Md5;
use sha1::digest::Output;
use sha1::{Digest, Sha1};
use std::fmt::LowerHex;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithm used to fingerprint file content. The choice is recorded
/// in the store's `versioning` table when the store is created, so every
/// later scan hashes with the same algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Sha1,
    Md5,
}

impl ChecksumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
        }
    }
}

impl FromStr for ChecksumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            other => Err(Error::UnknownChecksumType(other.to_string())),
        }
    }
}

/// Hex digest of the file at `path`, read in chunks so large files never
/// land in memory whole. Follows symlinks.
pub fn file_checksum(path: &Path, kind: ChecksumKind) -> io::Result<String> {
    let mut file = File::open(path)?;
    match kind {
        ChecksumKind::Sha1 => digest_reader::<Sha1>(&mut file),
        ChecksumKind::Md5 => digest_reader::<Md5>(&mut file),
    }
}

fn digest_reader<D: Digest>(reader: &mut impl Read) -> io::Result<String>
where
    Output<D>: LowerHex,
{
    let mut hasher = D::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
