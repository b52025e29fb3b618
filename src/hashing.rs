//! Hashing System - Subresource Integrity Digests
//!
//! Output doubles as an integrity attribute and as a known-hash key:
//! `<prefix>-<base64(digest)>`, standard alphabet, padded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

/// Digest strength used for an integrity hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashVariant {
    /// SHA-256
    Sha256,
    /// SHA-384, the usual choice for integrity attributes
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashVariant {
    pub const ALL: [HashVariant; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Prefix carried by every hash of this variant, dash included.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256-",
            Self::Sha384 => "sha384-",
            Self::Sha512 => "sha512-",
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl Default for HashVariant {
    fn default() -> Self {
        Self::Sha384
    }
}

impl fmt::Display for HashVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "weak" => Ok(Self::Sha256),
            "sha384" | "standard" => Ok(Self::Sha384),
            "sha512" | "strong" => Ok(Self::Sha512),
            other => Err(format!("unknown hash variant: {other}")),
        }
    }
}

/// Compute the integrity hash of `data`.
pub fn sri_hash(variant: HashVariant, data: &[u8]) -> String {
    let digest = variant.digest(data);
    format!("{}{}", variant.prefix(), STANDARD.encode(digest))
}

pub fn sha256_hash(data: &[u8]) -> String {
    sri_hash(HashVariant::Sha256, data)
}

pub fn sha384_hash(data: &[u8]) -> String {
    sri_hash(HashVariant::Sha384, data)
}

pub fn sha512_hash(data: &[u8]) -> String {
    sri_hash(HashVariant::Sha512, data)
}

/// Hash every file content with every variant.
pub fn hash_contents<I, B>(contents: I, variants: &[HashVariant]) -> BTreeSet<String>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hashes = BTreeSet::new();
    for content in contents {
        for variant in variants {
            hashes.insert(sri_hash(*variant, content.as_ref()));
        }
    }
    hashes
}

/// Walk `root` and hash every regular file with every variant.
///
/// Symlinks are followed. Directories, sockets, FIFOs and devices are
/// skipped. Any unreadable regular file fails the whole walk.
pub fn hash_dir(root: &Path, variants: &[HashVariant]) -> Result<BTreeSet<String>, std::io::Error> {
    let mut hashes = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let data = std::fs::read(entry.path())?;
        hashes.extend(hash_contents([data], variants));
    }
    Ok(hashes)
}
