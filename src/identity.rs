//! Content identity: the set of hashes that names a file's bytes.
//!
//! A [`ContentIdentity`] is used both as the cache key for shared files and
//! as the integrity descriptor sent to peers when negotiating a transfer.
//! All hashes in one identity describe the same byte content.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Read buffer size used when hashing files.
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Hash algorithms understood by peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// SHA-1, the algorithm every peer is expected to support.
    Sha1,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the algorithm name as used on the wire (`sha-1`, `sha-256`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha-1",
            Self::Sha256 => "sha-256",
        }
    }

    /// Parses a wire algorithm name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha-1" | "sha1" => Some(Self::Sha1),
            "sha-256" | "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (algorithm, digest) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    /// Algorithm that produced the digest.
    pub algorithm: HashAlgorithm,
    /// Raw digest bytes.
    pub digest: Vec<u8>,
}

impl ContentHash {
    /// Creates a hash from raw digest bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, digest: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            digest: digest.into(),
        }
    }

    /// Computes a hash of an in-memory buffer.
    #[must_use]
    pub fn of_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let digest = match algorithm {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        };
        Self { algorithm, digest }
    }

    /// Lowercase hex rendering of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// Ordered set of hashes identifying one file's content.
///
/// Insertion order is kept; inserting a second digest for an algorithm that
/// is already present replaces the earlier one, so each algorithm appears
/// at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentIdentity {
    hashes: Vec<ContentHash>,
}

impl ContentIdentity {
    /// Creates an empty identity (content not known yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an identity from already computed hashes.
    #[must_use]
    pub fn from_hashes(hashes: impl IntoIterator<Item = ContentHash>) -> Self {
        let mut identity = Self::new();
        for hash in hashes {
            identity.insert(hash);
        }
        identity
    }

    /// SHA-1 identity of an in-memory buffer.
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self::from_hashes([ContentHash::of_bytes(HashAlgorithm::Sha1, data)])
    }

    /// SHA-1 identity of everything readable from `reader`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if reading fails.
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha1::new();
        let mut buffer = vec![0_u8; HASH_CHUNK_SIZE];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(Self::from_hashes([ContentHash::new(
            HashAlgorithm::Sha1,
            hasher.finalize().to_vec(),
        )]))
    }

    /// SHA-1 identity of a file on disk.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened or read.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::of_reader(io::BufReader::new(file))
    }

    /// Inserts a hash, replacing any digest of the same algorithm.
    pub fn insert(&mut self, hash: ContentHash) {
        if let Some(existing) = self
            .hashes
            .iter_mut()
            .find(|h| h.algorithm == hash.algorithm)
        {
            *existing = hash;
        } else {
            self.hashes.push(hash);
        }
    }

    /// Returns the digest for `algorithm`, if present.
    #[must_use]
    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&ContentHash> {
        self.hashes.iter().find(|h| h.algorithm == algorithm)
    }

    /// First hash in insertion order; the primary key of the identity.
    #[must_use]
    pub fn primary(&self) -> Option<&ContentHash> {
        self.hashes.first()
    }

    /// Hex of the primary digest, or an empty string for an empty identity.
    #[must_use]
    pub fn primary_hex(&self) -> String {
        self.primary().map(ContentHash::to_hex).unwrap_or_default()
    }

    /// Iterates hashes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ContentHash> {
        self.hashes.iter()
    }

    /// Number of hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// True when no hash is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// True when both identities share at least one identical hash.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.hashes.iter().any(|h| other.hashes.contains(h))
    }
}

impl<'a> IntoIterator for &'a ContentIdentity {
    type Item = &'a ContentHash;
    type IntoIter = std::slice::Iter<'a, ContentHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.hashes.iter()
    }
}
