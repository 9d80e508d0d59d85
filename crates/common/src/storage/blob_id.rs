use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Size of a blob id (sha256) in bytes
pub const BLOB_ID_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("invalid blob id: {0}")]
pub struct BlobIdError(String);

/// Content address of a blob: `sha256(blob bytes)`
///
/// Rendered as 64 lowercase hex characters everywhere it leaves memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId([u8; BLOB_ID_SIZE]);

impl BlobId {
    /// Hash `data` to get its content address
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; BLOB_ID_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<Self, BlobIdError> {
        let mut bytes = [0u8; BLOB_ID_SIZE];
        hex::decode_to_slice(hex.trim(), &mut bytes).map_err(|e| BlobIdError(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; BLOB_ID_SIZE] {
        &self.0
    }

    /// Whether `data` hashes to this id
    pub fn matches(&self, data: &[u8]) -> bool {
        BlobId::of(data) == *self
    }
}

impl From<[u8; BLOB_ID_SIZE]> for BlobId {
    fn from(bytes: [u8; BLOB_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", &self.to_hex()[..12])
    }
}

impl FromStr for BlobId {
    type Err = BlobIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        BlobId::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        let id = BlobId::of(b"abc");
        assert_eq!(
            id.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(id.matches(b"abc"));
        assert!(!id.matches(b"abd"));
    }

    #[test]
    fn test_parse() {
        let id = BlobId::of(b"swarm");
        assert_eq!(id, id.to_hex().parse().unwrap());
        assert!("zz".parse::<BlobId>().is_err());
        assert!(BlobId::from_hex(&id.to_hex()[..40]).is_err());
    }
}
