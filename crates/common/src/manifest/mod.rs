//! # Manifest
//!
//! A manifest is a channel's mutable root record. It is keyed by the
//! publisher's public key and carries:
//!
//! - **Freshness**: a `sequence` that strictly increases with every publish
//! - **Content**: a timestamp and a list of [`Collection`]s, either in the
//!   clear or sealed under the channel's read key
//! - **Provenance**: an Ed25519 signature by the publisher
//!
//! ## Canonical form
//!
//! The signature covers the JSON serialization of every other field, in this
//! fixed order:
//!
//! ```text
//! publicKey, sequence, timestamp, collections
//! publicKey, sequence, encrypted, nonce, ciphertext
//! ```
//!
//! The order comes from the struct declarations below, never from map
//! iteration, so a manifest re-serialized after parsing reproduces the bytes
//! that were signed.

mod collection;
mod subscription;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::crypto::{
    random_nonce, PublicKey, Secret, SecretError, SecretKey, Signature, NONCE_SIZE,
    SIGNATURE_SIZE, TAG_SIZE,
};

pub use collection::{Collection, CollectionItem};
pub use subscription::{SubscriptionState, SubscriptionTracker};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Validation(String),
    #[error("failed to decrypt manifest content")]
    Decryption,
    #[error("manifest is encrypted and no read key was provided")]
    MissingReadKey,
    #[error("stale manifest: sequence {offered} is not newer than {current}")]
    Stale { current: u64, offered: u64 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("manifest error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Plain channel content: what subscribers actually read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContent {
    /// Milliseconds since the Unix epoch at publish time
    pub timestamp: u64,
    pub collections: Vec<Collection>,
}

/// Channel content sealed under the read key
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedContent {
    pub encrypted: bool,
    #[serde_as(as = "Hex")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde_as(as = "Hex")]
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestContent {
    Sealed(SealedContent),
    Plain(ChannelContent),
}

/// A signed channel record
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub public_key: PublicKey,
    pub sequence: u64,
    #[serde(flatten)]
    pub content: ManifestContent,
    #[serde_as(as = "Hex")]
    pub signature: [u8; SIGNATURE_SIZE],
}

/// Everything in a manifest except the signature, in canonical order
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningPayload<'a> {
    public_key: &'a PublicKey,
    sequence: u64,
    #[serde(flatten)]
    content: &'a ManifestContent,
}

/// A manifest's content after validation and decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub public_key: PublicKey,
    pub sequence: u64,
    pub timestamp: u64,
    pub collections: Vec<Collection>,
}

impl From<SecretError> for ManifestError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::Decrypt => ManifestError::Decryption,
            SecretError::Default(e) => ManifestError::Default(e),
        }
    }
}

/// Milliseconds since the Unix epoch, the default publish sequence
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

impl Manifest {
    /// Build and sign a manifest for `collections`
    ///
    /// With a `read_key` the content is sealed under a fresh random nonce and
    /// only holders of the key can read it; the signature still covers the
    /// sealed form, so anyone can check provenance.
    pub fn create(
        secret_key: &SecretKey,
        sequence: u64,
        collections: Vec<Collection>,
        read_key: Option<&Secret>,
    ) -> Result<Self, ManifestError> {
        let channel = ChannelContent {
            timestamp: now_millis(),
            collections,
        };

        let content = match read_key {
            Some(key) => {
                let plaintext = serde_json::to_vec(&channel)?;
                let nonce = random_nonce();
                let ciphertext = key.seal(&nonce, &plaintext)?;
                ManifestContent::Sealed(SealedContent {
                    encrypted: true,
                    nonce,
                    ciphertext,
                })
            }
            None => ManifestContent::Plain(channel),
        };

        let mut manifest = Manifest {
            public_key: secret_key.public(),
            sequence,
            content,
            signature: [0u8; SIGNATURE_SIZE],
        };
        manifest.signature = secret_key.sign(&manifest.signing_bytes()?).to_bytes();

        tracing::debug!(
            "Manifest::create: signed sequence {} for {} (encrypted: {})",
            sequence,
            manifest.public_key,
            manifest.is_encrypted()
        );
        Ok(manifest)
    }

    /// Parse a manifest, rejecting missing or malformed fields
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|e| ManifestError::Validation(e.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
        serde_json::from_value(value).map_err(|e| ManifestError::Validation(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Canonical bytes covered by the signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        let payload = SigningPayload {
            public_key: &self.public_key,
            sequence: self.sequence,
            content: &self.content,
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.content, ManifestContent::Sealed(_))
    }

    /// Check structure and verify the publisher's signature
    pub fn validate(&self) -> Result<(), ManifestError> {
        if let ManifestContent::Sealed(sealed) = &self.content {
            if !sealed.encrypted {
                return Err(ManifestError::Validation(
                    "sealed content must set encrypted to true".to_string(),
                ));
            }
            if sealed.ciphertext.len() < TAG_SIZE {
                return Err(ManifestError::Validation(
                    "ciphertext shorter than an authentication tag".to_string(),
                ));
            }
        }

        let signature = Signature::from_bytes(&self.signature);
        self.public_key
            .verify(&self.signing_bytes()?, &signature)
            .map_err(|_| {
                ManifestError::Validation(format!(
                    "signature does not verify for {} at sequence {}",
                    self.public_key, self.sequence
                ))
            })
    }

    /// Recover the channel content, opening it with `read_key` if sealed
    pub fn decrypt(&self, read_key: Option<&Secret>) -> Result<ChannelView, ManifestError> {
        let channel = match &self.content {
            ManifestContent::Plain(channel) => channel.clone(),
            ManifestContent::Sealed(sealed) => {
                let key = read_key.ok_or(ManifestError::MissingReadKey)?;
                let plaintext = key.open(&sealed.nonce, &sealed.ciphertext)?;
                serde_json::from_slice::<ChannelContent>(&plaintext).map_err(|e| {
                    ManifestError::Validation(format!("decrypted content is malformed: {}", e))
                })?
            }
        };
        Ok(ChannelView {
            public_key: self.public_key,
            sequence: self.sequence,
            timestamp: channel.timestamp,
            collections: channel.collections,
        })
    }
}
