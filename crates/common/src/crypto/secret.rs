//! Symmetric encryption using ChaCha20-Poly1305
//!
//! A `Secret` is used for exactly two things: the per-chunk content key
//! generated at ingest, and a channel's read key for encrypted manifests.
//! Both pair the key with a freshly drawn random 96-bit nonce for every
//! message sealed, so a (key, nonce) pair never repeats.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of ChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("authentication tag verification failed")]
    Decrypt,
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Draw a fresh random nonce from the system RNG
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).expect("failed to generate random bytes");
    nonce
}

/// A 256-bit symmetric key
///
/// Serializes as a lowercase hex string so it can be embedded directly in
/// chunk metadata.
///
/// # Examples
///
/// ```ignore
/// let secret = Secret::generate();
/// let nonce = random_nonce();
///
/// let sealed = secret.seal(&nonce, b"sensitive data")?;
/// let recovered = secret.open(&nonce, &sealed)?;
/// assert_eq!(b"sensitive data", &recovered[..]);
/// ```
#[derive(PartialEq, Eq, Clone)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Secret::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn from_hex(hex: &str) -> Result<Self, SecretError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SECRET_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("secret hex decode error"))?;
        Ok(buff.into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.bytes()))
    }

    /// Seal `plaintext` under an explicit nonce, returning `ciphertext || tag`
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        self.cipher()
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| anyhow::anyhow!("encrypt error").into())
    }

    /// Open `ciphertext || tag` sealed under `nonce`
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Decrypt`] if the tag does not verify, which
    /// covers both tampering and a wrong key.
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Decrypt)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seal_open() {
        let secret = Secret::generate();
        let nonce = random_nonce();
        let data = b"hello world";
        let sealed = secret.seal(&nonce, data).unwrap();
        assert_eq!(sealed.len(), data.len() + TAG_SIZE);
        let opened = secret.open(&nonce, &sealed).unwrap();
        assert_eq!(data, &opened[..]);
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let secret = Secret::generate();
        let nonce = random_nonce();
        let mut sealed = secret.seal(&nonce, b"attack at dawn").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(secret.open(&nonce, &sealed), Err(SecretError::Decrypt)));
    }

    #[test]
    fn test_wrong_key_or_nonce_is_rejected() {
        let secret = Secret::generate();
        let nonce = random_nonce();
        let sealed = secret.seal(&nonce, b"secret").unwrap();
        assert!(matches!(
            Secret::generate().open(&nonce, &sealed),
            Err(SecretError::Decrypt)
        ));
        assert!(matches!(
            secret.open(&random_nonce(), &sealed),
            Err(SecretError::Decrypt)
        ));
    }

    #[test]
    fn test_hex_round_trip() {
        let secret = Secret::generate();
        let recovered = Secret::from_hex(&secret.to_hex()).unwrap();
        assert_eq!(secret, recovered);
        assert!(Secret::from_slice(&[0u8; 16]).is_err());
    }
}
