//! Cryptographic primitives for Swarmcast
//!
//! - **Identity & Authentication**: Ed25519 keypairs identify publishers and
//!   nodes. A channel manifest is signed by its publisher's `SecretKey` and
//!   looked up by the matching `PublicKey`.
//! - **Content Encryption**: every chunk is sealed with ChaCha20-Poly1305
//!   under its own freshly generated `Secret` and a random nonce. Channel
//!   manifests may additionally be sealed under a shared read key.
//!
//! Transport encryption (ephemeral X25519 + per-direction keys) lives with
//! the secure channel, since those keys never outlive a connection.

mod keys;
mod secret;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
pub use secret::{random_nonce, Secret, SecretError, NONCE_SIZE, SECRET_SIZE, TAG_SIZE};
