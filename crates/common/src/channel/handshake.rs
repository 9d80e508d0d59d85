use std::fmt;

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::frame::FrameCipher;
use super::ChannelError;

/// Size of a raw X25519 public key as written on the wire
pub const HANDSHAKE_KEY_SIZE: usize = 32;
/// KDF salt for the key protecting server-to-client frames
pub const SERVER_TO_CLIENT_SALT: &[u8] = b"S";
/// KDF salt for the key protecting client-to-server frames
pub const CLIENT_TO_SERVER_SALT: &[u8] = b"C";

/// Which end of the connection we are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A keypair generated for exactly one connection
///
/// `derive` consumes it, so the secret cannot be reused for a second session.
pub struct EphemeralKeypair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EphemeralKeypair({})", hex::encode(self.public.as_bytes()))
    }
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; HANDSHAKE_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; HANDSHAKE_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Complete the exchange with the peer's raw public key
    ///
    /// # Errors
    ///
    /// Fails with [`ChannelError::Protocol`] if the peer's key is a low-order
    /// point, which would make the shared secret predictable.
    pub fn derive(
        self,
        role: Role,
        peer_public: [u8; HANDSHAKE_KEY_SIZE],
    ) -> Result<SessionKeys, ChannelError> {
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(peer_public));
        if !shared.was_contributory() {
            return Err(ChannelError::Protocol(
                "peer sent a non-contributory handshake key".to_string(),
            ));
        }

        let server_to_client = derive_key(shared.as_bytes(), SERVER_TO_CLIENT_SALT);
        let client_to_server = derive_key(shared.as_bytes(), CLIENT_TO_SERVER_SALT);
        let (send, recv) = match role {
            Role::Server => (server_to_client, client_to_server),
            Role::Client => (client_to_server, server_to_client),
        };

        Ok(SessionKeys {
            send: FrameCipher::new(send),
            recv: FrameCipher::new(recv),
        })
    }
}

fn derive_key(shared: &[u8; 32], salt: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(shared);
    hasher.update(salt);
    *hasher.finalize().as_bytes()
}

/// Directional keys and nonce counters for one established session
#[derive(Debug)]
pub struct SessionKeys {
    pub(crate) send: FrameCipher,
    pub(crate) recv: FrameCipher,
}

impl SessionKeys {
    pub fn send_key(&self) -> &[u8; 32] {
        self.send.key()
    }

    pub fn recv_key(&self) -> &[u8; 32] {
        self.recv.key()
    }

    /// Frames sealed so far in our sending direction
    pub fn send_counter(&self) -> u64 {
        self.send.counter()
    }

    /// Frames opened so far in our receiving direction
    pub fn recv_counter(&self) -> u64 {
        self.recv.counter()
    }
}
