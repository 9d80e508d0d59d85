use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::crypto::{NONCE_SIZE, TAG_SIZE};

use super::ChannelError;

/// Size of the big-endian length prefix on every frame
pub const LENGTH_PREFIX_SIZE: usize = 2;
/// Largest ciphertext a frame can carry
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;
/// Largest plaintext (type byte + body) that fits in one frame
pub const MAX_PLAINTEXT_SIZE: usize = MAX_FRAME_SIZE - TAG_SIZE;

/// AEAD state for one direction of a session
///
/// The nonce for each frame is the number of frames already processed in
/// this direction, little-endian, zero-padded to 96 bits. It starts at 0 and
/// is bumped by exactly one per frame.
pub struct FrameCipher {
    key: [u8; 32],
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCipher")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl FrameCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            key,
            counter: 0,
        }
    }

    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..8].copy_from_slice(&self.counter.to_le_bytes());
        nonce
    }

    fn bump(&mut self) -> Result<(), ChannelError> {
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| ChannelError::Protocol("nonce counter exhausted".to_string()))?;
        Ok(())
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(ChannelError::Protocol(format!(
                "frame plaintext of {} bytes exceeds {}",
                plaintext.len(),
                MAX_PLAINTEXT_SIZE
            )));
        }
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&self.nonce()), plaintext)
            .map_err(|_| ChannelError::Protocol("frame encryption failed".to_string()))?;
        self.bump()?;
        Ok(ciphertext)
    }

    /// Open a frame; a tag failure is [`ChannelError::Decryption`]
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&self.nonce()), ciphertext)
            .map_err(|_| ChannelError::Decryption)?;
        self.bump()?;
        Ok(plaintext)
    }
}

/// Prefix `ciphertext` with its u16 big-endian length
pub fn encode_frame(ciphertext: &[u8]) -> Result<Bytes, ChannelError> {
    let len = u16::try_from(ciphertext.len()).map_err(|_| {
        ChannelError::Protocol(format!("frame of {} bytes is too large", ciphertext.len()))
    })?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + ciphertext.len());
    frame.put_u16(len);
    frame.put_slice(ciphertext);
    Ok(frame.freeze())
}

/// Buffers raw socket bytes until whole frames are available
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pop the next complete frame's ciphertext, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return None;
        }
        let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        if self.buf.len() < LENGTH_PREFIX_SIZE + len {
            return None;
        }
        self.buf.advance(LENGTH_PREFIX_SIZE);
        Some(self.buf.split_to(len).freeze())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counter_nonces() {
        let mut tx = FrameCipher::new([7u8; 32]);
        let mut rx = FrameCipher::new([7u8; 32]);

        for i in 0..3u64 {
            assert_eq!(tx.counter(), i);
            let ct = tx.seal(format!("frame {}", i).as_bytes()).unwrap();
            assert_eq!(rx.open(&ct).unwrap(), format!("frame {}", i).as_bytes());
        }
        assert_eq!(tx.counter(), 3);
        assert_eq!(rx.counter(), 3);
    }

    #[test]
    fn test_out_of_order_frame_fails() {
        let mut tx = FrameCipher::new([1u8; 32]);
        let mut rx = FrameCipher::new([1u8; 32]);
        let _first = tx.seal(b"one").unwrap();
        let second = tx.seal(b"two").unwrap();
        assert!(matches!(rx.open(&second), Err(ChannelError::Decryption)));
    }

    #[test]
    fn test_same_plaintext_differs_per_frame() {
        let mut tx = FrameCipher::new([2u8; 32]);
        assert_ne!(tx.seal(b"ping").unwrap(), tx.seal(b"ping").unwrap());
    }

    #[test]
    fn test_decoder_waits_for_whole_frames() {
        let a = encode_frame(b"hello").unwrap();
        let b = encode_frame(b"world!").unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(&a);
        wire.extend_from_slice(&b);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire[..1]);
        assert!(decoder.next_frame().is_none());
        decoder.extend(&wire[1..9]);
        assert_eq!(decoder.next_frame().unwrap(), &b"hello"[..]);
        assert!(decoder.next_frame().is_none());
        decoder.extend(&wire[9..]);
        assert_eq!(decoder.next_frame().unwrap(), &b"world!"[..]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_oversized_plaintext() {
        let mut tx = FrameCipher::new([3u8; 32]);
        assert!(tx.seal(&vec![0u8; MAX_PLAINTEXT_SIZE]).is_ok());
        assert!(tx.seal(&vec![0u8; MAX_PLAINTEXT_SIZE + 1]).is_err());
    }
}
