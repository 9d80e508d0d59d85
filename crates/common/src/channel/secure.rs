use std::collections::VecDeque;
use std::fmt;
use std::mem;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::frame::{encode_frame, FrameDecoder};
use super::handshake::{EphemeralKeypair, Role, SessionKeys, HANDSHAKE_KEY_SIZE};
use super::messages::Message;
use super::{ChannelError, MAX_DATA_BODY};

const READ_CHUNK: usize = 64 * 1024;

enum State {
    Handshaking(EphemeralKeypair),
    Established(SessionKeys),
    Closed,
}

/// One end of an encrypted, framed connection
///
/// Opening a channel writes our ephemeral public key right away. Messages
/// sent before the peer's key has been read are queued and flushed in call
/// order once the session keys exist. The handshake completes on the first
/// [`recv`](Self::recv) or an explicit [`handshake`](Self::handshake).
///
/// A frame that fails authentication closes the channel for good: every
/// later call returns [`ChannelError::Closed`].
pub struct SecureChannel<S> {
    stream: S,
    role: Role,
    state: State,
    decoder: FrameDecoder,
    queued: VecDeque<Vec<u8>>,
}

impl<S> fmt::Debug for SecureChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Handshaking(_) => "handshaking",
            State::Established(_) => "established",
            State::Closed => "closed",
        };
        f.debug_struct("SecureChannel")
            .field("role", &self.role)
            .field("state", &state)
            .field("queued", &self.queued.len())
            .finish()
    }
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub async fn open(mut stream: S, role: Role) -> Result<Self, ChannelError> {
        let keypair = EphemeralKeypair::generate();
        stream.write_all(&keypair.public_bytes()).await?;
        stream.flush().await?;
        Ok(Self {
            stream,
            role,
            state: State::Handshaking(keypair),
            decoder: FrameDecoder::new(),
            queued: VecDeque::new(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, State::Established(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Session keys, once the handshake has completed
    pub fn keys(&self) -> Option<&SessionKeys> {
        match &self.state {
            State::Established(keys) => Some(keys),
            _ => None,
        }
    }

    /// Read the peer's public key, derive session keys and flush queued writes
    pub async fn handshake(&mut self) -> Result<(), ChannelError> {
        match self.state {
            State::Established(_) => return Ok(()),
            State::Closed => return Err(ChannelError::Closed),
            State::Handshaking(_) => {}
        }

        let mut peer_public = [0u8; HANDSHAKE_KEY_SIZE];
        if let Err(e) = self.stream.read_exact(&mut peer_public).await {
            self.state = State::Closed;
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => ChannelError::Closed,
                _ => e.into(),
            });
        }

        let State::Handshaking(keypair) = mem::replace(&mut self.state, State::Closed) else {
            return Err(ChannelError::Closed);
        };
        let keys = match keypair.derive(self.role, peer_public) {
            Ok(keys) => keys,
            Err(e) => {
                let _ = self.stream.shutdown().await;
                return Err(e);
            }
        };
        self.state = State::Established(keys);
        tracing::debug!(
            "SecureChannel: handshake complete as {:?}, flushing {} queued messages",
            self.role,
            self.queued.len()
        );

        while let Some(plaintext) = self.queued.pop_front() {
            self.write_frame(&plaintext).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn write_frame(&mut self, plaintext: &[u8]) -> Result<(), ChannelError> {
        let State::Established(keys) = &mut self.state else {
            return Err(ChannelError::Closed);
        };
        let ciphertext = keys.send.seal(plaintext)?;
        let frame = encode_frame(&ciphertext)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn push(&mut self, message: &Message) -> Result<(), ChannelError> {
        let plaintext = message.encode()?;
        match self.state {
            State::Handshaking(_) => {
                self.queued.push_back(plaintext);
                Ok(())
            }
            State::Established(_) => self.write_frame(&plaintext).await,
            State::Closed => Err(ChannelError::Closed),
        }
    }

    /// Send one message, or queue it if the handshake is still pending
    pub async fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        self.push(message).await?;
        if self.is_established() {
            self.stream.flush().await?;
        }
        Ok(())
    }

    /// Stream a blob as DATA frames followed by an empty DATA frame
    pub async fn send_blob(&mut self, data: &Bytes) -> Result<(), ChannelError> {
        let mut offset = 0;
        while offset < data.len() {
            let end = usize::min(offset + MAX_DATA_BODY, data.len());
            self.push(&Message::Data(data.slice(offset..end))).await?;
            offset = end;
        }
        self.push(&Message::Data(Bytes::new())).await?;
        if self.is_established() {
            self.stream.flush().await?;
        }
        Ok(())
    }

    /// Receive the next message
    ///
    /// Returns `Ok(None)` when the peer closes cleanly between frames. A
    /// frame that fails authentication closes the channel and returns
    /// [`ChannelError::Decryption`]; a frame that decrypts but does not decode
    /// returns [`ChannelError::Protocol`] and leaves the decision to the caller.
    pub async fn recv(&mut self) -> Result<Option<Message>, ChannelError> {
        self.handshake().await?;

        loop {
            if let Some(ciphertext) = self.decoder.next_frame() {
                let State::Established(keys) = &mut self.state else {
                    return Err(ChannelError::Closed);
                };
                let plaintext = match keys.recv.open(&ciphertext) {
                    Ok(plaintext) => plaintext,
                    Err(e) => {
                        tracing::warn!(
                            "SecureChannel: frame failed authentication, closing channel"
                        );
                        self.poison().await;
                        return Err(e);
                    }
                };
                return Message::decode(&plaintext).map(Some);
            }

            self.decoder.buffer_mut().reserve(READ_CHUNK);
            let read = self.stream.read_buf(self.decoder.buffer_mut()).await?;
            if read == 0 {
                let clean = self.decoder.is_empty();
                self.state = State::Closed;
                if clean {
                    return Ok(None);
                }
                return Err(ChannelError::Protocol(
                    "connection closed in the middle of a frame".to_string(),
                ));
            }
        }
    }

    /// Reply with ERROR and tear the connection down
    pub async fn reject(&mut self, reason: &str) -> Result<(), ChannelError> {
        tracing::debug!("SecureChannel: rejecting peer: {}", reason);
        let sent = self.send(&Message::Error(reason.to_string())).await;
        self.close().await?;
        sent
    }

    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.state = State::Closed;
        self.queued.clear();
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn poison(&mut self) {
        self.state = State::Closed;
        self.queued.clear();
        let _ = self.stream.shutdown().await;
    }
}
