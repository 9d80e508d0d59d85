//! Typed messages carried inside secure channel frames
//!
//! A decrypted frame is `u8 type || body`. Bodies are:
//!
//! | type            | body                                   |
//! |-----------------|----------------------------------------|
//! | HELLO (0x01)    | JSON `{version, sequences}`            |
//! | REQUEST (0x02)  | blob id, ASCII hex                     |
//! | DATA (0x03)     | raw blob bytes; empty marks end of blob |
//! | FIND_PEERS (0x04) | blob id, ASCII hex                   |
//! | PEERS (0x05)    | JSON list of `host:port`               |
//! | PUBLISH (0x06)  | manifest JSON                          |
//! | ANNOUNCE (0x07) | JSON `{blobId, address}`               |
//! | OK (0x08)       | empty                                  |
//! | ERROR (0xFF)    | UTF-8 reason                           |

use bytes::Bytes;

use crate::manifest::Manifest;
use crate::storage::BlobId;

use super::ChannelError;

mod announce;
mod hello;

pub use announce::Announce;
pub use hello::{Hello, Sequences};

/// Reason sent with ERROR when a requested blob is not held
pub const NOT_FOUND: &str = "Not Found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0x01,
    Request = 0x02,
    Data = 0x03,
    FindPeers = 0x04,
    Peers = 0x05,
    Publish = 0x06,
    Announce = 0x07,
    Ok = 0x08,
    Error = 0xFF,
}

impl MessageType {
    pub fn from_byte(value: u8) -> Result<Self, ChannelError> {
        Ok(match value {
            0x01 => MessageType::Hello,
            0x02 => MessageType::Request,
            0x03 => MessageType::Data,
            0x04 => MessageType::FindPeers,
            0x05 => MessageType::Peers,
            0x06 => MessageType::Publish,
            0x07 => MessageType::Announce,
            0x08 => MessageType::Ok,
            0xFF => MessageType::Error,
            other => {
                return Err(ChannelError::Protocol(format!(
                    "unknown message type 0x{:02x}",
                    other
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    Request(BlobId),
    Data(Bytes),
    FindPeers(BlobId),
    Peers(Vec<String>),
    Publish(Box<Manifest>),
    Announce(Announce),
    Ok,
    Error(String),
}

fn protocol<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> ChannelError {
    move |e| ChannelError::Protocol(format!("malformed {} body: {}", what, e))
}

fn decode_blob_id(body: &[u8], what: &'static str) -> Result<BlobId, ChannelError> {
    let hex = std::str::from_utf8(body).map_err(protocol(what))?;
    BlobId::from_hex(hex).map_err(protocol(what))
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Request(_) => MessageType::Request,
            Message::Data(_) => MessageType::Data,
            Message::FindPeers(_) => MessageType::FindPeers,
            Message::Peers(_) => MessageType::Peers,
            Message::Publish(_) => MessageType::Publish,
            Message::Announce(_) => MessageType::Announce,
            Message::Ok => MessageType::Ok,
            Message::Error(_) => MessageType::Error,
        }
    }

    /// Serialize to frame plaintext: type byte followed by the body
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        let body: Vec<u8> = match self {
            Message::Hello(hello) => serde_json::to_vec(hello).map_err(protocol("HELLO"))?,
            Message::Request(id) | Message::FindPeers(id) => id.to_hex().into_bytes(),
            Message::Data(data) => data.to_vec(),
            Message::Peers(peers) => serde_json::to_vec(peers).map_err(protocol("PEERS"))?,
            Message::Publish(manifest) => {
                serde_json::to_vec(manifest.as_ref()).map_err(protocol("PUBLISH"))?
            }
            Message::Announce(announce) => {
                serde_json::to_vec(announce).map_err(protocol("ANNOUNCE"))?
            }
            Message::Ok => Vec::new(),
            Message::Error(reason) => reason.as_bytes().to_vec(),
        };

        let mut out = Vec::with_capacity(1 + body.len());
        out.push(self.message_type() as u8);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse frame plaintext; unknown types and bad bodies are protocol errors
    pub fn decode(plaintext: &[u8]) -> Result<Self, ChannelError> {
        let (&tag, body) = plaintext
            .split_first()
            .ok_or_else(|| ChannelError::Protocol("empty frame".to_string()))?;

        Ok(match MessageType::from_byte(tag)? {
            MessageType::Hello => {
                Message::Hello(serde_json::from_slice(body).map_err(protocol("HELLO"))?)
            }
            MessageType::Request => Message::Request(decode_blob_id(body, "REQUEST")?),
            MessageType::Data => Message::Data(Bytes::copy_from_slice(body)),
            MessageType::FindPeers => Message::FindPeers(decode_blob_id(body, "FIND_PEERS")?),
            MessageType::Peers => {
                Message::Peers(serde_json::from_slice(body).map_err(protocol("PEERS"))?)
            }
            MessageType::Publish => {
                let json = std::str::from_utf8(body).map_err(protocol("PUBLISH"))?;
                Message::Publish(Box::new(
                    Manifest::from_json(json).map_err(protocol("PUBLISH"))?,
                ))
            }
            MessageType::Announce => {
                Message::Announce(serde_json::from_slice(body).map_err(protocol("ANNOUNCE"))?)
            }
            MessageType::Ok => {
                if !body.is_empty() {
                    return Err(ChannelError::Protocol("OK carries no body".to_string()));
                }
                Message::Ok
            }
            MessageType::Error => {
                Message::Error(String::from_utf8(body.to_vec()).map_err(protocol("ERROR"))?)
            }
        })
    }
}
