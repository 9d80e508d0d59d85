use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

use crate::channel::{ChannelError, PROTOCOL_VERSION};

/// Highest manifest sequence known per channel, gossiped on connect
pub type Sequences = HashMap<PublicKey, u64>;

/// First message on a connection, sent in both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub version: u32,
    #[serde(default)]
    pub sequences: Sequences,
}

impl Hello {
    pub fn new(sequences: Sequences) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequences,
        }
    }

    /// Versions must match exactly; there is no downgrade negotiation
    pub fn check_version(&self) -> Result<(), ChannelError> {
        if self.version != PROTOCOL_VERSION {
            return Err(ChannelError::Protocol(format!(
                "incompatible protocol version {} (expected {})",
                self.version, PROTOCOL_VERSION
            )));
        }
        Ok(())
    }
}
