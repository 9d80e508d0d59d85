use serde::{Deserialize, Serialize};

use crate::storage::BlobId;

/// A peer registering an address it can serve `blob_id` from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announce {
    pub blob_id: BlobId,
    /// `host:port` the announcing peer accepts connections on
    pub address: String,
}
