use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use common::crypto::PublicKey;
use common::manifest::Collection;

use crate::ServiceState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub public_key: PublicKey,
    /// sequence of the materialized manifest, if one has been received
    pub sequence: Option<u64>,
    pub collections: Vec<Collection>,
}

/// Every followed channel with its latest materialized content
#[tracing::instrument(skip(state))]
pub async fn list_handler(State(state): State<ServiceState>) -> Response {
    let peer = state.peer();
    let mut channels: Vec<ChannelSummary> = peer
        .subscriptions()
        .into_iter()
        .map(|public_key| match peer.channel(&public_key) {
            Some(view) => ChannelSummary {
                public_key,
                sequence: Some(view.sequence),
                collections: view.collections,
            },
            None => ChannelSummary {
                public_key,
                sequence: None,
                collections: Vec::new(),
            },
        })
        .collect();
    channels.sort_by_key(|channel| channel.public_key);

    (StatusCode::OK, Json(channels)).into_response()
}
