use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use common::crypto::PublicKey;

use crate::ServiceState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    /// The node's channel key
    pub public_key: PublicKey,
    /// Address the peer accepts connections on
    pub address: String,
    pub gateway: bool,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let peer = state.peer();
    let identity = IdentityResponse {
        public_key: peer.public_key(),
        address: peer
            .external_address()
            .map(str::to_string)
            .unwrap_or_else(|| peer.local_address()),
        gateway: peer.is_gateway(),
    };
    (StatusCode::OK, Json(identity)).into_response()
}
