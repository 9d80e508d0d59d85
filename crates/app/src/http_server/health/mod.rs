use axum::routing::get;
use axum::Router;

use crate::ServiceState;

mod identity;
mod liveness;
mod version;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/version", get(version::handler))
        .route("/identity", get(identity::handler))
        .with_state(state)
}
