use axum::Router;

use crate::state::SharedState;

pub mod devices;
pub mod docs;
pub mod events;
pub mod extract;
pub mod health;
pub mod results;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(events::router())
        .merge(results::router())
        .merge(devices::router())
        .merge(sse::router())
        .merge(docs::router());

    api_router.with_state(state)
}
