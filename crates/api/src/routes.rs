use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use runtime::EngineSnapshot;

use crate::{state::AppState, ws};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::events_socket))
        .route("/sessions", get(list_sessions))
        .with_state(state)
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<EngineSnapshot>, StatusCode> {
    state
        .engine()
        .snapshot()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}
