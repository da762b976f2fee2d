pub mod routes;
pub mod state;
mod ws;

use axum::Router;
use runtime::EngineHandle;

pub fn app(engine: EngineHandle) -> Router {
    routes::router(state::AppState::new(engine))
}
