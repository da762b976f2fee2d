use axum::{
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use runtime::EngineHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn build_app(engine: EngineHandle) -> Router {
    api::app(engine)
        .route("/", get(dashboard))
        .route("/static/styles.css", get(styles))
        .route("/static/app.js", get(script))
        .route("/health", get(healthcheck))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthcheck() -> &'static str {
    "ok"
}

async fn dashboard() -> Html<&'static str> {
    Html(ui::index_html())
}

async fn styles() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], ui::styles_css())
}

async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        ui::app_js(),
    )
}
