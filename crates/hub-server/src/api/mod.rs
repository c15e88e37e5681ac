mod offer;
mod participants;
mod rtc;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Bundled browser client
    let assets = ServeDir::new(&state.config.static_dir).append_index_html_on_directories(true);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Signaling
        .route("/offer", post(offer::offer))
        .route("/api/rtc/ice-servers", get(rtc::get_ice_servers))
        // Introspection
        .route("/api/participants", get(participants::list_participants))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
