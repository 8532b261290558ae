use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Largest accepted request body (uploads included).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/session", get(handlers::get_session))
        .route("/session/sign_out", post(handlers::sign_out))
        .route("/memes", get(handlers::list_memes).post(handlers::upload_meme))
        .route("/memes/generate", post(handlers::generate_meme))
        .route("/memes/{id}/reactions/{kind}", post(handlers::toggle_reaction))
        .route("/templates", get(handlers::list_templates))
        .route("/templates/{id}/preview", get(handlers::preview_template))
        .route("/categories", get(handlers::list_categories))
        .route("/previews", post(handlers::create_preview))
        .route("/previews/{id}", get(handlers::take_preview))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
