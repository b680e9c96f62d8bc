pub mod protocol;
pub mod rest;
pub mod shell_ws;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

// Re-export the handlers to make them easily accessible
// to the binary that builds the web server router.
pub use rest::{
    access_state_handler, close_note_handler, download_handler, mock_test_complete_handler,
    navigation_handler, open_note_handler, practice_complete_handler, set_premium_handler,
    viewer_page_handler,
};
pub use shell_ws::shell_ws_handler;

/// Builds the host's router around the shared state.
pub fn router(app_state: Arc<state::AppState>) -> Router {
    Router::new()
        .route("/notes/{id}/open", post(open_note_handler).delete(close_note_handler))
        .route("/notes/{id}/download", post(download_handler))
        .route("/viewer/{id}", get(viewer_page_handler))
        .route("/viewer/{id}/navigation", post(navigation_handler))
        .route("/access", get(access_state_handler))
        .route("/access/premium", put(set_premium_handler))
        .route("/ads/practice-complete", post(practice_complete_handler))
        .route("/ads/mock-test-complete", post(mock_test_complete_handler))
        .route("/shell/ws", get(shell_ws_handler))
        .with_state(app_state)
}
