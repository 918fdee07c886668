pub mod api;
pub mod config;
pub mod elevenlabs;
pub mod store;
pub mod twilio;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use config::Config;
use store::Store;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
}

/// Build the service router: the two handshake webhooks, the management
/// API, and a health check.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Twilio voice webhook
        .route("/twilio/voice", post(twilio::webhook::handle_voice))
        // ElevenLabs conversation-initiation webhook
        .route(
            "/elevenlabs/conversation-initiation",
            post(elevenlabs::webhook::handle_conversation_initiation),
        )
        // Phone assignment management (bearer auth)
        .route(
            "/api/phone-assignment/assign",
            post(api::assignment::handle_assign),
        )
        .route(
            "/api/phone-assignment/unassign",
            post(api::assignment::handle_unassign),
        )
        .route(
            "/api/phone-assignment/inbound",
            get(api::assignment::handle_list_inbound),
        )
        // Call log queries (bearer auth)
        .route("/api/calls", get(api::calls::handle_recent_calls))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
