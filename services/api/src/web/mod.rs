pub mod chat_task;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use ws_handler::ws_handler;

use axum::{
    routing::{delete, get, put},
    Router,
};
use rest::*;
use state::AppState;
use std::sync::Arc;

/// Every REST route plus the chat socket, bound to the shared state.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/progress", get(get_progress_handler))
        .route("/scenarios", get(list_scenarios_handler))
        .route("/daily", get(get_daily_handler))
        .route(
            "/conversations",
            get(list_conversations_handler).post(create_conversation_handler),
        )
        .route("/conversations/{id}", delete(delete_conversation_handler))
        .route("/conversations/{id}/messages", get(list_messages_handler))
        .route(
            "/vocabulary",
            get(list_vocabulary_handler).post(add_vocabulary_handler),
        )
        .route("/vocabulary/{id}", delete(delete_vocabulary_handler))
        .route(
            "/settings",
            get(get_settings_handler).put(update_settings_handler),
        )
        .route(
            "/survey",
            get(get_survey_handler).post(complete_survey_handler),
        )
        .route("/survey/level", put(set_character_level_handler))
        .route(
            "/reminders",
            get(get_reminders_handler).put(set_reminders_handler),
        )
        .route("/chat/ws", get(ws_handler))
        .with_state(app_state)
}
