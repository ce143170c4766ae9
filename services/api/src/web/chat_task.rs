//! services/api/src/web/chat_task.rs
//!
//! The chat session glue: turns user input plus stored history into a model
//! request and appends what comes back. Driven by the WebSocket session loop.

use crate::web::state::AppState;
use luna_core::{
    persona,
    ports::{ChatModelService, ChatRequest, PortError, PortResult},
    Message,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const EMPTY_INPUT_MESSAGE: &str = "Please enter a message.";
pub const MISSING_KEY_MESSAGE: &str = "API key is not set.";

fn require_model(app_state: &AppState) -> PortResult<Arc<dyn ChatModelService>> {
    app_state
        .chat_model
        .clone()
        .ok_or_else(|| PortError::Validation(MISSING_KEY_MESSAGE.to_string()))
}

async fn system_prompt(app_state: &AppState) -> String {
    let level = app_state.preferences.character_level().await;
    let name = app_state.preferences.display_name().await;
    persona::system_prompt(level, name.as_deref())
}

/// Validates and stores what the user typed, and counts it as sent.
///
/// Blank input and a missing API key are rejected before anything is written.
/// A failed write is returned and the message is not counted.
pub async fn post_user_message(
    app_state: &AppState,
    conversation_id: &str,
    text: &str,
) -> PortResult<Message> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PortError::Validation(EMPTY_INPUT_MESSAGE.to_string()));
    }
    require_model(app_state)?;

    let message = Message::user(text, app_state.conversations.timestamp());
    // The reply is built from stored history, so an unsaved turn stops here.
    app_state
        .conversations
        .append_message(conversation_id, message.clone())
        .await
        .map_err(|e| {
            error!("Failed to store user message in {}: {}", conversation_id, e);
            e
        })?;
    app_state.progress.lock().await.record_sent_message().await;

    Ok(message)
}

/// Asks the model to answer the conversation's full stored history.
pub async fn request_reply(
    app_state: &AppState,
    conversation_id: &str,
    token: &CancellationToken,
) -> Option<Message> {
    let model = match require_model(app_state) {
        Ok(model) => model,
        Err(e) => {
            warn!("Cannot request a reply for {}: {}", conversation_id, e);
            return None;
        }
    };

    let request = ChatRequest {
        system: system_prompt(app_state).await,
        history: app_state.conversations.load_messages(conversation_id).await,
    };
    complete(app_state, model.as_ref(), conversation_id, &request, token).await
}

/// Fetches the assistant's first message for a fresh conversation.
pub async fn request_opening(
    app_state: &AppState,
    conversation_id: &str,
    scenario_prompt: Option<&str>,
    token: &CancellationToken,
) -> Option<Message> {
    let model = match require_model(app_state) {
        Ok(model) => model,
        Err(_) => {
            warn!(
                "No API key configured, skipping the opening message for {}",
                conversation_id
            );
            return None;
        }
    };

    let request = ChatRequest {
        system: system_prompt(app_state).await,
        history: vec![Message::user(
            persona::opening_instruction(scenario_prompt),
            "",
        )],
    };
    complete(app_state, model.as_ref(), conversation_id, &request, token).await
}

/// Awaits the model and appends its answer, or the failure, as an `ai` message.
async fn complete(
    app_state: &AppState,
    model: &dyn ChatModelService,
    conversation_id: &str,
    request: &ChatRequest,
    token: &CancellationToken,
) -> Option<Message> {
    let started = Instant::now();
    let text = match model.reply(request).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Model request for {} failed: {}", conversation_id, e);
            format!("An error occurred: {}", e)
        }
    };

    if token.is_cancelled() {
        info!(
            "Session for {} closed before the reply arrived, discarding it",
            conversation_id
        );
        return None;
    }
    match app_state.conversations.find_summary(conversation_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            info!(
                "Conversation {} was deleted before the reply arrived, discarding it",
                conversation_id
            );
            return None;
        }
        Err(e) => warn!(
            "Could not confirm conversation {} still exists, keeping the reply: {}",
            conversation_id, e
        ),
    }

    let message = Message::ai(text, app_state.conversations.timestamp());
    if let Err(e) = app_state
        .conversations
        .append_message(conversation_id, message.clone())
        .await
    {
        error!("Failed to store reply in {}: {}", conversation_id, e);
    }
    info!("⏱️ Reply for {} took {:?}", conversation_id, started.elapsed());
    Some(message)
}
