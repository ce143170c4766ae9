//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a chat connection.
//! One connection is one visit to the chat screen: it is bound to a single
//! conversation, allows one model request in flight, and records its
//! foreground time when it closes.
//!
//! The socket itself only moves text. `run_session` owns the protocol and
//! works over any stream of client text and a channel of server frames.

use crate::web::{
    chat_task,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, ChatSession},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{future, SinkExt, Stream, StreamExt};
use luna_core::ports::PortError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Frames queued for the client. Reply tasks hold clones.
pub type FrameSender = mpsc::UnboundedSender<ServerMessage>;

pub const BUSY_MESSAGE: &str = "Please wait for Luna's reply.";
pub const NOT_FOUND_MESSAGE: &str = "Conversation not found.";
pub const CREATE_FAILED_MESSAGE: &str = "Failed to start a new chat.";

/// What a spawned reply task should ask the model for.
enum ReplyKind {
    Opening(Option<String>),
    Answer,
}

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New chat connection established.");
    let (mut sender, receiver) = socket.split();
    let (frames, mut outbox) = mpsc::unbounded_channel::<ServerMessage>();

    // The writer ends once the session and every reply task drop their sender.
    tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                warn!("Client went away while frames were pending.");
                break;
            }
        }
    });

    let incoming = receiver
        .take_while(|frame| {
            let open = match frame {
                Ok(Message::Close(_)) => {
                    info!("Client sent close message.");
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!("Chat connection error: {}", e);
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text.to_string()),
                _ => None,
            })
        });

    run_session(app_state, Box::pin(incoming), frames).await;
}

fn send_frame(frames: &FrameSender, frame: ServerMessage) -> bool {
    frames.send(frame).is_ok()
}

/// Drives one chat session until `incoming` ends or the server shuts down.
pub async fn run_session<S>(app_state: Arc<AppState>, mut incoming: S, frames: FrameSender)
where
    S: Stream<Item = String> + Unpin,
{
    // --- 1. Initialization Phase ---
    let (conversation_id, initial_prompt) = match incoming.next().await {
        Some(init_json) => match serde_json::from_str::<ClientMessage>(&init_json) {
            Ok(ClientMessage::Init {
                conversation_id,
                initial_prompt,
            }) => (conversation_id, initial_prompt),
            _ => {
                error!("First message was not a valid Init message.");
                return;
            }
        },
        None => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    let Some((conversation_id, opening_prompt)) = open_conversation(
        &app_state,
        &frames,
        conversation_id,
        initial_prompt.as_deref(),
    )
    .await
    else {
        return;
    };

    let mut session = ChatSession::new(&app_state, conversation_id);
    info!("Chat session bound to conversation {}", session.conversation_id);

    let init_frame = ServerMessage::SessionInitialized {
        conversation_id: session.conversation_id.clone(),
    };
    if !send_frame(&frames, init_frame) {
        error!("Failed to send session initialized message.");
        return;
    }

    let history = app_state
        .conversations
        .load_messages(&session.conversation_id)
        .await;
    let needs_opening = history.is_empty();
    if !send_frame(&frames, ServerMessage::History { messages: history }) {
        error!("Failed to send conversation history.");
        return;
    }

    // The opening is fetched here and nowhere else.
    if needs_opening && app_state.chat_model.is_some() {
        send_frame(&frames, ServerMessage::ReplyPending);
        spawn_reply(
            &app_state,
            &frames,
            &mut session,
            ReplyKind::Opening(opening_prompt),
        );
    }

    // --- 2. Main Message Loop ---
    let token = session.cancellation_token.clone();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Server is shutting down, closing chat connection.");
                break;
            }
            next = incoming.next() => match next {
                Some(text) => handle_text_message(text, &app_state, &frames, &mut session).await,
                None => {
                    info!("Client disconnected.");
                    break;
                }
            }
        }
    }

    // --- 3. Cleanup ---
    // A reply still in flight finishes on its own and is discarded.
    session.cancellation_token.cancel();
    let foreground = session.foreground(&app_state);
    app_state
        .progress
        .lock()
        .await
        .record_chat_time(foreground)
        .await;
    info!(
        "Chat connection for {} closed after {:?}.",
        session.conversation_id, foreground
    );
}

/// Resolves the conversation a connection is opening, creating one if needed.
/// Returns its id and the prompt to seed an opening message with.
async fn open_conversation(
    app_state: &AppState,
    frames: &FrameSender,
    conversation_id: Option<String>,
    initial_prompt: Option<&str>,
) -> Option<(String, Option<String>)> {
    match conversation_id {
        Some(id) => match app_state.conversations.summary(&id).await {
            Some(summary) => Some((summary.id, summary.initial_prompt)),
            None => {
                error!("Conversation {} does not exist.", id);
                send_frame(
                    frames,
                    ServerMessage::Error {
                        message: NOT_FOUND_MESSAGE.to_string(),
                    },
                );
                None
            }
        },
        None => match app_state.conversations.create_conversation(initial_prompt).await {
            Ok(summary) => Some((summary.id, initial_prompt.map(str::to_string))),
            Err(e) => {
                error!("Failed to create conversation: {}", e);
                send_frame(
                    frames,
                    ServerMessage::Error {
                        message: CREATE_FAILED_MESSAGE.to_string(),
                    },
                );
                None
            }
        },
    }
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: String,
    app_state: &Arc<AppState>,
    frames: &FrameSender,
    session: &mut ChatSession,
) {
    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Send { text }) => {
            if session.is_awaiting_reply() {
                send_frame(
                    frames,
                    ServerMessage::Error {
                        message: BUSY_MESSAGE.to_string(),
                    },
                );
                return;
            }

            match chat_task::post_user_message(app_state, &session.conversation_id, &text).await {
                Ok(message) => {
                    send_frame(frames, ServerMessage::Message { message });
                    send_frame(frames, ServerMessage::ReplyPending);
                    spawn_reply(app_state, frames, session, ReplyKind::Answer);
                }
                Err(e) => {
                    warn!("Rejected message for {}: {}", session.conversation_id, e);
                    send_frame(
                        frames,
                        ServerMessage::Error {
                            message: user_facing(&e),
                        },
                    );
                }
            }
        }
        Ok(ClientMessage::Init { .. }) => {
            warn!("Received subsequent Init message, which is ignored.");
        }
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
        }
    }
}

fn spawn_reply(
    app_state: &Arc<AppState>,
    frames: &FrameSender,
    session: &mut ChatSession,
    kind: ReplyKind,
) {
    let app_state = app_state.clone();
    let frames = frames.clone();
    let token = session.cancellation_token.clone();
    let conversation_id = session.conversation_id.clone();

    session.pending_reply = Some(tokio::spawn(async move {
        let reply = match kind {
            ReplyKind::Opening(prompt) => {
                chat_task::request_opening(&app_state, &conversation_id, prompt.as_deref(), &token)
                    .await
            }
            ReplyKind::Answer => {
                chat_task::request_reply(&app_state, &conversation_id, &token).await
            }
        };
        if let Some(message) = reply {
            if !send_frame(&frames, ServerMessage::Message { message }) {
                warn!("Failed to deliver reply for {}", conversation_id);
            }
        }
    }));
}

fn user_facing(e: &PortError) -> String {
    match e {
        PortError::Validation(message) => message.clone(),
        _ => "Something went wrong. Please try again.".to_string(),
    }
}
