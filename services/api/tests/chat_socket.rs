//! Runs the chat session loop over in-process channels instead of a socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, Json};
use chrono::Duration as ChronoDuration;
use futures::channel::mpsc as client;
use luna_api::{
    config::Config,
    web::{
        protocol::ServerMessage,
        rest::{create_conversation_handler, CreateConversationRequest},
        state::AppState,
        ws_handler::{run_session, BUSY_MESSAGE, NOT_FOUND_MESSAGE},
    },
};
use luna_core::{
    test_utils::{FixedClock, InstrumentedStore, ScriptedChatModel},
    ChatModelService, ChatRequest, Message, PortResult, Sender,
};
use serde_json::json;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};

/// Answers only after `gate` is notified.
#[derive(Default)]
struct GatedModel {
    gate: Notify,
}

#[async_trait]
impl ChatModelService for GatedModel {
    async fn reply(&self, _request: &ChatRequest) -> PortResult<String> {
        self.gate.notified().await;
        Ok("ゆっくりどうぞ".to_string())
    }
}

struct Client {
    input: client::UnboundedSender<String>,
    frames: mpsc::UnboundedReceiver<ServerMessage>,
    session: JoinHandle<()>,
}

impl Client {
    fn connect(state: Arc<AppState>) -> Self {
        let (input, incoming) = client::unbounded::<String>();
        let (outgoing, frames) = mpsc::unbounded_channel();
        Self {
            input,
            frames,
            session: tokio::spawn(run_session(state, incoming, outgoing)),
        }
    }

    fn send(&self, frame: serde_json::Value) {
        self.input.unbounded_send(frame.to_string()).unwrap();
    }

    async fn next(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(2), self.frames.recv())
            .await
            .expect("a frame in time")
            .expect("session still open")
    }

    /// Closes the client side and waits for the session to finish.
    async fn close(self) -> mpsc::UnboundedReceiver<ServerMessage> {
        drop(self.input);
        self.session.await.unwrap();
        self.frames
    }
}

fn state_with(model: Option<Arc<dyn ChatModelService>>, clock: Arc<FixedClock>) -> Arc<AppState> {
    Arc::new(AppState::new(
        Arc::new(Config::from_lookup(|_| None).unwrap()),
        Arc::new(InstrumentedStore::new()),
        clock,
        model,
    ))
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::local(2024, 5, 1, 19, 30, 9))
}

async fn conversation_with_history(state: &AppState) -> String {
    let id = state.conversations.create_conversation(None).await.unwrap().id;
    state
        .conversations
        .append_message(&id, Message::ai("こんばんは！", "19:00"))
        .await
        .unwrap();
    id
}

async fn expect_initialized(client: &mut Client, id: &str) -> Vec<Message> {
    match client.next().await {
        ServerMessage::SessionInitialized { conversation_id } => assert_eq!(conversation_id, id),
        other => panic!("expected session_initialized, got {:?}", other),
    }
    match client.next().await {
        ServerMessage::History { messages } => messages,
        other => panic!("expected history, got {:?}", other),
    }
}

#[tokio::test]
async fn second_send_while_waiting_is_rejected() {
    let model = Arc::new(GatedModel::default());
    let state = state_with(Some(model.clone() as Arc<dyn ChatModelService>), clock());
    let id = conversation_with_history(&state).await;

    let mut client = Client::connect(state.clone());
    client.send(json!({ "type": "init", "conversation_id": id }));
    assert_eq!(expect_initialized(&mut client, &id).await.len(), 1);

    client.send(json!({ "type": "send", "text": "今日は寒いですね" }));
    match client.next().await {
        ServerMessage::Message { message } => assert_eq!(message.sender, Sender::User),
        other => panic!("expected the user message, got {:?}", other),
    }
    assert!(matches!(client.next().await, ServerMessage::ReplyPending));

    client.send(json!({ "type": "send", "text": "もしもし？" }));
    match client.next().await {
        ServerMessage::Error { message } => assert_eq!(message, BUSY_MESSAGE),
        other => panic!("expected the busy error, got {:?}", other),
    }

    model.gate.notify_one();
    match client.next().await {
        ServerMessage::Message { message } => {
            assert_eq!(message.sender, Sender::Ai);
            assert_eq!(message.text, "ゆっくりどうぞ");
        }
        other => panic!("expected the reply, got {:?}", other),
    }

    client.close().await;
    let texts: Vec<_> = state
        .conversations
        .load_messages(&id)
        .await
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["こんばんは！", "今日は寒いですね", "ゆっくりどうぞ"]);
    assert_eq!(state.progress.lock().await.record().sent, 1);
}

#[tokio::test]
async fn closing_records_foreground_time() {
    let clock = clock();
    let state = state_with(None, clock.clone());
    let id = conversation_with_history(&state).await;

    let mut client = Client::connect(state.clone());
    client.send(json!({ "type": "init", "conversation_id": id }));
    expect_initialized(&mut client, &id).await;

    clock.advance(ChronoDuration::minutes(3));
    client.close().await;

    let record = state.progress.lock().await.record().clone();
    assert_eq!(record.weekly_study_time.last().map(|d| d.minutes), Some(3));
}

#[tokio::test]
async fn unknown_conversation_gets_an_error_and_closes() {
    let state = state_with(None, clock());

    let mut client = Client::connect(state.clone());
    client.send(json!({ "type": "init", "conversation_id": "missing" }));

    match client.next().await {
        ServerMessage::Error { message } => assert_eq!(message, NOT_FOUND_MESSAGE),
        other => panic!("expected an error frame, got {:?}", other),
    }
    // The session ends on its own and drops its side of the channel.
    let mut frames = client.close().await;
    assert!(frames.recv().await.is_none());
    assert!(state.conversations.list_summaries().await.is_empty());
}

#[tokio::test]
async fn existing_history_gets_no_opening() {
    let model = Arc::new(ScriptedChatModel::default());
    let state = state_with(Some(model.clone() as Arc<dyn ChatModelService>), clock());
    let id = conversation_with_history(&state).await;

    let mut client = Client::connect(state.clone());
    client.send(json!({ "type": "init", "conversation_id": id }));
    expect_initialized(&mut client, &id).await;

    let mut frames = client.close().await;
    assert!(frames.recv().await.is_none());
    assert!(model.requests().is_empty());
    assert_eq!(state.conversations.load_messages(&id).await.len(), 1);
}

#[tokio::test]
async fn conversation_created_over_rest_gets_one_opening() {
    let model = Arc::new(ScriptedChatModel::new(["いらっしゃいませ！"]));
    let state = state_with(Some(model.clone() as Arc<dyn ChatModelService>), clock());

    let (_, Json(created)) = create_conversation_handler(
        State(state.clone()),
        Json(CreateConversationRequest::default()),
    )
    .await
    .unwrap();
    tokio::task::yield_now().await;
    assert!(state.conversations.load_messages(&created.id).await.is_empty());

    let mut client = Client::connect(state.clone());
    client.send(json!({ "type": "init", "conversation_id": created.id }));
    assert!(expect_initialized(&mut client, &created.id).await.is_empty());
    assert!(matches!(client.next().await, ServerMessage::ReplyPending));
    match client.next().await {
        ServerMessage::Message { message } => assert_eq!(message.text, "いらっしゃいませ！"),
        other => panic!("expected the opening, got {:?}", other),
    }

    client.close().await;
    assert_eq!(model.requests().len(), 1);
    assert_eq!(state.conversations.load_messages(&created.id).await.len(), 1);
}
