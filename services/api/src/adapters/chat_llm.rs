//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the conversation LLM.
//! It implements the `ChatModelService` port from the `core` crate against any
//! OpenAI-compatible chat completion endpoint (Gemini's by default).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use luna_core::{
    domain::Sender,
    ports::{ChatModelService, ChatRequest, PortError, PortResult},
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// The setup becomes the system turn; the history keeps its order.
fn to_request_messages(request: &ChatRequest) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    );

    for message in &request.history {
        let built: ChatCompletionRequestMessage = match message.sender {
            Sender::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.text.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            Sender::Ai => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.text.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        };
        messages.push(built);
    }
    Ok(messages)
}

//=========================================================================================
// `ChatModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatModelService for OpenAiChatAdapter {
    async fn reply(&self, request: &ChatRequest) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_request_messages(request)?)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // The client's error carries the HTTP status derived message.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PortError::Upstream("The model returned an empty reply.".to_string()))?;

        debug!("Model replied with {} characters", reply.chars().count());
        Ok(reply)
    }
}
