//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use luna_core::{
    progress::{format_elapsed, percentage},
    CharacterLevel, ConversationSummary, Message, PortError, ProgressGoals, ProgressRecord,
    Scenario, Sender, SurveyAnswers, UserSettings, VocabularyEntry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_progress_handler,
        list_scenarios_handler,
        get_daily_handler,
        list_conversations_handler,
        create_conversation_handler,
        delete_conversation_handler,
        list_messages_handler,
        list_vocabulary_handler,
        add_vocabulary_handler,
        delete_vocabulary_handler,
        get_settings_handler,
        update_settings_handler,
        get_survey_handler,
        complete_survey_handler,
        set_character_level_handler,
        get_reminders_handler,
        set_reminders_handler,
    ),
    components(
        schemas(
            ProgressResponse, StudyDayResponse, GoalsResponse, GoalProgress,
            ScenarioResponse, DailyResponse, ConversationResponse, CreateConversationRequest,
            MessageResponse, VocabularyResponse, AddVocabularyRequest, SettingsBody,
            SurveyResponse, CompleteSurveyRequest, CharacterLevelRequest, RemindersBody,
        )
    ),
    tags(
        (name = "Luna API", description = "Progress, conversations, vocabulary and preferences for the Luna chat app.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudyDayResponse {
    pub date: NaiveDate,
    pub minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GoalProgress {
    pub value: u64,
    pub target: u64,
    /// Whole percent, capped at 100.
    pub percentage: u8,
}

impl GoalProgress {
    fn new(value: u64, target: u64) -> Self {
        Self {
            value,
            target,
            percentage: percentage(value, target),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GoalsResponse {
    pub points: GoalProgress,
    pub streak: GoalProgress,
    pub minutes: GoalProgress,
    pub messages: GoalProgress,
}

/// The reconciled home-screen metrics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub points: u64,
    pub streak: u64,
    pub word_count: u64,
    pub sent: u64,
    pub start_date: Option<DateTime<Utc>>,
    /// e.g. "3 hours 12 minutes"
    pub time_since_start: Option<String>,
    pub weekly_study_time: Vec<StudyDayResponse>,
    pub goals: GoalsResponse,
}

impl ProgressResponse {
    fn new(record: ProgressRecord, since_start: Option<chrono::Duration>) -> Self {
        let goals = ProgressGoals::default();
        let weekly_minutes = record.weekly_study_time.iter().map(|d| d.minutes).sum();
        Self {
            goals: GoalsResponse {
                points: GoalProgress::new(record.points, goals.points),
                streak: GoalProgress::new(record.streak, goals.streak),
                minutes: GoalProgress::new(weekly_minutes, goals.minutes),
                messages: GoalProgress::new(record.sent, goals.messages),
            },
            points: record.points,
            streak: record.streak,
            word_count: record.word_count,
            sent: record.sent,
            start_date: record.start_date,
            time_since_start: since_start.map(format_elapsed),
            weekly_study_time: record
                .weekly_study_time
                .into_iter()
                .map(|d| StudyDayResponse {
                    date: d.date,
                    minutes: d.minutes,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScenarioResponse {
    pub id: String,
    pub icon: String,
    pub text: String,
    pub prompt: String,
}

impl From<Scenario> for ScenarioResponse {
    fn from(s: Scenario) -> Self {
        Self {
            id: s.id,
            icon: s.icon,
            text: s.text,
            prompt: s.prompt,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DailyResponse {
    pub scenario: Option<ScenarioResponse>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationResponse {
    pub id: String,
    /// What the chat list shows: the scenario text, else the participant name.
    pub title: String,
    pub participant_name: String,
    pub last_message: String,
    pub timestamp: String,
    pub avatar_url: Option<String>,
    pub icon: Option<String>,
    pub initial_prompt: Option<String>,
}

impl From<ConversationSummary> for ConversationResponse {
    fn from(s: ConversationSummary) -> Self {
        Self {
            title: s.title().to_string(),
            id: s.id,
            participant_name: s.participant_name,
            last_message: s.last_message,
            timestamp: s.timestamp,
            avatar_url: s.avatar_url,
            icon: s.icon,
            initial_prompt: s.initial_prompt,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    /// A scenario prompt, or nothing for a free conversation.
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub text: String,
    /// "user" or "ai"
    pub sender: String,
    pub timestamp: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        let sender = match m.sender {
            Sender::User => "user",
            Sender::Ai => "ai",
        };
        Self {
            text: m.text,
            sender: sender.to_string(),
            timestamp: m.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VocabularyResponse {
    pub id: String,
    pub word: String,
    pub meaning: String,
}

impl From<VocabularyEntry> for VocabularyResponse {
    fn from(e: VocabularyEntry) -> Self {
        Self {
            id: e.id,
            word: e.word,
            meaning: e.meaning,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddVocabularyRequest {
    pub word: String,
    pub meaning: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettingsBody {
    pub username: Option<String>,
    pub profile_image_uri: Option<String>,
}

impl From<UserSettings> for SettingsBody {
    fn from(s: UserSettings) -> Self {
        Self {
            username: s.username,
            profile_image_uri: s.profile_image_uri,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SurveyResponse {
    pub completed: bool,
    /// One of "Level 1 romaji" .. "Level 4 also kanji".
    pub character_level: String,
    #[schema(value_type = Object)]
    pub answers: SurveyAnswers,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompleteSurveyRequest {
    #[schema(value_type = Object)]
    pub answers: SurveyAnswers,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CharacterLevelRequest {
    pub level: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemindersBody {
    pub enabled: bool,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

type HandlerError = (StatusCode, String);

/// Validation and not-found keep their message; anything else is logged and
/// replaced by `failure`.
fn port_failure(e: PortError, failure: &str) -> HandlerError {
    match e {
        PortError::Validation(message) => (StatusCode::BAD_REQUEST, message),
        PortError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        other => {
            error!("{}: {:?}", failure, other);
            (StatusCode::INTERNAL_SERVER_ERROR, failure.to_string())
        }
    }
}

//=========================================================================================
// Progress and Home Screen
//=========================================================================================

/// Reconcile and return the progress metrics.
#[utoipa::path(
    get,
    path = "/progress",
    responses((status = 200, description = "Current progress", body = ProgressResponse))
)]
pub async fn get_progress_handler(State(app_state): State<Arc<AppState>>) -> Json<ProgressResponse> {
    let (record, since_start) = {
        let mut engine = app_state.progress.lock().await;
        let record = engine.load().await;
        (record, engine.time_since_start())
    };
    Json(ProgressResponse::new(record, since_start))
}

/// List the built-in conversation scenarios.
#[utoipa::path(
    get,
    path = "/scenarios",
    responses((status = 200, description = "All scenarios", body = [ScenarioResponse]))
)]
pub async fn list_scenarios_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<Vec<ScenarioResponse>> {
    Json(
        app_state
            .catalog
            .all()
            .iter()
            .cloned()
            .map(ScenarioResponse::from)
            .collect(),
    )
}

/// Today's scenario and encouraging message.
#[utoipa::path(
    get,
    path = "/daily",
    responses((status = 200, description = "Today's picks", body = DailyResponse))
)]
pub async fn get_daily_handler(State(app_state): State<Arc<AppState>>) -> Json<DailyResponse> {
    Json(DailyResponse {
        scenario: app_state
            .daily
            .scenario_of_the_day()
            .await
            .map(ScenarioResponse::from),
        message: app_state.daily.message_of_the_day().await,
    })
}

//=========================================================================================
// Conversations
//=========================================================================================

/// List conversation summaries, newest first.
#[utoipa::path(
    get,
    path = "/conversations",
    responses((status = 200, description = "Conversation summaries", body = [ConversationResponse]))
)]
pub async fn list_conversations_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<Vec<ConversationResponse>> {
    Json(
        app_state
            .conversations
            .list_summaries()
            .await
            .into_iter()
            .map(ConversationResponse::from)
            .collect(),
    )
}

/// Start a conversation. Its opening message is fetched when the chat socket
/// first opens it with an empty history.
#[utoipa::path(
    post,
    path = "/conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = ConversationResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_conversation_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), HandlerError> {
    let summary = app_state
        .conversations
        .create_conversation(request.initial_prompt.as_deref())
        .await
        .map_err(|e| port_failure(e, "Failed to start a new chat."))?;

    Ok((StatusCode::CREATED, Json(summary.into())))
}

/// Delete a conversation and its messages.
#[utoipa::path(
    delete,
    path = "/conversations/{id}",
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 500, description = "Failed to delete chat.")
    )
)]
pub async fn delete_conversation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    app_state
        .conversations
        .delete_conversation(&id)
        .await
        .map_err(|e| port_failure(e, "Failed to delete chat."))?;
    Ok(StatusCode::NO_CONTENT)
}

/// The stored messages of one conversation, oldest first.
#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    params(("id" = String, Path, description = "Conversation id")),
    responses((status = 200, description = "Messages", body = [MessageResponse]))
)]
pub async fn list_messages_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<MessageResponse>> {
    Json(
        app_state
            .conversations
            .load_messages(&id)
            .await
            .into_iter()
            .map(MessageResponse::from)
            .collect(),
    )
}

//=========================================================================================
// Vocabulary
//=========================================================================================

#[utoipa::path(
    get,
    path = "/vocabulary",
    responses((status = 200, description = "Saved words", body = [VocabularyResponse]))
)]
pub async fn list_vocabulary_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<Vec<VocabularyResponse>> {
    Json(
        app_state
            .vocabulary
            .load_all()
            .await
            .into_iter()
            .map(VocabularyResponse::from)
            .collect(),
    )
}

#[utoipa::path(
    post,
    path = "/vocabulary",
    request_body = AddVocabularyRequest,
    responses(
        (status = 201, description = "Word saved", body = VocabularyResponse),
        (status = 400, description = "Word or meaning is empty"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn add_vocabulary_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<AddVocabularyRequest>,
) -> Result<(StatusCode, Json<VocabularyResponse>), HandlerError> {
    let entry = app_state
        .vocabulary
        .add(&request.word, &request.meaning)
        .await
        .map_err(|e| port_failure(e, "Failed to save vocabulary."))?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    delete,
    path = "/vocabulary/{id}",
    params(("id" = String, Path, description = "Vocabulary entry id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such entry"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_vocabulary_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    let removed = app_state
        .vocabulary
        .remove(&id)
        .await
        .map_err(|e| port_failure(e, "Failed to save vocabulary."))?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            "Vocabulary entry not found.".to_string(),
        ))
    }
}

//=========================================================================================
// Preferences
//=========================================================================================

#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Profile settings", body = SettingsBody))
)]
pub async fn get_settings_handler(State(app_state): State<Arc<AppState>>) -> Json<SettingsBody> {
    Json(app_state.preferences.user_settings().await.into())
}

#[utoipa::path(
    put,
    path = "/settings",
    request_body = SettingsBody,
    responses(
        (status = 200, description = "Settings saved", body = SettingsBody),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_settings_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SettingsBody>,
) -> Result<Json<SettingsBody>, HandlerError> {
    let settings = UserSettings {
        profile_image_uri: body.profile_image_uri,
        username: body.username,
    };
    app_state
        .preferences
        .save_user_settings(&settings)
        .await
        .map_err(|e| port_failure(e, "Failed to save settings."))?;
    Ok(Json(settings.into()))
}

async fn survey_response(app_state: &AppState) -> SurveyResponse {
    SurveyResponse {
        completed: app_state.preferences.has_completed_survey().await,
        character_level: app_state.preferences.character_level().await.label().to_string(),
        answers: app_state.preferences.survey_answers().await,
    }
}

#[utoipa::path(
    get,
    path = "/survey",
    responses((status = 200, description = "Survey state", body = SurveyResponse))
)]
pub async fn get_survey_handler(State(app_state): State<Arc<AppState>>) -> Json<SurveyResponse> {
    Json(survey_response(&app_state).await)
}

#[utoipa::path(
    post,
    path = "/survey",
    request_body = CompleteSurveyRequest,
    responses(
        (status = 200, description = "Survey completed", body = SurveyResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn complete_survey_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CompleteSurveyRequest>,
) -> Result<Json<SurveyResponse>, HandlerError> {
    app_state
        .preferences
        .complete_survey(&request.answers)
        .await
        .map_err(|e| port_failure(e, "Failed to save survey status."))?;
    Ok(Json(survey_response(&app_state).await))
}

#[utoipa::path(
    put,
    path = "/survey/level",
    request_body = CharacterLevelRequest,
    responses(
        (status = 200, description = "Level changed", body = SurveyResponse),
        (status = 400, description = "Unknown level"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn set_character_level_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CharacterLevelRequest>,
) -> Result<Json<SurveyResponse>, HandlerError> {
    let level = CharacterLevel::from_label(&request.level).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a character level", request.level),
        )
    })?;
    app_state
        .preferences
        .set_character_level(level)
        .await
        .map_err(|e| port_failure(e, "Failed to update character settings."))?;
    Ok(Json(survey_response(&app_state).await))
}

#[utoipa::path(
    get,
    path = "/reminders",
    responses((status = 200, description = "Reminder toggle", body = RemindersBody))
)]
pub async fn get_reminders_handler(State(app_state): State<Arc<AppState>>) -> Json<RemindersBody> {
    Json(RemindersBody {
        enabled: app_state.preferences.reminders_enabled().await,
    })
}

#[utoipa::path(
    put,
    path = "/reminders",
    request_body = RemindersBody,
    responses(
        (status = 200, description = "Reminder toggle saved", body = RemindersBody),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn set_reminders_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<RemindersBody>,
) -> Result<Json<RemindersBody>, HandlerError> {
    app_state
        .preferences
        .set_reminders_enabled(body.enabled)
        .await
        .map_err(|e| port_failure(e, "Failed to save reminder setting."))?;
    Ok(Json(body))
}
