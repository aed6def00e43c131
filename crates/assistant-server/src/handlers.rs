//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use assistant_core::{
    model::{thread_title, DEFAULT_THREAD_TITLE},
    toggle_reaction, AlertChannel, AlertRule, AssistantError, ChatService, MessageCategory,
    ModelInfo, NewAlertRule, NewMessage, Reaction, Role, SettingsUpdate, Thread, ThreadMessage,
    UserSettings,
};
use market_alerts::CheckSummary;

use crate::auth::AuthUser;
use crate::error::{ApiResult, JsonBody};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub alert_channels: Vec<AlertChannel>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub title: Option<String>,
    /// Used to derive the title when none is given
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub message_id: Uuid,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub provider: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<Uuid>,
    /// Chart screenshot or other image, as a URL or data URL
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub thread_id: Uuid,
    pub message: ThreadMessage,
}

// ============================================================================
// Health
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let notifier = state.alerts.notifier();
    let alert_channels = [AlertChannel::Email, AlertChannel::Telegram, AlertChannel::Chat]
        .into_iter()
        .filter(|c| notifier.is_configured(*c))
        .collect();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_kind,
        alert_channels,
    })
}

// ============================================================================
// Threads
// ============================================================================

pub async fn list_threads(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Thread>>> {
    Ok(Json(state.chats.list_threads(user.id()).await?))
}

pub async fn create_thread(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<Thread>)> {
    let title = match (payload.title, payload.message) {
        (Some(title), _) if !title.trim().is_empty() => title.trim().to_string(),
        (_, Some(message)) => thread_title(&message),
        _ => DEFAULT_THREAD_TITLE.to_string(),
    };

    let thread = state.chats.create_thread(user.id(), &title).await?;
    tracing::info!(thread_id = %thread.id, user_id = user.id(), "Thread created");
    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    user: AuthUser,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.chats.delete_thread(thread_id, user.id()).await? {
        return Err(AssistantError::NotFound("Chat thread".into()).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn owned_thread(state: &AppState, thread_id: Uuid, user_id: &str) -> ApiResult<Thread> {
    state
        .chats
        .get_thread(thread_id, user_id)
        .await?
        .ok_or_else(|| AssistantError::NotFound("Chat thread".into()).into())
}

// ============================================================================
// Messages
// ============================================================================

pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ThreadMessage>>> {
    let thread = owned_thread(&state, thread_id, user.id()).await?;
    Ok(Json(state.chats.list_messages(thread.id).await?))
}

/// Store a message verbatim, without calling the AI service
pub async fn append_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(thread_id): Path<Uuid>,
    JsonBody(payload): JsonBody<AppendMessageRequest>,
) -> ApiResult<(StatusCode, Json<ThreadMessage>)> {
    let role: Role = payload.role.parse()?;
    let category = match payload.category.as_deref() {
        Some(category) => category.parse()?,
        None => MessageCategory::default(),
    };
    if payload.content.trim().is_empty() {
        return Err(AssistantError::Validation("Message content is required".into()).into());
    }

    let thread = owned_thread(&state, thread_id, user.id()).await?;
    let message = NewMessage::new(thread.id, user.id(), role, payload.content)
        .with_image(payload.image)
        .with_category(category);

    let stored = state.chats.insert_message(message).await?;
    state.chats.touch_thread(thread.id).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn react_to_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<Uuid>,
    JsonBody(payload): JsonBody<ReactionRequest>,
) -> ApiResult<Json<ReactionResponse>> {
    let reactions =
        toggle_reaction(state.chats.as_ref(), message_id, user.id(), &payload.emoji).await?;
    Ok(Json(ReactionResponse { message_id, reactions }))
}

// ============================================================================
// Settings
// ============================================================================

async fn stored_settings(state: &AppState, user_id: &str) -> ApiResult<UserSettings> {
    Ok(state
        .accounts
        .get_settings(user_id)
        .await?
        .unwrap_or_else(|| UserSettings::new(user_id)))
}

/// Current settings with secrets masked
pub async fn get_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<UserSettings>> {
    let settings = stored_settings(&state, user.id()).await?;
    Ok(Json(settings.masked()))
}

pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(update): JsonBody<SettingsUpdate>,
) -> ApiResult<Json<UserSettings>> {
    let settings = state.accounts.update_settings(user.id(), &update).await?;
    tracing::info!(
        user_id = user.id(),
        provider = %settings.ai_provider.as_str(),
        "Settings updated"
    );
    Ok(Json(settings.masked()))
}

/// Try candidate credentials against the provider without saving them
///
/// The candidate is merged over the stored settings, so an empty body tests
/// what is already saved.
pub async fn check_credentials(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(candidate): JsonBody<SettingsUpdate>,
) -> ApiResult<Json<ConnectionTestResponse>> {
    let mut settings = stored_settings(&state, user.id()).await?;
    settings.apply(&candidate);

    let ai = state.ai.build(&settings)?;
    let success = ai.health_check().await?;
    tracing::info!(
        user_id = user.id(),
        provider = ai.name(),
        success,
        "Provider connection tested"
    );

    Ok(Json(ConnectionTestResponse {
        success,
        provider: ai.name().to_string(),
        model: ai.model().to_string(),
    }))
}

/// Models offered by the caller's provider
pub async fn list_provider_models(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ModelsResponse>> {
    let settings = stored_settings(&state, user.id()).await?;
    let ai = state.ai.build(&settings)?;
    let models = ai.list_models().await?;

    Ok(Json(ModelsResponse {
        provider: ai.name().to_string(),
        models,
    }))
}

// ============================================================================
// Chat
// ============================================================================

/// Run one exchange through the chat pipeline
///
/// The AI service is built per request from the caller's settings.
pub async fn chat_handler(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let settings = stored_settings(&state, user.id()).await?;

    let ai = state.ai.build(&settings)?;
    let service = ChatService::new(ai, state.chats.clone(), state.chat_config.clone());
    let reply = service
        .process_message_with_image(
            user.id(),
            &payload.message,
            payload.image.as_deref(),
            payload.thread_id,
        )
        .await?;

    Ok(Json(ChatResponse {
        thread_id: reply.thread_id,
        message: reply,
    }))
}

// ============================================================================
// Alerts
// ============================================================================

pub async fn list_alerts(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<AlertRule>>> {
    Ok(Json(state.alert_rules.list_alerts(user.id()).await?))
}

pub async fn create_alert(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(rule): JsonBody<NewAlertRule>,
) -> ApiResult<(StatusCode, Json<AlertRule>)> {
    let rule = state.alert_rules.create_alert(user.id(), rule).await?;
    tracing::info!(
        rule_id = %rule.id,
        coin = %rule.coin,
        condition = %rule.condition,
        "Alert rule created"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    user: AuthUser,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.alert_rules.delete_alert(alert_id, user.id()).await? {
        return Err(AssistantError::NotFound("Alert".into()).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Run an alert pass now instead of waiting for the scheduler
pub async fn check_alerts(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<CheckSummary>> {
    Ok(Json(state.alerts.check_alerts().await?))
}
