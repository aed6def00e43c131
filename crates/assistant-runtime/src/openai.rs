//! OpenAI AI Service
//!
//! Talks to the chat-completions and moderation endpoints over plain HTTP.
//! On a quota or rate-limit error the request is replayed once with the
//! server-wide fallback key. Credentials are chosen per request, so a
//! fallback never sticks to later calls.

use std::time::Duration;

use assistant_core::{
    error::{AssistantError, Result},
    message::{Message, Role},
    model::{SettingsUpdate, UserSettings},
    provider::{AiService, Completion, CompletionOptions, ModelInfo, TokenUsage, DEFAULT_MODEL},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const QUOTA_ERRORS: [&str; 2] = ["insufficient_quota", "rate_limit_exceeded"];
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-wide OpenAI configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API root, without a trailing slash
    pub base_url: String,

    /// Key used when the user has none, and as the quota fallback
    pub fallback_api_key: Option<String>,

    /// Organization sent with the fallback key
    pub fallback_organization: Option<String>,

    /// Model used when the user has not selected one
    pub default_model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_API_BASE.into(),
            fallback_api_key: None,
            fallback_organization: None,
            default_model: DEFAULT_MODEL.into(),
            timeout_secs: 60,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            base_url: non_empty("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_API_BASE.into()),
            fallback_api_key: non_empty("OPENAI_API_KEY"),
            fallback_organization: non_empty("OPENAI_ORGANIZATION"),
            default_model: non_empty("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            timeout_secs: std::env::var("AI_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

/// One API key with its optional scoping headers
#[derive(Clone, Debug, PartialEq, Eq)]
struct Credential {
    api_key: String,
    organization: Option<String>,
    project: Option<String>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: WireContent<'a>,
}

/// Plain text, or text plus an image for vision models
#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'static str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        let content = match message.image.as_deref() {
            Some(url) if message.role == Role::User => WireContent::Parts(vec![
                ContentPart::Text {
                    text: &message.content,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url, detail: "high" },
                },
            ]),
            _ => WireContent::Text(&message.content),
        };

        Self {
            role: message.role.as_str(),
            content,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    role: Role,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<WireModel>,
}

#[derive(Deserialize)]
struct WireModel {
    id: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Map a failed response onto the error taxonomy
fn classify_error(status: StatusCode, body: &str) -> AssistantError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let err = envelope.error;
    let message = err
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"));

    let quota_tagged = [err.kind.as_deref(), err.code.as_deref()]
        .into_iter()
        .flatten()
        .any(|tag| QUOTA_ERRORS.contains(&tag));

    if status == StatusCode::TOO_MANY_REQUESTS
        || quota_tagged
        || message.to_lowercase().contains("quota")
    {
        AssistantError::ProviderQuotaExceeded(message)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        AssistantError::ProviderAuth(message)
    } else if status.is_server_error() {
        AssistantError::ProviderUnavailable(format!("OpenAI API error ({status}): {message}"))
    } else {
        AssistantError::Provider(format!("OpenAI API error ({status}): {message}"))
    }
}

fn missing_key() -> AssistantError {
    AssistantError::ProviderConfig("OpenAI API key is not configured".into())
}

fn transport_error(err: &reqwest::Error) -> AssistantError {
    if err.is_timeout() || err.is_connect() {
        AssistantError::ProviderUnavailable(err.to_string())
    } else {
        AssistantError::Provider(err.to_string())
    }
}

/// OpenAI-backed AI service for one user's settings
pub struct OpenAiService {
    http: reqwest::Client,
    config: OpenAiConfig,
    settings: UserSettings,
    model: String,
}

impl std::fmt::Debug for OpenAiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiService")
            .field("base_url", &self.config.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiService {
    /// Fails with `ProviderConfig` when neither the user nor the server has
    /// an API key
    pub fn new(
        http: reqwest::Client,
        config: OpenAiConfig,
        settings: &UserSettings,
    ) -> Result<Self> {
        let model = config.default_model.clone();
        let mut service = Self {
            http,
            config,
            settings: UserSettings::new(settings.user_id.clone()),
            model,
        };
        service.update_config(&settings.to_update());

        if service.primary_credential().is_none() {
            return Err(missing_key());
        }
        Ok(service)
    }

    fn primary_credential(&self) -> Option<Credential> {
        match &self.settings.openai_api_key {
            Some(key) => Some(Credential {
                api_key: key.clone(),
                organization: self.settings.openai_organization.clone(),
                project: self.settings.openai_project_id.clone(),
            }),
            None => self.server_credential(),
        }
    }

    /// Only offered when the user's own key was the one refused
    fn fallback_credential(&self) -> Option<Credential> {
        let user_key = self.settings.openai_api_key.as_ref()?;
        self.server_credential().filter(|c| &c.api_key != user_key)
    }

    fn server_credential(&self) -> Option<Credential> {
        self.config.fallback_api_key.as_ref().map(|key| Credential {
            api_key: key.clone(),
            organization: self.config.fallback_organization.clone(),
            project: None,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(
        request: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> reqwest::RequestBuilder {
        let mut request = request.bearer_auth(&credential.api_key);
        if let Some(org) = &credential.organization {
            request = request.header("OpenAI-Organization", org);
        }
        if let Some(project) = &credential.project {
            request = request.header("OpenAI-Project", project);
        }
        request
    }

    async fn parse<T>(response: reqwest::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AssistantError::Provider(format!("Invalid OpenAI response: {e}")))
    }

    async fn post_once<B, T>(&self, path: &str, body: &B, credential: &Credential) -> Result<T>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let request = self
            .http
            .post(self.endpoint(path))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(body);

        let response = Self::authorize(request, credential)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        Self::parse(response).await
    }

    /// POST with at most one replay against the fallback key
    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        let primary = self.primary_credential().ok_or_else(missing_key)?;

        match self.post_once(path, body, &primary).await {
            Err(AssistantError::ProviderQuotaExceeded(message)) => {
                let Some(fallback) = self.fallback_credential() else {
                    return Err(AssistantError::ProviderQuotaExceeded(message));
                };

                tracing::warn!(path, "OpenAI quota exceeded, retrying with fallback key");
                match self.post_once(path, body, &fallback).await {
                    Err(AssistantError::ProviderQuotaExceeded(_)) => {
                        Err(AssistantError::ProviderQuotaExceeded(
                            "API quota exceeded for both user and fallback keys".into(),
                        ))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}

#[async_trait]
impl AiService for OpenAiService {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn moderate_content(&self, text: &str) -> Result<bool> {
        let response: ModerationResponse = self
            .post("moderations", &serde_json::json!({ "input": text }))
            .await?;

        response
            .results
            .first()
            .map(|r| r.flagged)
            .ok_or_else(|| AssistantError::Provider("Empty moderation response".into()))
    }

    async fn create_chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let request = ChatRequest {
            model,
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::Provider("Empty response from AI service".into()))?;

        Ok(Completion {
            role: choice.message.role,
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let credential = self.primary_credential().ok_or_else(missing_key)?;
        let request = self
            .http
            .get(self.endpoint("models"))
            .timeout(Duration::from_secs(self.config.timeout_secs));

        let response = Self::authorize(request, &credential)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let list: ModelList = Self::parse(response).await?;

        // Chat-capable families only
        let mut models: Vec<ModelInfo> = list
            .data
            .into_iter()
            .filter(|m| m.id.contains("gpt"))
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                created: m.created,
                owned_by: m.owned_by,
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }

    fn update_config(&mut self, settings: &SettingsUpdate) {
        self.settings.apply(settings);
        self.model = self
            .settings
            .openai_model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
    }

    async fn health_check(&self) -> Result<bool> {
        let Some(credential) = self.primary_credential() else {
            return Ok(false);
        };

        let request = Self::authorize(self.http.get(self.endpoint("models")), &credential).send();

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, request).await {
            Ok(Ok(response)) => Ok(response.status().is_success()),
            Ok(Err(e)) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
            Err(_) => {
                tracing::warn!("OpenAI health check timed out");
                Ok(false)
            }
        }
    }
}
