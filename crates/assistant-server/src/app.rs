//! Router

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    append_message, chat_handler, check_alerts, check_credentials, create_alert, create_thread,
    delete_alert, delete_thread, get_settings, health_check, list_alerts, list_messages,
    list_provider_models, list_threads, react_to_message, update_settings,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Threads & messages
        .route("/api/threads", get(list_threads).post(create_thread))
        .route("/api/threads/{id}", delete(delete_thread))
        .route("/api/threads/{id}/messages", get(list_messages).post(append_message))
        .route("/api/messages/{id}/reactions", post(react_to_message))
        // Settings
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/settings/test", post(check_credentials))
        .route("/api/settings/models", get(list_provider_models))
        // Chat pipeline
        .route("/api/chat", post(chat_handler))
        // Alerts
        .route("/api/alerts", get(list_alerts).post(create_alert))
        .route("/api/alerts/check", post(check_alerts))
        .route("/api/alerts/{id}", delete(delete_alert))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assistant_core::{
        AiService, AiServiceFactory, AssistantError, ChatStore, Completion, CompletionOptions,
        MemoryStore, Message, ModelInfo, Result, Role, SettingsUpdate, UserSettings,
    };
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use market_alerts::{AlertManager, ChatChannel, Indicators, MockMarketData, Notifier};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    /// Repeats the last message back
    struct EchoAi {
        healthy: bool,
    }

    #[async_trait]
    impl AiService for EchoAi {
        fn name(&self) -> &str {
            "Echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        async fn moderate_content(&self, text: &str) -> Result<bool> {
            Ok(text.contains("forbidden"))
        }

        async fn create_chat_completion(
            &self,
            messages: &[Message],
            _options: &CompletionOptions,
        ) -> Result<Completion> {
            let last = messages.last().cloned().unwrap_or_else(|| Message::user(""));
            let seen = if last.image.is_some() { " (with image)" } else { "" };
            Ok(Completion {
                role: Role::Assistant,
                content: format!("You said: {}{seen}", last.content),
                model: "echo-1".into(),
                usage: None,
            })
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(vec![ModelInfo {
                id: "echo-1".into(),
                name: "echo-1".into(),
                created: None,
                owned_by: None,
            }])
        }

        fn update_config(&mut self, _settings: &SettingsUpdate) {}

        async fn health_check(&self) -> Result<bool> {
            Ok(self.healthy)
        }
    }

    /// Requires an OpenAI key in the user's settings, like the real factory.
    /// The key `sk-revoked` builds but fails its health check.
    struct EchoFactory;

    impl AiServiceFactory for EchoFactory {
        fn build(&self, settings: &UserSettings) -> Result<Box<dyn AiService>> {
            let Some(key) = settings.openai_api_key.as_deref() else {
                return Err(AssistantError::ProviderConfig("OpenAI API key not found".into()));
            };
            Ok(Box::new(EchoAi {
                healthy: key != "sk-revoked",
            }))
        }
    }

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let market = MockMarketData::new().with_indicators(Indicators::new(
            "BTC",
            "46000".parse().unwrap(),
            "55".parse().unwrap(),
            "45800".parse().unwrap(),
        ));
        let notifier = Notifier::new().with_channel(Arc::new(ChatChannel::new(store.clone())));
        let alerts = Arc::new(AlertManager::new(store.clone(), Arc::new(market), notifier));
        let state = AppState::new(store.clone(), "memory", Arc::new(EchoFactory), alerts);
        (router(state), store)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "u1")
            .header("content-type", "application/json");
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn enable_ai(app: &Router) {
        let key = json!({"openaiApiKey": "sk-test-1234"});
        let (status, _) = send(app, "POST", "/api/settings", Some(key)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["store"], "memory");
        assert_eq!(body["alert_channels"], json!(["chat"]));
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/api/threads").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_thread_lifecycle() {
        let (app, _) = app();

        let (status, thread) = send(
            &app,
            "POST",
            "/api/threads",
            Some(json!({"message": "What do you think about Ethereum staking yields?"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(thread["title"], "What do you think about Ethere...");

        let (_, threads) = send(&app, "GET", "/api/threads", None).await;
        assert_eq!(threads.as_array().unwrap().len(), 1);

        let id = thread["id"].as_str().unwrap();
        let (status, _) = send(&app, "DELETE", &format!("/api/threads/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "DELETE", &format!("/api/threads/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_append_message_validates_role() {
        let (app, _) = app();
        let (_, thread) = send(&app, "POST", "/api/threads", Some(json!({}))).await;
        assert_eq!(thread["title"], "New Conversation");
        let uri = format!("/api/threads/{}/messages", thread["id"].as_str().unwrap());

        let robot = json!({"role": "robot", "content": "hi"});
        let (status, _) = send(&app, "POST", &uri, Some(robot)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, stored) = send(
            &app,
            "POST",
            &uri,
            Some(json!({"role": "system", "content": "Be brief.", "category": "advice"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stored["category"], "advice");

        let (_, messages) = send(&app, "GET", &uri, None).await;
        assert_eq!(messages.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_are_masked_and_unknown_keys_rejected() {
        let (app, _) = app();
        enable_ai(&app).await;

        let (status, settings) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settings["openaiApiKey"], "****1234");

        let unknown = json!({"walletSeed": "abc"});
        let (status, body) = send(&app, "POST", "/api/settings", Some(unknown)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_chat_without_credentials_is_provider_config_error() {
        let (app, store) = app();
        let chat = json!({"message": "Hello"});
        let (status, body) = send(&app, "POST", "/api/chat", Some(chat)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "PROVIDER_CONFIG");
        assert!(store.list_threads("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_creates_thread_and_stores_reply() {
        let (app, store) = app();
        enable_ai(&app).await;

        let chat = json!({"message": "Is BTC overbought?"});
        let (status, body) = send(&app, "POST", "/api/chat", Some(chat)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["content"], "You said: Is BTC overbought?");
        assert_eq!(body["message"]["role"], "assistant");

        let thread_id = body["thread_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(store.list_messages(thread_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_image_is_stored_and_forwarded() {
        let (app, store) = app();
        enable_ai(&app).await;

        let chat = json!({
            "message": "What pattern is this?",
            "image": "data:image/png;base64,iVBORw0KGgo="
        });
        let (status, body) = send(&app, "POST", "/api/chat", Some(chat)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["content"], "You said: What pattern is this? (with image)");

        let thread_id = body["thread_id"].as_str().unwrap().parse().unwrap();
        let stored = store.list_messages(thread_id).await.unwrap();
        assert_eq!(stored[0].image.as_deref(), Some("data:image/png;base64,iVBORw0KGgo="));
    }

    #[tokio::test]
    async fn test_connection_test_uses_candidate_without_saving() {
        let (app, _) = app();

        let (status, body) = send(&app, "POST", "/api/settings/test", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "PROVIDER_CONFIG");

        let candidate = json!({"openaiApiKey": "sk-candidate"});
        let (status, body) = send(&app, "POST", "/api/settings/test", Some(candidate)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["provider"], "Echo");

        let revoked = json!({"openaiApiKey": "sk-revoked"});
        let (_, body) = send(&app, "POST", "/api/settings/test", Some(revoked)).await;
        assert_eq!(body["success"], false);

        let (_, settings) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(settings["openaiApiKey"], Value::Null);
    }

    #[tokio::test]
    async fn test_model_listing_requires_credentials() {
        let (app, _) = app();

        let (status, _) = send(&app, "GET", "/api/settings/models", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        enable_ai(&app).await;
        let (status, body) = send(&app, "GET", "/api/settings/models", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provider"], "Echo");
        assert_eq!(body["models"][0]["id"], "echo-1");
    }

    #[tokio::test]
    async fn test_flagged_chat_is_unprocessable() {
        let (app, _) = app();
        enable_ai(&app).await;

        let (status, body) =
            send(&app, "POST", "/api/chat", Some(json!({"message": "something forbidden"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "CONTENT_REJECTED");
    }

    #[tokio::test]
    async fn test_reaction_toggles() {
        let (app, _) = app();
        enable_ai(&app).await;
        let (_, body) = send(&app, "POST", "/api/chat", Some(json!({"message": "Hi"}))).await;
        let message_id = body["message"]["id"].as_str().unwrap();
        let uri = format!("/api/messages/{message_id}/reactions");

        let (status, on) = send(&app, "POST", &uri, Some(json!({"emoji": "👍"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(on["reactions"].as_array().unwrap().len(), 1);

        let (_, off) = send(&app, "POST", &uri, Some(json!({"emoji": "👍"}))).await;
        assert!(off["reactions"].as_array().unwrap().is_empty());

        let missing = format!("/api/messages/{}/reactions", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "POST", &missing, Some(json!({"emoji": "👍"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alert_rule_crud_and_manual_check() {
        let (app, _) = app();

        let (status, rule) = send(
            &app,
            "POST",
            "/api/alerts",
            Some(json!({
                "coin": "btc",
                "condition": "price_above_once",
                "threshold": "45000",
                "channels": ["chat"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(rule["coin"], "BTC");

        let (status, summary) = send(&app, "POST", "/api/alerts/check", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["triggered"], 1);
        assert_eq!(summary["deactivated"], 1);

        let (_, threads) = send(&app, "GET", "/api/threads", None).await;
        assert_eq!(threads[0]["title"], "Price Alerts");

        let uri = format!("/api/alerts/{}", rule["id"].as_str().unwrap());
        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, rules) = send(&app, "GET", "/api/alerts", None).await;
        assert!(rules.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_condition_is_rejected() {
        let (app, _) = app();
        let (status, _) = send(
            &app,
            "POST",
            "/api/alerts",
            Some(json!({
                "coin": "BTC",
                "condition": "moon",
                "threshold": "1",
                "channels": ["chat"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
