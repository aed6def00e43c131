//! Postgres store
//!
//! `sqlx` implementation of the store traits over the schema in
//! `migrations/`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::{AccountStore, AlertStore, ChatStore};
use crate::alert::{ActiveAlert, AlertChannel, AlertCondition, AlertRule, NewAlertRule};
use crate::error::{AssistantError, Result};
use crate::model::{
    ChatLog, NewMessage, Reaction, SettingsUpdate, Thread, ThreadMessage, User, UserSettings,
};

impl From<sqlx::Error> for AssistantError {
    fn from(err: sqlx::Error) -> Self {
        AssistantError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AssistantError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AssistantError::Storage(format!("migration failed: {err}"))
    }
}

/// Postgres-backed implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = AssistantError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: AssistantError| {
        AssistantError::Storage(format!("bad {column} value '{raw}': {e}"))
    })
}

fn thread_from_row(row: &PgRow) -> Result<Thread> {
    Ok(Thread {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<ThreadMessage> {
    Ok(ThreadMessage {
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        user_id: row.try_get("user_id")?,
        role: parse_column(row, "role")?,
        content: row.try_get("content")?,
        image: row.try_get("image")?,
        category: parse_column(row, "category")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        reactions: Vec::new(),
    })
}

fn reaction_from_row(row: &PgRow) -> Result<Reaction> {
    Ok(Reaction {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        user_id: row.try_get("user_id")?,
        emoji: row.try_get("emoji")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn settings_from_row(row: &PgRow) -> Result<UserSettings> {
    Ok(UserSettings {
        user_id: row.try_get("user_id")?,
        ai_provider: parse_column(row, "ai_provider")?,
        openai_api_key: row.try_get("openai_api_key")?,
        openai_organization: row.try_get("openai_organization")?,
        openai_project_id: row.try_get("openai_project_id")?,
        openai_model: row.try_get("openai_model")?,
        ollama_endpoint: row.try_get("ollama_endpoint")?,
        ollama_model: row.try_get("ollama_model")?,
        trading_view_api_key: row.try_get("trading_view_api_key")?,
        telegram_bot_token: row.try_get("telegram_bot_token")?,
        telegram_chat_id: row.try_get("telegram_chat_id")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<AlertRule> {
    let condition: AlertCondition = parse_column(row, "condition")?;
    let channels: Vec<String> = row.try_get("channels")?;
    let channels = channels
        .iter()
        .map(|c| c.parse::<AlertChannel>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AssistantError::Storage(format!("bad channels value: {e}")))?;

    Ok(AlertRule {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        coin: row.try_get("coin")?,
        condition,
        threshold: row.try_get("threshold")?,
        channels,
        active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

const THREAD_COLUMNS: &str = "id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, thread_id, user_id, role, content, image, category, created_at";
const ALERT_COLUMNS: &str =
    "id, user_id, coin, condition, threshold, channels, is_active, created_at, updated_at";

#[async_trait]
impl ChatStore for PgStore {
    async fn create_thread(&self, user_id: &str, title: &str) -> Result<Thread> {
        let thread = Thread::new(user_id, title);
        sqlx::query(
            r#"
            INSERT INTO threads (id, user_id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(thread.id)
        .bind(&thread.user_id)
        .bind(&thread.title)
        .bind(thread.created_at)
        .bind(thread.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: Uuid, user_id: &str) -> Result<Option<Thread>> {
        let row = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1 AND user_id = $2"
        ))
        .bind(thread_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(thread_from_row).transpose()
    }

    async fn find_thread_by_title(&self, user_id: &str, title: &str) -> Result<Option<Thread>> {
        let row = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE user_id = $1 AND title = $2 \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(user_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(thread_from_row).transpose()
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<Thread>> {
        let rows = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(thread_from_row).collect()
    }

    async fn delete_thread(&self, thread_id: Uuid, user_id: &str) -> Result<bool> {
        // Messages and reactions go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM threads WHERE id = $1 AND user_id = $2")
            .bind(thread_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_thread(&self, thread_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE threads SET updated_at = now() WHERE id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AssistantError::NotFound("Chat thread".into()));
        }
        Ok(())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<ThreadMessage> {
        let record = message.into_record();
        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (id, thread_id, user_id, role, content, image, category, created_at)
            SELECT $1, t.id, $3, $4, $5, $6, $7, $8 FROM threads t WHERE t.id = $2
            "#,
        )
        .bind(record.id)
        .bind(record.thread_id)
        .bind(&record.user_id)
        .bind(record.role.as_str())
        .bind(&record.content)
        .bind(&record.image)
        .bind(record.category.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AssistantError::NotFound("Chat thread".into()));
        }
        Ok(record)
    }

    async fn recent_messages(&self, thread_id: Uuid, limit: usize) -> Result<Vec<ThreadMessage>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT *, seq AS ord FROM messages WHERE thread_id = $1 ORDER BY seq DESC LIMIT $2
            ) recent
            ORDER BY ord ASC
            "#
        ))
        .bind(thread_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn list_messages(&self, thread_id: Uuid) -> Result<Vec<ThreadMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = $1 ORDER BY seq ASC"
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        let mut messages = rows.iter().map(message_from_row).collect::<Result<Vec<_>>>()?;

        let reaction_rows = sqlx::query(
            r#"
            SELECT r.id, r.message_id, r.user_id, r.emoji, r.created_at
            FROM reactions r JOIN messages m ON m.id = r.message_id
            WHERE m.thread_id = $1
            ORDER BY r.created_at ASC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for row in &reaction_rows {
            let reaction = reaction_from_row(row)?;
            by_message.entry(reaction.message_id).or_default().push(reaction);
        }
        for message in &mut messages {
            message.reactions = by_message.remove(&message.id).unwrap_or_default();
        }
        Ok(messages)
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> Result<Vec<Reaction>> {
        let mut tx = self.pool.begin().await?;

        let accessible = sqlx::query(
            r#"
            SELECT m.id FROM messages m JOIN threads t ON t.id = m.thread_id
            WHERE m.id = $1 AND t.user_id = $2
            FOR SHARE
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if accessible.is_none() {
            return Err(AssistantError::NotFound("Message".into()));
        }

        let removed = sqlx::query(
            "DELETE FROM reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            // The unique constraint settles concurrent inserts of the same triple
            sqlx::query(
                r#"
                INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
                VALUES ($1, $2, $3, $4, now())
                ON CONFLICT (message_id, user_id, emoji) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(message_id)
            .bind(user_id)
            .bind(emoji)
            .execute(&mut *tx)
            .await?;
        }

        let rows = sqlx::query(
            "SELECT id, message_id, user_id, emoji, created_at FROM reactions \
             WHERE message_id = $1 ORDER BY created_at ASC",
        )
        .bind(message_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter().map(reaction_from_row).collect()
    }

    async fn append_chat_log(&self, entry: ChatLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_logs (id, user_id, input, output, model, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.input)
        .bind(&entry.output)
        .bind(&entry.model)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(User {
                id: r.try_get("id")?,
                email: r.try_get("email")?,
                name: r.try_get("name")?,
                created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn upsert_user(&self, user: User) -> Result<User> {
        let r = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET email = COALESCE(EXCLUDED.email, users.email),
                name = COALESCE(EXCLUDED.name, users.name)
            RETURNING id, email, name, created_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            id: r.try_get("id")?,
            email: r.try_get("email")?,
            name: r.try_get("name")?,
            created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    async fn get_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let row = sqlx::query("SELECT * FROM user_settings WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(settings_from_row).transpose()
    }

    async fn update_settings(
        &self,
        user_id: &str,
        update: &SettingsUpdate,
    ) -> Result<UserSettings> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query("SELECT * FROM user_settings WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut settings = match current.as_ref() {
            Some(row) => settings_from_row(row)?,
            None => UserSettings::new(user_id),
        };
        settings.apply(update);

        sqlx::query(
            r#"
            INSERT INTO user_settings (
                user_id, ai_provider, openai_api_key, openai_organization, openai_project_id,
                openai_model, ollama_endpoint, ollama_model, trading_view_api_key,
                telegram_bot_token, telegram_chat_id, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
            ON CONFLICT (user_id) DO UPDATE SET
                ai_provider = EXCLUDED.ai_provider,
                openai_api_key = EXCLUDED.openai_api_key,
                openai_organization = EXCLUDED.openai_organization,
                openai_project_id = EXCLUDED.openai_project_id,
                openai_model = EXCLUDED.openai_model,
                ollama_endpoint = EXCLUDED.ollama_endpoint,
                ollama_model = EXCLUDED.ollama_model,
                trading_view_api_key = EXCLUDED.trading_view_api_key,
                telegram_bot_token = EXCLUDED.telegram_bot_token,
                telegram_chat_id = EXCLUDED.telegram_chat_id,
                updated_at = now()
            "#,
        )
        .bind(&settings.user_id)
        .bind(settings.ai_provider.as_str())
        .bind(&settings.openai_api_key)
        .bind(&settings.openai_organization)
        .bind(&settings.openai_project_id)
        .bind(&settings.openai_model)
        .bind(&settings.ollama_endpoint)
        .bind(&settings.ollama_model)
        .bind(&settings.trading_view_api_key)
        .bind(&settings.telegram_bot_token)
        .bind(settings.telegram_chat_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(settings)
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn create_alert(&self, user_id: &str, rule: NewAlertRule) -> Result<AlertRule> {
        let rule = rule.validate()?.into_rule(user_id);
        let channels: Vec<&str> = rule.channels.iter().map(AlertChannel::as_str).collect();

        sqlx::query(
            r#"
            INSERT INTO alert_rules (
                id, user_id, coin, condition, threshold, channels,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.user_id)
        .bind(&rule.coin)
        .bind(rule.condition.to_string())
        .bind(rule.threshold)
        .bind(&channels)
        .bind(rule.active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(rule)
    }

    async fn list_alerts(&self, user_id: &str) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert_rules WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn delete_alert(&self, alert_id: Uuid, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1 AND user_id = $2")
            .bind(alert_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_alerts(&self) -> Result<Vec<ActiveAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.user_id, a.coin, a.condition, a.threshold, a.channels, a.is_active,
                   a.created_at, a.updated_at,
                   u.email AS user_email, u.name AS user_name, u.created_at AS user_created_at
            FROM alert_rules a JOIN users u ON u.id = a.user_id
            WHERE a.is_active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut alerts = Vec::with_capacity(rows.len());
        for row in &rows {
            // A malformed row must not hide the remaining rules
            let rule = match alert_from_row(row) {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed alert rule");
                    continue;
                }
            };
            let user = User {
                id: rule.user_id.clone(),
                email: row.try_get("user_email")?,
                name: row.try_get("user_name")?,
                created_at: row.try_get::<DateTime<Utc>, _>("user_created_at")?,
            };
            alerts.push((rule, user));
        }

        let user_ids: Vec<String> = alerts.iter().map(|(rule, _)| rule.user_id.clone()).collect();
        let settings_rows = sqlx::query("SELECT * FROM user_settings WHERE user_id = ANY($1)")
            .bind(&user_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut settings: HashMap<String, UserSettings> = HashMap::new();
        for row in &settings_rows {
            let s = settings_from_row(row)?;
            settings.insert(s.user_id.clone(), s);
        }

        Ok(alerts
            .into_iter()
            .map(|(rule, user)| ActiveAlert {
                settings: settings.get(&rule.user_id).cloned(),
                rule,
                user,
            })
            .collect())
    }

    async fn deactivate_alert(&self, alert_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE alert_rules SET is_active = FALSE, updated_at = now() \
             WHERE id = $1 AND is_active = TRUE",
        )
        .bind(alert_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
