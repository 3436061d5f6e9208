//! Assistant chat backed by an OpenAI-compatible completion API (Groq).
//!
//! POST /ai/chat    - ask the assistant; both sides are stored as messages
//! GET  /ai/limiter - is the assistant globally enabled
//! POST /ai/limiter - admin-only global toggle

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use chatline_types::api::{AiChatRequest, AiChatResponse, ChatTurn, LimiterRequest, LimiterResponse};
use chatline_types::models::User;

use crate::config::GroqConfig;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::messages::deliver;
use crate::state::{AppState, blocking};

const AI_ENABLED_KEY: &str = "ai_enabled";

/// Roles accepted from client supplied history
const ALLOWED_ROLES: &[&str] = &["user", "assistant"];

const SYSTEM_PROMPT: &str = "You are the Chatline assistant, a friendly helper inside a chat app. \
Answer clearly and keep replies short unless the user asks for detail.";

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the assistant's reply text for the conversation.
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String>;
}

// -- Groq --

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

pub struct GroqClient {
    client: reqwest::Client,
    config: GroqConfig,
}

impl GroqClient {
    pub fn new(config: GroqConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CompletionClient for GroqClient {
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&CompletionRequest {
                model,
                messages,
                temperature: 0.7,
            })
            .send()
            .await
            .context("Completion API unreachable")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Completion API error ({}): {}", status, body);
        }

        let body: CompletionResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .context("Completion API returned no content")
    }
}

// -- Handlers --

async fn assistant_enabled(state: &AppState) -> Result<bool, ApiError> {
    let value = blocking(state, |db| db.get_setting(AI_ENABLED_KEY)).await?;
    Ok(value.as_deref() != Some("false"))
}

/// Build the prompt sent upstream and pick out the text to store as the user's message.
fn build_conversation(req: &AiChatRequest) -> Result<(Vec<ChatTurn>, String), ApiError> {
    let mut turns = vec![ChatTurn {
        role: "system".into(),
        content: SYSTEM_PROMPT.into(),
    }];

    if let Some(history) = req.messages.as_ref().filter(|m| !m.is_empty()) {
        turns.extend(
            history
                .iter()
                .filter(|t| ALLOWED_ROLES.contains(&t.role.as_str()) && !t.content.trim().is_empty())
                .cloned(),
        );
    }

    if let Some(prompt) = req.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        turns.push(ChatTurn {
            role: "user".into(),
            content: prompt.to_string(),
        });
    }

    let prompt = match turns.last() {
        Some(last) if last.role == "user" => last.content.trim().to_string(),
        _ => return Err(ApiError::validation("A prompt or a conversation ending with a user message is required")),
    };

    Ok((turns, prompt))
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<AiChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !assistant_enabled(&state).await? {
        return Err(ApiError::Unavailable("AI assistant is currently disabled".into()));
    }
    let Some(client) = state.assistant.clone() else {
        return Err(ApiError::Unavailable("AI assistant is not configured".into()));
    };
    if !user.ai_enabled {
        return Err(ApiError::forbidden("AI assistant is disabled for this account"));
    }

    let (turns, prompt) = build_conversation(&req)?;
    let model = req
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(state.config.default_model.as_str())
        .to_string();

    let content = ask(client, &model, &turns).await?;

    let assistant_id = state.config.assistant_id;
    let user_message = deliver(&state, user.id, assistant_id, Some(prompt), None).await?;
    let ai_message = deliver(&state, assistant_id, user.id, Some(content.clone()), None).await?;

    Ok(Json(AiChatResponse {
        success: true,
        content,
        user_message,
        ai_message,
    }))
}

async fn ask(client: Arc<dyn CompletionClient>, model: &str, turns: &[ChatTurn]) -> Result<String, ApiError> {
    client.complete(model, turns).await.map_err(|e| {
        warn!("Assistant completion failed: {:#}", e);
        ApiError::Internal(e)
    })
}

pub async fn get_limiter(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(LimiterResponse {
        success: true,
        enabled: assistant_enabled(&state).await?,
    }))
}

pub async fn set_limiter(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<LimiterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.is_admin(&user.email) {
        return Err(ApiError::forbidden("Admin access required"));
    }

    let value = if req.enabled { "true" } else { "false" };
    blocking(&state, move |db| db.set_setting(AI_ENABLED_KEY, value)).await?;
    info!("Assistant {} by {}", if req.enabled { "enabled" } else { "disabled" }, user.id);

    Ok(Json(LimiterResponse {
        success: true,
        enabled: req.enabled,
    }))
}

/// Create the assistant's user row if it does not exist yet.
pub fn seed_assistant(db: &chatline_db::Database, assistant_id: Uuid) -> Result<()> {
    let email = format!("assistant+{}@chatline.local", assistant_id.simple());
    if db.ensure_system_user(&assistant_id.to_string(), "Chatline Assistant", &email)? {
        info!("Seeded assistant user {}", assistant_id);
    }
    Ok(())
}
