use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::attachments::OutgoingAttachment;
use crate::chat::{AttachmentMeta, ChatMessage, MessageRole};
use crate::logger;
use crate::session::{ChatSession, PendingFile, SessionMode, DEFAULT_SESSION_TITLE};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("remote store error: {message} (status: {status_code})")]
    Status { status_code: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn from_status(status_code: u16, message: &str) -> Self {
        Self::Status {
            status_code,
            message: message.to_string(),
        }
    }
}

/// Which user's sessions to operate on, and in which category.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: String,
    pub mode: SessionMode,
}

/// Untyped session shape as the remote store sends it. Everything beyond
/// the id is tolerated as missing and defaulted at the parse boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSession {
    pub session_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: RawSessionData,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSessionData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pending_files: Option<Vec<PendingFile>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachment: Option<RawAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAttachment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl RawAttachment {
    pub(crate) fn into_meta(self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.unwrap_or_default(),
            content_type: self.content_type.unwrap_or_default(),
            size: self.size.unwrap_or(0),
            url: self.url,
        }
    }
}

impl RawMessage {
    /// Typed message for the given position within its session. Raw
    /// messages carry no ids, so one is derived from the session id and
    /// the index, which is unique because order never changes.
    pub fn into_message(self, session_id: &str, index: usize) -> ChatMessage {
        let role = MessageRole::from_sender_tag(self.sender.as_deref().unwrap_or(""));
        ChatMessage {
            id: format!("{}-m{}", session_id, index),
            role,
            content: self.text.unwrap_or_default(),
            reasoning: None,
            is_reasoning_complete: role == MessageRole::Bot,
            is_loading: false,
            attachment: self.attachment.map(RawAttachment::into_meta),
            timestamp: self.timestamp,
        }
    }
}

impl RawSession {
    /// Parse/validate step at the boundary: malformed fields are
    /// defaulted rather than propagated inward.
    pub fn into_session(self, mode: SessionMode) -> ChatSession {
        let id = self.session_id;
        let title = self
            .data
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        let messages = self
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.into_message(&id, index))
            .collect();
        ChatSession {
            id,
            title,
            mode,
            messages,
            pending_files: self.data.pending_files.unwrap_or_default(),
            synthetic: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    #[serde(default)]
    sessions: Vec<RawSession>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    #[serde(default)]
    documents: Vec<PendingFile>,
}

#[derive(Debug, Deserialize)]
struct FollowUpsResponse {
    #[serde(rename = "followUpQuestions", default)]
    follow_up_questions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FilePayload {
    name: String,
    content_type: String,
    data: String,
}

impl FilePayload {
    fn from_outgoing(file: &OutgoingAttachment) -> Self {
        Self {
            name: file.meta.name.clone(),
            content_type: file.meta.content_type.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&file.bytes),
        }
    }
}

/// The remote session store as the sync controller sees it. Trait object
/// so tests can substitute doubles.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_sessions(&self, context: &SessionContext) -> Result<Vec<RawSession>, ApiError>;
    async fn create_session(&self, context: &SessionContext, name: &str) -> Result<String, ApiError>;
    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        user: &str,
        file: Option<&OutgoingAttachment>,
    ) -> Result<SendMessageResponse, ApiError>;
    async fn upload_document(
        &self,
        session_id: &str,
        file: &OutgoingAttachment,
    ) -> Result<(), ApiError>;
    async fn list_documents(&self, session_id: &str) -> Result<Vec<PendingFile>, ApiError>;
    async fn suggest_follow_ups(
        &self,
        topic: &str,
        previous_response: &str,
    ) -> Result<Vec<String>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("consulta-cli/1.0")
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            logger::warn(&format!("remote store returned {}: {}", status, body));
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_sessions(&self, context: &SessionContext) -> Result<Vec<RawSession>, ApiError> {
        let url = format!("{}/sessions", self.base_url);
        let mode = context.mode.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("user", context.user.as_str()), ("mode", mode.as_str())])
            .send()
            .await?;
        let parsed: SessionsResponse = Self::parse(response).await?;
        Ok(parsed.sessions)
    }

    async fn create_session(&self, context: &SessionContext, name: &str) -> Result<String, ApiError> {
        let url = format!("{}/sessions", self.base_url);
        let body = json!({
            "user": context.user,
            "mode": context.mode.to_string(),
            "name": name,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let parsed: CreateSessionResponse = Self::parse(response).await?;
        Ok(parsed.session_id)
    }

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        user: &str,
        file: Option<&OutgoingAttachment>,
    ) -> Result<SendMessageResponse, ApiError> {
        let url = format!("{}/sessions/{}/messages", self.base_url, session_id);
        let mut body = json!({
            "text": text,
            "user": user,
        });
        if let Some(file) = file {
            body["file"] = serde_json::to_value(FilePayload::from_outgoing(file))
                .map_err(|e| ApiError::Malformed(e.to_string()))?;
        }
        let response = self.client.post(&url).json(&body).send().await?;
        Self::parse(response).await
    }

    async fn upload_document(
        &self,
        session_id: &str,
        file: &OutgoingAttachment,
    ) -> Result<(), ApiError> {
        let url = format!("{}/sessions/{}/documents", self.base_url, session_id);
        let response = self
            .client
            .post(&url)
            .json(&FilePayload::from_outgoing(file))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn list_documents(&self, session_id: &str) -> Result<Vec<PendingFile>, ApiError> {
        let url = format!("{}/sessions/{}/documents", self.base_url, session_id);
        let response = self.client.get(&url).send().await?;
        let parsed: DocumentsResponse = Self::parse(response).await?;
        Ok(parsed.documents)
    }

    async fn suggest_follow_ups(
        &self,
        topic: &str,
        previous_response: &str,
    ) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/followups", self.base_url);
        let body = json!({
            "topic": topic,
            "previous_response": previous_response,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let parsed: FollowUpsResponse = Self::parse(response).await?;
        Ok(parsed.follow_up_questions)
    }
}
