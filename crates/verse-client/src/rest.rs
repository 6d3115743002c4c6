//! HTTP collaborators for a PostgREST-style hosted database.
//!
//! Row access goes through `/rest/v1/<table>`, attachments through
//! `/storage/v1/object/<bucket>/<path>`, and summaries through the web
//! app's summary endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use verse_shared::constants::{ATTACHMENTS_BUCKET, CHANNELS_TABLE, MESSAGES_TABLE};
use verse_shared::{
    Channel, ChannelId, ChatError, Message, MessageId, MessagePatch, NewChannel, NewMessage,
    VerseId,
};

use crate::collaborators::{BlobStorage, Persistence, SummaryTrigger};
use crate::config::ClientConfig;

/// Columns selected for messages, with the author profile joined.
const MESSAGE_SELECT: &str = "*,author:profiles(id,display_name,avatar_url)";

#[derive(Debug, Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    access_token: Option<String>,
    summary_url: String,
}

impl RestBackend {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.backend_url.clone(),
            anon_key: config.anon_key.clone(),
            access_token: None,
            summary_url: config.summary_url(),
        }
    }

    /// Act on behalf of a signed-in user instead of the anonymous key.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, ATTACHMENTS_BUCKET, path)
    }

    /// Public URL of an uploaded attachment.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, ATTACHMENTS_BUCKET, path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.anon_key {
            Some(key) => request.header("apikey", key),
            None => request,
        };
        match self.access_token.as_ref().or(self.anon_key.as_ref()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, String> {
        let response = checked(self.authorized(request).send().await).await?;
        response.json::<T>().await.map_err(|e| e.to_string())
    }

    /// POST a row and return the stored representation.
    async fn insert_row<B, T>(&self, table: &str, body: &B) -> Result<T, String>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = self
            .http
            .post(self.table_url(table))
            .query(&[("select", "*")])
            .header("Prefer", "return=representation")
            .json(body);
        let mut rows: Vec<T> = self.fetch(request).await?;
        if rows.is_empty() {
            return Err(format!("insert into {table} returned no row"));
        }
        Ok(rows.swap_remove(0))
    }
}

/// Turn transport errors and non-2xx statuses into an error string
/// carrying the response body.
async fn checked(result: reqwest::Result<Response>) -> Result<Response, String> {
    let response = result.map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    })
}

#[async_trait]
impl Persistence for RestBackend {
    async fn select_messages(&self, channel: ChannelId) -> Result<Vec<Message>, ChatError> {
        let request = self.http.get(self.table_url(MESSAGES_TABLE)).query(&[
            ("select", MESSAGE_SELECT.to_string()),
            ("channel_id", format!("eq.{channel}")),
            ("order", "created_at.asc".to_string()),
        ]);
        let messages: Vec<Message> = self.fetch(request).await.map_err(ChatError::Persistence)?;
        debug!(channel = %channel, count = messages.len(), "Selected messages");
        Ok(messages)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, ChatError> {
        self.insert_row(MESSAGES_TABLE, &message)
            .await
            .map_err(ChatError::Persistence)
    }

    async fn update_message(&self, id: &MessageId, patch: &MessagePatch) -> Result<(), ChatError> {
        let request = self
            .http
            .patch(self.table_url(MESSAGES_TABLE))
            .query(&[("id", format!("eq.{id}"))])
            .json(patch);
        checked(self.authorized(request).send().await)
            .await
            .map_err(ChatError::Persistence)?;
        Ok(())
    }

    async fn list_channels(&self, verse: VerseId) -> Result<Vec<Channel>, ChatError> {
        let request = self.http.get(self.table_url(CHANNELS_TABLE)).query(&[
            ("select", "*".to_string()),
            ("verse_id", format!("eq.{verse}")),
            ("order", "created_at.asc".to_string()),
        ]);
        self.fetch(request).await.map_err(ChatError::Persistence)
    }

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel, ChatError> {
        self.insert_row(CHANNELS_TABLE, &channel)
            .await
            .map_err(ChatError::Persistence)
    }
}

#[async_trait]
impl BlobStorage for RestBackend {
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String, ChatError> {
        let size = bytes.len();
        let request = self.http.post(self.object_url(path)).body(bytes);
        checked(self.authorized(request).send().await)
            .await
            .map_err(ChatError::Upload)?;
        debug!(path, size, "Uploaded attachment");
        Ok(self.public_url(path))
    }
}

#[async_trait]
impl SummaryTrigger for RestBackend {
    async fn request_summary(
        &self,
        channel: ChannelId,
        thread: Option<&MessageId>,
    ) -> Result<(), ChatError> {
        let request = self.http.post(&self.summary_url).json(&json!({
            "channelId": channel,
            "threadId": thread,
        }));
        checked(self.authorized(request).send().await)
            .await
            .map_err(ChatError::SummaryFailed)?;
        Ok(())
    }
}
