//! AI module: text generation through the host's edge function.

use rimori_bridge::Bridge;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::check;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct TextRequest<'a> {
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Clone)]
pub struct AiModule {
    bridge: Bridge,
    function: String,
}

impl AiModule {
    pub(crate) fn new(bridge: Bridge, function: String) -> Self {
        Self { bridge, function }
    }

    /// Complete a conversation and return the generated text.
    pub async fn get_text(&self, messages: &[Message]) -> Result<String, ClientError> {
        if messages.is_empty() {
            return Err(ClientError::InvalidPayload("no messages to complete".into()));
        }
        // Resolved per call so a refreshed token is always used.
        let client = self.bridge.data_client().await?;
        debug!(function = %self.function, messages = messages.len(), "requesting text");

        let resp = client
            .function(&self.function)?
            .json(&TextRequest { messages })
            .send()
            .await?;
        let body: TextResponse = check(resp).await?.json().await?;
        Ok(body.text)
    }
}
