//! The out-of-band transcription path.
//!
//! Final utterance transcripts leave the voice pipeline through a single
//! seam: a [`TranscriptionMessage`] published to the room's reliable data
//! channel. "Reliable" means the transport retries; delivery to any
//! particular subscriber is still best-effort.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use derive_more::derive::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Name of a hosted realtime room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, From, Into, Display, Serialize, Deserialize)]
pub struct RoomName(String);

impl RoomName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// The party an utterance is attributed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

/// Published once per logical utterance. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "transcription")]
pub struct TranscriptionMessage {
    pub sender: Speaker,
    pub text: String,
}

/// Publishes transcription messages out-of-band to the room.
#[async_trait]
pub trait TranscriptPublisher: fmt::Debug + Send + Sync {
    async fn publish(&self, message: &TranscriptionMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn transcription_message_serializes_with_type_tag() {
        let message = TranscriptionMessage {
            sender: Speaker::Agent,
            text: "Hello there".into(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({ "type": "transcription", "sender": "agent", "text": "Hello there" })
        );
    }

    #[test]
    fn speaker_uses_lowercase_names() {
        assert_eq!(serde_json::to_value(Speaker::User).unwrap(), json!("user"));
    }
}
