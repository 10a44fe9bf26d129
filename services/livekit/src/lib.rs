//! LiveKit room access.
//!
//! Token minting and reliable data publishing both go through the server
//! APIs; the agent never joins a room as a media participant from here.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use livekit_api::{
    access_token::{AccessToken, VideoGrants},
    services::room::{RoomClient, SendDataOptions},
};
use livekit_protocol::data_packet;
use tracing::debug;

use quotevoice_core::{LiveKitConfig, RoomName, TranscriptPublisher, TranscriptionMessage};

/// Tokens are short-lived; clients re-request them per session.
const TOKEN_TTL: Duration = Duration::from_secs(6 * 3600);

/// Topic of the data messages carrying transcriptions.
pub const TRANSCRIPTION_TOPIC: &str = "transcription";

#[derive(Debug)]
pub struct RoomService {
    config: LiveKitConfig,
    room_client: RoomClient,
}

impl RoomService {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Mint a signed access token granting join, publish and subscribe rights
    /// scoped to one room.
    pub fn join_token(&self, room: &RoomName, identity: &str, name: &str) -> Result<String> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(identity)
            .with_name(name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room.as_str().to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(TOKEN_TTL);

        token.to_jwt().context("Signing room access token")
    }

    /// Bind a transcript sink to a single room. The sink lives exactly as
    /// long as the session that owns it.
    pub fn transcript_sink(self: &Arc<Self>, room: RoomName) -> RoomTranscriptSink {
        RoomTranscriptSink {
            service: self.clone(),
            room,
        }
    }
}

#[derive(Debug)]
pub struct RoomTranscriptSink {
    service: Arc<RoomService>,
    room: RoomName,
}

#[async_trait]
impl TranscriptPublisher for RoomTranscriptSink {
    async fn publish(&self, message: &TranscriptionMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let options = SendDataOptions {
            kind: data_packet::Kind::Reliable,
            topic: Some(TRANSCRIPTION_TOPIC.to_string()),
            ..Default::default()
        };
        self.service
            .room_client
            .send_data(self.room.as_str(), payload, options)
            .await
            .context("Publishing data message")?;
        debug!("Published transcription to `{}`", self.room);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> RoomService {
        RoomService::new(LiveKitConfig {
            url: "wss://example.livekit.cloud".into(),
            api_key: "devkey".into(),
            api_secret: "devsecret-devsecret-devsecret".into(),
        })
    }

    #[test]
    fn join_token_is_a_jwt() {
        let token = test_service()
            .join_token(&"voice-assistant".into(), "user", "user")
            .unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn join_tokens_differ_per_identity() {
        let service = test_service();
        let room = RoomName::from("voice-assistant");
        let a = service.join_token(&room, "alice", "alice").unwrap();
        let b = service.join_token(&room, "bob", "bob").unwrap();
        assert_ne!(a, b);
    }
}
