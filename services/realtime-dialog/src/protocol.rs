//! The slice of the realtime API protocol this service speaks.
//!
//! Only the events we produce and consume are modeled; everything else
//! deserializes into [`ServerEvent::Unhandled`] and is ignored.

use serde::{Deserialize, Serialize};

pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: SessionUpdate,
    },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseCreate>,
    },
}

#[derive(Debug, Default, Serialize)]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
}

/// Turn detection is delegated to the vendor.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad,
}

#[derive(Debug, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ResponseCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated { session: Session },
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { delta: String },
    #[serde(rename = "response.done")]
    ResponseDone { response: Response },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted { transcript: String },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(other)]
    Unhandled,
}

#[derive(Debug, Default, Deserialize)]
pub struct Session {
    pub input_audio_format: Option<String>,
    pub output_audio_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Response {
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<Item>,
}

#[derive(Debug, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub role: Option<String>,
    pub content: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub transcript: Option<String>,
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn session_update_serializes_with_dotted_type() {
        let event = ClientEvent::SessionUpdate {
            event_id: None,
            session: SessionUpdate {
                instructions: Some("be nice".into()),
                turn_detection: Some(TurnDetection::ServerVad),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "session.update",
                "session": {
                    "instructions": "be nice",
                    "turn_detection": { "type": "server_vad" }
                }
            })
        );
    }

    #[test]
    fn response_done_carries_assistant_transcripts() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "response.done",
            "event_id": "ev_1",
            "response": {
                "status": "completed",
                "output": [{
                    "id": "item_1",
                    "type": "message",
                    "role": "assistant",
                    "content": [{ "type": "audio", "transcript": "Hello!" }]
                }]
            }
        }))
        .unwrap();

        let ServerEvent::ResponseDone { response } = event else {
            panic!("expected response.done");
        };
        let item = &response.output[0];
        assert_eq!(item.role.as_deref(), Some("assistant"));
        let part = &item.content.as_ref().unwrap()[0];
        assert_eq!(part.transcript.as_deref(), Some("Hello!"));
    }

    #[test]
    fn speech_started_tolerates_extra_fields() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "input_audio_buffer.speech_started",
            "event_id": "ev_2",
            "audio_start_ms": 120
        }))
        .unwrap();
        assert!(matches!(event, ServerEvent::SpeechStarted));
    }

    #[test]
    fn unknown_events_fall_through() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "rate_limits.updated",
            "rate_limits": []
        }))
        .unwrap();
        assert!(matches!(event, ServerEvent::Unhandled));
    }
}
