use serde::{Deserialize, Serialize};

use quotevoice_core::RoomName;

/// Control events sent by the media edge over the agent websocket. Caller
/// audio arrives as binary PCM16-LE frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Start { room: RoomName },
    Stop,
}

/// Events sent back to the media edge as text frames; synthesized audio goes
/// out as binary frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    Started,
    /// Drop any buffered playback, the caller started speaking.
    ClearAudio,
    Error { message: String },
}
