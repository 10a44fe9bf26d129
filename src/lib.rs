mod protocol;
mod relay;
mod session;


pub use protocol::*;
pub use quotevoice_core::*;
pub use relay::{PRUNE_HORIZON, RecencyCache, SUPPRESS_WINDOW, TranscriptRelay, normalize};
pub use session::{
    ASSISTANT_INSTRUCTIONS, AssistantSession, DIALOG_FORMAT, GREETING_INSTRUCTIONS, SessionDriver,
    SessionEvent, SessionHandle,
};

pub mod services {
    pub use livekit_room::{RoomService, RoomTranscriptSink, TRANSCRIPTION_TOPIC};
    pub use realtime_dialog::RealtimeDialog;
}
