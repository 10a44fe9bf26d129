pub mod audio;
pub mod config;
pub mod dialog;
pub mod service;
pub mod transcript;

pub use audio::{AudioFormat, AudioFrame};
pub use config::{AzureOpenAiConfig, LiveKitConfig, RealtimeConfig};
pub use dialog::{DialogInput, DialogOutput, DialogSession, Input, Output};
pub use service::Service;
pub use transcript::{RoomName, Speaker, TranscriptPublisher, TranscriptionMessage};
