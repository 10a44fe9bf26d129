//! Wires a speech dialog service to the media edge and the transcript relay.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    sync::mpsc::{Receiver, Sender, channel},
    task::JoinHandle,
};
use tracing::debug;

use quotevoice_core::{
    AudioFormat, AudioFrame, DialogSession, Input, Output, RealtimeConfig, Service,
    TranscriptPublisher,
};
use realtime_dialog::{Params, RealtimeDialog};

use crate::relay::TranscriptRelay;

/// Audio format spoken on both sides of the dialog.
pub const DIALOG_FORMAT: AudioFormat = realtime_dialog::REALTIME_AUDIO_FORMAT;

const CHANNEL_CAPACITY: usize = 256;

pub const ASSISTANT_INSTRUCTIONS: &str = "You are a helpful customer support assistant for GetMyQuotation, a platform that connects customers with verified suppliers for home interior and furniture needs.\n\nYour role is to:\n- Help customers understand how to get quotes for interior work and furniture\n- Explain the platform's features (verified suppliers, no spam, fast responses, 500+ suppliers across Delhi NCR)\n- Assist with questions about pricing, timelines, and services\n- Guide users to fill out the form to get rates from suppliers\n- Be friendly, concise, and helpful\n\nKeep responses conversational, natural, and under 100 words. Speak in a friendly, professional tone. Do not use complex formatting, emojis, asterisks, or other symbols in your speech.";

pub const GREETING_INSTRUCTIONS: &str = "Greet the user warmly and introduce yourself as a GetMyQuotation assistant. Offer to help them with home interior and furniture needs, and mention that you can help them get quotes from verified suppliers.";

/// What the media edge needs to act on. Final utterances never show up here,
/// they go through the relay instead.
#[derive(Debug)]
pub enum SessionEvent {
    Started,
    Audio { frame: AudioFrame },
    ClearAudio,
}

/// One assistant session. The handle feeds caller audio in, the driver pumps
/// service output until the dialog ends.
#[derive(Debug)]
pub struct AssistantSession;

impl AssistantSession {
    pub fn start(
        config: &RealtimeConfig,
        publisher: Arc<dyn TranscriptPublisher>,
    ) -> (SessionHandle, SessionDriver) {
        let mut params = Params::new(config.api_key.clone(), config.model.clone());
        params.instructions = Some(ASSISTANT_INSTRUCTIONS.into());
        params.greeting = Some(GREETING_INSTRUCTIONS.into());
        params.voice = config.voice.clone();
        Self::start_with(RealtimeDialog, params, publisher)
    }

    /// Generic over the service so tests can drive the session with a
    /// scripted dialog.
    pub fn start_with<S>(
        service: S,
        params: S::Params,
        publisher: Arc<dyn TranscriptPublisher>,
    ) -> (SessionHandle, SessionDriver)
    where
        S: Service + Send + Sync + 'static,
    {
        let (input_sender, input_receiver) = channel(CHANNEL_CAPACITY);
        let (output_sender, output_receiver) = channel(CHANNEL_CAPACITY);
        let session = DialogSession::new(DIALOG_FORMAT, input_receiver, output_sender);
        let task = tokio::spawn(async move { service.conversation(params, session).await });

        let handle = SessionHandle {
            input: input_sender,
        };
        let driver = SessionDriver {
            output: output_receiver,
            relay: TranscriptRelay::new(publisher),
            task,
        };
        (handle, driver)
    }
}

/// Posts caller input into the dialog. Dropping the last clone ends the
/// session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    input: Sender<Input>,
}

impl SessionHandle {
    pub fn post_audio(&self, frame: AudioFrame) -> Result<()> {
        Ok(self.input.try_send(Input::Audio { frame })?)
    }

    pub fn post_prompt(&self, text: impl Into<String>) -> Result<()> {
        Ok(self.input.try_send(Input::Prompt { text: text.into() })?)
    }
}

#[derive(Debug)]
pub struct SessionDriver {
    output: Receiver<Output>,
    relay: TranscriptRelay,
    task: JoinHandle<Result<()>>,
}

impl SessionDriver {
    /// Pumps dialog output until the service winds down. Audio and control
    /// events go to `events`, final utterances go through the relay.
    ///
    /// The service drops its output sender when the conversation ends, so
    /// draining the channel before joining the task never loses a buffered
    /// final utterance.
    pub async fn drive(self, events: Sender<SessionEvent>) -> Result<()> {
        let Self {
            mut output,
            mut relay,
            task,
        } = self;

        while let Some(output) = output.recv().await {
            match output {
                Output::SessionStarted => {
                    events.send(SessionEvent::Started).await?;
                }
                Output::Audio { frame } => {
                    events.send(SessionEvent::Audio { frame }).await?;
                }
                Output::ClearAudio => {
                    events.send(SessionEvent::ClearAudio).await?;
                }
                Output::FinalUtterance { speaker, text } => {
                    relay.relay(speaker, &text).await;
                }
            }
        }
        debug!("Dialog output closed");

        task.await.context("Dialog session task")?
    }
}
