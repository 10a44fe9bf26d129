//! The seam between a vendor speech pipeline and the rest of the system.
//!
//! ADR: Input and output are channels and the whole dialog is implemented as
//! a single async function per service. Stopping is done by dropping the
//! input sender; the service is expected to wind down and may still flush
//! final output events.

use anyhow::{Result, bail};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::{AudioFormat, AudioFrame, Speaker};

/// A single speech dialog between one caller and the assistant.
#[derive(Debug)]
pub struct DialogSession {
    format: AudioFormat,
    input: Receiver<Input>,
    output: Sender<Output>,
}

impl DialogSession {
    pub fn new(format: AudioFormat, input: Receiver<Input>, output: Sender<Output>) -> Self {
        Self {
            format,
            input,
            output,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn require_format(&self, expected: AudioFormat) -> Result<()> {
        if self.format != expected {
            bail!(
                "Audio has the wrong format {:?}, expected: {:?}",
                self.format,
                expected
            );
        }
        Ok(())
    }

    /// Start the dialog.
    pub fn start(self) -> Result<(DialogInput, DialogOutput)> {
        let input = DialogInput { input: self.input };
        let output = DialogOutput {
            output: self.output,
        };
        output.post(Output::SessionStarted)?;
        Ok((input, output))
    }
}

#[derive(Debug)]
pub struct DialogInput {
    input: Receiver<Input>,
}

impl DialogInput {
    pub async fn recv(&mut self) -> Option<Input> {
        self.input.recv().await
    }
}

#[derive(Debug)]
pub struct DialogOutput {
    output: Sender<Output>,
}

impl DialogOutput {
    pub fn audio_frame(&self, frame: AudioFrame) -> Result<()> {
        self.post(Output::Audio { frame })
    }

    pub fn clear_audio(&self) -> Result<()> {
        self.post(Output::ClearAudio)
    }

    /// Emit a final utterance transcript.
    ///
    /// This is the stable contract the transcription relay depends on;
    /// services must produce it from whatever final-transcript events their
    /// vendor officially supports.
    pub fn final_utterance(&self, speaker: Speaker, text: String) -> Result<()> {
        self.post(Output::FinalUtterance { speaker, text })
    }

    fn post(&self, output: Output) -> Result<()> {
        Ok(self.output.try_send(output)?)
    }
}

#[derive(Debug)]
pub enum Input {
    Audio {
        frame: AudioFrame,
    },
    /// Out-of-band instruction to generate a spoken reply.
    Prompt {
        text: String,
    },
}

#[derive(Debug)]
pub enum Output {
    SessionStarted,
    Audio { frame: AudioFrame },
    ClearAudio,
    FinalUtterance { speaker: Speaker, text: String },
}
