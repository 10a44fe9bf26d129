//! Hosted realtime speech dialog.
//!
//! STT, turn detection, response generation and speech synthesis are all
//! delegated to the vendor's realtime API over a websocket; this service only
//! moves audio and surfaces final transcripts through the dialog seam.

pub mod protocol;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::prelude::*;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, select};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Bytes,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message,
    },
};
use tracing::{debug, info, trace};
use uuid::Uuid;

use protocol::{
    AUDIO_FORMAT_PCM16, ClientEvent, InputAudioTranscription, ResponseCreate, ServerEvent, Session,
    SessionUpdate, TurnDetection,
};
use quotevoice_core::{
    AudioFormat, AudioFrame, DialogInput, DialogOutput, DialogSession, Input, Service, Speaker,
    audio,
};

/// The realtime API only speaks mono PCM16 at 24 kHz.
pub const REALTIME_AUDIO_FORMAT: AudioFormat = AudioFormat::new(1, 24000);

const DEFAULT_HOST: &str = "wss://api.openai.com/v1/realtime";
const TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Clone)]
pub struct Params {
    pub api_key: String,
    pub model: String,
    pub host: Option<String>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
    /// Spoken once at session start, before the caller says anything.
    pub greeting: Option<String>,
}

impl Params {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            host: None,
            instructions: None,
            voice: None,
            greeting: None,
        }
    }
}

#[derive(Debug)]
pub struct RealtimeDialog;

#[async_trait]
impl Service for RealtimeDialog {
    type Params = Params;

    async fn conversation(&self, params: Params, session: DialogSession) -> Result<()> {
        session.require_format(REALTIME_AUDIO_FORMAT)?;

        let host = params.host.as_deref().unwrap_or(DEFAULT_HOST);
        info!("Connecting to {host}");
        let mut client = connect(host, &params.api_key, &params.model).await?;
        info!("Client connected");

        let (input, output) = session.start()?;
        client.dialog(params, input, output).await
    }
}

async fn connect(host: &str, api_key: &str, model: &str) -> Result<Client> {
    let url = format!("{host}?model={model}");
    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))?,
    );
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (stream, _) = connect_async(request)
        .await
        .context("Connecting to the realtime API")?;
    let (write, read) = stream.split();
    Ok(Client { read, write })
}

struct Client {
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
}

impl Client {
    /// Run the speech dialog until the input channel closes or the vendor
    /// ends the stream.
    async fn dialog(
        &mut self,
        params: Params,
        mut input: DialogInput,
        output: DialogOutput,
    ) -> Result<()> {
        // Wait for the created event.
        let message = self.read.next().await;
        Self::verify_session_created(message)?;
        debug!("Session created");

        self.send_client_event(ClientEvent::SessionUpdate {
            event_id: Some(Uuid::new_v4().to_string()),
            session: SessionUpdate {
                instructions: params.instructions.clone(),
                voice: params.voice.clone(),
                input_audio_format: Some(AUDIO_FORMAT_PCM16.into()),
                output_audio_format: Some(AUDIO_FORMAT_PCM16.into()),
                turn_detection: Some(TurnDetection::ServerVad),
                input_audio_transcription: Some(InputAudioTranscription {
                    model: TRANSCRIPTION_MODEL.into(),
                }),
            },
        })
        .await?;
        debug!("Session updated");

        if let Some(greeting) = &params.greeting {
            self.send_prompt(greeting).await?;
        }

        loop {
            select! {
                input = input.recv() => {
                    if let Some(input) = input {
                        self.process_input(input).await?;
                    } else {
                        // No more audio, end the session.
                        break;
                    }
                }

                message = self.read.next() => {
                    match message {
                        Some(Ok(message)) => {
                            match self.process_message(message, &output)? {
                                FlowControl::End => { break; }
                                FlowControl::PongAndContinue(payload) => {
                                    self.write.send(Message::Pong(payload)).await?;
                                }
                                FlowControl::Continue => {}
                            }
                        }
                        Some(Err(e)) => {
                            bail!(e)
                        }
                        None => {
                            // End of stream.
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn verify_session_created(
        message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Result<()> {
        let Some(message) = message else {
            bail!("Failed to receive the initial message");
        };

        let Message::Text(message) = message? else {
            bail!("Failed to receive the initial message");
        };

        let initial = serde_json::from_str(&message)?;
        let ServerEvent::SessionCreated { session } = initial else {
            bail!("Failed to receive the session created event");
        };

        let Session {
            input_audio_format,
            output_audio_format,
        } = session;

        if input_audio_format.as_deref() != Some(AUDIO_FORMAT_PCM16) {
            bail!(
                "Unexpected input audio format: {:?}, expected {:?}",
                input_audio_format,
                AUDIO_FORMAT_PCM16
            )
        }

        if output_audio_format.as_deref() != Some(AUDIO_FORMAT_PCM16) {
            bail!(
                "Unexpected output audio format: {:?}, expected {:?}",
                output_audio_format,
                AUDIO_FORMAT_PCM16
            )
        }

        Ok(())
    }

    async fn process_input(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Audio { frame } => self.send_frame(frame).await,
            Input::Prompt { text } => self.send_prompt(&text).await,
        }
    }

    async fn send_frame(&mut self, frame: AudioFrame) -> Result<()> {
        let samples_le = audio::to_le_bytes(&frame.samples);
        self.send_client_event(ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(samples_le),
        })
        .await
    }

    async fn send_prompt(&mut self, instructions: &str) -> Result<()> {
        self.send_client_event(ClientEvent::ResponseCreate {
            event_id: Some(Uuid::new_v4().to_string()),
            response: Some(ResponseCreate {
                instructions: Some(instructions.into()),
            }),
        })
        .await
    }

    async fn send_client_event(&mut self, client_event: ClientEvent) -> Result<()> {
        let json = serde_json::to_string(&client_event)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    fn process_message(&mut self, message: Message, output: &DialogOutput) -> Result<FlowControl> {
        match message {
            Message::Text(str) => {
                let event = serde_json::from_str(&str)
                    .with_context(|| format!("Deserialization failed: `{str}`"))?;
                handle_server_event(&str, event, output)?;
            }
            Message::Ping(payload) => {
                return Ok(FlowControl::PongAndContinue(payload));
            }
            Message::Close(_) => return Ok(FlowControl::End),
            msg => {
                bail!("Unhandled: {:?}", msg)
            }
        }

        Ok(FlowControl::Continue)
    }
}

fn handle_server_event(raw: &str, event: ServerEvent, output: &DialogOutput) -> Result<()> {
    match event {
        ServerEvent::Error { error } => {
            bail!("{error:?}, raw: {raw}")
        }
        ServerEvent::ResponseAudioDelta { delta } => {
            let decoded = BASE64_STANDARD.decode(delta)?;
            let samples = audio::from_le_bytes(&decoded);
            trace!("Received {} samples", samples.len());
            output.audio_frame(AudioFrame {
                format: REALTIME_AUDIO_FORMAT,
                samples,
            })?;
        }
        // The caller started speaking, drop any pending synthesized audio.
        ServerEvent::SpeechStarted => output.clear_audio()?,
        ServerEvent::InputAudioTranscriptionCompleted { transcript } => {
            info!("User transcript: {transcript}");
            output.final_utterance(Speaker::User, transcript)?;
        }
        ServerEvent::ResponseDone { response } => {
            trace!("Response done: {:?}", response.status);
            for item in response.output {
                if item.kind.as_deref() != Some("message")
                    || item.role.as_deref() != Some("assistant")
                {
                    debug!("Unprocessed item: {item:?}");
                    continue;
                }
                for transcript in item
                    .content
                    .into_iter()
                    .flatten()
                    .filter(|part| part.kind.as_deref() == Some("audio"))
                    .filter_map(|part| part.transcript)
                {
                    info!("Agent transcript: {transcript}");
                    output.final_utterance(Speaker::Agent, transcript)?;
                }
            }
        }
        ServerEvent::SessionCreated { .. } => {
            debug!("Unexpected session.created, ignoring");
        }
        ServerEvent::Unhandled => {
            trace!("Unhandled server event: {raw}");
        }
    }

    Ok(())
}

enum FlowControl {
    Continue,
    PongAndContinue(Bytes),
    End,
}
