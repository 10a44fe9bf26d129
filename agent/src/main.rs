//! The voice assistant agent.
//!
//! A websocket server the media edge connects to, one connection per caller.
//! Caller audio arrives as binary PCM16-LE frames, control events as JSON
//! text frames; synthesized audio and control events go back the same way.
//! Final transcripts never travel over this socket, they are published to the
//! room's data channel.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, bail};
use axum::{
    extract::{
        WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{
    net::TcpListener,
    pin, select,
    sync::mpsc::{Receiver, Sender, channel},
};
use tracing::{debug, error, info};

use quotevoice::{
    AssistantSession, AudioFrame, ClientEvent, DIALOG_FORMAT, LiveKitConfig, RealtimeConfig,
    ServerEvent, SessionEvent, SessionHandle, audio, services::RoomService,
};

const DEFAULT_PORT: u16 = 8123;

#[tokio::main]
async fn main() -> Result<()> {
    let env_path = dotenvy::dotenv_override();

    tracing_subscriber::fmt::init();

    if let Ok(env_path) = env_path {
        info!("Environment variables loaded from {env_path:?}");
    }

    let addr = match env::var("QUOTEVOICE_AGENT_ADDRESS") {
        Ok(addr) => addr
            .parse()
            .context("Failed to parse QUOTEVOICE_AGENT_ADDRESS")?,
        Err(_) => SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
    };

    {
        let args: Vec<String> = env::args().collect();
        if args.len() == 2 && args[1] == "check-health" {
            return check_health(addr).await;
        }
        if args.len() != 1 {
            bail!("No arguments except `check-health` are expected")
        }
    }

    // Fail at startup when credentials are missing, not on the first caller.
    let realtime = RealtimeConfig::from_env()?;
    let rooms = Arc::new(RoomService::new(LiveKitConfig::from_env()?));

    let app = axum::Router::new()
        .route(
            "/",
            get(move |ws| ws_get(ws, rooms.clone(), realtime.clone())),
        )
        .route("/health", get(|| async { StatusCode::OK }));

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {:?}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_get(
    ws: WebSocketUpgrade,
    rooms: Arc<RoomService>,
    realtime: RealtimeConfig,
) -> impl IntoResponse {
    ws.on_upgrade(|websocket| ws_driver(websocket, rooms, realtime))
}

async fn ws_driver(websocket: WebSocket, rooms: Arc<RoomService>, realtime: RealtimeConfig) {
    info!("Client connected");
    if let Err(e) = ws(websocket, rooms, realtime).await {
        let error = e
            .chain()
            .into_iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join(": ");

        error!("WebSocket error: {error}")
    }
    info!("Client disconnected");
}

#[derive(Debug)]
struct Pong(Vec<u8>);

async fn ws(websocket: WebSocket, rooms: Arc<RoomService>, realtime: RealtimeConfig) -> Result<()> {
    let (ws_sender, mut ws_receiver) = websocket.split();

    // Channel from the session driver to the websocket dispatcher.
    let (event_sender, event_receiver) = channel(32);
    // Session failures surface to the client as error events.
    let (error_sender, error_receiver) = channel(4);
    let (pong_sender, pong_receiver) = channel(4);

    let mut state = State {
        rooms,
        realtime,
        event_sender,
        error_sender,
        session: None,
    };

    let dispatcher =
        dispatch_channel_messages(pong_receiver, event_receiver, error_receiver, ws_sender);
    pin!(dispatcher);

    loop {
        select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        state.process_request(&pong_sender, msg)?;
                    }
                    Some(Err(r)) => {
                        bail!(r);
                    }
                    None => {
                        info!("Received no message, assuming close");
                        return Ok(())
                    }
                }
            }
            r = &mut dispatcher => {
                if let Err(r) = r {
                    error!("Dispatcher error, ending connection");
                    bail!(r);
                }
                else {
                    info!("Dispatcher ended");
                    return Ok(())
                }
            }
        }
    }
}

#[derive(Debug)]
struct State {
    rooms: Arc<RoomService>,
    realtime: RealtimeConfig,
    event_sender: Sender<SessionEvent>,
    error_sender: Sender<String>,
    /// The live session, if any. Dropping the handle winds the dialog down.
    session: Option<SessionHandle>,
}

impl State {
    fn process_request(&mut self, pong_sender: &Sender<Pong>, msg: Message) -> Result<()> {
        match msg {
            Message::Text(msg) => {
                debug!("Received client event: `{msg}`");
                let event: ClientEvent =
                    serde_json::from_str(&msg).context("Deserializing client event")?;
                self.process_event(event)
            }
            Message::Binary(samples) => {
                let Some(session) = &self.session else {
                    debug!("Dropping audio received outside of a session");
                    return Ok(());
                };
                session.post_audio(AudioFrame {
                    format: DIALOG_FORMAT,
                    samples: audio::from_le_bytes(samples),
                })
            }
            Message::Ping(payload) => {
                debug!("Received ping message: {payload:02X?}");
                pong_sender.try_send(Pong(payload.to_vec()))?;
                Ok(())
            }
            Message::Pong(msg) => {
                debug!("Received pong message: {msg:02X?}");
                Ok(())
            }
            Message::Close(msg) => {
                if let Some(msg) = &msg {
                    debug!(
                        "Received close message with code {} and message: {}",
                        msg.code, msg.reason
                    );
                } else {
                    debug!("Received close message");
                }
                Ok(())
            }
        }
    }

    fn process_event(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Start { room } => {
                if self.session.is_some() {
                    bail!("Session is already started");
                }
                info!("Starting assistant session for room `{room}`");

                let publisher = Arc::new(self.rooms.transcript_sink(room));
                let (handle, driver) = AssistantSession::start(&self.realtime, publisher);

                let events = self.event_sender.clone();
                let errors = self.error_sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = driver.drive(events).await {
                        let _ = errors.send(format!("{e:#}")).await;
                    }
                });

                self.session = Some(handle);
                Ok(())
            }
            ClientEvent::Stop => {
                info!("Stopping assistant session");
                self.session = None;
                Ok(())
            }
        }
    }
}

/// Dispatches channel messages to the socket's sink.
async fn dispatch_channel_messages(
    mut pong_receiver: Receiver<Pong>,
    mut event_receiver: Receiver<SessionEvent>,
    mut error_receiver: Receiver<String>,
    mut socket: SplitSink<WebSocket, Message>,
) -> Result<()> {
    loop {
        select! {
            pong = pong_receiver.recv() => {
                if let Some(Pong(payload)) = pong {
                    debug!("Sending pong: {payload:02X?}");
                    socket.send(Message::Pong(payload.into())).await?;
                } else {
                    bail!("Pong sender vanished");
                }
            }
            event = event_receiver.recv() => {
                if let Some(event) = event {
                    dispatch_session_event(&mut socket, event).await?;
                } else {
                    bail!("Session event sender vanished");
                }
            }
            message = error_receiver.recv() => {
                if let Some(message) = message {
                    error!("Session failed: {message}");
                    dispatch_json(&mut socket, ServerEvent::Error { message }).await?;
                } else {
                    bail!("Error sender vanished");
                }
            }
        }
    }
}

async fn dispatch_session_event(
    socket: &mut SplitSink<WebSocket, Message>,
    event: SessionEvent,
) -> Result<()> {
    match event {
        SessionEvent::Started => dispatch_json(socket, ServerEvent::Started).await,
        SessionEvent::Audio { frame } => {
            let bytes = audio::to_le_bytes(&frame.samples);
            socket.send(Message::Binary(bytes.into())).await?;
            Ok(())
        }
        SessionEvent::ClearAudio => dispatch_json(socket, ServerEvent::ClearAudio).await,
    }
}

async fn dispatch_json(
    socket: &mut SplitSink<WebSocket, Message>,
    event: ServerEvent,
) -> Result<()> {
    let json = serde_json::to_string(&event)?;
    socket.send(Message::Text(json.into())).await?;
    Ok(())
}

/// The healthcheck lives in the executable so the container image does not
/// need `curl`.
async fn check_health(address: SocketAddr) -> Result<()> {
    let uri = format!("http://{address}/health");
    let status = reqwest::get(uri).await?.status();
    if status != reqwest::StatusCode::OK {
        bail!("Healthcheck failed with status code {}", status)
    }
    Ok(())
}
