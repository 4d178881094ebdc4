use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use voice_session_types::audio::INPUT_SAMPLE_RATE;
use voice_session_types::events::client::{ClientContentEvent, RealtimeInputEvent};
use voice_session_types::{Blob, ClientEvent, Content, ServerEvent, Setup};
use voice_session_utils::audio::EncodedBlock;

use crate::error::ChannelError;
use crate::transcript::Role;

mod config;
pub(crate) mod consts;
mod stats;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// What the channel reports to its owner, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The endpoint accepted the setup message.
    Opened,
    AudioChunk(Blob),
    Transcript { role: Role, text: String },
    TurnComplete,
    Interrupted,
    Closed { reason: Option<String> },
    Error(String),
}

enum Outbound {
    Event(ClientEvent),
    Close,
}

/// Fire-and-forget sender for captured audio.
///
/// Blocks are dropped, never queued for later, while the channel is not
/// open or the outbound queue is full.
#[derive(Clone)]
pub struct AudioSender {
    tx: mpsc::Sender<Outbound>,
    open: Arc<AtomicBool>,
    stats: Arc<Mutex<Stats>>,
}

impl AudioSender {
    pub fn send(&self, block: EncodedBlock) {
        if block.is_empty() {
            return;
        }
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.open.load(Ordering::Acquire) {
            stats.record_dropped();
            return;
        }
        let blob = Blob::pcm(block.into_data(), INPUT_SAMPLE_RATE);
        let event = ClientEvent::RealtimeInput(RealtimeInputEvent::new(blob));
        match self.tx.try_send(Outbound::Event(event)) {
            Ok(()) => stats.record_sent(),
            Err(e) => {
                stats.record_dropped();
                tracing::warn!("dropping audio frame: {}", e);
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

struct Connection {
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

/// One bidirectional streaming channel to the endpoint.
///
/// The outbound queue exists from construction, so senders can be handed
/// out before the socket is connected.
pub struct Client {
    config: Config,
    c_tx: mpsc::Sender<Outbound>,
    c_rx: Option<mpsc::Receiver<Outbound>>,
    open: Arc<AtomicBool>,
    stats: Arc<Mutex<Stats>>,
    connection: Option<Connection>,
}

impl Client {
    pub fn new(capacity: usize, config: Config) -> Self {
        let (c_tx, c_rx) = mpsc::channel(capacity.max(1));
        Self {
            config,
            c_tx,
            c_rx: Some(c_rx),
            open: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(Stats::new())),
            connection: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn audio_sender(&self) -> AudioSender {
        AudioSender {
            tx: self.c_tx.clone(),
            open: self.open.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Opens the socket, sends `setup` first, and starts forwarding
    /// demultiplexed [`ChannelEvent`]s to `events`.
    pub async fn connect<T>(&mut self, setup: Setup, events: mpsc::UnboundedSender<T>) -> Result<(), ChannelError>
    where
        T: From<ChannelEvent> + Send + 'static,
    {
        if self.connection.is_some() {
            return Err(ChannelError::AlreadyConnected);
        }
        let mut c_rx = self.c_rx.take().ok_or(ChannelError::AlreadyConnected)?;

        let request = utils::build_request(&self.config).map_err(ChannelError::InvalidRequest)?;
        let (ws_stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| ChannelError::Timeout)?
            .map_err(ChannelError::Connect)?;
        tracing::info!(model = self.config.model(), "connected to endpoint");

        let (mut write, mut read) = ws_stream.split();

        let send_handle = tokio::spawn(async move {
            if let Err(e) = send_event(&mut write, &ClientEvent::Setup(setup)).await {
                tracing::error!("failed to send setup: {}", e);
                return;
            }
            while let Some(outbound) = c_rx.recv().await {
                match outbound {
                    Outbound::Event(event) => {
                        if let Err(e) = send_event(&mut write, &event).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        if let Err(e) = write.close().await {
                            tracing::debug!("failed to close socket: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            let reason = loop {
                let message = match read.next().await {
                    None => break None,
                    Some(Err(e)) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = events.send(ChannelEvent::Error(e.to_string()).into());
                        return;
                    }
                    Some(Ok(message)) => message,
                };
                let parsed = match message {
                    Message::Text(text) => serde_json::from_str::<ServerEvent>(&text),
                    Message::Binary(bin) => serde_json::from_slice::<ServerEvent>(&bin),
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        break frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                    }
                    _ => continue,
                };
                let message = match parsed {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to deserialize event: {}", e);
                        continue;
                    }
                };

                {
                    let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
                    stats.record_received();
                    if let Some(usage) = message.usage_metadata() {
                        stats.update_usage(usage);
                        tracing::debug!(
                            "prompt_tokens: {}, response_tokens: {}, total_tokens: {}",
                            usage.prompt_token_count(),
                            usage.response_token_count(),
                            usage.total_token_count()
                        );
                    }
                }
                if let Some(go_away) = message.go_away() {
                    tracing::warn!("endpoint is going away, time left: {:?}", go_away.time_left());
                }

                for event in demultiplex(&message) {
                    if events.send(event.into()).is_err() {
                        tracing::debug!("event receiver dropped, stopping reader");
                        return;
                    }
                }
            };
            let _ = events.send(ChannelEvent::Closed { reason }.into());
        });

        self.connection = Some(Connection {
            send_handle,
            recv_handle,
        });
        Ok(())
    }

    /// Lets captured audio through. Called once the endpoint has accepted
    /// the setup.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn send_client_event(&self, event: ClientEvent) -> Result<(), ChannelError> {
        if self.connection.is_none() {
            return Err(ChannelError::NotConnected);
        }
        self.c_tx.try_send(Outbound::Event(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::NotConnected,
        })
    }

    /// Adds content to the conversation without asking the model to respond.
    pub fn send_content(&self, content: Content) -> Result<(), ChannelError> {
        let event = ClientEvent::ClientContent(ClientContentEvent::new(vec![content]));
        self.send_client_event(event)
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stops outbound audio, sends a close frame, and tears down both socket
    /// tasks. Safe to call more than once.
    pub async fn close(&mut self) {
        self.set_open(false);
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        if self.c_tx.try_send(Outbound::Close).is_ok() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut connection.send_handle).await.is_err() {
                tracing::warn!("timed out closing the connection");
            }
        }
        connection.send_handle.abort();
        connection.recv_handle.abort();
        tracing::info!("connection closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.send_handle.abort();
            connection.recv_handle.abort();
        }
    }
}

async fn send_event<S>(write: &mut S, event: &ClientEvent) -> Result<(), ChannelError>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|e| ChannelError::Protocol(e.to_string()))?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| ChannelError::Protocol(e.to_string()))
}

/// Splits one server message into channel events.
///
/// Events come out in a fixed order regardless of field order on the wire:
/// setup complete first, then transcripts (user before model), audio parts,
/// interruption and finally turn completion.
pub fn demultiplex(message: &ServerEvent) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    if message.setup_complete() {
        events.push(ChannelEvent::Opened);
    }
    let Some(content) = message.server_content() else {
        return events;
    };
    if let Some(text) = content.input_transcription() {
        events.push(ChannelEvent::Transcript {
            role: Role::User,
            text: text.to_string(),
        });
    }
    if let Some(text) = content.output_transcription() {
        events.push(ChannelEvent::Transcript {
            role: Role::Assistant,
            text: text.to_string(),
        });
    }
    events.extend(content.audio_blobs().cloned().map(ChannelEvent::AudioChunk));
    if content.is_interrupted() {
        events.push(ChannelEvent::Interrupted);
    }
    if content.is_turn_complete() {
        events.push(ChannelEvent::TurnComplete);
    }
    events
}

/// Connects with the default endpoint settings.
pub async fn connect<T>(setup: Setup, events: mpsc::UnboundedSender<T>) -> Result<Client, ChannelError>
where
    T: From<ChannelEvent> + Send + 'static,
{
    let mut client = Client::new(consts::DEFAULT_CAPACITY, Config::new());
    client.connect(setup, events).await?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use voice_session_utils::audio::encode;

    use super::*;

    fn parse(json: &str) -> ServerEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_setup_complete_opens() {
        assert_eq!(demultiplex(&parse(r#"{"setupComplete": {}}"#)), vec![ChannelEvent::Opened]);
    }

    #[test]
    fn test_demultiplex_order_within_one_message() {
        let message = parse(
            r#"{"serverContent": {
                "turnComplete": true,
                "interrupted": true,
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQA="}}
                ]},
                "outputTranscription": {"text": " there"},
                "inputTranscription": {"text": "hi"}
            }}"#,
        );
        let events = demultiplex(&message);
        assert_eq!(
            events,
            vec![
                ChannelEvent::Transcript { role: Role::User, text: "hi".to_string() },
                ChannelEvent::Transcript { role: Role::Assistant, text: " there".to_string() },
                ChannelEvent::AudioChunk(Blob::new("audio/pcm;rate=24000", "AAA=".to_string())),
                ChannelEvent::AudioChunk(Blob::new("audio/pcm;rate=24000", "AQA=".to_string())),
                ChannelEvent::Interrupted,
                ChannelEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_metadata_only_message_is_silent() {
        let message = parse(r#"{"usageMetadata": {"totalTokenCount": 3}, "goAway": {"timeLeft": "5s"}}"#);
        assert!(demultiplex(&message).is_empty());
        let message = parse(r#"{"serverContent": {"generationComplete": true}}"#);
        assert!(demultiplex(&message).is_empty());
    }

    #[tokio::test]
    async fn test_send_before_open_is_dropped() {
        let mut client = Client::new(4, Config::builder().with_api_key("k").build());
        let sender = client.audio_sender();
        sender.send(encode(&[0.1; 16], INPUT_SAMPLE_RATE));
        sender.send(encode(&[0.1; 16], INPUT_SAMPLE_RATE));

        assert_eq!(client.stats().frames_dropped(), 2);
        assert_eq!(client.stats().frames_sent(), 0);
        // nothing was queued for later
        let mut rx = client.c_rx.take().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_waiting() {
        let client = Client::new(1, Config::builder().with_api_key("k").build());
        client.set_open(true);
        let sender = client.audio_sender();
        sender.send(encode(&[0.1; 16], INPUT_SAMPLE_RATE));
        sender.send(encode(&[0.1; 16], INPUT_SAMPLE_RATE));
        let stats = client.stats();
        assert_eq!(stats.frames_sent(), 1);
        assert_eq!(stats.frames_dropped(), 1);
    }

    #[tokio::test]
    async fn test_close_without_connection_is_harmless() {
        let mut client = Client::new(4, Config::builder().with_api_key("k").build());
        client.set_open(true);
        client.close().await;
        client.close().await;
        assert!(!client.is_open());
        assert!(matches!(
            client.send_client_event(ClientEvent::ClientContent(ClientContentEvent::new(vec![]))),
            Err(ChannelError::NotConnected)
        ));
    }
}
