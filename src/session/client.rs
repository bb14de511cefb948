// WebSocket client for the remote agent session
//
// One logical connection per widget-open lifecycle. The socket is split
// after connect: a writer task drains an outbound queue (submission order
// is wire order) and a reader task turns inbound frames into ServerEvents
// delivered in arrival order. A closed flag makes every operation against
// a finished session fail deterministically instead of hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::session::config::LiveConfig;
use crate::session::messages::{AudioChunk, ClientMessage, ServerEvent, ServerMessage, ToolResult};

/// Handle to a live agent session
///
/// The remote side is opaque: the widget only sends audio and tool
/// acknowledgments and receives the event stream returned by `connect`.
#[async_trait::async_trait]
pub trait AgentSession: Send + Sync {
    /// Send one block of microphone audio
    async fn send_audio(&self, chunk: AudioChunk) -> Result<()>;

    /// Acknowledge a batch of function calls, correlated by call id
    async fn send_tool_results(&self, responses: Vec<ToolResult>) -> Result<()>;

    /// Close the session. Idempotent.
    async fn close(&self) -> Result<()>;
}

enum Outbound {
    Message(ClientMessage),
    Shutdown,
}

/// Agent session over tokio-tungstenite
pub struct WsSession {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
    session_id: String,
}

impl WsSession {
    /// Connect to the agent endpoint and send the setup message.
    ///
    /// Returns the session handle and the inbound event stream. The stream
    /// ends with `SessionError` or `Closed`; either one is terminal.
    pub async fn connect(
        endpoint: &str,
        api_key: &str,
        config: LiveConfig,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>)> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}?key={}", endpoint, api_key);

        info!("Connecting agent session {} to {}", session_id, endpoint);

        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Session(format!("failed to connect to {}: {}", endpoint, e)))?;

        let (mut write, mut read) = socket.split();

        let closed = Arc::new(AtomicBool::new(false));
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(64);

        // Setup goes through the same queue as everything else, so it is
        // guaranteed to be the first message on the wire.
        let _ = outbound_tx.send(Outbound::Message(ClientMessage::Setup { config }));

        let writer_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Message(message) => {
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to serialize outbound message: {}", e);
                                continue;
                            }
                        };
                        if write.send(Message::Text(text)).await.is_err() {
                            writer_closed.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                    Outbound::Shutdown => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let reader_closed = Arc::clone(&closed);
        let reader_session_id = session_id.clone();
        tokio::spawn(async move {
            loop {
                let terminal = match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if event_tx.send(ServerEvent::from(message)).await.is_err() {
                                    break;
                                }
                                None
                            }
                            Err(e) => {
                                // Unknown message shapes are ignored, not fatal
                                warn!("Ignoring unparseable server message: {}", e);
                                None
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => Some(ServerEvent::Closed),
                    Some(Ok(_)) => None, // ping/pong/binary
                    Some(Err(e)) => Some(ServerEvent::SessionError(e.to_string())),
                };

                if let Some(event) = terminal {
                    reader_closed.store(true, Ordering::SeqCst);
                    info!("Agent session {} ended", reader_session_id);
                    let _ = event_tx.send(event).await;
                    break;
                }
            }
        });

        info!("Agent session {} connected", session_id);

        Ok((
            Self {
                outbound_tx,
                closed,
                session_id,
            },
            event_rx,
        ))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        self.outbound_tx
            .send(Outbound::Message(message))
            .map_err(|_| Error::SessionClosed)
    }
}

#[async_trait::async_trait]
impl AgentSession for WsSession {
    async fn send_audio(&self, chunk: AudioChunk) -> Result<()> {
        self.send(ClientMessage::Audio { chunk })
    }

    async fn send_tool_results(&self, responses: Vec<ToolResult>) -> Result<()> {
        self.send(ClientMessage::ToolResponse { responses })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing agent session {}", self.session_id);
        let _ = self.outbound_tx.send(Outbound::Shutdown);
        Ok(())
    }
}
