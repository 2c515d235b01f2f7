//! WebSocket client for the browser-level DevTools endpoint.
//!
//! One connection serves every tab: targets are attached with flattened
//! sessions, so commands carry a `sessionId` and events come back tagged with
//! the session they belong to.

use super::{CdpError, CdpEvent, Transport};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = Result<Value, RemoteError>;

const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
struct RemoteError {
    code: i64,
    message: String,
    data: Option<String>,
}

/// Commands awaiting a reply, keyed by command id
#[derive(Default)]
struct Pending {
    senders: StdMutex<HashMap<u64, oneshot::Sender<Reply>>>,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.senders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Connection state shared between the client and its reader task
struct Shared {
    pending: Pending,
    closed: AtomicBool,
    /// Taken by the reader on exit so subscribers observe `Closed`
    events: StdMutex<Option<broadcast::Sender<CdpEvent>>>,
}

impl Shared {
    fn new(events: broadcast::Sender<CdpEvent>) -> Self {
        Self {
            pending: Pending::default(),
            closed: AtomicBool::new(false),
            events: StdMutex::new(Some(events)),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the connection gone, fails waiting commands and ends every subscription
    fn shut_down(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    fn subscribe_sender(&self) -> Option<broadcast::Sender<CdpEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        let events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match events.as_ref() {
            Some(sender) => sender.subscribe(),
            // A receiver whose sender is already gone reports `Closed` at once
            None => broadcast::channel(1).1,
        }
    }
}

/// Frame and message limits for the DevTools socket
///
/// Result chunks are sized in characters, so a single event can be several
/// times larger than tungstenite's defaults. The browser is trusted.
pub fn websocket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = None;
    config.max_frame_size = None;
    config
}

/// Unregisters a command whose caller stopped waiting
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// A decoded message from the browser
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to a command: `Ok(result)` or `Err((code, message))`
    Response {
        id: u64,
        outcome: Result<Value, (i64, String)>,
    },
    Event(CdpEvent),
}

/// Client bound to the browser WebSocket endpoint
///
/// Commands wait as long as the browser takes; callers bound them with
/// their own clocks (see [`super::Target::call`]).
pub struct CdpClient {
    next_id: AtomicU64,
    shared: Arc<Shared>,
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connects to a `ws://host:port/devtools/browser/<id>` endpoint
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        tracing::info!("Connecting to browser at {}", ws_url);

        let (stream, _) =
            tokio_tungstenite::connect_async_with_config(ws_url, Some(websocket_config()), false)
                .await
            .map_err(|e| CdpError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;
        let (writer, reader) = stream.split();

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared::new(events));

        let reader = tokio::spawn(read_loop(reader, Arc::clone(&shared)));

        Ok(Self {
            next_id: AtomicU64::new(1),
            shared,
            writer: Mutex::new(writer),
            reader,
        })
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Transport for CdpClient {
    async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = build_cdp_message(id, method, params);
        if let Some(session_id) = session_id {
            message["sessionId"] = Value::String(session_id.to_string());
        }

        tracing::debug!("-> {} #{} {:?}", method, id, session_id);

        // Registered before the write so a fast reply cannot be missed
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            id,
        };
        // Checked after registering: the reader sets the flag before clearing
        if self.shared.is_closed() {
            return Err(connection_closed(method));
        }

        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(message.to_string()))
                .await
                .map_err(|e| CdpError::Protocol(format!("failed to send {}: {}", method, e)))?;
        }

        let reply = rx.await.map_err(|_| connection_closed(method))?;

        reply.map_err(|e| CdpError::Remote {
            method: method.to_string(),
            code: e.code,
            message: e.message,
            data: e.data,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.shared.subscribe()
    }
}

fn connection_closed(method: &str) -> CdpError {
    CdpError::Protocol(format!("connection closed while waiting for {}", method))
}

async fn read_loop(mut reader: SplitStream<WsStream>, shared: Arc<Shared>) {
    let Some(events) = shared.subscribe_sender() else {
        return;
    };
    while let Some(frame) = reader.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => {
                tracing::info!("Browser closed the DevTools connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("DevTools connection error: {}", e);
                break;
            }
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Ignoring malformed DevTools message: {}", e);
                continue;
            }
        };

        match parse_incoming(&value) {
            Some(Incoming::Response { id, outcome }) => {
                let reply = outcome.map_err(|(code, message)| RemoteError {
                    code,
                    message,
                    data: value["error"]["data"].as_str().map(str::to_string),
                });
                let sender = shared.pending.lock().remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => tracing::debug!("Reply for unknown command #{}", id),
                }
            }
            Some(Incoming::Event(event)) => {
                // No subscribers is not an error
                let _ = events.send(event);
            }
            None => {}
        }
    }

    drop(events);
    shared.shut_down();
}

/// Builds a command message
pub fn build_cdp_message(id: u64, method: &str, params: Value) -> Value {
    json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Decodes a browser message into a response or an event
pub fn parse_incoming(value: &Value) -> Option<Incoming> {
    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        let outcome = match value.get("error") {
            Some(error) => Err((
                error["code"].as_i64().unwrap_or(-1),
                error["message"].as_str().unwrap_or_default().to_string(),
            )),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Some(Incoming::Response { id, outcome });
    }

    let method = value.get("method")?.as_str()?.to_string();
    Some(Incoming::Event(CdpEvent {
        session_id: value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
        method,
        params: value.get("params").cloned().unwrap_or(Value::Null),
    }))
}
