//! WebSocket client with auto-reconnection for the storefront realtime feed.
//!
//! Each connection attempt tries the upgraded (WebSocket) transport first
//! and falls back to HTTP long-polling when it cannot be established; no
//! upgrade memory is kept across attempts. Connectivity failures never
//! surface as errors: callers observe the connection state and the
//! connected signal. Room membership is not carried across reconnects;
//! callers must re-join on every connected signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use snackshop_shared::socket_protocol::{
    EVENT_JOIN_USER_ROOM, EVENT_LEAVE_USER_ROOM, SocketMessage,
};

// --- Heartbeat / reconnection constants ---
const PING_INTERVAL: Duration = Duration::from_secs(25);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const ACK_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const EMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server hello carrying the connection identifier.
const EVENT_CONNECTED: &str = "connected";

/// Configuration for the socket client.
#[derive(Debug, Clone)]
pub struct SocketClientConfig {
    /// Base URL of the realtime server (http(s) scheme; swapped to ws(s)
    /// for the upgraded transport).
    pub url: String,
    pub auth_token: String,
    /// Max reconnection attempts before the channel gives up. Resets after
    /// each successful connection. `None` = unlimited.
    pub max_reconnect_attempts: Option<usize>,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Try HTTP long-polling when the websocket transport fails.
    pub polling_fallback: bool,
}

impl SocketClientConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            max_reconnect_attempts: Some(15),
            connect_timeout: Duration::from_secs(20),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(15),
            polling_fallback: true,
        }
    }
}

/// Monotonic epoch millis for lock-free last-activity tracking.
fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// The attempt ceiling was reached; terminal until `connect()` is called
    /// again.
    ReconnectFailed,
}

/// Transport the live connection runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Polling,
}

/// Event handler callback type.
type EventHandler = Box<dyn Fn(Value) + Send + Sync>;

type HandlerMap = HashMap<String, Vec<(HandlerId, EventHandler)>>;
type AckMap = HashMap<String, oneshot::Sender<Value>>;

/// Token returned by [`SocketClient::on`]; pass to [`SocketClient::off`] to
/// remove that one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

pub struct SocketClient {
    config: SocketClientConfig,
    state: Arc<RwLock<ConnectionState>>,
    transport: Arc<RwLock<Option<TransportKind>>>,
    /// Server-assigned id for the live connection.
    connection_id: Arc<RwLock<Option<String>>>,

    /// Channel to send frames to the write side of the live transport.
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,

    /// Pending ack callbacks: request_id -> oneshot sender.
    pending_acks: Arc<Mutex<AckMap>>,

    /// Event handlers: event name -> registered handlers.
    event_handlers: Arc<RwLock<HandlerMap>>,
    next_handler_id: AtomicU64,

    /// Notify fired on every successful connection (rooms are re-joined on
    /// this signal).
    connected_notify: Arc<Notify>,

    shutdown: Arc<Notify>,
    shutdown_flag: Arc<AtomicBool>,

    has_connected_once: Arc<AtomicBool>,

    /// Last time we received any data (epoch ms, lock-free).
    last_activity: Arc<AtomicU64>,

    on_connect: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
    on_disconnect: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
}

impl SocketClient {
    pub fn new(config: SocketClientConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            transport: Arc::new(RwLock::new(None)),
            connection_id: Arc::new(RwLock::new(None)),
            tx: Arc::new(Mutex::new(None)),
            pending_acks: Arc::new(Mutex::new(HashMap::new())),
            event_handlers: Arc::new(RwLock::new(HashMap::new())),
            next_handler_id: AtomicU64::new(1),
            connected_notify: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            has_connected_once: Arc::new(AtomicBool::new(false)),
            last_activity: Arc::new(AtomicU64::new(0)),
            on_connect: Arc::new(Mutex::new(None)),
            on_disconnect: Arc::new(Mutex::new(None)),
        }
    }

    /// Register an event handler. Multiple handlers per event are allowed.
    pub async fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.event_handlers
            .write()
            .await
            .entry(event.into())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove one previously registered handler.
    pub async fn off(&self, event: &str, id: HandlerId) {
        let mut handlers = self.event_handlers.write().await;
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }

    /// Set connection callback.
    pub async fn on_connect(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_connect.lock().await = Some(Box::new(f));
    }

    /// Set disconnection callback.
    pub async fn on_disconnect(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_disconnect.lock().await = Some(Box::new(f));
    }

    /// Send a fire-and-forget event. Dropped with a debug log when not
    /// connected; the channel never queues across reconnects.
    pub async fn emit(&self, event: impl Into<String>, data: Value) {
        let msg = SocketMessage::event(event, data);
        let json = match serde_json::to_string(&msg) {
            Ok(j) => j,
            Err(_) => return,
        };

        if let Some(tx) = self.tx.lock().await.as_ref() {
            let _ = tx.send(Message::Text(json.into()));
        } else {
            debug!(event = %msg.event, "emit while disconnected, dropping");
        }
    }

    /// Send an event and wait for its ack response.
    pub async fn emit_with_ack(&self, event: impl Into<String>, data: Value) -> anyhow::Result<Value> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = SocketMessage::request(id.clone(), event, data);
        let json = serde_json::to_string(&msg)?;

        let (sender, receiver) = oneshot::channel();
        self.pending_acks.lock().await.insert(id.clone(), sender);

        if let Some(tx) = self.tx.lock().await.as_ref() {
            tx.send(Message::Text(json.into()))
                .map_err(|_| anyhow::anyhow!("send failed"))?;
        } else {
            self.pending_acks.lock().await.remove(&id);
            anyhow::bail!("not connected");
        }

        match time::timeout(ACK_TIMEOUT, receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => anyhow::bail!("ack sender dropped"),
            Err(_) => {
                self.pending_acks.lock().await.remove(&id);
                anyhow::bail!("ack timeout")
            }
        }
    }

    /// Enter the user's broadcast room. Only meaningful while connected; the
    /// caller re-joins on every connected signal.
    pub async fn join_user_room(&self, user_id: &str) {
        self.emit(EVENT_JOIN_USER_ROOM, Value::String(user_id.into()))
            .await;
    }

    /// Leave the user's broadcast room (logout/teardown).
    pub async fn leave_user_room(&self, user_id: &str) {
        self.emit(EVENT_LEAVE_USER_ROOM, Value::String(user_id.into()))
            .await;
    }

    /// Start the client with auto-reconnection, transport fallback,
    /// heartbeat, and connect timeout. Clears a previous `ReconnectFailed`
    /// state.
    pub async fn connect(&self) {
        self.shutdown_flag.store(false, Ordering::Relaxed);

        let config = self.config.clone();
        let state = self.state.clone();
        let transport = self.transport.clone();
        let connection_id = self.connection_id.clone();
        let tx_holder = self.tx.clone();
        let pending_acks = self.pending_acks.clone();
        let event_handlers = self.event_handlers.clone();
        let connected_notify = self.connected_notify.clone();
        let shutdown = self.shutdown.clone();
        let shutdown_flag = self.shutdown_flag.clone();
        let has_connected_once = self.has_connected_once.clone();
        let last_activity = self.last_activity.clone();
        let on_connect = self.on_connect.clone();
        let on_disconnect = self.on_disconnect.clone();

        tokio::spawn(async move {
            let http = reqwest::Client::new();
            let mut backoff = config.initial_backoff;
            let mut attempts: usize = 0;

            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }

                // Check the reconnect ceiling.
                if let Some(max) = config.max_reconnect_attempts {
                    if attempts >= max {
                        warn!(attempts, "max reconnection attempts reached, giving up");
                        *state.write().await = ConnectionState::ReconnectFailed;
                        return;
                    }
                }
                attempts += 1;

                *state.write().await = if has_connected_once.load(Ordering::Relaxed) {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Connecting
                };

                let token = urlencoding::encode(&config.auth_token).into_owned();
                let ws_url = format!(
                    "{}/ws?token={token}",
                    config
                        .url
                        .replace("http://", "ws://")
                        .replace("https://", "wss://"),
                );
                let poll_url = format!("{}/poll?token={token}", config.url);
                let emit_url = format!("{}/emit?token={token}", config.url);

                debug!(attempt = attempts, "connecting to realtime channel");

                let connect_result = time::timeout(
                    config.connect_timeout,
                    tokio_tungstenite::connect_async(&ws_url),
                )
                .await;

                let ws_stream = match connect_result {
                    Ok(Ok((stream, _))) => Some(stream),
                    Ok(Err(e)) => {
                        debug!(error = %e, "websocket transport failed");
                        None
                    }
                    Err(_) => {
                        debug!(
                            "websocket connect timed out ({}s)",
                            config.connect_timeout.as_secs()
                        );
                        None
                    }
                };

                // --- Polling fallback for this attempt ---
                let Some(ws_stream) = ws_stream else {
                    if config.polling_fallback {
                        match poll_once(&http, &poll_url, config.connect_timeout).await {
                            Ok(first_batch) => {
                                info!("realtime channel connected (polling transport)");
                                *state.write().await = ConnectionState::Connected;
                                *transport.write().await = Some(TransportKind::Polling);
                                has_connected_once.store(true, Ordering::Relaxed);
                                backoff = config.initial_backoff;
                                attempts = 0;
                                last_activity.store(epoch_ms(), Ordering::Relaxed);

                                let (send_tx, mut send_rx) =
                                    mpsc::unbounded_channel::<Message>();
                                *tx_holder.lock().await = Some(send_tx);

                                if let Some(ref cb) = *on_connect.lock().await {
                                    cb();
                                }
                                connected_notify.notify_waiters();

                                for msg in first_batch {
                                    dispatch_incoming(
                                        msg,
                                        &pending_acks,
                                        &event_handlers,
                                        &connection_id,
                                    )
                                    .await;
                                }

                                let stop = run_polling_session(
                                    &http,
                                    &poll_url,
                                    &emit_url,
                                    &mut send_rx,
                                    &pending_acks,
                                    &event_handlers,
                                    &connection_id,
                                    &shutdown,
                                    &shutdown_flag,
                                    &last_activity,
                                )
                                .await;

                                *state.write().await = ConnectionState::Disconnected;
                                *transport.write().await = None;
                                *connection_id.write().await = None;
                                *tx_holder.lock().await = None;
                                pending_acks.lock().await.clear();

                                if let Some(ref cb) = *on_disconnect.lock().await {
                                    cb();
                                }
                                if stop {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "both transports failed");
                            }
                        }
                    } else {
                        warn!("websocket transport failed and polling fallback disabled");
                    }

                    Self::wait_backoff(&shutdown_flag, &shutdown, &mut backoff, config.max_backoff)
                        .await;
                    continue;
                };

                info!("realtime channel connected");
                *state.write().await = ConnectionState::Connected;
                *transport.write().await = Some(TransportKind::WebSocket);
                has_connected_once.store(true, Ordering::Relaxed);
                backoff = config.initial_backoff;
                attempts = 0; // reset on success

                last_activity.store(epoch_ms(), Ordering::Relaxed);

                let (mut write, mut read) = ws_stream.split();
                let (send_tx, mut send_rx) = mpsc::unbounded_channel::<Message>();
                *tx_holder.lock().await = Some(send_tx.clone());

                if let Some(ref cb) = *on_connect.lock().await {
                    cb();
                }
                connected_notify.notify_waiters();

                // --- Write task ---
                let write_shutdown = shutdown_flag.clone();
                let write_task = async {
                    while let Some(msg) = send_rx.recv().await {
                        if write_shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                };

                // --- Ping task (heartbeat) ---
                let ping_tx = send_tx.clone();
                let ping_shutdown = shutdown_flag.clone();
                let ping_task = async {
                    let mut interval = time::interval(PING_INTERVAL);
                    interval.tick().await; // skip first immediate tick
                    loop {
                        interval.tick().await;
                        if ping_shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        if ping_tx.send(Message::Ping(vec![].into())).is_err() {
                            break;
                        }
                    }
                };

                // --- Watchdog task (detect dead connection) ---
                let wd_activity = last_activity.clone();
                let wd_shutdown = shutdown_flag.clone();
                let dead_timeout = PING_INTERVAL + PONG_TIMEOUT;
                let watchdog_task = async {
                    let mut interval = time::interval(Duration::from_secs(5));
                    loop {
                        interval.tick().await;
                        if wd_shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        let last = wd_activity.load(Ordering::Relaxed);
                        let now = epoch_ms();
                        if now.saturating_sub(last) > dead_timeout.as_millis() as u64 {
                            warn!(
                                "no activity for {}s, connection presumed dead",
                                dead_timeout.as_secs()
                            );
                            break;
                        }
                    }
                };

                // --- Read task ---
                let read_pending = pending_acks.clone();
                let read_handlers = event_handlers.clone();
                let read_connection_id = connection_id.clone();
                let read_shutdown = shutdown_flag.clone();
                let read_activity = last_activity.clone();
                let read_task = async {
                    while let Some(msg) = read.next().await {
                        if read_shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        // Any received frame counts as activity.
                        read_activity.store(epoch_ms(), Ordering::Relaxed);

                        match msg {
                            Ok(Message::Text(text)) => {
                                let text_str: &str = &text;
                                if let Some(socket_msg) = SocketMessage::parse(text_str) {
                                    dispatch_incoming(
                                        socket_msg,
                                        &read_pending,
                                        &read_handlers,
                                        &read_connection_id,
                                    )
                                    .await;
                                }
                            }
                            Ok(Message::Pong(_)) => {
                                // Activity already recorded above.
                            }
                            Ok(Message::Close(_)) => break,
                            Err(e) => {
                                warn!(error = %e, "realtime read error");
                                break;
                            }
                            _ => {}
                        }
                    }
                };

                tokio::select! {
                    _ = write_task => {},
                    _ = read_task => {},
                    _ = ping_task => {},
                    _ = watchdog_task => {},
                    _ = shutdown.notified() => {
                        *state.write().await = ConnectionState::Disconnected;
                        *transport.write().await = None;
                        *connection_id.write().await = None;
                        *tx_holder.lock().await = None;
                        return;
                    }
                }

                *state.write().await = ConnectionState::Disconnected;
                *transport.write().await = None;
                *connection_id.write().await = None;
                *tx_holder.lock().await = None;
                pending_acks.lock().await.clear();

                if let Some(ref cb) = *on_disconnect.lock().await {
                    cb();
                }

                Self::wait_backoff(&shutdown_flag, &shutdown, &mut backoff, config.max_backoff)
                    .await;
            }
        });
    }

    /// Wait for backoff duration, respecting shutdown.
    async fn wait_backoff(
        shutdown_flag: &AtomicBool,
        shutdown: &Notify,
        backoff: &mut Duration,
        max_backoff: Duration,
    ) {
        if shutdown_flag.load(Ordering::Relaxed) {
            return;
        }
        debug!(backoff_ms = backoff.as_millis(), "reconnecting after delay");
        tokio::select! {
            _ = time::sleep(*backoff) => {},
            _ = shutdown.notified() => {},
        }
        *backoff = (*backoff * 2).min(max_backoff);
    }

    /// Disconnect, stop reconnection, and release handler registrations.
    pub async fn teardown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        self.shutdown.notify_one();
        self.event_handlers.write().await.clear();
        self.pending_acks.lock().await.clear();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Transport of the live connection, `None` while disconnected.
    pub async fn transport(&self) -> Option<TransportKind> {
        *self.transport.read().await
    }

    /// Server-assigned connection id, `None` while disconnected or before
    /// the server's hello.
    pub async fn connection_id(&self) -> Option<String> {
        self.connection_id.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// Wait until connected (or timeout). Returns immediately when already
    /// connected.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        if self.is_connected().await {
            return true;
        }
        tokio::time::timeout(timeout, self.connected_notify.notified())
            .await
            .is_ok()
    }

    /// Future resolving on the next connected signal; callers use this to
    /// re-establish room membership after every reconnect.
    pub fn connected_signal(&self) -> Arc<Notify> {
        self.connected_notify.clone()
    }
}

/// Route one inbound message: resolve a pending ack, record the server
/// hello, or fan out to every registered handler for the event.
async fn dispatch_incoming(
    msg: SocketMessage,
    pending_acks: &Mutex<AckMap>,
    handlers: &RwLock<HandlerMap>,
    connection_id: &RwLock<Option<String>>,
) {
    if let Some(ref id) = msg.id {
        if msg.is_ack() {
            if let Some(sender) = pending_acks.lock().await.remove(id) {
                let _ = sender.send(msg.data);
                return;
            }
        }
    }

    if msg.event == EVENT_CONNECTED {
        if let Some(sid) = msg.data.get("sid").and_then(|v| v.as_str()) {
            *connection_id.write().await = Some(sid.to_string());
        }
    }

    let handlers = handlers.read().await;
    if let Some(list) = handlers.get(&msg.event) {
        for (_, handler) in list {
            handler(msg.data.clone());
        }
    }
}

/// One long-poll request. A timeout is an empty batch, not an error; the
/// server may simply have had nothing to say.
async fn poll_once(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> anyhow::Result<Vec<SocketMessage>> {
    let resp = match http.get(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(e) if e.is_timeout() => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let status = resp.status();
    if status.as_u16() == 204 {
        return Ok(Vec::new());
    }
    if !status.is_success() {
        anyhow::bail!("poll endpoint returned {status}");
    }
    Ok(resp.json().await?)
}

/// Drive one polling-transport session: POST outgoing frames, long-poll for
/// inbound batches. Returns `true` when shutdown was requested.
#[allow(clippy::too_many_arguments)]
async fn run_polling_session(
    http: &reqwest::Client,
    poll_url: &str,
    emit_url: &str,
    send_rx: &mut mpsc::UnboundedReceiver<Message>,
    pending_acks: &Mutex<AckMap>,
    handlers: &RwLock<HandlerMap>,
    connection_id: &RwLock<Option<String>>,
    shutdown: &Notify,
    shutdown_flag: &AtomicBool,
    last_activity: &AtomicU64,
) -> bool {
    loop {
        if shutdown_flag.load(Ordering::Relaxed) {
            return true;
        }
        tokio::select! {
            _ = shutdown.notified() => return true,
            outgoing = send_rx.recv() => {
                match outgoing {
                    Some(Message::Text(text)) => {
                        let result = http
                            .post(emit_url)
                            .header("content-type", "application/json")
                            .body(text.to_string())
                            .timeout(EMIT_TIMEOUT)
                            .send()
                            .await;
                        match result {
                            Ok(resp) if resp.status().is_success() => {}
                            Ok(resp) => {
                                warn!(status = %resp.status(), "emit over polling failed");
                                return false;
                            }
                            Err(e) => {
                                warn!(error = %e, "emit over polling failed");
                                return false;
                            }
                        }
                    }
                    // Pings are a websocket concern; the poll request itself
                    // is the heartbeat here.
                    Some(_) => {}
                    None => return false,
                }
            }
            polled = poll_once(http, poll_url, POLL_TIMEOUT) => {
                match polled {
                    Ok(batch) => {
                        last_activity.store(epoch_ms(), Ordering::Relaxed);
                        for msg in batch {
                            dispatch_incoming(msg, pending_acks, handlers, connection_id).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "polling transport lost");
                        return false;
                    }
                }
            }
        }
    }
}
