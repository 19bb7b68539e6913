use super::policy::ReconnectPolicy;
use super::transport::{RealtimeError, SocketStream, SocketTransport, WsTransport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;
type Listeners = Arc<RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting { attempt: u32 },
    Connected,
    Reconnecting { attempt: u32 },
    /// Closed by the client.
    Disconnected,
    /// Every attempt of a connect or reconnect sequence failed.
    Failed,
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

enum Command {
    Emit(String),
    Close,
}

/// One socket session for one user id, driven by a background task.
pub struct Connection {
    user_id: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl Connection {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// True while the driver is alive: connecting, connected or
    /// reconnecting.
    pub fn is_open(&self) -> bool {
        !matches!(
            self.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        )
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

fn lock_current(current: &Mutex<Option<Arc<Connection>>>) -> MutexGuard<'_, Option<Arc<Connection>>> {
    current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps at most one live socket connection for the process and routes
/// events to registered listeners.
#[derive(Clone)]
pub struct Notifier {
    socket_url: Url,
    transport: Arc<dyn SocketTransport>,
    policy: ReconnectPolicy,
    listeners: Listeners,
    next_listener_id: Arc<AtomicU64>,
    current: Arc<Mutex<Option<Arc<Connection>>>>,
}

impl Notifier {
    pub fn new(socket_url: Url) -> Self {
        Self::with_transport(socket_url, Arc::new(WsTransport), ReconnectPolicy::default())
    }

    pub fn with_transport(
        socket_url: Url,
        transport: Arc<dyn SocketTransport>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            socket_url,
            transport,
            policy,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_listener_id: Arc::new(AtomicU64::new(1)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    fn url_for(&self, user_id: &str) -> Url {
        let mut url = self.socket_url.clone();
        url.query_pairs_mut().append_pair("userId", user_id);
        url
    }

    /// Returns the live connection for `user_id`, or opens one. A live
    /// connection for a different user is closed first. Must be called from
    /// inside a Tokio runtime.
    pub fn connect(&self, user_id: &str) -> Result<Arc<Connection>, RealtimeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;
        let user_id = user_id.trim();
        let mut current = lock_current(&self.current);

        if let Some(existing) = current.as_ref() {
            if existing.is_open() && existing.user_id == user_id {
                return Ok(existing.clone());
            }
            existing.close();
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting { attempt: 1 });
        let connection = Arc::new(Connection {
            user_id: user_id.to_string(),
            commands: commands_tx,
            state: state_rx,
        });

        let driver = Driver {
            url: self.url_for(user_id),
            transport: self.transport.clone(),
            policy: self.policy,
            listeners: self.listeners.clone(),
            state: state_tx,
            commands: commands_rx,
        };
        tracing::info!(user_id, "opening realtime connection");
        runtime.spawn(driver.run());

        *current = Some(connection.clone());
        Ok(connection)
    }

    /// Client-initiated close; no reconnect follows. Returns `false` when
    /// there was nothing to close.
    pub fn disconnect(&self) -> bool {
        let Some(connection) = lock_current(&self.current).take() else {
            return false;
        };
        tracing::info!(user_id = %connection.user_id, "closing realtime connection");
        connection.close();
        true
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        lock_current(&self.current).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection()
            .is_some_and(|c| c.state() == ConnectionState::Connected)
    }

    /// Sends `event` if the socket is connected right now. Otherwise the
    /// payload is dropped and `false` is returned.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        let Some(connection) = self
            .connection()
            .filter(|c| c.state() == ConnectionState::Connected)
        else {
            tracing::warn!(event, "socket not connected; dropping event");
            return false;
        };
        let frame = Frame {
            event: event.to_string(),
            data,
        };
        let Ok(text) = serde_json::to_string(&frame) else {
            tracing::warn!(event, "event payload does not serialize; dropping event");
            return false;
        };
        connection.commands.send(Command::Emit(text)).is_ok()
    }

    /// Listeners stay registered across reconnects.
    pub fn on(&self, event: &str, listener: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(listener);
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes one listener, or all listeners for `event` when `id` is `None`.
    /// Returns how many were removed.
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> usize {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(registered) = listeners.get_mut(event) else {
            return 0;
        };
        let before = registered.len();
        match id {
            Some(id) => registered.retain(|(existing, _)| *existing != id),
            None => registered.clear(),
        }
        let removed = before - registered.len();
        if registered.is_empty() {
            listeners.remove(event);
        }
        removed
    }
}

enum PumpExit {
    ClientClosed,
    ServerClosed,
}

struct Driver {
    url: Url,
    transport: Arc<dyn SocketTransport>,
    policy: ReconnectPolicy,
    listeners: Listeners,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Driver {
    async fn run(mut self) {
        let mut reconnecting = false;
        loop {
            let Some(mut stream) = self.open_with_retry(reconnecting).await else {
                return;
            };
            self.state.send_replace(ConnectionState::Connected);
            tracing::info!(reconnect = reconnecting, "realtime connection established");

            match self.pump(stream.as_mut()).await {
                PumpExit::ClientClosed => {
                    if let Err(e) = stream.close().await {
                        tracing::debug!(error = %e, "socket close handshake failed");
                    }
                    self.state.send_replace(ConnectionState::Disconnected);
                    return;
                }
                PumpExit::ServerClosed => {
                    tracing::warn!("realtime connection lost; reconnecting");
                    if !self.drain_pending() {
                        self.state.send_replace(ConnectionState::Disconnected);
                        return;
                    }
                    reconnecting = true;
                }
            }
        }
    }

    /// Discards emits queued before the drop. Returns `false` when a close was
    /// requested.
    fn drain_pending(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Emit(_)) => {
                    tracing::warn!("dropping event queued while the socket went down");
                }
                Ok(Command::Close) => return false,
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Sleeps for `delay` unless the client closes first.
    async fn wait_or_close(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            return self.drain_pending();
        }
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Emit(_)) => {
                        tracing::warn!("socket not connected; dropping event");
                    }
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    async fn open_with_retry(&mut self, reconnecting: bool) -> Option<Box<dyn SocketStream>> {
        for attempt in 1..=self.policy.max_attempts {
            self.state.send_replace(if reconnecting {
                ConnectionState::Reconnecting { attempt }
            } else {
                ConnectionState::Connecting { attempt }
            });
            if !self.wait_or_close(self.policy.delay_before(attempt)).await {
                self.state.send_replace(ConnectionState::Disconnected);
                return None;
            }

            match self.transport.open(&self.url).await {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    tracing::warn!(attempt, max = self.policy.max_attempts, error = %e, "socket connect failed");
                }
            }
        }

        tracing::error!(attempts = self.policy.max_attempts, "giving up on realtime connection");
        self.state.send_replace(ConnectionState::Failed);
        None
    }

    async fn pump(&mut self, stream: &mut dyn SocketStream) -> PumpExit {
        loop {
            tokio::select! {
                frame = stream.next_text() => match frame {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "socket read failed");
                        return PumpExit::ServerClosed;
                    }
                    None => return PumpExit::ServerClosed,
                },
                command = self.commands.recv() => match command {
                    Some(Command::Emit(text)) => {
                        if let Err(e) = stream.send_text(text).await {
                            tracing::warn!(error = %e, "socket write failed");
                            return PumpExit::ServerClosed;
                        }
                    }
                    Some(Command::Close) | None => return PumpExit::ClientClosed,
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed socket frame");
                return;
            }
        };
        let targets: Vec<Listener> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners
                .get(&frame.event)
                .map(|registered| registered.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };
        if targets.is_empty() {
            tracing::trace!(event = %frame.event, "no listener for socket event");
        }
        for listener in targets {
            listener(&frame.data);
        }
    }
}
