//! Generic reconnecting channel connection.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::backoff::NORMAL_CLOSURE;
use crate::domain::{
    ChannelKind, ConnectionState, DisconnectReason, Frame, ReconnectPolicy, Socket, Transport,
};
use crate::error::{ChannelError, TransportError};
use crate::infrastructure::dto::websocket::{InboundEvent, OutboundEvent, decode_inbound};

/// What a channel emits towards its owner
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    State(ConnectionState),
    Inbound(InboundEvent),
}

/// A payload stamped with the channel kind and the epoch it was created for
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub kind: ChannelKind,
    pub epoch: u64,
    pub payload: ChannelPayload,
}

/// Static description of one channel connection
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub kind: ChannelKind,
    pub url: String,
    /// Sent in order right after every successful open
    pub greeting: Vec<OutboundEvent>,
    pub epoch: u64,
}

/// Where the driver opens and what it sends first; read again on every open
#[derive(Debug, Clone)]
struct Target {
    url: String,
    greeting: Vec<String>,
}

impl Target {
    fn of(spec: &ChannelSpec) -> Self {
        let greeting = spec
            .greeting
            .iter()
            .filter_map(|event| match serde_json::to_string(event) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Failed to encode greeting '{}': {}", event.event_type(), e);
                    None
                }
            })
            .collect();
        Self {
            url: spec.url.clone(),
            greeting,
        }
    }
}

#[derive(Debug)]
enum Command {
    Reconnect,
    Disconnect,
}

struct DriverHandle {
    commands: mpsc::UnboundedSender<Command>,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// One logical socket channel with backoff-driven reconnection.
///
/// The socket itself lives in a driver task; this handle only talks to it
/// over queues. Dropping the handle aborts the driver.
pub struct ChannelConnection {
    spec: ChannelSpec,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<ChannelEvent>,
    target: watch::Sender<Target>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    driver: Option<DriverHandle>,
}

impl ChannelConnection {
    pub fn new(
        spec: ChannelSpec,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (target, _) = watch::channel(Target::of(&spec));
        Self {
            spec,
            transport,
            policy,
            events,
            target,
            state_tx: Arc::new(state_tx),
            state_rx,
            driver: None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.spec.kind
    }

    pub fn epoch(&self) -> u64 {
        self.spec.epoch
    }

    pub fn url(&self) -> &str {
        &self.spec.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn is_running(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|driver| !driver.task.is_finished())
    }

    /// Start the driver. A no-op while a driver is already running.
    pub fn connect(&mut self) {
        if self.is_running() {
            debug!("{} channel already running; connect ignored", self.spec.kind);
            return;
        }
        self.spawn_driver();
    }

    /// Retry now, skipping any pending backoff timer.
    ///
    /// Restarts a driver that gave up or ended after a clean close.
    pub fn reconnect(&mut self) {
        match &self.driver {
            Some(driver) if !driver.task.is_finished() => {
                let _ = driver.commands.send(Command::Reconnect);
            }
            _ => self.spawn_driver(),
        }
    }

    /// Tear the channel down: cancels a pending reconnect timer, then closes
    /// the socket with a normal closure, and waits for the driver to exit.
    pub async fn disconnect(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        let _ = driver.commands.send(Command::Disconnect);
        if let Err(e) = driver.task.await {
            warn!("{} channel driver ended abnormally: {}", self.spec.kind, e);
        }
    }

    /// Use a new URL and greeting from the next open on.
    ///
    /// An open socket is kept; backoff retries and manual reconnects pick up
    /// the new values.
    pub fn retarget(&mut self, url: String, greeting: Vec<OutboundEvent>) {
        self.spec.url = url;
        self.spec.greeting = greeting;
        self.target.send_replace(Target::of(&self.spec));
        debug!("{} channel retargeted", self.spec.kind);
    }

    /// Queue an outbound event.
    ///
    /// Rejected unless the channel is currently `connected`.
    pub fn send(&self, event: &OutboundEvent) -> Result<(), ChannelError> {
        let not_connected = || ChannelError::NotConnected(self.spec.kind);
        if self.state() != ConnectionState::Connected {
            warn!(
                "{} channel is {}; dropping '{}'",
                self.spec.kind,
                self.state(),
                event.event_type()
            );
            return Err(not_connected());
        }
        let driver = self.driver.as_ref().ok_or_else(not_connected)?;
        let text = serde_json::to_string(event)?;
        debug!("Sending '{}' on the {} channel", event.event_type(), self.spec.kind);
        driver.outbound.send(text).map_err(|_| not_connected())
    }

    fn spawn_driver(&mut self) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            kind: self.spec.kind,
            epoch: self.spec.epoch,
            target: self.target.subscribe(),
            transport: Arc::clone(&self.transport),
            policy: self.policy,
            events: self.events.clone(),
            state: Arc::clone(&self.state_tx),
            commands: command_rx,
            outbound: outbound_rx,
        };
        let task = tokio::spawn(driver.run());

        if let Some(previous) = self.driver.replace(DriverHandle {
            commands: command_tx,
            outbound: outbound_tx,
            task,
        }) {
            previous.task.abort();
        }
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        if let Some(driver) = &self.driver {
            driver.task.abort();
        }
    }
}

/// The task owning the socket
struct Driver {
    kind: ChannelKind,
    epoch: u64,
    target: watch::Receiver<Target>,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: mpsc::UnboundedReceiver<String>,
}

/// How a waiting phase ended
enum Wake {
    Proceed,
    Stop,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);
            info!("Connecting {} channel (epoch {})", self.kind, self.epoch);

            let Some(opened) = self.open().await else {
                self.set_state(ConnectionState::Disconnected);
                return;
            };

            let reason = match opened {
                Ok(mut socket) => {
                    attempt = 0;
                    self.set_state(ConnectionState::Connected);
                    info!("{} channel connected", self.kind);
                    self.greet(socket.as_mut()).await;

                    let reason = self.run_session(socket.as_mut()).await;
                    if reason == DisconnectReason::Requested {
                        if let Err(e) = socket.close(NORMAL_CLOSURE, "Client disconnected").await {
                            debug!("{} channel close failed: {}", self.kind, e);
                        }
                        self.set_state(ConnectionState::Disconnected);
                        info!("{} channel disconnected", self.kind);
                        return;
                    }
                    self.set_state(ConnectionState::Disconnected);
                    reason
                }
                Err(e) => {
                    warn!("{} channel failed to connect: {}", self.kind, e);
                    self.set_state(ConnectionState::Disconnected);
                    DisconnectReason::Error(e.to_string())
                }
            };

            if reason.is_intentional() {
                info!("{} channel closed cleanly by the server", self.kind);
                return;
            }

            if !self.policy.should_attempt_reconnect(&reason, attempt) {
                error!(
                    "{} channel gave up after {} reconnect attempts",
                    self.kind, attempt
                );
                self.set_state(ConnectionState::Error);
                match self.wait_for_reconnect().await {
                    Wake::Proceed => {
                        attempt = 0;
                        continue;
                    }
                    Wake::Stop => {
                        self.set_state(ConnectionState::Disconnected);
                        return;
                    }
                }
            }

            let delay = self.policy.delay_for_attempt(attempt);
            attempt += 1;
            self.set_state(ConnectionState::Reconnecting);
            info!(
                "Reconnecting {} channel in {}ms (attempt {})",
                self.kind,
                delay.as_millis(),
                attempt
            );

            match self.backoff(delay).await {
                Wake::Proceed => {}
                Wake::Stop => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }

    /// Open the socket while still honouring commands.
    ///
    /// Returns `None` when a disconnect arrives before the open completes.
    async fn open(&mut self) -> Option<Result<Box<dyn Socket>, TransportError>> {
        let url = self.target.borrow().url.clone();
        let open = self.transport.open(&url);
        tokio::pin!(open);

        loop {
            tokio::select! {
                result = &mut open => return Some(result),
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => {}
                    Some(Command::Disconnect) | None => return None,
                },
            }
        }
    }

    /// Fire-and-forget greeting; failures are logged, never retried here
    async fn greet(&mut self, socket: &mut dyn Socket) {
        let greeting = self.target.borrow().greeting.clone();
        for text in greeting {
            if let Err(e) = socket.send_text(text).await {
                warn!("{} channel greeting not sent: {}", self.kind, e);
            }
        }
    }

    async fn run_session(&mut self, socket: &mut dyn Socket) -> DisconnectReason {
        loop {
            tokio::select! {
                frame = socket.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => self.forward(&text),
                    Some(Ok(Frame::Close(code))) => {
                        info!("{} channel closed by peer (code {:?})", self.kind, code);
                        return DisconnectReason::ClosedByPeer { code };
                    }
                    Some(Ok(Frame::Other)) => {}
                    Some(Err(e)) => {
                        warn!("{} channel read error: {}", self.kind, e);
                        return DisconnectReason::Error(e.to_string());
                    }
                    None => return DisconnectReason::ClosedByPeer { code: None },
                },
                outbound = self.outbound.recv() => match outbound {
                    Some(text) => {
                        if let Err(e) = socket.send_text(text).await {
                            warn!("{} channel write error: {}", self.kind, e);
                            return DisconnectReason::Error(e.to_string());
                        }
                    }
                    None => return DisconnectReason::Requested,
                },
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => {
                        debug!("{} channel already connected; reconnect ignored", self.kind);
                    }
                    Some(Command::Disconnect) | None => return DisconnectReason::Requested,
                },
            }
        }
    }

    async fn backoff(&mut self, delay: std::time::Duration) -> Wake {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => Wake::Proceed,
            command = self.commands.recv() => match command {
                Some(Command::Reconnect) => Wake::Proceed,
                Some(Command::Disconnect) | None => Wake::Stop,
            },
        }
    }

    async fn wait_for_reconnect(&mut self) -> Wake {
        match self.commands.recv().await {
            Some(Command::Reconnect) => Wake::Proceed,
            Some(Command::Disconnect) | None => Wake::Stop,
        }
    }

    fn forward(&self, text: &str) {
        match decode_inbound(self.kind, text) {
            Ok(event) => self.emit(ChannelPayload::Inbound(event)),
            Err(e) => warn!("Dropping malformed {} frame: {}", self.kind, e),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        self.emit(ChannelPayload::State(state));
    }

    fn emit(&self, payload: ChannelPayload) {
        let _ = self.events.send(ChannelEvent {
            kind: self.kind,
            epoch: self.epoch,
            payload,
        });
    }
}
