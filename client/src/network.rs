//! Client network layer: single-attempt connector and the client loop

use crate::game::ClientGameState;
use crate::input::InputSource;
use log::{debug, error, info, warn};
use shared::connection::{self, CloseReason, ConnectionConfig, ConnectionHandle, EventReceiver, NetEvent};
use shared::{
    DriftPolicy, HandlerRegistry, Message, NetError, SessionId, TickScheduler, DEFAULT_HOST,
    DEFAULT_PORT, TICK_RATE, UNIDENTIFIED,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Client settings, normally built from the command line
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub tick_rate: u32,
    pub drift_policy: DriftPolicy,
    /// Render frames per second
    pub frame_rate: u32,
    pub idle_timeout: Option<Duration>,
    /// Disconnect on our own after this long
    pub run_for: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            tick_rate: TICK_RATE,
            drift_policy: DriftPolicy::Accumulate,
            frame_rate: 60,
            idle_timeout: None,
            run_for: None,
        }
    }
}

/// Connection to the server as seen by the client
///
/// Wraps one [`ConnectionHandle`] and turns the server's `Initialize`
/// greeting into a [`NetEvent::Connected`] carrying the assigned id.
pub struct ClientNetwork {
    connection: Option<ConnectionHandle>,
    local_id: SessionId,
    events: EventReceiver,
}

impl ClientNetwork {
    /// Makes a single connection attempt
    ///
    /// Never fails directly: a failed attempt is reported as exactly one
    /// [`NetEvent::ConnectFailed`] from [`ClientNetwork::next_event`].
    pub async fn connect(addr: &str, config: ConnectionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let connection = match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle: {}", e);
                }
                info!("Connected to {}, waiting for session id", addr);
                let (handle, reader) = connection::open(stream, UNIDENTIFIED, config, tx);
                reader.start();
                Some(handle)
            }
            Err(source) => {
                let error = NetError::Connect {
                    addr: addr.to_string(),
                    source,
                };
                error!("{}", error);
                let _ = tx.send(NetEvent::ConnectFailed {
                    reason: error.to_string(),
                });
                None
            }
        };

        Self {
            connection,
            local_id: UNIDENTIFIED,
            events: rx,
        }
    }

    /// Id assigned by the server, `UNIDENTIFIED` until `Initialize` arrives
    pub fn local_id(&self) -> SessionId {
        self.local_id
    }

    pub fn is_connected(&self) -> bool {
        self.local_id != UNIDENTIFIED
            && self
                .connection
                .as_ref()
                .map_or(false, ConnectionHandle::is_open)
    }

    /// Sends a message to the server. Fails with `NotConnected` until the
    /// session id is known and after the connection closed.
    pub fn send(&self, message: &Message) -> Result<(), NetError> {
        if self.local_id == UNIDENTIFIED {
            return Err(NetError::NotConnected);
        }
        match &self.connection {
            Some(connection) => connection.send(message),
            None => Err(NetError::NotConnected),
        }
    }

    pub fn close(&self) {
        if let Some(connection) = &self.connection {
            connection.close();
        }
    }

    /// Next event for the game loop; cancel-safe
    ///
    /// Returns `None` once a failed attempt has been reported.
    pub async fn next_event(&mut self) -> Option<NetEvent> {
        let event = self.events.recv().await?;
        Some(self.relay(event))
    }

    fn relay(&mut self, event: NetEvent) -> NetEvent {
        match event {
            NetEvent::Message {
                message: Message::Initialize(data),
                ..
            } if self.local_id == UNIDENTIFIED => {
                info!("Server assigned session id {}", data.id);
                self.local_id = data.id;
                if let Some(connection) = &self.connection {
                    connection.set_session(data.id);
                }
                NetEvent::Connected { session: data.id }
            }
            other => other,
        }
    }
}

/// How a client run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ConnectFailed(String),
    Disconnected(CloseReason),
    Finished,
}

/// Headless client tying the connection, the replica and an input source
pub struct Client {
    network: ClientNetwork,
    game: ClientGameState,
    registry: HandlerRegistry<ClientGameState>,
    input: Box<dyn InputSource + Send>,
    scheduler: TickScheduler,
    frame_period: Duration,
    run_for: Option<Duration>,
}

impl Client {
    pub async fn connect(config: ClientConfig, input: Box<dyn InputSource + Send>) -> Self {
        let connection_config = ConnectionConfig {
            idle_timeout: config.idle_timeout,
            ..ConnectionConfig::default()
        };
        let network = ClientNetwork::connect(&config.server_addr, connection_config).await;

        Self {
            network,
            game: ClientGameState::new(),
            registry: ClientGameState::registry(),
            input,
            scheduler: TickScheduler::new(config.tick_rate, config.drift_policy),
            frame_period: Duration::from_secs_f64(1.0 / config.frame_rate.max(1) as f64),
            run_for: config.run_for,
        }
    }

    pub fn game(&self) -> &ClientGameState {
        &self.game
    }

    pub fn network(&self) -> &ClientNetwork {
        &self.network
    }

    fn flush_outbox(&mut self) {
        for message in self.game.take_outbox() {
            if let Err(e) = self.network.send(&message) {
                debug!("Dropped {}: {}", message.message_type(), e);
            }
        }
    }

    /// Runs until the connection fails, closes, or `run_for` elapses
    pub async fn run(&mut self) -> SessionEnd {
        let mut frames = interval(self.frame_period);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        let stop_at = self.run_for.map(|limit| Instant::now() + limit);
        let stop = async move {
            match stop_at {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(stop);

        loop {
            tokio::select! {
                event = self.network.next_event() => {
                    match event {
                        Some(NetEvent::Connected { session }) => self.game.on_connected(session),
                        Some(NetEvent::Message { session, message }) => {
                            self.registry.dispatch(&mut self.game, session, &message);
                        }
                        Some(NetEvent::Disconnected { reason, .. }) => {
                            warn!("Disconnected from server: {:?}", reason);
                            return SessionEnd::Disconnected(reason);
                        }
                        Some(NetEvent::ConnectFailed { reason }) => {
                            return SessionEnd::ConnectFailed(reason);
                        }
                        None => return SessionEnd::Disconnected(CloseReason::Local),
                    }
                }

                _ = self.scheduler.next_tick() => {
                    self.game.on_tick();
                }

                _ = frames.tick() => {
                    let now = Instant::now();
                    let frame_time = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;

                    let input = self.input.sample(frame_time);
                    self.game.update_frame(&input, frame_time);
                }

                _ = &mut stop => {
                    info!("Run time elapsed, disconnecting");
                    self.network.close();
                    return SessionEnd::Finished;
                }
            }

            self.flush_outbox();
        }
    }
}
