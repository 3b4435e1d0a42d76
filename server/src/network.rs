//! Server network layer: TCP listener, session fan-out and the server loop

use crate::game::GameState;
use crate::session_manager::{Session, SessionManager};
use log::{debug, error, info, warn};
use shared::connection::{self, ConnectionConfig, EventReceiver, EventSender, NetEvent};
use shared::protocol::InitializeData;
use shared::{
    DriftPolicy, HandlerRegistry, Message, NetError, SessionId, TickScheduler, DEFAULT_HOST,
    DEFAULT_PORT, TICK_RATE, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Server settings, normally built from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub tick_rate: u32,
    pub drift_policy: DriftPolicy,
    pub max_sessions: usize,
    /// Close a session after this long without a frame from it
    pub idle_timeout: Option<Duration>,
    pub world_width: f32,
    pub world_height: f32,
    pub max_enemies: usize,
    /// Seed for spawn positions; random when unset
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            tick_rate: TICK_RATE,
            drift_policy: DriftPolicy::Accumulate,
            max_sessions: 32,
            idle_timeout: Some(Duration::from_secs(10)),
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            max_enemies: 3,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: self.idle_timeout,
            ..ConnectionConfig::default()
        }
    }
}

/// Messages queued by the game logic for delivery after the current
/// handler or tick returns
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send {
        to: SessionId,
        message: Message,
    },
    Broadcast {
        message: Message,
        exclude: Option<SessionId>,
    },
}

/// Accepts TCP connections and turns each into a registered session
pub struct Listener {
    listener: TcpListener,
    sessions: Arc<RwLock<SessionManager>>,
    config: ConnectionConfig,
    events: EventSender,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        sessions: Arc<RwLock<SessionManager>>,
        config: ConnectionConfig,
        events: EventSender,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Self {
            listener,
            sessions,
            config,
            events,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns the accept loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.accept_loop())
    }

    async fn accept_loop(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => self.admit(stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Announces the session id, registers the session and only then starts
    /// reading, so `Connected` always precedes the session's messages
    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let mut sessions = self.sessions.write().await;
        let Some(id) = sessions.allocate_id() else {
            warn!("Rejecting {}: server full ({} sessions)", addr, sessions.len());
            return;
        };

        let (handle, reader) = connection::open(stream, id, self.config.clone(), self.events.clone());
        if let Err(e) = handle.send(&Message::Initialize(InitializeData { id })) {
            warn!("Could not greet session {}: {}", id, e);
            handle.close();
            return;
        }

        sessions.insert(Session::new(id, addr, handle));
        drop(sessions);

        if self.events.send(NetEvent::Connected { session: id }).is_err() {
            error!("Server loop is gone, dropping session {}", id);
            if let Some(session) = self.sessions.write().await.remove(id) {
                session.connection.close();
            }
            return;
        }
        reader.start();
    }
}

/// Main server coordinating the listener, the session table and the game
pub struct Server {
    local_addr: SocketAddr,
    sessions: Arc<RwLock<SessionManager>>,
    game: GameState,
    registry: HandlerRegistry<GameState>,
    scheduler: TickScheduler,
    events_rx: EventReceiver,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Binds the listener and starts accepting connections
    pub async fn bind(config: ServerConfig) -> Result<Self, NetError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(RwLock::new(SessionManager::new(config.max_sessions)));

        let listener = Listener::bind(
            &config.addr,
            Arc::clone(&sessions),
            config.connection_config(),
            events_tx,
        )
        .await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            sessions,
            game: GameState::new(&config),
            registry: GameState::registry(),
            scheduler: TickScheduler::new(config.tick_rate, config.drift_policy),
            events_rx,
            accept_task: listener.spawn(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn send(&self, to: SessionId, message: &Message) -> Result<(), NetError> {
        self.sessions.read().await.send(to, message)
    }

    pub async fn send_to_all(&self, message: &Message) -> Result<usize, NetError> {
        self.sessions.read().await.send_to_all(message)
    }

    pub async fn send_to_all_except(
        &self,
        exclude: SessionId,
        message: &Message,
    ) -> Result<usize, NetError> {
        self.sessions.read().await.send_to_all_except(exclude, message)
    }

    /// Delivers everything the game logic queued
    async fn flush_outbox(&mut self) {
        let outbox = self.game.take_outbox();
        if outbox.is_empty() {
            return;
        }

        let sessions = self.sessions.read().await;
        for item in outbox {
            let result = match &item {
                Outbound::Send { to, message } => sessions.send(*to, message).map(|_| 1),
                Outbound::Broadcast {
                    message,
                    exclude: Some(exclude),
                } => sessions.send_to_all_except(*exclude, message),
                Outbound::Broadcast {
                    message,
                    exclude: None,
                } => sessions.send_to_all(message),
            };

            if let Err(e) = result {
                debug!("Dropped outbound message {:?}: {}", item, e);
            }
        }
    }

    async fn handle_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Connected { session } => {
                self.game.on_connect(session);
            }
            NetEvent::Message { session, message } => {
                self.registry.dispatch(&mut self.game, session, &message);
            }
            NetEvent::Disconnected { session, reason } => {
                debug!("Session {} disconnected: {:?}", session, reason);
                self.sessions.write().await.remove(session);
                self.game.on_disconnect(session);
            }
            NetEvent::ConnectFailed { reason } => {
                warn!("Unexpected connect failure on server: {}", reason);
            }
        }
    }

    /// Main server loop
    ///
    /// Runs until the event channel closes, which only happens once the
    /// accept task is gone.
    pub async fn run(&mut self) -> Result<(), NetError> {
        info!(
            "Server started, ticking every {:?} ({:?})",
            self.scheduler.period(),
            self.scheduler.policy()
        );

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                tick = self.scheduler.next_tick() => {
                    self.game.tick(tick.dt);

                    if tick.index % 600 == 0 {
                        debug!(
                            "Tick {}: {} sessions, {} enemies, last tick took {:?}",
                            tick.index,
                            self.session_count().await,
                            self.game.world().enemies.len(),
                            tick.elapsed
                        );
                    }
                }
            }

            self.flush_outbox().await;
        }

        Ok(())
    }

    /// Stops accepting and closes every session
    pub async fn shutdown(&self) {
        self.accept_task.abort();
        self.sessions.read().await.close_all();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
