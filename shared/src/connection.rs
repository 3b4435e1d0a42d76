//! Stream connection: framed reads, serialized writes, one-shot disconnect
//!
//! A connection owns one byte stream (TCP in production). [`open`] splits it
//! into a writer task fed by a bounded queue and a [`ConnectionReader`]
//! that the owner starts once it has announced the session. Everything the
//! connection observes is reported as a [`NetEvent`] on the owner's channel,
//! so game code never runs inside the I/O tasks.

use crate::codec::{self, FrameDecoder};
use crate::error::NetError;
use crate::protocol::{Message, SessionId, UNIDENTIFIED};
use log::{debug, info, trace, warn};
use std::io;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Close the connection when nothing is read for this long
    pub idle_timeout: Option<Duration>,
    pub read_buffer_size: usize,
    /// Frames that may wait for the writer before the peer is dropped
    pub send_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            read_buffer_size: 4096,
            send_queue_capacity: 1024,
        }
    }
}

/// Why a connection moved to `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    Io(String),
    Protocol(String),
    IdleTimeout,
    /// The peer stopped reading and its outbound queue filled up
    SendQueueFull,
    Local,
}

/// Events delivered to the process that owns the connections
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Connected {
        session: SessionId,
    },
    ConnectFailed {
        reason: String,
    },
    Message {
        session: SessionId,
        message: Message,
    },
    Disconnected {
        session: SessionId,
        reason: CloseReason,
    },
}

pub type EventSender = mpsc::UnboundedSender<NetEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NetEvent>;

enum Outbound {
    Frame(Arc<[u8]>),
    Shutdown,
}

struct Shared {
    session: AtomicI32,
    state: AtomicU8,
    events: EventSender,
    outbound: mpsc::Sender<Outbound>,
    closed: Notify,
    abort_writes: Notify,
}

impl Shared {
    fn session(&self) -> SessionId {
        self.session.load(Ordering::Acquire)
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `Closed`; only the first caller reports the disconnect
    fn close(&self, reason: CloseReason) -> bool {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
            return false;
        }

        let session = self.session();
        match &reason {
            CloseReason::PeerClosed | CloseReason::Local => {
                info!("Session {} closed ({:?})", session, reason)
            }
            _ => warn!("Session {} closed: {:?}", session, reason),
        }

        // Queued frames are flushed unless the peer stopped reading them
        if reason == CloseReason::SendQueueFull
            || self.outbound.try_send(Outbound::Shutdown).is_err()
        {
            self.abort_writes.notify_one();
        }
        self.closed.notify_one();
        let _ = self.events.send(NetEvent::Disconnected { session, reason });
        true
    }
}

/// Cloneable sending side of a connection
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn session(&self) -> SessionId {
        self.shared.session()
    }

    /// Rebinds the session id reported in events, used once the client learns
    /// its id from the server. Moves a `Connecting` connection to `Open`.
    pub fn set_session(&self, session: SessionId) {
        self.shared.session.store(session, Ordering::Release);
        let _ = self.shared.state.compare_exchange(
            STATE_CONNECTING,
            STATE_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Encodes and queues a message; never waits on the socket
    pub fn send(&self, message: &Message) -> Result<(), NetError> {
        if !self.is_open() {
            return Err(NetError::NotConnected);
        }
        let frame = codec::encode(message)?;
        self.send_frame(frame.into())
    }

    /// Queues an already encoded frame, so a broadcast encodes only once
    ///
    /// A peer that lets the queue fill up is disconnected with
    /// [`CloseReason::SendQueueFull`].
    pub fn send_frame(&self, frame: Arc<[u8]>) -> Result<(), NetError> {
        if !self.is_open() {
            return Err(NetError::NotConnected);
        }
        match self.shared.outbound.try_send(Outbound::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.shared.close(CloseReason::SendQueueFull);
                Err(NetError::SendQueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(NetError::NotConnected),
        }
    }

    /// Closes the connection from this side. Frames queued before the call
    /// are still flushed.
    pub fn close(&self) {
        self.shared.close(CloseReason::Local);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("session", &self.session())
            .field("state", &self.state())
            .finish()
    }
}

/// Receiving side of a connection, started after the owner is ready
pub struct ConnectionReader<R> {
    reader: R,
    shared: Arc<Shared>,
    config: ConnectionConfig,
}

/// Opens a connection over `stream`
///
/// The writer task starts immediately so the caller can queue a greeting;
/// reading begins when [`ConnectionReader::start`] is called. A connection
/// opened as `UNIDENTIFIED` stays `Connecting` until
/// [`ConnectionHandle::set_session`] names it. Must be called from within a
/// Tokio runtime.
pub fn open<S>(
    stream: S,
    session: SessionId,
    config: ConnectionConfig,
    events: EventSender,
) -> (ConnectionHandle, ConnectionReader<ReadHalf<S>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_capacity.max(1));

    let initial = if session == UNIDENTIFIED {
        STATE_CONNECTING
    } else {
        STATE_OPEN
    };
    let shared = Arc::new(Shared {
        session: AtomicI32::new(session),
        state: AtomicU8::new(initial),
        events,
        outbound: outbound_tx,
        closed: Notify::new(),
        abort_writes: Notify::new(),
    });

    tokio::spawn(write_loop(writer, outbound_rx, Arc::clone(&shared)));

    let handle = ConnectionHandle {
        shared: Arc::clone(&shared),
    };
    let reader = ConnectionReader {
        reader,
        shared,
        config,
    };
    (handle, reader)
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Outbound>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    let aborted = shared.abort_writes.notified();
    tokio::pin!(aborted);

    loop {
        let item = tokio::select! {
            _ = &mut aborted => return,
            item = outbound.recv() => item,
        };
        match item {
            Some(Outbound::Frame(frame)) => {
                let written = tokio::select! {
                    _ = &mut aborted => return,
                    written = writer.write_all(&frame) => written,
                };
                if let Err(e) = written {
                    shared.close(CloseReason::Io(e.to_string()));
                    return;
                }
            }
            Some(Outbound::Shutdown) | None => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Session {} write shutdown: {}", shared.session(), e);
    }
}

enum ReadOutcome {
    Bytes(usize),
    Idle,
}

async fn read_some<R>(
    reader: &mut R,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => match timeout(limit, reader.read(buf)).await {
            Ok(result) => result.map(ReadOutcome::Bytes),
            Err(_) => Ok(ReadOutcome::Idle),
        },
        None => reader.read(buf).await.map(ReadOutcome::Bytes),
    }
}

impl<R> ConnectionReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Spawns the read loop
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Reads until the stream ends, fails, or the connection is closed locally
    pub async fn run(self) {
        let ConnectionReader {
            mut reader,
            shared,
            config,
        } = self;

        let mut buf = vec![0u8; config.read_buffer_size.max(1)];
        let mut decoder = FrameDecoder::new();

        let reason = 'read: loop {
            let outcome = tokio::select! {
                _ = shared.closed.notified() => return,
                outcome = read_some(&mut reader, &mut buf, config.idle_timeout) => outcome,
            };

            let n = match outcome {
                Ok(ReadOutcome::Bytes(0)) => break 'read CloseReason::PeerClosed,
                Ok(ReadOutcome::Bytes(n)) => n,
                Ok(ReadOutcome::Idle) => break 'read CloseReason::IdleTimeout,
                Err(e) => break 'read CloseReason::Io(e.to_string()),
            };

            decoder.extend(&buf[..n]);
            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => {
                        let session = shared.session();
                        trace!("Session {} received {}", session, message.message_type());
                        if shared
                            .events
                            .send(NetEvent::Message { session, message })
                            .is_err()
                        {
                            break 'read CloseReason::Local;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => break 'read CloseReason::Protocol(e.to_string()),
                }
            }
        };

        shared.close(reason);
    }
}
