//! Shared netcode core for the arena server and client
//!
//! This crate holds everything both processes agree on:
//!
//! - **Wire protocol** ([`protocol`], [`codec`]): a closed catalog of message
//!   types, each framed as `[u32 length][u32 type][payload]` in little-endian
//!   byte order and encoded with bincode.
//! - **Dispatch** ([`handler`]): a registry that routes decoded messages to
//!   game-state callbacks by type.
//! - **Connections** ([`connection`]): one reader and one writer task per
//!   stream, reporting everything as [`connection::NetEvent`]s.
//! - **Simulation support** ([`tick`], [`quadtree`], [`sync`], [`entity`],
//!   [`world`]): the fixed-rate tick scheduler, the broadphase index and the
//!   authoritative/visual entity model.

pub mod codec;
pub mod connection;
pub mod entity;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod quadtree;
pub mod sync;
pub mod tick;
pub mod world;

pub use codec::{encode, FrameDecoder, MAX_FRAME_LEN};
pub use connection::{CloseReason, ConnectionConfig, ConnectionHandle, NetEvent};
pub use error::{NetError, ProtocolError};
pub use handler::{Dispatch, HandlerRegistry};
pub use protocol::{Message, MessageType, SessionId, UNIDENTIFIED};
pub use tick::{DriftPolicy, Tick, TickScheduler};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8052;
pub const TICK_RATE: u32 = 60;

pub const WORLD_WIDTH: f32 = 640.0;
pub const WORLD_HEIGHT: f32 = 480.0;

/// Side length of every square sprite and collider
pub const ENTITY_SIZE: i32 = 32;

/// How fast remote entities ease toward their authoritative position
pub const SMOOTHING_RATE: f32 = 10.0;
