//! # Arena Server Library
//!
//! This library provides the authoritative server for the arena. It owns the
//! canonical copy of every entity, runs the simulation at a fixed tick rate
//! and fans state changes out to all connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Enemy spawning, enemy pursuit, projectile hits and item drops are decided
//! here. Clients only predict their own player's position and report it.
//!
//! ### Session Management
//! Every accepted TCP connection becomes a session with a fresh id, announced
//! to the client with an `Initialize` message before any other traffic. Ids
//! start at 0 and are never reused within a process.
//!
//! ### State Broadcasting
//! Game logic never writes to sockets. It queues outbound messages which the
//! server loop delivers after each handler or tick, encoding each broadcast
//! once for all recipients.
//!
//! ## Architecture Design
//!
//! ### Single Owning Task
//! One task runs `tokio::select!` over the network event channel and the tick
//! scheduler. Handlers and ticks therefore never overlap and the game state
//! needs no lock. Reading and writing happen in per-connection tasks.
//!
//! ### TCP Framing
//! Messages travel over TCP as length-prefixed frames. Frames never assume
//! alignment with socket reads; see `shared::codec`.
//!
//! ## Module Organization
//!
//! ### Session Manager Module (`session_manager`)
//! - Session id allocation and capacity limits
//! - Addressed sends and broadcasts with an optional excluded session
//!
//! ### Game Module (`game`)
//! - Join roster and disconnect announcements
//! - Movement relay and item use
//! - Enemy pursuit over the quadtree broadphase
//!
//! ### Network Module (`network`)
//! - TCP listener and accept loop
//! - The server loop tying events, ticks and the outbox together
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Runs the main loop which:
//!     // - Accepts connections and greets them with their session id
//!     // - Dispatches client messages to the game handlers
//!     // - Ticks the simulation at 60Hz
//!     // - Delivers queued messages to the sessions
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod session_manager;
