//! # Arena Client Library
//!
//! This library provides the client side of the arena. It connects to the
//! authoritative server, keeps a replica of the world and reports the local
//! player's movement at the tick rate.
//!
//! ## Architecture Overview
//!
//! ### Local Prediction
//! The local player moves immediately from input every frame. Its position is
//! reported to the server each tick and is never corrected by echoes of its
//! own moves.
//!
//! ### Remote Smoothing
//! Other players and enemies jump to their authoritative position on arrival,
//! while the drawn position eases towards it frame by frame. The smoothing
//! factor is clamped so a long frame never overshoots.
//!
//! ### Server Authority
//! Enemy health, deaths and dropped items come from the server. Item drops
//! requested locally are only applied once the server echoes them back.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - The world replica and the handlers for server messages
//! - Per-frame movement, item cooldowns and projectiles
//! - Per-tick movement reports
//!
//! ### Input Module (`input`)
//! - The `InputSource` seam sampled once per frame
//! - Scripted and wandering input for headless runs
//!
//! ### Network Module (`network`)
//! - Single-attempt TCP connector that learns its session id from `Initialize`
//! - The client loop tying events, ticks and frames together
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::WanderInput;
//! use client::network::{Client, ClientConfig, SessionEnd};
//!
//! #[tokio::main]
//! async fn main() {
//!     let input = Box::new(WanderInput::new(None));
//!     let mut client = Client::connect(ClientConfig::default(), input).await;
//!
//!     match client.run().await {
//!         SessionEnd::ConnectFailed(reason) => eprintln!("{}", reason),
//!         end => println!("session ended: {:?}", end),
//!     }
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
