//! Error types for the wire protocol and the connection layer

use crate::protocol::MessageType;
use std::io;
use thiserror::Error;

/// Errors raised while encoding or decoding frames.
///
/// Every variant except `Encode` means the inbound byte stream can no longer
/// be trusted, and the connection that produced it is closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("declared frame length {declared} exceeds the maximum of {max} bytes")]
    FrameTooLarge { declared: u32, max: u32 },

    #[error("declared frame length {declared} is too short to hold a message type")]
    FrameTooShort { declared: u32 },

    #[error("unknown message type tag {0}")]
    UnknownMessageType(u32),

    #[error("malformed {message_type:?} payload: {source}")]
    MalformedPayload {
        message_type: MessageType,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to encode {message_type:?} payload: {source}")]
    Encode {
        message_type: MessageType,
        #[source]
        source: bincode::Error,
    },
}

/// Errors surfaced to callers of the networking API
#[derive(Debug, Error)]
pub enum NetError {
    #[error("not connected")]
    NotConnected,

    #[error("send queue full, connection closed")]
    SendQueueFull,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
