//! Length-prefixed frame codec
//!
//! Frame layout, all integers little-endian:
//!
//! ```text
//! [u32 length][u32 message type][payload bytes]
//! ```
//!
//! `length` counts the message type and the payload, never the prefix itself.
//! Payloads are bincode records with fixed-width integers, written in the
//! field order of the matching struct in [`crate::protocol`].

use crate::error::ProtocolError;
use crate::protocol::{Message, MessageType};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Upper bound on `length`, so a corrupt prefix cannot make us buffer gigabytes
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

const LENGTH_PREFIX_LEN: usize = 4;
const TYPE_LEN: usize = 4;
const HEADER_LEN: usize = LENGTH_PREFIX_LEN + TYPE_LEN;

/// Result of trying to pull one frame off the front of a byte buffer
#[derive(Debug, PartialEq)]
pub enum Decoded {
    Frame { message: Message, consumed: usize },
    NeedMoreData,
}

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_FRAME_LEN as u64)
        .reject_trailing_bytes()
}

fn to_payload<T: Serialize>(data: &T) -> bincode::Result<Vec<u8>> {
    payload_options().serialize(data)
}

fn from_payload<T: DeserializeOwned>(bytes: &[u8]) -> bincode::Result<T> {
    payload_options().deserialize(bytes)
}

fn encode_payload(message: &Message) -> bincode::Result<Vec<u8>> {
    match message {
        Message::Initialize(data) => to_payload(data),
        Message::PlayerJoin(data) => to_payload(data),
        Message::PlayerDisconnect(data) => to_payload(data),
        Message::PlayerMove(data) => to_payload(data),
        Message::EnemySpawn(data) => to_payload(data),
        Message::EnemyMove(data) => to_payload(data),
        Message::PlayerDamage(data) => to_payload(data),
        Message::EnemyDamage(data) => to_payload(data),
        Message::PlayerDropItem(data) => to_payload(data),
        Message::UpdateDroppedItems(data) => to_payload(data),
        Message::UpdateItem(data) => to_payload(data),
        Message::PlayerUpdateDirection(data) => to_payload(data),
        Message::EnemyUpdateDirection(data) => to_payload(data),
    }
}

fn decode_payload(message_type: MessageType, bytes: &[u8]) -> bincode::Result<Message> {
    match message_type {
        MessageType::Initialize => from_payload(bytes).map(Message::Initialize),
        MessageType::PlayerJoin => from_payload(bytes).map(Message::PlayerJoin),
        MessageType::PlayerDisconnect => from_payload(bytes).map(Message::PlayerDisconnect),
        MessageType::PlayerMove => from_payload(bytes).map(Message::PlayerMove),
        MessageType::EnemySpawn => from_payload(bytes).map(Message::EnemySpawn),
        MessageType::EnemyMove => from_payload(bytes).map(Message::EnemyMove),
        MessageType::PlayerDamage => from_payload(bytes).map(Message::PlayerDamage),
        MessageType::EnemyDamage => from_payload(bytes).map(Message::EnemyDamage),
        MessageType::PlayerDropItem => from_payload(bytes).map(Message::PlayerDropItem),
        MessageType::UpdateDroppedItems => from_payload(bytes).map(Message::UpdateDroppedItems),
        MessageType::UpdateItem => from_payload(bytes).map(Message::UpdateItem),
        MessageType::PlayerUpdateDirection => {
            from_payload(bytes).map(Message::PlayerUpdateDirection)
        }
        MessageType::EnemyUpdateDirection => from_payload(bytes).map(Message::EnemyUpdateDirection),
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Encodes one message into a complete frame
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let message_type = message.message_type();
    let payload =
        encode_payload(message).map_err(|source| ProtocolError::Encode { message_type, source })?;

    let length = TYPE_LEN + payload.len();
    if length > MAX_FRAME_LEN as usize {
        return Err(ProtocolError::FrameTooLarge {
            declared: u32::try_from(length).unwrap_or(u32::MAX),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + length);
    frame.extend_from_slice(&(length as u32).to_le_bytes());
    frame.extend_from_slice(&message_type.tag().to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Attempts to decode the first frame in `buf`
///
/// The length prefix and the type tag are validated as soon as their bytes
/// are present, so a corrupt stream is rejected without waiting for a payload
/// that will never come.
pub fn decode_frame(buf: &[u8]) -> Result<Decoded, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(Decoded::NeedMoreData);
    }

    let declared = read_u32(buf);
    if declared < TYPE_LEN as u32 {
        return Err(ProtocolError::FrameTooShort { declared });
    }
    if declared > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            declared,
            max: MAX_FRAME_LEN,
        });
    }

    if buf.len() < HEADER_LEN {
        return Ok(Decoded::NeedMoreData);
    }
    let message_type = MessageType::try_from(read_u32(&buf[LENGTH_PREFIX_LEN..]))?;

    let total = LENGTH_PREFIX_LEN + declared as usize;
    if buf.len() < total {
        return Ok(Decoded::NeedMoreData);
    }

    let message = decode_payload(message_type, &buf[HEADER_LEN..total])
        .map_err(|source| ProtocolError::MalformedPayload {
            message_type,
            source,
        })?;

    Ok(Decoded::Frame {
        message,
        consumed: total,
    })
}

/// Incremental decoder that keeps partial frames between reads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pops the next complete message, or `None` if more bytes are needed
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        match decode_frame(&self.buffer)? {
            Decoded::Frame { message, consumed } => {
                self.buffer.drain(..consumed);
                Ok(Some(message))
            }
            Decoded::NeedMoreData => Ok(None),
        }
    }

    /// Number of bytes held back waiting for the rest of a frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
