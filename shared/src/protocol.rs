//! Message catalog shared by client and server
//!
//! The catalog is closed: every `MessageType` tag maps to exactly one payload
//! record and one `Message` variant. Payload fields are written to the wire in
//! declaration order, so reordering a field is a protocol break.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identity of one live connection
pub type SessionId = i32;

/// Session id held by a client before the server's `Initialize` arrives
pub const UNIDENTIFIED: SessionId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Initialize = 0,
    PlayerJoin = 1,
    PlayerDisconnect = 2,
    PlayerMove = 3,
    EnemySpawn = 4,
    EnemyMove = 5,
    PlayerDamage = 6,
    EnemyDamage = 7,
    PlayerDropItem = 8,
    UpdateDroppedItems = 9,
    UpdateItem = 10,
    PlayerUpdateDirection = 11,
    EnemyUpdateDirection = 12,
}

impl MessageType {
    pub const ALL: [MessageType; 13] = [
        MessageType::Initialize,
        MessageType::PlayerJoin,
        MessageType::PlayerDisconnect,
        MessageType::PlayerMove,
        MessageType::EnemySpawn,
        MessageType::EnemyMove,
        MessageType::PlayerDamage,
        MessageType::EnemyDamage,
        MessageType::PlayerDropItem,
        MessageType::UpdateDroppedItems,
        MessageType::UpdateItem,
        MessageType::PlayerUpdateDirection,
        MessageType::EnemyUpdateDirection,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        MessageType::ALL
            .get(tag as usize)
            .copied()
            .ok_or(ProtocolError::UnknownMessageType(tag))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeData {
    pub id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoinData {
    pub id: SessionId,
    pub x: f32,
    pub y: f32,
    pub health: i32,
    pub max_health: i32,
    pub speed: f32,
    pub size: i32,
    pub item_types: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDisconnectData {
    pub id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMoveData {
    pub id: SessionId,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySpawnData {
    pub id: i32,
    pub x: f32,
    pub y: f32,
    pub enemy_type: i32,
    pub health: i32,
    pub max_health: i32,
    pub damage: i32,
    pub speed: f32,
    pub size: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyMoveData {
    pub id: i32,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDamageData {
    pub id: SessionId,
    pub damage: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyDamageData {
    pub id: i32,
    pub damage: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDropItemData {
    pub id: SessionId,
    pub index: i32,
}

/// Full-state snapshot of every dropped item, as three parallel sequences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDroppedItemsData {
    pub types: Vec<i32>,
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateItemData {
    pub player_id: SessionId,
    pub index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdateDirectionData {
    pub id: SessionId,
    pub direction: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyUpdateDirectionData {
    pub id: i32,
    pub direction: i32,
}

/// A decoded message: the type tag and its payload in one value
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Initialize(InitializeData),
    PlayerJoin(PlayerJoinData),
    PlayerDisconnect(PlayerDisconnectData),
    PlayerMove(PlayerMoveData),
    EnemySpawn(EnemySpawnData),
    EnemyMove(EnemyMoveData),
    PlayerDamage(PlayerDamageData),
    EnemyDamage(EnemyDamageData),
    PlayerDropItem(PlayerDropItemData),
    UpdateDroppedItems(UpdateDroppedItemsData),
    UpdateItem(UpdateItemData),
    PlayerUpdateDirection(PlayerUpdateDirectionData),
    EnemyUpdateDirection(EnemyUpdateDirectionData),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Initialize(_) => MessageType::Initialize,
            Message::PlayerJoin(_) => MessageType::PlayerJoin,
            Message::PlayerDisconnect(_) => MessageType::PlayerDisconnect,
            Message::PlayerMove(_) => MessageType::PlayerMove,
            Message::EnemySpawn(_) => MessageType::EnemySpawn,
            Message::EnemyMove(_) => MessageType::EnemyMove,
            Message::PlayerDamage(_) => MessageType::PlayerDamage,
            Message::EnemyDamage(_) => MessageType::EnemyDamage,
            Message::PlayerDropItem(_) => MessageType::PlayerDropItem,
            Message::UpdateDroppedItems(_) => MessageType::UpdateDroppedItems,
            Message::UpdateItem(_) => MessageType::UpdateItem,
            Message::PlayerUpdateDirection(_) => MessageType::PlayerUpdateDirection,
            Message::EnemyUpdateDirection(_) => MessageType::EnemyUpdateDirection,
        }
    }
}
