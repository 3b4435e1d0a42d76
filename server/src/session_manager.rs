//! Session table and message fan-out for the server
//!
//! This module tracks every accepted connection, including:
//! - Session id allocation (monotonic from 0, never reused)
//! - Capacity enforcement for new connections
//! - Addressed sends and broadcasts over the live connections
//!
//! The table is shared between the accept task, which registers new
//! sessions, and the server loop, which removes them when their connection
//! reports a disconnect.

use log::{debug, info};
use shared::codec;
use shared::connection::ConnectionHandle;
use shared::{Message, NetError, SessionId};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// One accepted connection
#[derive(Debug)]
pub struct Session {
    /// Identifier assigned by the server and announced with `Initialize`
    pub id: SessionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Sending side of the connection
    pub connection: ConnectionHandle,
    pub connected_at: Instant,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, connection: ConnectionHandle) -> Self {
        Self {
            id,
            addr,
            connection,
            connected_at: Instant::now(),
        }
    }
}

/// Owns the live sessions and hands out session ids
///
/// Ids are allocated strictly in accept order. An id that was handed out is
/// never handed out again, even after its session is gone.
#[derive(Debug)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, Session>,
    next_session_id: SessionId,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_session_id: 0,
            max_sessions,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Reserves the next session id
    ///
    /// Returns `None` when the server is at capacity; no id is consumed in
    /// that case.
    pub fn allocate_id(&mut self) -> Option<SessionId> {
        if self.is_full() {
            return None;
        }
        let id = self.next_session_id;
        self.next_session_id += 1;
        Some(id)
    }

    pub fn insert(&mut self, session: Session) {
        info!("Session {} connected from {}", session.id, session.addr);
        self.sessions.insert(session.id, session);
    }

    /// Forgets a session. Returns the removed entry, or `None` if it was
    /// already gone.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let removed = self.sessions.remove(&id);
        if let Some(session) = &removed {
            info!(
                "Session {} removed after {:.1}s",
                id,
                session.connected_at.elapsed().as_secs_f32()
            );
        }
        removed
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Session ids in ascending order
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Sends `message` to one session
    pub fn send(&self, to: SessionId, message: &Message) -> Result<(), NetError> {
        let session = self.sessions.get(&to).ok_or(NetError::NotConnected)?;
        session.connection.send(message)
    }

    /// Sends `message` to every session; returns how many accepted it
    pub fn send_to_all(&self, message: &Message) -> Result<usize, NetError> {
        self.fan_out(message, None)
    }

    /// Sends `message` to every session except `exclude`
    pub fn send_to_all_except(
        &self,
        exclude: SessionId,
        message: &Message,
    ) -> Result<usize, NetError> {
        self.fan_out(message, Some(exclude))
    }

    fn fan_out(&self, message: &Message, exclude: Option<SessionId>) -> Result<usize, NetError> {
        let frame: Arc<[u8]> = codec::encode(message)?.into();
        let mut delivered = 0;

        for (id, session) in &self.sessions {
            if Some(*id) == exclude {
                continue;
            }
            match session.connection.send_frame(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Skipping session {}: {}", id, e),
            }
        }

        Ok(delivered)
    }

    /// Closes every connection, used on shutdown
    pub fn close_all(&self) {
        for session in self.sessions.values() {
            session.connection.close();
        }
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
