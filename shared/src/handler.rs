//! Message handler registry
//!
//! Client and server each subscribe to a subset of the catalog. A registry is
//! assembled once at startup through [`HandlerRegistryBuilder`] and is
//! read-only afterwards. Frames whose type has no handler are dropped.

use crate::protocol::{Message, MessageType, SessionId};
use log::trace;
use std::collections::HashMap;
use std::fmt;

/// Callback invoked with the mutable game state, the originating session and
/// the decoded message
pub type Handler<S> = Box<dyn Fn(&mut S, SessionId, &Message) + Send + Sync>;

/// Outcome of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unregistered,
}

pub struct HandlerRegistry<S> {
    handlers: HashMap<MessageType, Handler<S>>,
}

impl<S> HandlerRegistry<S> {
    pub fn builder() -> HandlerRegistryBuilder<S> {
        HandlerRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    /// Routes `message` to its handler, if one is registered
    pub fn dispatch(&self, state: &mut S, session: SessionId, message: &Message) -> Dispatch {
        let message_type = message.message_type();
        match self.handlers.get(&message_type) {
            Some(handler) => {
                handler(state, session, message);
                Dispatch::Handled
            }
            None => {
                trace!(
                    "No handler for {} from session {}, dropping",
                    message_type,
                    session
                );
                Dispatch::Unregistered
            }
        }
    }

    pub fn handles(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S> fmt::Debug for HandlerRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.tag());
        f.debug_struct("HandlerRegistry")
            .field("types", &types)
            .finish()
    }
}

pub struct HandlerRegistryBuilder<S> {
    handlers: HashMap<MessageType, Handler<S>>,
}

impl<S> HandlerRegistryBuilder<S> {
    /// Registers the handler for `message_type`, replacing any earlier one
    pub fn on<F>(mut self, message_type: MessageType, handler: F) -> Self
    where
        F: Fn(&mut S, SessionId, &Message) + Send + Sync + 'static,
    {
        self.handlers.insert(message_type, Box::new(handler));
        self
    }

    pub fn build(self) -> HandlerRegistry<S> {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}
