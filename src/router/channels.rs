//! Channel registry: named broadcast groups.
//!
//! Each channel owns an ordered listener set, an optional admission
//! validator, and a bounded queue drained by its own broadcaster task.
//!
//! # Fan-out
//!
//! ```text
//! publish ──► queue (bounded) ──► broadcaster ──► listener 1 outbound queue
//!                                      ├────────► listener 2 outbound queue
//!                                      └────────► listener n outbound queue
//! ```
//!
//! A listener whose delivery fails is removed on the spot. Listener sets
//! are locked per channel; the registry lock is only held for lookups.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::Message;
use crate::transport::pool::SessionPool;

// ============================================================================
// Types
// ============================================================================

/// Admission check run against a session's credential when it listens.
///
/// Returning `Err(reason)` keeps the session out of the channel.
pub type ChannelValidator = Arc<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

// ============================================================================
// ListenerSet
// ============================================================================

/// Ordered set of subscribed sessions.
///
/// Membership checks are O(1); removal keeps the order of everyone else.
#[derive(Debug, Default, Clone)]
pub struct ListenerSet {
    order: Vec<SessionId>,
    members: FxHashSet<SessionId>,
}

impl ListenerSet {
    /// Creates an empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a session. Returns `false` if it was already present.
    pub fn insert(&mut self, session_id: SessionId) -> bool {
        if !self.members.insert(session_id) {
            return false;
        }
        self.order.push(session_id);
        true
    }

    /// Removes a session. Returns `false` if it was not present.
    pub fn remove(&mut self, session_id: SessionId) -> bool {
        if !self.members.remove(&session_id) {
            return false;
        }
        if let Some(index) = self.order.iter().position(|id| *id == session_id) {
            self.order.remove(index);
        }
        true
    }

    /// Returns `true` if the session is a member.
    #[inline]
    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.contains(&session_id)
    }

    /// Returns the number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if there are no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates members in subscription order.
    pub fn iter(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.order.iter().copied()
    }

    /// Returns the members in subscription order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<SessionId> {
        self.order.clone()
    }
}

// ============================================================================
// Channel
// ============================================================================

/// One named broadcast group.
struct Channel {
    listeners: Arc<Mutex<ListenerSet>>,
    queue: mpsc::Sender<Message>,
    validator: Option<ChannelValidator>,
}

// ============================================================================
// ChannelRegistry
// ============================================================================

/// Named channels and their listeners.
///
/// Channels are created during setup and live for as long as the registry.
pub struct ChannelRegistry {
    channels: RwLock<FxHashMap<String, Arc<Channel>>>,
    sessions: Arc<SessionPool>,
    queue_capacity: usize,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels.read().keys().collect::<Vec<_>>())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl ChannelRegistry {
    /// Creates an empty registry delivering through `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SessionPool>, queue_capacity: usize) -> Self {
        Self {
            channels: RwLock::new(FxHashMap::default()),
            sessions,
            queue_capacity,
        }
    }

    /// Creates a channel and starts its broadcaster.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the name is empty
    /// - [`Error::DuplicateChannel`] if the name is taken
    pub fn create(&self, name: &str, validator: Option<ChannelValidator>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation("channel name may not be empty"));
        }

        let mut channels = self.channels.write();
        if channels.contains_key(name) {
            return Err(Error::duplicate_channel(name));
        }

        let guarded = validator.is_some();
        let (queue, queue_rx) = mpsc::channel(self.queue_capacity);
        let listeners = Arc::new(Mutex::new(ListenerSet::new()));

        tokio::spawn(run_broadcaster(
            Arc::from(name),
            Arc::clone(&listeners),
            queue_rx,
            Arc::clone(&self.sessions),
        ));

        channels.insert(
            name.to_owned(),
            Arc::new(Channel {
                listeners,
                queue,
                validator,
            }),
        );

        debug!(channel = name, guarded, "Channel created");
        Ok(())
    }

    /// Adds a session to a channel's listeners.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotFound`] if the channel does not exist
    /// - [`Error::Unauthorized`] if the validator rejects `credential`
    /// - [`Error::AlreadySubscribed`] if the session already listens
    pub fn subscribe(&self, session_id: SessionId, name: &str, credential: &str) -> Result<()> {
        let channel = self.get(name)?;

        if let Some(validator) = &channel.validator {
            validator(credential).map_err(|reason| Error::unauthorized(name, reason))?;
        }

        if !channel.listeners.lock().insert(session_id) {
            return Err(Error::already_subscribed(session_id, name));
        }

        debug!(session_id = %session_id, channel = name, "Listener added");
        Ok(())
    }

    /// Removes a session from a channel's listeners.
    ///
    /// Removing a session that is not listening is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`] if the channel does not exist.
    pub fn unsubscribe(&self, session_id: SessionId, name: &str) -> Result<()> {
        let channel = self.get(name)?;
        if channel.listeners.lock().remove(session_id) {
            debug!(session_id = %session_id, channel = name, "Listener removed");
        }
        Ok(())
    }

    /// Removes a session from every channel.
    pub fn unsubscribe_all(&self, session_id: SessionId) {
        let channels: Vec<_> = self.channels.read().values().cloned().collect();

        let removed = channels
            .iter()
            .filter(|channel| channel.listeners.lock().remove(session_id))
            .count();

        if removed > 0 {
            debug!(session_id = %session_id, channels = removed, "Listener removed from all channels");
        }
    }

    /// Queues a message for broadcast, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotFound`] if the channel does not exist
    /// - [`Error::ConnectionClosed`] if the broadcaster has stopped
    pub async fn publish(&self, name: &str, message: Message) -> Result<()> {
        let queue = self.get(name)?.queue.clone();

        queue
            .send(message)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Queues a message for broadcast without waiting.
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish), plus [`Error::Connection`] if the
    /// queue is full.
    pub fn try_publish(&self, name: &str, message: Message) -> Result<()> {
        let channel = self.get(name)?;

        channel.queue.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => Error::connection(format!("channel queue full: {name}")),
            TrySendError::Closed(_) => Error::ConnectionClosed,
        })
    }

    /// Returns the listeners of a channel in subscription order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`] if the channel does not exist.
    pub fn listeners(&self, name: &str) -> Result<Vec<SessionId>> {
        Ok(self.get(name)?.listeners.lock().to_vec())
    }

    /// Returns `true` if the channel exists.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    /// Returns all channel names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn get(&self, name: &str) -> Result<Arc<Channel>> {
        self.channels
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::channel_not_found(name))
    }
}

// ============================================================================
// Broadcaster
// ============================================================================

/// Fans out every queued message to the channel's current listeners.
///
/// Runs until the channel's queue sender is dropped.
async fn run_broadcaster(
    name: Arc<str>,
    listeners: Arc<Mutex<ListenerSet>>,
    mut queue: mpsc::Receiver<Message>,
    sessions: Arc<SessionPool>,
) {
    debug!(channel = %name, "Broadcaster started");

    while let Some(message) = queue.recv().await {
        let frame = message.encode();
        let targets = listeners.lock().to_vec();

        for session_id in targets {
            if let Err(e) = sessions.deliver(session_id, frame.clone()).await {
                listeners.lock().remove(session_id);
                warn!(
                    channel = %name,
                    session_id = %session_id,
                    error = %e,
                    "Dropped unreachable listener"
                );
            }
        }

        trace!(channel = %name, command = message.command(), "Message broadcast");
    }

    debug!(channel = %name, "Broadcaster terminated");
}

// ============================================================================
// Tests
// ============================================================================
