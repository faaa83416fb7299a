//! Router facade.
//!
//! Owns the command registry, the channel registry and the session pool,
//! and exposes the registration and send API used by the surrounding server.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::{Sink, Stream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::error::Result;
use crate::identifiers::SessionId;
use crate::protocol::Message;
use crate::transport::pool::SessionPool;
use crate::transport::session::Session;

use super::builder::{RouterBuilder, RouterOptions};
use super::channels::{ChannelRegistry, ChannelValidator};
use super::commands::{CommandHandler, CommandRegistry, Context, FnHandler, HandlerResult};

// ============================================================================
// Shared
// ============================================================================

/// State shared by the router handle and every session task.
pub(crate) struct Shared {
    pub(crate) commands: CommandRegistry,
    pub(crate) channels: ChannelRegistry,
    pub(crate) sessions: Arc<SessionPool>,
    pub(crate) options: RouterOptions,
}

// ============================================================================
// Router
// ============================================================================

/// Command router and channel hub.
///
/// Cheap to clone; clones share all state.
///
/// # Example
///
/// ```no_run
/// use cmd_socket::{Message, Router};
///
/// # async fn example() -> cmd_socket::Result<()> {
/// let router = Router::new();
///
/// router.register_fn("ping", |_, _| Ok(Some(Message::command_only("pong")?)))?;
/// router.create_channel("news")?;
/// router.publish("news", Message::new("update", "v2")?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Router {
    shared: Arc<Shared>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("commands", &self.shared.commands)
            .field("channels", &self.shared.channels)
            .field("sessions", &self.shared.sessions.len())
            .field("options", &self.shared.options)
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Router - Constructor
// ============================================================================

impl Router {
    /// Creates a router with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub(crate) fn with_options(options: RouterOptions) -> Self {
        let sessions = Arc::new(SessionPool::new());
        let channels = ChannelRegistry::new(Arc::clone(&sessions), options.channel_queue_capacity);

        Self {
            shared: Arc::new(Shared {
                commands: CommandRegistry::new(),
                channels,
                sessions,
                options,
            }),
        }
    }

    /// Returns the router's options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RouterOptions {
        &self.shared.options
    }
}

// ============================================================================
// Router - Registration
// ============================================================================

impl Router {
    /// Registers a handler for a command.
    ///
    /// Registering `open` installs the hook invoked once per new session.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`](crate::Error::Validation) if the name is invalid or reserved
    /// - [`Error::DuplicateCommand`](crate::Error::DuplicateCommand) if the name is already registered
    pub fn register(&self, name: &str, handler: impl CommandHandler + 'static) -> Result<()> {
        self.shared.commands.register(name, Arc::new(handler))
    }

    /// Registers a synchronous closure as the handler for a command.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_fn<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&[u8], &Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared
            .commands
            .register(name, Arc::new(FnHandler(handler)))
    }

    /// Returns `true` if a handler is registered for the command.
    #[inline]
    #[must_use]
    pub fn has_command(&self, name: &str) -> bool {
        self.shared.commands.contains(name)
    }

    /// Creates a channel anyone may listen on.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`](crate::Error::Validation) if the name is empty
    /// - [`Error::DuplicateChannel`](crate::Error::DuplicateChannel) if the channel exists
    pub fn create_channel(&self, name: &str) -> Result<()> {
        self.shared.channels.create(name, None)
    }

    /// Creates a channel guarded by an admission validator.
    ///
    /// The validator sees the listening session's credential.
    ///
    /// # Errors
    ///
    /// Same as [`create_channel`](Self::create_channel).
    pub fn create_guarded_channel<F>(&self, name: &str, validator: F) -> Result<()>
    where
        F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let validator: ChannelValidator = Arc::new(validator);
        self.shared.channels.create(name, Some(validator))
    }

    /// Returns all channel names, sorted.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.shared.channels.names()
    }
}

// ============================================================================
// Router - Subscriptions
// ============================================================================

impl Router {
    /// Adds a session to a channel, as if it had sent `listen`.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if the channel does not exist
    /// - [`Error::Unauthorized`](crate::Error::Unauthorized) if the validator rejects `credential`
    /// - [`Error::AlreadySubscribed`](crate::Error::AlreadySubscribed) if the session already listens
    pub fn subscribe(&self, session_id: SessionId, channel: &str, credential: &str) -> Result<()> {
        self.shared.channels.subscribe(session_id, channel, credential)
    }

    /// Removes a session from a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if the channel does not exist.
    pub fn unsubscribe(&self, session_id: SessionId, channel: &str) -> Result<()> {
        self.shared.channels.unsubscribe(session_id, channel)
    }

    /// Returns a channel's listeners in subscription order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if the channel does not exist.
    pub fn listeners(&self, channel: &str) -> Result<Vec<SessionId>> {
        self.shared.channels.listeners(channel)
    }

    /// Returns the number of listeners on a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if the channel does not exist.
    pub fn listener_count(&self, channel: &str) -> Result<usize> {
        self.listeners(channel).map(|listeners| listeners.len())
    }
}

// ============================================================================
// Router - Sending
// ============================================================================

impl Router {
    /// Publishes a message to every listener of a channel.
    ///
    /// Waits while the channel queue is full.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if the channel does not exist
    pub async fn publish(&self, channel: &str, message: Message) -> Result<()> {
        self.shared.channels.publish(channel, message).await
    }

    /// Publishes a message without waiting.
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish), plus [`Error::Connection`](crate::Error::Connection) if
    /// the channel queue is full.
    pub fn try_publish(&self, channel: &str, message: Message) -> Result<()> {
        self.shared.channels.try_publish(channel, message)
    }

    /// Sends a message directly to one session.
    ///
    /// Waits while the session's outbound queue is full.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`](crate::Error::SessionNotFound) if the session is not connected
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the session is closing
    pub async fn send_to(&self, session_id: SessionId, message: Message) -> Result<()> {
        self.shared
            .sessions
            .deliver(session_id, message.encode())
            .await
    }

    /// Sends a message directly to one session without waiting.
    ///
    /// # Errors
    ///
    /// Same as [`send_to`](Self::send_to), plus [`Error::Connection`](crate::Error::Connection) if
    /// the outbound queue is full.
    pub fn try_send_to(&self, session_id: SessionId, message: Message) -> Result<()> {
        self.shared
            .sessions
            .try_deliver(session_id, message.encode())
    }
}

// ============================================================================
// Router - Sessions
// ============================================================================

impl Router {
    /// Starts serving an established connection.
    ///
    /// The connection must already be upgraded and authenticated. Spawns
    /// the session's dispatch and writer tasks; the returned handle
    /// completes after teardown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSession`](crate::Error::DuplicateSession) if `session_id` is in use.
    pub fn spawn_session<S>(
        &self,
        stream: S,
        session_id: SessionId,
        credential: impl Into<Arc<str>>,
    ) -> Result<JoinHandle<()>>
    where
        S: Stream<Item = std::result::Result<WsMessage, WsError>>
            + Sink<WsMessage, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        let context = Context::new(session_id, credential);
        Session::spawn(Arc::clone(&self.shared), stream, context)
    }

    /// Returns the number of connected sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Returns `true` if the session is connected.
    #[inline]
    #[must_use]
    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.shared.sessions.contains(session_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use crate::error::Error;

    #[test]
    fn test_register_fn() {
        let router = Router::new();
        router
            .register_fn("ping", |_, _| Ok(Some(Message::command_only("pong")?)))
            .expect("register");
        assert!(router.has_command("ping"));
        assert!(router.register_fn("ping", |_, _| Ok(None)).is_err());
    }

    #[tokio::test]
    async fn test_create_channels() {
        let router = Router::new();
        router.create_channel("news").expect("create");
        router
            .create_guarded_channel("staff", |credential| {
                if credential == "admin" {
                    Ok(())
                } else {
                    Err("Not permitted".into())
                }
            })
            .expect("create");

        assert_eq!(router.channel_names(), vec!["news", "staff"]);
        assert!(router.create_channel("news").unwrap_err().is_duplicate());

        let id = SessionId::generate();
        assert!(router.subscribe(id, "staff", "guest").is_err());
        router.subscribe(id, "staff", "admin").expect("admin allowed");
        assert_eq!(router.listener_count("staff").expect("exists"), 1);

        router.unsubscribe(id, "staff").expect("unsubscribe");
        assert_eq!(router.listener_count("staff").expect("exists"), 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let router = Router::new();
        let msg = Message::new("hello", "x").expect("valid");
        let err = router.send_to(SessionId::generate(), msg).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_send_to_session() {
        let router = Router::new();
        let id = SessionId::generate();
        let (tx, mut rx) = mpsc::channel(8);
        router.shared.sessions.insert(id, tx).expect("insert");

        router
            .send_to(id, Message::new("hello", "x").expect("valid"))
            .await
            .expect("send");
        assert_eq!(rx.recv().await.expect("frame"), b"hello: x");
        assert!(router.has_session(id));
        assert_eq!(router.session_count(), 1);
    }

    #[test]
    fn test_reserved_reply_command_cannot_be_built() {
        let err = Message::new("websocket", "x").unwrap_err();
        assert!(err.is_validation());
    }
}
