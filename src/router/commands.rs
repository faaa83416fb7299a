//! Command registry.
//!
//! Maps command names to handlers. A name is registered at most once and
//! handlers are never overwritten.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{CommandUse, Message, validate_command};

// ============================================================================
// Types
// ============================================================================

/// Outcome of a handler invocation.
///
/// `Ok(Some(message))` is sent back to the caller, `Ok(None)` sends nothing,
/// and `Err` is reported to the caller as a diagnostic.
pub type HandlerResult = std::result::Result<Option<Message>, HandlerError>;

// ============================================================================
// HandlerError
// ============================================================================

/// Failure reported by a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{description}")]
pub struct HandlerError {
    description: String,
}

impl HandlerError {
    /// Creates a handler error with a description for the client.
    #[inline]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    /// Returns the description.
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        Self::new(err.to_string())
    }
}

// ============================================================================
// Context
// ============================================================================

/// Identity of the session that sent a command.
#[derive(Debug, Clone)]
pub struct Context {
    session_id: SessionId,
    credential: Arc<str>,
}

impl Context {
    /// Creates a context.
    #[inline]
    #[must_use]
    pub fn new(session_id: SessionId, credential: impl Into<Arc<str>>) -> Self {
        Self {
            session_id,
            credential: credential.into(),
        }
    }

    /// Returns the calling session.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the credential supplied when the connection was established.
    #[inline]
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

// ============================================================================
// CommandHandler
// ============================================================================

/// Handles one command for one session.
///
/// Implement this for handlers that need to await, e.g. to publish to a
/// channel. Plain closures can be registered with
/// [`Router::register_fn`](crate::Router::register_fn).
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles a command payload sent by `ctx`.
    async fn handle(&self, payload: &[u8], ctx: &Context) -> HandlerResult;
}

/// Adapts a synchronous closure to [`CommandHandler`].
pub(crate) struct FnHandler<F>(pub(crate) F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&[u8], &Context) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, payload: &[u8], ctx: &Context) -> HandlerResult {
        (self.0)(payload, ctx)
    }
}

// ============================================================================
// CommandRegistry
// ============================================================================

/// Command name to handler map.
///
/// Written during setup, read by every session afterwards.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<FxHashMap<String, Arc<dyn CommandHandler>>>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.handlers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the name is empty, longer than 255 bytes,
    ///   contains a colon, or is `websocket` or `listen`
    /// - [`Error::DuplicateCommand`] if the name is already registered
    pub fn register(&self, name: &str, handler: Arc<dyn CommandHandler>) -> Result<()> {
        validate_command(name, CommandUse::Register)?;

        let mut handlers = self.handlers.write();
        if handlers.contains_key(name) {
            return Err(Error::duplicate_command(name));
        }
        handlers.insert(name.to_owned(), handler);

        debug!(command = name, "Command registered");
        Ok(())
    }

    /// Looks up the handler for a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandNotFound`] if nothing is registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CommandHandler>> {
        self.handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::command_not_found(name))
    }

    /// Returns `true` if a handler is registered for the command.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Returns the number of registered commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Arc<dyn CommandHandler> {
        Arc::new(FnHandler(|payload: &[u8], _: &Context| -> HandlerResult {
            Ok(Some(Message::new("echo", payload)?))
        }))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = CommandRegistry::new();
        registry.register("echo", echo()).expect("register");

        assert!(registry.contains("echo"));
        assert!(registry.resolve("echo").is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = CommandRegistry::new();
        let err = registry.resolve("missing").err().expect("not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_register_too_long() {
        let registry = CommandRegistry::new();
        let err = registry.register(&"a".repeat(256), echo()).unwrap_err();
        assert!(err.is_validation());
        assert!(registry.register(&"a".repeat(255), echo()).is_ok());
    }

    #[test]
    fn test_register_colon() {
        let registry = CommandRegistry::new();
        assert!(registry.register("a:b", echo()).unwrap_err().is_validation());
    }

    #[test]
    fn test_register_reserved() {
        let registry = CommandRegistry::new();
        assert!(registry.register("websocket", echo()).is_err());
        assert!(registry.register("listen", echo()).is_err());
        assert!(registry.register("open", echo()).is_ok());
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_register_duplicate_keeps_first() {
        let registry = CommandRegistry::new();
        registry.register("echo", echo()).expect("register");

        let err = registry.register("echo", echo()).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_fn_handler_invocation() {
        let registry = CommandRegistry::new();
        registry.register("echo", echo()).expect("register");

        let ctx = Context::new(SessionId::generate(), "token");
        let handler = registry.resolve("echo").expect("resolve");
        let reply = handler.handle(b"hi", &ctx).await.expect("ok");
        assert_eq!(reply, Some(Message::new("echo", "hi").expect("valid")));
    }

    #[test]
    fn test_handler_error_from_crate_error() {
        let err: HandlerError = Error::channel_not_found("news").into();
        assert_eq!(err.description(), "channel does not exist: news");
    }
}
