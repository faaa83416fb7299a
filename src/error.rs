//! Error types for the command router.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```no_run
//! use cmd_socket::{Message, Result, Router};
//!
//! async fn example(router: &Router) -> Result<()> {
//!     router.create_channel("news")?;
//!     router.publish("news", Message::new("update", "v2")?).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Validation | [`Error::Validation`], [`Error::Unauthorized`] |
//! | Protocol | [`Error::Protocol`] |
//! | Lookup | [`Error::CommandNotFound`], [`Error::ChannelNotFound`], [`Error::SessionNotFound`] |
//! | Registration | [`Error::DuplicateCommand`], [`Error::DuplicateChannel`], [`Error::DuplicateSession`], [`Error::AlreadySubscribed`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::WebSocket`] |
//!
//! Runtime errors raised while serving a client are never returned to the
//! server code; the session converts them into a diagnostic reply instead.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SessionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Display strings are sent verbatim to clients inside diagnostic replies,
/// so they stay short and lower-case.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Malformed command name or message.
    ///
    /// Returned for empty, oversized, colon-containing or reserved names.
    #[error("{message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Channel admission validator rejected the credential.
    #[error("not permitted to listen on {channel}: {reason}")]
    Unauthorized {
        /// Channel the session tried to join.
        channel: String,
        /// Reason reported by the validator.
        reason: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Frame could not be parsed.
    #[error("malformed frame: {message}")]
    Protocol {
        /// Description of the parse failure.
        message: String,
    },

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// No handler registered for the command.
    #[error("command not supported by server: {command}")]
    CommandNotFound {
        /// The unresolved command.
        command: String,
    },

    /// Channel does not exist.
    #[error("channel does not exist: {name}")]
    ChannelNotFound {
        /// The missing channel name.
        name: String,
    },

    /// Session is not connected.
    #[error("client not found: {session_id}")]
    SessionNotFound {
        /// The missing session.
        session_id: SessionId,
    },

    // ========================================================================
    // Registration Errors
    // ========================================================================
    /// Command was already registered.
    #[error("command already exists: {command}")]
    DuplicateCommand {
        /// The duplicated command.
        command: String,
    },

    /// Channel was already created.
    #[error("channel already exists: {name}")]
    DuplicateChannel {
        /// The duplicated channel name.
        name: String,
    },

    /// Session identifier is already in use.
    #[error("session already exists: {session_id}")]
    DuplicateSession {
        /// The duplicated session.
        session_id: SessionId,
    },

    /// Session already listens on the channel.
    #[error("already listening on {channel}")]
    AlreadySubscribed {
        /// The subscribing session.
        session_id: SessionId,
        /// The channel name.
        channel: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be established or a queue refused a frame.
    #[error("connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Outbound queue or transport is closed.
    #[error("connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] IoError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a validation error.
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[inline]
    pub fn unauthorized(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a command not found error.
    #[inline]
    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
        }
    }

    /// Creates a channel not found error.
    #[inline]
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound { name: name.into() }
    }

    /// Creates a session not found error.
    #[inline]
    pub fn session_not_found(session_id: SessionId) -> Self {
        Self::SessionNotFound { session_id }
    }

    /// Creates a duplicate command error.
    #[inline]
    pub fn duplicate_command(command: impl Into<String>) -> Self {
        Self::DuplicateCommand {
            command: command.into(),
        }
    }

    /// Creates a duplicate channel error.
    #[inline]
    pub fn duplicate_channel(name: impl Into<String>) -> Self {
        Self::DuplicateChannel { name: name.into() }
    }

    /// Creates a duplicate session error.
    #[inline]
    pub fn duplicate_session(session_id: SessionId) -> Self {
        Self::DuplicateSession { session_id }
    }

    /// Creates an already subscribed error.
    #[inline]
    pub fn already_subscribed(session_id: SessionId, channel: impl Into<String>) -> Self {
        Self::AlreadySubscribed {
            session_id,
            channel: channel.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a validation error.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Unauthorized { .. })
    }

    /// Returns `true` if a lookup failed.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CommandNotFound { .. }
                | Self::ChannelNotFound { .. }
                | Self::SessionNotFound { .. }
        )
    }

    /// Returns `true` if something was registered twice.
    #[inline]
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCommand { .. }
                | Self::DuplicateChannel { .. }
                | Self::DuplicateSession { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_) | Self::Io(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::channel_not_found("news");
        assert_eq!(err.to_string(), "channel does not exist: news");
    }

    #[test]
    fn test_validation_display_is_bare_message() {
        let err = Error::validation("command may not contain a colon");
        assert_eq!(err.to_string(), "command may not contain a colon");
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::channel_not_found("a").is_not_found());
        assert!(Error::command_not_found("a").is_not_found());
        assert!(Error::session_not_found(SessionId::generate()).is_not_found());
        assert!(!Error::validation("a").is_not_found());
    }

    #[test]
    fn test_is_duplicate() {
        assert!(Error::duplicate_command("a").is_duplicate());
        assert!(Error::duplicate_channel("a").is_duplicate());
        assert!(!Error::already_subscribed(SessionId::generate(), "a").is_duplicate());
    }

    #[test]
    fn test_is_validation() {
        assert!(Error::unauthorized("news", "nope").is_validation());
        assert!(!Error::protocol("bad").is_validation());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connection("queue full").is_connection_error());
        assert!(!Error::validation("test").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::AddrInUse, "port taken");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
