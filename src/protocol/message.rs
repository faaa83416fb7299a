//! Validated message type and command naming rules.
//!
//! A [`Message`] can only be built from a valid command, so no malformed
//! frame ever reaches the wire. The reserved control tokens live in
//! [`ReservedCommand`] and are checked here and nowhere else.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

use super::codec;

// ============================================================================
// Constants
// ============================================================================

/// Maximum command length in bytes.
pub const MAX_COMMAND_LEN: usize = 255;

// ============================================================================
// ReservedCommand
// ============================================================================

/// Control tokens with router-defined meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedCommand {
    /// Synthetic lifecycle event invoked once per session after connect.
    /// Never sent over the wire.
    Open,
    /// Client request to subscribe to the channel named by the content.
    Listen,
    /// Envelope for router-generated diagnostics.
    WebSocket,
}

impl ReservedCommand {
    /// Returns the wire token.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Listen => "listen",
            Self::WebSocket => "websocket",
        }
    }

    /// Looks up a reserved token by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_bytes(name.as_bytes())
    }

    /// Looks up a reserved token by raw bytes.
    #[must_use]
    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        match name {
            b"open" => Some(Self::Open),
            b"listen" => Some(Self::Listen),
            b"websocket" => Some(Self::WebSocket),
            _ => None,
        }
    }

    /// Returns `true` if applications may register a handler for this token.
    #[inline]
    #[must_use]
    pub const fn is_registrable(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if applications may send messages with this command.
    #[inline]
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        !matches!(self, Self::WebSocket)
    }
}

impl fmt::Display for ReservedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Where a command name is about to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandUse {
    /// Registering a handler.
    Register,
    /// Building an outgoing message.
    Send,
}

/// Validates a command name for the given use.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the name is empty, longer than
/// [`MAX_COMMAND_LEN`] bytes, contains a colon, or is a reserved token
/// not allowed for `usage`.
pub fn validate_command(name: &str, usage: CommandUse) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("command may not be empty"));
    }
    if name.len() > MAX_COMMAND_LEN {
        return Err(Error::validation(format!(
            "command may not be longer than {MAX_COMMAND_LEN} characters"
        )));
    }
    if name.contains(':') {
        return Err(Error::validation("command may not contain a colon"));
    }

    if let Some(reserved) = ReservedCommand::from_name(name) {
        let allowed = match usage {
            CommandUse::Register => reserved.is_registrable(),
            CommandUse::Send => reserved.is_sendable(),
        };
        if !allowed {
            return Err(Error::validation(format!("command {reserved} is reserved")));
        }
    }

    Ok(())
}

// ============================================================================
// Message
// ============================================================================

/// An immutable, validated `command: content` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    command: String,
    content: Option<Vec<u8>>,
}

impl Message {
    /// Creates a message with content.
    ///
    /// Empty content is stored as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the command is invalid.
    pub fn new(command: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self> {
        let command = command.into();
        validate_command(&command, CommandUse::Send)?;

        let content = content.into();
        Ok(Self {
            command,
            content: (!content.is_empty()).then_some(content),
        })
    }

    /// Creates a message without content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the command is invalid.
    pub fn command_only(command: impl Into<String>) -> Result<Self> {
        Self::new(command, Vec::new())
    }

    /// Creates a router diagnostic tagged with the reserved `websocket` command.
    pub(crate) fn diagnostic(description: impl Into<String>) -> Self {
        let description: String = description.into();
        Self {
            command: ReservedCommand::WebSocket.as_str().to_owned(),
            content: (!description.is_empty()).then(|| description.into_bytes()),
        }
    }

    /// Returns the command.
    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the content, if any.
    #[inline]
    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Returns the content as UTF-8 text, if present and valid.
    #[must_use]
    pub fn content_str(&self) -> Option<&str> {
        self.content().and_then(|c| std::str::from_utf8(c).ok())
    }

    /// Returns `true` if this is a router diagnostic.
    #[inline]
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        self.command == ReservedCommand::WebSocket.as_str()
    }

    /// Encodes the message into a wire frame.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self.command.as_bytes(), self.content())
    }
}

// ============================================================================
// Tests
// ============================================================================
