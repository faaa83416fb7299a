//! Builder pattern for router configuration.
//!
//! # Example
//!
//! ```no_run
//! use cmd_socket::Router;
//!
//! # fn example() -> cmd_socket::Result<()> {
//! let router = Router::builder()
//!     .session_queue_capacity(16)
//!     .channel_queue_capacity(32)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::core::Router;

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of every per-session outbound queue.
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 8;

/// Default capacity of every per-channel broadcast queue.
pub const DEFAULT_CHANNEL_QUEUE_CAPACITY: usize = 8;

// ============================================================================
// RouterOptions
// ============================================================================

/// Queue sizing for a [`Router`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    /// Frames buffered per session before senders wait.
    pub session_queue_capacity: usize,

    /// Messages buffered per channel before publishers wait.
    pub channel_queue_capacity: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            session_queue_capacity: DEFAULT_SESSION_QUEUE_CAPACITY,
            channel_queue_capacity: DEFAULT_CHANNEL_QUEUE_CAPACITY,
        }
    }
}

impl RouterOptions {
    /// Checks that all capacities are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a zero capacity.
    pub fn validate(&self) -> Result<()> {
        if self.session_queue_capacity == 0 {
            return Err(Error::validation("session queue capacity must be non-zero"));
        }
        if self.channel_queue_capacity == 0 {
            return Err(Error::validation("channel queue capacity must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// RouterBuilder
// ============================================================================

/// Builder for configuring a [`Router`] instance.
///
/// Use [`Router::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct RouterBuilder {
    options: RouterOptions,
}

impl RouterBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-session outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn session_queue_capacity(mut self, capacity: usize) -> Self {
        self.options.session_queue_capacity = capacity;
        self
    }

    /// Sets the per-channel broadcast queue capacity.
    #[inline]
    #[must_use]
    pub fn channel_queue_capacity(mut self, capacity: usize) -> Self {
        self.options.channel_queue_capacity = capacity;
        self
    }

    /// Builds the router.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a capacity is zero.
    pub fn build(self) -> Result<Router> {
        self.options.validate()?;
        Ok(Router::with_options(self.options))
    }
}

// ============================================================================
// Tests
// ============================================================================
