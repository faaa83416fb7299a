//! Wire protocol.
//!
//! Every frame exchanged with a client is a single text unit:
//!
//! ```text
//! <command> ": " <content>
//! ```
//!
//! # Reserved Commands
//!
//! | Command | Direction | Purpose |
//! |---------|-----------|---------|
//! | `open` | none (synthetic) | Invoked once per session after connect |
//! | `listen` | Client → Server | Subscribe to the channel named by content |
//! | `websocket` | Server → Client | Diagnostic / error envelope |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Frame encoding and decoding |
//! | `message` | Validated [`Message`] and naming rules |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encoding and decoding.
pub mod codec;

/// Validated message type and command naming rules.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{RawFrame, decode, encode};
pub use message::{CommandUse, MAX_COMMAND_LEN, Message, ReservedCommand, validate_command};
