//! Command routing and channel pub/sub.
//!
//! # Data Flow
//!
//! ```text
//! inbound frame ──► decode ──► session dispatch ──┬─► command handler
//!                                                 ├─► channel subscribe (`listen`)
//!                                                 └─► diagnostic reply
//!
//! handler reply / broadcast ──► encode ──► session outbound queue ──► transport
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Router configuration |
//! | `channels` | Channel registry and broadcaster tasks |
//! | `commands` | Command registry and handler trait |
//! | `core` | [`Router`] facade |

// ============================================================================
// Submodules
// ============================================================================

/// Router configuration.
pub mod builder;

/// Channel registry and broadcaster tasks.
pub mod channels;

/// Command registry and handler trait.
pub mod commands;

/// Router facade.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{RouterBuilder, RouterOptions};
pub use channels::{ChannelRegistry, ChannelValidator, ListenerSet};
pub use commands::{CommandHandler, CommandRegistry, Context, HandlerError, HandlerResult};
pub use self::core::Router;
