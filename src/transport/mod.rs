//! WebSocket transport layer.
//!
//! This module connects established WebSocket streams to the router:
//! one dispatch task and one writer task per session, plus an optional
//! accept loop that performs the upgrade.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   frames   ┌──────────────────────────┐
//! │  Client  │───────────►│ dispatch loop ──► Router │
//! │          │◄───────────│ outbound writer ◄─ queue │◄── broadcasters
//! └──────────┘            └──────────────────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! 1. `Server` accepts and upgrades a connection (or the caller does)
//! 2. `Router::spawn_session` registers the outbound queue in the pool
//! 3. The `open` hook runs, then inbound frames are dispatched
//! 4. On close, read error or write failure the session is removed from
//!    the pool and every channel
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `pool` | Session ID to outbound queue map |
//! | `server` | TCP accept loop and WebSocket upgrade |
//! | `session` | Dispatch loop and outbound writer |

// ============================================================================
// Submodules
// ============================================================================

/// Session ID to outbound queue map.
pub mod pool;

/// WebSocket server and upgrade handling.
pub mod server;

/// Per-connection dispatch loop and outbound writer.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use pool::{Frame, SessionPool};
pub use server::{Authenticator, Server, ServerOptions};
pub use session::SessionState;
