//! Text-command pub/sub router over WebSocket.
//!
//! Clients exchange human-readable `command: content` frames with the
//! server. The router dispatches inbound commands to registered handlers,
//! lets the server push messages to individual sessions, and broadcasts
//! messages to named channels that clients join with `listen: <channel>`.
//!
//! # Architecture
//!
//! - Each session runs a dispatch task and an outbound writer task
//! - Each channel runs a broadcaster task
//! - Tasks talk only through bounded queues
//! - Runtime errors become `websocket: <description>` replies; they never
//!   close the connection
//!
//! # Quick Start
//!
//! ```no_run
//! use cmd_socket::{Message, Result, Router, Server, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let router = Router::new();
//!
//!     router.register_fn("open", |_, ctx| {
//!         Ok(Some(Message::new("hello", ctx.session_id().to_string())?))
//!     })?;
//!     router.register_fn("ping", |_, _| Ok(Some(Message::command_only("pong")?)))?;
//!     router.create_channel("news")?;
//!
//!     let server = Server::start(router.clone(), ServerOptions::new().with_port(8080)).await?;
//!     println!("Listening on {}", server.ws_url());
//!
//!     router.publish("news", Message::new("update", "v2")?).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Frame codec and validated [`Message`] |
//! | [`router`] | Command registry, channels and the [`Router`] facade |
//! | [`transport`] | Sessions, session pool and WebSocket server |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire protocol: codec and message validation.
pub mod protocol;

/// Command routing and channel pub/sub.
pub mod router;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SessionId;

// Protocol types
pub use protocol::{Message, RawFrame, ReservedCommand};

// Router types
pub use router::{
    ChannelValidator, CommandHandler, Context, HandlerError, HandlerResult, Router, RouterBuilder,
    RouterOptions,
};

// Transport types
pub use transport::{Authenticator, Server, ServerOptions, SessionState};
