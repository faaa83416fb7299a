//! Per-connection session: dispatch loop and outbound writer.
//!
//! Each session runs two tasks:
//!
//! - **Dispatch loop**: reads frames, decodes them, and routes them to a
//!   handler, a channel subscription, or a diagnostic reply.
//! - **Outbound writer**: drains the session's bounded queue into the
//!   transport. It exits on the first write failure, which also ends the
//!   dispatch loop.
//!
//! # State Machine
//!
//! ```text
//! Opening ──► Active ──► Closing ──► Closed
//!    │                      ▲
//!    └──────────────────────┘   (open reply could not be queued)
//! ```
//!
//! Runtime errors (bad frame, unknown command, handler failure, rejected
//! `listen`) become `websocket: <description>` replies and never end the
//! session. Only a read error, a close, or a failed write does.

// ============================================================================
// Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{Message, RawFrame, ReservedCommand, codec};
use crate::router::commands::{CommandHandler, Context};
use crate::router::core::Shared;

use super::pool::Frame;

// ============================================================================
// Constants
// ============================================================================

/// Diagnostic for commands without a handler.
pub const UNSUPPORTED_COMMAND: &str = "command not supported by server";

/// Diagnostic for binary transport frames.
pub const BINARY_NOT_SUPPORTED: &str = "binary data not supported";

/// Diagnostic for a handler that panicked.
pub const HANDLER_PANICKED: &str = "internal error in command handler";

/// How long teardown waits for queued frames to be flushed.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected; `open` hook not yet run.
    Opening,
    /// Dispatching inbound frames.
    Active,
    /// Tearing down.
    Closing,
    /// Terminal.
    Closed,
}

// ============================================================================
// Session
// ============================================================================

/// Server-side state of one connected client.
pub(crate) struct Session {
    context: Context,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Frame>,
    state: SessionState,
}

impl Session {
    /// Registers the session and spawns its dispatch and writer tasks.
    pub(crate) fn spawn<S>(shared: Arc<Shared>, stream: S, context: Context) -> Result<JoinHandle<()>>
    where
        S: Stream<Item = std::result::Result<WsMessage, WsError>>
            + Sink<WsMessage, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        let session_id = context.session_id();
        let (outbound, outbound_rx) = mpsc::channel(shared.options.session_queue_capacity);

        shared.sessions.insert(session_id, outbound.clone())?;

        let (sink, inbound) = stream.split();
        let writer = tokio::spawn(run_writer(session_id, sink, outbound_rx));

        let session = Self {
            context,
            shared,
            outbound,
            state: SessionState::Opening,
        };

        Ok(tokio::spawn(session.run(inbound, writer)))
    }

    #[inline]
    fn id(&self) -> SessionId {
        self.context.session_id()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session_id = %self.id(), from = ?self.state, to = ?next, "Session state changed");
        self.state = next;
    }

    /// Dispatch loop. Consumes the session; teardown runs exactly once.
    async fn run<R>(mut self, mut inbound: R, mut writer: JoinHandle<()>)
    where
        R: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
    {
        info!(session_id = %self.id(), "Session opened");

        let mut writer_finished = false;

        if self.open().await.is_ok() {
            self.transition(SessionState::Active);

            loop {
                let message = tokio::select! {
                    message = inbound.next() => message,
                    _ = &mut writer => {
                        debug!(session_id = %self.id(), "Outbound writer exited");
                        writer_finished = true;
                        break;
                    }
                };

                let sent = match message {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(text.as_bytes()).await,
                    Some(Ok(WsMessage::Binary(_))) => {
                        self.reply(Message::diagnostic(BINARY_NOT_SUPPORTED)).await
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(session_id = %self.id(), "WebSocket closed by remote");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(session_id = %self.id(), error = %e, "WebSocket read failed");
                        break;
                    }
                    None => {
                        debug!(session_id = %self.id(), "WebSocket stream ended");
                        break;
                    }
                    // Ping, Pong and raw frames are handled by the transport
                    Some(Ok(_)) => Ok(()),
                };

                if sent.is_err() {
                    break;
                }
            }
        }

        self.teardown((!writer_finished).then_some(writer)).await;
    }

    /// Runs the `open` hook, if registered.
    async fn open(&self) -> Result<()> {
        let Ok(handler) = self.shared.commands.resolve(ReservedCommand::Open.as_str()) else {
            return Ok(());
        };

        let sent = self.invoke(handler, &[]).await;
        if sent.is_err() {
            debug!(session_id = %self.id(), "Open reply could not be queued");
        }
        sent
    }

    /// Routes one inbound text frame.
    ///
    /// Returns `Err` only if a reply could not be queued.
    async fn dispatch(&self, frame: &[u8]) -> Result<()> {
        let raw = match codec::decode(frame) {
            Ok(raw) => raw,
            Err(e) => {
                trace!(session_id = %self.id(), error = %e, "Undecodable frame");
                return self.reply(Message::diagnostic(e.to_string())).await;
            }
        };

        trace!(
            session_id = %self.id(),
            command = %String::from_utf8_lossy(raw.command),
            "Frame received"
        );

        match ReservedCommand::from_bytes(raw.command) {
            Some(ReservedCommand::Listen) => self.listen(&raw).await,
            // `open` is synthetic and `websocket` is server-to-client only
            Some(ReservedCommand::Open | ReservedCommand::WebSocket) => self.unsupported().await,
            None => {
                let handler = raw
                    .command_str()
                    .and_then(|name| self.shared.commands.resolve(name).ok());

                match handler {
                    Some(handler) => self.invoke(handler, raw.payload()).await,
                    None => self.unsupported().await,
                }
            }
        }
    }

    /// Subscribes to the channel named by the frame content.
    async fn listen(&self, raw: &RawFrame<'_>) -> Result<()> {
        let channel = String::from_utf8_lossy(raw.payload());

        match self
            .shared
            .channels
            .subscribe(self.id(), &channel, self.context.credential())
        {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(session_id = %self.id(), channel = %channel, error = %e, "Listen rejected");
                self.reply(Message::diagnostic(e.to_string())).await
            }
        }
    }

    /// Invokes a handler and queues its reply or failure.
    ///
    /// A panicking handler is answered like a failed one; the session keeps
    /// running.
    async fn invoke(&self, handler: Arc<dyn CommandHandler>, payload: &[u8]) -> Result<()> {
        let outcome = AssertUnwindSafe(async { handler.handle(payload, &self.context).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Some(message))) => self.reply(message).await,
            Ok(Ok(None)) => Ok(()),
            Ok(Err(e)) => {
                debug!(session_id = %self.id(), error = %e, "Handler failed");
                self.reply(Message::diagnostic(e.to_string())).await
            }
            Err(_) => {
                warn!(session_id = %self.id(), "Handler panicked");
                self.reply(Message::diagnostic(HANDLER_PANICKED)).await
            }
        }
    }

    async fn unsupported(&self) -> Result<()> {
        self.reply(Message::diagnostic(UNSUPPORTED_COMMAND)).await
    }

    /// Queues a message on this session's outbound queue.
    async fn reply(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message.encode())
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Removes the session everywhere and lets the writer flush and close.
    async fn teardown(mut self, writer: Option<JoinHandle<()>>) {
        self.transition(SessionState::Closing);

        let Self {
            context,
            shared,
            outbound,
            ..
        } = self;
        let session_id = context.session_id();

        shared.sessions.remove(session_id);
        shared.channels.unsubscribe_all(session_id);

        // The writer stops once every sender is gone
        drop(outbound);

        if let Some(mut writer) = writer
            && timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err()
        {
            debug!(session_id = %session_id, "Outbound writer did not drain, aborting");
            writer.abort();
        }

        debug!(
            session_id = %session_id,
            from = ?SessionState::Closing,
            to = ?SessionState::Closed,
            "Session state changed"
        );
        info!(session_id = %session_id, "Session closed");
    }
}

// ============================================================================
// Outbound Writer
// ============================================================================

/// Writes queued frames to the transport until the queue closes or a write
/// fails, then closes the transport.
async fn run_writer<W>(session_id: SessionId, mut sink: W, mut outbound: mpsc::Receiver<Frame>)
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let message = match String::from_utf8(frame) {
            Ok(text) => WsMessage::Text(text.into()),
            Err(e) => WsMessage::Binary(e.into_bytes().into()),
        };

        if let Err(e) = sink.send(message).await {
            debug!(session_id = %session_id, error = %e, "Write failed");
            break;
        }
        trace!(session_id = %session_id, "Frame written");
    }

    let _ = sink.close().await;
    debug!(session_id = %session_id, "Outbound writer terminated");
}

// ============================================================================
// Tests
// ============================================================================
