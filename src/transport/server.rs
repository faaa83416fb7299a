//! WebSocket server that feeds connections into a [`Router`].
//!
//! # Connection Flow
//!
//! 1. Accept a TCP connection
//! 2. Read the credential from the configured cookie (default `auth`)
//! 3. Run the authenticator, if any; reject with 403 on failure
//! 4. Negotiate the subprotocol if the client offers it
//! 5. Upgrade to WebSocket and hand the stream to [`Router::spawn_session`]

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::router::Router;

// ============================================================================
// Constants
// ============================================================================

/// Default bind address for the WebSocket server (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default cookie carrying the client credential.
pub const DEFAULT_COOKIE_NAME: &str = "auth";

/// Default WebSocket subprotocol.
pub const DEFAULT_SUBPROTOCOL: &str = "cmd.fossores.de";

/// Interval at which the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Body of the 403 response for rejected credentials.
const AUTHENTICATION_FAILED: &str = "Authentication failed";

// ============================================================================
// Types
// ============================================================================

/// Connection-level credential check.
///
/// Returning `Err(reason)` refuses the upgrade with HTTP 403.
pub type Authenticator = Arc<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

// ============================================================================
// ServerOptions
// ============================================================================

/// WebSocket server configuration.
///
/// # Example
///
/// ```no_run
/// use cmd_socket::ServerOptions;
///
/// let options = ServerOptions::new()
///     .with_port(8080)
///     .with_authenticator(|token| {
///         if token == "valid" { Ok(()) } else { Err("unknown token".into()) }
///     });
/// ```
#[derive(Clone)]
pub struct ServerOptions {
    /// Address to bind.
    pub ip: IpAddr,

    /// Port to bind (0 for random).
    pub port: u16,

    /// Cookie holding the client credential.
    pub cookie_name: String,

    /// Subprotocol echoed back when offered by the client.
    pub subprotocol: Option<String>,

    /// Credential check run before upgrading.
    pub authenticator: Option<Authenticator>,
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("cookie_name", &self.cookie_name)
            .field("subprotocol", &self.subprotocol)
            .field("authenticator", &self.authenticator.is_some())
            .finish()
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ip: DEFAULT_BIND_IP,
            port: 0,
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            subprotocol: Some(DEFAULT_SUBPROTOCOL.to_owned()),
            authenticator: None,
        }
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the credential cookie name.
    #[inline]
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Sets the negotiated subprotocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Disables subprotocol negotiation.
    #[inline]
    #[must_use]
    pub fn without_subprotocol(mut self) -> Self {
        self.subprotocol = None;
        self
    }

    /// Requires a credential accepted by `authenticator`.
    #[must_use]
    pub fn with_authenticator<F>(mut self, authenticator: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }
}

// ============================================================================
// Server
// ============================================================================

/// Accepts WebSocket clients and serves them through a [`Router`].
///
/// # Example
///
/// ```no_run
/// use cmd_socket::{Result, Router, Server, ServerOptions};
///
/// async fn serve() -> Result<()> {
///     let router = Router::new();
///     let server = Server::start(router.clone(), ServerOptions::new().with_port(8080)).await?;
///     println!("Listening on {}", server.ws_url());
///     Ok(())
/// }
/// ```
pub struct Server {
    /// Port the server is bound to.
    port: u16,

    /// Bound address.
    local_addr: SocketAddr,

    /// Router that serves accepted sessions.
    router: Router,

    /// Connection settings.
    options: ServerOptions,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// Server - Constructor
// ============================================================================

impl Server {
    /// Binds the listener and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn start(router: Router, options: ServerOptions) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(SocketAddr::new(options.ip, options.port)).await?;
        let local_addr = listener.local_addr()?;

        let server = Arc::new(Self {
            port: local_addr.port(),
            local_addr,
            router,
            options,
            shutdown: AtomicBool::new(false),
        });

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        info!(addr = %local_addr, "WebSocket server started");

        Ok(server)
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the router serving this server's sessions.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Stops accepting new connections.
    ///
    /// Established sessions keep running until their clients disconnect.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!(port = self.port, "WebSocket server shutting down");
    }
}

// ============================================================================
// Server - Accept Loop
// ============================================================================

impl Server {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one connection and starts its session.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let mut credential = None;
        let options = &self.options;

        let callback = |request: &Request, mut response: Response| {
            let cookie = cookie_value(request.headers(), &options.cookie_name);

            if let Some(authenticator) = &options.authenticator {
                let Some(token) = cookie.as_deref() else {
                    debug!(?addr, "Credential cookie missing");
                    return Err(forbidden());
                };
                if let Err(reason) = authenticator(token) {
                    debug!(?addr, reason = %reason, "Credential rejected");
                    return Err(forbidden());
                }
            }

            if let Some(protocol) = &options.subprotocol
                && offers_subprotocol(request.headers(), protocol)
                && let Ok(value) = HeaderValue::from_str(protocol)
            {
                response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
            }

            credential = cookie;
            Ok(response)
        };

        let ws_stream = accept_hdr_async(stream, callback)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let session_id = SessionId::generate();
        self.router
            .spawn_session(ws_stream, session_id, credential.unwrap_or_default())?;

        info!(session_id = %session_id, ?addr, "WebSocket connection established");
        Ok(())
    }
}

// ============================================================================
// Handshake Helpers
// ============================================================================

/// Builds the 403 response for rejected credentials.
fn forbidden() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(AUTHENTICATION_FAILED.to_owned()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

/// Extracts a cookie value from request headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
}

/// Returns `true` if the client offered `protocol`.
fn offers_subprotocol(headers: &HeaderMap, protocol: &str) -> bool {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(','))
        .any(|offered| offered.trim() == protocol)
}

// ============================================================================
// Tests
// ============================================================================
