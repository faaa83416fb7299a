//! End-to-end tests over real TCP WebSocket connections.
//!
//! Run with: cargo test --test end_to_end
//! Set `RUST_LOG=cmd_socket=debug` to see session logs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cmd_socket::{
    CommandHandler, Context, HandlerResult, Message, Router, Server, ServerOptions, SessionId,
};

// ============================================================================
// Helpers
// ============================================================================

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start(router: &Router, options: ServerOptions) -> Result<Arc<Server>> {
    init_tracing();
    Ok(Server::start(router.clone(), options).await?)
}

async fn connect(server: &Server, cookie: Option<&str>) -> std::result::Result<Client, WsError> {
    let mut request = server.ws_url().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static("cmd.fossores.de"),
    );
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(&format!("auth={cookie}"))
            .map_err(|e| WsError::HttpFormat(e.into()))?;
        headers.insert(COOKIE, value);
    }

    let (client, _) = connect_async(request).await?;
    Ok(client)
}

async fn send(client: &mut Client, text: &str) -> Result<()> {
    client.send(WsMessage::Text(text.to_owned().into())).await?;
    Ok(())
}

async fn recv(client: &mut Client) -> Result<String> {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .context("timed out waiting for a frame")?
            .context("connection ended")??;
        match message {
            WsMessage::Text(text) => return Ok(text.as_str().to_owned()),
            WsMessage::Close(_) => bail!("connection closed by server"),
            _ => continue,
        }
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> Result<()> {
    for _ in 0..200 {
        if check() {
            return Ok(());
        }
        sleep(Duration::from_millis(10)).await;
    }
    bail!("condition not reached")
}

/// Greets each session with its own ID.
fn greet_with_id(router: &Router) -> Result<()> {
    router.register_fn("open", |_, ctx| {
        Ok(Some(Message::new("hello", ctx.session_id().to_string())?))
    })?;
    Ok(())
}

async fn read_greeting(client: &mut Client) -> Result<SessionId> {
    let greeting = recv(client).await?;
    let id = greeting
        .strip_prefix("hello: ")
        .context("greeting expected")?;
    Ok(SessionId::from_uuid(Uuid::parse_str(id)?))
}

/// Publishes to the `test` channel whenever invoked.
struct Announce {
    router: Router,
}

#[async_trait]
impl CommandHandler for Announce {
    async fn handle(&self, _payload: &[u8], _ctx: &Context) -> HandlerResult {
        self.router
            .publish("test", Message::new("channel", "test")?)
            .await?;
        Ok(None)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn listen_then_receive_publish() -> Result<()> {
    let router = Router::new();
    router.create_channel("news")?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut client = connect(&server, None).await?;
    send(&mut client, "listen: news").await?;
    eventually(|| router.listener_count("news").unwrap_or(0) == 1).await?;

    router
        .publish("news", Message::new("update", "v2")?)
        .await?;
    assert_eq!(recv(&mut client).await?, "update: v2");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn unknown_command_gets_diagnostic() -> Result<()> {
    let router = Router::new();
    let server = start(&router, ServerOptions::new()).await?;

    let mut client = connect(&server, None).await?;
    send(&mut client, "unknown: x").await?;
    assert_eq!(
        recv(&mut client).await?,
        "websocket: command not supported by server"
    );

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn malformed_frame_does_not_close_connection() -> Result<()> {
    let router = Router::new();
    router.register_fn("testResponse", |_, _| {
        Ok(Some(Message::new("response", "sent")?))
    })?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut client = connect(&server, None).await?;
    send(&mut client, "no separator at all").await?;
    assert!(recv(&mut client).await?.starts_with("websocket: "));

    send(&mut client, "testResponse: ").await?;
    assert_eq!(recv(&mut client).await?, "response: sent");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn handler_can_publish_to_channel() -> Result<()> {
    let router = Router::new();
    router.create_channel("test")?;
    router.register(
        "testChannel",
        Announce {
            router: router.clone(),
        },
    )?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut client = connect(&server, None).await?;
    send(&mut client, "listen: test").await?;
    send(&mut client, "testChannel: ").await?;
    assert_eq!(recv(&mut client).await?, "channel: test");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn broadcast_reaches_every_listener() -> Result<()> {
    let router = Router::new();
    router.create_channel("news")?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut first = connect(&server, None).await?;
    let mut second = connect(&server, None).await?;
    send(&mut first, "listen: news").await?;
    send(&mut second, "listen: news").await?;
    eventually(|| router.listener_count("news").unwrap_or(0) == 2).await?;

    for i in 0..3 {
        router
            .publish("news", Message::new("update", format!("v{i}"))?)
            .await?;
    }
    for client in [&mut first, &mut second] {
        for i in 0..3 {
            assert_eq!(recv(client).await?, format!("update: v{i}"));
        }
    }

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn send_to_single_session() -> Result<()> {
    let router = Router::new();
    greet_with_id(&router)?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut client = connect(&server, None).await?;
    let session_id = read_greeting(&mut client).await?;
    assert!(router.has_session(session_id));

    router
        .send_to(session_id, Message::new("direct", "hi")?)
        .await?;
    assert_eq!(recv(&mut client).await?, "direct: hi");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn disconnect_removes_session_and_listeners() -> Result<()> {
    let router = Router::new();
    router.create_channel("a")?;
    router.create_channel("b")?;
    greet_with_id(&router)?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut client = connect(&server, None).await?;
    let session_id = read_greeting(&mut client).await?;
    send(&mut client, "listen: a").await?;
    send(&mut client, "listen: b").await?;
    eventually(|| router.listener_count("b").unwrap_or(0) == 1).await?;

    client.close(None).await?;
    drop(client);

    eventually(|| !router.has_session(session_id)).await?;
    assert_eq!(router.listener_count("a")?, 0);
    assert_eq!(router.listener_count("b")?, 0);

    let err = assert_err!(router.send_to(session_id, Message::new("late", "x")?).await);
    assert!(err.is_not_found());

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn authenticator_rejects_bad_credentials() -> Result<()> {
    let router = Router::new();
    router.register_fn("open", |_, _| Ok(Some(Message::new("hello", "Connected")?)))?;
    let options = ServerOptions::new().with_authenticator(|token| {
        if token == "valid" {
            Ok(())
        } else {
            Err("Failed to authenticate".into())
        }
    });
    let server = start(&router, options).await?;

    for cookie in [None, Some("invalid")] {
        match connect(&server, cookie).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
            Err(e) => bail!("unexpected error: {e}"),
            Ok(_) => bail!("connection with {cookie:?} should be refused"),
        }
    }

    let mut client = assert_ok!(connect(&server, Some("valid")).await);
    assert_eq!(recv(&mut client).await?, "hello: Connected");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn guarded_channel_checks_session_credential() -> Result<()> {
    let router = Router::new();
    router.create_guarded_channel("validate", |credential| {
        if credential == "channel_valid" {
            Ok(())
        } else {
            Err("Not permitted".into())
        }
    })?;
    let server = start(&router, ServerOptions::new()).await?;

    let mut denied = connect(&server, Some("valid")).await?;
    send(&mut denied, "listen: validate").await?;
    assert_eq!(
        recv(&mut denied).await?,
        "websocket: not permitted to listen on validate: Not permitted"
    );

    let mut allowed = connect(&server, Some("channel_valid")).await?;
    send(&mut allowed, "listen: validate").await?;
    eventually(|| router.listener_count("validate").unwrap_or(0) == 1).await?;

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn subprotocol_is_negotiated() -> Result<()> {
    let router = Router::new();
    let server = start(&router, ServerOptions::new()).await?;

    let mut request = server.ws_url().into_client_request()?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static("cmd.fossores.de"),
    );
    let (_client, response) = connect_async(request).await?;
    assert_eq!(
        response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok()),
        Some("cmd.fossores.de")
    );

    server.shutdown();
    Ok(())
}
