//! ==============================================================================
//! channel.rs - socket.io push channel with unlimited reconnect
//! ==============================================================================
//!
//! purpose:
//!     keeps one websocket open to the sensor server's socket.io endpoint and
//!     turns what arrives into ChannelEvents for the session. after a failure
//!     it waits a fixed delay and tries again, forever. the task only stops
//!     when it is aborted or the session drops its receiver.
//!
//! ```text
//!     websocket up + namespace ack  ->  Connected
//!     42["<name>", payload]         ->  Event { name, payload }
//!     any failure / close           ->  Disconnected (if we were connected)
//! ```
//!
//! relationships:
//!     - uses: protocol.rs (packet codec)
//!     - used by: session.rs (spawns run(), consumes the mpsc)
//!
//! ==============================================================================

use crate::error::{DashboardError, DashboardResult};
use crate::protocol::{self, EnginePacket, SocketPacket};
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// how long the server has to answer the upgrade and send its open packet
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Event { name: String, payload: Value },
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// ws:// or wss:// url including /socket.io/ and the EIO query
    pub socket_url: Url,
    pub namespace: String,
    pub reconnect_delay: Duration,
    /// applies to the http upgrade and, separately, to the engine.io open packet
    pub handshake_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(base_url: &Url, reconnect_delay: Duration) -> DashboardResult<Self> {
        Ok(Self {
            socket_url: socket_url(base_url)?,
            namespace: protocol::DEFAULT_NAMESPACE.to_string(),
            reconnect_delay,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        })
    }
}

/// derive the websocket-only socket.io endpoint from the http base url
pub fn socket_url(base_url: &Url) -> DashboardResult<Url> {
    let scheme = match base_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(DashboardError::InvalidUrl(format!(
                "unsupported scheme {other:?} in {base_url}"
            )))
        }
    };

    let mut url = base_url.clone();
    url.set_scheme(scheme)
        .map_err(|_| DashboardError::InvalidUrl(base_url.to_string()))?;
    let path = format!("{}/socket.io/", base_url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    url.set_fragment(None);
    Ok(url)
}

/// connect, pump events, reconnect after `reconnect_delay`; never returns
/// while the session is listening
pub async fn run(config: ChannelConfig, events: mpsc::Sender<ChannelEvent>) {
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;
        let mut connected = false;

        match connect_once(&config, &events, &mut connected).await {
            Ok(()) => info!(attempt, "push channel closed"),
            Err(e) if connected => warn!(attempt, error = %e, "push channel lost"),
            Err(e) => debug!(attempt, error = %e, "push channel connect failed"),
        }

        if connected && events.send(ChannelEvent::Disconnected).await.is_err() {
            break;
        }
        if events.is_closed() {
            break;
        }
        if connected {
            attempt = 0;
        }

        tokio::time::sleep(config.reconnect_delay).await;
    }

    debug!("push channel task finished");
}

/// one connection lifetime; `connected` is set once the namespace is joined
async fn connect_once(
    config: &ChannelConfig,
    events: &mpsc::Sender<ChannelEvent>,
    connected: &mut bool,
) -> DashboardResult<()> {
    let (ws, _) = tokio::time::timeout(
        config.handshake_timeout,
        connect_async(config.socket_url.as_str()),
    )
    .await
    .map_err(|_| DashboardError::Protocol("websocket handshake timed out".into()))??;
    let (mut sink, mut stream) = ws.split();

    let open = match next_packet(&mut stream, config.handshake_timeout).await? {
        EnginePacket::Open(open) => open,
        other => {
            return Err(DashboardError::Protocol(format!(
                "expected engine.io open packet, got {other:?}"
            )))
        }
    };
    debug!(sid = %open.sid, ping_interval = open.ping_interval, "engine.io handshake");

    sink.send(Message::Text(protocol::encode_connect(&config.namespace)))
        .await?;

    let liveness = Duration::from_millis(open.liveness_ms());
    loop {
        match next_packet(&mut stream, liveness).await? {
            EnginePacket::Ping(data) => {
                sink.send(Message::Text(protocol::encode_pong(&data))).await?;
            }
            EnginePacket::Close => return Ok(()),
            EnginePacket::Message(payload) => match protocol::decode_socket(&payload) {
                Ok(SocketPacket::Connect { namespace, .. }) if namespace == config.namespace => {
                    info!(url = %config.socket_url, "push channel connected");
                    *connected = true;
                    forward(events, ChannelEvent::Connected).await?;
                }
                Ok(SocketPacket::Event {
                    namespace,
                    name,
                    args,
                    ..
                }) if namespace == config.namespace => {
                    let payload = args.into_iter().next().unwrap_or(Value::Null);
                    forward(events, ChannelEvent::Event { name, payload }).await?;
                }
                Ok(SocketPacket::Disconnect { namespace }) if namespace == config.namespace => {
                    return Ok(());
                }
                Ok(SocketPacket::ConnectError { data, .. }) => {
                    return Err(DashboardError::Protocol(format!(
                        "namespace connect refused: {}",
                        data.unwrap_or(Value::Null)
                    )));
                }
                Ok(other) => debug!(packet = ?other, "ignoring socket.io packet"),
                Err(e) => warn!(error = %e, "undecodable socket.io packet"),
            },
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }
}

async fn forward(events: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) -> DashboardResult<()> {
    events
        .send(event)
        .await
        .map_err(|_| DashboardError::ConnectionClosed)
}

/// next engine.io packet, skipping websocket-level control frames
async fn next_packet<S>(stream: &mut S, wait: Duration) -> DashboardResult<EnginePacket>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(wait, stream.next())
            .await
            .map_err(|_| DashboardError::PingTimeout(wait.as_millis() as u64))?;

        match frame {
            None | Some(Ok(Message::Close(_))) => return Err(DashboardError::ConnectionClosed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) => return protocol::decode_engine(&text),
            Some(Ok(_)) => continue,
        }
    }
}
