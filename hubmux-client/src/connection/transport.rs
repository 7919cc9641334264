//! Physical transports for the session channel
//!
//! The Hub serves its session channel over a WebSocket. Stream sockets
//! (`tcp://host:port`, `unix:///path`) carry the same JSON frames delimited
//! by newlines, which is what local relays and test harnesses speak.

use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use hubmux_protocol::FrameCodec;
use hubmux_utils::{HubmuxError, Result};

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something the link task observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One text frame
    Frame(String),
    /// Transport fault; a `Closed` always follows
    Error(String),
    /// Peer closed or the stream ended
    Closed,
}

/// Where the session channel lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    WebSocket(Url),
    Tcp(String),
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse `ws://`, `wss://`, `tcp://host:port` or `unix:///path`
    pub fn parse(addr: &str) -> Result<Self> {
        let url = Url::parse(addr)
            .map_err(|e| HubmuxError::Connection(format!("Invalid URL '{}': {}", addr, e)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self::WebSocket(url)),
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| HubmuxError::connection("Missing host in TCP URL"))?;
                let port = url
                    .port()
                    .ok_or_else(|| HubmuxError::connection("Missing port in TCP URL"))?;
                Ok(Self::Tcp(format!("{}:{}", host, port)))
            }
            "unix" => {
                if url.path().is_empty() {
                    return Err(HubmuxError::connection("Missing path in Unix URL"));
                }
                Ok(Self::Unix(PathBuf::from(url.path())))
            }
            other => Err(HubmuxError::Connection(format!(
                "Unsupported scheme '{}' (expected ws, wss, tcp or unix)",
                other
            ))),
        }
    }
}

/// An open transport
///
/// Dropping the link closes it. Events stop after `Closed`.
pub struct Link {
    id: Uuid,
    outgoing: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    cancel: CancellationToken,
}

impl Link {
    /// Correlation id for logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue one frame. Returns false if the link task has stopped.
    pub fn send(&self, frame: String) -> bool {
        self.outgoing.send(frame).is_ok()
    }

    /// Next event; `Closed` once the task is gone
    pub async fn recv(&mut self) -> LinkEvent {
        self.events.recv().await.unwrap_or(LinkEvent::Closed)
    }

    fn spawn_channels() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<LinkEvent>,
    ) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = Self {
            id: Uuid::new_v4(),
            outgoing: outgoing_tx,
            events: events_rx,
            cancel: CancellationToken::new(),
        };
        (link, outgoing_rx, events_tx)
    }

    /// A link with no task behind it, driven by hand
    #[cfg(test)]
    pub(crate) fn detached() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<LinkEvent>,
    ) {
        Self::spawn_channels()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Open a link, bounded by `timeout`
pub async fn connect(addr: &str, timeout: Duration) -> Result<Link> {
    let endpoint = Endpoint::parse(addr)?;

    match tokio::time::timeout(timeout, open(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(HubmuxError::ConnectionTimeout {
            millis: timeout.as_millis() as u64,
        }),
    }
}

async fn open(endpoint: Endpoint) -> Result<Link> {
    let (link, outgoing, events) = Link::spawn_channels();
    let link_id = link.id;
    let cancel = link.cancel.clone();

    match endpoint {
        Endpoint::WebSocket(url) => {
            let (ws, _response) = connect_async(url.as_str()).await.map_err(|e| {
                HubmuxError::Connection(format!("Failed to connect to {}: {}", url, e))
            })?;
            info!(link = %link_id, url = %url, "WebSocket link open");
            tokio::spawn(websocket_task(ws, outgoing, events, cancel, link_id));
        }
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(&addr).await.map_err(|e| {
                HubmuxError::Connection(format!("Failed to connect to {}: {}", addr, e))
            })?;
            info!(link = %link_id, addr = %addr, "TCP link open");
            let stream: Box<dyn StreamTrait> = Box::new(stream);
            tokio::spawn(stream_task(
                Framed::new(stream, FrameCodec::new()),
                outgoing,
                events,
                cancel,
                link_id,
            ));
        }
        Endpoint::Unix(path) => {
            if !path.exists() {
                return Err(HubmuxError::HubUnreachable {
                    url: format!("unix://{}", path.display()),
                });
            }
            let stream = UnixStream::connect(&path).await.map_err(|e| {
                HubmuxError::Connection(format!("Failed to connect to {}: {}", path.display(), e))
            })?;
            info!(link = %link_id, path = %path.display(), "Unix link open");
            let stream: Box<dyn StreamTrait> = Box::new(stream);
            tokio::spawn(stream_task(
                Framed::new(stream, FrameCodec::new()),
                outgoing,
                events,
                cancel,
                link_id,
            ));
        }
    }

    Ok(link)
}

/// Background task that handles WebSocket I/O
async fn websocket_task(
    mut ws: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
    link_id: Uuid,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(link = %link_id, "Closing WebSocket link");
                let _ = ws.close(None).await;
                break;
            }

            Some(frame) = outgoing.recv() => {
                if let Err(e) = ws.send(Message::Text(frame.into())).await {
                    warn!(link = %link_id, error = %e, "Failed to send frame");
                    let _ = events.send(LinkEvent::Error(e.to_string()));
                    let _ = events.send(LinkEvent::Closed);
                    break;
                }
            }

            result = ws.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(LinkEvent::Frame(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(link = %link_id, ?frame, "Hub closed connection");
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(link = %link_id, len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite
                        trace!(link = %link_id, "Control frame");
                    }
                    Some(Err(e)) => {
                        warn!(link = %link_id, error = %e, "WebSocket error");
                        let _ = events.send(LinkEvent::Error(e.to_string()));
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                    None => {
                        info!(link = %link_id, "WebSocket stream ended");
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                }
            }
        }
    }
}

/// Background task that handles newline-framed socket I/O
async fn stream_task(
    mut framed: Framed<Box<dyn StreamTrait>, FrameCodec>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
    link_id: Uuid,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(link = %link_id, "Closing stream link");
                let _ = framed.close().await;
                break;
            }

            Some(frame) = outgoing.recv() => {
                if let Err(e) = framed.send(frame).await {
                    warn!(link = %link_id, error = %e, "Failed to send frame");
                    let _ = events.send(LinkEvent::Error(e.to_string()));
                    let _ = events.send(LinkEvent::Closed);
                    break;
                }
            }

            result = framed.next() => {
                match result {
                    Some(Ok(text)) => {
                        if events.send(LinkEvent::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(link = %link_id, error = %e, "Failed to receive frame");
                        let _ = events.send(LinkEvent::Error(e.to_string()));
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                    None => {
                        info!(link = %link_id, "Server closed connection");
                        let _ = events.send(LinkEvent::Closed);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, UnixListener};

    // ==================== Endpoint Parsing ====================

    #[test]
    fn test_parse_websocket() {
        let endpoint = Endpoint::parse("ws://localhost:9000/ws").unwrap();
        assert!(matches!(endpoint, Endpoint::WebSocket(ref u) if u.path() == "/ws"));
        assert!(matches!(
            Endpoint::parse("wss://hub.example.com/ws").unwrap(),
            Endpoint::WebSocket(_)
        ));
    }

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:4000").unwrap(),
            Endpoint::Tcp("127.0.0.1:4000".into())
        );
    }

    #[test]
    fn test_parse_tcp_missing_port() {
        let err = Endpoint::parse("tcp://127.0.0.1").unwrap_err();
        assert!(err.to_string().contains("Missing port"));
    }

    #[test]
    fn test_parse_unix() {
        assert_eq!(
            Endpoint::parse("unix:///tmp/hub.sock").unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/hub.sock"))
        );
    }

    #[test]
    fn test_parse_rejects_http_and_garbage() {
        assert!(Endpoint::parse("http://localhost:9000").is_err());
        assert!(Endpoint::parse("not a url").is_err());
    }

    // ==================== Stream Links ====================

    #[tokio::test]
    async fn test_tcp_link_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            write.write_all(format!("echo:{}\n", line).as_bytes()).await.unwrap();
            // Hold the socket until the client hangs up
            let _ = lines.next_line().await;
        });

        let mut link = connect(&format!("tcp://{}", addr), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(link.send("hello".into()));
        assert_eq!(link.recv().await, LinkEvent::Frame("echo:hello".into()));

        drop(link);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_link_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut link = connect(&format!("tcp://{}", addr), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(link.recv().await, LinkEvent::Closed);
    }

    #[tokio::test]
    async fn test_unix_link() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"{\"type\":\"error\",\"message\":\"hi\"}\n").await.unwrap();
        });

        let mut link = connect(&format!("unix://{}", path.display()), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            link.recv().await,
            LinkEvent::Frame("{\"type\":\"error\",\"message\":\"hi\"}".into())
        );
    }

    #[tokio::test]
    async fn test_unix_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let result = connect(&format!("unix://{}", path.display()), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(HubmuxError::HubUnreachable { .. })));
    }

    #[tokio::test]
    async fn test_connect_refused_is_retryable() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&format!("tcp://{}", addr), Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_wss_attempts_tls_handshake() {
        // Accepts TCP and hangs up without speaking TLS
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let err = connect(&format!("wss://{}/ws", addr), Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(!message.contains("TLS support not compiled in"), "{}", message);
    }

    #[tokio::test]
    async fn test_detached_link() {
        let (mut link, mut outgoing, events) = Link::detached();
        assert!(link.send("x".into()));
        assert_eq!(outgoing.recv().await.unwrap(), "x");

        events.send(LinkEvent::Frame("y".into())).unwrap();
        assert_eq!(link.recv().await, LinkEvent::Frame("y".into()));

        drop(events);
        assert_eq!(link.recv().await, LinkEvent::Closed);
    }
}
