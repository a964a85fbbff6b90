//! Push transport
//!
//! [`Connector`] opens a [`PushSocket`]; the supervisor owns the socket and
//! is the only thing that reads or writes it. [`WsConnector`] is the
//! WebSocket implementation; tests plug in in-memory connectors.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::TransportError;

/// Query parameter carrying the auth token on the push URL
pub const AUTH_QUERY_PARAM: &str = "authorization";

/// An open, bidirectional push channel
pub trait PushSocket: Send {
    /// Send one payload
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Next inbound payload; `None` once the peer has closed
    fn recv(&mut self) -> BoxFuture<'_, Option<Result<Bytes, TransportError>>>;

    /// Close gracefully, ignoring errors
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Opens push sockets
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn PushSocket>, TransportError>>;
}

/// Push URL for `endpoint` with the auth token as a query parameter
pub fn push_url(endpoint: &Url, token: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    if let Some(token) = token {
        url.query_pairs_mut().append_pair(AUTH_QUERY_PARAM, token);
    }
    url
}

/// URL safe to log: query and credentials stripped
pub fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    let _ = clean.set_password(None);
    let _ = clean.set_username("");
    clean.to_string()
}

/// WebSocket connector
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn PushSocket>, TransportError>> {
        let url = url.clone();
        Box::pin(async move {
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            Ok(Box::new(WsSocket { stream }) as Box<dyn PushSocket>)
        })
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushSocket for WsSocket {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let text = String::from_utf8(payload.to_vec())
                .map_err(|e| TransportError::Send(e.to_string()))?;
            self.stream
                .send(Message::Text(text))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<Bytes, TransportError>>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text))),
                    Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(frame = ?frame, "Close frame received");
                        return None;
                    }
                    // pings are answered by tungstenite on the next read/write
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                    Err(e) => return Some(Err(TransportError::Protocol(e.to_string()))),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.stream.close(None).await;
        })
    }
}
