//! WebSocket transport over TCP.
//!
//! The listener accepts raw TCP connections; the WebSocket handshake runs in
//! the per-connection task so a slow client never stalls the accept loop.
//! Framing, masking and control frames are handled by tokio-tungstenite.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;

use crate::error::ServerError;

/// Upgraded client connection.
pub type WsStream = WebSocketStream<TcpStream>;

/// TCP listener handing out WebSocket connections.
pub struct WsTransport {
    listener: TcpListener,
}

impl WsTransport {
    /// Bind a listener.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if `address` is not a socket address
    /// - `ServerError::Transport` if the address cannot be bound
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next TCP connection.
    ///
    /// The stream still needs [`handshake`] before frames can be exchanged.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Run the server side of the WebSocket handshake.
pub async fn handshake(stream: TcpStream) -> Result<WsStream, ServerError> {
    tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| ServerError::Transport(format!("websocket handshake failed: {e}")))
}
