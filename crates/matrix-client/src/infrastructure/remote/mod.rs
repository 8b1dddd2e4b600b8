//! Client-side proxy for a remote LED matrix.
//!
//! [`RemoteMatrix`] owns a local [`Framebuffer`] mirror sized to the remote
//! display.  Drawing is purely local; nothing crosses the network until
//! [`RemoteMatrix::swap`], which sends the whole mirror as one `PresentFrame`
//! request.  The mirror is never modified by network operations, so a failed
//! swap can simply be retried after [`RemoteMatrix::reconnect`].
//!
//! The per-pixel `remote_*` methods act on the server's back canvas directly
//! and are mostly useful for tooling.

pub mod connection;

use std::time::Duration;

use matrix_core::protocol::messages::{ErrorCode, MatrixMessage, MessageType, PixelWrite};
use matrix_core::{Framebuffer, FramebufferError, ProtocolError, Rgba, Size};
use thiserror::Error;
use tracing::{debug, info, warn};

use self::connection::MatrixConnection;

// ── Errors ────────────────────────────────────────────────────────────────────

/// A remote call failed.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server answered with an error reply.
    #[error("server rejected request ({code:?}): {description}")]
    Rejected { code: ErrorCode, description: String },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered with a reply of the wrong kind.
    #[error("unexpected {0:?} reply")]
    UnexpectedResponse(MessageType),

    #[error("no reply within {0:?}")]
    TimedOut(Duration),
}

/// Errors returned by [`RemoteMatrix`].
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to connect to matrix server at {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// [`RemoteMatrix::close`] has been called.
    #[error("remote matrix is closed")]
    Closed,

    /// After a reconnect the server reports a different display size.
    #[error("server display changed from {previous} to {current}")]
    GeometryChanged { previous: Size, current: Size },
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Timeouts for the proxy's network operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyConfig {
    pub connect_timeout: Duration,
    /// Upper bound on one request/reply round trip, including the server's
    /// vsync wait.
    pub call_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
        }
    }
}

// ── Proxy ─────────────────────────────────────────────────────────────────────

enum Link {
    Open(MatrixConnection),
    /// A transport, timeout or protocol failure left the stream unusable.
    Broken,
    Closed,
}

/// Local framebuffer mirror bound to a remote display.
pub struct RemoteMatrix {
    addr: String,
    config: ProxyConfig,
    link: Link,
    mirror: Framebuffer,
}

impl RemoteMatrix {
    /// Connects with default timeouts.
    ///
    /// # Errors
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(addr: &str) -> Result<Self, ProxyError> {
        Self::connect_with(addr, ProxyConfig::default()).await
    }

    /// Connects, queries the display size and allocates a black mirror of
    /// that size.
    ///
    /// # Errors
    ///
    /// [`ProxyError::ConnectionFailed`] if the server cannot be reached, or
    /// [`ProxyError::Remote`] if the geometry query fails.
    pub async fn connect_with(addr: &str, config: ProxyConfig) -> Result<Self, ProxyError> {
        let (conn, size) = open_and_query(addr, &config).await?;
        let mirror = Framebuffer::with_size(size).map_err(|e| {
            RemoteError::Protocol(ProtocolError::MalformedPayload(format!(
                "server reported unusable geometry: {e}"
            )))
        })?;
        info!("attached to {size} matrix at {addr}");
        Ok(Self {
            addr: addr.to_string(),
            config,
            link: Link::Open(conn),
            mirror,
        })
    }

    // ── Local surface ────────────────────────────────────────────────────────

    /// Mirror size, fixed at connect time.
    pub fn size(&self) -> Size {
        self.mirror.size()
    }

    pub fn width(&self) -> u32 {
        self.mirror.width()
    }

    pub fn height(&self) -> u32 {
        self.mirror.height()
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Rgba> {
        self.mirror.get(x, y)
    }

    /// Writes one mirror pixel; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: i32, y: i32, color: Rgba) {
        self.mirror.set(x, y, color);
    }

    /// Checked variant of [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// [`FramebufferError::OutOfBounds`] without touching the mirror.
    pub fn try_set(&mut self, x: i32, y: i32, color: Rgba) -> Result<(), FramebufferError> {
        self.mirror.try_set(x, y, color)
    }

    pub fn fill(&mut self, color: Rgba) {
        self.mirror.fill(color);
    }

    pub fn clear(&mut self) {
        self.mirror.clear();
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.mirror
    }

    /// Direct access to the mirror for bulk drawing.  The size cannot change.
    pub fn framebuffer_mut(&mut self) -> &mut Framebuffer {
        &mut self.mirror
    }

    // ── Remote operations ────────────────────────────────────────────────────

    /// Presents the whole mirror on the remote display.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Remote`] for any transport or server failure;
    /// [`ProxyError::Closed`] after [`close`](Self::close).
    pub async fn swap(&mut self) -> Result<(), ProxyError> {
        let frame = MatrixMessage::PresentFrame(self.mirror.clone());
        self.call_expecting_ack(&frame).await
    }

    /// Re-queries the server's display size.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Remote`] or [`ProxyError::Closed`].
    pub async fn query_geometry(&mut self) -> Result<Size, ProxyError> {
        match self.call(&MatrixMessage::QueryGeometry).await? {
            MatrixMessage::Geometry(size) => Ok(size),
            other => Err(RemoteError::UnexpectedResponse(other.message_type()).into()),
        }
    }

    /// Clears the server's back canvas (not shown until a present).
    pub async fn remote_clear(&mut self) -> Result<(), ProxyError> {
        self.call_expecting_ack(&MatrixMessage::Clear).await
    }

    /// Fills the server's back canvas.
    pub async fn remote_fill(&mut self, color: Rgba) -> Result<(), ProxyError> {
        self.call_expecting_ack(&MatrixMessage::Fill(color)).await
    }

    /// Writes one pixel of the server's back canvas.
    ///
    /// # Errors
    ///
    /// An out-of-range coordinate comes back as
    /// [`RemoteError::Rejected`] with [`ErrorCode::OutOfBounds`].
    pub async fn remote_write_pixel(&mut self, x: i32, y: i32, color: Rgba) -> Result<(), ProxyError> {
        self.call_expecting_ack(&MatrixMessage::WritePixel(PixelWrite { x, y, color }))
            .await
    }

    /// Presents the server's back canvas as it is.
    pub async fn remote_present(&mut self) -> Result<(), ProxyError> {
        self.call_expecting_ack(&MatrixMessage::Present).await
    }

    /// Re-dials the server and checks it still has the same display size.
    /// The mirror is kept.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Closed`] after [`close`](Self::close),
    /// [`ProxyError::ConnectionFailed`], [`ProxyError::Remote`], or
    /// [`ProxyError::GeometryChanged`] (in which case the new connection is
    /// dropped and the proxy stays unusable until the next reconnect).
    pub async fn reconnect(&mut self) -> Result<(), ProxyError> {
        if self.is_closed() {
            return Err(ProxyError::Closed);
        }
        if let Link::Open(old) = std::mem::replace(&mut self.link, Link::Broken) {
            old.shutdown().await;
        }
        let (conn, size) = open_and_query(&self.addr, &self.config).await?;
        if size != self.mirror.size() {
            conn.shutdown().await;
            return Err(ProxyError::GeometryChanged {
                previous: self.mirror.size(),
                current: size,
            });
        }
        info!("reconnected to {size} matrix at {}", self.addr);
        self.link = Link::Open(conn);
        Ok(())
    }

    /// Closes the connection.  Every later remote operation fails with
    /// [`ProxyError::Closed`]; the local mirror stays usable.
    pub async fn close(&mut self) {
        if let Link::Open(conn) = std::mem::replace(&mut self.link, Link::Closed) {
            conn.shutdown().await;
            debug!("closed connection to {}", self.addr);
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.link, Link::Closed)
    }

    async fn call(&mut self, request: &MatrixMessage) -> Result<MatrixMessage, ProxyError> {
        let conn = match &mut self.link {
            Link::Open(conn) => conn,
            Link::Closed => return Err(ProxyError::Closed),
            Link::Broken => {
                return Err(RemoteError::Transport(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "connection lost; reconnect first",
                ))
                .into())
            }
        };
        match conn.call(request).await {
            Ok(reply) => Ok(reply),
            Err(e @ RemoteError::Rejected { .. }) | Err(e @ RemoteError::UnexpectedResponse(_)) => Err(e.into()),
            Err(e) => {
                warn!("connection to {} failed: {e}", self.addr);
                self.link = Link::Broken;
                Err(e.into())
            }
        }
    }

    async fn call_expecting_ack(&mut self, request: &MatrixMessage) -> Result<(), ProxyError> {
        match self.call(request).await? {
            MatrixMessage::Ack => Ok(()),
            other => Err(RemoteError::UnexpectedResponse(other.message_type()).into()),
        }
    }
}

impl std::fmt::Debug for RemoteMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = match self.link {
            Link::Open(_) => "open",
            Link::Broken => "broken",
            Link::Closed => "closed",
        };
        f.debug_struct("RemoteMatrix")
            .field("addr", &self.addr)
            .field("size", &self.mirror.size())
            .field("link", &link)
            .finish()
    }
}

async fn open_and_query(addr: &str, config: &ProxyConfig) -> Result<(MatrixConnection, Size), ProxyError> {
    let mut conn = MatrixConnection::open(addr, config.connect_timeout, config.call_timeout)
        .await
        .map_err(|source| ProxyError::ConnectionFailed {
            addr: addr.to_string(),
            source,
        })?;
    match conn.call(&MatrixMessage::QueryGeometry).await? {
        MatrixMessage::Geometry(size) => Ok((conn, size)),
        other => Err(RemoteError::UnexpectedResponse(other.message_type()).into()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::protocol::{decode_message, encode_message};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal scripted server: for each request, `respond` returns the
    /// replies to send as `(message, sequence offset)` pairs, where the offset
    /// is added to the request's sequence number.
    async fn scripted_server<F>(respond: F) -> String
    where
        F: Fn(&MatrixMessage) -> Vec<(MatrixMessage, i64)> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];
            loop {
                while let Ok((req, header, consumed)) = decode_message(&buf) {
                    buf.drain(..consumed);
                    for (reply, offset) in respond(&req) {
                        let seq = header.sequence_number.wrapping_add_signed(offset);
                        let bytes = encode_message(&reply, seq).unwrap();
                        stream.write_all(&bytes).await.unwrap();
                    }
                }
                match stream.read(&mut tmp).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&tmp[..n]),
                }
            }
        });
        addr
    }

    fn geometry_then_ack(req: &MatrixMessage) -> Vec<(MatrixMessage, i64)> {
        match req {
            MatrixMessage::QueryGeometry => vec![(MatrixMessage::Geometry(Size::new(8, 4)), 0)],
            _ => vec![(MatrixMessage::Ack, 0)],
        }
    }

    #[tokio::test]
    async fn test_connect_allocates_black_mirror_of_remote_size() {
        let addr = scripted_server(geometry_then_ack).await;

        let matrix = RemoteMatrix::connect(&addr).await.unwrap();

        assert_eq!(matrix.size(), Size::new(8, 4));
        assert!(matrix.framebuffer().pixels().iter().all(|p| *p == Rgba::BLACK));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_connection_failed() {
        // Bind then drop to find a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };

        let result = RemoteMatrix::connect(&addr).await;

        assert!(matches!(result, Err(ProxyError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_stale_reply_is_skipped() {
        // Arrange: every Ack is preceded by a reply carrying an old sequence number
        let addr = scripted_server(|req| match req {
            MatrixMessage::QueryGeometry => vec![(MatrixMessage::Geometry(Size::new(8, 4)), 0)],
            _ => vec![(MatrixMessage::Geometry(Size::new(1, 1)), -1), (MatrixMessage::Ack, 0)],
        })
        .await;
        let mut matrix = RemoteMatrix::connect(&addr).await.unwrap();

        // Act / Assert
        matrix.swap().await.expect("swap acked despite stale reply");
    }

    #[tokio::test]
    async fn test_error_reply_is_rejected_and_connection_stays_usable() {
        let addr = scripted_server(|req| match req {
            MatrixMessage::QueryGeometry => vec![(MatrixMessage::Geometry(Size::new(8, 4)), 0)],
            MatrixMessage::WritePixel(_) => {
                vec![(MatrixMessage::error(ErrorCode::OutOfBounds, "outside"), 0)]
            }
            _ => vec![(MatrixMessage::Ack, 0)],
        })
        .await;
        let mut matrix = RemoteMatrix::connect(&addr).await.unwrap();

        let result = matrix.remote_write_pixel(99, 0, Rgba::RED).await;

        assert!(matches!(
            result,
            Err(ProxyError::Remote(RemoteError::Rejected {
                code: ErrorCode::OutOfBounds,
                ..
            }))
        ));
        matrix.remote_present().await.expect("connection still usable");
    }

    #[tokio::test]
    async fn test_silent_server_times_out_and_breaks_link() {
        // Arrange: geometry is answered, everything else is ignored
        let addr = scripted_server(|req| match req {
            MatrixMessage::QueryGeometry => vec![(MatrixMessage::Geometry(Size::new(8, 4)), 0)],
            _ => Vec::new(),
        })
        .await;
        let config = ProxyConfig {
            connect_timeout: Duration::from_secs(1),
            call_timeout: Duration::from_millis(200),
        };
        let mut matrix = RemoteMatrix::connect_with(&addr, config).await.unwrap();
        matrix.set(1, 1, Rgba::GREEN);

        // Act
        let first = matrix.swap().await;
        let second = matrix.remote_present().await;

        // Assert
        assert!(matches!(first, Err(ProxyError::Remote(RemoteError::TimedOut(_)))));
        assert!(matches!(second, Err(ProxyError::Remote(RemoteError::Transport(_)))));
        assert_eq!(matrix.get(1, 1), Some(Rgba::GREEN), "mirror untouched by failures");
    }

    #[tokio::test]
    async fn test_unexpected_reply_kind_is_reported() {
        let addr = scripted_server(|req| match req {
            MatrixMessage::QueryGeometry => vec![(MatrixMessage::Geometry(Size::new(8, 4)), 0)],
            _ => vec![(MatrixMessage::Geometry(Size::new(8, 4)), 0)],
        })
        .await;
        let mut matrix = RemoteMatrix::connect(&addr).await.unwrap();

        let result = matrix.remote_clear().await;

        assert!(matches!(
            result,
            Err(ProxyError::Remote(RemoteError::UnexpectedResponse(MessageType::Geometry)))
        ));
    }

    #[tokio::test]
    async fn test_close_makes_remote_calls_fail_but_keeps_mirror() {
        let addr = scripted_server(geometry_then_ack).await;
        let mut matrix = RemoteMatrix::connect(&addr).await.unwrap();
        matrix.fill(Rgba::BLUE);

        matrix.close().await;

        assert!(matrix.is_closed());
        assert!(matches!(matrix.swap().await, Err(ProxyError::Closed)));
        assert!(matches!(matrix.query_geometry().await, Err(ProxyError::Closed)));
        assert_eq!(matrix.get(0, 0), Some(Rgba::BLUE));
    }

    #[tokio::test]
    async fn test_reconnect_after_close_stays_closed() {
        // Arrange
        let addr = scripted_server(geometry_then_ack).await;
        let mut matrix = RemoteMatrix::connect(&addr).await.unwrap();
        matrix.close().await;

        // Act
        let result = matrix.reconnect().await;

        // Assert
        assert!(matches!(result, Err(ProxyError::Closed)));
        assert!(matrix.is_closed());
        assert!(matches!(matrix.swap().await, Err(ProxyError::Closed)));
    }

    #[tokio::test]
    async fn test_local_drawing_ignores_out_of_range() {
        let addr = scripted_server(geometry_then_ack).await;
        let mut matrix = RemoteMatrix::connect(&addr).await.unwrap();

        matrix.set(8, 0, Rgba::RED);
        matrix.set(-1, 2, Rgba::RED);

        assert!(matrix.framebuffer().pixels().iter().all(|p| *p == Rgba::BLACK));
        assert!(matrix.try_set(0, 4, Rgba::RED).is_err());
    }
}
