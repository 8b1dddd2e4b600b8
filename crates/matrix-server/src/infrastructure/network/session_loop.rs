//! Single-connection session loop.
//!
//! The loop alternates between two states:
//!
//! ```text
//!            accept()
//! IdleRender ────────► Serving
//!     ▲                   │
//!     └───────────────────┘
//!   EOF / I/O error / broken framing / read timeout
//! ```
//!
//! In `IdleRender` the idle pattern is presented and the listener is polled.
//! In `Serving` requests from the one accepted client are decoded, executed
//! on the blocking pool in arrival order, and answered before the next one is
//! read.  `accept()` is never called while serving, so a second client sits in
//! the kernel's listen backlog until the first one goes away.
//!
//! A request whose payload does not decode is skipped using the header's
//! payload length and answered with an error; the session carries on.  Only a
//! bad header (unknown type, wrong version, oversized length) ends it.
//!
//! Shutdown is cooperative: the shared `running` flag is checked every
//! [`POLL_INTERVAL`] in both states.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::Context;
use matrix_core::protocol::messages::{ErrorCode, MatrixMessage, HEADER_SIZE};
use matrix_core::protocol::{decode_header, decode_message, encode_message, ProtocolError};
use matrix_core::Framebuffer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::service::MatrixService;

/// How often blocked accepts and reads wake up to check the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

const READ_CHUNK: usize = 64 * 1024;

/// Where the loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Showing the idle pattern and waiting for a client.
    IdleRender,
    /// Serving exactly one client.
    Serving { session_id: Uuid, peer: SocketAddr },
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    ClientClosed,
    TimedOut,
    Corrupted,
    Shutdown,
}

/// Accepts one client at a time and feeds its requests to the service.
pub struct SessionLoop {
    listener: TcpListener,
    service: Arc<MatrixService>,
    idle_frame: Arc<Framebuffer>,
    read_timeout: Option<Duration>,
    state: SessionState,
}

impl SessionLoop {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (port in use, no
    /// permission, ...).
    pub async fn bind(
        addr: SocketAddr,
        service: Arc<MatrixService>,
        idle_frame: Framebuffer,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind matrix listener on {addr}"))?;
        Ok(Self {
            listener,
            service,
            idle_frame: Arc::new(idle_frame),
            read_timeout: None,
            state: SessionState::IdleRender,
        })
    }

    /// Ends sessions whose client sends nothing for `limit`.  `None` waits
    /// forever.
    pub fn with_read_timeout(mut self, limit: Option<Duration>) -> Self {
        self.read_timeout = limit;
        self
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Propagates the OS error from `getsockname`.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Only returns an error if a blocking task cannot be joined; session and
    /// display failures are logged and the loop carries on.
    pub async fn run(&mut self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("matrix server listening on {}", self.local_addr()?);

        while running.load(Ordering::Relaxed) {
            self.render_idle().await?;

            let Some((stream, peer)) = self.accept(&running).await else {
                break;
            };

            let session_id = Uuid::new_v4();
            self.enter(SessionState::Serving { session_id, peer });
            match self.serve(stream, session_id, &running).await {
                Ok(end) => info!("session {session_id} ({peer}) ended: {end:?}"),
                Err(e) => warn!("session {session_id} ({peer}) ended with error: {e:#}"),
            }
            self.enter(SessionState::IdleRender);
        }

        info!("shutdown flag set; session loop stopped");
        Ok(())
    }

    fn enter(&mut self, next: SessionState) {
        debug!("session loop: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    async fn render_idle(&self) -> anyhow::Result<()> {
        let service = Arc::clone(&self.service);
        let frame = Arc::clone(&self.idle_frame);
        let result = tokio::task::spawn_blocking(move || service.show_idle(&frame))
            .await
            .context("idle render task panicked")?;
        if let Err(e) = result {
            error!("failed to show idle pattern: {e}");
        }
        Ok(())
    }

    /// Waits for one client, or returns `None` once shutdown is requested.
    async fn accept(&self, running: &AtomicBool) -> Option<(TcpStream, SocketAddr)> {
        accept_until(running, || self.listener.accept()).await
    }

    async fn serve(
        &self,
        mut stream: TcpStream,
        session_id: Uuid,
        running: &AtomicBool,
    ) -> anyhow::Result<SessionEnd> {
        info!("session {session_id}: client connected");
        stream.set_nodelay(true).ok();

        let mut recv_buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut read_tmp = vec![0u8; READ_CHUNK];
        let mut last_activity = Instant::now();

        loop {
            // Drain every complete request already buffered.
            loop {
                match decode_message(&recv_buf) {
                    Ok((request, header, consumed)) => {
                        recv_buf.drain(..consumed);
                        let reply = self.dispatch(request).await?;
                        debug!(
                            "session {session_id}: seq {} -> {:?}",
                            header.sequence_number,
                            reply.message_type()
                        );
                        write_reply(&mut stream, &reply, header.sequence_number).await?;
                    }
                    Err(ProtocolError::InsufficientData { .. }) => break,
                    Err(e) if e.is_payload_error() => {
                        // Header and payload are both buffered; skip just this request.
                        let header = decode_header(&recv_buf).context("re-read header of bad request")?;
                        recv_buf.drain(..HEADER_SIZE + header.payload_length as usize);
                        warn!("session {session_id}: rejected seq {}: {e}", header.sequence_number);
                        let reply = MatrixMessage::error(e.error_code(), e.to_string());
                        write_reply(&mut stream, &reply, header.sequence_number).await?;
                    }
                    Err(e) => {
                        warn!("session {session_id}: undecodable request: {e}");
                        let seq = decode_header(&recv_buf)
                            .map(|h| h.sequence_number)
                            .unwrap_or(0);
                        let reply = MatrixMessage::error(ErrorCode::InvalidMessage, e.to_string());
                        // Best effort: the session is over either way.
                        let _ = write_reply(&mut stream, &reply, seq).await;
                        return Ok(SessionEnd::Corrupted);
                    }
                }
            }

            let n = loop {
                if !running.load(Ordering::Relaxed) {
                    return Ok(SessionEnd::Shutdown);
                }
                match timeout(POLL_INTERVAL, stream.read(&mut read_tmp)).await {
                    Ok(read) => break read.context("read from client")?,
                    Err(_) => {
                        if let Some(limit) = self.read_timeout {
                            if last_activity.elapsed() >= limit {
                                return Ok(SessionEnd::TimedOut);
                            }
                        }
                    }
                }
            };
            if n == 0 {
                return Ok(SessionEnd::ClientClosed);
            }
            last_activity = Instant::now();
            recv_buf.extend_from_slice(&read_tmp[..n]);
        }
    }

    async fn dispatch(&self, request: MatrixMessage) -> anyhow::Result<MatrixMessage> {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || service.dispatch(&request))
            .await
            .context("dispatch task panicked")
    }
}

/// Polls `accept` until it yields a connection or `running` is cleared.
async fn accept_until<T, F, Fut>(running: &AtomicBool, mut accept: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        if !running.load(Ordering::Relaxed) {
            return None;
        }
        match timeout(POLL_INTERVAL, accept()).await {
            Ok(Ok(accepted)) => return Some(accepted),
            // Transient (e.g. EMFILE); keep listening, but not in a hot loop.
            Ok(Err(e)) => {
                error!("accept error: {e}");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(_) => {}
        }
    }
}

async fn write_reply(stream: &mut TcpStream, reply: &MatrixMessage, seq: u64) -> anyhow::Result<()> {
    let bytes = encode_message(reply, seq).context("encode reply")?;
    stream.write_all(&bytes).await.context("write reply")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::display::{DisplayAdapter, HeadlessBackend, MatrixOptions};
    use matrix_core::{Geometry, Rgba, Size};
    use std::sync::atomic::AtomicUsize;

    async fn make_loop() -> (SessionLoop, HeadlessBackend) {
        let backend = HeadlessBackend::new();
        let adapter = DisplayAdapter::open(MatrixOptions::with_geometry(Geometry::new(4, 4, 1, 1)), &backend)
            .expect("open headless display");
        let service = Arc::new(MatrixService::new(adapter));
        let mut idle = Framebuffer::new(4, 4).unwrap();
        idle.set(0, 0, Rgba::RED);
        let sl = SessionLoop::bind("127.0.0.1:0".parse().unwrap(), service, idle)
            .await
            .expect("bind");
        (sl, backend)
    }

    #[tokio::test]
    async fn test_new_loop_starts_idle() {
        let (sl, _) = make_loop().await;
        assert_eq!(sl.state(), &SessionState::IdleRender);
        assert_ne!(sl.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_failing_accept_backs_off_between_attempts() {
        // Arrange: every accept fails; the flag clears after half a second
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(false, Ordering::Relaxed);
        });
        let attempts = AtomicUsize::new(0);

        // Act
        let accepted: Option<()> = accept_until(&running, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(std::io::Error::new(std::io::ErrorKind::Other, "too many open files")) }
        })
        .await;

        // Assert
        let attempts = attempts.load(Ordering::Relaxed);
        assert!(accepted.is_none());
        assert!((1..=5).contains(&attempts), "{attempts} accept attempts in 500 ms");
    }

    #[tokio::test]
    async fn test_run_shows_idle_pattern_then_stops_on_flag() {
        // Arrange
        let (mut sl, backend) = make_loop().await;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = tokio::spawn(async move { sl.run(flag).await });

        // Act: read the panel while the loop still owns the display; once it
        // stops, dropping the service closes and blanks the panel
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut shown = backend.presented();
        while shown.is_none() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
            shown = backend.presented();
        }
        running.store(false, Ordering::Relaxed);
        let result = timeout(Duration::from_secs(2), handle).await;

        // Assert
        let shown = shown.expect("idle pattern presented");
        assert_eq!(shown.size(), Size::new(4, 4));
        assert_eq!(shown.get(0, 0).map(Rgba::to_rgb), Some((0xFF, 0, 0)));
        assert!(matches!(result, Ok(Ok(Ok(())))), "loop must stop within one poll interval");
    }
}
