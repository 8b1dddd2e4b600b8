//! Request/response transport to `matrixd`.
//!
//! TCP is a stream protocol, so replies are accumulated in a receive buffer
//! and decoded with [`decode_message`] until a complete message is available.
//! Every request carries a fresh sequence number and the matching reply must
//! echo it; anything else in between is a stale reply and is skipped.

use std::time::Duration;

use matrix_core::protocol::messages::MatrixMessage;
use matrix_core::protocol::{decode_message, encode_message, ProtocolError, SequenceCounter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::RemoteError;

const READ_CHUNK: usize = 4096;

/// One open connection to the server.
pub struct MatrixConnection {
    stream: TcpStream,
    recv_buf: Vec<u8>,
    sequence: SequenceCounter,
    call_timeout: Duration,
}

impl MatrixConnection {
    /// Opens a TCP connection to `addr` within `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the connect attempt, or an
    /// [`std::io::ErrorKind::TimedOut`] error if it takes too long.
    pub async fn open(addr: &str, connect_timeout: Duration, call_timeout: Duration) -> std::io::Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no answer within {connect_timeout:?}"),
                ))
            }
        };
        stream.set_nodelay(true)?;
        debug!("connected to matrix server at {addr}");
        Ok(Self {
            stream,
            recv_buf: Vec::with_capacity(READ_CHUNK),
            sequence: SequenceCounter::new(),
            call_timeout,
        })
    }

    /// Sends `request` and waits for its reply.
    ///
    /// An `Error` reply is returned as [`RemoteError::Rejected`].
    ///
    /// # Errors
    ///
    /// [`RemoteError::TimedOut`] if no reply arrives within the call timeout,
    /// [`RemoteError::Transport`] for socket failures or a closed connection,
    /// [`RemoteError::Protocol`] for undecodable replies.  After any of those
    /// the connection must not be reused.
    pub async fn call(&mut self, request: &MatrixMessage) -> Result<MatrixMessage, RemoteError> {
        let limit = self.call_timeout;
        match timeout(limit, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::TimedOut(limit)),
        }
    }

    /// Half-closes the socket so the server sees EOF immediately.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("shutdown of matrix connection failed: {e}");
        }
    }

    async fn exchange(&mut self, request: &MatrixMessage) -> Result<MatrixMessage, RemoteError> {
        let seq = self.sequence.next();
        let bytes = encode_message(request, seq)?;
        self.stream.write_all(&bytes).await?;

        loop {
            let (reply, reply_seq) = self.read_reply().await?;
            if reply_seq != seq {
                warn!("discarding stale reply seq {reply_seq} (waiting for {seq})");
                continue;
            }
            return match reply {
                MatrixMessage::Error(e) => Err(RemoteError::Rejected {
                    code: e.code,
                    description: e.description,
                }),
                other => Ok(other),
            };
        }
    }

    async fn read_reply(&mut self) -> Result<(MatrixMessage, u64), RemoteError> {
        let mut read_tmp = [0u8; READ_CHUNK];
        loop {
            match decode_message(&self.recv_buf) {
                Ok((msg, header, consumed)) => {
                    self.recv_buf.drain(..consumed);
                    return Ok((msg, header.sequence_number));
                }
                Err(ProtocolError::InsufficientData { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let n = self.stream.read(&mut read_tmp).await?;
            if n == 0 {
                return Err(RemoteError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            self.recv_buf.extend_from_slice(&read_tmp[..n]);
        }
    }
}
