//! All Matrix-Over-IP protocol message types.
//!
//! The protocol is strictly request/response: the client sends one request,
//! the server replies with exactly one of [`MatrixMessage::Geometry`],
//! [`MatrixMessage::Ack`] or [`MatrixMessage::Error`], echoing the request's
//! sequence number.

use serde::{Deserialize, Serialize};

use crate::domain::color::Rgba;
use crate::domain::framebuffer::Framebuffer;
use crate::domain::geometry::Size;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest payload a peer will accept (a 2048×2048 RGBA frame fits).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Requests (0x01–0x7F)
    QueryGeometry = 0x01,
    PresentFrame = 0x02,
    Clear = 0x03,
    Fill = 0x04,
    WritePixel = 0x05,
    Present = 0x06,
    // Replies (0x80–0xFF)
    Geometry = 0x81,
    Ack = 0x82,
    Error = 0x83,
}

impl MessageType {
    /// Returns `true` for message types a client sends to the server.
    pub fn is_request(self) -> bool {
        (self as u8) < 0x80
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::QueryGeometry),
            0x02 => Ok(MessageType::PresentFrame),
            0x03 => Ok(MessageType::Clear),
            0x04 => Ok(MessageType::Fill),
            0x05 => Ok(MessageType::WritePixel),
            0x06 => Ok(MessageType::Present),
            0x81 => Ok(MessageType::Geometry),
            0x82 => Ok(MessageType::Ack),
            0x83 => Ok(MessageType::Error),
            _ => Err(()),
        }
    }
}

// ── Common message header ─────────────────────────────────────────────────────

/// 16-byte header prepended to every message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Protocol version; always [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Identifies the payload type.
    pub message_type: MessageType,
    /// Length of the payload in bytes (not including this header).
    pub payload_length: u32,
    /// Request counter chosen by the client; replies echo it.
    pub sequence_number: u64,
}

// ── Payload structs ───────────────────────────────────────────────────────────

/// WRITE_PIXEL (0x05): single back-canvas pixel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWrite {
    /// Column; may be negative (rejected by the server as out of bounds).
    pub x: i32,
    /// Row; may be negative (rejected by the server as out of bounds).
    pub y: i32,
    pub color: Rgba,
}

/// Error codes carried by an ERROR reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// A PRESENT_FRAME frame size differs from the display size.
    GeometryMismatch = 0x01,
    /// A WRITE_PIXEL coordinate lies outside the display.
    OutOfBounds = 0x02,
    /// A frame declared a zero width or height.
    InvalidGeometry = 0x03,
    /// The display driver reported a failure.
    DisplayFault = 0x04,
    /// The request could not be decoded or is not a request.
    InvalidMessage = 0x05,
}

impl TryFrom<u8> for ErrorCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ErrorCode::GeometryMismatch),
            0x02 => Ok(ErrorCode::OutOfBounds),
            0x03 => Ok(ErrorCode::InvalidGeometry),
            0x04 => Ok(ErrorCode::DisplayFault),
            0x05 => Ok(ErrorCode::InvalidMessage),
            _ => Err(()),
        }
    }
}

/// ERROR (0x83): the request failed; the connection stays usable unless the
/// code is [`ErrorCode::InvalidMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: ErrorCode,
    /// Human-readable description (for logging only).
    pub description: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid Matrix-Over-IP messages, discriminated by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixMessage {
    QueryGeometry,
    PresentFrame(Framebuffer),
    Clear,
    Fill(Rgba),
    WritePixel(PixelWrite),
    Present,
    Geometry(Size),
    Ack,
    Error(ErrorReply),
}

impl MatrixMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            MatrixMessage::QueryGeometry => MessageType::QueryGeometry,
            MatrixMessage::PresentFrame(_) => MessageType::PresentFrame,
            MatrixMessage::Clear => MessageType::Clear,
            MatrixMessage::Fill(_) => MessageType::Fill,
            MatrixMessage::WritePixel(_) => MessageType::WritePixel,
            MatrixMessage::Present => MessageType::Present,
            MatrixMessage::Geometry(_) => MessageType::Geometry,
            MatrixMessage::Ack => MessageType::Ack,
            MatrixMessage::Error(_) => MessageType::Error,
        }
    }

    /// Builds an ERROR reply.
    pub fn error(code: ErrorCode, description: impl Into<String>) -> Self {
        MatrixMessage::Error(ErrorReply {
            code,
            description: description.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_try_from_accepts_every_known_code() {
        for ty in [
            MessageType::QueryGeometry,
            MessageType::PresentFrame,
            MessageType::Clear,
            MessageType::Fill,
            MessageType::WritePixel,
            MessageType::Present,
            MessageType::Geometry,
            MessageType::Ack,
            MessageType::Error,
        ] {
            assert_eq!(MessageType::try_from(ty as u8), Ok(ty));
        }
    }

    #[test]
    fn test_message_type_try_from_rejects_unknown_code() {
        assert_eq!(MessageType::try_from(0x00), Err(()));
        assert_eq!(MessageType::try_from(0x7F), Err(()));
    }

    #[test]
    fn test_requests_and_replies_are_partitioned() {
        assert!(MessageType::PresentFrame.is_request());
        assert!(MessageType::Present.is_request());
        assert!(!MessageType::Ack.is_request());
        assert!(!MessageType::Geometry.is_request());
    }

    #[test]
    fn test_error_helper_builds_reply() {
        let msg = MatrixMessage::error(ErrorCode::OutOfBounds, "nope");
        assert_eq!(msg.message_type(), MessageType::Error);
        assert_eq!(
            msg,
            MatrixMessage::Error(ErrorReply {
                code: ErrorCode::OutOfBounds,
                description: "nope".to_string()
            })
        );
    }
}
