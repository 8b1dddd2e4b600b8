//! Binary codec for encoding and decoding Matrix-Over-IP protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][payload:N]
//! ```
//! Total header size: 16 bytes. All multi-byte integers are big-endian.
//!
//! Payloads:
//! ```text
//! PRESENT_FRAME  [width:4][height:4][r g b a]{width*height}
//! FILL           [r g b a]
//! WRITE_PIXEL    [x:4 signed][y:4 signed][r g b a]
//! GEOMETRY       [width:4][height:4]
//! ERROR          [code:1][desc_len:2][desc:UTF-8]
//! ```

use crate::domain::color::Rgba;
use crate::domain::framebuffer::Framebuffer;
use crate::domain::geometry::Size;
use crate::protocol::messages::{
    ErrorCode, ErrorReply, MatrixMessage, MessageHeader, MessageType, PixelWrite, HEADER_SIZE,
    MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
use thiserror::Error;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice does not yet hold a complete message.  Stream readers
    /// treat this as "read more bytes".
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The declared payload exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("payload of {declared} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { declared: usize, max: usize },

    /// A PRESENT_FRAME declared a zero width or height.
    #[error("frame declares invalid canvas size {0}")]
    InvalidFrameSize(Size),
}

impl ProtocolError {
    /// `true` when the header was valid and the whole payload was present,
    /// so a stream reader can skip this one message and keep going.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedPayload(_) | ProtocolError::InvalidFrameSize(_)
        )
    }

    /// Wire code for reporting this error back to the sender.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::InvalidFrameSize(_) => ErrorCode::InvalidGeometry,
            _ => ErrorCode::InvalidMessage,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`MatrixMessage`] into a byte vector including the 16-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload would exceed
/// [`MAX_PAYLOAD_SIZE`].
///
/// # Examples
///
/// ```rust
/// use matrix_core::protocol::{encode_message, decode_message};
/// use matrix_core::protocol::messages::MatrixMessage;
///
/// let msg = MatrixMessage::QueryGeometry;
/// let bytes = encode_message(&msg, 7).unwrap();
/// let (decoded, header, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(header.sequence_number, 7);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &MatrixMessage, sequence_number: u64) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg);
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            declared: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) + seq (8)
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Parses and validates the fixed header at the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than
/// [`HEADER_SIZE`] bytes are available, or a header validation error.
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let message_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_length = read_u32(bytes, 4)?;
    if payload_length as usize > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            declared: payload_length as usize,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    Ok(MessageHeader {
        version,
        message_type,
        payload_length,
        sequence_number: read_u64(bytes, 8)?,
    })
}

/// Decodes one [`MatrixMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message, its header, and the total number of bytes
/// consumed (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] while the buffer holds only
/// part of a message, or another [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(MatrixMessage, MessageHeader, usize), ProtocolError> {
    let header = decode_header(bytes)?;
    let payload_len = header.payload_length as usize;

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::InsufficientData {
            needed: total_needed,
            available: bytes.len(),
        });
    }

    let payload = &bytes[HEADER_SIZE..total_needed];
    // The full payload is here, so running short inside it is malformed
    // rather than "read more".
    let msg = decode_payload(header.message_type, payload).map_err(|e| match e {
        ProtocolError::InsufficientData { needed, available } => ProtocolError::MalformedPayload(format!(
            "{:?} payload: need {needed} bytes, got {available}",
            header.message_type
        )),
        other => other,
    })?;
    Ok((msg, header, total_needed))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &MatrixMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        MatrixMessage::QueryGeometry
        | MatrixMessage::Clear
        | MatrixMessage::Present
        | MatrixMessage::Ack => {} // empty payload
        MatrixMessage::PresentFrame(frame) => encode_frame(&mut buf, frame),
        MatrixMessage::Fill(color) => buf.extend_from_slice(&color.to_bytes()),
        MatrixMessage::WritePixel(p) => encode_pixel_write(&mut buf, p),
        MatrixMessage::Geometry(size) => encode_size(&mut buf, *size),
        MatrixMessage::Error(e) => encode_error(&mut buf, e),
    }
    buf
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<MatrixMessage, ProtocolError> {
    match msg_type {
        MessageType::QueryGeometry => Ok(MatrixMessage::QueryGeometry),
        MessageType::PresentFrame => decode_frame(payload).map(MatrixMessage::PresentFrame),
        MessageType::Clear => Ok(MatrixMessage::Clear),
        MessageType::Fill => read_color(payload, 0).map(MatrixMessage::Fill),
        MessageType::WritePixel => decode_pixel_write(payload).map(MatrixMessage::WritePixel),
        MessageType::Present => Ok(MatrixMessage::Present),
        MessageType::Geometry => decode_size(payload).map(MatrixMessage::Geometry),
        MessageType::Ack => Ok(MatrixMessage::Ack),
        MessageType::Error => decode_error(payload).map(MatrixMessage::Error),
    }
}

// ── Per-message encode helpers ────────────────────────────────────────────────

fn encode_frame(buf: &mut Vec<u8>, frame: &Framebuffer) {
    buf.reserve(8 + frame.pixels().len() * Rgba::ENCODED_LEN);
    encode_size(buf, frame.size());
    for pixel in frame.pixels() {
        buf.extend_from_slice(&pixel.to_bytes());
    }
}

fn encode_size(buf: &mut Vec<u8>, size: Size) {
    buf.extend_from_slice(&size.width.to_be_bytes());
    buf.extend_from_slice(&size.height.to_be_bytes());
}

fn encode_pixel_write(buf: &mut Vec<u8>, p: &PixelWrite) {
    buf.extend_from_slice(&p.x.to_be_bytes());
    buf.extend_from_slice(&p.y.to_be_bytes());
    buf.extend_from_slice(&p.color.to_bytes());
}

fn encode_error(buf: &mut Vec<u8>, e: &ErrorReply) {
    buf.push(e.code as u8);
    write_length_prefixed_string(buf, &e.description);
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_frame(p: &[u8]) -> Result<Framebuffer, ProtocolError> {
    // 4 (width) + 4 (height) + width*height*4
    require_len(p, 8, "PresentFrame")?;
    let size = decode_size(p)?;
    if size.width == 0 || size.height == 0 {
        return Err(ProtocolError::InvalidFrameSize(size));
    }
    let pixel_bytes = size
        .area()
        .and_then(|area| area.checked_mul(Rgba::ENCODED_LEN))
        .ok_or_else(|| ProtocolError::MalformedPayload(format!("frame {size} is too large")))?;
    if p.len() - 8 != pixel_bytes {
        return Err(ProtocolError::MalformedPayload(format!(
            "PresentFrame: {size} frame needs {pixel_bytes} pixel bytes, got {}",
            p.len() - 8
        )));
    }

    let pixels = p[8..]
        .chunks_exact(Rgba::ENCODED_LEN)
        .map(|c| Rgba::new(c[0], c[1], c[2], c[3]))
        .collect();
    Framebuffer::from_pixels(size.width, size.height, pixels)
        .map_err(|e| ProtocolError::MalformedPayload(format!("PresentFrame: {e}")))
}

fn decode_size(p: &[u8]) -> Result<Size, ProtocolError> {
    require_len(p, 8, "Size")?;
    Ok(Size::new(read_u32(p, 0)?, read_u32(p, 4)?))
}

fn decode_pixel_write(p: &[u8]) -> Result<PixelWrite, ProtocolError> {
    // 4 (x) + 4 (y) + 4 (rgba) = 12
    require_len(p, 12, "WritePixel")?;
    let x = read_u32(p, 0)? as i32;
    let y = read_u32(p, 4)? as i32;
    let color = read_color(p, 8)?;
    Ok(PixelWrite { x, y, color })
}

fn decode_error(p: &[u8]) -> Result<ErrorReply, ProtocolError> {
    require_len(p, 3, "Error")?;
    let code = ErrorCode::try_from(p[0])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown error code: {}", p[0])))?;
    let (description, _) = read_length_prefixed_string(p, 1)?;
    Ok(ErrorReply { code, description })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + 4,
            available: buf.len(),
        })?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    let bytes = buf
        .get(offset..offset + 8)
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        })?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(raw))
}

fn read_color(buf: &[u8], offset: usize) -> Result<Rgba, ProtocolError> {
    let c = buf.get(offset..offset + Rgba::ENCODED_LEN).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "need {} bytes for colour at offset {offset}, got {}",
            Rgba::ENCODED_LEN,
            buf.len().saturating_sub(offset)
        ))
    })?;
    Ok(Rgba::new(c[0], c[1], c[2], c[3]))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
///
/// Strings longer than `u16::MAX` bytes are cut at the last character
/// boundary that fits.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let mut len = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(&s.as_bytes()[..len]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
