//! Integration tests for the matrix-core protocol codec.
//!
//! These go through the public API only and model the byte streams a server
//! actually sees: requests numbered by a [`SequenceCounter`], several messages
//! back to back, and frames split across reads.

use matrix_core::{
    decode_message, encode_message,
    protocol::{
        decode_header,
        messages::{ErrorCode, MatrixMessage, MessageType, PixelWrite, HEADER_SIZE},
        sequence::SequenceCounter,
    },
    Framebuffer, ProtocolError, Rgba, Size,
};

fn red_frame(width: u32, height: u32) -> Framebuffer {
    let mut fb = Framebuffer::new(width, height).expect("valid size");
    fb.fill(Rgba::RED);
    fb
}

#[test]
fn test_request_stream_decodes_in_order_with_sequence_numbers() {
    // Arrange – a typical client session: query, draw, present
    let counter = SequenceCounter::new();
    let requests = vec![
        MatrixMessage::QueryGeometry,
        MatrixMessage::Clear,
        MatrixMessage::WritePixel(PixelWrite {
            x: 3,
            y: 4,
            color: Rgba::GREEN,
        }),
        MatrixMessage::Present,
        MatrixMessage::PresentFrame(red_frame(32, 32)),
    ];
    let mut stream = Vec::new();
    let mut sent_sequences = Vec::new();
    for req in &requests {
        let seq = counter.next();
        sent_sequences.push(seq);
        stream.extend_from_slice(&encode_message(req, seq).expect("encode"));
    }

    // Act
    let mut offset = 0;
    let mut decoded = Vec::new();
    while offset < stream.len() {
        let (msg, header, consumed) = decode_message(&stream[offset..]).expect("decode");
        assert!(header.message_type.is_request());
        decoded.push((msg, header.sequence_number));
        offset += consumed;
    }

    // Assert
    let (messages, sequences): (Vec<_>, Vec<_>) = decoded.into_iter().unzip();
    assert_eq!(messages, requests);
    assert_eq!(sequences, sent_sequences);
}

#[test]
fn test_frame_split_across_reads_waits_for_remaining_bytes() {
    // Arrange
    let bytes = encode_message(&MatrixMessage::PresentFrame(red_frame(16, 16)), 9).unwrap();
    let mut buffered = Vec::new();

    // Act – feed the encoded frame in 100-byte chunks
    let mut result = None;
    for chunk in bytes.chunks(100) {
        buffered.extend_from_slice(chunk);
        match decode_message(&buffered) {
            Ok(done) => {
                result = Some(done);
                break;
            }
            Err(ProtocolError::InsufficientData { .. }) => continue,
            Err(other) => panic!("unexpected decode error: {other}"),
        }
    }

    // Assert
    let (msg, header, consumed) = result.expect("frame should decode once complete");
    assert_eq!(consumed, bytes.len());
    assert_eq!(header.sequence_number, 9);
    assert_eq!(msg, MatrixMessage::PresentFrame(red_frame(16, 16)));
}

#[test]
fn test_header_alone_identifies_message_before_payload_arrives() {
    let bytes = encode_message(&MatrixMessage::PresentFrame(red_frame(8, 8)), 3).unwrap();
    let header = decode_header(&bytes[..HEADER_SIZE]).expect("header");
    assert_eq!(header.message_type, MessageType::PresentFrame);
    assert_eq!(header.payload_length as usize, 8 + 8 * 8 * 4);
}

#[test]
fn test_replies_carry_request_sequence_number() {
    let request_seq = 41;
    let replies = [
        MatrixMessage::Geometry(Size::new(32, 32)),
        MatrixMessage::Ack,
        MatrixMessage::error(ErrorCode::OutOfBounds, "pixel (40, 0) is outside the 32x32 canvas"),
    ];
    for reply in replies {
        let bytes = encode_message(&reply, request_seq).unwrap();
        let (decoded, header, _) = decode_message(&bytes).unwrap();
        assert!(!header.message_type.is_request());
        assert_eq!(header.sequence_number, request_seq);
        assert_eq!(decoded, reply);
    }
}

#[test]
fn test_non_trivial_frame_survives_transport() {
    // Arrange – gradient so every pixel is distinct
    let mut fb = Framebuffer::new(64, 32).unwrap();
    for y in 0..32 {
        for x in 0..64 {
            fb.set(x, y, Rgba::new(x as u8 * 4, y as u8 * 8, 0x10, 0xFF));
        }
    }
    let original = MatrixMessage::PresentFrame(fb.clone());

    // Act
    let bytes = encode_message(&original, 1).unwrap();
    let (decoded, _, _) = decode_message(&bytes).unwrap();

    // Assert
    match decoded {
        MatrixMessage::PresentFrame(received) => {
            assert_eq!(received.size(), Size::new(64, 32));
            assert_eq!(received.get(63, 31), fb.get(63, 31));
            assert_eq!(received, fb);
        }
        other => panic!("expected PresentFrame, got {other:?}"),
    }
}
