//! Wire packet codec
//!
//! Every message on the real-time channel is a length-prefixed frame:
//!
//! ```text
//! ┌──────────────────┬───────────────┬──────────────────┐
//! │ Length (2 bytes) │ Type (1 byte) │ Payload          │
//! │ Big-endian u16   │ Command code  │ (length-3 bytes) │
//! └──────────────────┴───────────────┴──────────────────┘
//! ```
//!
//! The length counts the header itself, so `length == payload.len() + 3`.
//! Frames may arrive split or coalesced on the TCP stream; [`FrameBuffer`]
//! reassembles them.

use crate::error::{Error, Result};

/// Frame header size in bytes (u16 length + u8 command type)
pub const HEADER_SIZE: usize = 3;

/// Largest payload a frame can carry (length field is u16 and counts the header)
pub const MAX_PAYLOAD: usize = u16::MAX as usize - HEADER_SIZE;

/// Command codes used on the real-time channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    RequestProtocolVersion = 86,
    GetControllerVersion = 118,
    TextMessage = 77,
    DataPackage = 85,
    SetupOutputs = 79,
    SetupInputs = 73,
    Start = 83,
    Pause = 80,
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            86 => Some(PacketType::RequestProtocolVersion),
            118 => Some(PacketType::GetControllerVersion),
            77 => Some(PacketType::TextMessage),
            85 => Some(PacketType::DataPackage),
            79 => Some(PacketType::SetupOutputs),
            73 => Some(PacketType::SetupInputs),
            83 => Some(PacketType::Start),
            80 => Some(PacketType::Pause),
            _ => None,
        }
    }
}

/// Build a complete frame: 3-byte header followed by the payload.
pub fn encode(packet_type: PacketType, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::InvalidPacket(format!(
            "payload of {} bytes exceeds frame limit",
            payload.len()
        )));
    }
    let size = (payload.len() + HEADER_SIZE) as u16;
    let mut frame = Vec::with_capacity(size as usize);
    frame.extend_from_slice(&size.to_be_bytes());
    frame.push(packet_type as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read the 3-byte header, returning (command type, declared frame length).
///
/// The length field covers header plus payload and is normalized from wire
/// byte order here.
pub fn decode_header(bytes: &[u8]) -> Result<(u8, u16)> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::InvalidPacket(format!(
            "{} bytes is shorter than a frame header",
            bytes.len()
        )));
    }
    let size = u16::from_be_bytes([bytes[0], bytes[1]]);
    Ok((bytes[2], size))
}

/// One reassembled frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: u8,
    pub payload: Vec<u8>,
}

/// Reassembles frames from an unstructured byte stream.
///
/// TCP delivers the peer's frames in arbitrary chunks. Bytes are appended
/// with [`extend`](FrameBuffer::extend) as they arrive and complete frames
/// are drained with [`next_frame`](FrameBuffer::next_frame).
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard all buffered bytes. Used to resynchronize after a framing error.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// Returns `Err(Framing)` when the declared length is smaller than the
    /// header itself, which means the stream is out of sync.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let (packet_type, size) = decode_header(&self.buf)?;
        let size = size as usize;
        if size < HEADER_SIZE {
            return Err(Error::Framing(format!(
                "declared frame length {} is shorter than the header",
                size
            )));
        }
        if self.buf.len() < size {
            return Ok(None);
        }
        let payload = self.buf[HEADER_SIZE..size].to_vec();
        self.buf.drain(..size);
        Ok(Some(Frame {
            packet_type,
            payload,
        }))
    }

    /// Remove and return exactly `count` buffered bytes.
    ///
    /// Caller must check `len()` first; used by the fixed-size framing path
    /// where the frame boundary is known up front.
    pub fn take(&mut self, count: usize) -> Vec<u8> {
        self.buf.drain(..count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let frame = encode(PacketType::Start, &[]).unwrap();
        assert_eq!(frame, vec![0x00, 0x03, 83]);

        let frame = encode(PacketType::RequestProtocolVersion, &[0x00, 0x01]).unwrap();
        assert_eq!(frame, vec![0x00, 0x05, 86, 0x00, 0x01]);
    }

    #[test]
    fn test_encode_then_decode_header() {
        let payload = [1u8, 2, 3, 4, 5, 6, 7];
        let frame = encode(PacketType::DataPackage, &payload).unwrap();
        let (packet_type, size) = decode_header(&frame).unwrap();
        assert_eq!(packet_type, PacketType::DataPackage as u8);
        assert_eq!(size as usize, payload.len() + HEADER_SIZE);
    }

    #[test]
    fn test_decode_header_too_short() {
        assert!(decode_header(&[0x00]).is_err());
    }

    #[test]
    fn test_packet_type_round_trip() {
        for code in [86u8, 118, 77, 85, 79, 73, 83, 80] {
            let packet_type = PacketType::from_byte(code).unwrap();
            assert_eq!(packet_type as u8, code);
        }
        assert_eq!(PacketType::from_byte(0), None);
    }

    #[test]
    fn test_frame_buffer_coalesced_frames() {
        let mut frames = FrameBuffer::new();
        let a = encode(PacketType::Start, &[1]).unwrap();
        let b = encode(PacketType::Pause, &[2, 3]).unwrap();
        let mut stream = a.clone();
        stream.extend_from_slice(&b);
        frames.extend(&stream);

        let first = frames.next_frame().unwrap().unwrap();
        assert_eq!(first.packet_type, 83);
        assert_eq!(first.payload, vec![1]);

        let second = frames.next_frame().unwrap().unwrap();
        assert_eq!(second.packet_type, 80);
        assert_eq!(second.payload, vec![2, 3]);

        assert!(frames.next_frame().unwrap().is_none());
        assert!(frames.is_empty());
    }

    #[test]
    fn test_frame_buffer_split_frame() {
        let mut frames = FrameBuffer::new();
        let frame = encode(PacketType::DataPackage, &[9, 8, 7, 6]).unwrap();

        frames.extend(&frame[..2]);
        assert!(frames.next_frame().unwrap().is_none());

        frames.extend(&frame[2..5]);
        assert!(frames.next_frame().unwrap().is_none());

        frames.extend(&frame[5..]);
        let out = frames.next_frame().unwrap().unwrap();
        assert_eq!(out.payload, vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_frame_buffer_bad_length_is_framing_error() {
        let mut frames = FrameBuffer::new();
        frames.extend(&[0x00, 0x01, 85]);
        assert!(frames.next_frame().is_err());
        frames.clear();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_take_exact_bytes() {
        let mut frames = FrameBuffer::new();
        frames.extend(&[1, 2, 3, 4, 5]);
        assert_eq!(frames.take(3), vec![1, 2, 3]);
        assert_eq!(frames.len(), 2);
    }
}
