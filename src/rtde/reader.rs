//! Socket reader stage
//!
//! First stage of the receive pipeline. Reads whatever the socket delivers,
//! reassembles frames, and routes them: data packages to the decoder queue,
//! text messages to the log, everything else to the handshake reply channel.
//!
//! Framing runs in two modes. Before streaming starts, frame boundaries come
//! from each header's declared length. Once the session locks a frame size,
//! the reader consumes exactly that many bytes per frame and only validates
//! the header; a mismatch discards the block and drops back to header-driven
//! framing until the stream realigns.

use crossbeam_channel::{SendTimeoutError, Sender};
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{packet, FrameBuffer, PacketType, HEADER_SIZE};
use crate::session::SessionState;

use super::handshake::{parse_control, ControlReply};
use super::QUEUE_POLL;

/// Socket read chunk; frames are far smaller, so one read usually carries
/// several of them
const READ_CHUNK: usize = 4096;

/// Read timeout so the loop can notice shutdown between arrivals
pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) fn reader_loop(
    mut stream: TcpStream,
    session: Arc<SessionState>,
    raw_packets: Sender<Vec<u8>>,
    replies: Sender<ControlReply>,
) {
    log::info!("Reader thread started");

    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if session.is_shutdown() {
            break;
        }

        match stream.read(&mut chunk) {
            Ok(0) => {
                if !session.is_shutdown() {
                    session.fail(Error::Disconnected);
                }
                break;
            }
            Ok(count) => {
                frames.extend(&chunk[..count]);
                if let Err(e) = drain_frames(&mut frames, &session, &raw_packets, &replies) {
                    session.fail(e);
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                if !session.is_shutdown() {
                    session.fail(Error::Io(e));
                }
                break;
            }
        }
    }

    log::info!("Reader thread stopped");
}

/// Pull every complete frame out of the buffer and route it.
///
/// Framing errors are handled here by discarding and resynchronizing; only
/// errors that poison the whole session propagate out.
fn drain_frames(
    frames: &mut FrameBuffer,
    session: &SessionState,
    raw_packets: &Sender<Vec<u8>>,
    replies: &Sender<ControlReply>,
) -> Result<()> {
    loop {
        if let Some(size) = session.frame_size() {
            if frames.len() < size {
                return Ok(());
            }
            let block = frames.take(size);
            if !fixed_block_valid(&block, size) {
                session.stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
                session.release_frame_size();
                log::warn!(
                    "Fixed-size framing lost sync, discarding {} bytes and resynchronizing",
                    size
                );
                continue;
            }
            forward_data_package(block[HEADER_SIZE..].to_vec(), session, raw_packets);
        } else {
            match frames.next_frame() {
                Ok(Some(frame)) => route_frame(frame, session, raw_packets, replies)?,
                Ok(None) => return Ok(()),
                Err(e) => {
                    session.stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
                    log::warn!("{}, discarding {} buffered bytes", e, frames.len());
                    frames.clear();
                    return Ok(());
                }
            }
        }
    }
}

/// A fixed-size block must still carry a coherent data package header
fn fixed_block_valid(block: &[u8], size: usize) -> bool {
    match packet::decode_header(block) {
        Ok((packet_type, declared)) => {
            packet_type == PacketType::DataPackage as u8 && declared as usize == size
        }
        Err(_) => false,
    }
}

fn route_frame(
    frame: crate::protocol::Frame,
    session: &SessionState,
    raw_packets: &Sender<Vec<u8>>,
    replies: &Sender<ControlReply>,
) -> Result<()> {
    let packet_type = match PacketType::from_byte(frame.packet_type) {
        Some(packet_type) => packet_type,
        None => {
            session.stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "Discarding frame with unknown command code {}",
                frame.packet_type
            );
            return Ok(());
        }
    };

    match packet_type {
        PacketType::DataPackage => {
            forward_data_package(frame.payload, session, raw_packets);
        }
        PacketType::TextMessage => log_text_message(&frame.payload),
        _ => {
            let reply = parse_control(packet_type, &frame.payload)?;
            // The waiter may have timed out and gone; that is its problem,
            // not the stream's.
            if replies.send(reply).is_err() {
                log::debug!("No handshake waiter for {:?} reply", packet_type);
            }
        }
    }
    Ok(())
}

/// Hand a data package payload to the decoder, yielding to shutdown if the
/// queue stays full
fn forward_data_package(payload: Vec<u8>, session: &SessionState, raw_packets: &Sender<Vec<u8>>) {
    let mut pending = payload;
    loop {
        match raw_packets.send_timeout(pending, QUEUE_POLL) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(returned)) => {
                if session.is_shutdown() {
                    return;
                }
                pending = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return,
        }
    }
}

/// Controller-originated free-text diagnostics, mapped onto our log levels
fn log_text_message(payload: &[u8]) {
    let Some((level, text)) = parse_text_message(payload) else {
        log::warn!("Discarding empty text message frame");
        return;
    };
    match level {
        0 | 1 => log::error!("Controller: {}", text),
        2 => log::warn!("Controller: {}", text),
        3 => log::info!("Controller: {}", text),
        other => log::debug!("Controller (level {}): {}", other, text),
    }
}

fn parse_text_message(payload: &[u8]) -> Option<(u8, String)> {
    let (&level, text) = payload.split_first()?;
    Some((level, String::from_utf8_lossy(text).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::encode;

    #[test]
    fn test_fixed_block_validation() {
        let frame = encode(PacketType::DataPackage, &[0u8; 60]).unwrap();
        assert!(fixed_block_valid(&frame, frame.len()));

        // Wrong command code
        let control = encode(PacketType::Start, &[0u8; 60]).unwrap();
        assert!(!fixed_block_valid(&control, control.len()));

        // Declared length disagrees with the locked size
        assert!(!fixed_block_valid(&frame, frame.len() + 1));
    }

    #[test]
    fn test_parse_text_message() {
        let mut payload = vec![2u8];
        payload.extend_from_slice(b"overheating");
        let (level, text) = parse_text_message(&payload).unwrap();
        assert_eq!(level, 2);
        assert_eq!(text, "overheating");

        assert!(parse_text_message(&[]).is_none());
    }
}
