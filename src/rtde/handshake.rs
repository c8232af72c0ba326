//! Connection handshake
//!
//! Establishes a session in a strict sequence, each step gated on the
//! controller's confirmation:
//!
//! 1. Query the controller software version and reject unsupported releases.
//! 2. Negotiate the wire protocol version (only version 1 is spoken).
//! 3. Exchange the output recipe; the ack assigns every field its type.
//! 4. Exchange the input recipe, when one is configured.
//! 5. Start streaming, which locks the fixed frame size.
//!
//! Commands go out through the paced send channel; confirmations come back
//! through the reply channel fed by the reader thread. Every wait is
//! bounded, so a mute controller fails the handshake instead of hanging it.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::protocol::{packet, PacketType, Schema, SchemaBuilder};
use crate::state::StateHandle;
use crate::types::ControllerVersion;

/// The only wire protocol revision this client speaks
pub const PROTOCOL_VERSION: u16 = 1;

/// A confirmation packet from the controller, parsed by command code
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlReply {
    ControllerVersion(ControllerVersion),
    /// Whether the requested protocol version was accepted
    ProtocolVersion(bool),
    /// Comma-joined type names for the output recipe
    OutputTypes(String),
    /// Comma-joined type names for the input recipe
    InputTypes(String),
    Started(bool),
    Paused(bool),
}

/// Parse a non-data, non-text frame into its confirmation
pub(crate) fn parse_control(packet_type: PacketType, payload: &[u8]) -> Result<ControlReply> {
    match packet_type {
        PacketType::GetControllerVersion => {
            if payload.len() < 16 {
                return Err(Error::InvalidPacket(format!(
                    "version report of {} bytes, expected 16",
                    payload.len()
                )));
            }
            let word = |i: usize| {
                u32::from_be_bytes([
                    payload[i * 4],
                    payload[i * 4 + 1],
                    payload[i * 4 + 2],
                    payload[i * 4 + 3],
                ])
            };
            Ok(ControlReply::ControllerVersion(ControllerVersion::new(
                word(0),
                word(1),
                word(2),
                word(3),
            )))
        }
        PacketType::RequestProtocolVersion => Ok(ControlReply::ProtocolVersion(ack_byte(payload)?)),
        PacketType::SetupOutputs => Ok(ControlReply::OutputTypes(
            String::from_utf8_lossy(payload).into_owned(),
        )),
        PacketType::SetupInputs => Ok(ControlReply::InputTypes(
            String::from_utf8_lossy(payload).into_owned(),
        )),
        PacketType::Start => Ok(ControlReply::Started(ack_byte(payload)?)),
        PacketType::Pause => Ok(ControlReply::Paused(ack_byte(payload)?)),
        PacketType::DataPackage | PacketType::TextMessage => Err(Error::InvalidPacket(format!(
            "{:?} is not a control reply",
            packet_type
        ))),
    }
}

fn ack_byte(payload: &[u8]) -> Result<bool> {
    match payload.first() {
        Some(&byte) => Ok(byte == 1),
        None => Err(Error::InvalidPacket("empty confirmation payload".into())),
    }
}

fn send_command(frames: &Sender<Vec<u8>>, packet_type: PacketType, payload: &[u8]) -> Result<()> {
    let frame = packet::encode(packet_type, payload)?;
    frames.send(frame).map_err(|_| Error::NotConnected)
}

/// Wait for the reply a step expects, skipping stale replies from earlier
/// steps that timed out and were answered late
fn await_reply<T>(
    replies: &Receiver<ControlReply>,
    timeout: Duration,
    what: &str,
    mut select: impl FnMut(ControlReply) -> std::result::Result<T, ControlReply>,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Negotiation(format!("no {} reply from controller", what)));
        }
        match replies.recv_timeout(deadline - now) {
            Ok(reply) => match select(reply) {
                Ok(value) => return Ok(value),
                Err(other) => {
                    log::debug!("Ignoring out-of-order {:?} while awaiting {}", other, what)
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::Negotiation(format!(
                    "no {} reply from controller",
                    what
                )));
            }
            Err(RecvTimeoutError::Disconnected) => return Err(Error::NotConnected),
        }
    }
}

/// Run handshake steps 1 through 4. Returns the negotiated recipes; the
/// stream is left connected but not yet started.
pub(crate) fn establish(
    frames: &Sender<Vec<u8>>,
    replies: &Receiver<ControlReply>,
    state: &StateHandle,
    output_fields: &[String],
    input_fields: &[String],
    timeout: Duration,
) -> Result<(Arc<Schema>, Option<Arc<Schema>>)> {
    // Step 1: controller version
    send_command(frames, PacketType::GetControllerVersion, &[])?;
    let version = await_reply(replies, timeout, "controller version", |reply| match reply {
        ControlReply::ControllerVersion(v) => Ok(v),
        other => Err(other),
    })?;
    log::info!("Controller software {}", version);
    state.set_controller_version(version);
    if !version.meets_minimum() {
        return Err(Error::Negotiation(format!(
            "controller software {} is older than the supported minimum 3.2.19171",
            version
        )));
    }

    // Step 2: protocol version
    send_command(
        frames,
        PacketType::RequestProtocolVersion,
        &PROTOCOL_VERSION.to_be_bytes(),
    )?;
    let accepted = await_reply(replies, timeout, "protocol version", |reply| match reply {
        ControlReply::ProtocolVersion(ok) => Ok(ok),
        other => Err(other),
    })?;
    if !accepted {
        return Err(Error::Negotiation(format!(
            "controller rejected protocol version {}",
            PROTOCOL_VERSION
        )));
    }

    // Step 3: output recipe
    let builder = SchemaBuilder::with_leading_timestamp(output_fields);
    log::debug!("Requesting output recipe: {:?}", builder.names());
    send_command(frames, PacketType::SetupOutputs, &builder.request_payload())?;
    let types = await_reply(replies, timeout, "output recipe", |reply| match reply {
        ControlReply::OutputTypes(types) => Ok(types),
        other => Err(other),
    })?;
    let output_schema = Arc::new(builder.finalize_with_types(&types)?);
    log::info!(
        "Output recipe negotiated: {} fields, {} byte payload",
        output_schema.len(),
        output_schema.packet_size()
    );

    // Step 4: input recipe, only when registers are configured
    let input_schema = if input_fields.is_empty() {
        None
    } else {
        let mut builder = SchemaBuilder::new();
        for name in input_fields {
            builder.push(name);
        }
        send_command(frames, PacketType::SetupInputs, &builder.request_payload())?;
        let types = await_reply(replies, timeout, "input recipe", |reply| match reply {
            ControlReply::InputTypes(types) => Ok(types),
            other => Err(other),
        })?;
        let schema = Arc::new(builder.finalize_with_types(&types)?);
        log::info!("Input recipe negotiated: {} fields", schema.len());
        Some(schema)
    };

    Ok((output_schema, input_schema))
}

/// Handshake step 5: ask the controller to start streaming data packages
pub(crate) fn start_streaming(
    frames: &Sender<Vec<u8>>,
    replies: &Receiver<ControlReply>,
    timeout: Duration,
) -> Result<()> {
    send_command(frames, PacketType::Start, &[])?;
    let started = await_reply(replies, timeout, "start", |reply| match reply {
        ControlReply::Started(ok) => Ok(ok),
        other => Err(other),
    })?;
    if started {
        Ok(())
    } else {
        Err(Error::Negotiation(
            "controller refused to start streaming".into(),
        ))
    }
}

/// Stop the data package stream, leaving the session connected
pub(crate) fn pause_streaming(
    frames: &Sender<Vec<u8>>,
    replies: &Receiver<ControlReply>,
    timeout: Duration,
) -> Result<()> {
    send_command(frames, PacketType::Pause, &[])?;
    let paused = await_reply(replies, timeout, "pause", |reply| match reply {
        ControlReply::Paused(ok) => Ok(ok),
        other => Err(other),
    })?;
    if paused {
        Ok(())
    } else {
        Err(Error::Negotiation(
            "controller refused to pause streaming".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_parse_version_report() {
        let mut payload = Vec::new();
        for word in [5u32, 12, 0, 1101848] {
            payload.extend_from_slice(&word.to_be_bytes());
        }
        let reply = parse_control(PacketType::GetControllerVersion, &payload).unwrap();
        assert_eq!(
            reply,
            ControlReply::ControllerVersion(ControllerVersion::new(5, 12, 0, 1101848))
        );
    }

    #[test]
    fn test_short_version_report_rejected() {
        assert!(parse_control(PacketType::GetControllerVersion, &[0u8; 15]).is_err());
    }

    #[test]
    fn test_parse_ack_bytes() {
        assert_eq!(
            parse_control(PacketType::RequestProtocolVersion, &[1]).unwrap(),
            ControlReply::ProtocolVersion(true)
        );
        assert_eq!(
            parse_control(PacketType::Start, &[0]).unwrap(),
            ControlReply::Started(false)
        );
        assert_eq!(
            parse_control(PacketType::Pause, &[1]).unwrap(),
            ControlReply::Paused(true)
        );
        assert!(parse_control(PacketType::Start, &[]).is_err());
    }

    #[test]
    fn test_parse_recipe_types_passthrough() {
        let reply = parse_control(PacketType::SetupOutputs, b"DOUBLE,VECTOR6D").unwrap();
        assert_eq!(reply, ControlReply::OutputTypes("DOUBLE,VECTOR6D".into()));
    }

    #[test]
    fn test_data_package_is_not_a_control_reply() {
        assert!(parse_control(PacketType::DataPackage, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_await_reply_skips_stale_replies() {
        let (tx, rx) = bounded(4);
        tx.send(ControlReply::ProtocolVersion(true)).unwrap();
        tx.send(ControlReply::Started(true)).unwrap();

        let started = await_reply(&rx, Duration::from_millis(200), "start", |reply| {
            match reply {
                ControlReply::Started(ok) => Ok(ok),
                other => Err(other),
            }
        })
        .unwrap();
        assert!(started);
    }

    #[test]
    fn test_await_reply_times_out() {
        let (_tx, rx) = bounded::<ControlReply>(1);
        let result = await_reply(&rx, Duration::from_millis(30), "start", |reply| {
            Ok::<_, ControlReply>(reply)
        });
        assert!(matches!(result, Err(Error::Negotiation(_))));
    }
}
