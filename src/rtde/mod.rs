//! Real-time interface connector
//!
//! Owns one TCP connection to the controller's real-time port and the four
//! worker threads that service it:
//!
//! ```text
//!                 ┌────────────┐   raw payloads   ┌─────────────┐
//!  socket ──────▶ │ rtde-reader│ ───────────────▶ │ rtde-decoder│
//!                 └─────┬──────┘                  └──────┬──────┘
//!                       │ control replies                │ updates
//!                       ▼                                ▼
//!                 handshake waiter                ┌─────────────┐
//!                 (caller thread)                 │ rtde-merger │──▶ RobotState
//!                                                 └─────────────┘
//!                 ┌────────────┐
//!  socket ◀────── │ rtde-sender│ ◀── frame queue ◀── commands / input writes
//!                 └────────────┘
//! ```
//!
//! All hand-offs are bounded channels, so a stalled stage applies
//! backpressure instead of growing without limit. Every loop polls the
//! shared shutdown flag; the first fatal error anywhere flips it and the
//! whole set winds down together.

pub mod decoder;
pub mod handshake;
pub mod merger;
pub mod reader;
pub mod sender;

pub use decoder::BindingTable;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{packet, FieldDescriptor, FieldType, FieldValue, PacketType, Schema, HEADER_SIZE};
use crate::session::{SessionState, StatsSnapshot};
use crate::state::{fields, RobotState, StateHandle};
use crate::types::{ConnectionState, DigitalBits};

use handshake::ControlReply;
use merger::{CadenceMonitor, MergeTiming};

/// Poll granularity for every blocking queue wait; bounds how late a
/// worker notices shutdown
pub(crate) const QUEUE_POLL: Duration = Duration::from_millis(100);

/// Outbound frame queue depth
const SEND_QUEUE_DEPTH: usize = 32;
/// Handshake confirmation queue depth
const REPLY_QUEUE_DEPTH: usize = 16;
/// Depth of the two pipeline hand-off queues
const PACKET_QUEUE_DEPTH: usize = 64;

/// Recipe id byte leading every write-direction data package
const INPUT_RECIPE_ID: u8 = 1;

/// Cached values for the write-direction registers.
///
/// The controller expects every input package to carry the full recipe, so
/// the connector keeps the last written value of each register and re-sends
/// them all whenever one changes. Mask fields always select every bit.
#[derive(Debug, Clone)]
struct InputRegisters {
    ints: [i32; 24],
    doubles: [f64; 24],
    standard_outputs: DigitalBits,
    configurable_outputs: DigitalBits,
}

impl Default for InputRegisters {
    fn default() -> Self {
        Self {
            ints: [0; 24],
            doubles: [0.0; 24],
            standard_outputs: DigitalBits::default(),
            configurable_outputs: DigitalBits::default(),
        }
    }
}

impl InputRegisters {
    /// Current value of one recipe field, zero-filled for names the
    /// connector does not track
    fn value_for(&self, field: &FieldDescriptor) -> FieldValue {
        if let Some(index) = fields::parse_register_index(&field.name, "input_int_register_") {
            return FieldValue::Int32(self.ints[index as usize]);
        }
        if let Some(index) = fields::parse_register_index(&field.name, "input_double_register_") {
            return FieldValue::Double(self.doubles[index as usize]);
        }
        match field.name.as_str() {
            "standard_digital_output_mask" | "configurable_digital_output_mask" => {
                FieldValue::UInt8(0xFF)
            }
            "standard_digital_output" => FieldValue::UInt8(self.standard_outputs.0),
            "configurable_digital_output" => FieldValue::UInt8(self.configurable_outputs.0),
            _ => zero_value(field.field_type),
        }
    }

    fn values_for(&self, schema: &Schema) -> Vec<FieldValue> {
        schema.iter().map(|field| self.value_for(field)).collect()
    }
}

fn zero_value(field_type: FieldType) -> FieldValue {
    match field_type {
        FieldType::Double => FieldValue::Double(0.0),
        FieldType::UInt64 => FieldValue::UInt64(0),
        FieldType::UInt32 => FieldValue::UInt32(0),
        FieldType::Int32 => FieldValue::Int32(0),
        FieldType::UInt8 => FieldValue::UInt8(0),
        FieldType::Vector6D => FieldValue::Vector6D(Default::default()),
        FieldType::Vector6Int32 => FieldValue::Vector6Int32([0; 6]),
        FieldType::Vector3D => FieldValue::Vector3D(Default::default()),
    }
}

/// Client for the controller's real-time telemetry/control channel
#[derive(Debug)]
pub struct RtdeClient {
    stream: TcpStream,
    session: Arc<SessionState>,
    state: Arc<StateHandle>,
    frames: Sender<Vec<u8>>,
    replies: Receiver<ControlReply>,
    /// Moved into the decoder thread when streaming starts
    raw_packets: Option<Receiver<Vec<u8>>>,
    output_schema: Arc<Schema>,
    input_schema: Option<Arc<Schema>>,
    inputs: InputRegisters,
    reply_timeout: Duration,
    reader: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
    decoder: Option<JoinHandle<()>>,
    merger: Option<JoinHandle<()>>,
}

impl RtdeClient {
    /// Connect, handshake, and start streaming.
    ///
    /// On return the pipeline threads are running and the state model is
    /// being refreshed at the controller's cadence.
    pub fn connect(config: &Config) -> Result<Self> {
        let mut client = Self::open(config)?;
        if let Err(e) = client.start(config) {
            client.shutdown();
            return Err(e);
        }
        Ok(client)
    }

    /// Open the socket, spawn the send/receive threads, and run the
    /// handshake up to (not including) stream start.
    fn open(config: &Config) -> Result<Self> {
        let address = config.robot.rtde_addr()?;
        log::info!("Connecting to RTDE interface at {}", address);

        let stream = TcpStream::connect_timeout(&address, config.timing.connect_timeout())?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(reader::READ_TIMEOUT))?;

        let session = Arc::new(SessionState::new());
        let state = Arc::new(StateHandle::new());
        session.set_connection(ConnectionState::Connected);

        let (frames_tx, frames_rx) = bounded(SEND_QUEUE_DEPTH);
        let (replies_tx, replies_rx) = bounded(REPLY_QUEUE_DEPTH);
        let (raw_tx, raw_rx) = bounded(PACKET_QUEUE_DEPTH);

        let sender = thread::Builder::new().name("rtde-sender".into()).spawn({
            let stream = stream.try_clone()?;
            let session = Arc::clone(&session);
            let spacing = config.timing.send_interval();
            move || sender::sender_loop(stream, frames_rx, session, spacing)
        })?;

        let reader = thread::Builder::new().name("rtde-reader".into()).spawn({
            let stream = stream.try_clone()?;
            let session = Arc::clone(&session);
            move || reader::reader_loop(stream, session, raw_tx, replies_tx)
        })?;

        let reply_timeout = config.timing.reply_timeout();
        let handshake = handshake::establish(
            &frames_tx,
            &replies_rx,
            &state,
            &config.rtde.output_fields,
            &config.rtde.input_fields,
            reply_timeout,
        );
        let (output_schema, input_schema) = match handshake {
            Ok(schemas) => schemas,
            Err(e) => {
                session.request_shutdown();
                let _ = stream.shutdown(Shutdown::Both);
                let _ = sender.join();
                let _ = reader.join();
                return Err(e);
            }
        };

        Ok(Self {
            stream,
            session,
            state,
            frames: frames_tx,
            replies: replies_rx,
            raw_packets: Some(raw_rx),
            output_schema,
            input_schema,
            inputs: InputRegisters::default(),
            reply_timeout,
            reader: Some(reader),
            sender: Some(sender),
            decoder: None,
            merger: None,
        })
    }

    /// Bind the recipe, spawn the decode/merge stages, and start streaming
    fn start(&mut self, config: &Config) -> Result<()> {
        let bindings = BindingTable::resolve(
            Arc::clone(&self.output_schema),
            config.rtde.ignore_unknown_fields,
        )?;

        let raw_rx = self.raw_packets.take().ok_or(Error::NotConnected)?;
        let (updates_tx, updates_rx) = bounded(PACKET_QUEUE_DEPTH);

        self.decoder = Some(thread::Builder::new().name("rtde-decoder".into()).spawn({
            let session = Arc::clone(&self.session);
            move || decoder::decoder_loop(raw_rx, updates_tx, bindings, session)
        })?);

        self.merger = Some(thread::Builder::new().name("rtde-merger".into()).spawn({
            let state = Arc::clone(&self.state);
            let session = Arc::clone(&self.session);
            let cadence = CadenceMonitor::new(
                config.timing.control_period_s,
                config.timing.dropped_packet_factor,
            );
            let timing = MergeTiming {
                min_interval: config.timing.merge_min_interval(),
                max_interval: config.timing.merge_max_interval(),
            };
            move || merger::merger_loop(updates_rx, state, session, cadence, timing)
        })?);

        handshake::start_streaming(&self.frames, &self.replies, self.reply_timeout)?;
        self.session
            .lock_frame_size(HEADER_SIZE + self.output_schema.packet_size());
        self.session.set_connection(ConnectionState::Started);
        log::info!("Streaming started");
        Ok(())
    }

    /// Suspend the data package stream; handshake commands still work.
    ///
    /// Framing is released before the command goes out because the pause
    /// confirmation is an ordinary variable-size frame.
    pub fn pause(&mut self) -> Result<()> {
        if self.session.connection() != ConnectionState::Started {
            return Err(Error::InvalidParameter("streaming is not active".into()));
        }
        self.session.release_frame_size();
        handshake::pause_streaming(&self.frames, &self.replies, self.reply_timeout)?;
        self.session.set_connection(ConnectionState::Paused);
        log::info!("Streaming paused");
        Ok(())
    }

    /// Resume a paused stream
    pub fn resume(&mut self) -> Result<()> {
        if self.session.connection() != ConnectionState::Paused {
            return Err(Error::InvalidParameter("streaming is not paused".into()));
        }
        handshake::start_streaming(&self.frames, &self.replies, self.reply_timeout)?;
        self.session
            .lock_frame_size(HEADER_SIZE + self.output_schema.packet_size());
        self.session.set_connection(ConnectionState::Started);
        log::info!("Streaming resumed");
        Ok(())
    }

    /// Write one integer input register on the controller
    pub fn set_input_int_register(&mut self, index: u8, value: i32) -> Result<()> {
        if index >= fields::REGISTER_BANK_SIZE {
            return Err(Error::InvalidParameter(format!(
                "input register index {} out of range",
                index
            )));
        }
        self.inputs.ints[index as usize] = value;
        self.send_inputs()
    }

    /// Write one double input register on the controller
    pub fn set_input_double_register(&mut self, index: u8, value: f64) -> Result<()> {
        if index >= fields::REGISTER_BANK_SIZE {
            return Err(Error::InvalidParameter(format!(
                "input register index {} out of range",
                index
            )));
        }
        self.inputs.doubles[index as usize] = value;
        self.send_inputs()
    }

    /// Drive one standard digital output line
    pub fn set_standard_digital_output(&mut self, line: u8, on: bool) -> Result<()> {
        if line >= 8 {
            return Err(Error::InvalidParameter(format!(
                "digital output line {} out of range",
                line
            )));
        }
        self.inputs.standard_outputs.set_bit(line, on);
        self.send_inputs()
    }

    /// Drive one configurable digital output line
    pub fn set_configurable_digital_output(&mut self, line: u8, on: bool) -> Result<()> {
        if line >= 8 {
            return Err(Error::InvalidParameter(format!(
                "digital output line {} out of range",
                line
            )));
        }
        self.inputs.configurable_outputs.set_bit(line, on);
        self.send_inputs()
    }

    /// Encode the full input recipe from the cached registers and queue it
    fn send_inputs(&self) -> Result<()> {
        let schema = self.input_schema.as_ref().ok_or_else(|| {
            Error::InvalidParameter("no input recipe was negotiated".into())
        })?;
        let values = self.inputs.values_for(schema);
        let mut payload = Vec::with_capacity(1 + schema.packet_size());
        payload.push(INPUT_RECIPE_ID);
        payload.extend_from_slice(&schema.encode(&values)?);
        self.enqueue(packet::encode(PacketType::DataPackage, &payload)?)
    }

    fn enqueue(&self, frame: Vec<u8>) -> Result<()> {
        if self.session.is_shutdown() {
            return Err(Error::NotConnected);
        }
        self.frames.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::SendQueueFull,
            TrySendError::Disconnected(_) => Error::NotConnected,
        })
    }

    /// Shared handle to the live state model
    pub fn state(&self) -> Arc<StateHandle> {
        Arc::clone(&self.state)
    }

    /// Shared session state, for collaborators that outlive a borrow
    pub fn session(&self) -> Arc<SessionState> {
        Arc::clone(&self.session)
    }

    /// Copy of the current robot state
    pub fn snapshot(&self) -> RobotState {
        self.state.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.session.snapshot_stats()
    }

    /// The fatal error that ended the session, if one has occurred
    pub fn session_error(&self) -> Option<String> {
        self.session.error_message()
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    /// Stop every worker thread and close the connection. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.session.is_shutdown() {
            log::info!("Shutting down RTDE session");
            self.session.request_shutdown();
        }
        let _ = self.stream.shutdown(Shutdown::Both);

        for handle in [
            &mut self.reader,
            &mut self.sender,
            &mut self.decoder,
            &mut self.merger,
        ] {
            if let Some(worker) = handle.take() {
                if worker.join().is_err() {
                    log::error!("Worker thread panicked during shutdown");
                }
            }
        }

        if self.session.connection() != ConnectionState::Error {
            self.session.set_connection(ConnectionState::Disconnected);
        }
    }
}

impl Drop for RtdeClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
