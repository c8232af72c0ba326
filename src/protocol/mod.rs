//! Wire protocol for the controller's real-time interface
//!
//! [`packet`] frames and unframes messages on the TCP stream, [`schema`]
//! maps negotiated recipes onto data package payloads.

pub mod packet;
pub mod schema;

pub use packet::{Frame, FrameBuffer, PacketType, HEADER_SIZE};
pub use schema::{FieldDescriptor, FieldType, FieldValue, Schema, SchemaBuilder};
