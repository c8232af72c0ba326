//! Packet decoder stage
//!
//! Second stage of the receive pipeline. Turns raw data package payloads
//! into [`StateUpdate`]s using the negotiated output recipe. Field names are
//! bound to state-model identifiers once, up front, so the per-packet path
//! never compares strings.
//!
//! A decode failure here means the recipe and the wire stream disagree.
//! There is no safe way to keep interpreting telemetry after that, so the
//! stage fails the session instead of guessing.

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::Schema;
use crate::session::SessionState;
use crate::state::{FieldId, StateUpdate};

use super::QUEUE_POLL;

/// Resolved mapping from recipe positions to state-model fields
#[derive(Debug)]
pub struct BindingTable {
    schema: Arc<Schema>,
    ids: Vec<FieldId>,
}

impl BindingTable {
    /// Bind every recipe field to its state-model identifier.
    ///
    /// Unknown names fail the whole table unless `ignore_unknown` is set,
    /// in which case they decode but never merge.
    pub fn resolve(schema: Arc<Schema>, ignore_unknown: bool) -> Result<Self> {
        let mut ids = Vec::with_capacity(schema.len());
        for field in schema.iter() {
            match FieldId::resolve(&field.name) {
                Some(id) => ids.push(id),
                None if ignore_unknown => {
                    log::warn!("Ignoring unknown telemetry field '{}'", field.name);
                    ids.push(FieldId::Ignored);
                }
                None => return Err(Error::UnknownField(field.name.clone())),
            }
        }
        Ok(Self { schema, ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Decode one package payload into a merge-ready update
    pub fn decode(&self, payload: &[u8]) -> Result<StateUpdate> {
        let values = self.schema.decode(payload)?;
        let values = self
            .ids
            .iter()
            .zip(values)
            .filter(|(id, _)| **id != FieldId::Ignored)
            .map(|(id, value)| (*id, value))
            .collect();
        Ok(StateUpdate { values })
    }
}

pub(crate) fn decoder_loop(
    raw_packets: Receiver<Vec<u8>>,
    updates: Sender<StateUpdate>,
    bindings: BindingTable,
    session: Arc<SessionState>,
) {
    log::info!("Decoder thread started ({} fields bound)", bindings.len());

    loop {
        if session.is_shutdown() {
            break;
        }

        let payload = match raw_packets.recv_timeout(QUEUE_POLL) {
            Ok(payload) => payload,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let update = match bindings.decode(&payload) {
            Ok(update) => update,
            Err(e) => {
                session.fail(e);
                break;
            }
        };

        let mut pending = update;
        loop {
            match updates.send_timeout(pending, QUEUE_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if session.is_shutdown() {
                        break;
                    }
                    pending = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => break,
            }
        }
    }

    log::info!("Decoder thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FieldValue, SchemaBuilder};

    fn schema(names: &[&str], types: &str) -> Arc<Schema> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        Arc::new(
            SchemaBuilder::with_leading_timestamp(&names)
                .finalize_with_types(types)
                .unwrap(),
        )
    }

    #[test]
    fn test_resolve_binds_in_recipe_order() {
        let schema = schema(&["robot_mode", "actual_q"], "DOUBLE,INT32,VECTOR6D");
        let bindings = BindingTable::resolve(schema, false).unwrap();
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_unknown_field_is_fatal_by_default() {
        let schema = schema(&["bogus_field"], "DOUBLE,DOUBLE");
        let err = BindingTable::resolve(schema, false).unwrap_err();
        assert!(matches!(err, Error::UnknownField(name) if name == "bogus_field"));
    }

    #[test]
    fn test_unknown_field_opt_in_ignore() {
        let schema = schema(&["bogus_field", "robot_mode"], "DOUBLE,DOUBLE,INT32");
        let bindings = BindingTable::resolve(schema, true).unwrap();

        let payload = bindings
            .schema
            .encode(&[
                FieldValue::Double(1.0),
                FieldValue::Double(9.9),
                FieldValue::Int32(5),
            ])
            .unwrap();
        let update = bindings.decode(&payload).unwrap();

        // The ignored field decodes but is not merged.
        assert_eq!(update.values.len(), 2);
        assert!(update
            .values
            .iter()
            .all(|(id, _)| *id != FieldId::Ignored));
        assert_eq!(update.timestamp(), Some(1.0));
    }

    #[test]
    fn test_decode_propagates_size_mismatch() {
        let schema = schema(&["robot_mode"], "DOUBLE,INT32");
        let bindings = BindingTable::resolve(schema, false).unwrap();
        assert!(bindings.decode(&[0u8; 11]).is_err());
    }
}
