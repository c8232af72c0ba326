//! Field schemas for data packages
//!
//! A recipe negotiated with the controller fixes which fields a data package
//! carries and in what order. The controller's setup reply names the concrete
//! type of every requested field; after that, each package payload is the
//! fields' wire encodings back to back with nothing in between:
//!
//! ```text
//! ┌───────────┬───────────┬─────┬───────────┐
//! │ field 0   │ field 1   │ ... │ field n-1 │
//! │ (by type) │ (by type) │     │ (by type) │
//! └───────────┴───────────┴─────┴───────────┘
//! ```
//!
//! All values are big-endian. The payload length is the sum of the field
//! sizes, so a schema also tells the stream layer exactly how many bytes
//! each package occupies.

use crate::error::{Error, Result};
use crate::types::{Vector3D, Vector6D};

/// Wire types a field can have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Double,
    UInt64,
    UInt32,
    Int32,
    UInt8,
    Vector6D,
    Vector6Int32,
    Vector3D,
}

impl FieldType {
    /// Encoded size of one value of this type in bytes
    pub fn wire_size(&self) -> usize {
        match self {
            FieldType::Double | FieldType::UInt64 => 8,
            FieldType::UInt32 | FieldType::Int32 => 4,
            FieldType::UInt8 => 1,
            FieldType::Vector6D => 48,
            FieldType::Vector6Int32 | FieldType::Vector3D => 24,
        }
    }

    /// Parse a type name from a setup reply
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "DOUBLE" => Some(FieldType::Double),
            "UINT64" => Some(FieldType::UInt64),
            "UINT32" => Some(FieldType::UInt32),
            "INT32" => Some(FieldType::Int32),
            "UINT8" => Some(FieldType::UInt8),
            "VECTOR6D" => Some(FieldType::Vector6D),
            "VECTOR6INT32" => Some(FieldType::Vector6Int32),
            "VECTOR3D" => Some(FieldType::Vector3D),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Double => "DOUBLE",
            FieldType::UInt64 => "UINT64",
            FieldType::UInt32 => "UINT32",
            FieldType::Int32 => "INT32",
            FieldType::UInt8 => "UINT8",
            FieldType::Vector6D => "VECTOR6D",
            FieldType::Vector6Int32 => "VECTOR6INT32",
            FieldType::Vector3D => "VECTOR3D",
        }
    }
}

/// One decoded field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Double(f64),
    UInt64(u64),
    UInt32(u32),
    Int32(i32),
    UInt8(u8),
    Vector6D(Vector6D),
    Vector6Int32([i32; 6]),
    Vector3D(Vector3D),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::UInt32(_) => FieldType::UInt32,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::UInt8(_) => FieldType::UInt8,
            FieldValue::Vector6D(_) => FieldType::Vector6D,
            FieldValue::Vector6Int32(_) => FieldType::Vector6Int32,
            FieldValue::Vector3D(_) => FieldType::Vector3D,
        }
    }

    /// Widen any integer variant to u64, for callers that only care about bits
    pub fn integer(&self) -> Option<u64> {
        match self {
            FieldValue::UInt64(v) => Some(*v),
            FieldValue::UInt32(v) => Some(*v as u64),
            FieldValue::Int32(v) => Some(*v as u32 as u64),
            FieldValue::UInt8(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn double(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn vector6(&self) -> Option<Vector6D> {
        match self {
            FieldValue::Vector6D(v) => Some(*v),
            _ => None,
        }
    }

    pub fn vector3(&self) -> Option<Vector3D> {
        match self {
            FieldValue::Vector3D(v) => Some(*v),
            _ => None,
        }
    }

    pub fn vector6_int(&self) -> Option<[i32; 6]> {
        match self {
            FieldValue::Vector6Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Decode one value of `field_type` from the front of `bytes`.
    /// Caller guarantees at least `field_type.wire_size()` bytes.
    fn read(field_type: FieldType, bytes: &[u8]) -> Self {
        match field_type {
            FieldType::Double => FieldValue::Double(read_f64(bytes)),
            FieldType::UInt64 => FieldValue::UInt64(u64::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldType::UInt32 => {
                FieldValue::UInt32(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::Int32 => FieldValue::Int32(read_i32(bytes)),
            FieldType::UInt8 => FieldValue::UInt8(bytes[0]),
            FieldType::Vector6D => {
                let mut values = [0.0f64; 6];
                for (i, slot) in values.iter_mut().enumerate() {
                    *slot = read_f64(&bytes[i * 8..]);
                }
                FieldValue::Vector6D(Vector6D::from_array(values))
            }
            FieldType::Vector6Int32 => {
                let mut values = [0i32; 6];
                for (i, slot) in values.iter_mut().enumerate() {
                    *slot = read_i32(&bytes[i * 4..]);
                }
                FieldValue::Vector6Int32(values)
            }
            FieldType::Vector3D => {
                let x = read_f64(bytes);
                let y = read_f64(&bytes[8..]);
                let z = read_f64(&bytes[16..]);
                FieldValue::Vector3D(Vector3D::new(x, y, z))
            }
        }
    }

    /// Append this value's wire encoding to `out`
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            FieldValue::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::UInt64(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::UInt32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::UInt8(v) => out.push(*v),
            FieldValue::Vector6D(v) => {
                for value in v.to_array() {
                    out.extend_from_slice(&value.to_be_bytes());
                }
            }
            FieldValue::Vector6Int32(v) => {
                for value in v {
                    out.extend_from_slice(&value.to_be_bytes());
                }
            }
            FieldValue::Vector3D(v) => {
                out.extend_from_slice(&v.x.to_be_bytes());
                out.extend_from_slice(&v.y.to_be_bytes());
                out.extend_from_slice(&v.z.to_be_bytes());
            }
        }
    }
}

fn read_f64(bytes: &[u8]) -> f64 {
    f64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// One named, typed slot in a negotiated recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
}

/// Collects field names before negotiation assigns their types
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    names: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the configured names, inserting `timestamp` up front when
    /// missing. The timestamp drives gap detection downstream, so every
    /// output recipe carries it whether or not the caller asked.
    pub fn with_leading_timestamp(names: &[String]) -> Self {
        let mut builder = Self::new();
        if names.first().map(String::as_str) != Some("timestamp") {
            builder.push("timestamp");
        }
        for name in names {
            builder.push(name);
        }
        builder
    }

    pub fn push(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The comma-joined request payload sent to the controller
    pub fn request_payload(&self) -> Vec<u8> {
        self.names.join(",").into_bytes()
    }

    /// Pair the requested names with the controller's comma-joined type reply.
    ///
    /// The reply is positional. `NOT_FOUND` marks a name the controller does
    /// not export and `IN_USE` a register already claimed by another client;
    /// both reject the whole recipe.
    pub fn finalize_with_types(self, type_reply: &str) -> Result<Schema> {
        let types: Vec<&str> = type_reply.split(',').map(str::trim).collect();
        if types.len() != self.names.len() {
            return Err(Error::Negotiation(format!(
                "recipe reply lists {} types for {} requested fields",
                types.len(),
                self.names.len()
            )));
        }
        let mut fields = Vec::with_capacity(self.names.len());
        for (name, type_name) in self.names.into_iter().zip(types) {
            match type_name {
                "NOT_FOUND" => {
                    return Err(Error::Negotiation(format!(
                        "controller does not provide field '{}'",
                        name
                    )));
                }
                "IN_USE" => {
                    return Err(Error::Negotiation(format!(
                        "field '{}' is already claimed by another client",
                        name
                    )));
                }
                _ => {}
            }
            let field_type = FieldType::from_type_name(type_name).ok_or_else(|| {
                Error::Negotiation(format!(
                    "controller reported unsupported type '{}' for field '{}'",
                    type_name, name
                ))
            })?;
            fields.push(FieldDescriptor {
                name,
                field_type,
            });
        }
        Ok(Schema { fields })
    }
}

/// A negotiated recipe: ordered, typed fields with fixed wire layout.
///
/// Immutable once built, so the packet size can be cached by the stream
/// layer for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Payload size of one data package under this recipe
    pub fn packet_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.wire_size()).sum()
    }

    /// Decode a full package payload into one value per field.
    ///
    /// The payload must be consumed exactly; leftover or missing bytes mean
    /// the schema and the stream disagree and the whole package is rejected.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<FieldValue>> {
        let mut values = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for field in &self.fields {
            let need = field.field_type.wire_size();
            if payload.len() - offset < need {
                return Err(Error::Decode(format!(
                    "field '{}' needs {} bytes, {} remain",
                    field.name,
                    need,
                    payload.len() - offset
                )));
            }
            values.push(FieldValue::read(field.field_type, &payload[offset..]));
            offset += need;
        }
        if offset != payload.len() {
            return Err(Error::Decode(format!(
                "package payload is {} bytes but the recipe consumes {}",
                payload.len(),
                offset
            )));
        }
        Ok(values)
    }

    /// Encode one value per field into a package payload.
    ///
    /// Values must match the schema's types positionally.
    pub fn encode(&self, values: &[FieldValue]) -> Result<Vec<u8>> {
        if values.len() != self.fields.len() {
            return Err(Error::InvalidParameter(format!(
                "{} values supplied for a {}-field recipe",
                values.len(),
                self.fields.len()
            )));
        }
        let mut payload = Vec::with_capacity(self.packet_size());
        for (field, value) in self.fields.iter().zip(values) {
            if value.field_type() != field.field_type {
                return Err(Error::InvalidParameter(format!(
                    "field '{}' expects {} but the value is {}",
                    field.name,
                    field.field_type.type_name(),
                    value.field_type().type_name()
                )));
            }
            value.write(&mut payload);
        }
        Ok(payload)
    }
}
