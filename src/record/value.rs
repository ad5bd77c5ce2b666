use super::error::{RecordError, RecordResult};

/// Column data type with its storage size.
///
/// `Integer` and `Boolean` are fixed-length; `Varchar` carries a declared
/// maximum byte length and serializes with a length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Varchar(usize),
    Boolean,
}

impl DataType {
    pub fn is_fixed_len(&self) -> bool {
        !matches!(self, DataType::Varchar(_))
    }

    /// Bytes for fixed types, the declared maximum for `Varchar`.
    pub fn size(&self) -> usize {
        match self {
            DataType::Integer => 4,
            DataType::Varchar(max_len) => *max_len,
            DataType::Boolean => 1,
        }
    }
}

/// Serialization tags, one byte each
const TAG_INTEGER: u8 = 0;
const TAG_VARCHAR: u8 = 1;
const TAG_BOOLEAN: u8 = 2;
const TAG_NULL: u8 = 3;

/// A single tagged column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Varchar(String),
    Boolean(bool),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value can be stored in a column of `data_type`.
    /// NULL is compatible with every column type.
    pub fn matches_type(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Integer(_), DataType::Integer)
                | (Value::Varchar(_), DataType::Varchar(_))
                | (Value::Boolean(_), DataType::Boolean)
                | (Value::Null, _)
        )
    }

    /// Bytes this value occupies on the wire: one tag byte plus the payload.
    pub fn serialized_size(&self) -> usize {
        1 + match self {
            Value::Integer(_) => 4,
            Value::Varchar(s) => 4 + s.len(),
            Value::Boolean(_) => 1,
            Value::Null => 0,
        }
    }

    /// Append the wire form: tag byte, then i32 LE / length-prefixed UTF-8
    /// / one byte / nothing.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Integer(i) => {
                out.push(TAG_INTEGER);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Varchar(s) => {
                out.push(TAG_VARCHAR);
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Boolean(b) => {
                out.push(TAG_BOOLEAN);
                out.push(*b as u8);
            }
            Value::Null => out.push(TAG_NULL),
        }
    }

    /// Decode one value from the front of `data`, returning it along with
    /// the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> RecordResult<(Self, usize)> {
        let tag = *data
            .first()
            .ok_or_else(|| RecordError::Deserialization("empty value data".to_string()))?;
        let body = &data[1..];

        match tag {
            TAG_INTEGER => {
                let bytes: [u8; 4] = body
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| {
                        RecordError::Deserialization("truncated INTEGER value".to_string())
                    })?;
                Ok((Value::Integer(i32::from_le_bytes(bytes)), 5))
            }
            TAG_VARCHAR => {
                let len_bytes: [u8; 4] = body
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| {
                        RecordError::Deserialization("truncated VARCHAR length".to_string())
                    })?;
                let len = u32::from_le_bytes(len_bytes) as usize;
                let raw = body.get(4..4 + len).ok_or_else(|| {
                    RecordError::Deserialization("truncated VARCHAR body".to_string())
                })?;
                let s = std::str::from_utf8(raw).map_err(|e| {
                    RecordError::Deserialization(format!("invalid UTF-8 in VARCHAR: {}", e))
                })?;
                Ok((Value::Varchar(s.to_string()), 1 + 4 + len))
            }
            TAG_BOOLEAN => {
                let byte = *body.first().ok_or_else(|| {
                    RecordError::Deserialization("truncated BOOLEAN value".to_string())
                })?;
                Ok((Value::Boolean(byte != 0), 2))
            }
            TAG_NULL => Ok((Value::Null, 1)),
            other => Err(RecordError::Deserialization(format!(
                "unknown value tag: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Varchar(s) => write!(f, "'{}'", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "NULL"),
        }
    }
}
