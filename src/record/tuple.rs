use super::error::{RecordError, RecordResult};
use super::schema::Schema;
use super::value::Value;
use crate::file::PageId;

/// Slot index within a table page.
pub type SlotId = u32;

/// Physical identifier for one record: the page holding it and the slot
/// pointing at its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

/// Size of the tuple wire header: total size (4) + reserved flags (4)
const TUPLE_HEADER_SIZE: usize = 8;

/// A row of tagged values.
///
/// Wire format: a u32 total size, four reserved flag bytes, then the
/// concatenated value encodings.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total bytes this tuple occupies when serialized.
    pub fn serialized_size(&self) -> usize {
        TUPLE_HEADER_SIZE
            + self
                .values
                .iter()
                .map(|v| v.serialized_size())
                .sum::<usize>()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let total = self.serialized_size();
        let mut out = Vec::with_capacity(total);

        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved flags

        for value in &self.values {
            value.serialize_into(&mut out);
        }

        out
    }

    /// Decode a tuple, reading one value per schema column.
    pub fn deserialize(data: &[u8], schema: &Schema) -> RecordResult<Self> {
        if data.len() < TUPLE_HEADER_SIZE {
            return Err(RecordError::Deserialization(format!(
                "tuple data too short: {} bytes",
                data.len()
            )));
        }

        let mut offset = TUPLE_HEADER_SIZE;
        let mut values = Vec::with_capacity(schema.column_count());

        for _ in 0..schema.column_count() {
            let (value, consumed) = Value::deserialize(&data[offset..])?;
            values.push(value);
            offset += consumed;
        }

        Ok(Self { values })
    }
}

impl std::fmt::Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, DataType};

    fn test_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Varchar(20)),
            Column::new("active", DataType::Boolean),
        ])
    }

    #[test]
    fn test_round_trip() {
        let schema = test_schema();
        let tuple = Tuple::new(vec![
            Value::Integer(7),
            Value::Varchar("Alice".to_string()),
            Value::Boolean(true),
        ]);

        let bytes = tuple.serialize();
        assert_eq!(bytes.len(), tuple.serialized_size());

        let restored = Tuple::deserialize(&bytes, &schema).unwrap();
        assert_eq!(restored, tuple);
    }

    #[test]
    fn test_round_trip_with_nulls() {
        let schema = test_schema();
        let tuple = Tuple::new(vec![Value::Integer(1), Value::Null, Value::Null]);

        let bytes = tuple.serialize();
        let restored = Tuple::deserialize(&bytes, &schema).unwrap();
        assert_eq!(restored, tuple);
    }

    #[test]
    fn test_size_prefix_matches() {
        let tuple = Tuple::new(vec![Value::Integer(5), Value::Boolean(false)]);
        let bytes = tuple.serialize();

        let size = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(size, bytes.len());
    }

    #[test]
    fn test_deserialize_too_short_fails() {
        let schema = test_schema();
        assert!(Tuple::deserialize(&[0, 1, 2], &schema).is_err());
    }
}
