//! Fixed-width record codec.
//!
//! A record serializes to exactly `schema.record_size()` bytes:
//! ```text
//! | row id (u32 BE) | field 0 | field 1 | ... | deletion marker (u8) |
//! ```
//! Ints take 4 bytes, shorts 2, text fields their declared width (ASCII, zero padded on the
//! right, truncated when too long).

use crate::access::value::Value;
use crate::catalog::schema::ROW_ID_SIZE;
use crate::catalog::{FieldType, Schema};
use crate::storage::error::{StorageError, StorageResult};
use bytes::{Buf, BufMut};
use std::collections::HashMap;

/// Integer primary key of a record, and the B+Tree search key.
pub type RowId = u32;

const LIVE_MARKER: u8 = 0x00;
const DELETED_MARKER: u8 = 0x01;

/// One row: its row id plus a value for every schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    row_id: RowId,
    values: HashMap<String, Value>,
    deleted: bool,
}

impl Record {
    pub fn new(row_id: RowId, values: HashMap<String, Value>) -> Self {
        Self {
            row_id,
            values,
            deleted: false,
        }
    }

    pub fn from_values<I, K>(row_id: RowId, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::new(
            row_id,
            values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }

    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn serialize(&self, schema: &Schema) -> StorageResult<Vec<u8>> {
        if let Some(unknown) = self.values.keys().find(|name| schema.field(name).is_none()) {
            return Err(StorageError::InvalidRecord(format!(
                "row {}: field '{}' is not in the schema",
                self.row_id, unknown
            )));
        }

        let mut buf = Vec::with_capacity(schema.record_size());
        buf.put_u32(self.row_id);

        for field in schema.fields() {
            let value = self.values.get(&field.name).ok_or_else(|| {
                StorageError::InvalidRecord(format!(
                    "row {}: missing value for field '{}'",
                    self.row_id, field.name
                ))
            })?;

            match (value, field.field_type) {
                (Value::Int(v), FieldType::Int) => buf.put_i32(*v),
                (Value::Short(v), FieldType::Short) => buf.put_i16(*v),
                (Value::Text(s), FieldType::Text(len)) => put_fixed_text(&mut buf, s, len as usize),
                (value, field_type) => {
                    return Err(StorageError::InvalidRecord(format!(
                        "row {}: field '{}' expects {}, got {:?}",
                        self.row_id, field.name, field_type, value
                    )));
                }
            }
        }

        buf.put_u8(if self.deleted {
            DELETED_MARKER
        } else {
            LIVE_MARKER
        });

        Ok(buf)
    }

    /// Inverse of [`Record::serialize`] over the bytes that follow the row id prefix.
    pub fn deserialize(schema: &Schema, mut data: &[u8], row_id: RowId) -> StorageResult<Self> {
        let expected = schema.record_size() - ROW_ID_SIZE;
        if data.len() != expected {
            return Err(StorageError::InvalidRecord(format!(
                "row {}: expected {} payload bytes, got {}",
                row_id,
                expected,
                data.len()
            )));
        }

        let mut values = HashMap::with_capacity(schema.len());
        for field in schema.fields() {
            let value = match field.field_type {
                FieldType::Int => Value::Int(data.get_i32()),
                FieldType::Short => Value::Short(data.get_i16()),
                FieldType::Text(len) => {
                    let len = len as usize;
                    let text = read_fixed_text(&data[..len]).map_err(|e| {
                        StorageError::InvalidRecord(format!(
                            "row {}: field '{}' is not valid text: {}",
                            row_id, field.name, e
                        ))
                    })?;
                    data.advance(len);
                    Value::Text(text)
                }
            };
            values.insert(field.name.clone(), value);
        }

        let deleted = data.get_u8() != LIVE_MARKER;

        Ok(Self {
            row_id,
            values,
            deleted,
        })
    }

    /// Decode a full serialized record, row id prefix included.
    pub fn decode(schema: &Schema, data: &[u8]) -> StorageResult<Self> {
        if data.len() < ROW_ID_SIZE {
            return Err(StorageError::InvalidRecord(format!(
                "record of {} bytes has no row id",
                data.len()
            )));
        }
        let row_id = (&data[..ROW_ID_SIZE]).get_u32();
        Self::deserialize(schema, &data[ROW_ID_SIZE..], row_id)
    }
}

fn put_fixed_text(buf: &mut Vec<u8>, text: &str, len: usize) {
    let mut bytes = vec![0u8; len];
    for (slot, ch) in bytes.iter_mut().zip(text.chars()) {
        *slot = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    buf.put_slice(&bytes);
}

fn read_fixed_text(raw: &[u8]) -> Result<String, std::string::FromUtf8Error> {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8(raw[..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Field;

    fn employee_schema() -> Schema {
        Schema::new(vec![
            Field::new("name", FieldType::Text(20)),
            Field::new("age", FieldType::Int),
            Field::new("dept", FieldType::Short),
        ])
        .unwrap()
    }

    fn employee(row_id: RowId, name: &str, age: i32, dept: i16) -> Record {
        Record::from_values(
            row_id,
            [
                ("name", Value::from(name)),
                ("age", Value::Int(age)),
                ("dept", Value::Short(dept)),
            ],
        )
    }

    #[test]
    fn test_serialized_length_is_fixed() -> StorageResult<()> {
        let schema = employee_schema();
        let short = employee(1, "Al", 30, 1).serialize(&schema)?;
        let long = employee(2, "Maximiliana Fitzgerald", 30, 1).serialize(&schema)?;

        assert_eq!(short.len(), schema.record_size());
        assert_eq!(long.len(), schema.record_size());
        Ok(())
    }

    #[test]
    fn test_byte_layout() -> StorageResult<()> {
        let schema = Schema::new(vec![
            Field::new("code", FieldType::Text(4)),
            Field::new("qty", FieldType::Int),
            Field::new("bin", FieldType::Short),
        ])?;
        let record = Record::from_values(
            0x01020304,
            [
                ("code", Value::from("AB")),
                ("qty", Value::Int(-2)),
                ("bin", Value::Short(0x0506)),
            ],
        );

        assert_eq!(
            record.serialize(&schema)?,
            vec![
                0x01, 0x02, 0x03, 0x04, // row id
                b'A', b'B', 0x00, 0x00, // text, zero padded
                0xFF, 0xFF, 0xFF, 0xFE, // int
                0x05, 0x06, // short
                0x00, // live
            ]
        );
        Ok(())
    }

    #[test]
    fn test_roundtrip_trims_text_padding() -> StorageResult<()> {
        let schema = employee_schema();
        let record = employee(9, "Bob", 41, -3);

        let bytes = record.serialize(&schema)?;
        let decoded = Record::deserialize(&schema, &bytes[ROW_ID_SIZE..], 9)?;

        assert_eq!(decoded, record);
        assert_eq!(decoded.get("name"), Some(&Value::Text("Bob".into())));
        Ok(())
    }

    #[test]
    fn test_long_text_is_truncated() -> StorageResult<()> {
        let schema = Schema::new(vec![Field::new("name", FieldType::Text(5))])?;
        let record = Record::from_values(1, [("name", Value::from("Christopher"))]);

        let decoded = Record::decode(&schema, &record.serialize(&schema)?)?;
        assert_eq!(decoded.get("name"), Some(&Value::Text("Chris".into())));
        Ok(())
    }

    #[test]
    fn test_non_ascii_text_is_replaced() -> StorageResult<()> {
        let schema = Schema::new(vec![Field::new("name", FieldType::Text(8))])?;
        let record = Record::from_values(1, [("name", Value::from("José"))]);

        let decoded = Record::decode(&schema, &record.serialize(&schema)?)?;
        assert_eq!(decoded.get("name"), Some(&Value::Text("Jos?".into())));
        Ok(())
    }

    #[test]
    fn test_deletion_marker_roundtrip() -> StorageResult<()> {
        let schema = employee_schema();
        let mut record = employee(3, "Eve", 22, 4);
        assert!(!record.is_deleted());
        record.mark_deleted();

        let bytes = record.serialize(&schema)?;
        assert_eq!(*bytes.last().unwrap(), DELETED_MARKER);
        assert!(Record::decode(&schema, &bytes)?.is_deleted());
        Ok(())
    }

    #[test]
    fn test_missing_field() {
        let schema = employee_schema();
        let record = Record::from_values(1, [("name", Value::from("Al"))]);

        let result = record.serialize(&schema);
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
    }

    #[test]
    fn test_unknown_field() {
        let schema = employee_schema();
        let mut values = employee(1, "Al", 1, 1).values().clone();
        values.insert("salary".into(), Value::Int(10));

        assert!(Record::new(1, values).serialize(&schema).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let schema = employee_schema();
        let record = Record::from_values(
            1,
            [
                ("name", Value::from("Al")),
                ("age", Value::Short(3)),
                ("dept", Value::Short(1)),
            ],
        );

        assert!(matches!(
            record.serialize(&schema),
            Err(StorageError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_wrong_payload_length() {
        let schema = employee_schema();
        let result = Record::deserialize(&schema, &[0u8; 3], 1);
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
        assert!(Record::decode(&schema, &[0u8; 2]).is_err());
    }
}
