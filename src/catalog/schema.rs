//! Table schema: the ordered, typed field list every record is encoded against.

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Bytes taken by the row id prefix of every serialized record.
pub const ROW_ID_SIZE: usize = 4;
/// Bytes taken by the deletion marker suffix of every serialized record.
pub const DELETION_MARKER_SIZE: usize = 1;
/// Leaf cells store the payload length in a single byte.
pub const MAX_RECORD_SIZE: usize = u8::MAX as usize;
/// Width used for `string` columns declared without an explicit length.
pub const DEFAULT_TEXT_LENGTH: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    Short,
    /// Fixed-width ASCII text, zero padded to the given length.
    Text(u16),
}

impl FieldType {
    /// Build a field type from its textual name. `length` is only meaningful for text.
    pub fn from_name(name: &str, length: usize) -> StorageResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" => Ok(FieldType::Int),
            "short" => Ok(FieldType::Short),
            "text" | "string" => {
                let length = u16::try_from(length).map_err(|_| {
                    StorageError::InvalidSchema(format!("text length {} is too large", length))
                })?;
                Ok(FieldType::Text(length))
            }
            other => Err(StorageError::UnsupportedFieldType(other.to_string())),
        }
    }

    pub fn length(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Short => 2,
            FieldType::Text(len) => *len as usize,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Short => write!(f, "short"),
            FieldType::Text(len) => write!(f, "text({})", len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn length(&self) -> usize {
        self.field_type.length()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> StorageResult<Self> {
        if fields.is_empty() {
            return Err(StorageError::InvalidSchema(
                "schema needs at least one field".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.is_empty() {
                return Err(StorageError::InvalidSchema(
                    "field names must not be empty".to_string(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StorageError::InvalidSchema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            if field.field_type == FieldType::Text(0) {
                return Err(StorageError::InvalidSchema(format!(
                    "text field '{}' needs a length of at least 1",
                    field.name
                )));
            }
        }

        let schema = Self { fields };
        if schema.record_size() > MAX_RECORD_SIZE {
            return Err(StorageError::InvalidSchema(format!(
                "record size {} exceeds the {} byte limit",
                schema.record_size(),
                MAX_RECORD_SIZE
            )));
        }

        Ok(schema)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialized size of one record: row id, every field, deletion marker.
    pub fn record_size(&self) -> usize {
        ROW_ID_SIZE + self.fields.iter().map(Field::length).sum::<usize>() + DELETION_MARKER_SIZE
    }
}

/// Parses `name:type` pairs separated by commas, e.g. `name:text(20),age:int,dept:short`.
/// `string` is accepted as text of [`DEFAULT_TEXT_LENGTH`].
impl FromStr for Schema {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = Vec::new();

        for definition in s.split(',') {
            let definition = definition.trim();
            let (name, type_def) = definition.split_once(':').ok_or_else(|| {
                StorageError::InvalidSchema(format!("invalid column definition '{}'", definition))
            })?;
            let type_def = type_def.trim();

            let field_type = match type_def.split_once('(') {
                Some((type_name, rest)) => {
                    let length = rest
                        .strip_suffix(')')
                        .and_then(|n| n.trim().parse::<usize>().ok())
                        .ok_or_else(|| {
                            StorageError::InvalidSchema(format!(
                                "invalid length in '{}'",
                                definition
                            ))
                        })?;
                    FieldType::from_name(type_name.trim(), length)?
                }
                None => FieldType::from_name(type_def, DEFAULT_TEXT_LENGTH as usize)?,
            };

            fields.push(Field::new(name.trim(), field_type));
        }

        Schema::new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let defs: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}:{}", field.name, field.field_type))
            .collect();
        write!(f, "{}", defs.join(","))
    }
}
