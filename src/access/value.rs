use crate::catalog::FieldType;
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Values that can be stored in a record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Short(i16),
    Text(String),
}

impl Value {
    /// Parse a textual cell (e.g. from a CSV line) as a value of the given type
    pub fn parse(field_type: FieldType, raw: &str) -> StorageResult<Self> {
        let raw = raw.trim();
        match field_type {
            FieldType::Int => raw.parse::<i32>().map(Value::Int).map_err(|e| {
                StorageError::InvalidRecord(format!("'{}' is not a valid int: {}", raw, e))
            }),
            FieldType::Short => raw.parse::<i16>().map(Value::Short).map_err(|e| {
                StorageError::InvalidRecord(format!("'{}' is not a valid short: {}", raw, e))
            }),
            FieldType::Text(_) => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
