//! Catalog: schema definitions and their on-disk form.
//!
//! A table's schema and tree order are supplied once when the table is created, persisted
//! next to the table file, and read back when the table is reopened. They never change
//! afterwards.

pub mod schema;
pub mod table_meta;

pub use schema::{Field, FieldType, Schema, DEFAULT_TEXT_LENGTH, MAX_RECORD_SIZE};
pub use table_meta::TableMeta;
