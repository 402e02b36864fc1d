//! Storage layer error types.

use crate::storage::page::PageId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Unsupported field type: {0}")]
    UnsupportedFieldType(String),

    #[error("Invalid tree order {order}: must be between {min} and {max}")]
    InvalidOrder { order: usize, min: usize, max: usize },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Duplicate row id: {0}")]
    DuplicateRowId(u32),

    #[error("Malformed tree: {0}")]
    MalformedTree(String),

    #[error("Corrupted page {page_id}: {reason}")]
    Corrupted { page_id: PageId, reason: String },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Invalid access to page {page_id}: {len} bytes at offset {offset}")]
    InvalidPageAccess {
        page_id: PageId,
        offset: usize,
        len: usize,
    },

    #[error("Page limit exceeded: page numbers are limited to {0}")]
    PageLimitExceeded(u16),

    #[error("Table already exists at {0:?}")]
    TableExists(PathBuf),

    #[error("Catalog error: {0}")]
    Catalog(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Errors raised while validating a schema or tree options, before any page is written.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidSchema(_)
                | StorageError::UnsupportedFieldType(_)
                | StorageError::InvalidOrder { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::PageNotFound(PageId(42));
        assert_eq!(err.to_string(), "Page not found: 42");

        let err = StorageError::DuplicateRowId(7);
        assert_eq!(err.to_string(), "Duplicate row id: 7");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(StorageError::InvalidSchema("empty".into()).is_configuration());
        assert!(StorageError::UnsupportedFieldType("float".into()).is_configuration());
        assert!(
            StorageError::InvalidOrder {
                order: 2,
                min: 3,
                max: 63
            }
            .is_configuration()
        );
        assert!(!StorageError::MalformedTree("x".into()).is_configuration());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
