use crate::storage::disk::PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HEADER_SIZE, INTERIOR_CELL_SIZE, OFFSET_SIZE};

/// Maximum number of children per internal node unless configured otherwise.
pub const DEFAULT_ORDER: usize = 4;
pub const MIN_ORDER: usize = 3;
/// One more than the number of interior cells a page can hold.
pub const MAX_ORDER: usize = (PAGE_SIZE - HEADER_SIZE) / (INTERIOR_CELL_SIZE + OFFSET_SIZE) + 1;

/// What an insert does when the target leaf already holds the same row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Store the record anyway. Equal keys are placed after the existing ones.
    #[default]
    Allow,
    /// Fail with `DuplicateRowId` before anything is written.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    pub order: usize,
    pub duplicates: DuplicatePolicy,
    /// Fsync the table file after every page write.
    pub sync_on_write: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            duplicates: DuplicatePolicy::Allow,
            sync_on_write: false,
        }
    }
}

impl TreeOptions {
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    pub fn validate(&self) -> StorageResult<()> {
        if !(MIN_ORDER..=MAX_ORDER).contains(&self.order) {
            return Err(StorageError::InvalidOrder {
                order: self.order,
                min: MIN_ORDER,
                max: MAX_ORDER,
            });
        }
        Ok(())
    }

    /// Keys an internal node holds before it must split.
    pub fn max_keys(&self) -> usize {
        self.order - 1
    }
}
