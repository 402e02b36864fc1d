//! Storage layer for rowtree.
//!
//! Everything below the B+Tree lives here:
//!
//! - **PageManager**: the single file handle, positioned reads and writes of 512-byte pages
//! - **Page**: the fixed page layout (header, sorted cell-offset array, cell content)
//! - **StorageError**: the error type shared by every layer of the library
//!
//! There is no buffer pool: every page mutation is written straight through to the file.

pub mod disk;
pub mod error;
pub mod page;

pub use disk::{PageManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{Page, PageHeader, PageId, PageType};
