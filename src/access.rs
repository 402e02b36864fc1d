//! Access layer: records and the B+Tree that stores them.
//!
//! - **Value**: typed field values
//! - **Record**: a row id plus one value per schema field, with its fixed-width encoding
//! - **BPlusTree**: the on-disk index that owns every page of a table file

pub mod btree;
pub mod record;
pub mod value;

pub use btree::iterator::LeafScan;
pub use btree::node::{InternalNode, LeafNode, Node};
pub use btree::options::{DuplicatePolicy, TreeOptions, DEFAULT_ORDER, MAX_ORDER, MIN_ORDER};
pub use btree::{BPlusTree, TreeStatistics};
pub use record::{Record, RowId};
pub use value::Value;
