use crate::access::btree::options::TreeOptions;
use crate::catalog::Schema;
use crate::storage::error::StorageResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What a table file cannot describe about itself: its schema and the tree order its
/// internal nodes were built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub schema: Schema,
    pub order: usize,
}

impl TableMeta {
    pub fn new(schema: Schema, order: usize) -> Self {
        Self { schema, order }
    }

    /// Write the entry next to its table as a bincode blob.
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        let data = bincode::serialize(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn load(path: &Path) -> StorageResult<Self> {
        let data = fs::read(path)?;
        let meta: TableMeta = bincode::deserialize(&data)?;

        // Re-run validation on whatever was on disk
        let schema = Schema::new(meta.schema.fields().to_vec())?;
        TreeOptions::default().with_order(meta.order).validate()?;
        Ok(Self::new(schema, meta.order))
    }
}
