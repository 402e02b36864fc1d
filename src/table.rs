use crate::access::btree::iterator::LeafScan;
use crate::access::btree::options::TreeOptions;
use crate::access::btree::{BPlusTree, TreeStatistics};
use crate::access::record::{Record, RowId};
use crate::access::value::Value;
use crate::catalog::{Schema, TableMeta};
use crate::storage::error::{StorageError, StorageResult};
use std::collections::HashMap;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

const FIRST_ROW_ID: RowId = 1;

/// A table file plus its catalog. Assigns row ids and feeds records to the tree.
pub struct Table {
    path: PathBuf,
    tree: BPlusTree,
    next_row_id: RowId,
}

impl Table {
    /// Create a new table at `path`. The schema and tree order go to `<path>.catalog`.
    pub fn create(path: &Path, schema: Schema, options: TreeOptions) -> StorageResult<Self> {
        if path.exists() {
            return Err(StorageError::TableExists(path.to_path_buf()));
        }

        let meta = TableMeta::new(schema.clone(), options.order);
        let tree = BPlusTree::create(path, schema, options)?;
        if let Err(e) = meta.save(&Self::catalog_path(path)) {
            drop(tree);
            fs::remove_file(path)?;
            return Err(e);
        }
        log::info!(
            "created table {:?} with {} fields, order {}",
            path,
            tree.schema().len(),
            meta.order
        );

        Ok(Self {
            path: path.to_path_buf(),
            tree,
            next_row_id: FIRST_ROW_ID,
        })
    }

    /// Open an existing table with the order it was created with. Row id assignment
    /// resumes after the largest stored row id.
    pub fn open(path: &Path, options: TreeOptions) -> StorageResult<Self> {
        let meta = TableMeta::load(&Self::catalog_path(path))?;
        if options.order != meta.order {
            log::warn!(
                "table {:?} was built with order {}, ignoring order {}",
                path,
                meta.order,
                options.order
            );
        }

        let tree = BPlusTree::open(path, meta.schema, options.with_order(meta.order))?;
        let next_row_id = match tree.max_row_id()? {
            Some(max) => Self::successor(max)?,
            None => FIRST_ROW_ID,
        };

        log::info!(
            "opened table {:?}: {} pages, next row id {}",
            path,
            tree.num_pages(),
            next_row_id
        );

        Ok(Self {
            path: path.to_path_buf(),
            tree,
            next_row_id,
        })
    }

    /// Location of the catalog file for the table at `path`.
    pub fn catalog_path(path: &Path) -> PathBuf {
        path.with_extension("catalog")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        self.tree.schema()
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    pub fn next_row_id(&self) -> RowId {
        self.next_row_id
    }

    /// Insert a row under the next free row id and return that id.
    pub fn insert(&mut self, values: HashMap<String, Value>) -> StorageResult<RowId> {
        let row_id = self.next_row_id;
        self.tree.insert(&Record::new(row_id, values))?;
        self.next_row_id = Self::successor(row_id)?;
        Ok(row_id)
    }

    /// Insert a record under the row id it already carries.
    pub fn insert_record(&mut self, record: &Record) -> StorageResult<()> {
        self.tree.insert(record)?;
        if record.row_id() >= self.next_row_id {
            self.next_row_id = Self::successor(record.row_id())?;
        }
        Ok(())
    }

    /// Turn textual cells into a row, matching them to schema fields by position.
    pub fn parse_row<S: AsRef<str>>(&self, cells: &[S]) -> StorageResult<HashMap<String, Value>> {
        let fields = self.schema().fields();
        if cells.len() != fields.len() {
            return Err(StorageError::InvalidRecord(format!(
                "expected {} columns, found {}",
                fields.len(),
                cells.len()
            )));
        }

        let mut values = HashMap::with_capacity(cells.len());
        for (field, cell) in fields.iter().zip(cells) {
            let value = Value::parse(field.field_type, cell.as_ref()).map_err(|e| {
                StorageError::InvalidRecord(format!("column '{}': {}", field.name, e))
            })?;
            values.insert(field.name.clone(), value);
        }
        Ok(values)
    }

    /// Load comma-separated rows. The first line is a header and is skipped; cells are
    /// matched to schema fields by position. Returns the number of rows inserted.
    pub fn load_csv<R: BufRead>(&mut self, reader: R) -> StorageResult<usize> {
        let mut inserted = 0;

        for (index, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let cells: Vec<&str> = line.split(',').collect();
            let values = self.parse_row(&cells).map_err(|e| match e {
                StorageError::InvalidRecord(msg) => {
                    StorageError::InvalidRecord(format!("line {}, {}", index + 1, msg))
                }
                e => e,
            })?;

            self.insert(values)?;
            inserted += 1;
        }

        log::info!("loaded {} rows into {:?}", inserted, self.path);
        Ok(inserted)
    }

    pub fn get(&self, row_id: RowId) -> StorageResult<Option<Record>> {
        self.tree.get(row_id)
    }

    pub fn scan(&self) -> StorageResult<LeafScan<'_>> {
        self.tree.scan()
    }

    pub fn scan_from(&self, row_id: RowId) -> StorageResult<LeafScan<'_>> {
        self.tree.scan_from(row_id)
    }

    pub fn statistics(&self) -> TreeStatistics {
        self.tree.statistics()
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.tree.sync()
    }

    fn successor(row_id: RowId) -> StorageResult<RowId> {
        row_id.checked_add(1).ok_or_else(|| {
            StorageError::InvalidRecord(format!("row id {} is the largest possible", row_id))
        })
    }
}
