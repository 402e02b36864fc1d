//! The 512-byte table page.
//!
//! ```text
//! +--------------------+ 0
//! | header (16 bytes)  |
//! +--------------------+ 16
//! | cell offsets (2B)  |  sorted ascending by key, at most max_records entries
//! +--------------------+ 16 + 2 * max_records
//! |   free space       |
//! +--------------------+ cell_content_start
//! | cell content       |  grows downward from PAGE_SIZE
//! +--------------------+ 512
//! ```
//!
//! Leaf cell: `payload length (u8) | serialized record`.
//! Interior cell: `left child page (u16) | key (u32)`.
//!
//! The page keeps its header and offset array in memory and writes every change straight
//! through the [`PageManager`]. Cell content is only ever read back from the file.

use crate::access::record::{Record, RowId};
use crate::catalog::Schema;
use crate::storage::disk::{PageManager, PAGE_SIZE};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::header::{PageHeader, HEADER_SIZE};
use crate::storage::page::{PageId, PageType};
use byteorder::{BigEndian, ByteOrder};
use std::sync::Arc;

pub const OFFSET_SIZE: usize = 2;
pub const INTERIOR_CELL_SIZE: usize = 6;
const LEAF_LENGTH_PREFIX: usize = 1;

pub struct Page {
    page_id: PageId,
    header: PageHeader,
    cell_offsets: Vec<u16>,
    schema: Arc<Schema>,
    cell_size: usize,
    max_records: usize,
}

impl Page {
    /// On-page size of one cell of the given type.
    pub fn cell_size_for(schema: &Schema, page_type: PageType) -> usize {
        match page_type {
            PageType::Leaf => LEAF_LENGTH_PREFIX + schema.record_size(),
            PageType::Interior => INTERIOR_CELL_SIZE,
        }
    }

    /// `MAX_RECORDS = (PAGE_SIZE - HEADER_SIZE) / (cell size + offset size)`
    pub fn max_records_for(schema: &Schema, page_type: PageType) -> usize {
        (PAGE_SIZE - HEADER_SIZE) / (Self::cell_size_for(schema, page_type) + OFFSET_SIZE)
    }

    /// Initialize a fresh page on disk: zero-filled, header written.
    pub fn create(
        disk: &mut PageManager,
        page_id: PageId,
        page_type: PageType,
        schema: Arc<Schema>,
        root_page: Option<PageId>,
    ) -> StorageResult<Self> {
        let mut header = PageHeader::new(page_type);
        header.root_page = root_page;

        let page = Self::with_header(page_id, header, Vec::new(), schema);
        disk.write_page(page_id, &[0u8; PAGE_SIZE])?;
        page.persist_header(disk)?;

        Ok(page)
    }

    /// Read an existing page back from disk.
    pub fn load(disk: &PageManager, page_id: PageId, schema: Arc<Schema>) -> StorageResult<Self> {
        let mut data = [0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut data)?;

        let header = PageHeader::from_bytes(page_id, &data)?;
        let count = header.record_count as usize;
        let max_records = Self::max_records_for(&schema, header.page_type);
        if count > max_records {
            return Err(StorageError::Corrupted {
                page_id,
                reason: format!("record count {} exceeds capacity {}", count, max_records),
            });
        }

        let offset_area_end = HEADER_SIZE + max_records * OFFSET_SIZE;
        let cell_size = Self::cell_size_for(&schema, header.page_type);
        let cell_offsets: Vec<u16> = (0..count)
            .map(|i| BigEndian::read_u16(&data[HEADER_SIZE + i * OFFSET_SIZE..]))
            .collect();

        for &offset in &cell_offsets {
            let offset = offset as usize;
            if offset < offset_area_end.max(header.cell_content_start as usize)
                || offset + cell_size > PAGE_SIZE
            {
                return Err(StorageError::Corrupted {
                    page_id,
                    reason: format!("cell offset {} outside the content region", offset),
                });
            }
        }

        Ok(Self::with_header(page_id, header, cell_offsets, schema))
    }

    fn with_header(
        page_id: PageId,
        header: PageHeader,
        cell_offsets: Vec<u16>,
        schema: Arc<Schema>,
    ) -> Self {
        let cell_size = Self::cell_size_for(&schema, header.page_type);
        let max_records = Self::max_records_for(&schema, header.page_type);
        Self {
            page_id,
            header,
            cell_offsets,
            schema,
            cell_size,
            max_records,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn record_count(&self) -> usize {
        self.header.record_count as usize
    }

    pub fn cell_content_start(&self) -> usize {
        self.header.cell_content_start as usize
    }

    pub fn cell_offsets(&self) -> &[u16] {
        &self.cell_offsets
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    pub fn root_page(&self) -> Option<PageId> {
        self.header.root_page
    }

    pub fn parent(&self) -> Option<PageId> {
        self.header.parent
    }

    pub fn right_sibling(&self) -> Option<PageId> {
        self.header.right_pointer
    }

    pub fn right_child(&self) -> Option<PageId> {
        self.header.right_pointer
    }

    /// Free bytes between the used part of the offset array and the cell content.
    pub fn available_space(&self) -> usize {
        self.cell_content_start()
            .saturating_sub(HEADER_SIZE + self.record_count() * OFFSET_SIZE)
    }

    /// True iff a cell of `cell_len` bytes plus its offset entry fits.
    pub fn has_space(&self, cell_len: usize) -> bool {
        self.available_space() >= cell_len + OFFSET_SIZE
    }

    pub fn is_full(&self) -> bool {
        self.record_count() >= self.max_records || !self.has_space(self.cell_size)
    }

    /// Store a record in key order. Returns `Ok(false)` when the page is full; the caller
    /// is expected to split.
    pub fn add_record(&mut self, disk: &mut PageManager, record: &Record) -> StorageResult<bool> {
        self.expect_type(PageType::Leaf)?;

        let payload = record.serialize(&self.schema)?;
        let cell_len = LEAF_LENGTH_PREFIX + payload.len();
        if self.is_full() || !self.has_space(cell_len) {
            return Ok(false);
        }

        let offset = self.cell_content_start() - cell_len;
        let mut cell = Vec::with_capacity(cell_len);
        cell.push(payload.len() as u8);
        cell.extend_from_slice(&payload);
        disk.write_at(self.page_id, offset, &cell)?;

        let position = self.insert_position(disk, record.row_id())?;
        self.cell_offsets.insert(position, offset as u16);
        self.header.cell_content_start = offset as u16;
        self.header.record_count += 1;
        self.persist_header(disk)?;

        log::trace!(
            "page {}: stored row {} at offset {} (slot {})",
            self.page_id,
            record.row_id(),
            offset,
            position
        );

        Ok(true)
    }

    /// All records on this page, ascending by row id.
    pub fn get_all_records(&self, disk: &PageManager) -> StorageResult<Vec<Record>> {
        self.expect_type(PageType::Leaf)?;

        self.cell_offsets
            .iter()
            .map(|&offset| self.read_leaf_cell(disk, offset))
            .collect()
    }

    pub fn find_record(&self, disk: &PageManager, row_id: RowId) -> StorageResult<Option<Record>> {
        self.expect_type(PageType::Leaf)?;

        for &offset in &self.cell_offsets {
            let key = self.cell_key(disk, offset)?;
            if key == row_id {
                return self.read_leaf_cell(disk, offset).map(Some);
            }
            if key > row_id {
                break;
            }
        }
        Ok(None)
    }

    /// Keys stored on this page, in offset-array order.
    pub fn keys(&self, disk: &PageManager) -> StorageResult<Vec<RowId>> {
        self.cell_offsets
            .iter()
            .map(|&offset| self.cell_key(disk, offset))
            .collect()
    }

    /// Reset to an empty page. Offsets and cell content are zero-filled on disk; the parent,
    /// sibling and root fields are kept.
    pub fn clear(&mut self, disk: &mut PageManager) -> StorageResult<()> {
        self.header.record_count = 0;
        self.header.cell_content_start = PAGE_SIZE as u16;
        self.cell_offsets.clear();

        let mut data = [0u8; PAGE_SIZE];
        data[..HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
        disk.write_page(self.page_id, &data)
    }

    pub fn set_parent(&mut self, disk: &mut PageManager, parent: Option<PageId>) -> StorageResult<()> {
        self.header.parent = parent;
        self.persist_header(disk)
    }

    pub fn set_right_sibling(
        &mut self,
        disk: &mut PageManager,
        sibling: Option<PageId>,
    ) -> StorageResult<()> {
        self.expect_type(PageType::Leaf)?;
        self.header.right_pointer = sibling;
        self.persist_header(disk)
    }

    pub fn set_right_child(
        &mut self,
        disk: &mut PageManager,
        child: Option<PageId>,
    ) -> StorageResult<()> {
        self.expect_type(PageType::Interior)?;
        self.header.right_pointer = child;
        self.persist_header(disk)
    }

    pub fn set_root_page(&mut self, disk: &mut PageManager, root: Option<PageId>) -> StorageResult<()> {
        self.header.root_page = root;
        self.persist_header(disk)
    }

    /// Add one `(left child, key)` cell to an interior page, keeping key order.
    pub fn write_interior_cell(
        &mut self,
        disk: &mut PageManager,
        left_child: PageId,
        key: RowId,
    ) -> StorageResult<()> {
        self.expect_type(PageType::Interior)?;
        if self.is_full() {
            return Err(StorageError::MalformedTree(format!(
                "interior page {} has no room for key {}",
                self.page_id, key
            )));
        }

        let offset = self.cell_content_start() - INTERIOR_CELL_SIZE;
        let mut cell = [0u8; INTERIOR_CELL_SIZE];
        BigEndian::write_u16(&mut cell[0..2], left_child.0);
        BigEndian::write_u32(&mut cell[2..6], key);
        disk.write_at(self.page_id, offset, &cell)?;

        let position = self.insert_position(disk, key)?;
        self.cell_offsets.insert(position, offset as u16);
        self.header.cell_content_start = offset as u16;
        self.header.record_count += 1;
        self.persist_header(disk)
    }

    /// Replace the whole content of an interior page: one cell per key, with
    /// `children[i]` as the left child of `keys[i]` and the last child as right child.
    pub fn rewrite_interior(
        &mut self,
        disk: &mut PageManager,
        keys: &[RowId],
        children: &[PageId],
    ) -> StorageResult<()> {
        self.expect_type(PageType::Interior)?;
        if children.len() != keys.len() + 1 {
            return Err(StorageError::MalformedTree(format!(
                "interior page {}: {} keys need {} children, got {}",
                self.page_id,
                keys.len(),
                keys.len() + 1,
                children.len()
            )));
        }

        self.clear(disk)?;
        for (key, child) in keys.iter().zip(children) {
            self.write_interior_cell(disk, *child, *key)?;
        }
        self.set_right_child(disk, children.last().copied())
    }

    /// `(left child, key)` pairs in key order.
    pub fn interior_cells(&self, disk: &PageManager) -> StorageResult<Vec<(PageId, RowId)>> {
        self.expect_type(PageType::Interior)?;

        self.cell_offsets
            .iter()
            .map(|&offset| {
                let mut cell = [0u8; INTERIOR_CELL_SIZE];
                disk.read_at(self.page_id, offset as usize, &mut cell)?;
                Ok((
                    PageId(BigEndian::read_u16(&cell[0..2])),
                    BigEndian::read_u32(&cell[2..6]),
                ))
            })
            .collect()
    }

    fn read_leaf_cell(&self, disk: &PageManager, offset: u16) -> StorageResult<Record> {
        let mut cell = vec![0u8; self.cell_size];
        disk.read_at(self.page_id, offset as usize, &mut cell)?;

        let payload_len = cell[0] as usize;
        if payload_len + LEAF_LENGTH_PREFIX != self.cell_size {
            return Err(StorageError::Corrupted {
                page_id: self.page_id,
                reason: format!(
                    "cell at offset {} has payload length {}, expected {}",
                    offset,
                    payload_len,
                    self.cell_size - LEAF_LENGTH_PREFIX
                ),
            });
        }

        Record::decode(&self.schema, &cell[LEAF_LENGTH_PREFIX..])
    }

    fn cell_key(&self, disk: &PageManager, offset: u16) -> StorageResult<RowId> {
        let key_offset = match self.header.page_type {
            PageType::Leaf => LEAF_LENGTH_PREFIX,
            PageType::Interior => 2,
        };
        let mut key = [0u8; 4];
        disk.read_at(self.page_id, offset as usize + key_offset, &mut key)?;
        Ok(BigEndian::read_u32(&key))
    }

    /// Slot for a new key: after every stored key that is less than or equal to it.
    fn insert_position(&self, disk: &PageManager, key: RowId) -> StorageResult<usize> {
        let mut position = 0;
        while position < self.cell_offsets.len()
            && self.cell_key(disk, self.cell_offsets[position])? <= key
        {
            position += 1;
        }
        Ok(position)
    }

    fn persist_header(&self, disk: &mut PageManager) -> StorageResult<()> {
        let mut data = Vec::with_capacity(HEADER_SIZE + self.cell_offsets.len() * OFFSET_SIZE);
        data.extend_from_slice(&self.header.to_bytes());
        for &offset in &self.cell_offsets {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        disk.write_at(self.page_id, 0, &data)
    }

    fn expect_type(&self, expected: PageType) -> StorageResult<()> {
        if self.header.page_type != expected {
            return Err(StorageError::MalformedTree(format!(
                "page {} is {:?}, expected {:?}",
                self.page_id, self.header.page_type, expected
            )));
        }
        Ok(())
    }
}
