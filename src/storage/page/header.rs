//! Fixed 16-byte header at the start of every page.
//!
//! # Layout (big-endian)
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       1     page type (0x0D leaf, 0x05 interior)
//! 1       1     unused
//! 2       2     record count
//! 4       2     cell content start (grows downward from PAGE_SIZE)
//! 6       2     root page number
//! 8       2     right sibling (leaf) / right child (interior), -1 = none
//! 10      2     parent page number, -1 = none
//! 12      4     reserved
//! ```

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageType};
use crate::storage::PAGE_SIZE;
use byteorder::{BigEndian, ByteOrder};

pub const HEADER_SIZE: usize = 16;

const PAGE_TYPE_OFFSET: usize = 0;
const RECORD_COUNT_OFFSET: usize = 2;
const CELL_CONTENT_START_OFFSET: usize = 4;
const ROOT_PAGE_OFFSET: usize = 6;
const RIGHT_POINTER_OFFSET: usize = 8;
const PARENT_OFFSET: usize = 10;

const NO_PAGE: i16 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub record_count: u16,
    pub cell_content_start: u16,
    pub root_page: Option<PageId>,
    /// Right sibling for leaves, right-most child for interior pages.
    pub right_pointer: Option<PageId>,
    pub parent: Option<PageId>,
}

impl PageHeader {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            record_count: 0,
            cell_content_start: PAGE_SIZE as u16,
            root_page: None,
            right_pointer: None,
            parent: None,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[PAGE_TYPE_OFFSET] = self.page_type as u8;
        BigEndian::write_u16(&mut bytes[RECORD_COUNT_OFFSET..], self.record_count);
        BigEndian::write_u16(
            &mut bytes[CELL_CONTENT_START_OFFSET..],
            self.cell_content_start,
        );
        BigEndian::write_i16(&mut bytes[ROOT_PAGE_OFFSET..], encode_page(self.root_page));
        BigEndian::write_i16(
            &mut bytes[RIGHT_POINTER_OFFSET..],
            encode_page(self.right_pointer),
        );
        BigEndian::write_i16(&mut bytes[PARENT_OFFSET..], encode_page(self.parent));
        bytes
    }

    pub fn from_bytes(page_id: PageId, bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StorageError::Corrupted {
                page_id,
                reason: format!("header needs {} bytes, got {}", HEADER_SIZE, bytes.len()),
            });
        }

        let page_type =
            PageType::from_u8(bytes[PAGE_TYPE_OFFSET]).ok_or_else(|| StorageError::Corrupted {
                page_id,
                reason: format!("unknown page type 0x{:02X}", bytes[PAGE_TYPE_OFFSET]),
            })?;

        let cell_content_start = BigEndian::read_u16(&bytes[CELL_CONTENT_START_OFFSET..]);
        if (cell_content_start as usize) < HEADER_SIZE || cell_content_start as usize > PAGE_SIZE {
            return Err(StorageError::Corrupted {
                page_id,
                reason: format!("cell content start {} out of range", cell_content_start),
            });
        }

        Ok(Self {
            page_type,
            record_count: BigEndian::read_u16(&bytes[RECORD_COUNT_OFFSET..]),
            cell_content_start,
            root_page: decode_page(BigEndian::read_i16(&bytes[ROOT_PAGE_OFFSET..])),
            right_pointer: decode_page(BigEndian::read_i16(&bytes[RIGHT_POINTER_OFFSET..])),
            parent: decode_page(BigEndian::read_i16(&bytes[PARENT_OFFSET..])),
        })
    }
}

fn encode_page(page: Option<PageId>) -> i16 {
    page.map(|p| p.0 as i16).unwrap_or(NO_PAGE)
}

fn decode_page(raw: i16) -> Option<PageId> {
    if raw < 0 {
        None
    } else {
        Some(PageId(raw as u16))
    }
}
