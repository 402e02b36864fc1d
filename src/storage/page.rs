pub mod header;
pub mod table_page;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page number inside the table file. Stored on disk as a signed 16-bit value where -1
/// means "no page", so valid numbers stop at [`MAX_PAGE_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u16);

pub const MAX_PAGE_ID: u16 = i16::MAX as u16;

impl PageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page type tag stored in the first byte of every page.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Interior = 0x05,
    Leaf = 0x0D,
}

impl PageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x05 => Some(PageType::Interior),
            0x0D => Some(PageType::Leaf),
            _ => None,
        }
    }
}

pub use header::{PageHeader, HEADER_SIZE};
pub use table_page::{Page, INTERIOR_CELL_SIZE, OFFSET_SIZE};
