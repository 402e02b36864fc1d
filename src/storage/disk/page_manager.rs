use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const PAGE_SIZE: usize = 512;

/// Owner of the table file. Every page reads and writes through this one handle at
/// `page_number * PAGE_SIZE + offset`.
pub struct PageManager {
    file: File,
    sync_on_write: bool,
}

impl PageManager {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            sync_on_write: false,
        })
    }

    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            sync_on_write: false,
        })
    }

    /// Fsync after every write instead of only on [`PageManager::sync`].
    pub fn set_sync_on_write(&mut self, sync_on_write: bool) {
        self.sync_on_write = sync_on_write;
    }

    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> StorageResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidPageAccess {
                page_id,
                offset: 0,
                len: buf.len(),
            });
        }
        self.read_at(page_id, 0, buf)
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::InvalidPageAccess {
                page_id,
                offset: 0,
                len: data.len(),
            });
        }
        self.write_at(page_id, 0, data)
    }

    /// Read `buf.len()` bytes starting at `offset` inside the page.
    pub fn read_at(&self, page_id: PageId, offset: usize, buf: &mut [u8]) -> StorageResult<()> {
        Self::check_bounds(page_id, offset, buf.len())?;

        let position = Self::page_offset(page_id) + offset as u64;
        let file_size = self.file.metadata()?.len();
        if position + buf.len() as u64 > file_size {
            return Err(StorageError::PageNotFound(page_id));
        }

        // &File implements Read + Seek, so reads don't need exclusive access
        let mut file = &self.file;
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(buf)?;

        Ok(())
    }

    /// Write `data` starting at `offset` inside the page. Writing past the end of the file
    /// extends it.
    pub fn write_at(&mut self, page_id: PageId, offset: usize, data: &[u8]) -> StorageResult<()> {
        Self::check_bounds(page_id, offset, data.len())?;

        let position = Self::page_offset(page_id) + offset as u64;
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(data)?;

        if self.sync_on_write {
            self.file.sync_all()?;
        }

        Ok(())
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn check_bounds(page_id: PageId, offset: usize, len: usize) -> StorageResult<()> {
        if offset + len > PAGE_SIZE {
            return Err(StorageError::InvalidPageAccess {
                page_id,
                offset,
                len,
            });
        }
        Ok(())
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.0 as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn page_of(fill: u8) -> Vec<u8> {
        vec![fill; PAGE_SIZE]
    }

    #[test]
    fn test_header_field_update_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("t.tbl");

        {
            let mut pm = PageManager::create(&file_path)?;
            pm.set_sync_on_write(true);
            pm.write_page(PageId(0), &page_of(0))?;
            // a 2-byte header field, the way a parent pointer is rewritten
            pm.write_at(PageId(0), 10, &[0x00, 0x07])?;
        }

        let pm = PageManager::open(&file_path)?;
        assert_eq!(pm.num_pages()?, 1);
        let mut buf = page_of(0xFF);
        pm.read_page(PageId(0), &mut buf)?;
        assert_eq!(&buf[10..12], &[0x00, 0x07]);
        assert!(buf[..10].iter().chain(&buf[12..]).all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_positioned_access_stays_inside_its_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("t.tbl"))?;

        pm.write_page(PageId(0), &page_of(1))?;
        pm.write_page(PageId(1), &page_of(2))?;
        pm.write_page(PageId(2), &page_of(3))?;

        // last bytes of page 1 sit right before the first bytes of page 2 on disk
        pm.write_at(PageId(1), PAGE_SIZE - 2, &[0xAB, 0xCD])?;
        pm.write_at(PageId(2), 0, &[0xEF])?;

        let mut tail = [0u8; 2];
        pm.read_at(PageId(1), PAGE_SIZE - 2, &mut tail)?;
        assert_eq!(tail, [0xAB, 0xCD]);

        let mut buf = page_of(0);
        pm.read_page(PageId(0), &mut buf)?;
        assert!(buf.iter().all(|&b| b == 1));
        pm.read_page(PageId(2), &mut buf)?;
        assert_eq!(buf[0], 0xEF);
        assert!(buf[1..].iter().all(|&b| b == 3));
        Ok(())
    }

    #[test]
    fn test_write_past_end_grows_file() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("t.tbl"))?;
        assert_eq!(pm.num_pages()?, 0);

        pm.write_page(PageId(3), &page_of(9))?;
        assert_eq!(pm.num_pages()?, 4);

        // the gap reads back as zeros
        let mut buf = page_of(0xFF);
        pm.read_page(PageId(1), &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));

        // a partial write past the end makes a partial page that is not counted yet
        pm.write_at(PageId(4), 0, &[1, 2, 3, 4])?;
        assert_eq!(pm.num_pages()?, 4);
        let mut head = [0u8; 4];
        pm.read_at(PageId(4), 0, &mut head)?;
        assert_eq!(head, [1, 2, 3, 4]);
        assert!(matches!(
            pm.read_page(PageId(4), &mut buf),
            Err(StorageError::PageNotFound(PageId(4)))
        ));
        Ok(())
    }

    #[test]
    fn test_write_crossing_page_end_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.tbl");
        let mut pm = PageManager::create(&file_path)?;

        let result = pm.write_at(PageId(0), PAGE_SIZE - 1, &[1, 2]);
        assert!(matches!(
            result,
            Err(StorageError::InvalidPageAccess { offset: 511, len: 2, .. })
        ));

        let mut small_buf = vec![0u8; 100];
        assert!(pm.read_page(PageId(0), &mut small_buf).is_err());
        assert!(pm.write_page(PageId(0), &small_buf).is_err());
        assert_eq!(pm.num_pages()?, 0);

        Ok(())
    }

    #[test]
    fn test_read_nonexistent_page() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.tbl");
        let pm = PageManager::create(&file_path)?;

        let mut buf = vec![0u8; PAGE_SIZE];
        let result = pm.read_page(PageId(10), &mut buf);
        assert!(matches!(result, Err(StorageError::PageNotFound(PageId(10)))));

        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("nonexistent.tbl");

        let result = PageManager::open(&file_path);
        assert!(matches!(result, Err(StorageError::Io(_))));

        Ok(())
    }
}
