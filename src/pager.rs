//! Fixed-size page storage, binary-compatible with the SQLite v3 page 1
//! header layout.
//!
//! All pages, including page 1, live in memory in a `HashMap<PageNum, Vec<u8>>`
//! and are flushed to a single data file on write. There is no free-list or
//! demand paging; every page the catalog or VM touches is already resident.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::RuntimeError;

pub type PageNum = usize;

pub const SCHEMA_ROOT_PAGENUM: PageNum = 1;
const HEADER_SIZE: usize = 100;
const MAGIC: &[u8; 16] = b"SQLite format 3\0";
const FILE_FORMAT_WRITE_VERSION: u8 = 1;
const FILE_FORMAT_READ_VERSION: u8 = 1;
const RESERVED_SPACE: u8 = 0;
const MAX_EMBEDDED_PAYLOAD_FRACTION: u8 = 64;
const MIN_EMBEDDED_PAYLOAD_FRACTION: u8 = 32;
const LEAF_PAYLOAD_FRACTION: u8 = 32;

/// Reads and writes fixed-size pages by number, backed by one data file per
/// database. Page 1 carries the 100-byte SQLite file header in its first
/// 100 bytes; everything after that (and every other page in full) is owned
/// by the catalog/VM layers.
pub struct Pager {
    path: PathBuf,
    page_size: u32,
    pages: RwLock<HashMap<PageNum, Vec<u8>>>,
    next_page: RwLock<PageNum>,
}

impl Pager {
    /// Opens (creating if absent) a database file at `path` with `page_size`
    /// bytes per page, bootstrapping a fresh schema page if the file is new.
    pub fn open(path: impl AsRef<Path>, page_size: u32) -> Result<Self, RuntimeError> {
        let path = path.as_ref().to_path_buf();
        let mut pages = HashMap::new();
        let mut next_page = 2;

        if path.exists() {
            let mut file = std::fs::File::open(&path).map_err(|e| RuntimeError::Page(e.to_string()))?;
            let len = file
                .metadata()
                .map_err(|e| RuntimeError::Page(e.to_string()))?
                .len();
            let num_pages = (len / page_size as u64) as usize;
            for pn in 1..=num_pages {
                let mut buf = vec![0u8; page_size as usize];
                file.seek(SeekFrom::Start((pn - 1) as u64 * page_size as u64))
                    .map_err(|e| RuntimeError::Page(e.to_string()))?;
                file.read_exact(&mut buf)
                    .map_err(|e| RuntimeError::Page(e.to_string()))?;
                pages.insert(pn, buf);
            }
            next_page = num_pages + 1;
        } else {
            let page1 = new_page1(page_size);
            pages.insert(SCHEMA_ROOT_PAGENUM, page1);
        }

        Ok(Self {
            path,
            page_size,
            pages: RwLock::new(pages),
            next_page: RwLock::new(next_page.max(2)),
        })
    }

    /// An in-memory pager with no backing file, for tests.
    pub fn in_memory(page_size: u32) -> Self {
        let mut pages = HashMap::new();
        pages.insert(SCHEMA_ROOT_PAGENUM, new_page1(page_size));
        Self {
            path: PathBuf::new(),
            page_size,
            pages: RwLock::new(pages),
            next_page: RwLock::new(2),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Reads a full copy of `pn`. Returns an empty page of `page_size` bytes
    /// if the page has never been written (a fresh leaf page).
    pub fn read_page(&self, pn: PageNum) -> Vec<u8> {
        self.pages
            .read()
            .get(&pn)
            .cloned()
            .unwrap_or_else(|| vec![0u8; self.page_size as usize])
    }

    /// Overwrites `pn` in place.
    pub fn write_page(&self, pn: PageNum, data: Vec<u8>) {
        self.pages.write().insert(pn, data);
    }

    /// Allocates the next unused page number for a new table's root page.
    pub fn allocate_page(&self) -> PageNum {
        let mut next = self.next_page.write();
        let pn = *next;
        *next += 1;
        self.pages
            .write()
            .insert(pn, vec![0u8; self.page_size as usize]);
        pn
    }

    /// Persists all resident pages to the backing file, in page order.
    pub fn flush(&self) -> Result<(), RuntimeError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| RuntimeError::Page(e.to_string()))?;
        let pages = self.pages.read();
        let mut sorted: Vec<_> = pages.keys().copied().collect();
        sorted.sort_unstable();
        for pn in sorted {
            let data = &pages[&pn];
            file.seek(SeekFrom::Start((pn - 1) as u64 * self.page_size as u64))
                .map_err(|e| RuntimeError::Page(e.to_string()))?;
            file.write_all(data).map_err(|e| RuntimeError::Page(e.to_string()))?;
        }
        Ok(())
    }
}

/// Builds a fresh page 1: the 100-byte SQLite-compatible header followed by
/// an empty leaf page body (no schema rows yet).
fn new_page1(page_size: u32) -> Vec<u8> {
    let mut page = vec![0u8; page_size as usize];
    let hdr = &mut page[..HEADER_SIZE];
    hdr[0..16].copy_from_slice(MAGIC);
    hdr[16..18].copy_from_slice(&(page_size as u16).to_be_bytes());
    hdr[18] = FILE_FORMAT_WRITE_VERSION;
    hdr[19] = FILE_FORMAT_READ_VERSION;
    hdr[20] = RESERVED_SPACE;
    hdr[21] = MAX_EMBEDDED_PAYLOAD_FRACTION;
    hdr[22] = MIN_EMBEDDED_PAYLOAD_FRACTION;
    hdr[23] = LEAF_PAYLOAD_FRACTION;
    // file-change-counter, schema-cookie and the rest stay zero until a
    // writer actually increments them; we don't maintain those counters.
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pager_has_valid_page1_header() {
        let pager = Pager::in_memory(4096);
        let page1 = pager.read_page(SCHEMA_ROOT_PAGENUM);
        assert_eq!(&page1[0..16], MAGIC);
        assert_eq!(u16::from_be_bytes([page1[16], page1[17]]), 4096);
    }

    #[test]
    fn allocate_page_hands_out_increasing_numbers() {
        let pager = Pager::in_memory(4096);
        let a = pager.allocate_page();
        let b = pager.allocate_page();
        assert_eq!(a, 2);
        assert_eq!(b, 3);
    }

    #[test]
    fn write_then_read_round_trips() {
        let pager = Pager::in_memory(4096);
        let pn = pager.allocate_page();
        let mut data = vec![0u8; 4096];
        data[0] = 42;
        pager.write_page(pn, data.clone());
        assert_eq!(pager.read_page(pn), data);
    }

    #[test]
    fn flush_and_reopen_round_trips_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pager = Pager::open(&path, 4096).unwrap();
        let pn = pager.allocate_page();
        pager.write_page(pn, vec![7u8; 4096]);
        pager.flush().unwrap();

        let reopened = Pager::open(&path, 4096).unwrap();
        assert_eq!(reopened.read_page(pn), vec![7u8; 4096]);
    }
}
