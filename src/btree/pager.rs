use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};

use crate::btree::page::Page;
use crate::error::{JparqueError, Result};

/// Default page size chosen at database open.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Smallest page size that can hold a header, one directory slot and a
/// minimal payload.
pub const MIN_PAGE_SIZE: usize = 64;
/// Maximum number of pages held in the in-memory cache.
pub const PAGE_CACHE_CAPACITY: usize = 1000;

// Page 0 is the meta page: next-page-id counter in bytes 0..8, root page
// id in bytes 8..16 (0 = no tree root yet). Both big-endian.
const META_NEXT_ID: usize = 0;
const META_ROOT_ID: usize = 8;
const META_SIZE: usize = 16;

/// Bounded page cache with least-recently-used eviction.
struct PageCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<u64, (Vec<u8>, u64)>,
}

impl PageCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn get(&mut self, id: u64) -> Option<Vec<u8>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&id).map(|(data, used)| {
            *used = tick;
            data.clone()
        })
    }

    fn insert(&mut self, id: u64, data: Vec<u8>) {
        self.tick += 1;
        if !self.entries.contains_key(&id) && self.entries.len() >= self.capacity {
            if let Some((&victim, _)) = self.entries.iter().min_by_key(|(_, (_, used))| *used) {
                self.entries.remove(&victim);
                trace!("page cache full, evicted page {}", victim);
            }
        }
        self.entries.insert(id, (data, self.tick));
    }
}

/// The only component that performs file I/O for pages and the only
/// authority on page identifiers.
///
/// Page ids start at 1; id 0 is the meta page holding the allocation
/// counter and the root page id. A page with id `i` lives at byte offset
/// `i * page_size`.
pub struct PageManager {
    file: File,
    path: PathBuf,
    page_size: usize,
    next_page_id: u64,
    root_id: u64,
    cache: PageCache,
    closed: bool,
}

impl PageManager {
    /// Open or create the page file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(JparqueError::SizeMismatch {
                context: "page size",
                expected: MIN_PAGE_SIZE,
                actual: page_size,
            });
        }
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        let (next_page_id, root_id) = if file_len == 0 {
            // Fresh file: write the zeroed meta page with counter = 1.
            let mut meta = vec![0u8; page_size];
            BigEndian::write_u64(&mut meta[META_NEXT_ID..META_NEXT_ID + 8], 1);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&meta)?;
            (1, 0)
        } else {
            let mut meta = [0u8; META_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut meta)?;
            let next = BigEndian::read_u64(&meta[META_NEXT_ID..META_NEXT_ID + 8]);
            let root = BigEndian::read_u64(&meta[META_ROOT_ID..META_ROOT_ID + 8]);
            if next == 0 {
                return Err(JparqueError::CorruptPage {
                    page: 0,
                    reason: "next-page-id counter is zero",
                });
            }
            (next, root)
        };

        debug!(
            "opened page file {:?} (page_size={}, next_id={}, root={})",
            path, page_size, next_page_id, root_id
        );

        Ok(Self {
            file,
            path,
            page_size,
            next_page_id,
            root_id,
            cache: PageCache::new(PAGE_CACHE_CAPACITY),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One past the highest allocated page id.
    pub fn next_page_id(&self) -> u64 {
        self.next_page_id
    }

    /// The persisted tree root, or `None` when no root exists yet.
    pub fn root(&self) -> Option<u64> {
        if self.root_id == 0 {
            None
        } else {
            Some(self.root_id)
        }
    }

    /// Persist a new tree root id in the meta page.
    pub fn set_root(&mut self, id: u64) -> Result<()> {
        self.root_id = id;
        self.write_meta()
    }

    fn write_meta(&mut self) -> Result<()> {
        let mut meta = [0u8; META_SIZE];
        BigEndian::write_u64(&mut meta[META_NEXT_ID..META_NEXT_ID + 8], self.next_page_id);
        BigEndian::write_u64(&mut meta[META_ROOT_ID..META_ROOT_ID + 8], self.root_id);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&meta)?;
        Ok(())
    }

    /// Allocate a fresh page id, persist the advanced counter, and write a
    /// zeroed page at the new offset so a subsequent read succeeds.
    pub fn allocate_page(&mut self) -> Result<u64> {
        let id = self.next_page_id;
        self.next_page_id = self
            .next_page_id
            .checked_add(1)
            .ok_or(JparqueError::RootExhausted)?;
        self.write_meta()?;

        let zeroed = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(id * self.page_size as u64))?;
        self.file.write_all(&zeroed)?;
        self.cache.insert(id, zeroed);
        trace!("allocated page {}", id);
        Ok(id)
    }

    /// Read the page with the given id, consulting the cache first.
    pub fn read_page(&mut self, id: u64) -> Result<Page> {
        if id == 0 || id >= self.next_page_id {
            return Err(JparqueError::PageOutOfBounds {
                page: id,
                total: self.next_page_id,
            });
        }

        if let Some(data) = self.cache.get(id) {
            return Page::from_bytes(data);
        }

        let mut data = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(id * self.page_size as u64))?;
        self.file.read_exact(&mut data)?;
        self.cache.insert(id, data.clone());
        Page::from_bytes(data)
    }

    /// Write a page to disk and refresh the cache entry.
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        if page.page_size() != self.page_size {
            return Err(JparqueError::SizeMismatch {
                context: "page write",
                expected: self.page_size,
                actual: page.page_size(),
            });
        }
        let id = page.id();
        if id == 0 || id >= self.next_page_id {
            return Err(JparqueError::PageOutOfBounds {
                page: id,
                total: self.next_page_id,
            });
        }

        self.file.seek(SeekFrom::Start(id * self.page_size as u64))?;
        self.file.write_all(page.as_bytes())?;
        self.cache.insert(id, page.as_bytes().to_vec());
        Ok(())
    }

    /// Flush OS buffers to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Sync and release the file handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.sync()?;
        self.closed = true;
        debug!("closed page file {:?}", self.path);
        Ok(())
    }
}
