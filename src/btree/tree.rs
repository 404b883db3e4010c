use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::btree::overflow;
use crate::btree::page::{
    Element, Page, ELEM_OVERFLOW, FLAG_BRANCH, FLAG_LEAF, PAGE_HEADER_SIZE, SAFETY_MARGIN,
    SLOT_SIZE,
};
use crate::btree::pager::{PageManager, DEFAULT_PAGE_SIZE};
use crate::engine::{project_fields, StorageEngine};
use crate::error::{JparqueError, Result};
use crate::record::{compare_keys, FieldMap, Record};
use crate::value_codec::{decode_fields, encode_fields};

/// Ordered key/value store built on the page manager.
///
/// Leaves hold keys with inline encoded values or 8-byte overflow chain
/// references; branches hold separator keys with 8-byte child page ids.
/// Splits cascade upward, promoting the first key of the new right
/// sibling. Deletion rebuilds the leaf and does not rebalance.
pub struct BTreeEngine {
    pager: PageManager,
    root: u64,
    degree: usize,
    closed: bool,
}

impl BTreeEngine {
    /// Open or create a tree file with the default page size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_page_size(path, DEFAULT_PAGE_SIZE)
    }

    /// Open or create a tree file with an explicit page size.
    pub fn open_with_page_size<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let mut pager = PageManager::open(path, page_size)?;
        let root = Self::load_or_init_root(&mut pager)?;
        let degree = (page_size - PAGE_HEADER_SIZE) / (2 * SLOT_SIZE);
        Ok(Self {
            pager,
            root,
            degree,
            closed: false,
        })
    }

    /// Read the persisted root, validating its role. A missing or corrupt
    /// root is replaced with a fresh leaf.
    fn load_or_init_root(pager: &mut PageManager) -> Result<u64> {
        if let Some(root_id) = pager.root() {
            match pager.read_page(root_id) {
                Ok(page) if page.is_leaf() || page.is_branch() => return Ok(root_id),
                Ok(page) => warn!(
                    "root page {} has invalid role flags {:#06x}, reinitializing",
                    root_id,
                    page.flags()
                ),
                Err(err) => warn!("root page {} unreadable ({}), reinitializing", root_id, err),
            }
        }

        let root_id = pager.allocate_page()?;
        let page = Page::new(root_id, FLAG_LEAF, pager.page_size());
        pager.write_page(&page)?;
        pager.set_root(root_id)?;
        debug!("initialized fresh root leaf {}", root_id);
        Ok(root_id)
    }

    /// Current root page id.
    pub fn root_id(&self) -> u64 {
        self.root
    }

    /// Decode the 8-byte child page id stored in a branch slot.
    fn child_id(page: &Page, index: usize) -> Result<u64> {
        let elem = page.element(index).ok_or(JparqueError::CorruptPage {
            page: page.id(),
            reason: "branch slot out of bounds",
        })?;
        if elem.value.len() != 8 {
            return Err(JparqueError::CorruptPage {
                page: page.id(),
                reason: "branch child pointer is not 8 bytes",
            });
        }
        Ok(BigEndian::read_u64(elem.value))
    }

    /// Pick the child to descend into: the last slot whose separator is
    /// less than or equal to `key`, clamped to slot 0 for keys below every
    /// separator.
    fn child_index_for(page: &Page, key: &[u8]) -> usize {
        match page.search(key) {
            Ok(index) => index,
            Err(0) => 0,
            Err(insert_at) => insert_at - 1,
        }
    }

    /// Walk from the root to the leaf responsible for `key`, recording the
    /// branch page ids along the path.
    fn descend(&mut self, key: &[u8]) -> Result<(Page, Vec<u64>)> {
        let mut path = Vec::new();
        let mut page = self.pager.read_page(self.root)?;

        while page.is_branch() {
            if page.count() == 0 {
                return Err(JparqueError::CorruptPage {
                    page: page.id(),
                    reason: "branch page with no children",
                });
            }
            path.push(page.id());
            let index = Self::child_index_for(&page, key);
            let child = Self::child_id(&page, index)?;
            page = self.pager.read_page(child)?;
        }

        if !page.is_leaf() {
            return Err(JparqueError::InvalidPageRole {
                page: page.id(),
                flags: page.flags(),
            });
        }
        Ok((page, path))
    }

    /// Resolve an element's value bytes, following an overflow chain when
    /// the element carries one.
    fn element_bytes(&mut self, elem: &Element<'_>) -> Result<Vec<u8>> {
        if elem.has_overflow() {
            let head = elem.overflow_head().ok_or(JparqueError::CorruptPage {
                page: 0,
                reason: "overflow element value is not an 8-byte reference",
            })?;
            overflow::read_chain(&mut self.pager, head)
        } else {
            Ok(elem.value.to_vec())
        }
    }

    /// Largest key accepted: a leaf must fit at least two entries, each
    /// with a directory slot and an overflow reference as its value.
    fn max_key_size(&self) -> usize {
        (self.pager.page_size() - PAGE_HEADER_SIZE) / 2 - SLOT_SIZE - 8 - SAFETY_MARGIN
    }

    /// Write or replace one record.
    pub fn write(&mut self, key: &[u8], fields: FieldMap) -> Result<()> {
        if key.len() > self.max_key_size() {
            return Err(JparqueError::KeyTooLarge {
                actual: key.len(),
                max: self.max_key_size(),
            });
        }
        let encoded = encode_fields(&fields)?;
        if encoded.len() > overflow::MAX_CHAIN_BYTES {
            return Err(JparqueError::OverflowTooLarge {
                limit: overflow::MAX_CHAIN_BYTES,
            });
        }

        let (mut leaf, path) = self.descend(key)?;

        // Remember the old overflow chain, if any; it is released only
        // after the replacement lands.
        let existing = leaf.search(key).ok();
        let old_chain = existing
            .and_then(|i| leaf.element(i))
            .and_then(|e| e.overflow_head());
        let old_inline_len = existing
            .and_then(|i| leaf.element(i))
            .map(|e| e.value.len());

        // Maximum inline budget for this leaf: remaining free space, less
        // the directory slot and key bytes a new entry would claim, less
        // the safety margin.
        let mut budget = leaf.free_space();
        if existing.is_none() {
            budget = budget.saturating_sub(SLOT_SIZE + key.len());
        }
        let budget = budget.saturating_sub(SAFETY_MARGIN);

        // Same-length in-place updates need no free space at all.
        let fits_inline = encoded.len() <= budget || old_inline_len == Some(encoded.len());

        if fits_inline && old_chain.is_none() {
            if leaf.put_element(key, &encoded, false)? {
                self.pager.write_page(&leaf)?;
                return Ok(());
            }
            // Page full: split with the inline value.
            return self.split_and_insert(leaf, path, key, encoded, 0);
        }

        // The value needs an overflow chain. An existing inline entry of a
        // different length cannot be re-slotted, so fail before allocating.
        if let (Some(len), None) = (old_inline_len, old_chain) {
            if len != 8 {
                return Err(JparqueError::ValueLengthChanged { old: len, new: 8 });
            }
        }

        let head = overflow::write_chain(&mut self.pager, &encoded)?;
        let mut reference = [0u8; 8];
        BigEndian::write_u64(&mut reference, head);

        match leaf.put_element(key, &reference, true) {
            Ok(true) => {
                self.pager.write_page(&leaf)?;
                if let Some(old) = old_chain {
                    overflow::free_chain(&mut self.pager, old)?;
                }
                Ok(())
            }
            Ok(false) => self.split_and_insert(leaf, path, key, reference.to_vec(), ELEM_OVERFLOW),
            Err(err) => {
                overflow::free_chain(&mut self.pager, head)?;
                Err(err)
            }
        }
    }

    /// Split a full page and insert the pending entry, cascading up the
    /// remembered branch path.
    fn split_and_insert(
        &mut self,
        page: Page,
        path: Vec<u64>,
        key: &[u8],
        value: Vec<u8>,
        elem_flags: u32,
    ) -> Result<()> {
        let mut entries = page.entries();
        let insert_at = entries
            .binary_search_by(|(k, _, _)| compare_keys(k, key))
            .unwrap_or_else(|i| i);
        entries.insert(insert_at, (key.to_vec(), value, elem_flags));

        self.split_entries(page, path, entries)
    }

    /// Partition `entries` across the existing page and a fresh right
    /// sibling, then promote the right sibling's first key.
    fn split_entries(
        &mut self,
        page: Page,
        path: Vec<u64>,
        entries: Vec<(Vec<u8>, Vec<u8>, u32)>,
    ) -> Result<()> {
        let page_size = self.pager.page_size();
        let role_flags = page.flags();
        let is_leaf = page.is_leaf();

        if entries.len() < 2 {
            return Err(JparqueError::CorruptPage {
                page: page.id(),
                reason: "split of a page with fewer than two entries",
            });
        }
        let split_at = (self.degree / 2).clamp(1, entries.len() - 1);
        let right_id = self.pager.allocate_page()?;

        let mut left = Page::new(page.id(), role_flags, page_size);
        let mut right = Page::new(right_id, role_flags, page_size);
        if is_leaf {
            // Leaves chain to their right sibling through the successor
            // field; the new sibling inherits the old link.
            right.set_successor(page.successor());
            left.set_successor(right_id as u32);
        }

        for (k, v, f) in &entries[..split_at] {
            Self::rebuild_put(&mut left, k, v, *f)?;
        }
        for (k, v, f) in &entries[split_at..] {
            Self::rebuild_put(&mut right, k, v, *f)?;
        }

        self.pager.write_page(&left)?;
        self.pager.write_page(&right)?;

        let separator = entries[split_at].0.clone();
        debug!(
            "split page {} -> {} + {} at key {:?}",
            left.id(),
            left.id(),
            right_id,
            String::from_utf8_lossy(&separator)
        );
        self.insert_into_parent(path, &left, separator, right_id)
    }

    /// Re-insert an entry while rebuilding a page. Failure here means the
    /// partition did not fit, which a well-formed split cannot produce.
    fn rebuild_put(page: &mut Page, key: &[u8], value: &[u8], flags: u32) -> Result<()> {
        if !page.put_element(key, value, flags & ELEM_OVERFLOW != 0)? {
            return Err(JparqueError::CorruptPage {
                page: page.id(),
                reason: "page rebuild exceeded capacity",
            });
        }
        Ok(())
    }

    /// Attach a newly split-off right sibling to the parent branch,
    /// creating a new root when the split reached the top.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<u64>,
        left: &Page,
        separator: Vec<u8>,
        right_id: u64,
    ) -> Result<()> {
        let mut right_ref = [0u8; 8];
        BigEndian::write_u64(&mut right_ref, right_id);

        let parent_id = match path.pop() {
            Some(id) => id,
            None => {
                // The root itself split: grow the tree by one level.
                let new_root_id = self.pager.allocate_page()?;
                let mut root = Page::new(new_root_id, FLAG_BRANCH, self.pager.page_size());

                let left_key = left
                    .element(0)
                    .ok_or(JparqueError::CorruptPage {
                        page: left.id(),
                        reason: "split left page is empty",
                    })?
                    .key
                    .to_vec();
                let mut left_ref = [0u8; 8];
                BigEndian::write_u64(&mut left_ref, left.id());

                Self::rebuild_put(&mut root, &left_key, &left_ref, 0)?;
                Self::rebuild_put(&mut root, &separator, &right_ref, 0)?;
                self.pager.write_page(&root)?;
                self.pager.set_root(new_root_id)?;
                self.root = new_root_id;
                debug!("grew tree: new root branch {}", new_root_id);
                return Ok(());
            }
        };

        let mut parent = self.pager.read_page(parent_id)?;
        if parent.put_element(&separator, &right_ref, false)? {
            self.pager.write_page(&parent)
        } else {
            self.split_and_insert(parent, path, &separator, right_ref.to_vec(), 0)
        }
    }

    /// Read the record stored under `key`.
    pub fn read(&mut self, key: &[u8]) -> Result<Option<FieldMap>> {
        let (leaf, _) = self.descend(key)?;
        let index = match leaf.search(key) {
            Ok(index) => index,
            Err(_) => return Ok(None),
        };
        let elem = leaf.element(index).ok_or(JparqueError::CorruptPage {
            page: leaf.id(),
            reason: "directory slot out of bounds",
        })?;
        let bytes = self.element_bytes(&elem)?;
        Ok(Some(decode_fields(&bytes)))
    }

    /// Ordered range scan over `[start, end]` (inclusive end bound, or to
    /// the end of the keyspace when `end` is `None`), following leaf
    /// sibling links across page boundaries.
    pub fn scan(
        &mut self,
        start: &[u8],
        end: Option<&[u8]>,
        columns: Option<&[String]>,
    ) -> Result<Vec<Record>> {
        let (mut leaf, _) = self.descend(start)?;
        let mut index = leaf.search(start).unwrap_or_else(|i| i);
        let mut records = Vec::new();

        loop {
            while index < leaf.count() {
                let (key, flags, inline) = match leaf.element(index) {
                    Some(elem) => (elem.key.to_vec(), elem.flags, elem.value.to_vec()),
                    None => {
                        return Err(JparqueError::CorruptPage {
                            page: leaf.id(),
                            reason: "directory slot out of bounds",
                        })
                    }
                };

                if compare_keys(&key, start) == std::cmp::Ordering::Less {
                    index += 1;
                    continue;
                }
                if let Some(end_key) = end {
                    if compare_keys(&key, end_key) == std::cmp::Ordering::Greater {
                        return Ok(records);
                    }
                }

                let bytes = if flags & ELEM_OVERFLOW != 0 {
                    let head = BigEndian::read_u64(&inline);
                    overflow::read_chain(&mut self.pager, head)?
                } else {
                    inline
                };
                let fields = project_fields(&decode_fields(&bytes), columns);
                records.push(Record::new(key, fields));
                index += 1;
            }

            let sibling = leaf.successor() as u64;
            if sibling == 0 {
                return Ok(records);
            }
            leaf = self.pager.read_page(sibling)?;
            if !leaf.is_leaf() {
                return Err(JparqueError::InvalidPageRole {
                    page: leaf.id(),
                    flags: leaf.flags(),
                });
            }
            index = 0;
        }
    }

    /// Remove `key` if present. The leaf is rebuilt from its remaining
    /// entries; no rebalancing takes place.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let (leaf, _) = self.descend(key)?;
        let index = match leaf.search(key) {
            Ok(index) => index,
            Err(_) => return Ok(()),
        };

        let old_chain = leaf.element(index).and_then(|e| e.overflow_head());

        let mut rebuilt = Page::new(leaf.id(), leaf.flags(), self.pager.page_size());
        rebuilt.set_successor(leaf.successor());
        for (i, (k, v, f)) in leaf.entries().into_iter().enumerate() {
            if i != index {
                Self::rebuild_put(&mut rebuilt, &k, &v, f)?;
            }
        }
        self.pager.write_page(&rebuilt)?;

        if let Some(head) = old_chain {
            overflow::free_chain(&mut self.pager, head)?;
        }
        Ok(())
    }

    /// Apply a batch of writes sequentially.
    pub fn write_batch(&mut self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.write(&record.key, record.fields)?;
        }
        Ok(())
    }

    /// Sync and close the underlying page manager. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pager.close()
    }
}

impl StorageEngine for BTreeEngine {
    fn write(&mut self, key: &[u8], fields: FieldMap) -> Result<()> {
        BTreeEngine::write(self, key, fields)
    }

    fn write_batch(&mut self, records: Vec<Record>) -> Result<()> {
        BTreeEngine::write_batch(self, records)
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<FieldMap>> {
        BTreeEngine::read(self, key)
    }

    /// `end` is inclusive for the B+Tree engine.
    fn scan(
        &mut self,
        start: &[u8],
        end: Option<&[u8]>,
        columns: Option<&[String]>,
    ) -> Result<Vec<Record>> {
        BTreeEngine::scan(self, start, end, columns)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        BTreeEngine::delete(self, key)
    }

    fn close(&mut self) -> Result<()> {
        BTreeEngine::close(self)
    }
}
