use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::error::{JparqueError, Result};
use crate::record::compare_keys;

/// Size of the fixed page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 16;
/// Size of one directory slot in bytes.
pub const SLOT_SIZE: usize = 16;
/// Extra bytes an insertion must leave free beyond slot + key + value.
pub const SAFETY_MARGIN: usize = 8;

// Header layout (big-endian): id u64, flags u16, count u16, overflow u32.
const OFF_ID: usize = 0;
const OFF_FLAGS: usize = 8;
const OFF_COUNT: usize = 10;
const OFF_OVERFLOW: usize = 12;

// Slot layout (big-endian): position u32, element flags u32,
// key size u32, value size u32.
const SLOT_OFF_POS: usize = 0;
const SLOT_OFF_FLAGS: usize = 4;
const SLOT_OFF_KEY_SIZE: usize = 8;
const SLOT_OFF_VALUE_SIZE: usize = 12;

/// Page role bits in the header flags field.
pub const FLAG_BRANCH: u16 = 0x01;
pub const FLAG_LEAF: u16 = 0x02;
pub const FLAG_META: u16 = 0x04;
pub const FLAG_FREELIST: u16 = 0x08;
pub const FLAG_OVERFLOW: u16 = 0x10;

/// Element flag bit: value is an 8-byte reference to an overflow chain.
pub const ELEM_OVERFLOW: u32 = 0x01;

/// Role of a page, decoded from its header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageRole {
    Branch,
    Leaf,
    Meta,
    Freelist,
    Overflow,
    Unknown,
}

impl PageRole {
    pub fn from_flags(flags: u16) -> Self {
        match flags & (FLAG_BRANCH | FLAG_LEAF | FLAG_META | FLAG_FREELIST | FLAG_OVERFLOW) {
            FLAG_BRANCH => PageRole::Branch,
            FLAG_LEAF => PageRole::Leaf,
            FLAG_META => PageRole::Meta,
            FLAG_FREELIST => PageRole::Freelist,
            FLAG_OVERFLOW => PageRole::Overflow,
            _ => PageRole::Unknown,
        }
    }
}

/// Handle over one directory entry of a page.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    pub position: u32,
    pub flags: u32,
}

impl<'a> Element<'a> {
    pub fn key_size(&self) -> usize {
        self.key.len()
    }

    pub fn value_size(&self) -> usize {
        self.value.len()
    }

    pub fn has_overflow(&self) -> bool {
        self.flags & ELEM_OVERFLOW != 0
    }

    /// Decode the value region as an overflow chain head id.
    pub fn overflow_head(&self) -> Option<u64> {
        if self.has_overflow() && self.value.len() == 8 {
            Some(BigEndian::read_u64(self.value))
        } else {
            None
        }
    }
}

/// A fixed-size slotted page.
///
/// The directory of 16-byte slots grows forward from the header; key and
/// value payloads grow backward from the end of the page. For each element
/// the value bytes sit immediately below the key bytes, and the slot
/// position points at the first key byte.
#[derive(Debug, Clone)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    /// Create a zeroed page with the given id and role flags.
    pub fn new(id: u64, flags: u16, page_size: usize) -> Self {
        let mut page = Page {
            data: vec![0u8; page_size],
        };
        page.set_id(id);
        page.set_flags(flags);
        page
    }

    /// Wrap raw page bytes read from disk.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(JparqueError::UnexpectedEof {
                context: "page header",
            });
        }
        Ok(Page { data })
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn id(&self) -> u64 {
        BigEndian::read_u64(&self.data[OFF_ID..OFF_ID + 8])
    }

    pub fn set_id(&mut self, id: u64) {
        BigEndian::write_u64(&mut self.data[OFF_ID..OFF_ID + 8], id);
    }

    pub fn flags(&self) -> u16 {
        BigEndian::read_u16(&self.data[OFF_FLAGS..OFF_FLAGS + 2])
    }

    pub fn set_flags(&mut self, flags: u16) {
        BigEndian::write_u16(&mut self.data[OFF_FLAGS..OFF_FLAGS + 2], flags);
    }

    pub fn count(&self) -> usize {
        BigEndian::read_u16(&self.data[OFF_COUNT..OFF_COUNT + 2]) as usize
    }

    pub fn set_count(&mut self, count: u16) {
        BigEndian::write_u16(&mut self.data[OFF_COUNT..OFF_COUNT + 2], count);
    }

    /// The 4-byte successor field. Overflow pages link the next chain page
    /// here; leaves reuse it as the right-sibling page id.
    pub fn successor(&self) -> u32 {
        BigEndian::read_u32(&self.data[OFF_OVERFLOW..OFF_OVERFLOW + 4])
    }

    pub fn set_successor(&mut self, id: u32) {
        BigEndian::write_u32(&mut self.data[OFF_OVERFLOW..OFF_OVERFLOW + 4], id);
    }

    pub fn role(&self) -> PageRole {
        PageRole::from_flags(self.flags())
    }

    pub fn is_leaf(&self) -> bool {
        self.flags() & FLAG_LEAF != 0
    }

    pub fn is_branch(&self) -> bool {
        self.flags() & FLAG_BRANCH != 0
    }

    pub fn is_meta(&self) -> bool {
        self.flags() & FLAG_META != 0
    }

    pub fn is_freelist(&self) -> bool {
        self.flags() & FLAG_FREELIST != 0
    }

    pub fn is_overflow(&self) -> bool {
        self.flags() & FLAG_OVERFLOW != 0
    }

    fn slot_offset(&self, index: usize) -> usize {
        PAGE_HEADER_SIZE + index * SLOT_SIZE
    }

    fn slot_field(&self, index: usize, field: usize) -> u32 {
        let off = self.slot_offset(index) + field;
        BigEndian::read_u32(&self.data[off..off + 4])
    }

    fn write_slot(&mut self, index: usize, position: u32, flags: u32, key_size: u32, value_size: u32) {
        let off = self.slot_offset(index);
        BigEndian::write_u32(&mut self.data[off + SLOT_OFF_POS..off + SLOT_OFF_POS + 4], position);
        BigEndian::write_u32(&mut self.data[off + SLOT_OFF_FLAGS..off + SLOT_OFF_FLAGS + 4], flags);
        BigEndian::write_u32(
            &mut self.data[off + SLOT_OFF_KEY_SIZE..off + SLOT_OFF_KEY_SIZE + 4],
            key_size,
        );
        BigEndian::write_u32(
            &mut self.data[off + SLOT_OFF_VALUE_SIZE..off + SLOT_OFF_VALUE_SIZE + 4],
            value_size,
        );
    }

    /// Handle over the i-th directory entry.
    ///
    /// Returns `None` when the index is out of range or the slot describes
    /// a payload that does not fit inside the page.
    pub fn element(&self, index: usize) -> Option<Element<'_>> {
        if index >= self.count() {
            return None;
        }
        if self.slot_offset(index) + SLOT_SIZE > self.data.len() {
            return None;
        }

        let position = self.slot_field(index, SLOT_OFF_POS);
        let flags = self.slot_field(index, SLOT_OFF_FLAGS);
        let key_size = self.slot_field(index, SLOT_OFF_KEY_SIZE) as usize;
        let value_size = self.slot_field(index, SLOT_OFF_VALUE_SIZE) as usize;

        let pos = position as usize;
        if pos + key_size > self.data.len() || pos < value_size {
            return None;
        }

        Some(Element {
            key: &self.data[pos..pos + key_size],
            value: &self.data[pos - value_size..pos],
            position,
            flags,
        })
    }

    /// Lowest byte offset occupied by any payload, or the page end when
    /// the page is empty.
    fn payload_floor(&self) -> usize {
        let mut floor = self.data.len();
        for i in 0..self.count() {
            let pos = self.slot_field(i, SLOT_OFF_POS) as usize;
            let value_size = self.slot_field(i, SLOT_OFF_VALUE_SIZE) as usize;
            floor = floor.min(pos.saturating_sub(value_size));
        }
        floor
    }

    /// Bytes unused between the end of the directory and the lowest
    /// payload byte.
    pub fn free_space(&self) -> usize {
        let directory_end = PAGE_HEADER_SIZE + self.count() * SLOT_SIZE;
        self.payload_floor().saturating_sub(directory_end)
    }

    /// Binary-search the directory for `key`.
    ///
    /// `Ok(i)` when slot i holds the key, `Err(i)` with the insertion
    /// index that keeps the directory sorted.
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        let mut lo = 0usize;
        let mut hi = self.count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let mid_key = match self.element(mid) {
                Some(e) => e.key,
                None => return Err(lo),
            };
            match compare_keys(mid_key, key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Insert or update an element, keeping the directory sorted.
    ///
    /// Updating an existing key requires the new value to have the same
    /// length as the stored one; a different length fails with
    /// `ValueLengthChanged`. A new element that does not fit returns
    /// `Ok(false)` without mutating the page.
    pub fn put_element(&mut self, key: &[u8], value: &[u8], has_overflow: bool) -> Result<bool> {
        let elem_flags = if has_overflow { ELEM_OVERFLOW } else { 0 };

        match self.search(key) {
            Ok(index) => {
                let (position, old_len) = {
                    let elem = self.element(index).ok_or(JparqueError::CorruptPage {
                        page: self.id(),
                        reason: "directory slot out of bounds",
                    })?;
                    (elem.position as usize, elem.value.len())
                };
                if old_len != value.len() {
                    return Err(JparqueError::ValueLengthChanged {
                        old: old_len,
                        new: value.len(),
                    });
                }
                self.data[position - value.len()..position].copy_from_slice(value);
                let key_size = self.slot_field(index, SLOT_OFF_KEY_SIZE);
                self.write_slot(index, position as u32, elem_flags, key_size, value.len() as u32);
                Ok(true)
            }
            Err(index) => {
                let needed = SLOT_SIZE + key.len() + value.len() + SAFETY_MARGIN;
                if self.free_space() < needed {
                    return Ok(false);
                }

                // New payload sits contiguously below the lowest existing
                // payload block: value first (lower addresses), key above it.
                let floor = self.payload_floor();
                let position = floor - key.len();
                let value_start = position - value.len();
                self.data[position..position + key.len()].copy_from_slice(key);
                self.data[value_start..position].copy_from_slice(value);

                // Shift directory entries at `index` and above right by one.
                let count = self.count();
                let start = self.slot_offset(index);
                let end = self.slot_offset(count);
                self.data.copy_within(start..end, start + SLOT_SIZE);

                self.write_slot(
                    index,
                    position as u32,
                    elem_flags,
                    key.len() as u32,
                    value.len() as u32,
                );
                self.set_count(count as u16 + 1);
                Ok(true)
            }
        }
    }

    /// Copy every element out of the page as owned
    /// `(key, value, flags)` triples, in directory order.
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>, u32)> {
        (0..self.count())
            .filter_map(|i| self.element(i))
            .map(|e| (e.key.to_vec(), e.value.to_vec(), e.flags))
            .collect()
    }

    /// Write raw payload bytes immediately after the header. Used by
    /// overflow pages, whose body is one contiguous chunk.
    pub fn write_payload(&mut self, chunk: &[u8]) {
        self.data[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + chunk.len()].copy_from_slice(chunk);
    }

    /// Reset the directory and payload area, keeping id, flags and the
    /// successor link.
    pub fn clear_elements(&mut self) {
        let len = self.data.len();
        self.data[PAGE_HEADER_SIZE..len].fill(0);
        self.set_count(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_SIZE: usize = 4096;

    fn leaf() -> Page {
        Page::new(7, FLAG_LEAF, PAGE_SIZE)
    }

    #[test]
    fn test_header_round_trip() {
        let mut page = Page::new(42, FLAG_BRANCH, PAGE_SIZE);
        page.set_successor(9);
        assert_eq!(page.id(), 42);
        assert_eq!(page.role(), PageRole::Branch);
        assert_eq!(page.successor(), 9);
        assert_eq!(page.count(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE - PAGE_HEADER_SIZE);
    }

    #[test]
    fn test_put_and_get_single_element() {
        let mut page = leaf();
        assert!(page.put_element(b"alpha", b"value-1", false).unwrap());
        assert_eq!(page.count(), 1);

        let elem = page.element(0).unwrap();
        assert_eq!(elem.key, b"alpha");
        assert_eq!(elem.value, b"value-1");
        assert!(!elem.has_overflow());

        // Position points at the first key byte; the value sits below it.
        assert_eq!(elem.position as usize, PAGE_SIZE - 5);
    }

    #[test]
    fn test_elements_stay_sorted() {
        let mut page = leaf();
        for key in [&b"mango"[..], b"apple", b"zebra", b"kiwi"] {
            assert!(page.put_element(key, b"x", false).unwrap());
        }
        let keys: Vec<&[u8]> = (0..page.count()).map(|i| page.element(i).unwrap().key).collect();
        assert_eq!(keys, vec![&b"apple"[..], b"kiwi", b"mango", b"zebra"]);
    }

    #[test]
    fn test_accounting_invariant() {
        let mut page = leaf();
        let mut payload = 0usize;
        for i in 0..10 {
            let key = format!("key-{:03}", i);
            let value = format!("value-{:03}", i);
            assert!(page.put_element(key.as_bytes(), value.as_bytes(), false).unwrap());
            payload += key.len() + value.len();
        }
        let used = PAGE_HEADER_SIZE + page.count() * SLOT_SIZE + payload;
        assert!(used <= PAGE_SIZE);
        assert_eq!(page.free_space(), PAGE_SIZE - used);
    }

    #[test]
    fn test_same_length_update_in_place() {
        let mut page = leaf();
        assert!(page.put_element(b"k", b"aaaa", false).unwrap());
        assert!(page.put_element(b"k", b"bbbb", false).unwrap());
        assert_eq!(page.count(), 1);
        assert_eq!(page.element(0).unwrap().value, b"bbbb");
    }

    #[test]
    fn test_different_length_update_fails() {
        let mut page = leaf();
        assert!(page.put_element(b"k", b"aaaa", false).unwrap());
        let err = page.put_element(b"k", b"aaaaa", false).unwrap_err();
        assert!(matches!(err, JparqueError::ValueLengthChanged { old: 4, new: 5 }));
        // Page untouched.
        assert_eq!(page.element(0).unwrap().value, b"aaaa");
    }

    #[test]
    fn test_update_can_toggle_overflow_flag() {
        let mut page = leaf();
        assert!(page.put_element(b"k", &[0u8; 8], false).unwrap());
        assert!(!page.element(0).unwrap().has_overflow());
        assert!(page.put_element(b"k", &5u64.to_be_bytes(), true).unwrap());
        let elem = page.element(0).unwrap();
        assert!(elem.has_overflow());
        assert_eq!(elem.overflow_head(), Some(5));
    }

    #[test]
    fn test_full_page_rejects_without_mutation() {
        let mut page = Page::new(1, FLAG_LEAF, 128);
        // 128 - 16 header leaves 112 bytes; each entry takes 16 + 8 = 24
        // plus the margin check.
        let mut inserted = 0;
        for i in 0..10 {
            let key = format!("kk-{:02}", i);
            if page.put_element(key.as_bytes(), b"vvv", false).unwrap() {
                inserted += 1;
            } else {
                break;
            }
        }
        assert!(inserted > 0 && inserted < 10);
        let count_before = page.count();
        let free_before = page.free_space();
        assert!(!page.put_element(b"zz-99", b"vvv", false).unwrap());
        assert_eq!(page.count(), count_before);
        assert_eq!(page.free_space(), free_before);
    }

    #[test]
    fn test_element_out_of_range_returns_none() {
        let page = leaf();
        assert!(page.element(0).is_none());
        assert!(page.element(100).is_none());
    }

    #[test]
    fn test_malformed_slot_returns_none() {
        let mut page = leaf();
        assert!(page.put_element(b"k", b"v", false).unwrap());
        // Corrupt the slot position to point past the page end.
        page.write_slot(0, (PAGE_SIZE + 100) as u32, 0, 1, 1);
        assert!(page.element(0).is_none());
    }

    #[test]
    fn test_clear_elements_keeps_header() {
        let mut page = leaf();
        page.set_successor(3);
        assert!(page.put_element(b"k", b"v", false).unwrap());
        page.clear_elements();
        assert_eq!(page.count(), 0);
        assert_eq!(page.id(), 7);
        assert!(page.is_leaf());
        assert_eq!(page.successor(), 3);
        assert_eq!(page.free_space(), PAGE_SIZE - PAGE_HEADER_SIZE);
    }

    #[test]
    fn test_unsigned_key_order_in_page() {
        let mut page = leaf();
        assert!(page.put_element(&[0x80], b"hi", false).unwrap());
        assert!(page.put_element(&[0x7F], b"lo", false).unwrap());
        assert_eq!(page.element(0).unwrap().key, &[0x7F]);
        assert_eq!(page.element(1).unwrap().key, &[0x80]);
    }
}
