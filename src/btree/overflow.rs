//! Overflow chains: singly linked lists of pages storing one large
//! value's bytes.
//!
//! An overflow page reuses the header `count` field as the byte length of
//! its chunk and the successor field as the next page id (0 terminates
//! the chain). Payload starts immediately after the header.

use std::collections::HashSet;

use log::{debug, trace};

use crate::btree::page::{Page, FLAG_FREELIST, FLAG_OVERFLOW, PAGE_HEADER_SIZE};
use crate::btree::pager::PageManager;
use crate::error::{JparqueError, Result};

/// Defensive cap on the total bytes read out of one chain.
pub const MAX_CHAIN_BYTES: usize = 50 * 1024 * 1024;

/// Payload bytes that fit on a single overflow page.
#[inline]
pub fn chunk_capacity(page_size: usize) -> usize {
    page_size - PAGE_HEADER_SIZE
}

/// Write `data` into a freshly allocated overflow chain and return the
/// head page id.
pub fn write_chain(pager: &mut PageManager, data: &[u8]) -> Result<u64> {
    let page_size = pager.page_size();
    let cap = chunk_capacity(page_size);

    let page_count = data.len().div_ceil(cap).max(1);
    let mut ids = Vec::with_capacity(page_count);
    for _ in 0..page_count {
        ids.push(pager.allocate_page()?);
    }

    for (i, &id) in ids.iter().enumerate() {
        let start = i * cap;
        let chunk = &data[start..data.len().min(start + cap)];

        let mut page = Page::new(id, FLAG_OVERFLOW, page_size);
        page.set_count(chunk.len() as u16);
        let next = if i + 1 < ids.len() { ids[i + 1] as u32 } else { 0 };
        page.set_successor(next);
        page.write_payload(chunk);
        pager.write_page(&page)?;
    }

    debug!(
        "wrote overflow chain of {} bytes across {} pages (head {})",
        data.len(),
        ids.len(),
        ids[0]
    );
    Ok(ids[0])
}

/// Read a whole chain back, following successor links until 0.
///
/// Detects cycles with a visited set and refuses chains larger than
/// `MAX_CHAIN_BYTES`.
pub fn read_chain(pager: &mut PageManager, head: u64) -> Result<Vec<u8>> {
    let cap = chunk_capacity(pager.page_size());
    let mut out = Vec::new();
    let mut visited = HashSet::new();

    let mut id = head;
    while id != 0 {
        if !visited.insert(id) {
            return Err(JparqueError::OverflowCycle { page: id });
        }

        let page = pager.read_page(id)?;
        if !page.is_overflow() {
            return Err(JparqueError::InvalidPageRole {
                page: id,
                flags: page.flags(),
            });
        }

        let chunk_len = page.count();
        if chunk_len > cap {
            return Err(JparqueError::CorruptPage {
                page: id,
                reason: "overflow chunk length exceeds page capacity",
            });
        }
        if out.len() + chunk_len > MAX_CHAIN_BYTES {
            return Err(JparqueError::OverflowTooLarge {
                limit: MAX_CHAIN_BYTES,
            });
        }

        out.extend_from_slice(&page.as_bytes()[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + chunk_len]);
        id = page.successor() as u64;
    }

    trace!("read overflow chain head={} ({} bytes)", head, out.len());
    Ok(out)
}

/// Mark every page of a chain FREELIST. Returns how many pages were
/// released. No freelist index is kept; the pages are simply flagged.
pub fn free_chain(pager: &mut PageManager, head: u64) -> Result<usize> {
    let mut visited = HashSet::new();
    let mut freed = 0usize;

    let mut id = head;
    while id != 0 {
        if !visited.insert(id) {
            return Err(JparqueError::OverflowCycle { page: id });
        }

        let mut page = pager.read_page(id)?;
        if !page.is_overflow() {
            return Err(JparqueError::InvalidPageRole {
                page: id,
                flags: page.flags(),
            });
        }
        let next = page.successor() as u64;
        page.set_flags(FLAG_FREELIST);
        page.set_successor(0);
        pager.write_page(&page)?;
        freed += 1;
        id = next;
    }

    debug!("freed overflow chain head={} ({} pages)", head, freed);
    Ok(freed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::pager::DEFAULT_PAGE_SIZE;
    use tempfile::tempdir;

    fn open_pager(page_size: usize) -> (tempfile::TempDir, PageManager) {
        let dir = tempdir().unwrap();
        let pm = PageManager::open(dir.path().join("ovf.db"), page_size).unwrap();
        (dir, pm)
    }

    #[test]
    fn test_single_page_chain_round_trip() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        let data = b"hello overflow".to_vec();
        let head = write_chain(&mut pm, &data).unwrap();
        assert_eq!(read_chain(&mut pm, head).unwrap(), data);
    }

    #[test]
    fn test_multi_page_chain_round_trip() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        // Three and a half pages worth of patterned bytes.
        let data: Vec<u8> = (0..chunk_capacity(DEFAULT_PAGE_SIZE) * 7 / 2)
            .map(|i| (i % 251) as u8)
            .collect();
        let head = write_chain(&mut pm, &data).unwrap();
        assert_eq!(read_chain(&mut pm, head).unwrap(), data);
    }

    #[test]
    fn test_chunk_boundary_exact_fit() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        let data = vec![0xAB; chunk_capacity(DEFAULT_PAGE_SIZE) * 2];
        let head = write_chain(&mut pm, &data).unwrap();
        assert_eq!(read_chain(&mut pm, head).unwrap(), data);

        // Exactly two pages, with the second terminating the chain.
        let first = pm.read_page(head).unwrap();
        let second = pm.read_page(first.successor() as u64).unwrap();
        assert_eq!(second.successor(), 0);
    }

    #[test]
    fn test_cycle_detection() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        let data = vec![1u8; chunk_capacity(DEFAULT_PAGE_SIZE) + 10];
        let head = write_chain(&mut pm, &data).unwrap();

        // Point the second page back at the first.
        let first = pm.read_page(head).unwrap();
        let mut second = pm.read_page(first.successor() as u64).unwrap();
        second.set_successor(head as u32);
        pm.write_page(&second).unwrap();

        assert!(matches!(
            read_chain(&mut pm, head),
            Err(JparqueError::OverflowCycle { .. })
        ));
    }

    #[test]
    fn test_free_chain_marks_freelist() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        let data = vec![2u8; chunk_capacity(DEFAULT_PAGE_SIZE) * 3];
        let head = write_chain(&mut pm, &data).unwrap();

        let freed = free_chain(&mut pm, head).unwrap();
        assert_eq!(freed, 3);
        let page = pm.read_page(head).unwrap();
        assert!(page.is_freelist());
        assert!(!page.is_overflow());
    }

    #[test]
    fn test_read_non_overflow_page_fails() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        let id = pm.allocate_page().unwrap();
        let page = Page::new(id, crate::btree::page::FLAG_LEAF, DEFAULT_PAGE_SIZE);
        pm.write_page(&page).unwrap();
        assert!(matches!(
            read_chain(&mut pm, id),
            Err(JparqueError::InvalidPageRole { .. })
        ));
    }

    #[test]
    fn test_empty_value_still_gets_a_head_page() {
        let (_dir, mut pm) = open_pager(DEFAULT_PAGE_SIZE);
        let head = write_chain(&mut pm, &[]).unwrap();
        assert_eq!(read_chain(&mut pm, head).unwrap(), Vec::<u8>::new());
    }
}
