//! Human-readable and JSON dumps of a B+Tree page file, for debugging.

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::btree::page::{Page, PageRole, PAGE_HEADER_SIZE};
use crate::btree::PageManager;
use crate::error::Result;
use crate::parquet::{ParquetDeserializer, MAGIC};

/// Detected file type
pub enum FileType {
    /// JParque B+Tree page file
    BTreeFile,
    /// Parquet-shaped columnar file
    ColumnarFile,
    /// Unknown file format
    Unknown,
}

/// Detect file type from raw data by checking magic bytes.
///
/// Columnar files carry the magic at both ends; a B+Tree file starts with
/// its meta page, whose first 8 bytes are the non-zero allocation counter.
pub fn detect_file_type(data: &[u8]) -> FileType {
    if data.len() >= MAGIC.len() * 2 && &data[..MAGIC.len()] == MAGIC {
        FileType::ColumnarFile
    } else if data.len() >= PAGE_HEADER_SIZE && data[..8] != [0u8; 8] {
        FileType::BTreeFile
    } else {
        FileType::Unknown
    }
}

/// Options for controlling what gets dumped
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Specific pages to dump (by id). If None, dumps every page.
    pub pages: Option<Vec<u64>>,
    /// Render the dump as JSON instead of text.
    pub json: bool,
}

/// Aggregate statistics over one page file.
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub page_size: usize,
    pub page_count: u64,
    pub root_page: Option<u64>,
    pub depth: usize,
    pub leaf_pages: usize,
    pub branch_pages: usize,
    pub overflow_pages: usize,
    pub freelist_pages: usize,
    pub total_elements: usize,
    pub total_free_bytes: usize,
}

/// Snapshot of one element for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ElementDump {
    pub key: String,
    pub key_size: usize,
    pub value_size: usize,
    pub overflow_head: Option<u64>,
}

/// Snapshot of one page for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct PageDump {
    pub id: u64,
    pub role: PageRole,
    pub count: usize,
    pub successor: u32,
    pub free_space: usize,
    pub elements: Vec<ElementDump>,
}

const KEY_PREVIEW_LEN: usize = 32;

fn preview_key(key: &[u8]) -> String {
    let text = String::from_utf8_lossy(key);
    if text.len() <= KEY_PREVIEW_LEN {
        text.into_owned()
    } else {
        let mut end = KEY_PREVIEW_LEN;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... ({} bytes)", &text[..end], key.len())
    }
}

fn snapshot_page(page: &Page) -> PageDump {
    let elements = (0..page.count())
        .filter_map(|i| page.element(i))
        .map(|elem| ElementDump {
            key: preview_key(elem.key),
            key_size: elem.key_size(),
            value_size: elem.value_size(),
            overflow_head: elem.overflow_head(),
        })
        .collect();

    PageDump {
        id: page.id(),
        role: page.role(),
        count: page.count(),
        successor: page.successor(),
        free_space: page.free_space(),
        elements,
    }
}

/// Walk every allocated page and aggregate statistics.
pub fn collect_stats(manager: &mut PageManager) -> Result<FileStats> {
    let mut stats = FileStats {
        page_size: manager.page_size(),
        page_count: manager.next_page_id().saturating_sub(1),
        root_page: manager.root(),
        depth: 0,
        leaf_pages: 0,
        branch_pages: 0,
        overflow_pages: 0,
        freelist_pages: 0,
        total_elements: 0,
        total_free_bytes: 0,
    };

    for id in 1..manager.next_page_id() {
        let page = manager.read_page(id)?;
        match page.role() {
            PageRole::Leaf => {
                stats.leaf_pages += 1;
                stats.total_elements += page.count();
                stats.total_free_bytes += page.free_space();
            }
            PageRole::Branch => {
                stats.branch_pages += 1;
                stats.total_free_bytes += page.free_space();
            }
            PageRole::Overflow => stats.overflow_pages += 1,
            PageRole::Freelist => stats.freelist_pages += 1,
            PageRole::Meta | PageRole::Unknown => {}
        }
    }

    // Depth of the tree: follow the leftmost child from the root.
    if let Some(root) = manager.root() {
        let mut page = manager.read_page(root)?;
        while page.is_branch() {
            stats.depth += 1;
            let child = match page.element(0).and_then(|e| {
                if e.value.len() == 8 {
                    Some(u64::from_be_bytes(e.value.try_into().ok()?))
                } else {
                    None
                }
            }) {
                Some(child) => child,
                None => break,
            };
            page = manager.read_page(child)?;
        }
    }

    Ok(stats)
}

/// Dump a page file to a string.
pub fn dump_to_string<P: AsRef<Path>>(
    path: P,
    page_size: usize,
    options: &DumpOptions,
) -> Result<String> {
    let mut manager = PageManager::open(path.as_ref(), page_size)?;
    let stats = collect_stats(&mut manager)?;

    let wanted: Vec<u64> = match &options.pages {
        Some(pages) => pages.clone(),
        None => (1..manager.next_page_id()).collect(),
    };

    let mut pages = Vec::with_capacity(wanted.len());
    for id in wanted {
        pages.push(snapshot_page(&manager.read_page(id)?));
    }

    if options.json {
        #[derive(Serialize)]
        struct JsonDump {
            stats: FileStats,
            pages: Vec<PageDump>,
        }
        return Ok(serde_json::to_string_pretty(&JsonDump { stats, pages })?);
    }

    let mut out = String::new();
    writeln!(out, "================================================================================").unwrap();
    writeln!(out, "JParque B+Tree File Dump").unwrap();
    writeln!(out, "================================================================================").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "Page size: {} bytes", stats.page_size).unwrap();
    writeln!(out, "Page count: {}", stats.page_count).unwrap();
    match stats.root_page {
        Some(root) => writeln!(out, "Root page: {} (depth {})", root, stats.depth).unwrap(),
        None => writeln!(out, "Root page: none").unwrap(),
    }
    writeln!(
        out,
        "Pages: {} leaf, {} branch, {} overflow, {} freelist",
        stats.leaf_pages, stats.branch_pages, stats.overflow_pages, stats.freelist_pages
    )
    .unwrap();
    writeln!(out, "Elements: {}", stats.total_elements).unwrap();

    for page in &pages {
        writeln!(out).unwrap();
        writeln!(out, "--- Page {} ({:?}) ---", page.id, page.role).unwrap();
        writeln!(
            out,
            "count: {}  successor: {}  free: {} bytes",
            page.count, page.successor, page.free_space
        )
        .unwrap();
        for (i, elem) in page.elements.iter().enumerate() {
            match elem.overflow_head {
                Some(head) => writeln!(
                    out,
                    "  [{:3}] {:?} -> overflow chain @ page {}",
                    i, elem.key, head
                )
                .unwrap(),
                None => writeln!(
                    out,
                    "  [{:3}] {:?} -> {} value bytes",
                    i, elem.key, elem.value_size
                )
                .unwrap(),
            }
        }
    }

    Ok(out)
}

/// Dump a page file to `output_path`.
pub fn dump_to_file<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    page_size: usize,
    output_path: Q,
    options: &DumpOptions,
) -> Result<()> {
    let content = dump_to_string(path, page_size, options)?;
    let mut file = File::create(output_path.as_ref())?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Print summary information about a page file.
pub fn print_file_info<P: AsRef<Path>>(path: P, page_size: usize, verbose: bool) -> Result<()> {
    let mut manager = PageManager::open(path.as_ref(), page_size)?;
    let stats = collect_stats(&mut manager)?;

    println!("JParque B+Tree File Information");
    println!("===============================");
    println!("File: {}", path.as_ref().display());
    println!("Page size: {} bytes", stats.page_size);
    println!("Page count: {}", stats.page_count);
    match stats.root_page {
        Some(root) => println!("Root page: {} (depth {})", root, stats.depth),
        None => println!("Root page: none"),
    }

    if verbose {
        println!();
        println!("Page Statistics");
        println!("---------------");
        println!("  Leaf pages: {}", stats.leaf_pages);
        println!("  Branch pages: {}", stats.branch_pages);
        println!("  Overflow pages: {}", stats.overflow_pages);
        println!("  Freelist pages: {}", stats.freelist_pages);
        println!("  Elements: {}", stats.total_elements);
        println!("  Free bytes in tree pages: {}", stats.total_free_bytes);
    }
    Ok(())
}

/// Print summary information about a columnar file.
pub fn print_columnar_info<P: AsRef<Path>>(path: P, verbose: bool) -> Result<()> {
    let deserializer = ParquetDeserializer::open(path.as_ref())?;
    let metadata = deserializer.metadata();

    println!("JParque Columnar File Information");
    println!("=================================");
    println!("File: {}", path.as_ref().display());
    println!("Format version: {}", metadata.version);
    println!("Creator: {}", metadata.creator);
    println!("Codec: {:?}", deserializer.codec());
    println!("Fields: {}", metadata.fields.len());
    println!(
        "Row groups: {} ({} rows)",
        metadata.row_groups.len(),
        metadata.row_groups.iter().map(|g| g.row_count).sum::<u64>()
    );

    if verbose {
        println!();
        println!("Schema");
        println!("------");
        for field in &metadata.fields {
            let annotation = field
                .logical_type
                .map(|lt| format!(" ({:?})", lt))
                .unwrap_or_default();
            println!(
                "  {} {:?} {:?}{}",
                field.name, field.repetition, field.physical_type, annotation
            );
        }

        println!();
        println!("Row Groups");
        println!("----------");
        for (i, group) in metadata.row_groups.iter().enumerate() {
            println!(
                "  [{}] {} rows, {} bytes at offset {}",
                i, group.row_count, group.total_byte_size, group.start_offset
            );
        }
    }
    Ok(())
}
