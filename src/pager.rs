//! Array-indexed page cache (spec §4.1). Grounded on the teacher's
//! `Pager` in `storage/table.rs`, minus its bincode page-header framing —
//! the file here is exactly `PAGE_SIZE * num_pages` bytes, laid out
//! byte-for-byte by the node codec, so `.btree`/`.constants` dumps (and a
//! plain `dd`) see precisely what spec.md §6 describes.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::errors::Error;
use crate::node::{Node, PAGE_SIZE};

pub const TABLE_MAX_PAGES: usize = 100;

/// Lazily-faulted page cache over a single backing file.
///
/// Does not interpret page contents — callers (`Btree`, `Transaction`)
/// are responsible for reading/writing through the `Node` codec.
pub struct Pager {
    file: File,
    pages: Vec<Option<Node>>,
    pub num_pages: u32,
}

impl Pager {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        if file_len % PAGE_SIZE as u64 != 0 {
            return Err(Error::CorruptFile(format!(
                "file length {file_len} is not a multiple of PAGE_SIZE ({PAGE_SIZE})"
            )));
        }
        let num_pages = (file_len / PAGE_SIZE as u64) as u32;
        debug!(num_pages, "opened pager");
        let mut pages = Vec::with_capacity(TABLE_MAX_PAGES);
        pages.resize_with(TABLE_MAX_PAGES, || None);
        Ok(Pager {
            file,
            pages,
            num_pages,
        })
    }

    /// Return the cached node for `n`, faulting it in from disk on miss.
    pub fn get(&mut self, n: u32) -> Result<&mut Node, Error> {
        // `>=` because `pages` only has TABLE_MAX_PAGES slots (0..TABLE_MAX_PAGES-1).
        if n as usize >= TABLE_MAX_PAGES {
            return Err(Error::PageOutOfBounds(n));
        }
        if self.pages[n as usize].is_none() {
            trace!(page = n, "fault-in");
            let mut buf = [0u8; PAGE_SIZE];
            self.file.seek(SeekFrom::Start(n as u64 * PAGE_SIZE as u64))?;
            // A short read (page past EOF) is fine: the tail stays zeroed.
            let _ = self.file.read(&mut buf)?;
            self.pages[n as usize] = Some(Node::from_bytes(buf));
            if n >= self.num_pages {
                self.num_pages = n + 1;
            }
        }
        Ok(self.pages[n as usize].as_mut().unwrap())
    }

    /// Allocate a fresh zeroed page and return its number. No free list
    /// (spec §4): deleted pages are leaked within a session.
    pub fn allocate_unused_page(&mut self) -> Result<u32, Error> {
        if self.num_pages as usize >= TABLE_MAX_PAGES {
            return Err(Error::AllocFail);
        }
        let n = self.num_pages;
        self.pages[n as usize] = Some(Node::zeroed());
        self.num_pages += 1;
        Ok(n)
    }

    pub fn flush(&mut self, n: u32) -> Result<(), Error> {
        let Some(node) = self.pages.get(n as usize).and_then(|p| p.as_ref()) else {
            // Flushing a page absent from the cache is a programming error.
            return Err(Error::InvalidPageAccess(format!(
                "flush of uncached page {n}"
            )));
        };
        self.file.seek(SeekFrom::Start(n as u64 * PAGE_SIZE as u64))?;
        let written = self.file.write(&node.data)?;
        if written != PAGE_SIZE {
            return Err(Error::ShortWrite(n));
        }
        Ok(())
    }

    pub fn fsync(&mut self) -> Result<(), Error> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Flush every cached slot and drop the handle. Never flushes a page
    /// that was never faulted in.
    pub fn close(mut self) -> Result<(), Error> {
        for n in 0..TABLE_MAX_PAGES as u32 {
            if self.pages[n as usize].is_some() {
                self.flush(n)?;
            }
        }
        self.file.sync_all()?;
        warn!(num_pages = self.num_pages, "pager closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn fresh_file_starts_with_zero_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages, 0);
    }

    #[test]
    fn get_past_eof_returns_zeroed_page_and_bumps_num_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let mut pager = Pager::open(&path).unwrap();
        let node = pager.get(0).unwrap();
        assert_eq!(node.data, [0u8; PAGE_SIZE]);
        assert_eq!(pager.num_pages, 1);
    }

    #[test]
    fn flush_then_reopen_roundtrips_page_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let mut pager = Pager::open(&path).unwrap();
            let node = pager.get(0).unwrap();
            node.init_leaf();
            node.set_leaf_num_cells(3);
            pager.flush(0).unwrap();
            pager.fsync().unwrap();
        }
        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages, 1);
        let node = pager.get(0).unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Leaf);
        assert_eq!(node.leaf_num_cells(), 3);
    }

    #[test]
    fn rejects_file_whose_length_is_not_a_page_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).unwrap();
        assert!(matches!(Pager::open(&path), Err(Error::CorruptFile(_))));
    }

    #[test]
    fn get_beyond_table_max_pages_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let mut pager = Pager::open(&path).unwrap();
        assert!(matches!(
            pager.get(TABLE_MAX_PAGES as u32),
            Err(Error::PageOutOfBounds(_))
        ));
    }
}
