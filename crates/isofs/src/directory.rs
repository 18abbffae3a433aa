//! Directory-record tree.
//!
//! The tree is kept in an arena (`DirArena`) addressed by `DirHandle`
//! indices rather than owned parent/child pointers, so that the dot/dotdot
//! cycle and the reshuffle pass are plain index operations instead of a
//! pointer-chase.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use isofs_io::{Read, Seek};

use crate::date::DirDateTime;
use crate::error::{Error, Result};
use crate::susp::RockRidge;
use crate::types::{Dual16, Dual32};

bitflags::bitflags! {
    /// ECMA-119 9.1.6 file flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u8 {
        /// "Existence" bit: hides the entry from casual directory listings.
        const EXISTENCE      = 0b0000_0001;
        const DIRECTORY      = 0b0000_0010;
        const ASSOCIATED_FILE = 0b0000_0100;
        const RECORD         = 0b0000_1000;
        const PROTECTION     = 0b0001_0000;
        const MULTI_EXTENT   = 0b1000_0000;
    }
}

/// Index into a [`DirArena`]. Root is always handle `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirHandle(pub u32);

/// Trait object bound satisfied by any byte source a caller attaches via
/// `add_fp`, restricted to the read+seek half needed to serve content
/// during mastering.
pub trait ExternalSource: Read + Seek {}
impl<T: Read + Seek> ExternalSource for T {}

/// Where a directory record's file content comes from.
pub enum Content<'a> {
    /// Not a regular file (directory, dot, dotdot).
    None,
    /// Data lives on the image that was `open`ed, at `orig_extent_loc`.
    Original,
    /// Data is served from a byte source attached at mutation time. Wrapped
    /// in a `RefCell` so the writer (which only borrows the image tree
    /// immutably — see `Image::write`) can still seek and read it.
    External(RefCell<Box<dyn ExternalSource + 'a>>),
}

impl<'a> core::fmt::Debug for Content<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Content::None => f.write_str("Content::None"),
            Content::Original => f.write_str("Content::Original"),
            Content::External(_) => f.write_str("Content::External(..)"),
        }
    }
}

/// A node in the directory tree.
#[derive(Debug)]
pub struct DirectoryRecord<'a> {
    pub parent: Option<DirHandle>,
    pub children: Vec<DirHandle>,

    pub file_ident: Vec<u8>,
    pub xattr_len: u8,
    /// Extent as parsed from an opened image; reads of `Content::Original`
    /// always use this location, even after a reshuffle changes `extent_new`.
    pub orig_extent_loc: u32,
    /// Extent assigned by the most recent reshuffle.
    pub extent_new: u32,
    pub data_length: u32,
    pub date: DirDateTime,
    pub flags: FileFlags,
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_seqnum: u16,

    pub content: Content<'a>,
    pub rock_ridge: Option<RockRidge>,
    /// For a file record, the handle of the same file's record in the other
    /// tree (primary ↔ Joliet), so the reshuffle pass can mirror one extent
    /// assignment instead of allocating file data twice.
    pub mirror: Option<DirHandle>,
}

impl<'a> DirectoryRecord<'a> {
    pub fn is_dot(&self) -> bool {
        self.file_ident == [0u8]
    }

    pub fn is_dotdot(&self) -> bool {
        self.file_ident == [1u8]
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(FileFlags::DIRECTORY)
    }

    pub fn name_key(&self) -> &[u8] {
        &self.file_ident
    }

    /// `dr_len`: the fixed header (33 bytes) plus identifier (padded to even)
    /// plus any Rock Ridge system-use bytes that fit in the record itself,
    /// padded so the whole record is even.
    pub fn record_length(&self) -> usize {
        let ident_len = self.file_ident.len();
        let mut len = 33 + ident_len;
        if ident_len % 2 == 0 {
            len += 1;
        }
        if let Some(rr) = &self.rock_ridge {
            let budget = crate::susp::su_budget(ident_len);
            len += rr.pack(budget).inline.len();
            if len % 2 != 0 {
                len += 1;
            }
        }
        len
    }

    /// Serializes the fixed 33-byte header, identifier and `system_use`
    /// bytes (the already-packed, `CE`-patched Rock Ridge inline area, or
    /// empty for a record carrying none) into one on-disk directory record,
    /// including both padding bytes ECMA-119 9.1 allows for.
    pub fn encode(&self, system_use: &[u8]) -> Vec<u8> {
        let ident_len = self.file_ident.len();
        let ident_pad = if ident_len % 2 == 0 { 1 } else { 0 };
        let mut len = 33 + ident_len + ident_pad + system_use.len();
        if len % 2 != 0 {
            len += 1;
        }

        let mut out = Vec::with_capacity(len);
        out.push(len as u8);
        out.push(self.xattr_len);
        out.extend_from_slice(&Dual32::new(self.extent_new).record());
        out.extend_from_slice(&Dual32::new(self.data_length).record());
        out.extend_from_slice(&self.date.record());
        out.push(self.flags.bits());
        out.push(self.file_unit_size);
        out.push(self.interleave_gap_size);
        out.extend_from_slice(&Dual16::new(self.volume_seqnum).record());
        out.push(ident_len as u8);
        out.extend_from_slice(&self.file_ident);
        if ident_pad == 1 {
            out.push(0);
        }
        out.extend_from_slice(system_use);
        if out.len() % 2 != 0 {
            out.push(0);
        }
        out
    }
}

/// Sort order for ISO 9660 directory entries: `\x00 < \x01 <` lexicographic
/// by raw identifier bytes — a documented deviation from the padded
/// ECMA-119 9.3 comparison, see DESIGN.md.
pub fn compare_idents(a: &[u8], b: &[u8]) -> core::cmp::Ordering {
    fn rank(ident: &[u8]) -> u8 {
        match ident {
            [0] => 0,
            [1] => 1,
            _ => 2,
        }
    }
    match rank(a).cmp(&rank(b)) {
        core::cmp::Ordering::Equal => a.cmp(b),
        other => other,
    }
}

/// Owns every directory record of one volume tree (PVD or an SVD) in a flat
/// arena, addressed by [`DirHandle`].
#[derive(Debug, Default)]
pub struct DirArena<'a> {
    nodes: Vec<DirectoryRecord<'a>>,
}

impl<'a> DirArena<'a> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn get(&self, handle: DirHandle) -> &DirectoryRecord<'a> {
        &self.nodes[handle.0 as usize]
    }

    pub fn get_mut(&mut self, handle: DirHandle) -> &mut DirectoryRecord<'a> {
        &mut self.nodes[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DirHandle, &DirectoryRecord<'a>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (DirHandle(i as u32), n))
    }

    fn alloc(&mut self, record: DirectoryRecord<'a>) -> DirHandle {
        let handle = DirHandle(self.nodes.len() as u32);
        self.nodes.push(record);
        handle
    }

    /// Wraps an already-built root [`DirectoryRecord`] as the sole member of
    /// a fresh arena (the parser's counterpart to [`Self::new_root`], used
    /// when the record's extent/data_length/date come from a parsed image
    /// rather than being synthesized).
    pub(crate) fn new_with_root(record: DirectoryRecord<'a>) -> (Self, DirHandle) {
        let mut arena = Self::new();
        let root = arena.alloc(record);
        (arena, root)
    }

    /// Creates the root directory record (the root's parent is conceptually
    /// null and is stored as `None`).
    pub fn new_root(block_size: u32, date: DirDateTime) -> (Self, DirHandle) {
        let mut arena = Self::new();
        let root = arena.alloc(DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: alloc::vec![0u8],
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: block_size,
            date,
            flags: FileFlags::DIRECTORY,
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::None,
            rock_ridge: None,
            mirror: None,
        });
        (arena, root)
    }

    /// Appends `record` as a child of `parent`, enforcing sort order and
    /// duplicate rejection.
    ///
    /// Returns `(handle, grew)`, where `grew` reports whether `parent`'s
    /// `data_length` grew by a block to fit the new child (the mutation API
    /// must mirror that growth into the owning volume descriptor's
    /// `space_size`).
    pub fn add_child(
        &mut self,
        parent: DirHandle,
        mut record: DirectoryRecord<'a>,
        block_size: u32,
    ) -> Result<(DirHandle, bool)> {
        record.parent = Some(parent);
        let is_associated = record.flags.contains(FileFlags::ASSOCIATED_FILE);
        let ident = record.file_ident.clone();

        {
            let parent_rec = self.get(parent);
            for &sibling in &parent_rec.children {
                let sib = self.get(sibling);
                if sib.file_ident == ident {
                    if is_associated && sib.flags.contains(FileFlags::ASSOCIATED_FILE) {
                        continue;
                    }
                    return Err(Error::duplicate(
                        String::from_utf8_lossy(&ident).into_owned(),
                    ));
                }
            }
        }

        let handle = self.alloc(record);
        let pos = {
            let parent_rec = self.get(parent);
            parent_rec
                .children
                .iter()
                .position(|&c| {
                    compare_idents(ident.as_slice(), self.get(c).name_key())
                        == core::cmp::Ordering::Less
                })
                .unwrap_or(parent_rec.children.len())
        };
        self.get_mut(parent).children.insert(pos, handle);

        let grew = self.grow_if_needed(parent, block_size);
        Ok((handle, grew))
    }

    /// Appends `record` as a child of `parent` exactly as parsed off an
    /// opened image: no sort-order enforcement, no duplicate rejection, and
    /// `parent`'s `data_length` is never grown to fit it (an already-mastered
    /// image's directory extent size is authoritative, not recomputed).
    pub fn add_parsed_child(
        &mut self,
        parent: DirHandle,
        mut record: DirectoryRecord<'a>,
    ) -> Result<DirHandle> {
        record.parent = Some(parent);
        let handle = self.alloc(record);
        self.get_mut(parent).children.push(handle);
        Ok(handle)
    }

    /// Recomputes `curr_length` for `parent` and grows `data_length` by one
    /// block (returning `true`) if the children now overflow it.
    fn grow_if_needed(&mut self, parent: DirHandle, block_size: u32) -> bool {
        let curr_length: usize = self
            .get(parent)
            .children
            .iter()
            .map(|&c| self.get(c).record_length())
            .sum();
        let parent_rec = self.get_mut(parent);
        if curr_length as u32 > parent_rec.data_length {
            parent_rec.data_length += block_size;
            true
        } else {
            false
        }
    }

    /// Removes the child of `parent` whose identifier matches `ident`,
    /// shrinking `data_length` by a block if more than a full block is now
    /// unused. Returns whether a block was freed.
    pub fn remove_child(
        &mut self,
        parent: DirHandle,
        ident: &[u8],
        block_size: u32,
    ) -> Result<bool> {
        let pos = self
            .get(parent)
            .children
            .iter()
            .position(|&c| self.get(c).name_key() == ident)
            .ok_or_else(|| Error::invalid("no such directory entry"))?;
        self.get_mut(parent).children.remove(pos);

        let curr_length: usize = self
            .get(parent)
            .children
            .iter()
            .map(|&c| self.get(c).record_length())
            .sum();
        let parent_rec = self.get_mut(parent);
        let unused = parent_rec.data_length as usize - curr_length;
        if unused as u32 > block_size {
            parent_rec.data_length -= block_size;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Finds the child of `parent` with the given raw identifier bytes.
    pub fn find_child(&self, parent: DirHandle, ident: &[u8]) -> Option<DirHandle> {
        self.get(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).name_key() == ident)
    }

    /// Resolves a `/`-separated path to a directory handle, walking
    /// directory children only.
    pub fn resolve_dir(&self, root: DirHandle, path: &[String]) -> Option<DirHandle> {
        let mut cur = root;
        for part in path {
            cur = self.get(cur).children.iter().copied().find(|&c| {
                let n = self.get(c);
                n.is_directory() && !n.is_dot() && !n.is_dotdot() && ident_matches(n, part)
            })?;
        }
        Some(cur)
    }
}

fn ident_matches(rec: &DirectoryRecord, part: &str) -> bool {
    let stem = core::str::from_utf8(&rec.file_ident)
        .ok()
        .map(|s| s.split(';').next().unwrap_or(s));
    stem.map(|s| s.eq_ignore_ascii_case(part)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ident: &str, flags: FileFlags) -> DirectoryRecord<'static> {
        DirectoryRecord {
            parent: None,
            children: Vec::new(),
            file_ident: ident.as_bytes().to_vec(),
            xattr_len: 0,
            orig_extent_loc: 0,
            extent_new: 0,
            data_length: 0,
            date: DirDateTime::default(),
            flags,
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_seqnum: 1,
            content: Content::None,
            rock_ridge: None,
            mirror: None,
        }
    }

    #[test]
    fn sort_order_dot_dotdot_then_lex() {
        let (mut arena, root) = DirArena::new_root(2048, DirDateTime::default());
        arena
            .add_child(root, leaf("ZZZ", FileFlags::empty()), 2048)
            .unwrap();
        arena
            .add_child(root, leaf("AAA", FileFlags::empty()), 2048)
            .unwrap();
        arena
            .add_child(root, leaf("\x01", FileFlags::DIRECTORY), 2048)
            .unwrap();
        arena
            .add_child(root, leaf("\x00", FileFlags::DIRECTORY), 2048)
            .unwrap();
        let names: Vec<_> = arena
            .get(root)
            .children
            .iter()
            .map(|&h| arena.get(h).file_ident.clone())
            .collect();
        assert_eq!(
            names,
            alloc::vec![vec![0u8], vec![1u8], b"AAA".to_vec(), b"ZZZ".to_vec()]
        );
    }

    #[test]
    fn duplicate_non_associated_rejected() {
        let (mut arena, root) = DirArena::new_root(2048, DirDateTime::default());
        arena
            .add_child(root, leaf("FILE.TXT;1", FileFlags::empty()), 2048)
            .unwrap();
        let err = arena.add_child(root, leaf("FILE.TXT;1", FileFlags::empty()), 2048);
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_associated_allowed() {
        let (mut arena, root) = DirArena::new_root(2048, DirDateTime::default());
        arena
            .add_child(root, leaf("FILE.TXT;1", FileFlags::ASSOCIATED_FILE), 2048)
            .unwrap();
        let ok = arena.add_child(root, leaf("FILE.TXT;1", FileFlags::ASSOCIATED_FILE), 2048);
        assert!(ok.is_ok());
    }

    #[test]
    fn remove_child_shrinks_after_full_block_freed() {
        let (mut arena, root) = DirArena::new_root(2048, DirDateTime::default());
        for i in 0..90 {
            let name = alloc::format!("F{i:03};1");
            let _ = arena.add_child(root, leaf(&name, FileFlags::empty()), 2048);
        }
        assert!(arena.get(root).data_length > 2048);
        let before = arena.get(root).data_length;
        for i in 0..90 {
            let name = alloc::format!("F{i:03};1");
            let _ = arena.remove_child(root, name.as_bytes(), 2048);
        }
        assert!(arena.get(root).data_length < before);
    }
}
