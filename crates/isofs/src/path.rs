//! Path tables: the L-table (little-endian) and M-table
//! (big-endian) views of the same directory hierarchy, in breadth-first
//! depth order with each entry cross-linked back to its directory record.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::directory::{DirArena, DirHandle};
use crate::error::{Error, Result};

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PathTableEntryHeader {
    len: u8,
    extended_attr_record: u8,
    extent: [u8; 4],
    parent_index: [u8; 2],
}

/// One row of the path table: a directory's name, its extent, and the
/// 1-based index of its parent row (ECMA-119 9.4; the root's own parent
/// index is `1`, i.e. itself).
#[derive(Debug, Clone)]
pub struct PathTableRecord {
    pub name: Vec<u8>,
    pub extent: u32,
    pub parent_index: u16,
    pub dir: DirHandle,
}

impl PathTableRecord {
    pub fn record_length(&self) -> usize {
        let len = 8 + self.name.len();
        if self.name.len() % 2 == 1 {
            len + 1
        } else {
            len
        }
    }

    fn encode(&self, little_endian: bool) -> Vec<u8> {
        let header = PathTableEntryHeader {
            len: self.name.len() as u8,
            extended_attr_record: 0,
            extent: if little_endian {
                self.extent.to_le_bytes()
            } else {
                self.extent.to_be_bytes()
            },
            parent_index: if little_endian {
                self.parent_index.to_le_bytes()
            } else {
                self.parent_index.to_be_bytes()
            },
        };
        let mut bytes = Vec::with_capacity(self.record_length());
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        bytes.extend_from_slice(&self.name);
        if self.name.len() % 2 == 1 {
            bytes.push(0);
        }
        bytes
    }

    fn decode(bytes: &[u8], little_endian: bool) -> Result<(Self, usize)> {
        const HEADER_LEN: usize = core::mem::size_of::<PathTableEntryHeader>();
        if bytes.len() < HEADER_LEN {
            return Err(Error::malformed("path table entry header truncated"));
        }
        let header: PathTableEntryHeader = *bytemuck::from_bytes(&bytes[..HEADER_LEN]);
        let name_len = header.len as usize;
        if bytes.len() < HEADER_LEN + name_len {
            return Err(Error::malformed("path table entry name truncated"));
        }
        let name = bytes[HEADER_LEN..HEADER_LEN + name_len].to_vec();
        let mut consumed = HEADER_LEN + name_len;
        if name_len % 2 == 1 {
            consumed += 1;
        }
        let (extent, parent_index) = if little_endian {
            (
                u32::from_le_bytes(header.extent),
                u16::from_le_bytes(header.parent_index),
            )
        } else {
            (
                u32::from_be_bytes(header.extent),
                u16::from_be_bytes(header.parent_index),
            )
        };
        let record = PathTableRecord {
            name,
            extent,
            parent_index,
            dir: DirHandle(0),
        };
        Ok((record, consumed))
    }
}

/// The path table for one directory tree (Primary or a Joliet
/// Supplementary), held in breadth-first depth order as ECMA-119 9.4 mandates.
#[derive(Debug, Default, Clone)]
pub struct PathTable {
    records: Vec<PathTableRecord>,
}

impl PathTable {
    pub fn records(&self) -> &[PathTableRecord] {
        &self.records
    }

    pub fn size_bytes(&self) -> usize {
        self.records.iter().map(PathTableRecord::record_length).sum()
    }

    /// Rebuilds the path table from `arena`'s current tree shape. Root is
    /// position 1; children of a directory appear, sorted by identifier,
    /// immediately after every directory at the same depth (breadth-first).
    pub fn build(arena: &DirArena, root: DirHandle) -> Self {
        let mut records = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((root, 1u16));
        let mut next_index: u16 = 1;

        while let Some((dir, parent_index)) = queue.pop_front() {
            let rec = arena.get(dir);
            let name = if dir == root {
                Vec::new()
            } else {
                rec.file_ident.clone()
            };
            records.push(PathTableRecord {
                name,
                extent: rec.extent_new,
                parent_index,
                dir,
            });
            let own_index = next_index;
            next_index += 1;

            let mut children: Vec<DirHandle> = rec
                .children
                .iter()
                .copied()
                .filter(|&c| {
                    let child = arena.get(c);
                    child.is_directory() && !child.is_dot() && !child.is_dotdot()
                })
                .collect();
            children.sort_by(|&a, &b| arena.get(a).file_ident.cmp(&arena.get(b).file_ident));
            for child in children {
                queue.push_back((child, own_index));
            }
        }

        Self { records }
    }

    pub fn serialize_le(&self) -> Vec<u8> {
        self.records.iter().flat_map(|r| r.encode(true)).collect()
    }

    pub fn serialize_be(&self) -> Vec<u8> {
        self.records.iter().flat_map(|r| r.encode(false)).collect()
    }

    /// Parses and cross-checks the L-table and M-table: both
    /// must describe the same sequence of entries.
    pub fn parse(le_bytes: &[u8], be_bytes: &[u8]) -> Result<Self> {
        let le_records = Self::parse_one(le_bytes, true)?;
        let be_records = Self::parse_one(be_bytes, false)?;
        if le_records.len() != be_records.len() {
            return Err(Error::malformed(
                "L-table and M-table path table entry counts disagree",
            ));
        }
        for (le, be) in le_records.iter().zip(be_records.iter()) {
            if le.extent != be.extent || le.parent_index != be.parent_index || le.name != be.name
            {
                return Err(Error::malformed(
                    "L-table and M-table path table entries disagree",
                ));
            }
        }
        Ok(Self { records: le_records })
    }

    fn parse_one(mut bytes: &[u8], little_endian: bool) -> Result<Vec<PathTableRecord>> {
        let mut records = Vec::new();
        while !bytes.is_empty() {
            if bytes.iter().all(|&b| b == 0) {
                break;
            }
            let (record, consumed) = PathTableRecord::decode(bytes, little_endian)?;
            records.push(record);
            bytes = &bytes[consumed..];
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DirDateTime;

    #[test]
    fn root_is_first_record_with_no_name() {
        let (arena, root) = DirArena::new_root(2048, DirDateTime::default());
        let table = PathTable::build(&arena, root);
        assert_eq!(table.records().len(), 1);
        assert!(table.records()[0].name.is_empty());
        assert_eq!(table.records()[0].parent_index, 1);
    }

    #[test]
    fn le_be_encode_agree_on_length() {
        let (arena, root) = DirArena::new_root(2048, DirDateTime::default());
        let table = PathTable::build(&arena, root);
        assert_eq!(table.serialize_le().len(), table.serialize_be().len());
    }

    #[test]
    fn cross_check_rejects_disagreement() {
        let (arena, root) = DirArena::new_root(2048, DirDateTime::default());
        let table = PathTable::build(&arena, root);
        let le = table.serialize_le();
        let mut be = table.serialize_be();
        if let Some(b) = be.get_mut(4) {
            *b ^= 0xff;
        }
        assert!(PathTable::parse(&le, &be).is_err());
    }
}
