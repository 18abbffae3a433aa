//! A mutable ISO 9660 / ECMA-119 disc image engine with Joliet, Rock Ridge
//! and El Torito support.
//!
//! [`Image`] is the root aggregate: it owns the primary and (optionally)
//! Joliet directory trees, the volume descriptor set, an optional El Torito
//! boot catalog and an optional isohybrid MBR. Build one fresh with
//! [`Image::new`], or load one with [`Image::open`]; mutate it with
//! `add_fp`/`add_directory`/`add_symlink`/`rm_file`/`rm_directory`/
//! `add_eltorito`/`rm_eltorito`/`add_isohybrid`/`rm_isohybrid`; serialize it
//! with [`Image::write`].
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod boot;
pub mod date;
pub mod directory;
pub mod error;
pub mod isohybrid;
pub mod options;
pub mod path;
pub mod susp;
pub mod types;
pub mod volume;

mod mutate;
mod parser;
mod reshuffle;
mod writer;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

pub use error::{Error, Result};
pub use options::{NewOptions, Strictness};

use date::DirDateTime;
use directory::{DirArena, DirHandle, ExternalSource};
use isohybrid::IsoHybridOptions;
use path::PathTable;
use volume::VolumeDescriptorList;

#[cfg(feature = "std")]
pub(crate) fn current_dir_date() -> DirDateTime {
    DirDateTime::now()
}

#[cfg(not(feature = "std"))]
pub(crate) fn current_dir_date() -> DirDateTime {
    DirDateTime::default()
}

#[cfg(feature = "std")]
pub(crate) fn current_dec_date() -> date::DecDateTime {
    date::DecDateTime::now()
}

#[cfg(not(feature = "std"))]
pub(crate) fn current_dec_date() -> date::DecDateTime {
    date::DecDateTime::unspecified()
}

/// One directory tree: the Primary tree, or a Joliet Supplementary tree.
pub(crate) struct Tree<'a> {
    pub arena: DirArena<'a>,
    pub root: DirHandle,
    pub path_table: PathTable,
}

impl<'a> Tree<'a> {
    fn new_empty(block_size: u32, date: DirDateTime) -> Self {
        let (arena, root) = DirArena::new_root(block_size, date);
        Self {
            arena,
            root,
            path_table: PathTable::default(),
        }
    }
}

/// Which directory record in the PVD tree the El Torito catalog and its
/// initial entry are bound to, kept separate from ordinary file bookkeeping
/// so the reshuffle and writer can skip them during the general file walk.
pub(crate) struct BootState {
    pub catalog: boot::BootCatalog,
    pub primary_catalog_dir: DirHandle,
    pub primary_boot_dir: DirHandle,
    pub joliet_catalog_dir: Option<DirHandle>,
    pub joliet_boot_dir: Option<DirHandle>,
}

/// Owns the volume descriptor set, the Primary (and optional Joliet)
/// directory tree, an optional El Torito boot catalog, an optional isohybrid
/// MBR, and (while open) the source the image was parsed from.
pub struct Image<'a> {
    pub(crate) options: NewOptions,
    /// The byte source an opened image was parsed from, wrapped in a
    /// `RefCell` so `write` (which only borrows `Image` immutably) can still
    /// seek and read `Content::Original` data out of it.
    pub(crate) source: Option<core::cell::RefCell<&'a mut dyn ExternalSource>>,
    pub(crate) volume_descriptors: VolumeDescriptorList,
    pub(crate) primary: Tree<'a>,
    pub(crate) joliet: Option<Tree<'a>>,
    pub(crate) boot: Option<BootState>,
    /// Pending isohybrid options; the writer builds the MBR from these at
    /// write time, once the final image size is known.
    pub(crate) isohybrid: Option<IsoHybridOptions>,
}

impl<'a> Image<'a> {
    pub(crate) fn block_size(&self) -> u32 {
        self.options.log_block_size as u32
    }

    /// Builds a fresh, minimal image: one Primary Volume Descriptor, the
    /// root directory's own dot/dotdot, an optional Joliet Supplementary
    /// Volume Descriptor, and an immediate reshuffle.
    pub fn new(options: NewOptions) -> Result<Self> {
        let block_size = options.log_block_size as u32;
        let date = current_dir_date();

        let mut primary = Tree::new_empty(block_size, date);
        attach_root_self_entries(
            &mut primary.arena,
            primary.root,
            primary.root,
            options.rock_ridge,
            date,
        );

        let joliet = if options.joliet {
            let mut t = Tree::new_empty(block_size, date);
            attach_root_self_entries(&mut t.arena, t.root, t.root, false, date);
            Some(t)
        } else {
            None
        };

        let mut volume_descriptors = VolumeDescriptorList::empty();
        let root_rec = volume::RootDirRecord::new(0, block_size, date);
        let mut pvd = volume::PrimaryVolumeDescriptor::new(&options.volume_identifier, root_rec)?;
        pvd.system_identifier = types::AString::from_str(&options.system_identifier)?;
        pvd.volume_set_identifier = types::AString::from_str(&options.volume_set_identifier)?;
        pvd.publisher_identifier = types::AString::from_str(&options.publisher_identifier)?;
        pvd.data_preparer_identifier = types::AString::from_str(&options.data_preparer_identifier)?;
        pvd.application_identifier = types::AString::from_str(&options.application_identifier)?;
        pvd.copyright_file_identifier = types::AString::from_str(&options.copyright_file_identifier)?;
        pvd.abstract_file_identifier = types::AString::from_str(&options.abstract_file_identifier)?;
        pvd.bibliographic_file_identifier =
            types::AString::from_str(&options.bibliographic_file_identifier)?;
        pvd.set_size = types::Dual16::new(options.set_size);
        pvd.seqnum = types::Dual16::new(options.seqnum);
        pvd.log_block_size = types::Dual16::new(options.log_block_size);
        pvd.application_use = options.application_use;
        pvd.volume_creation_date = current_dec_date();
        pvd.volume_modification_date = pvd.volume_creation_date;
        pvd.volume_expiration_date = options
            .volume_expiration_date
            .unwrap_or_else(date::DecDateTime::unspecified);
        volume_descriptors.push(volume::VolumeDescriptor::Primary(Box::new(pvd)));

        if joliet.is_some() {
            let vol_ident_u16 = utf16be_ident(&options.volume_identifier, 16);
            let svd = volume::SupplementaryVolumeDescriptor::new_joliet(
                &vol_ident_u16,
                volume::RootDirRecord::new(0, block_size, date),
            );
            volume_descriptors.push(volume::VolumeDescriptor::Supplementary(Box::new(svd)));
        }

        volume_descriptors.push(volume::VolumeDescriptor::Terminator);

        let mut image = Self {
            options,
            source: None,
            volume_descriptors,
            primary,
            joliet,
            boot: None,
            isohybrid: None,
        };
        image.reshuffle()?;
        Ok(image)
    }

    /// Parses an existing image from `source`, validating volume
    /// descriptors, path tables, and the directory tree along the way.
    pub fn open<S: ExternalSource + 'a>(source: &'a mut S, strictness: Strictness) -> Result<Self> {
        parser::open(source, strictness)
    }

    /// Releases the attached byte source and resets this value to an empty,
    /// reusable image. Dropping the `Image` achieves the same effect; this exists for
    /// callers that want to reuse the allocation.
    pub fn close(&mut self) -> Result<()> {
        *self = Image::new(NewOptions::default())?;
        Ok(())
    }

    /// Lists the immediate children of `iso_path`. Realized eagerly since
    /// the whole tree already lives in memory.
    pub fn list_dir(&self, iso_path: &str) -> Result<Vec<String>> {
        let components = mutate::split_absolute_path(iso_path)?;
        let dir = self
            .primary
            .arena
            .resolve_dir(self.primary.root, &components)
            .ok_or_else(|| Error::invalid("no such directory"))?;
        Ok(self
            .primary
            .arena
            .get(dir)
            .children
            .iter()
            .map(|&h| self.primary.arena.get(h))
            .filter(|rec| !rec.is_dot() && !rec.is_dotdot())
            .map(|rec| String::from_utf8_lossy(&rec.file_ident).into_owned())
            .collect())
    }

    /// Resolves `iso_path` to its directory record handle.
    pub fn get_entry(&self, iso_path: &str) -> Result<DirHandle> {
        mutate::resolve_entry(&self.primary.arena, self.primary.root, iso_path)
    }

    /// Debug dump of the Primary tree, indented by depth.
    #[cfg(feature = "std")]
    pub fn print_tree(&self) {
        fn walk(arena: &DirArena, handle: DirHandle, depth: usize) {
            let rec = arena.get(handle);
            if !rec.is_dot() && !rec.is_dotdot() {
                std::println!(
                    "{}{}",
                    "  ".repeat(depth),
                    String::from_utf8_lossy(&rec.file_ident)
                );
            }
            if rec.is_directory() {
                for &child in &rec.children {
                    if child != handle {
                        walk(arena, child, depth + 1);
                    }
                }
            }
        }
        walk(&self.primary.arena, self.primary.root, 0);
    }
}

/// Creates the dot/dotdot pair owned by `dir` (whose parent, for mirroring
/// purposes, is `parent_dir`; for the root, `parent_dir == dir`), optionally
/// carrying the Rock Ridge `SP`/`ER` records that belong only on the root's
/// first directory record.
pub(crate) fn attach_root_self_entries(
    arena: &mut DirArena,
    dir: DirHandle,
    parent_dir: DirHandle,
    rock_ridge: bool,
    date: DirDateTime,
) {
    use directory::{Content, DirectoryRecord, FileFlags};
    use susp::{default_mode, Er, Px, RockRidge, Tf};

    let is_root = dir == parent_dir;
    let dot_rr = rock_ridge.then(|| RockRidge {
        sp_bytes_to_skip: is_root.then_some(0),
        px: Some(Px {
            file_mode: default_mode::DIRECTORY,
            nlink: 2,
            uid: 0,
            gid: 0,
        }),
        tf: Some(Tf::creation_default(date)),
        er: is_root.then(Er::rrip_1991a),
        ..Default::default()
    });
    let dotdot_rr = rock_ridge.then(|| RockRidge {
        px: Some(Px {
            file_mode: default_mode::DIRECTORY,
            nlink: 2,
            uid: 0,
            gid: 0,
        }),
        tf: Some(Tf::creation_default(date)),
        ..Default::default()
    });

    let dot = DirectoryRecord {
        parent: None,
        children: Vec::new(),
        file_ident: alloc::vec![0u8],
        xattr_len: 0,
        orig_extent_loc: 0,
        extent_new: 0,
        data_length: 0,
        date,
        flags: FileFlags::DIRECTORY,
        file_unit_size: 0,
        interleave_gap_size: 0,
        volume_seqnum: 1,
        content: Content::None,
        rock_ridge: dot_rr,
        mirror: None,
    };
    let dotdot = DirectoryRecord {
        parent: None,
        children: Vec::new(),
        file_ident: alloc::vec![1u8],
        xattr_len: 0,
        orig_extent_loc: 0,
        extent_new: 0,
        data_length: 0,
        date,
        flags: FileFlags::DIRECTORY,
        file_unit_size: 0,
        interleave_gap_size: 0,
        volume_seqnum: 1,
        content: Content::None,
        rock_ridge: dotdot_rr,
        mirror: None,
    };
    let block_size = arena.get(dir).data_length.max(2048);
    let _ = arena.add_child(dir, dot, block_size);
    let _ = arena.add_child(dir, dotdot, block_size);
}

/// Encodes `s` as big-endian UTF-16, right-space-padded to `n` code units
/// (32 bytes when `n == 16`), for use in a Joliet volume identifier field.
pub(crate) fn utf16be_ident(s: &str, n: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut units: Vec<u16> = s.encode_utf16().collect();
    units.resize(n, 0x0020);
    for (i, unit) in units.iter().enumerate().take(n) {
        if i * 2 + 1 < 32 {
            out[i * 2] = (unit >> 8) as u8;
            out[i * 2 + 1] = (unit & 0xff) as u8;
        }
    }
    out
}

/// Encodes `s` as big-endian UTF-16 with no padding, for Joliet file and
/// directory identifiers.
pub(crate) fn utf16be_bytes(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in s.encode_utf16() {
        out.push((unit >> 8) as u8);
        out.push((unit & 0xff) as u8);
    }
    out
}
